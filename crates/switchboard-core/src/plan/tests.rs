use super::*;
use tokio_test::assert_ok;

fn three_items(tracker: &mut PlanTracker) -> PlanId {
    tracker.create_plan(vec![
        TodoDraft::owned("Look up the pull request", "github"),
        TodoDraft::owned("Open a ticket", "jira"),
        TodoDraft::from("Summarize"),
    ])
}

#[test]
fn test_new_plan_is_pending() {
    let mut tracker = PlanTracker::new();
    let plan = three_items(&mut tracker);
    let items = tracker.items(plan).unwrap();
    assert_eq!(items.len(), 3);
    assert!(items.iter().all(|i| i.status == TodoStatus::Pending));
    assert_eq!(items[1].owning_agent.as_deref(), Some("jira"));
}

#[test]
fn test_advance_through_lifecycle() {
    let mut tracker = PlanTracker::new();
    let plan = three_items(&mut tracker);

    assert_ok!(tracker.advance(plan, 0, TodoStatus::InProgress));
    assert_ok!(tracker.advance(plan, 0, TodoStatus::Completed));
    // same status again is fine
    assert_ok!(tracker.advance(plan, 0, TodoStatus::Completed));

    assert_eq!(tracker.items(plan).unwrap()[0].status, TodoStatus::Completed);
}

#[test]
fn test_terminal_items_never_revert() {
    let mut tracker = PlanTracker::new();
    let plan = three_items(&mut tracker);
    tracker.advance(plan, 1, TodoStatus::Failed).unwrap();

    for status in [
        TodoStatus::Pending,
        TodoStatus::InProgress,
        TodoStatus::Completed,
    ] {
        let result = tracker.advance(plan, 1, status);
        assert!(
            matches!(result, Err(Error::InvalidTransition { index: 1, .. })),
            "moving a failed item to {status} must be rejected"
        );
    }
    assert_eq!(tracker.items(plan).unwrap()[1].status, TodoStatus::Failed);
}

#[test]
fn test_out_of_range_and_unknown_plan() {
    let mut tracker = PlanTracker::new();
    let plan = three_items(&mut tracker);

    assert!(matches!(
        tracker.advance(plan, 3, TodoStatus::InProgress),
        Err(Error::InvalidTransition { index: 3, .. })
    ));
    assert!(matches!(
        tracker.advance(Uuid::new_v4(), 0, TodoStatus::InProgress),
        Err(Error::PlanNotFound(_))
    ));
}

#[test]
fn test_ensure_completed_uses_agent_outcomes() {
    let mut tracker = PlanTracker::new();
    let plan = three_items(&mut tracker);

    tracker.advance(plan, 0, TodoStatus::InProgress).unwrap();
    tracker.advance(plan, 1, TodoStatus::InProgress).unwrap();
    tracker.record_agent_outcome("github", true);
    tracker.record_agent_outcome("jira", false);

    let forced = tracker.ensure_completed(plan).unwrap();
    assert_eq!(forced, 3);

    let statuses: Vec<_> = tracker.items(plan).unwrap().iter().map(|i| i.status).collect();
    assert_eq!(
        statuses,
        vec![TodoStatus::Completed, TodoStatus::Failed, TodoStatus::Failed]
    );

    // nothing left to force
    assert_eq!(tracker.ensure_completed(plan).unwrap(), 0);
}

#[test]
fn test_render_is_ordered_and_marks_status() {
    let mut tracker = PlanTracker::new();
    let plan = three_items(&mut tracker);
    tracker.advance(plan, 2, TodoStatus::InProgress).unwrap();
    tracker.advance(plan, 0, TodoStatus::Completed).unwrap();

    let rendered = tracker.render(plan).unwrap();
    assert_eq!(
        rendered,
        "Plan (1/3 completed)\n\
         [x] 1. Look up the pull request (github)\n\
         [ ] 2. Open a ticket (jira)\n\
         [~] 3. Summarize"
    );
}

#[test]
fn test_view_counts() {
    let mut tracker = PlanTracker::new();
    let plan = three_items(&mut tracker);
    tracker.advance(plan, 1, TodoStatus::Completed).unwrap();

    let view = tracker.view(plan).unwrap();
    assert_eq!(view.total, 3);
    assert_eq!(view.completed, 1);
    assert_eq!(view.plan_id, plan);
    assert!(view.rendered.starts_with("Plan (1/3 completed)"));

    assert!(tracker.remove(plan).is_some());
    assert!(tracker.view(plan).is_err());
}
