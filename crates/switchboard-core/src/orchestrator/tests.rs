use super::*;
use crate::executor::RunStatus;
use crate::plan::TodoStatus;
use crate::types::{CallerContext, RoutingBasis};
use std::time::Duration;
use switchboard_a2a::mock::{MockAgent, MockClient};
use switchboard_a2a::TaskState;
use switchboard_llm::ScriptedModel;

fn registry() -> AgentRegistry {
    AgentRegistry::new(vec![
        AgentDescriptor::new("github", "mock://github")
            .with_description("Source-control operations")
            .with_skills(["pull requests", "repositories", "commits"]),
        AgentDescriptor::new("jira", "mock://jira")
            .with_description("Incident-ticket operations")
            .with_skills(["tickets", "issues", "sprints"]),
        AgentDescriptor::new("kb", "mock://kb")
            .with_description("Internal documentation search")
            .with_skills(["retrieval", "document search"]),
    ])
    .unwrap()
}

fn orchestrator(client: &MockClient) -> Orchestrator {
    Orchestrator::new(registry(), Arc::new(client.clone()), OrchestratorConfig::default())
}

fn terminal_count(items: &[OutputEnvelope]) -> usize {
    items.iter().filter(|i| i.event.is_terminal()).count()
}

fn assert_well_formed(items: &[OutputEnvelope]) {
    let seqs: Vec<u64> = items.iter().map(|i| i.seq).collect();
    let expected: Vec<u64> = (1..=items.len() as u64).collect();
    assert_eq!(seqs, expected);
    assert_eq!(terminal_count(items), 1);
    assert!(items.last().unwrap().event.is_terminal());
}

#[tokio::test]
async fn test_direct_request_streams_verbatim() {
    let client = MockClient::new().with_agent(
        "mock://github",
        MockAgent::new()
            .status(TaskState::Working)
            .content("Hel")
            .content("lo")
            .finish(TaskState::Completed),
    );
    let handle = orchestrator(&client)
        .start(Request::new("Show me the open pull requests in the api repo"))
        .await
        .unwrap();
    assert_eq!(handle.decision().kind, RoutingKind::Direct);

    let (items, report) = handle.collect().await.unwrap();
    assert_well_formed(&items);
    assert!(matches!(items[0].event, OutputEvent::Started { .. }));
    assert!(matches!(items[1].event, OutputEvent::Routed { kind: RoutingKind::Direct, .. }));
    assert!(!items.iter().any(|i| matches!(i.event, OutputEvent::Plan { .. })));

    let streamed: String = items
        .iter()
        .filter_map(|i| match &i.event {
            OutputEvent::Content { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(streamed, "Hello");

    let result = report.result().unwrap();
    assert_eq!(result.final_content, "Hello");
    assert_eq!(result.contributing_agent_count, 1);
    assert!(!result.synthesized);
    assert!(report.plan.is_none());
}

#[tokio::test]
async fn test_parallel_partial_failure_still_completes() {
    let client = MockClient::new()
        .with_agent(
            "mock://github",
            MockAgent::new()
                .content("PR #42 awaits your review")
                .finish(TaskState::Completed),
        )
        .with_agent(
            "mock://jira",
            MockAgent::new().delay(Duration::from_millis(20)).fail("HTTP 503"),
        );
    let handle = orchestrator(&client)
        .start(Request::new("List my open tickets and any pull requests waiting on me"))
        .await
        .unwrap();
    assert_eq!(handle.decision().kind, RoutingKind::Parallel);

    let (items, report) = handle.collect().await.unwrap();
    assert_well_formed(&items);

    let result = report.result().unwrap();
    assert_eq!(result.final_content, "PR #42 awaits your review");
    assert_eq!(result.failed_agents.len(), 1);
    assert_eq!(result.failed_agents[0].agent, "jira");
    assert!(!result.cancelled);

    let plan = report.plan.as_ref().unwrap();
    assert_eq!(plan.total, 2);
    assert!(plan.items.iter().all(|i| i.status.is_terminal()));
    assert_eq!(plan.items[0].status, TodoStatus::Completed);
    assert_eq!(plan.items[1].status, TodoStatus::Failed);
}

#[tokio::test]
async fn test_total_failure_is_one_failed_event() {
    let client = MockClient::new()
        .with_agent("mock://github", MockAgent::new().fail("token expired"))
        .with_agent("mock://jira", MockAgent::new().fail("HTTP 503"));
    let handle = orchestrator(&client)
        .start(Request::new("List my open tickets and any pull requests waiting on me"))
        .await
        .unwrap();

    let (items, report) = handle.collect().await.unwrap();
    assert_well_formed(&items);
    match &items.last().unwrap().event {
        OutputEvent::Failed {
            error: OrchestrationError::AllAgentsFailed { failures },
        } => assert_eq!(failures.len(), 2),
        other => panic!("unexpected terminal event: {other:?}"),
    }
    // Per-agent errors are not forwarded as content.
    assert!(!items.iter().any(|i| matches!(
        i.event,
        OutputEvent::Content { .. } | OutputEvent::AgentOutput { .. }
    )));
    assert!(report.outcome.is_err());
}

#[tokio::test]
async fn test_complex_request_runs_steps_in_order() {
    let client = MockClient::new()
        .with_agent(
            "mock://jira",
            MockAgent::new().content("Ticket template ready").finish(TaskState::Completed),
        )
        .with_agent(
            "mock://github",
            MockAgent::new().content("PR #42 fails on lint").finish(TaskState::Completed),
        );
    let handle = orchestrator(&client)
        .start(Request::new("Open a ticket based on the failing pull request"))
        .await
        .unwrap();
    assert_eq!(handle.decision().kind, RoutingKind::Complex);

    let (items, report) = handle.collect().await.unwrap();
    assert_well_formed(&items);

    let jira = client.agent("mock://jira").unwrap().received();
    let github = client.agent("mock://github").unwrap().received();
    assert!(jira[0].text.contains("Current step (1/2): Ask jira"));
    assert!(github[0].text.contains("[jira] Ticket template ready"));

    let plan = report.plan.as_ref().unwrap();
    assert_eq!(plan.completed, 2);
    assert_eq!(report.agents[0].agent_name, "jira");
    assert_eq!(report.agents[1].agent_name, "github");

    let result = report.result().unwrap();
    assert!(result.synthesized);
    assert_eq!(
        result.final_content,
        "### jira\nTicket template ready\n\n### github\nPR #42 fails on lint"
    );
}

#[tokio::test]
async fn test_model_drafted_plan_and_streamed_synthesis() {
    let model = ScriptedModel::new()
        .answer("1. [github] Find the failing pull request\n2. [jira] File a ticket for it")
        .answer("Ticket PROJ-7 filed for PR #42");
    let client = MockClient::new()
        .with_agent(
            "mock://github",
            MockAgent::new().content("PR #42 fails").finish(TaskState::Completed),
        )
        .with_agent(
            "mock://jira",
            MockAgent::new().content("Created PROJ-7").finish(TaskState::Completed),
        );
    let handle = orchestrator(&client)
        .with_model(Arc::new(model))
        .start(Request::new("Open a ticket based on the failing pull request"))
        .await
        .unwrap();

    let (items, report) = handle.collect().await.unwrap();
    assert_well_formed(&items);

    let github = client.agent("mock://github").unwrap().received();
    assert!(github[0].text.contains("Find the failing pull request"));
    assert_eq!(report.agents[0].agent_name, "github");

    let deltas: String = items
        .iter()
        .filter_map(|i| match &i.event {
            OutputEvent::SynthesisDelta { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    let result = report.result().unwrap();
    assert_eq!(deltas, "Ticket PROJ-7 filed for PR #42");
    assert_eq!(result.final_content, deltas);
    assert!(result.synthesized);
}

#[tokio::test]
async fn test_failed_step_skips_the_rest() {
    let client = MockClient::new()
        .with_agent("mock://jira", MockAgent::new().fail("HTTP 500"))
        .with_agent(
            "mock://github",
            MockAgent::new().content("unused").finish(TaskState::Completed),
        );
    let handle = orchestrator(&client)
        .start(Request::new("Open a ticket based on the failing pull request"))
        .await
        .unwrap();

    let (items, report) = handle.collect().await.unwrap();
    assert_well_formed(&items);
    assert_eq!(client.agent("mock://github").unwrap().open_count(), 0);

    let plan = report.plan.as_ref().unwrap();
    assert!(plan.items.iter().all(|i| i.status == TodoStatus::Failed));
    assert!(matches!(
        report.outcome,
        Err(OrchestrationError::AllAgentsFailed { .. })
    ));
}

#[tokio::test]
async fn test_cancel_ends_with_completed_result() {
    let client = MockClient::new()
        .with_agent(
            "mock://github",
            MockAgent::new().content("3 open PRs").finish(TaskState::Completed),
        )
        .with_agent("mock://jira", MockAgent::new().content("partial").hang());
    let orchestrator = orchestrator(&client);
    let handle = orchestrator
        .start(Request::new("List my open tickets and any pull requests waiting on me"))
        .await
        .unwrap();

    let token = handle.cancel_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
    });

    let (items, report) = handle.collect().await.unwrap();
    assert_well_formed(&items);
    let result = report.result().unwrap();
    assert!(result.cancelled);
    assert_eq!(report.agents[1].status, RunStatus::Cancelled);
    assert_eq!(report.agents[1].last_content, "partial");
}

#[tokio::test]
async fn test_ambiguous_request_asks_model_to_route() {
    let model = ScriptedModel::new().answer("jira");
    let client = MockClient::new().with_agent(
        "mock://jira",
        MockAgent::new().content("Nothing urgent").finish(TaskState::Completed),
    );
    let orchestrator = orchestrator(&client).with_model(Arc::new(model));

    let decision = orchestrator.route("What should I work on today?").await.unwrap();
    assert_eq!(decision.kind, RoutingKind::Direct);
    assert_eq!(decision.basis, RoutingBasis::Model);
    assert_eq!(decision.agent_names(), vec!["jira"]);

    let handle = orchestrator.start_with_decision(Request::new("What should I work on today?"), decision);
    let report = handle.join().await.unwrap();
    assert_eq!(report.result().unwrap().final_content, "Nothing urgent");
}

#[tokio::test]
async fn test_no_agents_fails_before_running() {
    let orchestrator = Orchestrator::new(
        AgentRegistry::new(vec![]).unwrap(),
        Arc::new(MockClient::new()),
        OrchestratorConfig::default(),
    );
    let result = orchestrator.start(Request::new("anything")).await;
    assert!(matches!(result, Err(Error::NoAgentsAvailable)));
}

#[tokio::test]
async fn test_context_id_reaches_every_agent() {
    let client = MockClient::new()
        .with_agent("mock://github", MockAgent::new().content("a").finish(TaskState::Completed))
        .with_agent("mock://jira", MockAgent::new().content("b").finish(TaskState::Completed));
    let request = Request::new("List my open tickets and any pull requests waiting on me")
        .with_context_id("thread-9");
    let report = orchestrator(&client)
        .start(request)
        .await
        .unwrap()
        .join()
        .await
        .unwrap();

    assert!(report.result().is_some());
    for endpoint in ["mock://github", "mock://jira"] {
        let received = client.agent(endpoint).unwrap().received();
        assert_eq!(received[0].context_id, "thread-9");
    }
}

#[tokio::test]
async fn test_caller_reaches_every_agent_as_metadata() {
    let client = MockClient::new()
        .with_agent("mock://github", MockAgent::new().content("a").finish(TaskState::Completed))
        .with_agent("mock://jira", MockAgent::new().content("b").finish(TaskState::Completed));
    let caller = CallerContext {
        user_id: Some("u-42".to_string()),
        channel: "slack".to_string(),
        metadata: [("team".to_string(), "platform".to_string())].into(),
    };
    let request = Request::new("List my open tickets and any pull requests waiting on me")
        .with_caller(caller);
    let report = orchestrator(&client)
        .start(request)
        .await
        .unwrap()
        .join()
        .await
        .unwrap();

    assert!(report.result().is_some());
    for endpoint in ["mock://github", "mock://jira"] {
        let received = client.agent(endpoint).unwrap().received();
        let body = received[0].to_jsonrpc();
        let metadata = &body["params"]["message"]["metadata"];
        assert_eq!(metadata["user_id"], "u-42");
        assert_eq!(metadata["channel"], "slack");
        assert_eq!(metadata["metadata"]["team"], "platform");
    }
}

#[tokio::test]
async fn test_anonymous_caller_sends_no_metadata() {
    let client = MockClient::new()
        .with_agent("mock://github", MockAgent::new().content("a").finish(TaskState::Completed));
    orchestrator(&client)
        .start(Request::new("Show me the open pull requests in the api repo"))
        .await
        .unwrap()
        .join()
        .await
        .unwrap();

    let received = client.agent("mock://github").unwrap().received();
    assert!(received[0].metadata.is_none());
    assert!(received[0].to_jsonrpc()["params"]["message"]
        .get("metadata")
        .is_none());
}
