use super::*;
use crate::executor::RunStatus;
use futures::stream;
use serde_json::json;
use switchboard_a2a::{AgentEvent, TaskState};
use switchboard_llm::MockLanguageModel;

fn answered(agent: &str, text: &str) -> AgentRunState {
    let mut state = AgentRunState::new(agent);
    state.apply(&AgentEvent::ContentFragment {
        text: text.to_string(),
        append: true,
    });
    state.apply(&AgentEvent::finished(TaskState::Completed));
    state
}

fn failed(agent: &str, message: &str) -> AgentRunState {
    let mut state = AgentRunState::new(agent);
    state.apply(&AgentEvent::error(message));
    state
}

fn untouched_model() -> Arc<dyn LanguageModel> {
    let mut model = MockLanguageModel::new();
    model.expect_generate().times(0);
    model.expect_generate_stream().times(0);
    Arc::new(model)
}

#[tokio::test]
async fn test_single_agent_passes_through_verbatim() {
    let synthesizer = Synthesizer::default().with_model(untouched_model());
    let mut state = AgentRunState::new("github");
    for chunk in ["Hel", "lo"] {
        state.apply(&AgentEvent::ContentFragment {
            text: chunk.to_string(),
            append: true,
        });
    }
    state.apply(&AgentEvent::finished(TaskState::Completed));

    let result = synthesizer.synthesize("greet me", &[state]).await.unwrap();
    assert_eq!(result.final_content, "Hello");
    assert_eq!(result.contributing_agent_count, 1);
    assert!(!result.synthesized);
    assert!(result.failed_agents.is_empty());
}

#[tokio::test]
async fn test_data_fragment_wins_regardless_of_order() {
    let form = json!({"type": "form", "fields": [{"name": "project", "required": true}]});
    let mut with_data = AgentRunState::new("forms");
    with_data.apply(&AgentEvent::DataFragment {
        payload: form.clone(),
    });
    with_data.apply(&AgentEvent::finished(TaskState::InputRequired));

    let synthesizer = Synthesizer::default().with_model(untouched_model());
    for states in [
        vec![answered("github", "prose"), with_data.clone()],
        vec![with_data.clone(), answered("github", "prose")],
    ] {
        let result = synthesizer.synthesize("file a bug", &states).await.unwrap();
        assert_eq!(result.final_data_fragment, Some(form.clone()));
        assert_eq!(result.contributing_agent_count, 2);
        assert!(!result.synthesized);
    }
}

#[tokio::test]
async fn test_several_answers_composed_by_model() {
    let mut model = MockLanguageModel::new();
    model
        .expect_generate_stream()
        .withf(|prompt: &str| {
            prompt.contains("### Answer from github\n3 open PRs")
                && prompt.contains("### Answer from jira\n2 tickets")
        })
        .times(1)
        .returning(|_| {
            let chunks = vec![Ok("GitHub: 3 open PRs. ".to_string()), Ok("Jira: 2 tickets.".to_string())];
            Ok(stream::iter(chunks).boxed())
        });

    let synthesizer = Synthesizer::default().with_model(Arc::new(model));
    let mut deltas = Vec::new();
    let result = synthesizer
        .synthesize_streaming(
            "status?",
            &[answered("github", "3 open PRs"), answered("jira", "2 tickets")],
            |d| deltas.push(d.to_string()),
        )
        .await
        .unwrap();

    assert_eq!(result.final_content, "GitHub: 3 open PRs. Jira: 2 tickets.");
    assert_eq!(deltas.len(), 2);
    assert!(result.synthesized);
    assert_eq!(result.contributing_agent_count, 2);
}

#[tokio::test]
async fn test_model_failure_falls_back_to_attributed_text() {
    let mut model = MockLanguageModel::new();
    model
        .expect_generate_stream()
        .returning(|_| Err(switchboard_llm::Error::RateLimit));

    let synthesizer = Synthesizer::default().with_model(Arc::new(model));
    let result = synthesizer
        .synthesize(
            "status?",
            &[answered("github", "3 open PRs"), answered("jira", "2 tickets")],
        )
        .await
        .unwrap();

    assert_eq!(
        result.final_content,
        "### github\n3 open PRs\n\n### jira\n2 tickets"
    );
    assert!(result.synthesized);
}

#[tokio::test]
async fn test_model_failing_midstream_reports_no_deltas() {
    let mut model = MockLanguageModel::new();
    model.expect_generate_stream().times(1).returning(|_| {
        let chunks = vec![
            Ok("github has ".to_string()),
            Ok("3 open".to_string()),
            Err(switchboard_llm::Error::Network("connection reset".to_string())),
        ];
        Ok(stream::iter(chunks).boxed())
    });

    let synthesizer = Synthesizer::default().with_model(Arc::new(model));
    let mut deltas = Vec::new();
    let result = synthesizer
        .synthesize_streaming(
            "status?",
            &[answered("github", "3 open PRs"), answered("jira", "2 tickets")],
            |d| deltas.push(d.to_string()),
        )
        .await
        .unwrap();

    assert!(deltas.is_empty());
    assert_eq!(
        result.final_content,
        "### github\n3 open PRs\n\n### jira\n2 tickets"
    );
    assert!(result.synthesized);
}

#[tokio::test]
async fn test_reported_deltas_prefix_final_content() {
    let mut model = MockLanguageModel::new();
    model.expect_generate_stream().returning(|_| {
        let chunks = vec![Ok("Both ".to_string()), Ok("answered.".to_string())];
        Ok(stream::iter(chunks).boxed())
    });

    let synthesizer = Synthesizer::default().with_model(Arc::new(model));
    let mut deltas = String::new();
    let result = synthesizer
        .synthesize_streaming(
            "status?",
            &[
                answered("github", "3 open PRs"),
                answered("jira", "2 tickets"),
                failed("kb", "HTTP 503"),
            ],
            |d| deltas.push_str(d),
        )
        .await
        .unwrap();

    assert_eq!(deltas, "Both answered.");
    assert!(result.final_content.starts_with(&deltas));
    assert!(result.final_content.contains("kb"));
}

#[tokio::test]
async fn test_inline_attribution_without_model() {
    let synthesizer = Synthesizer::new(SynthesizerConfig {
        use_model: false,
        attribution: AttributionStyle::Inline,
    })
    .with_model(untouched_model());

    let result = synthesizer
        .synthesize("q", &[answered("a", "one"), answered("b", "two")])
        .await
        .unwrap();
    assert_eq!(result.final_content, "[a] one\n\n[b] two");
}

#[tokio::test]
async fn test_partial_failure_is_noted() {
    let synthesizer = Synthesizer::default();
    let result = synthesizer
        .synthesize(
            "status?",
            &[
                answered("github", "3 open PRs"),
                failed("jira", "deadline exceeded"),
                answered("kb", "see runbook"),
            ],
        )
        .await
        .unwrap();

    assert_eq!(result.contributing_agent_count, 2);
    assert_eq!(result.failed_agents.len(), 1);
    assert_eq!(result.failed_agents[0].agent, "jira");
    assert!(result.final_content.contains("3 open PRs"));
    assert!(result.final_content.contains("see runbook"));
    assert!(result
        .final_content
        .ends_with("Note: no answer from jira (deadline exceeded)."));
}

#[tokio::test]
async fn test_all_failed_is_one_error() {
    let synthesizer = Synthesizer::default().with_model(untouched_model());
    let err = synthesizer
        .synthesize(
            "status?",
            &[failed("github", "503"), failed("jira", "connection refused")],
        )
        .await
        .unwrap_err();

    match err {
        OrchestrationError::AllAgentsFailed { failures } => {
            assert_eq!(failures.len(), 2);
            assert_eq!(failures[0].agent, "github");
            assert_eq!(failures[1].agent, "jira");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_cancelled_partial_content_still_counts() {
    let mut slow = AgentRunState::new("slow");
    slow.apply(&AgentEvent::ContentFragment {
        text: "half an answer".into(),
        append: true,
    });
    slow.mark_terminal(RunStatus::Cancelled);

    let synthesizer = Synthesizer::default();
    let result = synthesizer
        .synthesize("q", &[slow, failed("other", "boom")])
        .await
        .unwrap();
    assert_eq!(result.final_content, "half an answer");
    assert_eq!(result.contributing_agent_count, 1);
}

#[tokio::test]
async fn test_nothing_contributed_is_empty_not_error() {
    let mut quiet = AgentRunState::new("quiet");
    quiet.apply(&AgentEvent::finished(TaskState::Completed));

    let result = Synthesizer::default().synthesize("q", &[quiet]).await.unwrap();
    assert_eq!(result.final_content, "");
    assert_eq!(result.contributing_agent_count, 0);
}
