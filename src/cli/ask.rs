//! `switchboard ask`
//!
//! Streams the output channel to stdout. Ctrl-C cancels the orchestration;
//! the final result is still printed.

use anyhow::Result;
use std::io::Write;
use switchboard_core::{
    OrchestrationResult, Orchestrator, OutputEnvelope, OutputEvent, Request, UserFriendlyError,
};
use tracing::{debug, info};

/// What has already reached the terminal, so the final answer is not printed twice
#[derive(Debug, Default)]
struct Printed {
    /// Agent content streamed straight through
    streamed: String,
    /// Synthesized answer chunks
    composed: String,
    /// Attributed per-agent blocks
    agent_outputs: usize,
}

impl Printed {
    /// Whether `result`'s answer text is already on screen
    fn shows(&self, result: &OrchestrationResult) -> bool {
        let content = result.final_content.trim();
        if content.is_empty() {
            return true;
        }
        if !self.composed.is_empty() {
            return content.starts_with(self.composed.trim());
        }
        if self.agent_outputs > 0 {
            // composed without a model from the blocks already shown
            return true;
        }
        content == self.streamed.trim()
    }
}

pub async fn run(
    orchestrator: &Orchestrator,
    text: &str,
    context_id: Option<String>,
    json: bool,
) -> Result<()> {
    let mut request = Request::new(text);
    if let Some(context_id) = context_id {
        request = request.with_context_id(context_id);
    }

    let mut handle = match orchestrator.start(request).await {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("{}", e.user_message());
            if let Some(hint) = e.suggestion() {
                eprintln!("💡 {hint}");
            }
            anyhow::bail!(e);
        }
    };

    let cancel = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, cancelling");
            cancel.cancel();
        }
    });

    let mut printed = Printed::default();
    let mut failure = None;
    while let Some(item) = handle.next_event().await {
        if json {
            println!("{}", serde_json::to_string(&item)?);
        } else {
            render(&item, &mut printed)?;
        }
        if let OutputEvent::Failed { error } = item.event {
            failure = Some(error);
        }
    }

    let report = handle.join().await?;
    debug!(agents = report.agents.len(), "Orchestration report received");

    match failure {
        Some(error) => {
            if !json {
                eprintln!("{}", error.user_message());
                if let Some(hint) = error.suggestion() {
                    eprintln!("💡 {hint}");
                }
            }
            anyhow::bail!(error)
        }
        None => Ok(()),
    }
}

fn render(item: &OutputEnvelope, printed: &mut Printed) -> Result<()> {
    let mut out = std::io::stdout().lock();
    match &item.event {
        OutputEvent::Started { .. } | OutputEvent::Failed { .. } => {}
        OutputEvent::Routed {
            kind,
            agents,
            rationale,
        } => writeln!(out, "🧭 {kind} → {} ({rationale})", agents.join(", "))?,
        OutputEvent::Status { state, .. } => {
            if let Some(origin) = &item.origin {
                debug!(agent = %origin.agent, state = %state, "Agent status");
            }
        }
        OutputEvent::Content { text, append } => {
            if !append {
                writeln!(out)?;
                printed.streamed.clear();
            }
            write!(out, "{text}")?;
            out.flush()?;
            printed.streamed.push_str(text);
        }
        OutputEvent::Data { payload } => {
            writeln!(out, "{}", serde_json::to_string_pretty(payload)?)?;
        }
        OutputEvent::AgentOutput { content } => {
            let agent = item.origin.as_ref().map_or("agent", |o| o.agent.as_str());
            writeln!(out, "\n── {agent} ──\n{}", content.trim())?;
            printed.agent_outputs += 1;
        }
        OutputEvent::Plan { plan } => writeln!(out, "\n{}", plan.rendered)?,
        OutputEvent::SynthesisDelta { text } => {
            if printed.composed.is_empty() {
                writeln!(out)?;
            }
            write!(out, "{text}")?;
            out.flush()?;
            printed.composed.push_str(text);
        }
        OutputEvent::Completed { result } => render_result(&mut out, result, printed)?,
    }
    Ok(())
}

fn render_result(
    out: &mut impl Write,
    result: &OrchestrationResult,
    printed: &Printed,
) -> Result<()> {
    if printed.shows(result) {
        writeln!(out)?;
    } else {
        writeln!(out, "\n{}", result.final_content.trim())?;
    }
    if !result.failed_agents.is_empty() {
        let names: Vec<String> = result.failed_agents.iter().map(ToString::to_string).collect();
        writeln!(out, "⚠️  No answer from {}", names.join(", "))?;
    }
    if result.cancelled {
        writeln!(out, "⏹  Cancelled")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(result: &OrchestrationResult, printed: &Printed) -> String {
        let mut out = Vec::new();
        render_result(&mut out, result, printed).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn result(final_content: &str) -> OrchestrationResult {
        OrchestrationResult {
            final_content: final_content.to_string(),
            synthesized: true,
            ..OrchestrationResult::default()
        }
    }

    #[test]
    fn test_streamed_answer_not_repeated() {
        let printed = Printed {
            streamed: "Hello".into(),
            ..Printed::default()
        };
        assert_eq!(rendered(&result("Hello"), &printed), "\n");
    }

    #[test]
    fn test_agent_blocks_not_repeated_in_attributed_answer() {
        let printed = Printed {
            agent_outputs: 2,
            ..Printed::default()
        };
        let output = rendered(&result("### github\n3 open PRs\n\n### jira\n2 tickets"), &printed);
        assert!(!output.contains("3 open PRs"));
    }

    #[test]
    fn test_answer_printed_when_deltas_differ() {
        let printed = Printed {
            composed: "github has 3 open".into(),
            agent_outputs: 2,
            ..Printed::default()
        };
        let output = rendered(&result("### github\n3 open PRs\n\n### jira\n2 tickets"), &printed);
        assert!(output.contains("### jira\n2 tickets"));
    }

    #[test]
    fn test_unseen_answer_printed_with_notes() {
        let mut answer = result("2 PRs open");
        answer.cancelled = true;
        let output = rendered(&answer, &Printed::default());
        assert!(output.contains("2 PRs open"));
        assert!(output.contains("Cancelled"));
    }
}
