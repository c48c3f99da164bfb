//! Response synthesizer
//!
//! Turns the terminal states of every dispatched agent into one result.
//! Priority, highest first:
//! 1. structured data from any agent, verbatim
//! 2. several agents with content: an attributed composition
//! 3. one agent with content: its content, verbatim
//!
//! If every agent failed the result is a single [`OrchestrationError`].

use crate::error::{AgentFailure, OrchestrationError};
use crate::executor::AgentRunState;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;
use std::sync::Arc;
use switchboard_llm::LanguageModel;
use tracing::{debug, info, warn};

/// How composed answers attribute content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionStyle {
    /// One `### agent` heading per agent
    #[default]
    Headings,
    /// `[agent]` prefix per agent
    Inline,
}

fn default_use_model() -> bool {
    true
}

/// Synthesizer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizerConfig {
    /// Merge several answers with the language model when one is available
    #[serde(default = "default_use_model")]
    pub use_model: bool,
    /// Attribution used by the deterministic composition
    #[serde(default)]
    pub attribution: AttributionStyle,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            use_model: default_use_model(),
            attribution: AttributionStyle::default(),
        }
    }
}

/// Final result of an orchestration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationResult {
    /// Answer text
    pub final_content: String,
    /// Structured data surfaced verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_data_fragment: Option<Value>,
    /// Agents that contributed content or data
    pub contributing_agent_count: usize,
    /// Agents that failed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_agents: Vec<AgentFailure>,
    /// Whether the answer was composed from several agents
    #[serde(default)]
    pub synthesized: bool,
    /// Whether the run was cancelled
    #[serde(default)]
    pub cancelled: bool,
}

/// Response synthesizer
#[derive(Clone, Default)]
pub struct Synthesizer {
    config: SynthesizerConfig,
    model: Option<Arc<dyn LanguageModel>>,
}

impl std::fmt::Debug for Synthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synthesizer")
            .field("config", &self.config)
            .field("model", &self.model.is_some())
            .finish()
    }
}

impl Synthesizer {
    /// Create a synthesizer without a language model
    #[must_use]
    pub fn new(config: SynthesizerConfig) -> Self {
        Self {
            config,
            model: None,
        }
    }

    /// Use `model` to compose multi-agent answers
    #[must_use]
    pub fn with_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Synthesize a result from terminal agent states.
    pub async fn synthesize(
        &self,
        request: &str,
        states: &[AgentRunState],
    ) -> Result<OrchestrationResult, OrchestrationError> {
        self.synthesize_streaming(request, states, |_| {}).await
    }

    /// Like [`Synthesizer::synthesize`], reporting composed text chunks to
    /// `on_delta`.
    ///
    /// Chunks are reported only once the model has finished composing, so
    /// every reported chunk is part of `final_content`. A composition that
    /// fails partway reports nothing and falls back to attributed text.
    pub async fn synthesize_streaming<F>(
        &self,
        request: &str,
        states: &[AgentRunState],
        mut on_delta: F,
    ) -> Result<OrchestrationResult, OrchestrationError>
    where
        F: FnMut(&str) + Send,
    {
        let failed_agents: Vec<AgentFailure> = states
            .iter()
            .filter_map(|s| {
                s.failure().map(|reason| AgentFailure {
                    agent: s.agent_name.clone(),
                    message: reason.to_string(),
                })
            })
            .collect();

        if !states.is_empty() && failed_agents.len() == states.len() {
            warn!(agents = states.len(), "Every agent failed");
            return Err(OrchestrationError::AllAgentsFailed {
                failures: failed_agents,
            });
        }

        let contributors: Vec<&AgentRunState> =
            states.iter().filter(|s| s.has_contribution()).collect();
        let contributing_agent_count = contributors.len();

        if let Some(state) = contributors
            .iter()
            .find(|s| s.contributed_data_fragment.is_some())
        {
            info!(agent = %state.agent_name, "Surfacing structured data verbatim");
            return Ok(OrchestrationResult {
                final_content: state.last_content.clone(),
                final_data_fragment: state.contributed_data_fragment.clone(),
                contributing_agent_count,
                failed_agents,
                ..OrchestrationResult::default()
            });
        }

        let with_content: Vec<&AgentRunState> = contributors
            .into_iter()
            .filter(|s| !s.last_content.trim().is_empty())
            .collect();

        let (final_content, synthesized) = match with_content.as_slice() {
            [] => (failure_note(&failed_agents).unwrap_or_default(), false),
            [single] => {
                debug!(agent = %single.agent_name, "Passing single answer through");
                (single.last_content.clone(), false)
            }
            several => {
                let mut text = self.compose(request, several, &mut on_delta).await;
                if let Some(note) = failure_note(&failed_agents) {
                    text.push_str("\n\n");
                    text.push_str(&note);
                }
                (text, true)
            }
        };

        Ok(OrchestrationResult {
            final_content,
            final_data_fragment: None,
            contributing_agent_count,
            failed_agents,
            synthesized,
            cancelled: false,
        })
    }

    async fn compose<F>(&self, request: &str, parts: &[&AgentRunState], on_delta: &mut F) -> String
    where
        F: FnMut(&str) + Send,
    {
        if let (true, Some(model)) = (self.config.use_model, self.model.as_ref()) {
            match compose_with_model(model.as_ref(), request, parts, on_delta).await {
                Ok(text) if !text.trim().is_empty() => {
                    info!(agents = parts.len(), "Composed answer with language model");
                    return text;
                }
                Ok(_) => warn!("Language model returned an empty composition"),
                Err(e) => warn!(error = %e, "Language model composition failed"),
            }
        }
        debug!(agents = parts.len(), "Composing answer without language model");
        attributed(parts, self.config.attribution)
    }
}

async fn compose_with_model<F>(
    model: &dyn LanguageModel,
    request: &str,
    parts: &[&AgentRunState],
    on_delta: &mut F,
) -> switchboard_llm::Result<String>
where
    F: FnMut(&str) + Send,
{
    let mut stream = model.generate_stream(&composition_prompt(request, parts)).await?;
    let mut chunks = Vec::new();
    while let Some(chunk) = stream.next().await {
        chunks.push(chunk?);
    }
    let text = chunks.concat();
    if !text.trim().is_empty() {
        for chunk in &chunks {
            on_delta(chunk);
        }
    }
    Ok(text)
}

fn composition_prompt(request: &str, parts: &[&AgentRunState]) -> String {
    let mut prompt = String::from(
        "Several specialist agents answered parts of the user's request.\n\
         Combine their answers into one reply. Keep every fact, number, \
         identifier and link; do not summarize them away. Say which agent \
         each part came from.\n\n",
    );
    let _ = writeln!(prompt, "User request:\n{request}\n");
    for part in parts {
        let _ = writeln!(
            prompt,
            "### Answer from {}\n{}\n",
            part.agent_name,
            part.last_content.trim()
        );
    }
    prompt
}

fn attributed(parts: &[&AgentRunState], style: AttributionStyle) -> String {
    parts
        .iter()
        .map(|p| match style {
            AttributionStyle::Headings => {
                format!("### {}\n{}", p.agent_name, p.last_content.trim())
            }
            AttributionStyle::Inline => format!("[{}] {}", p.agent_name, p.last_content.trim()),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn failure_note(failures: &[AgentFailure]) -> Option<String> {
    if failures.is_empty() {
        return None;
    }
    let listed = failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    Some(format!("Note: no answer from {listed}."))
}

#[cfg(test)]
mod tests;
