//! Per-agent run state
//!
//! One [`AgentRunState`] exists per dispatched agent. Only the coordinator
//! writes to it; `terminal` flips from false to true exactly once.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use switchboard_a2a::{AgentEvent, TaskState};

/// Lifecycle of one agent within an orchestration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// Still streaming
    Running,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed {
        /// Failure description
        reason: String,
    },
    /// Stopped by cancellation
    Cancelled,
}

/// What applying an event did to the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// New information; forward it
    Forward,
    /// Same as what the state already holds
    Duplicate,
    /// Arrived after the terminal event
    Ignored,
    /// The agent reached its terminal state
    Terminal,
}

/// State of one dispatched agent
#[derive(Debug, Clone, Serialize)]
pub struct AgentRunState {
    /// Agent name
    pub agent_name: String,
    /// Whether the agent reached a terminal state
    pub terminal: bool,
    /// Lifecycle status
    #[serde(flatten)]
    pub status: RunStatus,
    /// Final protocol state reported by the agent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_state: Option<TaskState>,
    /// Content accumulated so far
    pub last_content: String,
    /// Latest structured data payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contributed_data_fragment: Option<Value>,
    /// Events applied
    pub events_received: u64,
    /// Dispatch time
    pub started_at: DateTime<Utc>,
    /// Terminal time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl AgentRunState {
    /// State for a freshly dispatched agent
    pub fn new(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            terminal: false,
            status: RunStatus::Running,
            final_state: None,
            last_content: String::new(),
            contributed_data_fragment: None,
            events_received: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Fold one event into the state.
    pub fn apply(&mut self, event: &AgentEvent) -> Applied {
        if self.terminal {
            return Applied::Ignored;
        }
        self.events_received += 1;

        match event {
            AgentEvent::ContentFragment { text, append: true } => {
                if text.is_empty() {
                    return Applied::Duplicate;
                }
                self.last_content.push_str(text);
                Applied::Forward
            }
            AgentEvent::ContentFragment { text, append: false } => {
                if *text == self.last_content {
                    return Applied::Duplicate;
                }
                self.last_content.clone_from(text);
                Applied::Forward
            }
            AgentEvent::DataFragment { payload } => {
                if self.contributed_data_fragment.as_ref() == Some(payload) {
                    return Applied::Duplicate;
                }
                self.contributed_data_fragment = Some(payload.clone());
                Applied::Forward
            }
            AgentEvent::StatusUpdate {
                is_final: false, ..
            } => Applied::Forward,
            AgentEvent::StatusUpdate {
                state,
                is_final: true,
                message,
            } => {
                self.final_state = Some(state.clone());
                let status = if state.is_unsuccessful() {
                    RunStatus::Failed {
                        reason: message
                            .clone()
                            .unwrap_or_else(|| format!("agent reported {state}")),
                    }
                } else {
                    if let Some(message) = message.as_ref().filter(|m| !m.trim().is_empty()) {
                        if self.last_content.is_empty() {
                            self.last_content.clone_from(message);
                        }
                    }
                    RunStatus::Completed
                };
                self.mark_terminal(status);
                Applied::Terminal
            }
            AgentEvent::Error { message } => {
                self.mark_terminal(RunStatus::Failed {
                    reason: message.clone(),
                });
                Applied::Terminal
            }
            AgentEvent::Unknown { payload, .. } => {
                self.last_content
                    .push_str(&AgentEvent::passthrough_text(payload));
                Applied::Forward
            }
        }
    }

    /// Move to a terminal status. Returns false if already terminal.
    pub fn mark_terminal(&mut self, status: RunStatus) -> bool {
        if self.terminal {
            return false;
        }
        self.terminal = true;
        self.status = status;
        self.finished_at = Some(Utc::now());
        true
    }

    /// Whether the agent finished successfully
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Failure description, if the agent failed
    pub fn failure(&self) -> Option<&str> {
        match &self.status {
            RunStatus::Failed { reason } => Some(reason.as_str()),
            _ => None,
        }
    }

    /// Whether the agent produced anything usable
    pub fn has_contribution(&self) -> bool {
        self.failure().is_none()
            && (!self.last_content.trim().is_empty() || self.contributed_data_fragment.is_some())
    }
}
