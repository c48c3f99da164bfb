//! Error types for switchboard-core
//!
//! [`Error`] covers everything that can stop a request before or outside
//! an orchestration run. Failures of the run itself are reported as a single
//! [`OrchestrationError`] on the output channel.

use crate::plan::PlanId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// The registry is empty
    #[error("no agents available")]
    NoAgentsAvailable,

    /// Plan item transition rejected
    #[error("invalid transition for plan item {index}: {reason}")]
    InvalidTransition {
        /// Item index
        index: usize,
        /// Why the transition was rejected
        reason: String,
    },

    /// Unknown plan ID
    #[error("plan not found: {0}")]
    PlanNotFound(PlanId),

    /// Invalid configuration or agent registry
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The orchestration run failed as a whole
    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),

    /// LLM provider error
    #[error("llm error: {0}")]
    Llm(#[from] switchboard_llm::Error),

    /// Protocol error
    #[error("protocol error: {0}")]
    Protocol(#[from] switchboard_a2a::Error),

    /// Internal error (task join failures and the like)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// One agent that did not contribute because it failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentFailure {
    /// Agent name
    pub agent: String,
    /// Failure description
    pub message: String,
}

impl std::fmt::Display for AgentFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.agent, self.message)
    }
}

/// Terminal failure of an orchestration run, emitted at most once.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrchestrationError {
    /// Every dispatched agent failed
    #[error("all {} agents failed: {}", .failures.len(), join_failures(.failures))]
    AllAgentsFailed {
        /// Per-agent failures in dispatch order
        failures: Vec<AgentFailure>,
    },

    /// The run could not be carried out
    #[error("orchestration aborted: {message}")]
    Aborted {
        /// Description
        message: String,
    },
}

fn join_failures(failures: &[AgentFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Trait for user-friendly error messages
///
/// Provides human-readable error messages and suggestions for fixing.
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get a suggestion for how to fix the error
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for Error {
    fn user_message(&self) -> String {
        match self {
            Error::NoAgentsAvailable => "🤷 No specialist agents are registered.".to_string(),
            Error::InvalidTransition { index, reason } => {
                format!("📋 Plan item {} cannot change: {}", index + 1, reason)
            }
            Error::PlanNotFound(id) => format!("📋 Plan {} does not exist.", id),
            Error::Configuration(msg) => format!("⚙️ Configuration error: {}", msg),
            Error::Orchestration(e) => e.user_message(),
            Error::Llm(e) => format!("🤖 Language model error: {}", e),
            Error::Protocol(e) => format!("🌐 Agent communication error: {}", e),
            Error::Internal(_) => "❌ An internal error occurred.".to_string(),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            Error::NoAgentsAvailable => {
                Some("Add at least one [[agents]] entry to your configuration.".to_string())
            }
            Error::Configuration(_) => {
                Some("Check that agent names are unique and endpoints are set.".to_string())
            }
            Error::Orchestration(e) => e.suggestion(),
            Error::Llm(_) => Some("Check the [llm] section and your API key.".to_string()),
            Error::Protocol(_) => Some("Check that the agent endpoints are reachable.".to_string()),
            _ => None,
        }
    }
}

impl UserFriendlyError for OrchestrationError {
    fn user_message(&self) -> String {
        match self {
            OrchestrationError::AllAgentsFailed { failures } => {
                format!("⚡ None of the {} agents could answer.", failures.len())
            }
            OrchestrationError::Aborted { message } => format!("⚡ Request aborted: {}", message),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            OrchestrationError::AllAgentsFailed { .. } => Some(
                "Run `switchboard agents` and check that the listed endpoints are up.".to_string(),
            ),
            OrchestrationError::Aborted { .. } => None,
        }
    }
}
