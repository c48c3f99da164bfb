//! Request and routing types

use crate::registry::AgentDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Who is asking, forwarded to agents as message metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallerContext {
    /// Caller user ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Channel the request came from (cli, http, ...)
    #[serde(default)]
    pub channel: String,
    /// Free-form metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl CallerContext {
    /// Metadata sent with every agent message, `None` for an anonymous caller
    pub fn to_metadata(&self) -> Option<Value> {
        if *self == Self::default() {
            return None;
        }
        serde_json::to_value(self).ok()
    }
}

/// A user request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID
    pub id: Uuid,
    /// Request text
    pub text: String,
    /// Conversation context shared with every agent of this request
    pub context_id: String,
    /// Caller identity context
    #[serde(default)]
    pub caller: CallerContext,
}

impl Request {
    /// Create a request with a fresh context
    pub fn new(text: impl Into<String>) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            text: text.into(),
            context_id: id.to_string(),
            caller: CallerContext::default(),
        }
    }

    /// Continue an existing conversation context
    #[must_use]
    pub fn with_context_id(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = context_id.into();
        self
    }

    /// Attach caller identity
    #[must_use]
    pub fn with_caller(mut self, caller: CallerContext) -> Self {
        self.caller = caller;
        self
    }
}

/// Routing strategy for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoutingKind {
    /// One agent, streamed straight through
    Direct,
    /// Several independent agents at once
    Parallel,
    /// Multi-step work driven by a plan
    Complex,
}

impl std::fmt::Display for RoutingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoutingKind::Direct => write!(f, "DIRECT"),
            RoutingKind::Parallel => write!(f, "PARALLEL"),
            RoutingKind::Complex => write!(f, "COMPLEX"),
        }
    }
}

/// What produced a routing decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingBasis {
    /// The request named agents explicitly
    ExplicitMention,
    /// Knowledge-base vocabulary sent it to a retrieval agent
    KnowledgeBase,
    /// Declared skills matched the request
    SkillMatch,
    /// The request chains steps that depend on each other
    Dependency,
    /// Nothing matched; every agent is a candidate
    Ambiguous,
    /// The language model picked the agents
    Model,
}

/// Routing decision.
///
/// `Direct` always carries exactly one agent and `Parallel` at least two.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Strategy
    pub kind: RoutingKind,
    /// Selected agents (candidates for `Complex`)
    pub agents: Vec<AgentDescriptor>,
    /// Human-readable explanation
    pub rationale: String,
    /// What produced the decision
    pub basis: RoutingBasis,
}

impl RoutingDecision {
    /// Build a decision, keeping the agent-count rule for each kind.
    ///
    /// A `Parallel` request for a single agent degrades to `Direct`.
    pub fn new(
        kind: RoutingKind,
        mut agents: Vec<AgentDescriptor>,
        basis: RoutingBasis,
        rationale: impl Into<String>,
    ) -> Self {
        let kind = match (kind, agents.len()) {
            (RoutingKind::Parallel, 1) => RoutingKind::Direct,
            (RoutingKind::Direct, n) if n > 1 => {
                agents.truncate(1);
                RoutingKind::Direct
            }
            (kind, _) => kind,
        };
        Self {
            kind,
            agents,
            rationale: rationale.into(),
            basis,
        }
    }

    /// Names of the selected agents
    pub fn agent_names(&self) -> Vec<&str> {
        self.agents.iter().map(|a| a.name.as_str()).collect()
    }
}
