//! Agent registry
//!
//! Agents are kept in registration order; that order is the final
//! tie-break for routing and the dispatch order for fan-out.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

fn default_streaming() -> bool {
    true
}

/// A remote specialist agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    /// Unique name
    pub name: String,
    /// Protocol endpoint
    pub endpoint: String,
    /// What the agent is for
    #[serde(default)]
    pub description: String,
    /// Declared skills, matched against request text
    #[serde(default, alias = "skills")]
    pub declared_skills: Vec<String>,
    /// Whether the agent streams partial results
    #[serde(default = "default_streaming")]
    pub supports_streaming: bool,
}

impl AgentDescriptor {
    /// Create a descriptor without skills
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            description: String::new(),
            declared_skills: Vec::new(),
            supports_streaming: true,
        }
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add declared skills
    #[must_use]
    pub fn with_skills<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.declared_skills.extend(skills.into_iter().map(Into::into));
        self
    }

    /// Name normalized for comparisons
    pub fn normalized_name(&self) -> String {
        normalize_phrase(&self.name)
    }
}

/// Lowercase, turn `_`/`-` into spaces and collapse whitespace.
pub fn normalize_phrase(raw: &str) -> String {
    raw.to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Registered agents in registration order.
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    agents: Vec<AgentDescriptor>,
}

impl AgentRegistry {
    /// Build a registry, rejecting duplicate names and empty endpoints
    pub fn new(agents: Vec<AgentDescriptor>) -> Result<Self> {
        let mut seen = HashSet::new();
        for agent in &agents {
            if agent.name.trim().is_empty() {
                return Err(Error::Configuration("agent name must not be empty".into()));
            }
            if agent.endpoint.trim().is_empty() {
                return Err(Error::Configuration(format!(
                    "agent '{}' has no endpoint",
                    agent.name
                )));
            }
            if !seen.insert(agent.normalized_name()) {
                return Err(Error::Configuration(format!(
                    "duplicate agent name '{}'",
                    agent.name
                )));
            }
        }
        Ok(Self { agents })
    }

    /// Look up an agent by (normalized) name
    pub fn get(&self, name: &str) -> Option<&AgentDescriptor> {
        let wanted = normalize_phrase(name);
        self.agents.iter().find(|a| a.normalized_name() == wanted)
    }

    /// All agents in registration order
    pub fn agents(&self) -> &[AgentDescriptor] {
        &self.agents
    }

    /// Number of agents
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
