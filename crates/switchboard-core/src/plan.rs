//! Execution plan tracker
//!
//! A plan is an ordered todo list for one multi-agent request. Items move
//! `pending -> in_progress -> completed | failed`; terminal items never
//! change again. When a run ends, [`PlanTracker::ensure_completed`] closes
//! whatever is still open using the outcome each owning agent reported.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;
use tracing::{debug, warn};
use uuid::Uuid;

/// Plan identifier
pub type PlanId = Uuid;

/// Status of one plan item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    /// Not started
    Pending,
    /// Running
    InProgress,
    /// Finished successfully
    Completed,
    /// Finished unsuccessfully
    Failed,
}

impl TodoStatus {
    /// Whether the status can no longer change
    pub fn is_terminal(self) -> bool {
        matches!(self, TodoStatus::Completed | TodoStatus::Failed)
    }

    fn marker(self) -> &'static str {
        match self {
            TodoStatus::Pending => "[ ]",
            TodoStatus::InProgress => "[~]",
            TodoStatus::Completed => "[x]",
            TodoStatus::Failed => "[!]",
        }
    }
}

impl std::fmt::Display for TodoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TodoStatus::Pending => "pending",
            TodoStatus::InProgress => "in_progress",
            TodoStatus::Completed => "completed",
            TodoStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One plan item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoItem {
    /// Position in the plan, from 0
    pub index: usize,
    /// What the item does
    pub description: String,
    /// Status
    pub status: TodoStatus,
    /// Agent responsible for the item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owning_agent: Option<String>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

/// Input for a new plan item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoDraft {
    /// Description
    pub description: String,
    /// Owning agent
    pub owning_agent: Option<String>,
}

impl TodoDraft {
    /// An item owned by `agent`
    pub fn owned(description: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            owning_agent: Some(agent.into()),
        }
    }
}

impl From<&str> for TodoDraft {
    fn from(description: &str) -> Self {
        Self {
            description: description.to_string(),
            owning_agent: None,
        }
    }
}

impl From<String> for TodoDraft {
    fn from(description: String) -> Self {
        Self {
            description,
            owning_agent: None,
        }
    }
}

/// Snapshot of a plan, as sent to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanView {
    /// Plan ID
    pub plan_id: PlanId,
    /// Items in index order
    pub items: Vec<TodoItem>,
    /// Number of completed items
    pub completed: usize,
    /// Total number of items
    pub total: usize,
    /// Rendered text
    pub rendered: String,
}

/// Tracks every live plan and the outcomes agents reported.
#[derive(Debug, Default)]
pub struct PlanTracker {
    plans: HashMap<PlanId, Vec<TodoItem>>,
    agent_outcomes: HashMap<String, bool>,
}

impl PlanTracker {
    /// Create an empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a plan; every item starts `pending`.
    pub fn create_plan<I, D>(&mut self, items: I) -> PlanId
    where
        I: IntoIterator<Item = D>,
        D: Into<TodoDraft>,
    {
        let now = Utc::now();
        let items: Vec<TodoItem> = items
            .into_iter()
            .map(Into::into)
            .enumerate()
            .map(|(index, draft)| TodoItem {
                index,
                description: draft.description,
                status: TodoStatus::Pending,
                owning_agent: draft.owning_agent,
                updated_at: now,
            })
            .collect();

        let id = Uuid::new_v4();
        debug!(plan_id = %id, items = items.len(), "Plan created");
        self.plans.insert(id, items);
        id
    }

    /// Move one item to `status`.
    ///
    /// Re-applying the current status is a no-op. Changing a terminal item
    /// or addressing an index outside the plan fails with
    /// [`Error::InvalidTransition`].
    pub fn advance(&mut self, plan: PlanId, index: usize, status: TodoStatus) -> Result<()> {
        let items = self.plans.get_mut(&plan).ok_or(Error::PlanNotFound(plan))?;
        let len = items.len();
        let item = items.get_mut(index).ok_or_else(|| Error::InvalidTransition {
            index,
            reason: format!("plan has {len} items"),
        })?;

        if item.status == status {
            return Ok(());
        }
        if item.status.is_terminal() {
            return Err(Error::InvalidTransition {
                index,
                reason: format!("item is already {}", item.status),
            });
        }

        debug!(plan_id = %plan, index, from = %item.status, to = %status, "Plan item advanced");
        item.status = status;
        item.updated_at = Utc::now();
        Ok(())
    }

    /// Record the final outcome of an agent
    pub fn record_agent_outcome(&mut self, agent: &str, success: bool) {
        self.agent_outcomes.insert(agent.to_string(), success);
    }

    /// Close every non-terminal item of a plan.
    ///
    /// An item becomes `completed` if its owning agent reported success and
    /// `failed` otherwise. Returns the number of items that were forced.
    pub fn ensure_completed(&mut self, plan: PlanId) -> Result<usize> {
        let items = self.plans.get_mut(&plan).ok_or(Error::PlanNotFound(plan))?;
        let mut forced = 0;
        for item in items.iter_mut().filter(|i| !i.status.is_terminal()) {
            let succeeded = item
                .owning_agent
                .as_ref()
                .and_then(|agent| self.agent_outcomes.get(agent))
                .copied()
                .unwrap_or(false);
            let status = if succeeded {
                TodoStatus::Completed
            } else {
                TodoStatus::Failed
            };
            warn!(
                plan_id = %plan,
                index = item.index,
                from = %item.status,
                to = %status,
                "Forcing open plan item to a terminal state"
            );
            item.status = status;
            item.updated_at = Utc::now();
            forced += 1;
        }
        Ok(forced)
    }

    /// Items of a plan in index order
    pub fn items(&self, plan: PlanId) -> Result<&[TodoItem]> {
        self.plans
            .get(&plan)
            .map(Vec::as_slice)
            .ok_or(Error::PlanNotFound(plan))
    }

    /// Render a plan as text, one line per item in index order
    pub fn render(&self, plan: PlanId) -> Result<String> {
        let items = self.items(plan)?;
        let completed = items
            .iter()
            .filter(|i| i.status == TodoStatus::Completed)
            .count();

        let mut out = format!("Plan ({}/{} completed)", completed, items.len());
        for item in items {
            let _ = write!(
                out,
                "\n{} {}. {}",
                item.status.marker(),
                item.index + 1,
                item.description
            );
            if let Some(agent) = &item.owning_agent {
                let _ = write!(out, " ({agent})");
            }
        }
        Ok(out)
    }

    /// Snapshot of a plan
    pub fn view(&self, plan: PlanId) -> Result<PlanView> {
        let items = self.items(plan)?.to_vec();
        let completed = items
            .iter()
            .filter(|i| i.status == TodoStatus::Completed)
            .count();
        Ok(PlanView {
            plan_id: plan,
            total: items.len(),
            completed,
            rendered: self.render(plan)?,
            items,
        })
    }

    /// Forget a plan
    pub fn remove(&mut self, plan: PlanId) -> Option<Vec<TodoItem>> {
        self.plans.remove(&plan)
    }
}

#[cfg(test)]
mod tests;
