//! Stepwise driver for COMPLEX requests
//!
//! A complex request is broken into a numbered plan of steps, each owned by
//! one or more agents. Steps run one at a time through the executor; every
//! step sees what earlier steps produced. The number of steps is bounded,
//! so the loop always terminates.

use crate::executor::{AgentRunState, Executor, PlanBinding, RunScope};
use crate::plan::{PlanId, TodoDraft, TodoStatus};
use crate::registry::{normalize_phrase, AgentDescriptor};
use crate::types::{RoutingBasis, RoutingDecision};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use switchboard_llm::LanguageModel;
use tracing::{debug, info, warn};

static STEP_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*\d+[.)]\s*\[([^\]]+)\]\s*(.+?)\s*$")
        .expect("STEP_REGEX is a valid regex pattern")
});

fn default_max_steps() -> usize {
    5
}

fn default_use_model() -> bool {
    true
}

/// Driver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Upper bound on plan steps
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Ask the language model for the plan when one is available
    #[serde(default = "default_use_model")]
    pub use_model: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            use_model: default_use_model(),
        }
    }
}

/// One step of a complex plan
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStep {
    /// What the step does
    pub description: String,
    /// Agents asked in this step (several run in parallel)
    pub agents: Vec<AgentDescriptor>,
}

/// What a driven plan produced
#[derive(Debug)]
pub struct DriverOutcome {
    /// The visible execution plan
    pub plan_id: PlanId,
    /// Terminal states of every agent call, in execution order
    pub states: Vec<AgentRunState>,
    /// Steps that actually ran
    pub steps_run: usize,
}

/// Runs complex requests step by step.
#[derive(Clone, Default)]
pub struct StepwiseDriver {
    config: DriverConfig,
    model: Option<Arc<dyn LanguageModel>>,
}

impl std::fmt::Debug for StepwiseDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepwiseDriver")
            .field("config", &self.config)
            .field("model", &self.model.is_some())
            .finish()
    }
}

impl StepwiseDriver {
    /// Create a driver without a language model
    #[must_use]
    pub fn new(config: DriverConfig) -> Self {
        Self {
            config,
            model: None,
        }
    }

    /// Use `model` to draft plans
    #[must_use]
    pub fn with_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Break a complex request into at most `max_steps` steps.
    pub async fn plan(&self, request: &str, decision: &RoutingDecision) -> Vec<PlannedStep> {
        let mut steps = match self.model_plan(request, &decision.agents).await {
            Some(steps) => steps,
            None => fallback_plan(decision),
        };

        let max_steps = self.config.max_steps.max(1);
        if steps.len() > max_steps {
            warn!(planned = steps.len(), max_steps, "Plan truncated to the step limit");
            steps.truncate(max_steps);
        }
        steps
    }

    async fn model_plan(
        &self,
        request: &str,
        candidates: &[AgentDescriptor],
    ) -> Option<Vec<PlannedStep>> {
        let model = self.model.as_ref().filter(|_| self.config.use_model)?;
        let prompt = planning_prompt(request, candidates, self.config.max_steps.max(1));

        let answer = match model.generate(&prompt).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "Planning model failed, using fallback plan");
                return None;
            }
        };

        let steps = parse_plan(&answer, candidates);
        if steps.is_empty() {
            debug!(answer = %answer.trim(), "Planning model answer had no usable steps");
            return None;
        }
        info!(steps = steps.len(), "Plan drafted by language model");
        Some(steps)
    }

    /// Run `steps` in order, stopping early on cancellation or when a step
    /// produces nothing but failures. Items of steps that never ran are
    /// marked failed.
    pub async fn run(
        &self,
        executor: &Executor,
        scope: &mut RunScope<'_>,
        request: &str,
        steps: &[PlannedStep],
    ) -> DriverOutcome {
        let drafts: Vec<TodoDraft> = steps
            .iter()
            .flat_map(|step| {
                step.agents
                    .iter()
                    .map(move |agent| TodoDraft::owned(step.description.clone(), agent.name.clone()))
            })
            .collect();
        let plan_id = scope.tracker.create_plan(drafts);

        let mut bindings = Vec::with_capacity(steps.len());
        let mut next_item = 0;
        for step in steps {
            let items: Vec<usize> = (next_item..next_item + step.agents.len()).collect();
            next_item += step.agents.len();
            bindings.push(PlanBinding { plan_id, items });
        }
        scope.publish_plan(plan_id);

        let mut states = Vec::new();
        let mut earlier: Vec<(String, String)> = Vec::new();
        let mut steps_run = 0;

        for (index, (step, binding)) in steps.iter().zip(&bindings).enumerate() {
            if scope.cancel.is_cancelled() {
                info!(step = index + 1, "Cancelled before step");
                break;
            }

            let text = step_text(request, index, steps.len(), step, &earlier);
            info!(
                step = index + 1,
                of = steps.len(),
                agents = ?step.agents.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(),
                "Running plan step"
            );
            let step_states = executor.run(scope, &text, &step.agents, Some(binding)).await;
            steps_run += 1;

            let any_succeeded = step_states.iter().any(AgentRunState::succeeded);
            earlier.extend(
                step_states
                    .iter()
                    .filter(|s| s.has_contribution())
                    .map(|s| (s.agent_name.clone(), s.last_content.clone())),
            );
            states.extend(step_states);

            if !any_succeeded {
                warn!(step = index + 1, "Step failed, skipping the rest of the plan");
                break;
            }
        }

        for binding in bindings.iter().skip(steps_run) {
            for &index in &binding.items {
                if let Err(e) = scope.tracker.advance(plan_id, index, TodoStatus::Failed) {
                    warn!(error = %e, "Plan transition rejected");
                }
            }
        }
        scope.publish_plan(plan_id);

        DriverOutcome {
            plan_id,
            states,
            steps_run,
        }
    }
}

/// One step per implicated agent, or the first candidate alone when
/// nothing was implicated.
fn fallback_plan(decision: &RoutingDecision) -> Vec<PlannedStep> {
    if decision.basis == RoutingBasis::Ambiguous {
        return decision
            .agents
            .first()
            .map(|agent| PlannedStep {
                description: "Answer the request".to_string(),
                agents: vec![agent.clone()],
            })
            .into_iter()
            .collect();
    }
    decision
        .agents
        .iter()
        .map(|agent| PlannedStep {
            description: format!("Ask {}", agent.name),
            agents: vec![agent.clone()],
        })
        .collect()
}

fn planning_prompt(request: &str, candidates: &[AgentDescriptor], max_steps: usize) -> String {
    let mut prompt = format!(
        "Break the request below into at most {max_steps} ordered steps.\n\
         Each step must be assigned to one of the agents listed.\n\
         Answer with one line per step, exactly in this form:\n\
         1. [agent] what the agent should do\n\nAgents:\n"
    );
    for agent in candidates {
        prompt.push_str(&format!(
            "- {}: {} (skills: {})\n",
            agent.name,
            agent.description,
            agent.declared_skills.join(", ")
        ));
    }
    prompt.push_str(&format!("\nRequest:\n{request}\n"));
    prompt
}

/// Parse `N. [agent, agent] description` lines; unknown agents are dropped.
fn parse_plan(answer: &str, candidates: &[AgentDescriptor]) -> Vec<PlannedStep> {
    STEP_REGEX
        .captures_iter(answer)
        .filter_map(|caps| {
            let names = caps.get(1)?.as_str();
            let description = caps.get(2)?.as_str().to_string();
            let agents: Vec<AgentDescriptor> = names
                .split(',')
                .map(normalize_phrase)
                .filter_map(|name| {
                    let found = candidates.iter().find(|a| a.normalized_name() == name);
                    if found.is_none() {
                        debug!(agent = %name, "Plan step names an unknown agent");
                    }
                    found.cloned()
                })
                .collect();
            (!agents.is_empty()).then_some(PlannedStep {
                description,
                agents,
            })
        })
        .collect()
}

fn step_text(
    request: &str,
    index: usize,
    total: usize,
    step: &PlannedStep,
    earlier: &[(String, String)],
) -> String {
    if total == 1 && earlier.is_empty() {
        return request.to_string();
    }
    let mut text = format!(
        "{request}\n\nCurrent step ({}/{}): {}",
        index + 1,
        total,
        step.description
    );
    if !earlier.is_empty() {
        text.push_str("\n\nResults from earlier steps:");
        for (agent, content) in earlier {
            text.push_str(&format!("\n[{agent}] {}", content.trim()));
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RoutingKind;
    use switchboard_llm::ScriptedModel;

    fn agents() -> Vec<AgentDescriptor> {
        vec![
            AgentDescriptor::new("github", "mock://github"),
            AgentDescriptor::new("jira", "mock://jira"),
        ]
    }

    fn decision(basis: RoutingBasis) -> RoutingDecision {
        RoutingDecision::new(RoutingKind::Complex, agents(), basis, "test")
    }

    #[test]
    fn test_parse_plan_lines() {
        let answer = "Here is the plan:\n\
                      1. [GitHub] Find the failing pull request\n\
                      2) [jira, github] File a ticket and link it\n\
                      3. [confluence] Update the docs\n\
                      4. no agent here";
        let steps = parse_plan(answer, &agents());
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].description, "Find the failing pull request");
        assert_eq!(steps[0].agents[0].name, "github");
        assert_eq!(steps[1].agents.len(), 2);
    }

    #[tokio::test]
    async fn test_fallback_plan_one_step_per_agent() {
        let driver = StepwiseDriver::default();
        let steps = driver.plan("x", &decision(RoutingBasis::Dependency)).await;
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].description, "Ask github");
        assert_eq!(steps[1].agents[0].name, "jira");
    }

    #[tokio::test]
    async fn test_ambiguous_fallback_uses_first_agent() {
        let driver = StepwiseDriver::default();
        let steps = driver.plan("x", &decision(RoutingBasis::Ambiguous)).await;
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].agents[0].name, "github");
    }

    #[tokio::test]
    async fn test_model_plan_is_bounded() {
        let model = ScriptedModel::new().answer(
            "1. [github] a\n2. [jira] b\n3. [github] c\n4. [jira] d",
        );
        let driver = StepwiseDriver::new(DriverConfig {
            max_steps: 2,
            use_model: true,
        })
        .with_model(Arc::new(model));

        let steps = driver.plan("x", &decision(RoutingBasis::Dependency)).await;
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].description, "b");
    }

    #[tokio::test]
    async fn test_unusable_model_answer_falls_back() {
        let model = ScriptedModel::new().answer("I would rather not.");
        let driver = StepwiseDriver::default().with_model(Arc::new(model));
        let steps = driver.plan("x", &decision(RoutingBasis::Dependency)).await;
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].description, "Ask github");
    }

    #[test]
    fn test_step_text_carries_earlier_results() {
        let step = PlannedStep {
            description: "File a ticket".into(),
            agents: vec![],
        };
        let earlier = vec![("github".to_string(), "PR #42 is failing\n".to_string())];
        let text = step_text("Fix CI", 1, 2, &step, &earlier);
        assert_eq!(
            text,
            "Fix CI\n\nCurrent step (2/2): File a ticket\n\nResults from earlier steps:\n[github] PR #42 is failing"
        );
        assert_eq!(step_text("Fix CI", 0, 1, &step, &[]), "Fix CI");
    }
}
