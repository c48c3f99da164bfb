//! Orchestrator facade
//!
//! Wires the router, executor, stepwise driver and synthesizer together.
//! [`Orchestrator::start`] routes the request, then runs it on a background
//! task; the caller reads the output channel through the returned
//! [`OrchestrationHandle`] and may cancel at any point.

use crate::driver::{DriverConfig, StepwiseDriver};
use crate::error::{Error, OrchestrationError, Result};
use crate::executor::{
    AgentRunState, Executor, ExecutorConfig, OutputEnvelope, OutputEvent, OutputReceiver,
    OutputSink, PlanBinding, RunScope,
};
use crate::plan::{PlanId, PlanTracker, PlanView, TodoDraft};
use crate::registry::{AgentDescriptor, AgentRegistry};
use crate::router::{Router, RouterConfig};
use crate::synthesizer::{OrchestrationResult, Synthesizer, SynthesizerConfig};
use crate::types::{Request, RoutingDecision, RoutingKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use switchboard_a2a::ProtocolClient;
use switchboard_llm::LanguageModel;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Settings for every orchestration component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Router rules
    #[serde(default)]
    pub router: RouterConfig,
    /// Executor timeouts and retry
    #[serde(default)]
    pub executor: ExecutorConfig,
    /// Answer composition
    #[serde(default)]
    pub synthesizer: SynthesizerConfig,
    /// Complex request planning
    #[serde(default)]
    pub driver: DriverConfig,
}

/// Everything known about one finished orchestration
#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationReport {
    /// Request ID
    pub request_id: Uuid,
    /// How the request was routed
    pub decision: RoutingDecision,
    /// Terminal state of every agent call, in execution order
    pub agents: Vec<AgentRunState>,
    /// Final plan, for parallel and complex runs
    pub plan: Option<PlanView>,
    /// Result or the single failure
    pub outcome: std::result::Result<OrchestrationResult, OrchestrationError>,
}

impl OrchestrationReport {
    /// The result, if the orchestration succeeded
    pub fn result(&self) -> Option<&OrchestrationResult> {
        self.outcome.as_ref().ok()
    }
}

/// A running orchestration.
///
/// Dropping the handle drops the output receiver, which cancels the run.
#[derive(Debug)]
pub struct OrchestrationHandle {
    request_id: Uuid,
    decision: RoutingDecision,
    events: OutputReceiver,
    cancel: CancellationToken,
    task: JoinHandle<OrchestrationReport>,
}

impl OrchestrationHandle {
    /// Request ID
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Routing decision the run is following
    pub fn decision(&self) -> &RoutingDecision {
        &self.decision
    }

    /// Next output item; `None` once the terminal item has been read.
    pub async fn next_event(&mut self) -> Option<OutputEnvelope> {
        self.events.recv().await
    }

    /// Cancel the orchestration. The run still ends with a terminal item.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels the orchestration
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the run to finish, discarding unread output.
    pub async fn join(self) -> Result<OrchestrationReport> {
        let Self { events, task, .. } = self;
        let report = task
            .await
            .map_err(|e| Error::Internal(format!("orchestration task failed: {e}")))?;
        drop(events);
        Ok(report)
    }

    /// Read every output item, then wait for the report.
    pub async fn collect(mut self) -> Result<(Vec<OutputEnvelope>, OrchestrationReport)> {
        let mut items = Vec::new();
        while let Some(item) = self.events.recv().await {
            items.push(item);
        }
        let report = self
            .task
            .await
            .map_err(|e| Error::Internal(format!("orchestration task failed: {e}")))?;
        Ok((items, report))
    }
}

/// Multi-agent orchestrator
#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<AgentRegistry>,
    router: Router,
    executor: Executor,
    synthesizer: Synthesizer,
    driver: StepwiseDriver,
    model: Option<Arc<dyn LanguageModel>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("agents", &self.registry.len())
            .field("router", &self.router)
            .field("executor", &self.executor)
            .field("synthesizer", &self.synthesizer)
            .field("driver", &self.driver)
            .field("model", &self.model.is_some())
            .finish()
    }
}

impl Orchestrator {
    /// Create an orchestrator without a language model
    pub fn new(
        registry: AgentRegistry,
        client: Arc<dyn ProtocolClient>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            router: Router::new(config.router),
            executor: Executor::new(client, config.executor),
            synthesizer: Synthesizer::new(config.synthesizer),
            driver: StepwiseDriver::new(config.driver),
            model: None,
        }
    }

    /// Use `model` for ambiguous routing, planning and composition
    #[must_use]
    pub fn with_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.synthesizer = self.synthesizer.with_model(model.clone());
        self.driver = self.driver.with_model(model.clone());
        self.model = Some(model);
        self
    }

    /// Registered agents
    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Decide how `text` would be routed, without running it.
    pub async fn route(&self, text: &str) -> Result<RoutingDecision> {
        match &self.model {
            Some(model) => {
                self.router
                    .decide_with_model(text, self.registry.agents(), model.as_ref())
                    .await
            }
            None => self.router.decide(text, self.registry.agents()),
        }
    }

    /// Route `request` and start running it.
    ///
    /// # Errors
    /// Returns [`Error::NoAgentsAvailable`] when nothing is registered; no
    /// output channel is created in that case.
    pub async fn start(&self, request: Request) -> Result<OrchestrationHandle> {
        let decision = self.route(&request.text).await?;
        Ok(self.start_with_decision(request, decision))
    }

    /// Start running `request` along an already made decision.
    pub fn start_with_decision(
        &self,
        request: Request,
        decision: RoutingDecision,
    ) -> OrchestrationHandle {
        let (sink, events) = OutputSink::channel();
        let cancel = CancellationToken::new();
        let request_id = request.id;
        let span = info_span!("orchestration", request_id = %request_id, kind = %decision.kind);

        let this = self.clone();
        let token = cancel.clone();
        let run_decision = decision.clone();
        let task = tokio::spawn(
            async move { this.execute(request, run_decision, sink, token).await }.instrument(span),
        );

        OrchestrationHandle {
            request_id,
            decision,
            events,
            cancel,
            task,
        }
    }

    async fn execute(
        &self,
        request: Request,
        decision: RoutingDecision,
        mut sink: OutputSink,
        cancel: CancellationToken,
    ) -> OrchestrationReport {
        let mut tracker = PlanTracker::new();
        info!(
            agents = ?decision.agent_names(),
            rationale = %decision.rationale,
            "Orchestration started"
        );

        sink.emit(
            None,
            OutputEvent::Started {
                request_id: request.id,
                context_id: request.context_id.clone(),
            },
        );
        sink.emit(
            None,
            OutputEvent::Routed {
                kind: decision.kind,
                agents: decision.agents.iter().map(|a| a.name.clone()).collect(),
                rationale: decision.rationale.clone(),
            },
        );

        let (states, plan_id) = {
            let mut scope = RunScope {
                sink: &mut sink,
                tracker: &mut tracker,
                cancel: cancel.clone(),
                context_id: &request.context_id,
                caller: &request.caller,
            };
            self.run_decision(&mut scope, &request.text, &decision).await
        };

        let plan = plan_id.and_then(|plan_id| {
            match tracker.ensure_completed(plan_id) {
                Ok(0) => {}
                Ok(forced) => warn!(forced, "Plan items closed after the run"),
                Err(e) => warn!(error = %e, "Cannot close plan"),
            }
            tracker.view(plan_id).ok()
        });
        if let Some(view) = &plan {
            sink.emit_plan(view.clone());
        }

        let cancelled = cancel.is_cancelled();
        let outcome = self
            .synthesizer
            .synthesize_streaming(&request.text, &states, |delta| {
                sink.emit(
                    None,
                    OutputEvent::SynthesisDelta {
                        text: delta.to_string(),
                    },
                );
            })
            .await
            .map(|mut result| {
                result.cancelled = cancelled;
                result
            });

        match &outcome {
            Ok(result) => {
                info!(
                    contributors = result.contributing_agent_count,
                    failed = result.failed_agents.len(),
                    synthesized = result.synthesized,
                    cancelled,
                    "Orchestration completed"
                );
                sink.finish(OutputEvent::Completed {
                    result: result.clone(),
                });
            }
            Err(e) => {
                warn!(error = %e, "Orchestration failed");
                sink.finish(OutputEvent::Failed { error: e.clone() });
            }
        }

        OrchestrationReport {
            request_id: request.id,
            decision,
            agents: states,
            plan,
            outcome,
        }
    }

    async fn run_decision(
        &self,
        scope: &mut RunScope<'_>,
        text: &str,
        decision: &RoutingDecision,
    ) -> (Vec<AgentRunState>, Option<PlanId>) {
        match decision.kind {
            RoutingKind::Direct => {
                let states = self.executor.run(scope, text, &decision.agents, None).await;
                (states, None)
            }
            RoutingKind::Parallel => {
                let plan_id = scope.tracker.create_plan(
                    decision
                        .agents
                        .iter()
                        .map(|a| TodoDraft::owned(ask_item(a), a.name.clone())),
                );
                let binding = PlanBinding {
                    plan_id,
                    items: (0..decision.agents.len()).collect(),
                };
                let states = self
                    .executor
                    .run(scope, text, &decision.agents, Some(&binding))
                    .await;
                (states, Some(plan_id))
            }
            RoutingKind::Complex => {
                let steps = self.driver.plan(text, decision).await;
                let outcome = self.driver.run(&self.executor, scope, text, &steps).await;
                info!(
                    steps = steps.len(),
                    ran = outcome.steps_run,
                    "Complex plan finished"
                );
                (outcome.states, Some(outcome.plan_id))
            }
        }
    }
}

fn ask_item(agent: &AgentDescriptor) -> String {
    if agent.description.is_empty() {
        format!("Ask {}", agent.name)
    } else {
        format!("Ask {}: {}", agent.name, agent.description)
    }
}

#[cfg(test)]
mod tests;
