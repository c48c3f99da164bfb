//! Stream multiplexer / executor
//!
//! Fans out to every agent of a step at once, fans their events back in
//! through one bounded channel and forwards them to the caller as they
//! arrive. The coordinator is the only writer of [`AgentRunState`]; the
//! step ends when the number of terminal agents reaches the number
//! dispatched.
//!
//! With a single agent, content is streamed straight through. With several,
//! each agent's content is buffered and sent as one attributed
//! `AgentOutput` when that agent finishes.

mod config;
mod dispatch;
mod output;
mod state;

pub use config::ExecutorConfig;
pub use output::{OutputEnvelope, OutputEvent, OutputReceiver, OutputSink, Origin};
pub use state::{AgentRunState, Applied, RunStatus};

use crate::plan::{PlanId, PlanTracker, TodoStatus};
use crate::registry::AgentDescriptor;
use crate::types::CallerContext;
use dispatch::{AgentCall, FanIn};
use std::sync::Arc;
use switchboard_a2a::{AgentEvent, OutboundMessage, ProtocolClient};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Plan items driven by one executor step, one per agent slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanBinding {
    /// Plan
    pub plan_id: PlanId,
    /// Item index for each agent, in dispatch order
    pub items: Vec<usize>,
}

/// Mutable context of one orchestration, lent to each executor step.
pub struct RunScope<'a> {
    /// Caller output
    pub sink: &'a mut OutputSink,
    /// Plan tracker
    pub tracker: &'a mut PlanTracker,
    /// Cancels the whole orchestration
    pub cancel: CancellationToken,
    /// Conversation context sent to agents
    pub context_id: &'a str,
    /// Caller identity sent to agents
    pub caller: &'a CallerContext,
}

impl RunScope<'_> {
    fn set_item(&mut self, plan: &PlanBinding, slot: usize, status: TodoStatus) {
        let Some(&index) = plan.items.get(slot) else {
            return;
        };
        if let Err(e) = self.tracker.advance(plan.plan_id, index, status) {
            warn!(error = %e, "Plan transition rejected");
        }
    }

    /// Send the current plan to the caller (skipped if unchanged)
    pub fn publish_plan(&mut self, plan_id: PlanId) {
        match self.tracker.view(plan_id) {
            Ok(view) => {
                self.sink.emit_plan(view);
            }
            Err(e) => warn!(error = %e, "Cannot render plan"),
        }
    }
}

/// Runs agent calls concurrently.
#[derive(Clone)]
pub struct Executor {
    client: Arc<dyn ProtocolClient>,
    config: ExecutorConfig,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Executor {
    /// Create an executor
    pub fn new(client: Arc<dyn ProtocolClient>, config: ExecutorConfig) -> Self {
        Self { client, config }
    }

    /// Executor configuration
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Send `text` to every agent at once and wait until all are terminal.
    ///
    /// Returns one terminal state per agent, in dispatch order. Cancelling
    /// `scope.cancel` stops every call; agents that have not wound down
    /// within the grace period are marked cancelled anyway.
    #[instrument(skip_all, fields(agents = agents.len()))]
    pub async fn run(
        &self,
        scope: &mut RunScope<'_>,
        text: &str,
        agents: &[AgentDescriptor],
        plan: Option<&PlanBinding>,
    ) -> Vec<AgentRunState> {
        let mut states: Vec<AgentRunState> =
            agents.iter().map(|a| AgentRunState::new(&a.name)).collect();
        if agents.is_empty() {
            return states;
        }

        let buffered = agents.len() > 1;
        let (tx, mut rx) = mpsc::channel(self.config.fan_in_capacity.max(1));
        let mut tasks = JoinSet::new();

        // Dispatching: every call starts before any is awaited.
        for (slot, agent) in agents.iter().enumerate() {
            let call = AgentCall {
                client: self.client.clone(),
                agent: agent.name.clone(),
                endpoint: agent.endpoint.clone(),
                message: OutboundMessage::new(scope.context_id, text)
                    .with_metadata(scope.caller.to_metadata()),
                slot,
                tx: tx.clone(),
                cancel: scope.cancel.child_token(),
                config: self.config.clone(),
            };
            tasks.spawn(call.run());
            info!(agent = %agent.name, slot, "Agent dispatched");
            if let Some(plan) = plan {
                scope.set_item(plan, slot, TodoStatus::InProgress);
            }
        }
        drop(tx);
        if let Some(plan) = plan {
            scope.publish_plan(plan.plan_id);
        }

        let cancel = scope.cancel.clone();
        let dispatched = agents.len();
        let mut terminal_count = 0usize;
        let mut grace_deadline: Option<Instant> = None;

        while terminal_count < dispatched {
            let grace = async move {
                match grace_deadline {
                    Some(deadline) => sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled(), if grace_deadline.is_none() => {
                    info!(running = dispatched - terminal_count, "Cancelling running agents");
                    grace_deadline = Some(Instant::now() + self.config.cancel_grace());
                }
                message = rx.recv() => match message {
                    Some(FanIn::Event { slot, seq, event }) => {
                        let became_terminal = self.absorb(scope, &mut states[slot], seq, event, buffered);
                        if became_terminal {
                            terminal_count += 1;
                            self.on_terminal(scope, &states[slot], slot, buffered, plan);
                        }
                    }
                    Some(FanIn::Cancelled { slot }) => {
                        if states[slot].mark_terminal(RunStatus::Cancelled) {
                            terminal_count += 1;
                            self.on_terminal(scope, &states[slot], slot, buffered, plan);
                        }
                    }
                    None => {
                        warn!("Agent tasks ended without reporting every terminal event");
                        break;
                    }
                },
                _ = scope.sink.closed(), if !cancel.is_cancelled() => {
                    info!("Output receiver dropped, cancelling");
                    cancel.cancel();
                }
                _ = grace => {
                    warn!(
                        stragglers = dispatched - terminal_count,
                        "Cancellation grace period elapsed"
                    );
                    break;
                }
            }
        }

        let cancelled = cancel.is_cancelled();
        for slot in 0..states.len() {
            let status = if cancelled {
                RunStatus::Cancelled
            } else {
                RunStatus::Failed {
                    reason: "agent task ended without a terminal event".to_string(),
                }
            };
            if states[slot].mark_terminal(status) {
                self.on_terminal(scope, &states[slot], slot, buffered, plan);
            }
        }
        tasks.abort_all();

        debug!(terminal = terminal_count, dispatched, "Step finished");
        states
    }

    /// Apply one event and forward what the caller should see.
    /// Returns true when the agent became terminal.
    fn absorb(
        &self,
        scope: &mut RunScope<'_>,
        state: &mut AgentRunState,
        seq: u64,
        event: AgentEvent,
        buffered: bool,
    ) -> bool {
        let origin = Origin {
            agent: state.agent_name.clone(),
            seq,
        };
        if let AgentEvent::Unknown { kind, .. } = &event {
            warn!(agent = %origin.agent, kind = %kind, "Unknown event kind passed through as content");
        }

        match state.apply(&event) {
            Applied::Ignored => {
                debug!(agent = %origin.agent, seq, "Event after terminal ignored");
                false
            }
            Applied::Duplicate => {
                debug!(agent = %origin.agent, seq, kind = event.kind(), "Duplicate event not forwarded");
                false
            }
            Applied::Forward => {
                let forwarded = match event {
                    AgentEvent::ContentFragment { text, append } if !buffered => {
                        Some(OutputEvent::Content { text, append })
                    }
                    AgentEvent::Unknown { payload, .. } if !buffered => Some(OutputEvent::Content {
                        text: AgentEvent::passthrough_text(&payload),
                        append: true,
                    }),
                    AgentEvent::DataFragment { payload } => Some(OutputEvent::Data { payload }),
                    AgentEvent::StatusUpdate {
                        state,
                        is_final,
                        message,
                    } => Some(OutputEvent::Status {
                        state,
                        is_final,
                        message,
                    }),
                    _ => None,
                };
                if let Some(forwarded) = forwarded {
                    scope.sink.emit(Some(origin), forwarded);
                }
                false
            }
            Applied::Terminal => {
                match event {
                    AgentEvent::StatusUpdate { state, message, .. } => {
                        scope.sink.emit(
                            Some(origin),
                            OutputEvent::Status {
                                state,
                                is_final: true,
                                message,
                            },
                        );
                    }
                    AgentEvent::Error { message } => {
                        warn!(agent = %origin.agent, error = %message, "Agent failed");
                    }
                    _ => {}
                }
                true
            }
        }
    }

    fn on_terminal(
        &self,
        scope: &mut RunScope<'_>,
        state: &AgentRunState,
        slot: usize,
        buffered: bool,
        plan: Option<&PlanBinding>,
    ) {
        match &state.status {
            RunStatus::Completed => info!(agent = %state.agent_name, events = state.events_received, "Agent completed"),
            RunStatus::Failed { reason } => warn!(agent = %state.agent_name, reason = %reason, "Agent finished unsuccessfully"),
            RunStatus::Cancelled => info!(agent = %state.agent_name, "Agent cancelled"),
            RunStatus::Running => {}
        }

        if buffered && state.succeeded() && !state.last_content.trim().is_empty() {
            scope.sink.emit(
                Some(Origin {
                    agent: state.agent_name.clone(),
                    seq: state.events_received,
                }),
                OutputEvent::AgentOutput {
                    content: state.last_content.clone(),
                },
            );
        }

        if let Some(plan) = plan {
            scope
                .tracker
                .record_agent_outcome(&state.agent_name, state.succeeded());
            let status = if state.succeeded() {
                TodoStatus::Completed
            } else {
                TodoStatus::Failed
            };
            scope.set_item(plan, slot, status);
            scope.publish_plan(plan.plan_id);
        }
    }
}
