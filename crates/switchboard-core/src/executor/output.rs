//! Caller-facing output channel
//!
//! Every item carries a per-orchestration sequence number; agent-derived
//! items also carry `(agent, seq_within_agent)`. The channel ends with
//! exactly one `Completed` or `Failed` event and is closed right after it.

use crate::error::OrchestrationError;
use crate::plan::PlanView;
use crate::synthesizer::OrchestrationResult;
use crate::types::RoutingKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use switchboard_a2a::TaskState;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Where an agent-derived item came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Origin {
    /// Agent name
    pub agent: String,
    /// Position within that agent's own event sequence, from 1
    pub seq: u64,
}

/// One item on the output channel
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputEvent {
    /// The orchestration started
    Started {
        /// Request ID
        request_id: Uuid,
        /// Conversation context
        context_id: String,
    },
    /// The routing decision
    Routed {
        /// Strategy
        kind: RoutingKind,
        /// Selected agents
        agents: Vec<String>,
        /// Explanation
        rationale: String,
    },
    /// Agent status change
    Status {
        /// Reported state
        state: TaskState,
        /// Terminal marker
        is_final: bool,
        /// Status message
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Streamed prose from the single agent of a direct run
    Content {
        /// Text
        text: String,
        /// Append (`false` replaces what was shown)
        append: bool,
    },
    /// Structured data from an agent, verbatim
    Data {
        /// Payload
        payload: Value,
    },
    /// Everything one agent said, sent when it finishes (multi-agent runs)
    AgentOutput {
        /// Content
        content: String,
    },
    /// Execution plan progress
    Plan {
        /// Plan snapshot
        plan: PlanView,
    },
    /// Chunk of the synthesized answer as it is generated
    SynthesisDelta {
        /// Text chunk
        text: String,
    },
    /// Final result
    Completed {
        /// Result
        result: OrchestrationResult,
    },
    /// Every agent failed
    Failed {
        /// The single failure
        error: OrchestrationError,
    },
}

impl OutputEvent {
    /// Whether this is the last event of the channel
    pub fn is_terminal(&self) -> bool {
        matches!(self, OutputEvent::Completed { .. } | OutputEvent::Failed { .. })
    }
}

/// An output item with its position
#[derive(Debug, Clone, Serialize)]
pub struct OutputEnvelope {
    /// Position in the orchestration's output, from 1
    pub seq: u64,
    /// Originating agent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
    /// Emission time
    pub at: DateTime<Utc>,
    /// Payload
    #[serde(flatten)]
    pub event: OutputEvent,
}

/// Receiving end of an orchestration's output
pub type OutputReceiver = mpsc::UnboundedReceiver<OutputEnvelope>;

/// Sending end of an orchestration's output.
///
/// Sending never blocks, so a slow consumer cannot stall the coordinator.
/// [`OutputSink::finish`] consumes the sink, which closes the channel.
#[derive(Debug)]
pub struct OutputSink {
    tx: mpsc::UnboundedSender<OutputEnvelope>,
    next_seq: u64,
    last_plan: Option<String>,
}

impl OutputSink {
    /// Create a sink and its receiver
    pub fn channel() -> (Self, OutputReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                next_seq: 1,
                last_plan: None,
            },
            rx,
        )
    }

    /// Send one item. Returns false if the receiver is gone.
    pub fn emit(&mut self, origin: Option<Origin>, event: OutputEvent) -> bool {
        let envelope = OutputEnvelope {
            seq: self.next_seq,
            origin,
            at: Utc::now(),
            event,
        };
        self.next_seq += 1;
        self.tx.send(envelope).is_ok()
    }

    /// Send a plan snapshot unless it renders the same as the last one.
    pub fn emit_plan(&mut self, plan: PlanView) -> bool {
        if self.last_plan.as_deref() == Some(plan.rendered.as_str()) {
            debug!(plan_id = %plan.plan_id, "Plan unchanged, not re-sent");
            return false;
        }
        self.last_plan = Some(plan.rendered.clone());
        self.emit(None, OutputEvent::Plan { plan })
    }

    /// Send the terminal item and close the channel.
    pub fn finish(mut self, event: OutputEvent) {
        debug_assert!(event.is_terminal());
        self.emit(None, event);
    }

    /// Whether the receiver was dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Wait until the receiver is dropped
    pub async fn closed(&self) {
        self.tx.closed().await;
    }
}
