//! One agent call, run as its own task
//!
//! The task owns the protocol stream and nothing else. It posts every event
//! to the fan-in channel tagged with its slot and a per-agent sequence
//! number, and stops after the terminal event, on cancellation, or when the
//! per-call deadline passes.

use super::ExecutorConfig;
use crate::utils::{retry_with_backoff, RetryError};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use switchboard_a2a::{
    failed_stream, guard_terminal, AgentEvent, AgentEventStream, OutboundMessage, ProtocolClient,
};
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Message from an agent task to the coordinator
#[derive(Debug)]
pub(crate) enum FanIn {
    /// An event, in the agent's emission order
    Event {
        slot: usize,
        seq: u64,
        event: AgentEvent,
    },
    /// The task stopped because it was cancelled
    Cancelled { slot: usize },
}

pub(crate) struct AgentCall {
    pub client: Arc<dyn ProtocolClient>,
    pub agent: String,
    pub endpoint: String,
    pub message: OutboundMessage,
    pub slot: usize,
    pub tx: mpsc::Sender<FanIn>,
    pub cancel: CancellationToken,
    pub config: ExecutorConfig,
}

impl AgentCall {
    pub async fn run(self) {
        let deadline = Instant::now() + self.config.call_timeout();

        let opened = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return self.report_cancelled().await,
            opened = timeout_at(deadline, self.open()) => opened,
        };

        let mut events = match opened {
            Ok(Ok(raw)) => guard_terminal(raw, self.config.trailing_window()),
            Ok(Err(e)) => {
                warn!(
                    agent = %self.agent,
                    attempts = e.attempts,
                    error = %e.last_error,
                    "Could not open agent call"
                );
                failed_stream(&e.last_error)
            }
            Err(_) => stream::once(futures::future::ready(self.deadline_error())).boxed(),
        };

        let mut seq = 0u64;
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return self.report_cancelled().await,
                next = timeout_at(deadline, events.next()) => next,
            };

            let event = match next {
                Ok(Some(event)) => event,
                // the guard always ends with a terminal, which returns below
                Ok(None) => return,
                Err(_) => self.deadline_error(),
            };

            let terminal = event.is_terminal();
            seq += 1;
            let posted = self
                .tx
                .send(FanIn::Event {
                    slot: self.slot,
                    seq,
                    event,
                })
                .await;
            if posted.is_err() || terminal {
                return;
            }
        }
    }

    async fn open(&self) -> Result<AgentEventStream, RetryError<switchboard_a2a::Error>> {
        retry_with_backoff(
            &self.config.retry,
            || self.client.open(&self.endpoint, &self.message),
            switchboard_a2a::Error::is_retryable,
        )
        .await
    }

    fn deadline_error(&self) -> AgentEvent {
        warn!(agent = %self.agent, timeout_ms = self.config.call_timeout_ms, "Agent call deadline exceeded");
        AgentEvent::error(format!(
            "no answer within {}ms",
            self.config.call_timeout_ms
        ))
    }

    async fn report_cancelled(&self) {
        debug!(agent = %self.agent, "Agent call cancelled, closing connection");
        let _ = self.tx.send(FanIn::Cancelled { slot: self.slot }).await;
    }
}
