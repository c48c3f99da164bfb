//! Scripted in-process agents for testing
//!
//! A [`MockAgent`] replays a fixed script of events, optionally with delays,
//! which makes arrival order between concurrent agents reproducible.

use crate::client::{AgentEventStream, OutboundMessage, ProtocolClient};
use crate::error::{Error, Result};
use crate::event::{AgentEvent, TaskState};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
enum Step {
    Emit(AgentEvent),
    Sleep(Duration),
    Hang,
}

/// A scripted remote agent.
#[derive(Debug, Default)]
pub struct MockAgent {
    steps: Vec<Step>,
    failing_opens: AtomicU32,
    opens: AtomicU32,
    received: Mutex<Vec<OutboundMessage>>,
}

impl MockAgent {
    /// Create an agent with an empty script
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit an arbitrary event
    #[must_use]
    pub fn emit(mut self, event: AgentEvent) -> Self {
        self.steps.push(Step::Emit(event));
        self
    }

    /// Emit a content fragment appended to previous content
    #[must_use]
    pub fn content(self, text: &str) -> Self {
        self.emit(AgentEvent::ContentFragment {
            text: text.to_string(),
            append: true,
        })
    }

    /// Emit a content snapshot replacing previous content
    #[must_use]
    pub fn replace(self, text: &str) -> Self {
        self.emit(AgentEvent::ContentFragment {
            text: text.to_string(),
            append: false,
        })
    }

    /// Emit a structured data fragment
    #[must_use]
    pub fn data(self, payload: Value) -> Self {
        self.emit(AgentEvent::DataFragment { payload })
    }

    /// Emit a non-final status update
    #[must_use]
    pub fn status(self, state: TaskState) -> Self {
        self.emit(AgentEvent::StatusUpdate {
            state,
            is_final: false,
            message: None,
        })
    }

    /// Emit a final status update
    #[must_use]
    pub fn finish(self, state: TaskState) -> Self {
        self.emit(AgentEvent::finished(state))
    }

    /// Emit a terminal error
    #[must_use]
    pub fn fail(self, message: &str) -> Self {
        self.emit(AgentEvent::error(message))
    }

    /// Pause before the next step
    #[must_use]
    pub fn delay(mut self, duration: Duration) -> Self {
        self.steps.push(Step::Sleep(duration));
        self
    }

    /// Never produce another event
    #[must_use]
    pub fn hang(mut self) -> Self {
        self.steps.push(Step::Hang);
        self
    }

    /// Refuse the first `n` connection attempts with a network error
    #[must_use]
    pub fn refuse_first(self, n: u32) -> Self {
        self.failing_opens.store(n, Ordering::SeqCst);
        self
    }

    /// Number of times a call was opened (including refused ones)
    pub fn open_count(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }

    /// Messages this agent has received
    pub fn received(&self) -> Vec<OutboundMessage> {
        self.received
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn play(&self) -> AgentEventStream {
        let steps = self.steps.clone();
        stream::iter(steps)
            .then(|step| async move {
                match step {
                    Step::Emit(event) => Some(event),
                    Step::Sleep(duration) => {
                        tokio::time::sleep(duration).await;
                        None
                    }
                    Step::Hang => {
                        futures::future::pending::<()>().await;
                        None
                    }
                }
            })
            .filter_map(futures::future::ready)
            .boxed()
    }
}

/// Protocol client routing endpoints to scripted agents.
#[derive(Debug, Default, Clone)]
pub struct MockClient {
    agents: HashMap<String, Arc<MockAgent>>,
}

impl MockClient {
    /// Create a client with no agents
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scripted agent at `endpoint`
    #[must_use]
    pub fn with_agent(mut self, endpoint: &str, agent: MockAgent) -> Self {
        self.agents.insert(endpoint.to_string(), Arc::new(agent));
        self
    }

    /// Access a registered agent (for assertions)
    pub fn agent(&self, endpoint: &str) -> Option<Arc<MockAgent>> {
        self.agents.get(endpoint).cloned()
    }
}

#[async_trait::async_trait]
impl ProtocolClient for MockClient {
    async fn open(&self, endpoint: &str, message: &OutboundMessage) -> Result<AgentEventStream> {
        let agent = self
            .agents
            .get(endpoint)
            .ok_or_else(|| Error::Network(format!("connection refused: {endpoint}")))?;

        agent.opens.fetch_add(1, Ordering::SeqCst);
        let refused = agent
            .failing_opens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(Error::Network(format!("connection reset: {endpoint}")));
        }

        agent
            .received
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.clone());
        Ok(agent.play())
    }
}
