//! Protocol client
//!
//! [`ProtocolClient`] is the seam between the orchestrator and remote
//! specialists. `open` establishes the call (and may fail, which lets the
//! caller decide on retries); [`call`] turns any failure into a single
//! terminal [`AgentEvent::Error`] and applies the terminal guard.

use crate::error::{Error, Result};
use crate::event::{decode_envelope, AgentEvent};
use crate::guard::guard_terminal;
use crate::sse::SseDecoder;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Stream of events for one call
pub type AgentEventStream = BoxStream<'static, AgentEvent>;

/// Default trailing window used by [`call`]
pub const DEFAULT_TRAILING_WINDOW: Duration = Duration::from_millis(25);

/// A message sent to one specialist agent.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundMessage {
    /// Message ID
    pub id: String,
    /// Conversation context shared by all agents of one request
    pub context_id: String,
    /// Request text
    pub text: String,
    /// Caller context forwarded as message metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl OutboundMessage {
    /// Create a message with a fresh ID
    pub fn new(context_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            context_id: context_id.into(),
            text: text.into(),
            metadata: None,
        }
    }

    /// Attach message metadata
    #[must_use]
    pub fn with_metadata(mut self, metadata: Option<Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// JSON-RPC `message/stream` request body
    #[must_use]
    pub fn to_jsonrpc(&self) -> Value {
        let mut body = json!({
            "jsonrpc": "2.0",
            "id": self.id,
            "method": "message/stream",
            "params": {
                "message": {
                    "kind": "message",
                    "role": "user",
                    "messageId": self.id,
                    "contextId": self.context_id,
                    "parts": [{"kind": "text", "text": self.text}]
                }
            }
        });
        if let Some(metadata) = &self.metadata {
            body["params"]["message"]["metadata"] = metadata.clone();
        }
        body
    }
}

/// Client able to open a streaming call to a remote agent.
#[async_trait::async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Open a streaming call. The returned stream is raw: it is not yet
    /// guarded against contract violations.
    async fn open(&self, endpoint: &str, message: &OutboundMessage) -> Result<AgentEventStream>;
}

/// Open a call and return a guarded stream that always ends with exactly
/// one terminal event. Never fails; failures surface as an error event.
pub async fn call(
    client: &dyn ProtocolClient,
    endpoint: &str,
    message: &OutboundMessage,
) -> AgentEventStream {
    match client.open(endpoint, message).await {
        Ok(events) => guard_terminal(events, DEFAULT_TRAILING_WINDOW),
        Err(e) => failed_stream(&e),
    }
}

/// A stream consisting of one error event describing `err`.
#[must_use]
pub fn failed_stream(err: &Error) -> AgentEventStream {
    stream::once(futures::future::ready(AgentEvent::error(err.to_string()))).boxed()
}

/// HTTP client for agents speaking JSON-RPC `message/stream` over SSE.
#[derive(Debug, Clone)]
pub struct HttpA2aClient {
    client: Client,
}

impl HttpA2aClient {
    /// Create a client. `connect_timeout` bounds connection setup only; the
    /// per-call deadline is enforced by the caller.
    pub fn new(connect_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

struct BodyState {
    body: BoxStream<'static, reqwest::Result<bytes::Bytes>>,
    decoder: SseDecoder,
    ready: VecDeque<AgentEvent>,
    finished: bool,
}

impl BodyState {
    fn absorb(&mut self, payload: &str) {
        let trimmed = payload.trim();
        if trimmed.is_empty() || trimmed == "[DONE]" {
            return;
        }
        let decoded = serde_json::from_str::<Value>(trimmed)
            .map_err(Error::from)
            .and_then(|value| decode_envelope(&value));
        match decoded {
            Ok(events) => self.ready.extend(events),
            Err(e) => {
                warn!(error = %e, "Dropping malformed agent payload");
                self.ready.push_back(AgentEvent::error(e.to_string()));
                self.finished = true;
            }
        }
    }
}

#[async_trait::async_trait]
impl ProtocolClient for HttpA2aClient {
    #[instrument(skip(self, message), fields(message_id = %message.id))]
    async fn open(&self, endpoint: &str, message: &OutboundMessage) -> Result<AgentEventStream> {
        let response = self
            .client
            .post(endpoint)
            .header("Accept", "text/event-stream")
            .json(&message.to_jsonrpc())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message: String = body.chars().take(300).collect();
            return Err(Error::Status {
                status: status.as_u16(),
                message,
            });
        }

        let is_sse = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));

        if !is_sse {
            // Non-streaming agents answer with one JSON-RPC response.
            let value: Value = response.json().await?;
            let events = decode_envelope(&value)?;
            debug!(count = events.len(), "Agent answered without streaming");
            return Ok(stream::iter(events).boxed());
        }

        let state = BodyState {
            body: response.bytes_stream().boxed(),
            decoder: SseDecoder::new(),
            ready: VecDeque::new(),
            finished: false,
        };

        let events = stream::unfold(state, |mut state| async move {
            loop {
                if let Some(event) = state.ready.pop_front() {
                    return Some((event, state));
                }
                if state.finished {
                    return None;
                }
                match state.body.next().await {
                    Some(Ok(chunk)) => {
                        for payload in state.decoder.push(&chunk) {
                            state.absorb(&payload);
                            if state.finished {
                                break;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        state.ready.push_back(AgentEvent::error(format!("network error: {e}")));
                        state.finished = true;
                    }
                    None => {
                        if let Some(payload) = state.decoder.finish() {
                            state.absorb(&payload);
                        }
                        state.finished = true;
                    }
                }
            }
        });

        Ok(events.boxed())
    }
}
