//! Agent events
//!
//! Wire payloads are decoded exactly once, here, into the closed
//! [`AgentEvent`] sum type. Downstream code never re-inspects `kind` strings.

use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Lifecycle state reported by a remote agent in a status update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    /// Accepted, not yet started
    Submitted,
    /// Actively working
    Working,
    /// Waiting for the end user to answer a question
    InputRequired,
    /// Waiting for the end user to authenticate
    AuthRequired,
    /// Finished successfully
    Completed,
    /// Cancelled (remotely or by us)
    Canceled,
    /// Finished with a failure
    Failed,
    /// Refused the request
    Rejected,
    /// A state this client does not know about
    Other(String),
}

impl TaskState {
    /// Parse a wire state string (`"input-required"`, `"completed"`, ...).
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "submitted" => Self::Submitted,
            "working" => Self::Working,
            "input-required" => Self::InputRequired,
            "auth-required" => Self::AuthRequired,
            "completed" => Self::Completed,
            "canceled" | "cancelled" => Self::Canceled,
            "failed" => Self::Failed,
            "rejected" => Self::Rejected,
            _ => Self::Other(raw.to_string()),
        }
    }

    /// Wire representation
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Submitted => "submitted",
            Self::Working => "working",
            Self::InputRequired => "input-required",
            Self::AuthRequired => "auth-required",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
            Self::Other(raw) => raw,
        }
    }

    /// Whether a final status in this state means the agent did not succeed.
    #[must_use]
    pub fn is_unsuccessful(&self) -> bool {
        matches!(self, Self::Canceled | Self::Failed | Self::Rejected)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TaskState {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One event produced by a protocol client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Lifecycle update; `is_final` marks the terminal event of a call
    StatusUpdate {
        /// Reported state
        state: TaskState,
        /// Terminal marker
        is_final: bool,
        /// Optional human-readable status message
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Streamed prose
    ContentFragment {
        /// Text chunk
        text: String,
        /// Append to the previous content (`false` replaces it)
        append: bool,
    },
    /// Structured payload (e.g. a form the end user must fill)
    DataFragment {
        /// Payload, passed through verbatim
        payload: Value,
    },
    /// Terminal failure of this call
    Error {
        /// Failure description
        message: String,
    },
    /// Event kind this client does not understand (forward compatibility)
    Unknown {
        /// The unrecognised `kind`
        kind: String,
        /// The raw payload
        payload: Value,
    },
}

impl AgentEvent {
    /// Build a terminal error event.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Build a final status update.
    #[must_use]
    pub fn finished(state: TaskState) -> Self {
        Self::StatusUpdate {
            state,
            is_final: true,
            message: None,
        }
    }

    /// Whether this event ends the call.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::StatusUpdate { is_final: true, .. } | Self::Error { .. }
        )
    }

    /// Short name used in logs
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::StatusUpdate { .. } => "status-update",
            Self::ContentFragment { .. } => "content",
            Self::DataFragment { .. } => "data",
            Self::Error { .. } => "error",
            Self::Unknown { kind, .. } => kind,
        }
    }

    /// Text carried by an unknown event, used when passing it through as content.
    ///
    /// Prefers `text` parts found in the payload; falls back to the raw JSON.
    #[must_use]
    pub fn passthrough_text(payload: &Value) -> String {
        let candidates = ["/parts", "/message/parts", "/status/message/parts"];
        for pointer in candidates {
            if let Some(parts) = payload.pointer(pointer).and_then(Value::as_array) {
                let text = join_text_parts(parts);
                if !text.is_empty() {
                    return text;
                }
            }
        }
        if let Some(text) = payload.get("text").and_then(Value::as_str) {
            return text.to_string();
        }
        payload.to_string()
    }
}

/// Decode one JSON-RPC response (or a bare event object) into events.
///
/// A single artifact update may carry both text and data parts, so one
/// payload can yield several events.
pub fn decode_envelope(envelope: &Value) -> Result<Vec<AgentEvent>> {
    if let Some(err) = envelope.get("error").filter(|e| !e.is_null()) {
        let code = err.get("code").and_then(Value::as_i64).unwrap_or(0);
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown remote error");
        return Ok(vec![AgentEvent::error(format!(
            "remote error {code}: {message}"
        ))]);
    }

    match envelope.get("result") {
        Some(result) => decode_result(result),
        None if envelope.get("kind").is_some() => decode_result(envelope),
        None => Err(Error::Malformed(
            "payload has neither `result`, `error` nor `kind`".to_string(),
        )),
    }
}

/// Decode a `result` object by its `kind`.
pub fn decode_result(result: &Value) -> Result<Vec<AgentEvent>> {
    let kind = result
        .get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Malformed("event is missing `kind`".to_string()))?;

    match kind {
        "status-update" => {
            let state = result
                .pointer("/status/state")
                .or_else(|| result.get("state"))
                .and_then(Value::as_str)
                .ok_or_else(|| Error::Malformed("status-update without state".to_string()))?;
            let is_final = result.get("final").and_then(Value::as_bool).unwrap_or(false);
            let message = result
                .pointer("/status/message/parts")
                .and_then(Value::as_array)
                .map(|parts| join_text_parts(parts))
                .or_else(|| {
                    result
                        .get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .filter(|m| !m.is_empty());
            Ok(vec![AgentEvent::StatusUpdate {
                state: TaskState::parse(state),
                is_final,
                message,
            }])
        }
        "artifact-update" => {
            let append = result.get("append").and_then(Value::as_bool).unwrap_or(false);
            if let Some(parts) = result.pointer("/artifact/parts").and_then(Value::as_array) {
                return Ok(decode_parts(parts, append));
            }
            match result.get("content") {
                Some(Value::String(text)) => Ok(vec![AgentEvent::ContentFragment {
                    text: text.clone(),
                    append,
                }]),
                Some(payload) if !payload.is_null() => Ok(vec![AgentEvent::DataFragment {
                    payload: payload.clone(),
                }]),
                _ => Err(Error::Malformed(
                    "artifact-update without parts or content".to_string(),
                )),
            }
        }
        "error" => {
            let message = result
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("agent reported an error");
            Ok(vec![AgentEvent::error(message)])
        }
        other => Ok(vec![AgentEvent::Unknown {
            kind: other.to_string(),
            payload: result.clone(),
        }]),
    }
}

fn decode_parts(parts: &[Value], append: bool) -> Vec<AgentEvent> {
    let mut events = Vec::new();
    let text = join_text_parts(parts);
    if !text.is_empty() {
        events.push(AgentEvent::ContentFragment { text, append });
    }
    for part in parts {
        if part.get("kind").and_then(Value::as_str) == Some("data") {
            if let Some(data) = part.get("data") {
                events.push(AgentEvent::DataFragment {
                    payload: data.clone(),
                });
            }
        }
    }
    events
}

fn join_text_parts(parts: &[Value]) -> String {
    parts
        .iter()
        .filter(|p| {
            matches!(p.get("kind").and_then(Value::as_str), Some("text") | None)
        })
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .concat()
}
