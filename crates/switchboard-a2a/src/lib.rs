//! Switchboard A2A - remote specialist agent protocol
//!
//! This crate talks to specialist agents over the streaming
//! agent-to-agent protocol:
//! - Event: wire payloads decoded once into [`AgentEvent`]
//! - Client: [`ProtocolClient`] seam and the HTTP/SSE implementation
//! - Guard: exactly-one-terminal enforcement for every call
//! - Mock: scripted in-process agents for tests (`mock` feature)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod event;
pub mod guard;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod sse;

pub use client::{
    call, failed_stream, AgentEventStream, HttpA2aClient, OutboundMessage, ProtocolClient,
    DEFAULT_TRAILING_WINDOW,
};
pub use error::{Error, Result};
pub use event::{decode_envelope, decode_result, AgentEvent, TaskState};
pub use guard::guard_terminal;
pub use sse::SseDecoder;
