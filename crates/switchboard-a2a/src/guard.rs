//! Terminal guard
//!
//! Enforces the per-call stream contract on top of any raw event stream:
//! zero or more non-terminal events, then exactly one terminal event, then
//! nothing. Contract violations become a single [`AgentEvent::Error`].

use crate::event::AgentEvent;
use futures::stream::{self, BoxStream, StreamExt};
use std::time::Duration;
use tracing::warn;

struct GuardState {
    inner: BoxStream<'static, AgentEvent>,
    trailing_window: Duration,
    pending_terminal: Option<AgentEvent>,
    done: bool,
}

/// Wrap `inner` so that it honours the terminal contract.
///
/// A final status is held back for at most `trailing_window`; if the remote
/// keeps talking within that window the terminal is replaced by a
/// protocol-violation error. The inner stream (and its connection) is
/// dropped as soon as the terminal is emitted.
pub fn guard_terminal(
    inner: BoxStream<'static, AgentEvent>,
    trailing_window: Duration,
) -> BoxStream<'static, AgentEvent> {
    let state = GuardState {
        inner,
        trailing_window,
        pending_terminal: None,
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.done {
            return None;
        }

        loop {
            if let Some(terminal) = state.pending_terminal.take() {
                state.done = true;
                let trailing = if state.trailing_window.is_zero() {
                    None
                } else {
                    tokio::time::timeout(state.trailing_window, state.inner.next())
                        .await
                        .ok()
                        .flatten()
                };
                let event = match trailing {
                    None => terminal,
                    Some(extra) => {
                        warn!(
                            kind = extra.kind(),
                            "Agent emitted an event after its final status"
                        );
                        AgentEvent::error(format!(
                            "protocol violation: `{}` event received after final status",
                            extra.kind()
                        ))
                    }
                };
                state.inner = stream::empty().boxed();
                return Some((event, state));
            }

            match state.inner.next().await {
                None => {
                    state.done = true;
                    state.inner = stream::empty().boxed();
                    return Some((
                        AgentEvent::error("stream closed before a final status was received"),
                        state,
                    ));
                }
                Some(event @ AgentEvent::Error { .. }) => {
                    state.done = true;
                    state.inner = stream::empty().boxed();
                    return Some((event, state));
                }
                Some(event) if event.is_terminal() => {
                    state.pending_terminal = Some(event);
                }
                Some(event) => return Some((event, state)),
            }
        }
    })
    .boxed()
}
