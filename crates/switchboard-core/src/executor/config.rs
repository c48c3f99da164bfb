//! Executor configuration

use crate::utils::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_call_timeout_ms() -> u64 {
    120_000
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_cancel_grace_ms() -> u64 {
    2_000
}

fn default_trailing_window_ms() -> u64 {
    25
}

fn default_fan_in_capacity() -> usize {
    256
}

/// Executor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Deadline for one agent call, from dispatch to terminal event
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Connection setup timeout for the HTTP client
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// How long cancelled agents get to wind down
    #[serde(default = "default_cancel_grace_ms")]
    pub cancel_grace_ms: u64,
    /// How long a call is watched for events after its terminal one
    #[serde(default = "default_trailing_window_ms")]
    pub trailing_window_ms: u64,
    /// Capacity of the fan-in channel
    #[serde(default = "default_fan_in_capacity")]
    pub fan_in_capacity: usize,
    /// Retries for opening a call
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            cancel_grace_ms: default_cancel_grace_ms(),
            trailing_window_ms: default_trailing_window_ms(),
            fan_in_capacity: default_fan_in_capacity(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ExecutorConfig {
    /// Per-call deadline
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Connection setup timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Cancellation grace period
    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }

    /// Trailing window for the terminal guard
    pub fn trailing_window(&self) -> Duration {
        Duration::from_millis(self.trailing_window_ms)
    }
}
