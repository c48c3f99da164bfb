//! Utility modules for switchboard-core
//!
//! - retry: bounded retry with exponential backoff for opening agent calls

mod retry;

pub use retry::{retry_with_backoff, RetryError, RetryPolicy};
