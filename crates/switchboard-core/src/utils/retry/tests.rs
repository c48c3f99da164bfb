use super::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio_test::assert_err;

#[test]
fn test_default_is_single_attempt() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.max_attempts, 1);
    assert_eq!(policy, RetryPolicy::none());
}

#[test]
fn test_delay_grows_and_is_capped() {
    let policy = RetryPolicy {
        initial_delay_ms: 100,
        max_delay_ms: 300,
        backoff_multiplier: 2.0,
        jitter: false,
        ..RetryPolicy::default()
    };
    assert_eq!(policy.delay_after(1), Duration::from_millis(100));
    assert_eq!(policy.delay_after(2), Duration::from_millis(200));
    assert_eq!(policy.delay_after(3), Duration::from_millis(300));
    assert_eq!(policy.delay_after(10), Duration::from_millis(300));
}

#[test]
fn test_jitter_stays_within_quarter() {
    let policy = RetryPolicy {
        initial_delay_ms: 400,
        jitter: true,
        ..RetryPolicy::default()
    };
    let delay = policy.delay_after(1);
    assert!(delay >= Duration::from_millis(400));
    assert!(delay < Duration::from_millis(500));
}

#[test]
fn test_policy_deserializes_with_defaults() {
    let policy: RetryPolicy = serde_json::from_str(r#"{"max_attempts": 3}"#).unwrap();
    assert_eq!(policy.max_attempts, 3);
    assert_eq!(policy.initial_delay_ms, 200);
}

async fn run(policy: &RetryPolicy, fail_times: u32, retryable: bool) -> (Result<u32, RetryError<String>>, u32) {
    let counter = Arc::new(AtomicU32::new(0));
    let c = counter.clone();
    let result = retry_with_backoff(
        policy,
        || {
            let c = c.clone();
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst);
                if n < fail_times {
                    Err(format!("refused #{n}"))
                } else {
                    Ok(n)
                }
            }
        },
        |_| retryable,
    )
    .await;
    (result, counter.load(Ordering::SeqCst))
}

#[tokio::test]
async fn test_single_attempt_by_default() {
    let (result, calls) = run(&RetryPolicy::none(), 1, true).await;
    let err = result.unwrap_err();
    assert_eq!(calls, 1);
    assert_eq!(err.attempts, 1);
    assert_eq!(err.to_string(), "refused #0");
}

#[tokio::test]
async fn test_succeeds_after_retries() {
    let policy = RetryPolicy::none()
        .with_max_attempts(3)
        .with_initial_delay(Duration::from_millis(1));
    let (result, calls) = run(&policy, 2, true).await;
    assert_eq!(result.unwrap(), 2);
    assert_eq!(calls, 3);
}

#[tokio::test]
async fn test_gives_up_after_max_attempts() {
    let policy = RetryPolicy::none()
        .with_max_attempts(2)
        .with_initial_delay(Duration::from_millis(1));
    let (result, calls) = run(&policy, 5, true).await;
    let err = result.unwrap_err();
    assert_eq!(calls, 2);
    assert_eq!(err.to_string(), "refused #1 (after 2 attempts)");
}

#[tokio::test]
async fn test_non_retryable_stops_immediately() {
    let policy = RetryPolicy::none()
        .with_max_attempts(3)
        .with_initial_delay(Duration::from_millis(1));
    let (result, calls) = run(&policy, 5, false).await;
    assert_err!(result);
    assert_eq!(calls, 1);
}
