//! Retry and fallback entry points
//!
//! `retry` re-runs an operation on the calling thread with exponential
//! backoff until it succeeds or the policy's attempts run out. The operation
//! may borrow local data. `retry_with_timeout` additionally bounds every
//! attempt by the policy timeout, which needs an owned, shareable operation.
//! `with_fallback` runs an operation once and swallows a failure in favour of
//! a default value.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{AttemptFailure, RecoveryError};
use crate::policy::{ErrorEvent, RecoveryPolicy};
use crate::timeout::{millis, run_attempt, run_inline};

/// Execute an operation under a recovery policy
///
/// Attempts run strictly in order on the calling thread. The first success is
/// returned immediately. After a failed attempt `k` that is not the last, the
/// policy's sleeper waits `policy.delay_for(k)`. When the final attempt fails
/// the `on_error` callback (if any) is invoked, then the fallback is returned
/// if one is configured; otherwise a [`RecoveryError`] carrying the last
/// failure is returned.
///
/// The policy timeout is not applied here; use [`retry_with_timeout`] for
/// deadline-bounded attempts.
///
/// # Arguments
///
/// * `policy` - Attempts, backoff and fallback settings
/// * `context` - Name of the operation, used in logs and errors
/// * `operation` - The operation to attempt
///
/// # Example
///
/// ```rust
/// use recovery::{retry, RecoveryPolicy};
/// use std::time::Duration;
///
/// let rows = vec![3.0, 4.0, 5.0];
/// let mut calls = 0;
/// let policy = RecoveryPolicy::new(3).with_backoff_unit(Duration::from_millis(1));
///
/// let total = retry(&policy, "sum_rows", || {
///     calls += 1;
///     if calls < 3 {
///         Err("not ready")
///     } else {
///         Ok(rows.iter().sum::<f64>())
///     }
/// });
///
/// assert_eq!(total.unwrap(), 12.0);
/// assert_eq!(calls, 3);
/// ```
pub fn retry<T, E, F>(
    policy: &RecoveryPolicy<T>,
    context: &str,
    mut operation: F,
) -> Result<T, RecoveryError<E>>
where
    F: FnMut() -> Result<T, E>,
    T: Clone,
    E: fmt::Display + 'static,
{
    if let Some(limit) = policy.timeout() {
        warn!(
            context,
            timeout_ms = millis(limit),
            "policy timeout is not applied by retry, use retry_with_timeout"
        );
    }

    run_policy(policy, context, || run_inline(&mut operation))
}

/// Execute an operation under a recovery policy, bounding each attempt by
/// the policy timeout
///
/// With a timeout, every attempt runs on a worker thread and an attempt that
/// overruns fails with [`AttemptFailure::TimedOut`]; the worker is abandoned.
/// Without one this behaves like [`retry`].
///
/// # Example
///
/// ```rust
/// use recovery::{retry_with_timeout, RecoveryPolicy};
/// use std::time::Duration;
///
/// let policy: RecoveryPolicy<u32> = RecoveryPolicy::new(2)
///     .with_backoff_unit(Duration::from_millis(1))
///     .with_timeout(Duration::from_millis(20))
///     .with_fallback(0);
///
/// let value = retry_with_timeout(&policy, "slow_query", || {
///     std::thread::sleep(Duration::from_millis(200));
///     Ok::<_, String>(42)
/// });
///
/// assert_eq!(value.unwrap(), 0);
/// ```
pub fn retry_with_timeout<T, E, F>(
    policy: &RecoveryPolicy<T>,
    context: &str,
    operation: F,
) -> Result<T, RecoveryError<E>>
where
    F: Fn() -> Result<T, E> + Send + Sync + 'static,
    T: Clone + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let operation = Arc::new(operation);
    run_policy(policy, context, || run_attempt(&operation, policy.timeout()))
}

fn run_policy<T, E, A>(
    policy: &RecoveryPolicy<T>,
    context: &str,
    mut attempt_once: A,
) -> Result<T, RecoveryError<E>>
where
    A: FnMut() -> Result<T, AttemptFailure<E>>,
    T: Clone,
    E: fmt::Display + 'static,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 0;

    loop {
        match attempt_once() {
            Ok(value) => {
                if attempt > 0 {
                    debug!(context, attempt = attempt + 1, "retry succeeded");
                }
                return Ok(value);
            }
            Err(failure) => {
                if policy.should_retry(attempt + 1) {
                    let delay = policy.delay_for(attempt);
                    warn!(
                        context,
                        attempt = attempt + 1,
                        max_attempts,
                        delay_ms = millis(delay),
                        error = %failure,
                        "operation failed, will retry"
                    );
                    policy.sleeper().sleep(delay);
                    attempt += 1;
                    continue;
                }

                warn!(
                    context,
                    attempt = attempt + 1,
                    max_attempts,
                    error = %failure,
                    "operation failed, attempts exhausted"
                );
                return exhausted(policy, context, attempt, failure);
            }
        }
    }
}

fn exhausted<T, E>(
    policy: &RecoveryPolicy<T>,
    context: &str,
    attempt: usize,
    failure: AttemptFailure<E>,
) -> Result<T, RecoveryError<E>>
where
    T: Clone,
    E: fmt::Display + 'static,
{
    if let Some(callback) = policy.on_error() {
        callback(&ErrorEvent::new(context, attempt, &failure));
    }

    if let Some(fallback) = policy.fallback() {
        info!(context, "returning fallback value");
        return Ok(fallback.clone());
    }

    Err(RecoveryError::new(context, attempt + 1, failure))
}

/// Run an operation once, returning `fallback` if it fails
///
/// No retry, no backoff. Errors and panics are logged and replaced by the
/// fallback value.
///
/// # Example
///
/// ```rust
/// use recovery::with_fallback;
///
/// let value: Option<u32> = with_fallback("parse_limit", None, || {
///     "abc".parse::<u32>().map(Some)
/// });
/// assert_eq!(value, None);
/// ```
pub fn with_fallback<T, E, F>(context: &str, fallback: T, operation: F) -> T
where
    F: FnOnce() -> Result<T, E>,
    E: fmt::Display,
{
    match run_inline(operation) {
        Ok(value) => value,
        Err(failure) => {
            warn!(context, error = %failure, "operation failed, using fallback");
            fallback
        }
    }
}
