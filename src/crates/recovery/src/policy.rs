//! Recovery policy configuration
//!
//! A [`RecoveryPolicy`] bundles everything that governs how an operation is
//! re-attempted: how many attempts, how long to back off between them, the
//! per-attempt timeout, and what to return once attempts run out.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AttemptFailure, FailureKind};
use crate::sleep::{Sleeper, ThreadSleeper};

/// Details handed to the `on_error` callback after the final attempt fails
#[derive(Clone)]
pub struct ErrorEvent<'a> {
    /// Name of the recovered operation
    pub context: &'a str,

    /// Zero-based index of the failed attempt
    pub attempt: usize,

    /// How the final attempt failed
    pub kind: FailureKind,

    /// Rendered failure
    pub message: String,

    error: Option<&'a dyn Any>,
}

impl<'a> ErrorEvent<'a> {
    /// Describe the failure of attempt `attempt`
    pub fn new<E>(context: &'a str, attempt: usize, failure: &'a AttemptFailure<E>) -> Self
    where
        E: fmt::Display + 'static,
    {
        Self {
            context,
            attempt,
            kind: failure.kind(),
            message: failure.to_string(),
            error: failure.error().map(|e| e as &dyn Any),
        }
    }

    /// The operation's own error, when it returned one of type `E`
    ///
    /// `None` for timeouts, panics and worker failures.
    pub fn error<E: 'static>(&self) -> Option<&'a E> {
        self.error.and_then(|e| e.downcast_ref::<E>())
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == FailureKind::TimedOut
    }
}

impl fmt::Debug for ErrorEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorEvent")
            .field("context", &self.context)
            .field("attempt", &self.attempt)
            .field("kind", &self.kind)
            .field("message", &self.message)
            .finish()
    }
}

/// Callback invoked once attempts are exhausted
pub type ErrorCallback = Arc<dyn Fn(&ErrorEvent<'_>) + Send + Sync>;

/// Configuration for retrying, timing out and falling back
///
/// The wait before retrying after attempt `k` (zero-based) is
/// `backoff_base^k * backoff_unit`. With the default unit of one second this
/// is `backoff_base^k` seconds, so the first retry always waits at least one
/// unit.
pub struct RecoveryPolicy<T> {
    max_attempts: usize,
    backoff_base: u32,
    backoff_unit: Duration,
    timeout: Option<Duration>,
    fallback: Option<T>,
    on_error: Option<ErrorCallback>,
    sleeper: Arc<dyn Sleeper>,
}

impl<T> RecoveryPolicy<T> {
    /// Create a policy with the given number of attempts (including the first)
    ///
    /// Zero is raised to one: an operation is always attempted.
    ///
    /// # Example
    ///
    /// ```rust
    /// use recovery::RecoveryPolicy;
    ///
    /// let policy: RecoveryPolicy<()> = RecoveryPolicy::new(3);
    /// assert_eq!(policy.max_attempts(), 3);
    /// assert_eq!(policy.backoff_base(), 2);
    /// ```
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base: 2,
            backoff_unit: Duration::from_secs(1),
            timeout: None,
            fallback: None,
            on_error: None,
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    /// Set the exponential backoff base (minimum 1)
    pub fn with_backoff_base(mut self, base: u32) -> Self {
        self.backoff_base = base.max(1);
        self
    }

    /// Set the unit the backoff formula is expressed in
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    /// Bound each attempt's wall-clock duration
    ///
    /// Enforced by [`retry_with_timeout`](crate::retry_with_timeout).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Bound each attempt's wall-clock duration in whole seconds
    pub fn with_timeout_secs(self, seconds: u64) -> Self {
        self.with_timeout(Duration::from_secs(seconds))
    }

    /// Return `value` instead of failing once attempts are exhausted
    pub fn with_fallback(mut self, value: T) -> Self {
        self.fallback = Some(value);
        self
    }

    /// Observe the final failure before the fallback or error is produced
    pub fn with_on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ErrorEvent<'_>) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// Replace the backoff sleeper
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn backoff_base(&self) -> u32 {
        self.backoff_base
    }

    pub fn backoff_unit(&self) -> Duration {
        self.backoff_unit
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn fallback(&self) -> Option<&T> {
        self.fallback.as_ref()
    }

    pub fn on_error(&self) -> Option<&ErrorCallback> {
        self.on_error.as_ref()
    }

    pub fn sleeper(&self) -> &dyn Sleeper {
        self.sleeper.as_ref()
    }

    /// Wait before the retry that follows attempt `attempt` (0-indexed)
    ///
    /// Computed in nanoseconds; saturates at `Duration::MAX` instead of
    /// overflowing.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let exponent = u32::try_from(attempt).unwrap_or(u32::MAX);
        let nanos = u128::from(self.backoff_base)
            .checked_pow(exponent)
            .and_then(|factor| self.backoff_unit.as_nanos().checked_mul(factor));

        nanos.map_or(Duration::MAX, duration_from_nanos)
    }

    /// Whether another attempt is allowed after `attempts` have been made
    pub fn should_retry(&self, attempts: usize) -> bool {
        attempts < self.max_attempts
    }

    /// Swap the fallback type, keeping every other setting
    pub fn map_fallback<U>(self, fallback: Option<U>) -> RecoveryPolicy<U> {
        RecoveryPolicy {
            max_attempts: self.max_attempts,
            backoff_base: self.backoff_base,
            backoff_unit: self.backoff_unit,
            timeout: self.timeout,
            fallback,
            on_error: self.on_error,
            sleeper: self.sleeper,
        }
    }
}

fn duration_from_nanos(nanos: u128) -> Duration {
    const NANOS_PER_SEC: u128 = 1_000_000_000;

    match u64::try_from(nanos / NANOS_PER_SEC) {
        // the remainder is below one second, so it fits in u32
        Ok(secs) => Duration::new(secs, (nanos % NANOS_PER_SEC) as u32),
        Err(_) => Duration::MAX,
    }
}

impl<T> Default for RecoveryPolicy<T> {
    fn default() -> Self {
        Self::new(3)
    }
}

impl<T: Clone> Clone for RecoveryPolicy<T> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            backoff_base: self.backoff_base,
            backoff_unit: self.backoff_unit,
            timeout: self.timeout,
            fallback: self.fallback.clone(),
            on_error: self.on_error.clone(),
            sleeper: Arc::clone(&self.sleeper),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for RecoveryPolicy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff_base", &self.backoff_base)
            .field("backoff_unit", &self.backoff_unit)
            .field("timeout", &self.timeout)
            .field("fallback", &self.fallback)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
