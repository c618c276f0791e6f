//! Function wrappers that apply a recovery strategy on every call
//!
//! Wrapping keeps the function's argument type and success type; only the
//! failure behaviour changes. The name given to `wrap` becomes the recovery
//! context in logs and errors. `wrap` retries on the calling thread;
//! `wrap_timed` also enforces the policy timeout.
//!
//! # Example
//!
//! ```rust
//! use recovery::{FallbackOnError, RetryOnError};
//! use std::time::Duration;
//!
//! let parse = RetryOnError::new(3, 2)
//!     .with_backoff_unit(Duration::from_millis(1))
//!     .wrap("parse_count", |raw: String| raw.trim().parse::<u32>());
//! assert_eq!(parse(" 12 ".to_string()).unwrap(), 12);
//!
//! let parse_or_zero = FallbackOnError::new(0u32)
//!     .wrap("parse_count", |raw: &str| raw.parse::<u32>());
//! assert_eq!(parse_or_zero("twelve"), 0);
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::RecoveryError;
use crate::policy::{ErrorEvent, RecoveryPolicy};
use crate::retry::{retry, retry_with_timeout, with_fallback};
use crate::sleep::Sleeper;

/// Builder for functions that retry on error
pub struct RetryOnError<T> {
    policy: RecoveryPolicy<T>,
}

impl<T: Clone> RetryOnError<T> {
    /// Retry up to `max_attempts` times with `backoff_base^k` second waits
    pub fn new(max_attempts: usize, backoff_base: u32) -> Self {
        Self {
            policy: RecoveryPolicy::new(max_attempts).with_backoff_base(backoff_base),
        }
    }

    /// Wrap functions with an existing policy
    pub fn from_policy(policy: RecoveryPolicy<T>) -> Self {
        Self { policy }
    }

    /// Per-attempt deadline, applied by [`wrap_timed`](Self::wrap_timed)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.policy = self.policy.with_timeout(timeout);
        self
    }

    pub fn with_timeout_secs(mut self, seconds: u64) -> Self {
        self.policy = self.policy.with_timeout_secs(seconds);
        self
    }

    pub fn with_fallback(mut self, value: T) -> Self {
        self.policy = self.policy.with_fallback(value);
        self
    }

    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.policy = self.policy.with_backoff_unit(unit);
        self
    }

    pub fn with_on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ErrorEvent<'_>) + Send + Sync + 'static,
    {
        self.policy = self.policy.with_on_error(callback);
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.policy = self.policy.with_sleeper(sleeper);
        self
    }

    pub fn policy(&self) -> &RecoveryPolicy<T> {
        &self.policy
    }

    /// Wrap `function` so each call is retried under this policy
    ///
    /// Attempts run on the calling thread, so `function` and its arguments
    /// may borrow. Arguments are cloned for every attempt. The policy timeout
    /// is not applied; see [`wrap_timed`](Self::wrap_timed).
    pub fn wrap<A, E, F>(
        self,
        name: impl Into<String>,
        function: F,
    ) -> impl Fn(A) -> Result<T, RecoveryError<E>>
    where
        F: Fn(A) -> Result<T, E>,
        A: Clone,
        E: fmt::Display + 'static,
    {
        let name = name.into();
        let policy = self.policy;

        move |args: A| retry(&policy, &name, || function(args.clone()))
    }

    /// Wrap a zero-argument `function`
    pub fn wrap0<E, F>(
        self,
        name: impl Into<String>,
        function: F,
    ) -> impl Fn() -> Result<T, RecoveryError<E>>
    where
        F: Fn() -> Result<T, E>,
        E: fmt::Display + 'static,
    {
        let wrapped = self.wrap(name, move |_: ()| function());
        move || wrapped(())
    }
}

impl<T> RetryOnError<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Wrap `function` so each attempt is also bounded by the policy timeout
    ///
    /// Attempts run on a worker thread, so `function` and its arguments must
    /// be owned and shareable.
    pub fn wrap_timed<A, E, F>(
        self,
        name: impl Into<String>,
        function: F,
    ) -> impl Fn(A) -> Result<T, RecoveryError<E>>
    where
        F: Fn(A) -> Result<T, E> + Send + Sync + 'static,
        A: Clone + Send + Sync + 'static,
        E: fmt::Display + Send + 'static,
    {
        let name = name.into();
        let function = Arc::new(function);
        let policy = self.policy;

        move |args: A| {
            let function = Arc::clone(&function);
            retry_with_timeout(&policy, &name, move || function(args.clone()))
        }
    }

    pub fn wrap0_timed<E, F>(
        self,
        name: impl Into<String>,
        function: F,
    ) -> impl Fn() -> Result<T, RecoveryError<E>>
    where
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
        E: fmt::Display + Send + 'static,
    {
        let wrapped = self.wrap_timed(name, move |_: ()| function());
        move || wrapped(())
    }
}

/// Builder for functions that return a default value on error
#[derive(Debug, Clone)]
pub struct FallbackOnError<T> {
    fallback: T,
}

impl<T: Clone> FallbackOnError<T> {
    pub fn new(fallback: T) -> Self {
        Self { fallback }
    }

    /// Wrap `function` so a failed call yields the fallback value
    pub fn wrap<A, E, F>(self, name: impl Into<String>, function: F) -> impl Fn(A) -> T
    where
        F: Fn(A) -> Result<T, E>,
        E: fmt::Display,
    {
        let name = name.into();
        let fallback = self.fallback;

        move |args: A| with_fallback(&name, fallback.clone(), || function(args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sleep::RecordingSleeper;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_wrapped_function_retries() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let fit = RetryOnError::new(3, 2)
            .with_sleeper(sleeper.clone())
            .wrap("fit_model", move |rows: usize| {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(format!("only {} rows", rows))
                } else {
                    Ok(rows * 2)
                }
            });

        assert_eq!(fit(21).unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            sleeper.recorded(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[test]
    fn test_wrapped_function_uses_name_as_context() {
        let wrapped = RetryOnError::<()>::new(2, 1)
            .with_sleeper(Arc::new(RecordingSleeper::new()))
            .wrap("render_chart", |_: ()| Err::<(), _>("no backend"));

        let err = wrapped(()).unwrap_err();
        assert_eq!(err.context(), "render_chart");
        assert_eq!(err.attempts(), 2);
        assert_eq!(
            err.to_string(),
            "render_chart failed after 2 attempt(s): no backend"
        );
    }

    #[test]
    fn test_wrapped_function_with_fallback() {
        let wrapped = RetryOnError::new(2, 1)
            .with_fallback(Vec::<f64>::new())
            .with_sleeper(Arc::new(RecordingSleeper::new()))
            .wrap("forecast", |_horizon: u32| Err::<Vec<f64>, _>("did not converge"));

        assert!(wrapped(12).unwrap().is_empty());
    }

    #[test]
    fn test_wrapped_function_is_reusable() {
        let wrapped = RetryOnError::<u32>::new(1, 1).wrap("double", |x: u32| Ok::<_, String>(x * 2));
        assert_eq!(wrapped(1).unwrap(), 2);
        assert_eq!(wrapped(5).unwrap(), 10);
    }

    #[test]
    fn test_wrap0() {
        let wrapped = RetryOnError::new(1, 1).wrap0("constant", || Ok::<_, String>("value"));
        assert_eq!(wrapped().unwrap(), "value");
    }

    #[test]
    fn test_wrap_borrowed_slice() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let ceiling = 6.0;
        let steady = vec![2.0, 4.0, 9.0];
        let spiky = vec![10.0, 12.0];

        let mean_below = RetryOnError::new(2, 1)
            .with_sleeper(sleeper.clone())
            .wrap("mean_below_ceiling", |data: &[f64]| {
                let mean = data.iter().sum::<f64>() / data.len() as f64;
                if mean < ceiling {
                    Ok(mean)
                } else {
                    Err(format!("mean {} above {}", mean, ceiling))
                }
            });

        assert_eq!(mean_below(&steady[..]).unwrap(), 5.0);
        let err = mean_below(&spiky[..]).unwrap_err();
        assert_eq!(err.attempts(), 2);
        assert_eq!(err.original().map(String::as_str), Some("mean 11 above 6"));
        assert_eq!(sleeper.recorded(), vec![Duration::from_secs(1)]);
    }

    #[test]
    fn test_wrap_timed_enforces_timeout() {
        let slow = RetryOnError::<u8>::new(2, 1)
            .with_timeout(Duration::from_millis(10))
            .with_sleeper(Arc::new(RecordingSleeper::new()))
            .wrap0_timed("slow_source", || {
                std::thread::sleep(Duration::from_millis(200));
                Ok::<_, String>(1)
            });

        let err = slow().unwrap_err();
        assert_eq!(err.attempts(), 2);
        assert!(err.last_failure().is_timeout());
    }

    #[test]
    fn test_wrap_timed_passes_arguments() {
        let scale = RetryOnError::<Vec<f64>>::new(1, 1)
            .with_timeout(Duration::from_secs(1))
            .wrap_timed("scale", |(factor, values): (f64, Vec<f64>)| {
                Ok::<_, String>(values.iter().map(|v| v * factor).collect())
            });

        assert_eq!(scale((2.0, vec![1.0, 1.5])).unwrap(), vec![2.0, 3.0]);
    }

    #[test]
    fn test_fallback_decorator() {
        let lookup = FallbackOnError::new(None).wrap("lookup", |key: &str| {
            if key == "mean" {
                Ok(Some(3.5))
            } else {
                Err(format!("unknown statistic {}", key))
            }
        });

        assert_eq!(lookup("mean"), Some(3.5));
        assert_eq!(lookup("median"), None);
    }
}
