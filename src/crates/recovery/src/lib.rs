//! Recovery strategies for fallible blocking operations
//!
//! This crate applies retry, timeout and fallback policy to arbitrary
//! operations. It has no knowledge of task handlers and can be used on its own.
//!
//! # Modules
//!
//! - `policy` - `RecoveryPolicy` (attempts, exponential backoff, timeout, fallback)
//! - `retry` - `retry`, `retry_with_timeout` and `with_fallback` entry points
//! - `decorator` - `RetryOnError` / `FallbackOnError` function wrappers
//! - `timeout` - deadline-bounded attempt execution on a worker thread
//! - `sleep` - pluggable backoff sleeping
//! - `error` - `RecoveryError`, `AttemptFailure` and error chain helpers
//!
//! # Example
//!
//! ```rust
//! use recovery::{retry, RecoveryPolicy};
//! use std::time::Duration;
//!
//! let policy = RecoveryPolicy::new(3)
//!     .with_backoff_base(2)
//!     .with_backoff_unit(Duration::from_millis(1));
//!
//! let value = retry(&policy, "load_dataset", || Ok::<_, String>(42)).unwrap();
//! assert_eq!(value, 42);
//! ```
//!
//! Every failure is treated as retryable: an `Err` returned by the operation,
//! a panic, or an attempt that exceeds the policy timeout.

pub mod decorator;
pub mod error;
pub mod policy;
pub mod retry;
pub mod sleep;
pub mod timeout;

pub use decorator::{FallbackOnError, RetryOnError};
pub use error::{
    format_error_chain, panic_message, root_cause, AttemptFailure, FailureKind, RecoveryError,
};
pub use policy::{ErrorCallback, ErrorEvent, RecoveryPolicy};
pub use retry::{retry, retry_with_timeout, with_fallback};
pub use sleep::{RecordingSleeper, Sleeper, ThreadSleeper};
