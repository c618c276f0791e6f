//! Recovery errors and error chain helpers

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

/// Why a single attempt failed
#[derive(Debug)]
pub enum AttemptFailure<E> {
    /// The operation returned an error
    Failed(E),

    /// The attempt did not finish within the policy timeout
    TimedOut(Duration),

    /// The operation panicked
    Panicked(String),

    /// The attempt worker could not be started or vanished without a result
    Worker(String),
}

/// Variant of an [`AttemptFailure`] without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Failed,
    TimedOut,
    Panicked,
    Worker,
}

impl<E> AttemptFailure<E> {
    pub fn kind(&self) -> FailureKind {
        match self {
            AttemptFailure::Failed(_) => FailureKind::Failed,
            AttemptFailure::TimedOut(_) => FailureKind::TimedOut,
            AttemptFailure::Panicked(_) => FailureKind::Panicked,
            AttemptFailure::Worker(_) => FailureKind::Worker,
        }
    }

    /// The operation's own error, if that is what failed the attempt
    pub fn error(&self) -> Option<&E> {
        match self {
            AttemptFailure::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_error(self) -> Option<E> {
        match self {
            AttemptFailure::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, AttemptFailure::TimedOut(_))
    }
}

impl<E: fmt::Display> fmt::Display for AttemptFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::Failed(e) => write!(f, "{}", e),
            AttemptFailure::TimedOut(d) => write!(f, "attempt timed out after {:?}", d),
            AttemptFailure::Panicked(msg) => write!(f, "attempt panicked: {}", msg),
            AttemptFailure::Worker(msg) => write!(f, "attempt worker failed: {}", msg),
        }
    }
}

// `Failed` renders as the wrapped error, so the chain continues from that
// error's own source to avoid printing the same message twice.
impl<E: StdError + 'static> StdError for AttemptFailure<E> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            AttemptFailure::Failed(e) => e.source(),
            _ => None,
        }
    }
}

/// Raised when every attempt failed and no fallback was configured
#[derive(Debug)]
pub struct RecoveryError<E> {
    context: String,
    attempts: usize,
    last: AttemptFailure<E>,
}

impl<E> RecoveryError<E> {
    pub fn new(context: impl Into<String>, attempts: usize, last: AttemptFailure<E>) -> Self {
        Self {
            context: context.into(),
            attempts,
            last,
        }
    }

    /// Name of the recovered operation
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Number of attempts made
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// Failure of the final attempt
    pub fn last_failure(&self) -> &AttemptFailure<E> {
        &self.last
    }

    /// The operation's original error from the final attempt, if it returned one
    pub fn original(&self) -> Option<&E> {
        self.last.error()
    }

    pub fn into_last_failure(self) -> AttemptFailure<E> {
        self.last
    }
}

impl<E: fmt::Display> fmt::Display for RecoveryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed after {} attempt(s): {}",
            self.context, self.attempts, self.last
        )
    }
}

impl<E: StdError + 'static> StdError for RecoveryError<E> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match &self.last {
            AttemptFailure::Failed(e) => Some(e),
            other => Some(other),
        }
    }
}

/// Render a panic payload as text
///
/// `&str` and `String` payloads are returned as-is; anything else is reported
/// as a non-standard payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-standard panic payload".to_string()
    }
}

/// Format an error chain as a multi-line string
///
/// # Example
///
/// ```rust
/// use recovery::format_error_chain;
///
/// let err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
/// assert_eq!(format_error_chain(&err), "Error: disk full");
/// ```
pub fn format_error_chain(error: &dyn StdError) -> String {
    let mut result = format!("Error: {}", error);
    let mut current = error.source();
    let mut level = 1;

    while let Some(source) = current {
        result.push_str(&format!(
            "\n{:indent$}Caused by: {}",
            "",
            source,
            indent = level * 2
        ));
        current = source.source();
        level += 1;
    }

    result
}

/// Get the root cause of an error chain
pub fn root_cause(error: &dyn StdError) -> &dyn StdError {
    let mut current = error;
    while let Some(source) = current.source() {
        current = source;
    }
    current
}
