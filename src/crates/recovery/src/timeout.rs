//! Deadline-bounded attempt execution
//!
//! Without a timeout an attempt runs inline on the calling thread. With one,
//! the attempt runs on a dedicated worker thread and the caller waits on a
//! channel until the deadline; an attempt that overruns is abandoned and
//! reported as [`AttemptFailure::TimedOut`]. This works from any thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::error::{panic_message, AttemptFailure};

/// Run one attempt of `operation`, bounded by `timeout` when given
pub fn run_attempt<T, E, F>(
    operation: &Arc<F>,
    timeout: Option<Duration>,
) -> Result<T, AttemptFailure<E>>
where
    F: Fn() -> Result<T, E> + Send + Sync + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    match timeout {
        None => run_inline(|| operation()),
        Some(limit) => run_with_deadline(Arc::clone(operation), limit),
    }
}

/// Run `operation` on the calling thread, converting panics into failures
pub fn run_inline<T, E, F>(operation: F) -> Result<T, AttemptFailure<E>>
where
    F: FnOnce() -> Result<T, E>,
{
    match panic::catch_unwind(AssertUnwindSafe(operation)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(AttemptFailure::Failed(error)),
        Err(payload) => Err(AttemptFailure::Panicked(panic_message(payload.as_ref()))),
    }
}

/// Run `operation` on a worker thread and wait at most `limit` for it
pub fn run_with_deadline<T, E, F>(operation: Arc<F>, limit: Duration) -> Result<T, AttemptFailure<E>>
where
    F: Fn() -> Result<T, E> + Send + Sync + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);

    let spawned = thread::Builder::new()
        .name("recovery-attempt".to_string())
        .spawn(move || {
            let outcome = run_inline(|| operation());
            // The caller may have stopped waiting already.
            let _ = tx.send(outcome);
        });

    if let Err(e) = spawned {
        return Err(AttemptFailure::Worker(format!(
            "failed to spawn attempt worker: {}",
            e
        )));
    }

    match rx.recv_timeout(limit) {
        Ok(outcome) => outcome,
        Err(RecvTimeoutError::Timeout) => {
            debug!(timeout_ms = millis(limit), "attempt abandoned at deadline");
            Err(AttemptFailure::TimedOut(limit))
        }
        Err(RecvTimeoutError::Disconnected) => Err(AttemptFailure::Worker(
            "attempt worker exited without reporting".to_string(),
        )),
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
