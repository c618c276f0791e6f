//! Backoff sleeping
//!
//! Retry loops sleep through a [`Sleeper`] so the waits can be observed
//! (or skipped) without changing the loop itself.

use std::sync::Mutex;
use std::time::Duration;

/// Blocks the calling thread between attempts
pub trait Sleeper: Send + Sync {
    /// Wait for `duration`
    fn sleep(&self, duration: Duration);
}

/// Sleeps on the current thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Records requested waits without sleeping
///
/// # Example
///
/// ```rust
/// use recovery::{RecordingSleeper, Sleeper};
/// use std::time::Duration;
///
/// let sleeper = RecordingSleeper::new();
/// sleeper.sleep(Duration::from_secs(4));
/// assert_eq!(sleeper.recorded(), vec![Duration::from_secs(4)]);
/// ```
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits requested so far, in order
    pub fn recorded(&self) -> Vec<Duration> {
        self.waits
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Sum of all requested waits
    pub fn total(&self) -> Duration {
        self.recorded().into_iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.waits
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(duration);
    }
}
