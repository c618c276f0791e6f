//! Error intelligence collaborator
//!
//! Handlers report every outcome to an [`ErrorIntelligence`] sink. The
//! execution wrapper treats these calls as fire-and-forget; result
//! correctness never depends on what the sink does with the events.
//!
//! Three sinks are provided:
//! - [`NoopIntelligence`] discards events (the default)
//! - [`TracingIntelligence`] emits structured log events
//! - [`InMemoryIntelligence`] keeps an event log and per-handler statistics

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::result::{now_rfc3339, ErrorKind};

/// Free-form context attached to an event
pub type EventContext = Map<String, Value>;

/// Sink for handler success and failure events
///
/// Implementations must be safe to call from several threads at once.
pub trait ErrorIntelligence: Send + Sync {
    fn track_success(&self, handler_name: &str, task_type: &str, context: &EventContext);

    fn track_error(&self, handler_name: &str, kind: ErrorKind, message: &str, context: &EventContext);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopIntelligence;

impl ErrorIntelligence for NoopIntelligence {
    fn track_success(&self, _handler_name: &str, _task_type: &str, _context: &EventContext) {}

    fn track_error(&self, _handler_name: &str, _kind: ErrorKind, _message: &str, _context: &EventContext) {}
}

/// Emits each event through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingIntelligence;

impl ErrorIntelligence for TracingIntelligence {
    fn track_success(&self, handler_name: &str, task_type: &str, context: &EventContext) {
        let context = Value::Object(context.clone());
        info!(handler = handler_name, task_type, context = %context, "task succeeded");
    }

    fn track_error(&self, handler_name: &str, kind: ErrorKind, message: &str, context: &EventContext) {
        let context = Value::Object(context.clone());
        warn!(
            handler = handler_name,
            kind = %kind,
            error = message,
            context = %context,
            "task failed"
        );
    }
}

/// Outcome of a tracked event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum TrackedOutcome {
    Success {
        task_type: String,
    },
    Failure {
        kind: ErrorKind,
        message: String,
    },
}

/// One recorded event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedEvent {
    pub handler_name: String,
    #[serde(flatten)]
    pub outcome: TrackedOutcome,
    pub context: EventContext,
    pub timestamp: String,
}

impl TrackedEvent {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, TrackedOutcome::Success { .. })
    }
}

/// Health classification derived from a handler's track record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Succeeds at least 90% of the time
    Healthy,
    /// Succeeds at least half of the time
    Degraded,
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Aggregate counts for one handler
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandlerStats {
    pub successes: u64,
    pub failures: u64,
    pub failures_by_kind: BTreeMap<ErrorKind, u64>,
    pub last_error: Option<String>,
}

impl HandlerStats {
    pub fn total(&self) -> u64 {
        self.successes + self.failures
    }

    /// Fraction of successful invocations, 1.0 when nothing was recorded
    pub fn success_rate(&self) -> f64 {
        match self.total() {
            0 => 1.0,
            total => self.successes as f64 / total as f64,
        }
    }

    /// Success rate scaled to 0..=100
    ///
    /// Unknown failures weigh double: they point at bugs rather than bad input.
    pub fn health_score(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 100.0;
        }
        let unknown = self
            .failures_by_kind
            .get(&ErrorKind::UnknownError)
            .copied()
            .unwrap_or(0);
        let penalty = (self.failures + unknown) as f64 / total as f64;
        ((1.0 - penalty).max(0.0) * 100.0).round()
    }

    pub fn status(&self) -> HealthStatus {
        let rate = self.success_rate();
        if rate >= 0.9 {
            HealthStatus::Healthy
        } else if rate >= 0.5 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        }
    }
}

#[derive(Debug, Default)]
struct Ledger {
    events: Vec<TrackedEvent>,
    stats: HashMap<String, HandlerStats>,
}

/// Thread-safe in-process event log with per-handler statistics
///
/// # Example
///
/// ```rust
/// use workers::{ErrorIntelligence, ErrorKind, EventContext, InMemoryIntelligence};
///
/// let intelligence = InMemoryIntelligence::new();
/// intelligence.track_success("ChartHandler", "scatter", &EventContext::new());
/// intelligence.track_error("ChartHandler", ErrorKind::InvalidInput, "no column 'z'", &EventContext::new());
///
/// let stats = intelligence.stats("ChartHandler").unwrap();
/// assert_eq!(stats.success_rate(), 0.5);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryIntelligence {
    ledger: Mutex<Ledger>,
}

impl InMemoryIntelligence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TrackedEvent> {
        self.lock().events.clone()
    }

    pub fn events_for(&self, handler_name: &str) -> Vec<TrackedEvent> {
        self.lock()
            .events
            .iter()
            .filter(|e| e.handler_name == handler_name)
            .cloned()
            .collect()
    }

    pub fn stats(&self, handler_name: &str) -> Option<HandlerStats> {
        self.lock().stats.get(handler_name).cloned()
    }

    /// Names of every handler seen so far, sorted
    pub fn handlers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().stats.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn clear(&self) {
        let mut ledger = self.lock();
        ledger.events.clear();
        ledger.stats.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, handler_name: &str, outcome: TrackedOutcome, context: &EventContext) {
        let mut ledger = self.lock();
        let stats = ledger.stats.entry(handler_name.to_string()).or_default();
        match &outcome {
            TrackedOutcome::Success { .. } => stats.successes += 1,
            TrackedOutcome::Failure { kind, message } => {
                stats.failures += 1;
                *stats.failures_by_kind.entry(*kind).or_insert(0) += 1;
                stats.last_error = Some(message.clone());
            }
        }
        ledger.events.push(TrackedEvent {
            handler_name: handler_name.to_string(),
            outcome,
            context: context.clone(),
            timestamp: now_rfc3339(),
        });
    }
}

impl ErrorIntelligence for InMemoryIntelligence {
    fn track_success(&self, handler_name: &str, task_type: &str, context: &EventContext) {
        self.record(
            handler_name,
            TrackedOutcome::Success {
                task_type: task_type.to_string(),
            },
            context,
        );
    }

    fn track_error(&self, handler_name: &str, kind: ErrorKind, message: &str, context: &EventContext) {
        self.record(
            handler_name,
            TrackedOutcome::Failure {
                kind,
                message: message.to_string(),
            },
            context,
        );
    }
}
