//! Resilient task execution for analysis workers
//!
//! Every analysis capability is a [`TaskHandler`] returning a [`TaskResult`].
//! Callers invoke handlers through [`TaskHandler::safe_execute`], which never
//! fails: unexpected errors and panics become failed results and are reported
//! to the handler's [`ErrorIntelligence`] sink. [`Coordinator`]s compose
//! handlers, and the [`recovery`] crate adds retry, backoff, timeout and
//! fallback around any operation.
//!
//! # Modules
//!
//! - `result` - `TaskResult`, `ErrorRecord` and the `ErrorKind` taxonomy
//! - `params` - `TaskParams` and input validation
//! - `handler` - the `TaskHandler` trait and `safe_execute`
//! - `intelligence` - error intelligence sinks
//! - `coordinator` - handler composition
//! - `config` - TOML and environment configuration
//! - `logging` - `tracing` subscriber setup
//!
//! # Example
//!
//! ```rust
//! use workers::{ErrorKind, HandlerIdentity, TaskHandler, TaskParams, TaskResult};
//!
//! struct RowCountHandler {
//!     identity: HandlerIdentity,
//! }
//!
//! impl TaskHandler for RowCountHandler {
//!     fn identity(&self) -> &HandlerIdentity {
//!         &self.identity
//!     }
//!
//!     fn execute(&self, params: &TaskParams) -> anyhow::Result<TaskResult> {
//!         match params.require_rows("rows", 1) {
//!             Ok(rows) => Ok(TaskResult::new(self.name(), "count").with_payload("rows", rows.len())),
//!             Err(e) => Ok(TaskResult::reject(self.name(), "count", e)),
//!         }
//!     }
//! }
//!
//! let handler = RowCountHandler { identity: HandlerIdentity::new("RowCountHandler", "profiling") };
//! let result = handler.safe_execute(&TaskParams::new());
//! assert!(!result.success);
//! assert_eq!(result.errors[0].kind, ErrorKind::MissingData);
//! ```

pub mod config;
pub mod coordinator;
pub mod handler;
pub mod intelligence;
pub mod logging;
pub mod params;
pub mod result;

pub use config::{ConfigError, LoggingConfig, RecoveryConfig, WorkersConfig};
pub use coordinator::{Coordinator, CoordinatorKind, CoordinatorReport, IncompleteRun};
pub use handler::{safe_execute, HandlerIdentity, TaskHandler};
pub use intelligence::{
    ErrorIntelligence, EventContext, HandlerStats, HealthStatus, InMemoryIntelligence,
    NoopIntelligence, TrackedEvent, TrackedOutcome, TracingIntelligence,
};
pub use params::{InputError, TaskParams};
pub use result::{ErrorKind, ErrorRecord, Severity, TaskResult};

pub use recovery;
