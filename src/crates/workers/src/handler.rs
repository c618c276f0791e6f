//! Task handler protocol
//!
//! A handler implements [`TaskHandler::execute`]. Callers go through
//! [`TaskHandler::safe_execute`], which times the call, contains any error or
//! panic that escapes `execute`, reports the outcome to the handler's
//! [`ErrorIntelligence`] sink and always returns a [`TaskResult`].

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use recovery::panic_message;
use serde_json::{json, Value};
use tracing::{debug, info, info_span, warn};

use crate::intelligence::{ErrorIntelligence, EventContext, NoopIntelligence};
use crate::params::TaskParams;
use crate::result::{ErrorKind, TaskResult};

/// Task type recorded when a handler fails before producing a result
pub const EXECUTION_TASK_TYPE: &str = "execution";

/// Name, category and error intelligence sink of a handler
#[derive(Clone)]
pub struct HandlerIdentity {
    name: String,
    category: String,
    intelligence: Arc<dyn ErrorIntelligence>,
}

impl HandlerIdentity {
    /// Identity reporting to [`NoopIntelligence`]
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            intelligence: Arc::new(NoopIntelligence),
        }
    }

    pub fn with_intelligence(mut self, intelligence: Arc<dyn ErrorIntelligence>) -> Self {
        self.intelligence = intelligence;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn intelligence(&self) -> &dyn ErrorIntelligence {
        self.intelligence.as_ref()
    }
}

impl fmt::Debug for HandlerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerIdentity")
            .field("name", &self.name)
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}

/// A pluggable unit of domain work
///
/// `execute` should validate its input and return a failed [`TaskResult`]
/// for anticipated problems (see [`TaskResult::reject`]). Anything else may
/// propagate as an `Err` or even a panic; `safe_execute` contains both.
///
/// # Example
///
/// ```rust
/// use workers::{HandlerIdentity, TaskHandler, TaskParams, TaskResult};
///
/// struct MeanHandler {
///     identity: HandlerIdentity,
/// }
///
/// impl TaskHandler for MeanHandler {
///     fn identity(&self) -> &HandlerIdentity {
///         &self.identity
///     }
///
///     fn execute(&self, params: &TaskParams) -> anyhow::Result<TaskResult> {
///         let column = match params.require_str("column") {
///             Ok(column) => column,
///             Err(e) => return Ok(TaskResult::reject(self.name(), "mean", e)),
///         };
///         let values = params.numeric_column("rows", column)?;
///         let mean = values.iter().sum::<f64>() / values.len() as f64;
///         Ok(TaskResult::new(self.name(), "mean").with_payload("mean", mean))
///     }
/// }
///
/// let handler = MeanHandler { identity: HandlerIdentity::new("MeanHandler", "statistics") };
/// let result = handler.safe_execute(&TaskParams::new());
/// assert!(!result.success);
/// ```
pub trait TaskHandler: Send + Sync {
    fn identity(&self) -> &HandlerIdentity;

    /// Perform the task
    fn execute(&self, params: &TaskParams) -> anyhow::Result<TaskResult>;

    fn name(&self) -> &str {
        self.identity().name()
    }

    /// Run `execute`, never failing
    fn safe_execute(&self, params: &TaskParams) -> TaskResult {
        safe_execute(self, params)
    }
}

/// Execute `handler` with timing, failure containment and outcome reporting
///
/// The returned result always has `execution_time_ms` set. An `Err` or a
/// panic escaping `execute` becomes a failed result of kind
/// [`ErrorKind::UnknownError`] whose task type is the `task_type` parameter
/// when one was given, `"execution"` otherwise.
pub fn safe_execute<H>(handler: &H, params: &TaskParams) -> TaskResult
where
    H: TaskHandler + ?Sized,
{
    let identity = handler.identity();
    let span = info_span!(
        "safe_execute",
        handler = identity.name(),
        task_type = tracing::field::Empty
    );
    let _enter = span.enter();

    let start = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.execute(params)));
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    let mut result = match outcome {
        Ok(Ok(result)) => result,
        Ok(Err(error)) => unexpected_failure(identity, params, format!("{:#}", error)),
        Err(payload) => unexpected_failure(
            identity,
            params,
            format!("handler panicked: {}", panic_message(&*payload)),
        ),
    };
    result.execution_time_ms = elapsed_ms;
    span.record("task_type", result.task_type.as_str());

    report_outcome(identity, &result);
    result
}

fn unexpected_failure(identity: &HandlerIdentity, params: &TaskParams, message: String) -> TaskResult {
    let task_type = params
        .get("task_type")
        .and_then(Value::as_str)
        .unwrap_or(EXECUTION_TASK_TYPE);

    warn!(handler = identity.name(), task_type, error = %message, "unexpected handler failure");
    TaskResult::failure(identity.name(), task_type, ErrorKind::UnknownError, message)
}

fn report_outcome(identity: &HandlerIdentity, result: &TaskResult) {
    let mut context = EventContext::new();
    context.insert("qualityScore".to_string(), json!(result.quality_score()));
    context.insert("executionTimeMs".to_string(), json!(result.execution_time_ms));

    if result.success {
        info!(
            handler = identity.name(),
            task_type = %result.task_type,
            quality = result.quality_score(),
            elapsed_ms = result.execution_time_ms,
            "task completed"
        );
        notify(|| {
            identity
                .intelligence()
                .track_success(identity.name(), &result.task_type, &context)
        });
        return;
    }

    let Some(first) = result.errors.first() else {
        warn!(
            handler = identity.name(),
            task_type = %result.task_type,
            "task reported failure without errors"
        );
        return;
    };

    let message = result.error_messages().join("; ");
    warn!(
        handler = identity.name(),
        task_type = %result.task_type,
        kind = %first.kind,
        error = %message,
        "task failed"
    );
    context.insert("taskType".to_string(), json!(result.task_type));
    notify(|| {
        identity
            .intelligence()
            .track_error(identity.name(), first.kind, &message, &context)
    });
}

// A sink that panics must not break the never-fails guarantee.
fn notify<F: FnOnce()>(call: F) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(call)) {
        debug!(panic = %panic_message(&*payload), "error intelligence sink panicked, event dropped");
    }
}
