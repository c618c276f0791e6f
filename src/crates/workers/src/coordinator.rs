//! Coordinators
//!
//! A [`Coordinator`] holds the input of one analysis area (prediction,
//! visualization, reporting, recommendation) and runs an ordered list of
//! task handlers against it, collecting their results into a
//! [`CoordinatorReport`].

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use recovery::{retry_with_timeout, RecoveryPolicy};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::handler::TaskHandler;
use crate::logging::format_duration;
use crate::params::TaskParams;
use crate::result::{ErrorRecord, TaskResult};

/// Analysis area served by a coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinatorKind {
    Predictor,
    Visualizer,
    Reporter,
    Recommender,
}

impl CoordinatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Predictor => "predictor",
            Self::Visualizer => "visualizer",
            Self::Reporter => "reporter",
            Self::Recommender => "recommender",
        }
    }
}

impl fmt::Display for CoordinatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone)]
struct Step {
    handler: Arc<dyn TaskHandler>,
    overrides: TaskParams,
}

/// Runs task handlers over shared input
#[derive(Clone)]
pub struct Coordinator {
    kind: CoordinatorKind,
    params: TaskParams,
    steps: Vec<Step>,
}

impl Coordinator {
    pub fn new(kind: CoordinatorKind, params: TaskParams) -> Self {
        Self {
            kind,
            params,
            steps: Vec::new(),
        }
    }

    /// Append a handler that sees the base params unchanged
    pub fn with_handler(self, handler: Arc<dyn TaskHandler>) -> Self {
        self.with_step(handler, TaskParams::new())
    }

    /// Append a handler; `overrides` replace base params of the same key
    pub fn with_step(mut self, handler: Arc<dyn TaskHandler>, overrides: TaskParams) -> Self {
        self.add_step(handler, overrides);
        self
    }

    pub fn add_step(&mut self, handler: Arc<dyn TaskHandler>, overrides: TaskParams) {
        self.steps.push(Step { handler, overrides });
    }

    pub fn kind(&self) -> CoordinatorKind {
        self.kind
    }

    pub fn params(&self) -> &TaskParams {
        &self.params
    }

    /// Replace the input, e.g. after a new dataset was loaded
    pub fn set_params(&mut self, params: TaskParams) {
        self.params = params;
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every handler once, in order
    ///
    /// A failing handler does not stop the run.
    pub fn run(&self) -> CoordinatorReport {
        info!(coordinator = %self.kind, steps = self.steps.len(), "coordinator run started");
        let start = Instant::now();

        let results: Vec<TaskResult> = self
            .steps
            .iter()
            .map(|step| {
                let params = self.params.merged(&step.overrides);
                debug!(coordinator = %self.kind, handler = step.handler.name(), "running step");
                step.handler.safe_execute(&params)
            })
            .collect();

        let report = CoordinatorReport::new(self.kind, results);
        let elapsed = format_duration(start.elapsed());
        if report.success() {
            info!(coordinator = %self.kind, elapsed = %elapsed, "coordinator run succeeded");
        } else {
            warn!(
                coordinator = %self.kind,
                failures = report.failure_count(),
                elapsed = %elapsed,
                "coordinator run finished with failures"
            );
        }
        report
    }

    /// Run under a recovery policy, retrying while any step fails
    ///
    /// Each attempt is bounded by the policy timeout when one is set.
    /// Returns the first fully successful report. Once attempts are
    /// exhausted the policy's fallback report is returned if it has one,
    /// otherwise the last report produced. A run that times out or panics
    /// yields a report holding one failed result that summarizes the
    /// exhausted recovery.
    pub fn run_resilient(&self, policy: &RecoveryPolicy<CoordinatorReport>) -> CoordinatorReport {
        let coordinator = self.clone();
        let context = format!("{}_run", self.kind);

        let outcome = retry_with_timeout(policy, &context, move || {
            let report = coordinator.run();
            if report.success() {
                Ok(report)
            } else {
                Err(IncompleteRun(report))
            }
        });

        match outcome {
            Ok(report) => report,
            Err(error) => {
                let record = ErrorRecord::from_recovery_display(&error);
                match error.into_last_failure().into_error() {
                    Some(IncompleteRun(report)) => report,
                    None => {
                        let mut result = TaskResult::create(self.kind.as_str(), "run", 0.0, Map::new());
                        result.add_error_record(record);
                        result.success = false;
                        CoordinatorReport::new(self.kind, vec![result])
                    }
                }
            }
        }
    }
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers: Vec<&str> = self.steps.iter().map(|s| s.handler.name()).collect();
        f.debug_struct("Coordinator")
            .field("kind", &self.kind)
            .field("params", &self.params)
            .field("handlers", &handlers)
            .finish()
    }
}

/// A run in which at least one step failed
#[derive(Debug, Clone)]
pub struct IncompleteRun(pub CoordinatorReport);

impl fmt::Display for IncompleteRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} tasks failed",
            self.0.failure_count(),
            self.0.results.len()
        )?;
        if let Some(first) = self.0.errors().first() {
            write!(f, ": {}", first.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for IncompleteRun {}

/// Results of one coordinator run, in step order
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorReport {
    pub kind: CoordinatorKind,
    pub results: Vec<TaskResult>,
}

impl CoordinatorReport {
    pub fn new(kind: CoordinatorKind, results: Vec<TaskResult>) -> Self {
        Self { kind, results }
    }

    /// Every step succeeded (vacuously true for an empty run)
    pub fn success(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }

    pub fn failure_count(&self) -> usize {
        self.results.iter().filter(|r| !r.success).count()
    }

    /// Mean quality over all results, `None` for an empty run
    pub fn mean_quality(&self) -> Option<f64> {
        if self.results.is_empty() {
            return None;
        }
        let total: f64 = self.results.iter().map(TaskResult::quality_score).sum();
        Some(total / self.results.len() as f64)
    }

    pub fn errors(&self) -> Vec<&ErrorRecord> {
        self.results.iter().flat_map(|r| r.errors.iter()).collect()
    }

    pub fn warnings(&self) -> Vec<&str> {
        self.results
            .iter()
            .flat_map(|r| r.warnings.iter().map(String::as_str))
            .collect()
    }

    pub fn result_for(&self, handler_name: &str) -> Option<&TaskResult> {
        self.results.iter().find(|r| r.handler_name == handler_name)
    }

    pub fn to_value(&self) -> Value {
        let mean_quality = self
            .mean_quality()
            .map(|q| json!((q * 1000.0).round() / 1000.0))
            .unwrap_or(Value::Null);

        json!({
            "kind": self.kind,
            "success": self.success(),
            "failureCount": self.failure_count(),
            "meanQuality": mean_quality,
            "results": self.results.iter().map(TaskResult::to_value).collect::<Vec<_>>(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerIdentity;
    use crate::result::ErrorKind;

    struct ConstantHandler {
        identity: HandlerIdentity,
        quality: f64,
    }

    impl ConstantHandler {
        fn new(name: &str, quality: f64) -> Arc<dyn TaskHandler> {
            Arc::new(Self {
                identity: HandlerIdentity::new(name, "test"),
                quality,
            })
        }
    }

    impl TaskHandler for ConstantHandler {
        fn identity(&self) -> &HandlerIdentity {
            &self.identity
        }

        fn execute(&self, params: &TaskParams) -> anyhow::Result<TaskResult> {
            let chart = params.str_or("chart", "none").map_err(anyhow::Error::new)?;
            Ok(TaskResult::new(self.name(), "constant")
                .with_quality_score(self.quality)
                .with_payload("chart", chart))
        }
    }

    #[test]
    fn test_run_in_order_with_overrides() {
        let coordinator = Coordinator::new(CoordinatorKind::Visualizer, TaskParams::new().with("chart", "bar"))
            .with_handler(ConstantHandler::new("BarHandler", 1.0))
            .with_step(
                ConstantHandler::new("LineHandler", 0.5),
                TaskParams::new().with("chart", "line"),
            );

        let report = coordinator.run();
        assert!(report.success());
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[0].payload["chart"], "bar");
        assert_eq!(report.results[1].payload["chart"], "line");
        assert_eq!(report.mean_quality(), Some(0.75));
        assert_eq!(coordinator.params().require_str("chart").unwrap(), "bar");
    }

    #[test]
    fn test_failed_step_does_not_stop_run() {
        let coordinator = Coordinator::new(CoordinatorKind::Reporter, TaskParams::new().with("chart", 7))
            .with_handler(ConstantHandler::new("SummaryHandler", 1.0))
            .with_step(
                ConstantHandler::new("ChartHandler", 1.0),
                TaskParams::new().with("chart", "pie"),
            );

        let report = coordinator.run();
        assert!(!report.success());
        assert_eq!(report.failure_count(), 1);
        assert_eq!(report.errors()[0].kind, ErrorKind::UnknownError);
        assert!(report.result_for("ChartHandler").unwrap().success);
    }

    #[test]
    fn test_empty_report() {
        let report = Coordinator::new(CoordinatorKind::Recommender, TaskParams::new()).run();
        assert!(report.success());
        assert_eq!(report.mean_quality(), None);
        assert_eq!(report.to_value()["meanQuality"], Value::Null);
        assert_eq!(report.to_value()["kind"], "recommender");
    }

    #[test]
    fn test_incomplete_run_display() {
        let mut failed = TaskResult::new("ForecastHandler", "arima");
        failed.fail(ErrorKind::InsufficientData, "need >= 10 rows");
        let report = CoordinatorReport::new(
            CoordinatorKind::Predictor,
            vec![TaskResult::new("RegressionHandler", "fit_linear"), failed],
        );

        assert_eq!(
            IncompleteRun(report).to_string(),
            "1 of 2 tasks failed: need >= 10 rows"
        );
    }
}
