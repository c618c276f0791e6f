//! Integration tests for the handler protocol and error intelligence reporting

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use serde_json::json;
use workers::recovery::{retry, RecordingSleeper, RecoveryPolicy};
use workers::{
    ErrorKind, ErrorRecord, HandlerIdentity, InMemoryIntelligence, Severity, TaskHandler,
    TaskParams, TaskResult,
};

/// Least-squares slope of `y` on `x`, validating its input first
struct SlopeHandler {
    identity: HandlerIdentity,
}

impl SlopeHandler {
    fn new(intelligence: Arc<InMemoryIntelligence>) -> Self {
        Self {
            identity: HandlerIdentity::new("SlopeHandler", "regression").with_intelligence(intelligence),
        }
    }
}

impl TaskHandler for SlopeHandler {
    fn identity(&self) -> &HandlerIdentity {
        &self.identity
    }

    fn execute(&self, params: &TaskParams) -> anyhow::Result<TaskResult> {
        const TASK: &str = "fit_slope";

        if let Err(e) = params
            .require_rows("rows", 3)
            .and_then(|_| params.require_columns("rows", &["x", "y"]))
        {
            return Ok(TaskResult::reject(self.name(), TASK, e));
        }

        let xs = params.numeric_column("rows", "x").context("reading predictor")?;
        let ys = params.numeric_column("rows", "y").context("reading response")?;

        let n = xs.len() as f64;
        let mean_x = xs.iter().sum::<f64>() / n;
        let mean_y = ys.iter().sum::<f64>() / n;
        let sxx: f64 = xs.iter().map(|x| (x - mean_x).powi(2)).sum();
        if sxx == 0.0 {
            bail!("predictor has zero variance");
        }
        let sxy: f64 = xs.iter().zip(&ys).map(|(x, y)| (x - mean_x) * (y - mean_y)).sum();

        let mut result = TaskResult::new(self.name(), TASK).with_payload("slope", sxy / sxx);
        if xs.len() < 5 {
            result.add_error(ErrorKind::InsufficientData, "fewer than 5 rows, estimate is noisy", Severity::Warning);
            result.set_quality_score(0.6);
        }
        Ok(result)
    }
}

fn rows(points: &[(f64, f64)]) -> TaskParams {
    let rows: Vec<_> = points.iter().map(|(x, y)| json!({"x": x, "y": y})).collect();
    TaskParams::new().with("rows", rows)
}

#[test]
fn test_successful_execution() {
    let sink = Arc::new(InMemoryIntelligence::new());
    let handler = SlopeHandler::new(sink.clone());

    let result = handler.safe_execute(&rows(&[(1.0, 2.0), (2.0, 4.0), (3.0, 6.0)]));

    assert!(result.success);
    assert_eq!(result.payload["slope"], json!(2.0));
    assert_eq!(result.quality_score(), 0.6);
    assert_eq!(result.warnings, vec!["fewer than 5 rows, estimate is noisy"]);
    assert!(result.errors.is_empty());
    assert!(result.execution_time_ms >= 0.0);

    let stats = sink.stats("SlopeHandler").unwrap();
    assert_eq!(stats.successes, 1);
}

#[test]
fn test_validation_failures_are_results() {
    let sink = Arc::new(InMemoryIntelligence::new());
    let handler = SlopeHandler::new(sink.clone());

    let too_few = handler.safe_execute(&rows(&[(1.0, 2.0)]));
    assert!(!too_few.success);
    assert_eq!(too_few.errors[0].kind, ErrorKind::InsufficientData);
    assert_eq!(too_few.errors[0].message, "need >= 3 rows, got 1");

    let missing = handler.safe_execute(&TaskParams::new());
    assert_eq!(missing.errors[0].kind, ErrorKind::MissingData);

    let bad_column = handler.safe_execute(
        &TaskParams::new().with("rows", json!([{"x": 1}, {"x": 2}, {"x": 3}])),
    );
    assert_eq!(bad_column.errors[0].kind, ErrorKind::InvalidInput);

    assert_eq!(sink.stats("SlopeHandler").unwrap().failures, 3);
}

#[test]
fn test_unexpected_errors_never_escape() {
    let sink = Arc::new(InMemoryIntelligence::new());
    let handler = SlopeHandler::new(sink.clone());

    let constant_x = handler.safe_execute(&rows(&[(1.0, 2.0), (1.0, 3.0), (1.0, 4.0)]));
    assert!(!constant_x.success);
    assert_eq!(constant_x.errors[0].kind, ErrorKind::UnknownError);
    assert_eq!(constant_x.errors[0].message, "predictor has zero variance");

    let non_numeric = handler.safe_execute(
        &TaskParams::new()
            .with("rows", json!([{"x": 1, "y": 1}, {"x": "a", "y": 2}, {"x": 3, "y": 3}]))
            .with("task_type", "fit_slope"),
    );
    assert_eq!(non_numeric.task_type, "fit_slope");
    assert!(non_numeric.errors[0].message.starts_with("reading predictor: "));

    let events = sink.events_for("SlopeHandler");
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| !e.is_success()));
}

#[test]
fn test_handlers_are_usable_as_trait_objects_across_threads() {
    let sink = Arc::new(InMemoryIntelligence::new());
    let handler: Arc<dyn TaskHandler> = Arc::new(SlopeHandler::new(sink.clone()));

    let handles: Vec<_> = (1..=4)
        .map(|k| {
            let handler = Arc::clone(&handler);
            std::thread::spawn(move || {
                let k = k as f64;
                handler.safe_execute(&rows(&[(0.0, 0.0), (1.0, k), (2.0, 2.0 * k)]))
            })
        })
        .collect();

    let mut slopes: Vec<f64> = handles
        .into_iter()
        .map(|h| h.join().unwrap().payload["slope"].as_f64().unwrap())
        .collect();
    slopes.sort_by(|a, b| a.partial_cmp(b).unwrap());

    assert_eq!(slopes, vec![1.0, 2.0, 3.0, 4.0]);
    assert_eq!(sink.stats("SlopeHandler").unwrap().successes, 4);
}

#[test]
fn test_whole_execution_under_retry() {
    struct WarmingUpHandler {
        identity: HandlerIdentity,
        calls: AtomicUsize,
    }

    impl TaskHandler for WarmingUpHandler {
        fn identity(&self) -> &HandlerIdentity {
            &self.identity
        }

        fn execute(&self, _params: &TaskParams) -> anyhow::Result<TaskResult> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < 2 {
                bail!("model cache not ready");
            }
            Ok(TaskResult::new(self.name(), "forecast"))
        }
    }

    let handler = Arc::new(WarmingUpHandler {
        identity: HandlerIdentity::new("WarmingUpHandler", "forecasting"),
        calls: AtomicUsize::new(0),
    });
    let sleeper = Arc::new(RecordingSleeper::new());
    let policy = RecoveryPolicy::new(3).with_sleeper(sleeper.clone());

    let worker = Arc::clone(&handler);
    let result = retry(&policy, "forecast", move || {
        let result = worker.safe_execute(&TaskParams::new());
        if result.success {
            Ok(result)
        } else {
            Err(result.error_messages().join("; "))
        }
    })
    .unwrap();

    assert!(result.success);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    assert_eq!(sleeper.recorded(), vec![Duration::from_secs(1), Duration::from_secs(2)]);
}

#[test]
fn test_exhausted_recovery_as_single_error() {
    let policy: RecoveryPolicy<f64> = RecoveryPolicy::new(2).with_sleeper(Arc::new(RecordingSleeper::new()));
    let err = retry(&policy, "estimate_trend", || {
        "not a number".parse::<f64>()
    })
    .unwrap_err();

    let mut result = TaskResult::create("TrendHandler", "trend", 0.0, Default::default());
    result.add_error_record(ErrorRecord::from_recovery(&err));
    result.success = false;

    let value = result.to_value();
    assert_eq!(value["errors"].as_array().unwrap().len(), 1);
    assert_eq!(value["errors"][0]["type"], "recovery_exhausted");
    assert_eq!(value["errors"][0]["details"]["attempts"], 2);
    assert_eq!(value["errors"][0]["details"]["rootCause"], "invalid float literal");
    assert!(value["errors"][0]["message"]
        .as_str()
        .unwrap()
        .starts_with("estimate_trend failed after 2 attempt(s)"));
}
