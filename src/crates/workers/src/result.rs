//! Task result contract
//!
//! [`TaskResult`] is the value every task handler returns, successful or not.
//! Failures are described by [`ErrorRecord`]s classified with an
//! [`ErrorKind`].

use std::fmt;

use chrono::Utc;
use recovery::{root_cause, RecoveryError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Classification of a task failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Required input is absent
    MissingData,

    /// Input is present but malformed (unknown column, wrong shape)
    InvalidInput,

    /// A parameter is of the wrong type or out of range
    InvalidParameter,

    /// Too few rows or observations for the task
    InsufficientData,

    /// The computation itself failed
    ProcessingError,

    /// A model or an underlying library failed
    ModelError,

    /// Output or intermediate data failed validation
    ValidationError,

    /// Unanticipated failure caught by the execution wrapper
    UnknownError,

    /// All recovery attempts failed
    RecoveryExhausted,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingData => "missing_data",
            Self::InvalidInput => "invalid_input",
            Self::InvalidParameter => "invalid_parameter",
            Self::InsufficientData => "insufficient_data",
            Self::ProcessingError => "processing_error",
            Self::ModelError => "model_error",
            Self::ValidationError => "validation_error",
            Self::UnknownError => "unknown_error",
            Self::RecoveryExhausted => "recovery_exhausted",
        }
    }

    /// Short remediation hint shown next to the error
    pub fn default_suggestion(&self) -> &'static str {
        match self {
            Self::MissingData => "Load a dataset and provide every required parameter",
            Self::InvalidInput => "Check column names and the shape of the input data",
            Self::InvalidParameter => "Adjust the parameter to a supported type and range",
            Self::InsufficientData => "Provide more rows or reduce the model complexity",
            Self::ProcessingError => "Inspect the input for values the computation cannot handle",
            Self::ModelError => "Try a simpler model or check that optional libraries are available",
            Self::ValidationError => "Review the data for missing or non-numeric values",
            Self::UnknownError => "Retry the task; report the issue if it persists",
            Self::RecoveryExhausted => "The operation kept failing; check the underlying cause",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of an error record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    #[default]
    Error,
    Critical,
}

/// One classified failure attached to a task result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    #[serde(rename = "type")]
    pub kind: ErrorKind,

    pub message: String,

    #[serde(default)]
    pub severity: Severity,

    /// Serialized as `null` when absent
    #[serde(default)]
    pub details: Option<Map<String, Value>>,

    #[serde(default)]
    pub suggestion: Option<String>,

    /// RFC 3339 creation time
    pub timestamp: String,
}

impl ErrorRecord {
    pub fn new(kind: ErrorKind, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            kind,
            message: message.into(),
            severity,
            details: None,
            suggestion: None,
            timestamp: now_rfc3339(),
        }
    }

    pub fn with_details(mut self, details: Map<String, Value>) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Summarize an exhausted recovery as a single error
    ///
    /// The message names the attempt count and the last underlying cause.
    pub fn from_recovery<E>(error: &RecoveryError<E>) -> Self
    where
        E: std::error::Error + 'static,
    {
        Self::new(ErrorKind::RecoveryExhausted, error.to_string(), Severity::Error)
            .with_detail("context", error.context())
            .with_detail("attempts", error.attempts())
            .with_detail("rootCause", root_cause(error).to_string())
            .with_suggestion(ErrorKind::RecoveryExhausted.default_suggestion())
    }

    /// Like [`ErrorRecord::from_recovery`] for error types that only implement `Display`
    pub fn from_recovery_display<E: fmt::Display>(error: &RecoveryError<E>) -> Self {
        Self::new(ErrorKind::RecoveryExhausted, error.to_string(), Severity::Error)
            .with_detail("context", error.context())
            .with_detail("attempts", error.attempts())
            .with_detail("lastCause", error.last_failure().to_string())
            .with_suggestion(ErrorKind::RecoveryExhausted.default_suggestion())
    }
}

/// Standardized outcome of a task handler invocation
///
/// `quality_score` is kept in `[0.0, 1.0]`: out-of-range assignments are
/// clamped, never rejected. Adding an error does not flip `success`; the
/// handler decides whether an error is fatal to the task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub handler_name: String,
    pub task_type: String,
    pub success: bool,
    #[serde(default)]
    pub payload: Map<String, Value>,
    #[serde(default)]
    pub errors: Vec<ErrorRecord>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(
        serialize_with = "serialize_quality",
        deserialize_with = "deserialize_quality"
    )]
    quality_score: f64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub timestamp: String,
    #[serde(default)]
    pub execution_time_ms: f64,
}

impl TaskResult {
    /// Create a successful result with full quality and no metadata
    pub fn new(handler_name: impl Into<String>, task_type: impl Into<String>) -> Self {
        Self::create(handler_name, task_type, 1.0, Map::new())
    }

    /// Create a successful result
    ///
    /// # Example
    ///
    /// ```rust
    /// use workers::TaskResult;
    ///
    /// let result = TaskResult::create("RegressionHandler", "fit_linear", 1.7, Default::default());
    /// assert!(result.success);
    /// assert_eq!(result.quality_score(), 1.0);
    /// ```
    pub fn create(
        handler_name: impl Into<String>,
        task_type: impl Into<String>,
        quality_score: f64,
        metadata: Map<String, Value>,
    ) -> Self {
        Self {
            handler_name: handler_name.into(),
            task_type: task_type.into(),
            success: true,
            payload: Map::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            quality_score: clamp_quality(quality_score),
            metadata,
            timestamp: now_rfc3339(),
            execution_time_ms: 0.0,
        }
    }

    /// Create a failed result with a single error and zero quality
    pub fn failure(
        handler_name: impl Into<String>,
        task_type: impl Into<String>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        let mut result = Self::create(handler_name, task_type, 0.0, Map::new());
        result.fail(kind, message);
        result
    }

    /// Create a failed result from an anticipated input problem
    pub fn reject(
        handler_name: impl Into<String>,
        task_type: impl Into<String>,
        error: crate::params::InputError,
    ) -> Self {
        Self::failure(handler_name, task_type, error.kind, error.message)
    }

    pub fn quality_score(&self) -> f64 {
        self.quality_score
    }

    /// Set the quality score, clamping into `[0.0, 1.0]` (NaN becomes 0.0)
    pub fn set_quality_score(&mut self, score: f64) {
        self.quality_score = clamp_quality(score);
    }

    pub fn with_quality_score(mut self, score: f64) -> Self {
        self.set_quality_score(score);
        self
    }

    /// Record an error, or a warning when `severity` is `Warning`
    ///
    /// Does not change `success`.
    pub fn add_error(&mut self, kind: ErrorKind, message: impl Into<String>, severity: Severity) {
        self.add_error_record(ErrorRecord::new(kind, message, severity));
    }

    /// Record a prepared error; warning-severity records go to `warnings`
    pub fn add_error_record(&mut self, record: ErrorRecord) {
        if record.severity == Severity::Warning {
            self.warnings.push(record.message);
        } else {
            self.errors.push(record);
        }
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Record a fatal error and mark the result failed
    pub fn fail(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.errors.push(
            ErrorRecord::new(kind, message, Severity::Error)
                .with_suggestion(kind.default_suggestion()),
        );
        self.success = false;
    }

    pub fn insert_payload(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.payload.insert(key.into(), value.into());
    }

    pub fn with_payload(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert_payload(key, value);
        self
    }

    pub fn insert_metadata(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn error_messages(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.message.as_str()).collect()
    }

    /// JSON object with the contract fields, quality rounded to 3 decimals
    ///
    /// Takes `&self`, so repeated calls yield identical values.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

fn clamp_quality(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn serialize_quality<S: Serializer>(score: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round3(*score))
}

fn deserialize_quality<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    f64::deserialize(deserializer).map(clamp_quality)
}

pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}
