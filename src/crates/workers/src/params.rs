//! Task parameters and input validation
//!
//! Handlers receive a [`TaskParams`] map and validate it up front. Each
//! accessor maps an anticipated input problem to the matching [`ErrorKind`]
//! so the handler can return a failed [`TaskResult`](crate::TaskResult)
//! instead of propagating an error.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::result::ErrorKind;

/// An anticipated problem with handler input
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct InputError {
    pub kind: ErrorKind,
    pub message: String,
}

impl InputError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn missing_data(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MissingData, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParameter, message)
    }

    pub fn insufficient_data(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InsufficientData, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationError, message)
    }
}

/// Named handler inputs, inspectable by key
///
/// Tabular data is passed as an array of row objects, e.g.
/// `{"rows": [{"x": 1, "y": 2}, ...], "target": "y"}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskParams(Map<String, Value>);

impl TaskParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build params from a JSON object
    pub fn from_value(value: Value) -> Result<Self, InputError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            other => Err(InputError::invalid_input(format!(
                "parameters must be an object, got {}",
                json_type(&other)
            ))),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Copy of `self` with every key of `overrides` replacing ours
    pub fn merged(&self, overrides: &TaskParams) -> TaskParams {
        let mut merged = self.0.clone();
        for (key, value) in &overrides.0 {
            merged.insert(key.clone(), value.clone());
        }
        TaskParams(merged)
    }

    /// A present, non-null value
    pub fn require(&self, key: &str) -> Result<&Value, InputError> {
        match self.0.get(key) {
            Some(Value::Null) | None => Err(InputError::missing_data(format!(
                "missing required parameter '{}'",
                key
            ))),
            Some(value) => Ok(value),
        }
    }

    pub fn require_str(&self, key: &str) -> Result<&str, InputError> {
        let value = self.require(key)?;
        value.as_str().ok_or_else(|| wrong_type(key, "a string", value))
    }

    pub fn require_f64(&self, key: &str) -> Result<f64, InputError> {
        let value = self.require(key)?;
        value.as_f64().ok_or_else(|| wrong_type(key, "a number", value))
    }

    pub fn require_usize(&self, key: &str) -> Result<usize, InputError> {
        let value = self.require(key)?;
        value
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| wrong_type(key, "a non-negative integer", value))
    }

    pub fn require_bool(&self, key: &str) -> Result<bool, InputError> {
        let value = self.require(key)?;
        value.as_bool().ok_or_else(|| wrong_type(key, "a boolean", value))
    }

    /// `default` when absent, an error when present with the wrong type
    pub fn f64_or(&self, key: &str, default: f64) -> Result<f64, InputError> {
        if self.is_absent(key) {
            Ok(default)
        } else {
            self.require_f64(key)
        }
    }

    pub fn usize_or(&self, key: &str, default: usize) -> Result<usize, InputError> {
        if self.is_absent(key) {
            Ok(default)
        } else {
            self.require_usize(key)
        }
    }

    pub fn str_or<'a>(&'a self, key: &str, default: &'a str) -> Result<&'a str, InputError> {
        if self.is_absent(key) {
            Ok(default)
        } else {
            self.require_str(key)
        }
    }

    /// A number within `[min, max]`, `default` when absent
    ///
    /// # Example
    ///
    /// ```rust
    /// use workers::{ErrorKind, TaskParams};
    ///
    /// let params = TaskParams::new().with("confidence", 1.5);
    /// let err = params.f64_in_range("confidence", 0.95, 0.0, 1.0).unwrap_err();
    /// assert_eq!(err.kind, ErrorKind::InvalidParameter);
    /// ```
    pub fn f64_in_range(&self, key: &str, default: f64, min: f64, max: f64) -> Result<f64, InputError> {
        let value = self.f64_or(key, default)?;
        if value < min || value > max || value.is_nan() {
            return Err(InputError::invalid_parameter(format!(
                "'{}' must be between {} and {}, got {}",
                key, min, max, value
            )));
        }
        Ok(value)
    }

    /// The rows stored under `key`, at least `min_rows` of them
    pub fn require_rows(&self, key: &str, min_rows: usize) -> Result<&Vec<Value>, InputError> {
        let value = self.require(key)?;
        let rows = value
            .as_array()
            .ok_or_else(|| InputError::invalid_input(format!("'{}' must be a list of rows", key)))?;

        if rows.is_empty() {
            return Err(InputError::missing_data(format!("'{}' contains no rows", key)));
        }
        if rows.len() < min_rows {
            return Err(InputError::insufficient_data(format!(
                "need >= {} rows, got {}",
                min_rows,
                rows.len()
            )));
        }
        Ok(rows)
    }

    /// Check that every row under `rows_key` is an object holding `columns`
    pub fn require_columns(&self, rows_key: &str, columns: &[&str]) -> Result<(), InputError> {
        let rows = self.require_rows(rows_key, 1)?;
        for (index, row) in rows.iter().enumerate() {
            let object = row.as_object().ok_or_else(|| {
                InputError::invalid_input(format!("row {} of '{}' is not an object", index, rows_key))
            })?;
            if let Some(missing) = columns.iter().find(|c| !object.contains_key(**c)) {
                return Err(InputError::invalid_input(format!(
                    "column '{}' not found in '{}'",
                    missing, rows_key
                )));
            }
        }
        Ok(())
    }

    /// Numeric values of `column` across the rows under `rows_key`
    pub fn numeric_column(&self, rows_key: &str, column: &str) -> Result<Vec<f64>, InputError> {
        self.require_columns(rows_key, &[column])?;
        let rows = self.require_rows(rows_key, 1)?;

        rows.iter()
            .enumerate()
            .map(|(index, row)| {
                row.get(column).and_then(Value::as_f64).ok_or_else(|| {
                    InputError::validation(format!(
                        "column '{}' has a non-numeric value in row {}",
                        column, index
                    ))
                })
            })
            .collect()
    }

    fn is_absent(&self, key: &str) -> bool {
        matches!(self.0.get(key), None | Some(Value::Null))
    }
}

impl From<Map<String, Value>> for TaskParams {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn wrong_type(key: &str, expected: &str, value: &Value) -> InputError {
    InputError::invalid_parameter(format!(
        "'{}' must be {}, got {}",
        key,
        expected,
        json_type(value)
    ))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
