//! Configuration
//!
//! [`WorkersConfig`] is read from an optional TOML file and then overridden
//! by environment variables carrying a prefix (default `WORKERS_`):
//!
//! | Variable                   | Field                        |
//! |----------------------------|------------------------------|
//! | `WORKERS_MAX_ATTEMPTS`     | `recovery.max_attempts`      |
//! | `WORKERS_BACKOFF_BASE`     | `recovery.backoff_base`      |
//! | `WORKERS_BACKOFF_UNIT_MS`  | `recovery.backoff_unit_ms`   |
//! | `WORKERS_TIMEOUT_SECS`     | `recovery.timeout_secs`      |
//! | `WORKERS_LOG_LEVEL`        | `logging.level`              |
//! | `WORKERS_LOG_JSON`         | `logging.json`               |
//!
//! # Example
//!
//! ```rust
//! use workers::WorkersConfig;
//!
//! let config = WorkersConfig::from_toml_str(r#"
//!     [recovery]
//!     max_attempts = 5
//!     timeout_secs = 30
//! "#).unwrap();
//!
//! let policy = config.recovery.to_policy::<f64>();
//! assert_eq!(policy.max_attempts(), 5);
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use recovery::RecoveryPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default prefix of configuration environment variables
pub const ENV_PREFIX: &str = "WORKERS_";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid environment variable {key}: {message}")]
    Env { key: String, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Read an environment variable, `None` when unset
pub fn get_env(key: &str) -> Result<Option<String>> {
    match env::var(key) {
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::Env {
            key: key.to_string(),
            message: "contains invalid UTF-8".to_string(),
        }),
    }
}

/// Read and parse an environment variable, `None` when unset
pub fn get_env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get_env(key)? {
        Some(value) => value.trim().parse::<T>().map(Some).map_err(|e| ConfigError::Env {
            key: key.to_string(),
            message: format!("cannot parse '{}': {}", value, e),
        }),
        None => Ok(None),
    }
}

/// Read a boolean environment variable
///
/// Accepts `true/1/yes/on` and `false/0/no/off`, case-insensitively.
pub fn get_env_bool(key: &str) -> Result<Option<bool>> {
    match get_env(key)? {
        Some(value) => match value.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::Env {
                key: key.to_string(),
                message: format!("'{}' is not a boolean", value),
            }),
        },
        None => Ok(None),
    }
}

/// Retry, backoff and timeout settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub max_attempts: usize,
    pub backoff_base: u32,
    /// Length of one backoff unit; waits are `backoff_base^k` units
    pub backoff_unit_ms: u64,
    pub timeout_secs: Option<u64>,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: 2,
            backoff_unit_ms: 1000,
            timeout_secs: None,
        }
    }
}

impl RecoveryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("recovery.max_attempts must be at least 1".to_string()));
        }
        if self.backoff_base == 0 {
            return Err(ConfigError::Invalid("recovery.backoff_base must be at least 1".to_string()));
        }
        if self.timeout_secs == Some(0) {
            return Err(ConfigError::Invalid("recovery.timeout_secs must be positive".to_string()));
        }
        Ok(())
    }

    /// Build a policy without a fallback value
    pub fn to_policy<T>(&self) -> RecoveryPolicy<T> {
        let policy = RecoveryPolicy::new(self.max_attempts)
            .with_backoff_base(self.backoff_base)
            .with_backoff_unit(Duration::from_millis(self.backoff_unit_ms));
        match self.timeout_secs {
            Some(seconds) => policy.with_timeout_secs(seconds),
            None => policy,
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub recovery: RecoveryConfig,
    pub logging: LoggingConfig,
}

impl WorkersConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Load from an optional file, apply `WORKERS_*` overrides and validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    pub fn load_with_prefix(path: Option<&Path>, prefix: &str) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(prefix)?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from environment variables named `{prefix}{KEY}`
    pub fn apply_env(&mut self, prefix: &str) -> Result<()> {
        let key = |name: &str| format!("{}{}", prefix, name);

        if let Some(value) = get_env_parse(&key("MAX_ATTEMPTS"))? {
            self.recovery.max_attempts = value;
        }
        if let Some(value) = get_env_parse(&key("BACKOFF_BASE"))? {
            self.recovery.backoff_base = value;
        }
        if let Some(value) = get_env_parse(&key("BACKOFF_UNIT_MS"))? {
            self.recovery.backoff_unit_ms = value;
        }
        if let Some(value) = get_env_parse(&key("TIMEOUT_SECS"))? {
            self.recovery.timeout_secs = Some(value);
        }
        if let Some(value) = get_env(&key("LOG_LEVEL"))? {
            self.logging.level = value;
        }
        if let Some(value) = get_env_bool(&key("LOG_JSON"))? {
            self.logging.json = value;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.recovery.validate()?;
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Invalid("logging.level must not be empty".to_string()));
        }
        Ok(())
    }
}
