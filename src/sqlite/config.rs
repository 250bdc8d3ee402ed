use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SqlwError;
use crate::types::Kind;

const DEFAULT_BUSY_RETRIES: u32 = 10;
const DEFAULT_BUSY_INTERVAL_MS: u64 = 5;

fn default_busy_retries() -> u32 {
    DEFAULT_BUSY_RETRIES
}

fn default_busy_interval_ms() -> u64 {
    DEFAULT_BUSY_INTERVAL_MS
}

/// Everything needed to open a [`Database`](crate::Database).
///
/// ```rust
/// use sqlw::prelude::*;
///
/// let config = DatabaseConfig::new("devices.db")
///     .with_busy_retries(3)
///     .with_query(
///         QueryConfig::new("count_devices", "SELECT COUNT(*) FROM devices")
///             .column("count", "int"),
///     );
/// assert_eq!(config.retry_policy().retries, 3);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub database_file: PathBuf,
    #[serde(default = "default_busy_retries")]
    pub busy_retries: u32,
    #[serde(default = "default_busy_interval_ms")]
    pub busy_interval_ms: u64,
    #[serde(default)]
    pub query_data: Vec<QueryConfig>,
}

impl DatabaseConfig {
    #[must_use]
    pub fn new(database_file: impl Into<PathBuf>) -> Self {
        Self {
            database_file: database_file.into(),
            busy_retries: DEFAULT_BUSY_RETRIES,
            busy_interval_ms: DEFAULT_BUSY_INTERVAL_MS,
            query_data: Vec::new(),
        }
    }

    /// Read a JSON configuration file.
    ///
    /// # Errors
    /// Returns `SqlwError::Io` if the file cannot be read and `SqlwError::Json`
    /// if it is not a valid configuration document.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SqlwError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Parse a JSON configuration document.
    ///
    /// # Errors
    /// Returns `SqlwError::Json` if `text` does not describe a configuration.
    pub fn from_json_str(text: &str) -> Result<Self, SqlwError> {
        Ok(serde_json::from_str(text)?)
    }

    #[must_use]
    pub fn with_busy_retries(mut self, retries: u32) -> Self {
        self.busy_retries = retries;
        self
    }

    #[must_use]
    pub fn with_busy_interval(mut self, interval: Duration) -> Self {
        self.busy_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_query(mut self, query: QueryConfig) -> Self {
        self.query_data.push(query);
        self
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.busy_retries,
            interval: Duration::from_millis(self.busy_interval_ms),
        }
    }
}

/// One named statement and the types flowing in and out of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub statement: String,
    #[serde(default)]
    pub parameters: Vec<ValueSpec>,
    #[serde(default)]
    pub columns: Vec<ValueSpec>,
}

impl QueryConfig {
    #[must_use]
    pub fn new(name: impl Into<String>, statement: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            statement: statement.into(),
            parameters: Vec::new(),
            columns: Vec::new(),
        }
    }

    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Append a bind parameter. Parameters bind to slots 1, 2, ... in order.
    #[must_use]
    pub fn parameter(mut self, name: impl Into<String>, kind: impl Into<String>) -> Self {
        self.parameters.push(ValueSpec::new(name, kind));
        self
    }

    /// Append a result column. Columns read from indices 0, 1, ... in order.
    #[must_use]
    pub fn column(mut self, name: impl Into<String>, kind: impl Into<String>) -> Self {
        self.columns.push(ValueSpec::new(name, kind));
        self
    }
}

/// A declared `{name, type}` pair as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl ValueSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
        }
    }

    /// Resolve the type spelling. `role` ("parameter" or "column") goes into the error.
    ///
    /// # Errors
    /// Returns `SqlwError::ConfigError` for an unrecognised type.
    pub fn resolve(&self, role: &str) -> Result<Kind, SqlwError> {
        self.kind.parse::<Kind>().map_err(|_| {
            SqlwError::ConfigError(format!(
                "Unknown {role} type `{}` for `{}`",
                self.kind, self.name
            ))
        })
    }
}

/// Bounded, fixed-interval retry on a busy engine.
///
/// `retries` counts the attempts after the first one, so a step gives up after
/// `retries + 1` busy results and at most `retries` sleeps of `interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: DEFAULT_BUSY_RETRIES,
            interval: Duration::from_millis(DEFAULT_BUSY_INTERVAL_MS),
        }
    }
}
