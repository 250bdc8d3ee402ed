use thiserror::Error;

use crate::types::Kind;

/// Message recorded when the engine stays busy past the retry ceiling.
pub const BUSY_MESSAGE: &str = "Database busy. Failed to access after repeated retries.";

/// Message returned for a query name that is not registered.
pub const INVALID_REQUEST_MESSAGE: &str = "Invalid request.";

#[derive(Debug, Error)]
pub enum SqlwError {
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Database busy. Failed to access after repeated retries.")]
    Busy,

    #[error("{0}")]
    ExecutionError(String),

    #[error("Invalid request parameter: {0}")]
    ParameterError(String),

    #[error("Invalid request.")]
    UnknownQuery(String),

    #[error("`{name}` is declared {expected}, got a {found} value")]
    KindMismatch {
        name: String,
        expected: Kind,
        found: Kind,
    },
}
