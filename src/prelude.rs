//! Convenient imports for common functionality.

pub use crate::adapters::{JsonRow, QueryResponse};
pub use crate::db::Database;
pub use crate::error::SqlwError;
pub use crate::sqlite::{
    Connection, DatabaseConfig, Execution, Query, QueryConfig, QueryGuard, RetryPolicy, ValueSpec,
};
pub use crate::types::{Kind, TypedValue, Value};
