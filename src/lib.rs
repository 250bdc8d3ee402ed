//! Named, typed SQLite queries driven by JSON documents.
//!
//! A [`Database`] opens one SQLite file and compiles a fixed set of named
//! statements from a [`DatabaseConfig`]. Each call binds typed parameters from
//! a request document, steps the statement under the connection lock, and
//! returns the typed columns as a response document:
//!
//! ```text
//! {"success": true, "data": [{"identifier": 3428975, "name": "Tester"}]}
//! {"success": false, "error": "Invalid request parameter: name", "data": []}
//! ```

pub mod adapters;
pub mod db;
pub mod error;
pub mod executor;
pub mod prelude;
pub mod sqlite;
pub mod types;

pub use adapters::QueryResponse;
pub use db::Database;
pub use error::SqlwError;
pub use sqlite::{DatabaseConfig, QueryConfig, RetryPolicy};
pub use types::{Kind, TypedValue, Value};
