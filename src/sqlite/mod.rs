// SQLite engine layer
//
// - config: database and query configuration, retry policy
// - connection: the shared engine handle and its lock
// - params: binding and reading typed values
// - query: named queries and their run lifecycle

pub mod config;
pub mod connection;
pub mod params;
pub mod query;

pub use config::{DatabaseConfig, QueryConfig, RetryPolicy, ValueSpec};
pub use connection::{Connection, ConnectionGuard};
pub use query::{Execution, Query, QueryGuard};
