use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tokio::task::spawn_blocking;

use crate::adapters::QueryResponse;
use crate::error::SqlwError;
use crate::executor;
use crate::sqlite::{Connection, DatabaseConfig, Query, RetryPolicy};

/// The registry of named queries over one shared connection.
///
/// ```no_run
/// use serde_json::json;
/// use sqlw::prelude::*;
///
/// # fn main() -> Result<(), SqlwError> {
/// let db = Database::open(&DatabaseConfig::from_path("sqlw.json")?)?;
/// let response = db.execute_json("all_devices", &json!({}));
/// println!("{response}");
/// # Ok(())
/// # }
/// ```
pub struct Database {
    // Each query holds an `Arc` of the connection; the handle closes after the last one drops.
    queries: HashMap<String, Query>,
    connection: Arc<Connection>,
    retry: RetryPolicy,
}

impl Database {
    /// Open the database file and compile every configured query.
    ///
    /// # Errors
    /// Returns `SqlwError::ConfigError` if the file is not a regular file, a query
    /// name repeats, a type is unknown or a statement does not compile, and
    /// `SqlwError::SqliteError` if the engine cannot open the file.
    pub fn open(config: &DatabaseConfig) -> Result<Self, SqlwError> {
        let connection = Arc::new(Connection::open(&config.database_file)?);
        connection.reserve_statements(config.query_data.len());
        let retry = config.retry_policy();

        let mut queries = HashMap::with_capacity(config.query_data.len());
        for query_config in &config.query_data {
            let query = Query::new(Arc::clone(&connection), query_config, retry)?;
            match queries.entry(query_config.name.clone()) {
                Entry::Occupied(_) => {
                    return Err(SqlwError::ConfigError(format!(
                        "duplicate query name `{}`",
                        query_config.name
                    )));
                }
                Entry::Vacant(slot) => {
                    slot.insert(query);
                }
            }
        }

        tracing::info!(
            path = %config.database_file.display(),
            queries = queries.len(),
            "database ready"
        );
        Ok(Self {
            queries,
            connection,
            retry,
        })
    }

    /// Look up a query for manual use through [`Query::acquire`].
    #[must_use]
    pub fn query(&self, name: &str) -> Option<&Query> {
        self.queries.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.queries.contains_key(name)
    }

    /// Registered query names, sorted.
    #[must_use]
    pub fn query_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.queries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.connection.path()
    }

    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Run the query called `name` with parameters taken from `request`.
    ///
    /// Never fails at this boundary: an unknown name, a rejected request, a busy
    /// engine and engine errors all come back as `success: false` responses.
    #[must_use]
    pub fn execute(&self, name: &str, request: &JsonValue) -> QueryResponse {
        match self.queries.get(name) {
            Some(query) => executor::execute(query, request),
            None => {
                let err = SqlwError::UnknownQuery(name.to_owned());
                tracing::debug!(query = name, "unknown query");
                QueryResponse::from_error(&err)
            }
        }
    }

    /// [`execute`](Self::execute), returning the untyped response document.
    #[must_use]
    pub fn execute_json(&self, name: &str, request: &JsonValue) -> JsonValue {
        self.execute(name, request).to_json()
    }

    /// Run [`execute`](Self::execute) on the blocking thread pool.
    ///
    /// Stepping sleeps on a busy engine and waits on locks, so async callers go
    /// through here instead of calling `execute` on a runtime thread.
    pub async fn execute_async(
        self: &Arc<Self>,
        name: impl Into<String>,
        request: JsonValue,
    ) -> QueryResponse {
        let db = Arc::clone(self);
        let name = name.into();
        spawn_blocking(move || db.execute(&name, &request))
            .await
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "query task did not complete");
                QueryResponse::from_error(&SqlwError::ExecutionError(format!(
                    "query task did not complete: {err}"
                )))
            })
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.connection.path())
            .field("queries", &self.query_names())
            .finish_non_exhaustive()
    }
}
