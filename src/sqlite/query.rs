use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use rusqlite::{ErrorCode, Statement};

use crate::error::SqlwError;
use crate::types::{Kind, TypedValue, Value};

use super::config::{QueryConfig, RetryPolicy};
use super::connection::{Connection, ConnectionGuard};

/// A named statement compiled once against the shared [`Connection`].
///
/// Runs of the same query are serialized by a private lock ([`Query::acquire`]);
/// only the execution phase ([`QueryGuard::prepare`]) takes the connection lock,
/// so different queries can stage parameters concurrently.
pub struct Query {
    name: String,
    description: String,
    sql: String,
    connection: Arc<Connection>,
    retry: RetryPolicy,
    parameter_specs: Vec<(String, Kind)>,
    column_specs: Vec<(String, Kind)>,
    state: Mutex<QueryState>,
}

/// Mutable per-run state, only reachable through a [`QueryGuard`].
struct QueryState {
    parameters: Vec<TypedValue>,
    columns: Vec<TypedValue>,
    error: Option<String>,
}

impl QueryState {
    /// Record the first failure of a run; later ones are consequences of it.
    fn fail(&mut self, message: String) {
        if self.error.is_none() {
            self.error = Some(message);
        }
    }
}

impl Query {
    /// Compile `config.statement` and build the typed parameter and column lists.
    ///
    /// # Errors
    /// Returns `SqlwError::ConfigError` for an unknown type, a statement that does
    /// not compile, or declared parameters/columns that do not fit the statement.
    pub(crate) fn new(
        connection: Arc<Connection>,
        config: &QueryConfig,
        retry: RetryPolicy,
    ) -> Result<Self, SqlwError> {
        let parameters = config
            .parameters
            .iter()
            .map(|spec| Ok(TypedValue::new(&spec.name, spec.resolve("parameter")?)))
            .collect::<Result<Vec<_>, SqlwError>>()?;
        let columns = config
            .columns
            .iter()
            .map(|spec| Ok(TypedValue::new(&spec.name, spec.resolve("column")?)))
            .collect::<Result<Vec<_>, SqlwError>>()?;

        {
            let conn = connection.lock();
            let stmt = conn.prepare_cached(&config.statement).map_err(|e| {
                SqlwError::ConfigError(format!(
                    "Failed to prepare query `{}` ({}): {e}",
                    config.name, config.description
                ))
            })?;
            if stmt.parameter_count() != parameters.len() {
                return Err(SqlwError::ConfigError(format!(
                    "query `{}` declares {} parameters but its statement takes {}",
                    config.name,
                    parameters.len(),
                    stmt.parameter_count()
                )));
            }
            if stmt.column_count() < columns.len() {
                return Err(SqlwError::ConfigError(format!(
                    "query `{}` declares {} columns but its statement returns {}",
                    config.name,
                    columns.len(),
                    stmt.column_count()
                )));
            }
        }

        tracing::debug!(
            query = %config.name,
            parameters = parameters.len(),
            columns = columns.len(),
            "prepared query"
        );
        Ok(Self {
            name: config.name.clone(),
            description: config.description.clone(),
            sql: config.statement.clone(),
            connection,
            retry,
            parameter_specs: specs(&parameters),
            column_specs: specs(&columns),
            state: Mutex::new(QueryState {
                parameters,
                columns,
                error: None,
            }),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Declared parameters as `(name, kind)`, in bind order.
    #[must_use]
    pub fn parameter_specs(&self) -> &[(String, Kind)] {
        &self.parameter_specs
    }

    /// Declared columns as `(name, kind)`, in column order.
    #[must_use]
    pub fn column_specs(&self) -> &[(String, Kind)] {
        &self.column_specs
    }

    #[must_use]
    pub fn has_parameters(&self) -> bool {
        !self.parameter_specs.is_empty()
    }

    #[must_use]
    pub fn has_columns(&self) -> bool {
        !self.column_specs.is_empty()
    }

    /// Take this query's lock, blocking while another run is in progress.
    ///
    /// The error left by the previous run is cleared.
    pub fn acquire(&self) -> QueryGuard<'_> {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!(query = %self.name, "recovering poisoned query lock");
            self.state.clear_poison();
            poisoned.into_inner()
        });
        state.error = None;
        QueryGuard { query: self, state }
    }
}

fn specs(values: &[TypedValue]) -> Vec<(String, Kind)> {
    values
        .iter()
        .map(|v| (v.name().to_owned(), v.kind()))
        .collect()
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("sql", &self.sql)
            .finish_non_exhaustive()
    }
}

/// Exclusive use of one [`Query`]. Dropping it lets the next run in.
pub struct QueryGuard<'q> {
    query: &'q Query,
    state: MutexGuard<'q, QueryState>,
}

impl<'q> QueryGuard<'q> {
    #[must_use]
    pub fn query(&self) -> &'q Query {
        self.query
    }

    /// Message of the failure recorded during this acquisition, if any.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.state.error.as_deref()
    }

    #[must_use]
    pub fn has_error(&self) -> bool {
        self.state.error.is_some()
    }

    #[must_use]
    pub fn parameters(&self) -> &[TypedValue] {
        &self.state.parameters
    }

    /// Column values of the most recently read row.
    #[must_use]
    pub fn columns(&self) -> &[TypedValue] {
        &self.state.columns
    }

    /// Stage a value for the parameter called `name`.
    ///
    /// # Errors
    /// Returns `SqlwError::ParameterError` if no such parameter is declared and
    /// `SqlwError::KindMismatch` if `value` has the wrong kind.
    pub fn set_parameter(&mut self, name: &str, value: Value) -> Result<(), SqlwError> {
        self.state
            .parameters
            .iter_mut()
            .find(|p| p.name() == name)
            .ok_or_else(|| SqlwError::ParameterError(name.to_owned()))?
            .set(value)
    }

    pub(crate) fn parameters_mut(&mut self) -> &mut [TypedValue] {
        &mut self.state.parameters
    }

    pub(crate) fn record_error(&mut self, message: String) {
        self.state.fail(message);
    }

    /// Take the connection lock for the execution phase.
    ///
    /// The lock is held until the returned [`Execution`] is released or dropped,
    /// and the borrow keeps this guard alive at least that long.
    pub fn prepare(&mut self) -> Execution<'_> {
        let conn = self.query.connection.lock();
        Execution {
            query: self.query,
            state: &mut *self.state,
            conn,
        }
    }
}

/// The execution phase of one run: the connection lock is held for its whole life.
pub struct Execution<'g> {
    query: &'g Query,
    state: &'g mut QueryState,
    conn: ConnectionGuard<'g>,
}

impl Execution<'_> {
    /// Bind the staged parameters and step the statement to completion.
    ///
    /// `on_row` sees the declared columns after each row is read. Stepping stops
    /// at the first failure, which is recorded on the query. The statement is
    /// rewound before this returns. Returns `true` if the run finished cleanly.
    pub fn for_each_row<F>(&mut self, mut on_row: F) -> bool
    where
        F: FnMut(&[TypedValue]),
    {
        let query = self.query;
        let state = &mut *self.state;

        let mut stmt = match self.conn.prepare_cached(&query.sql) {
            Ok(stmt) => stmt,
            Err(err) => {
                state.fail(engine_message(&err));
                return false;
            }
        };

        for (index, parameter) in state.parameters.iter().enumerate() {
            if let Err(err) = parameter.bind_to(&mut stmt, index + 1) {
                let message = match err {
                    SqlwError::SqliteError(e) => engine_message(&e),
                    other => other.to_string(),
                };
                tracing::warn!(query = %query.name, parameter = parameter.name(), %message, "bind failed");
                state.fail(message);
                return false;
            }
        }

        match drive(&mut stmt, &mut state.columns, query.retry, &mut on_row) {
            Ok(rows) => {
                tracing::debug!(query = %query.name, rows, "query finished");
                true
            }
            Err(err) => {
                let message = match err {
                    SqlwError::SqliteError(e) => engine_message(&e),
                    other => other.to_string(),
                };
                tracing::warn!(query = %query.name, %message, "query failed");
                state.fail(message);
                false
            }
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.state.error.as_deref()
    }

    /// Give the connection back. Dropping the execution does the same.
    pub fn release(self) {}
}

enum Step {
    Row,
    Done,
    Busy,
}

/// Advance `rows` by one engine step, reading the columns when a row arrives.
fn step(
    rows: &mut rusqlite::Rows<'_>,
    columns: &mut [TypedValue],
    read: bool,
) -> Result<Step, SqlwError> {
    match rows.next() {
        Ok(Some(row)) => {
            if read {
                for (index, column) in columns.iter_mut().enumerate() {
                    column.read_from(row, index)?;
                }
            }
            Ok(Step::Row)
        }
        Ok(None) => Ok(Step::Done),
        Err(err) if is_busy(&err) => Ok(Step::Busy),
        Err(err) => Err(err.into()),
    }
}

/// Step `stmt` until it is done, retrying busy steps under `retry`.
///
/// A busy step rewinds the statement, so a retry starts over and skips the rows
/// that were already handed to `on_row`. The retry budget resets only when a
/// row not seen before arrives. Returns the number of rows delivered.
fn drive<F>(
    stmt: &mut Statement<'_>,
    columns: &mut [TypedValue],
    retry: RetryPolicy,
    on_row: &mut F,
) -> Result<usize, SqlwError>
where
    F: FnMut(&[TypedValue]),
{
    let mut delivered = 0usize;
    let mut attempts = 0u32;
    'restart: loop {
        let mut rows = stmt.raw_query();
        let mut seen = 0usize;
        loop {
            match step(&mut rows, columns, seen >= delivered)? {
                Step::Row => {
                    seen += 1;
                    // Replayed rows leave the retry budget alone.
                    if seen > delivered {
                        attempts = 0;
                        delivered = seen;
                        on_row(&*columns);
                    }
                }
                Step::Done => return Ok(delivered),
                Step::Busy => {
                    if attempts >= retry.retries {
                        tracing::warn!(attempts, "database busy, giving up");
                        return Err(SqlwError::Busy);
                    }
                    attempts += 1;
                    tracing::trace!(attempts, "database busy, retrying");
                    drop(rows);
                    thread::sleep(retry.interval);
                    continue 'restart;
                }
            }
        }
    }
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::DatabaseBusy)
}

/// The engine's own message for `err`, as `sqlite3_errmsg` reports it.
fn engine_message(err: &rusqlite::Error) -> String {
    match err {
        rusqlite::Error::SqliteFailure(_, Some(message)) => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;
    use crate::error::BUSY_MESSAGE;

    fn devices_connection() -> (TempDir, Arc<Connection>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.db");
        let raw = rusqlite::Connection::open(&path).unwrap();
        raw.execute_batch(
            "CREATE TABLE devices (id INTEGER PRIMARY KEY, label TEXT NOT NULL, ratio REAL);
             INSERT INTO devices VALUES (1, 'alpha', 0.5), (2, 'beta', 1.25);",
        )
        .unwrap();
        drop(raw);
        let conn = Arc::new(Connection::open(&path).unwrap());
        (dir, conn)
    }

    fn by_id() -> QueryConfig {
        QueryConfig::new(
            "device_by_id",
            "SELECT label, ratio FROM devices WHERE id = ?1",
        )
        .parameter("id", "int")
        .column("label", "text")
        .column("ratio", "double")
    }

    #[test]
    fn runs_and_reads_declared_columns() {
        let (_dir, conn) = devices_connection();
        let query = Query::new(conn, &by_id(), RetryPolicy::default()).unwrap();

        let mut guard = query.acquire();
        guard.set_parameter("id", Value::Integer(2)).unwrap();
        let mut seen = Vec::new();
        let mut exec = guard.prepare();
        assert!(exec.for_each_row(|cols| {
            seen.push((cols[0].as_text().unwrap().to_owned(), cols[1].as_double().unwrap()));
        }));
        exec.release();
        assert_eq!(seen, vec![("beta".to_owned(), 1.25)]);
        assert!(!guard.has_error());
    }

    #[test]
    fn unknown_column_type_fails_construction() {
        let (_dir, conn) = devices_connection();
        let config = QueryConfig::new("bad", "SELECT label FROM devices").column("label", "varchar");
        let err = Query::new(conn, &config, RetryPolicy::default()).unwrap_err();
        assert!(matches!(err, SqlwError::ConfigError(msg) if msg.contains("Unknown column type")));
    }

    #[test]
    fn uncompilable_statement_fails_construction() {
        let (_dir, conn) = devices_connection();
        let config = QueryConfig::new("broken", "SELEKT * FROM devices");
        let err = Query::new(conn, &config, RetryPolicy::default()).unwrap_err();
        assert!(matches!(err, SqlwError::ConfigError(msg) if msg.contains("broken")));
    }

    #[test]
    fn parameter_count_must_match_statement() {
        let (_dir, conn) = devices_connection();
        let config = QueryConfig::new("short", "SELECT label FROM devices WHERE id = ?1 OR id = ?2")
            .parameter("id", "int");
        assert!(matches!(
            Query::new(conn, &config, RetryPolicy::default()),
            Err(SqlwError::ConfigError(_))
        ));
    }

    #[test]
    fn engine_error_is_recorded_and_connection_released() {
        let (_dir, conn) = devices_connection();
        let insert = QueryConfig::new("insert", "INSERT INTO devices (id, label) VALUES (?1, ?2)")
            .parameter("id", "int")
            .parameter("label", "text");
        let query = Query::new(Arc::clone(&conn), &insert, RetryPolicy::default()).unwrap();

        let mut guard = query.acquire();
        guard.set_parameter("id", Value::Integer(1)).unwrap();
        guard.set_parameter("label", Value::Text("dupe".into())).unwrap();
        {
            let mut exec = guard.prepare();
            assert!(!exec.for_each_row(|_| {}));
            assert!(exec.error().unwrap().contains("UNIQUE"));
        }
        assert!(conn.try_lock().is_some());
        assert!(guard.has_error());
        drop(guard);

        assert!(query.acquire().error().is_none());
    }

    #[test]
    fn busy_past_the_ceiling_reports_busy() {
        let (dir, conn) = devices_connection();
        let retry = RetryPolicy {
            retries: 2,
            interval: Duration::from_millis(1),
        };
        let query = Query::new(Arc::clone(&conn), &by_id(), retry).unwrap();

        let holder = rusqlite::Connection::open(dir.path().join("devices.db")).unwrap();
        holder.execute_batch("BEGIN EXCLUSIVE").unwrap();

        let mut guard = query.acquire();
        guard.set_parameter("id", Value::Integer(1)).unwrap();
        assert!(!guard.prepare().for_each_row(|_| {}));
        assert_eq!(guard.error(), Some(BUSY_MESSAGE));

        holder.execute_batch("COMMIT").unwrap();
        drop(guard);
        let mut guard = query.acquire();
        guard.set_parameter("id", Value::Integer(1)).unwrap();
        let mut rows = 0;
        assert!(guard.prepare().for_each_row(|_| rows += 1));
        assert_eq!(rows, 1);
    }

    #[test]
    fn drive_delivers_every_row_once() {
        let (_dir, conn) = devices_connection();
        let all = QueryConfig::new("all", "SELECT id FROM devices ORDER BY id").column("id", "int");
        let query = Query::new(Arc::clone(&conn), &all, RetryPolicy::default()).unwrap();
        let guard_conn = conn.lock();
        let mut stmt = guard_conn.prepare_cached(query.sql()).unwrap();
        let mut columns = vec![TypedValue::new("id", Kind::Integer)];
        let mut ids = Vec::new();
        let delivered = drive(&mut stmt, &mut columns, query.retry_policy(), &mut |cols: &[TypedValue]| {
            ids.push(cols[0].as_int().unwrap());
        })
        .unwrap();
        assert_eq!(delivered, 2);
        assert_eq!(ids, vec![1, 2]);
    }
}
