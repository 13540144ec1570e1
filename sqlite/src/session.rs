//! SQLite session: one connection guarded by a mutex.
//!
//! Foreign keys are switched on for every connection so the cascading
//! constraints of the schema hold. Transactions start with `BEGIN IMMEDIATE`
//! so a writer takes the file lock up front instead of failing halfway
//! through, and busy/locked failures are retried according to the
//! session's [`RetryPolicy`].

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::types::{Type, ValueRef};
use rusqlite::{Connection, OpenFlags, TransactionBehavior, params_from_iter};
use serverdb_core::{
    Backend, DbError, Dialect, ErrorKind, Executor, Result, Row, Session, SqliteParameters,
    TransactionWork, Value,
};
use tracing::{debug, info, warn};

use crate::dialect::SqliteDialect;
use crate::error::translate;
use crate::retry::{RetryPolicy, retry_on_busy};

/// A [`Session`] backed by a SQLite database file.
pub struct SqliteSession {
    conn: Mutex<Option<Connection>>,
    location: PathBuf,
    retry: RetryPolicy,
}

impl SqliteSession {
    /// Opens (and, if allowed by `params.create`, creates) the database file.
    ///
    /// # Errors
    ///
    /// Returns a [`Connection`](serverdb_core::ErrorKind::Connection) error
    /// if the file cannot be opened or is not a SQLite database.
    pub fn open(params: &SqliteParameters) -> Result<Self> {
        let opened = if params.is_in_memory() {
            Connection::open_in_memory()
        } else {
            let mut flags = OpenFlags::default();
            if !params.create {
                flags = flags.difference(OpenFlags::SQLITE_OPEN_CREATE);
            }
            Connection::open_with_flags(&params.path, flags)
        };
        let conn = opened.map_err(|e| {
            translate(
                e,
                &format!("failed to open SQLite database '{}'", params.path.display()),
            )
            .context(ErrorKind::Connection, "unable to establish SQLite session")
        })?;

        configure(&conn, Duration::from_millis(params.busy_timeout_ms)).map_err(|e| {
            e.context(ErrorKind::Connection, "unable to configure SQLite session")
        })?;

        info!(path = %params.path.display(), "opened SQLite session");
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            location: params.path.clone(),
            retry: RetryPolicy::default(),
        })
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(&SqliteParameters::new(":memory:"))
    }

    /// Replaces the busy retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Connection>>> {
        self.conn
            .lock()
            .map_err(|_| DbError::connection("SQLite session lock poisoned"))
    }

    /// Runs `f` on the open connection, retrying on busy/locked failures.
    fn with_connection<T>(&self, mut f: impl FnMut(&mut Connection) -> Result<T>) -> Result<T> {
        let mut guard = self.lock()?;
        let conn = guard
            .as_mut()
            .ok_or_else(|| DbError::connection("SQLite session is closed"))?;
        retry_on_busy(&self.retry, || f(&mut *conn))
    }
}

fn configure(conn: &Connection, busy_timeout: Duration) -> Result<()> {
    conn.busy_timeout(busy_timeout)
        .map_err(|e| translate(e, "failed to set busy timeout"))?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|e| translate(e, "failed to enable foreign keys"))?;
    Ok(())
}

impl Session for SqliteSession {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    fn dialect(&self) -> &dyn Dialect {
        &SqliteDialect
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.with_connection(|conn| execute(conn, sql, params))
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.with_connection(|conn| query(conn, sql, params))
    }

    fn run_transaction(&self, work: &mut TransactionWork<'_>) -> Result<()> {
        self.with_connection(|conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| translate(e, "failed to begin transaction"))?;
            let outcome = work(&mut SqliteExecutor { conn: &tx });
            match outcome {
                Ok(()) => tx
                    .commit()
                    .map_err(|e| translate(e, "failed to commit transaction")),
                Err(err) => {
                    if let Err(rollback_err) = tx.rollback() {
                        warn!(error = %rollback_err, "failed to roll back SQLite transaction");
                    }
                    Err(err)
                }
            }
        })
    }

    fn close(&self) -> Result<()> {
        let mut guard = self.lock()?;
        if let Some(conn) = guard.take() {
            conn.close()
                .map_err(|(_, e)| translate(e, "failed to close SQLite session"))?;
            info!(path = %self.location.display(), "closed SQLite session");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.lock().map(|guard| guard.is_none()).unwrap_or(true)
    }
}

/// Statement runner handed to transaction work.
struct SqliteExecutor<'c> {
    conn: &'c Connection,
}

impl Executor for SqliteExecutor<'_> {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        execute(self.conn, sql, params)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        query(self.conn, sql, params)
    }
}

fn execute(conn: &Connection, sql: &str, params: &[Value]) -> Result<u64> {
    debug!(sql, "execute");
    let affected = conn
        .execute(sql, params_from_iter(params.iter().map(to_sqlite)))
        .map_err(|e| translate(e, "statement failed"))?;
    Ok(affected as u64)
}

fn query(conn: &Connection, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
    debug!(sql, "query");
    collect_rows(conn, sql, params).map_err(|e| translate(e, "query failed"))
}

fn collect_rows(conn: &Connection, sql: &str, params: &[Value]) -> rusqlite::Result<Vec<Row>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let column_count = stmt.column_count();
    let mut rows = stmt.query(params_from_iter(params.iter().map(to_sqlite)))?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(column_count);
        for index in 0..column_count {
            let value = match row.get_ref(index)? {
                ValueRef::Null => Value::Null,
                ValueRef::Integer(v) => Value::Integer(v),
                ValueRef::Text(_) => Value::Text(row.get(index)?),
                ValueRef::Real(_) => {
                    return Err(rusqlite::Error::InvalidColumnType(
                        index,
                        format!("column {index}"),
                        Type::Real,
                    ));
                }
                ValueRef::Blob(_) => {
                    return Err(rusqlite::Error::InvalidColumnType(
                        index,
                        format!("column {index}"),
                        Type::Blob,
                    ));
                }
            };
            values.push(value);
        }
        out.push(Row::new(values));
    }
    Ok(out)
}

fn to_sqlite(value: &Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Integer(v) => rusqlite::types::Value::Integer(*v),
        Value::Text(v) => rusqlite::types::Value::Text(v.clone()),
    }
}
