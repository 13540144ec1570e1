//! The backend driver abstraction.
//!
//! A [`Session`] is a live handle to one backend instance. Statements are
//! written once, with `?` placeholders, and every backend binds them in its
//! native syntax. Everything that differs between engines at the SQL level
//! (column types, upsert form) is answered by the session's [`Dialect`], so
//! code above this layer never switches on the backend kind.
//!
//! Each backend translates its driver failures into [`DbError`] before they
//! leave the session, keeping the original failure as the cause.

use crate::backend::Backend;
use crate::error::{DbError, Result};
use crate::value::{Row, Value};

/// Runs statements. Implemented by transaction handles.
pub trait Executor {
    /// Executes a statement, returning the number of affected rows.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Executes a query and collects every row.
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Executes a query expected to return at most one row.
    fn query_optional(&mut self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }
}

/// Unit of work passed to [`Session::run_transaction`].
pub type TransactionWork<'a> = dyn FnMut(&mut dyn Executor) -> Result<()> + 'a;

/// A live connection to one backend instance.
///
/// Sessions are shared between threads; every call blocks the caller until
/// the backend has answered.
pub trait Session: Send + Sync {
    fn backend(&self) -> Backend;

    fn dialect(&self) -> &dyn Dialect;

    /// Executes a single statement outside of any explicit transaction.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Runs a single query outside of any explicit transaction.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Runs `work` inside one transaction.
    ///
    /// The transaction commits when `work` returns `Ok` and rolls back
    /// otherwise; the error returned by `work` is passed through unchanged.
    /// Backends that retry on transient contention may call `work` more than
    /// once, so it must not have effects outside the executor.
    fn run_transaction(&self, work: &mut TransactionWork<'_>) -> Result<()>;

    /// Releases the session. Any later call fails with a connection error.
    fn close(&self) -> Result<()>;

    fn is_closed(&self) -> bool;
}

impl dyn Session + '_ {
    /// Runs `work` inside one transaction and returns its value.
    pub fn with_transaction<T>(
        &self,
        mut work: impl FnMut(&mut dyn Executor) -> Result<T>,
    ) -> Result<T> {
        let mut output = None;
        self.run_transaction(&mut |tx| {
            output = Some(work(tx)?);
            Ok(())
        })?;
        output.ok_or_else(|| DbError::backend("transaction committed without producing a result"))
    }

    /// Runs a query expected to return at most one row.
    pub fn query_optional(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }
}

/// SQL-level differences between engines.
pub trait Dialect: Send + Sync {
    /// Column type for server IDs and other integers.
    fn integer_type(&self) -> &'static str {
        "BIGINT"
    }

    /// Column definition for an auto-assigned integer primary key.
    fn auto_increment_primary_key(&self) -> &'static str;

    /// Column type for unbounded text.
    fn text_type(&self) -> &'static str {
        "TEXT"
    }

    /// Column type for text that takes part in a primary key.
    fn key_text_type(&self) -> &'static str {
        "TEXT"
    }

    /// Trailing options appended to every `CREATE TABLE`.
    fn table_options(&self) -> &'static str {
        ""
    }

    /// A single-statement insert-or-update.
    ///
    /// Inserts one row into `columns`; when a row with the same
    /// `conflict_columns` exists, overwrites `update_columns` instead.
    fn upsert(
        &self,
        table: &str,
        columns: &[&str],
        conflict_columns: &[&str],
        update_columns: &[&str],
    ) -> String;
}

/// Builds `INSERT INTO table (a, b) VALUES (?, ?)`.
pub fn insert_statement(table: &str, columns: &[&str]) -> String {
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders})",
        columns.join(", ")
    )
}

/// Rewrites `?` placeholders into the numbered `$1, $2, ...` form.
///
/// Question marks inside single-quoted literals or double-quoted
/// identifiers are left alone.
pub fn numbered_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut index = 0;
    let mut quote: Option<char> = None;
    for c in sql.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                out.push(c);
            }
            (Some(_), c) => out.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                out.push(c);
            }
            (None, '?') => {
                index += 1;
                out.push('$');
                out.push_str(&index.to_string());
            }
            (None, c) => out.push(c),
        }
    }
    out
}
