use chrono::{DateTime, Utc};
use serde::Serialize;
use serverdb_core::{DbError, Result, Row, Session, Value};
use tracing::debug;

use crate::schema::TableNames;

/// One stored log message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    /// Assigned on insert; orders entries of a server oldest first.
    pub id: i64,
    pub server_id: u32,
    /// When the entry was written, with millisecond precision.
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl LogEntry {
    fn from_row(row: &Row) -> Result<Self> {
        let millis = row.get_i64(2)?;
        let timestamp = DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
            DbError::backend(format!("log timestamp {millis} is out of range"))
        })?;
        Ok(Self {
            id: row.get_i64(0)?,
            server_id: row.get_u32(1)?,
            timestamp,
            message: row.get_str(3)?.to_string(),
        })
    }
}

/// Append-only log messages per server.
///
/// Obtained from [`ServerDatabase::log_table`](crate::ServerDatabase::log_table).
#[derive(Clone, Copy)]
pub struct LogTable<'a> {
    session: &'a dyn Session,
    names: &'a TableNames,
}

impl<'a> LogTable<'a> {
    pub(crate) fn new(session: &'a dyn Session, names: &'a TableNames) -> Self {
        Self { session, names }
    }

    /// Appends `message` to the log of `server_id`, timestamped now.
    ///
    /// The text is stored verbatim.
    ///
    /// # Errors
    ///
    /// Returns a [`NotFound`](serverdb_core::ErrorKind::NotFound) error, and
    /// writes nothing, if the server is not registered.
    pub fn log_message(&self, server_id: u32, message: &str) -> Result<()> {
        let exists_sql = format!(
            "SELECT server_id FROM {} WHERE server_id = ?",
            self.names.servers()
        );
        let insert_sql = format!(
            "INSERT INTO {} (server_id, message_date, message) VALUES (?, ?, ?)",
            self.names.logs()
        );
        let params = [
            Value::from(server_id),
            Value::Integer(Utc::now().timestamp_millis()),
            Value::from(message),
        ];

        self.session
            .with_transaction(|tx| {
                if tx.query_optional(&exists_sql, &params[..1])?.is_none() {
                    return Err(DbError::not_found(format!(
                        "server {server_id} does not exist"
                    )));
                }
                tx.execute(&insert_sql, &params)?;
                Ok(())
            })
            .map_err(|e| e.wrap(format!("failed to log message for server {server_id}")))?;
        debug!(server_id, "logged message");
        Ok(())
    }

    /// Log entries of `server_id` in insertion order.
    ///
    /// Skips the first `offset` entries and returns at most `max_entries`
    /// (all when `None`). An unknown server has no entries.
    pub fn get_logs(
        &self,
        server_id: u32,
        max_entries: Option<u32>,
        offset: u32,
    ) -> Result<Vec<LogEntry>> {
        let sql = format!(
            "SELECT id, server_id, message_date, message FROM {} \
             WHERE server_id = ? ORDER BY id LIMIT ? OFFSET ?",
            self.names.logs()
        );
        let limit = max_entries.map_or(i64::MAX, i64::from);
        self.session
            .query(
                &sql,
                &[
                    Value::from(server_id),
                    Value::Integer(limit),
                    Value::from(offset),
                ],
            )
            .and_then(|rows| rows.iter().map(LogEntry::from_row).collect())
            .map_err(|e| e.wrap(format!("failed to read log of server {server_id}")))
    }

    /// Number of log entries stored for `server_id`.
    pub fn get_log_size(&self, server_id: u32) -> Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE server_id = ?",
            self.names.logs()
        );
        let count = match self
            .session
            .query_optional(&sql, &[Value::from(server_id)])
            .map_err(|e| e.wrap(format!("failed to count log of server {server_id}")))?
        {
            Some(row) => row.get_i64(0)?,
            None => 0,
        };
        Ok(u64::try_from(count).unwrap_or_default())
    }
}
