use std::collections::HashMap;

use serverdb_core::{Result, Session, Value};
use tracing::debug;

use crate::schema::TableNames;

/// Key/value configuration per server.
///
/// Reads are soft: a missing key, or a missing server, yields the caller's
/// default instead of an error. Writes require the server to be registered.
///
/// Obtained from [`ServerDatabase::config_table`](crate::ServerDatabase::config_table).
#[derive(Clone, Copy)]
pub struct ConfigTable<'a> {
    session: &'a dyn Session,
    names: &'a TableNames,
}

impl<'a> ConfigTable<'a> {
    pub(crate) fn new(session: &'a dyn Session, names: &'a TableNames) -> Self {
        Self { session, names }
    }

    /// The value stored under `key`, or `default` if there is none.
    pub fn get_config(&self, server_id: u32, key: &str, default: &str) -> Result<String> {
        let sql = format!(
            "SELECT config_value FROM {} WHERE server_id = ? AND config_key = ?",
            self.names.configs()
        );
        let row = self
            .session
            .query_optional(&sql, &[Value::from(server_id), Value::from(key)])
            .map_err(|e| e.wrap(format!("failed to read config '{key}' of server {server_id}")))?;
        match row {
            Some(row) => Ok(row.get_str(0)?.to_string()),
            None => Ok(default.to_string()),
        }
    }

    /// [`get_config`](Self::get_config) with an empty default.
    pub fn get_config_or_empty(&self, server_id: u32, key: &str) -> Result<String> {
        self.get_config(server_id, key, "")
    }

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns a [`NotFound`](serverdb_core::ErrorKind::NotFound) error if
    /// the server is not registered.
    pub fn set_config(&self, server_id: u32, key: &str, value: &str) -> Result<()> {
        let sql = self.session.dialect().upsert(
            self.names.configs(),
            &["server_id", "config_key", "config_value"],
            &["server_id", "config_key"],
            &["config_value"],
        );
        self.session
            .execute(
                &sql,
                &[Value::from(server_id), Value::from(key), Value::from(value)],
            )
            .map_err(|e| {
                if e.is_not_found() {
                    e.wrap(format!("server {server_id} does not exist"))
                } else {
                    e.wrap(format!("failed to set config '{key}' of server {server_id}"))
                }
            })?;
        debug!(server_id, key, "set config");
        Ok(())
    }

    /// Removes `key`; a key that is not set is not an error.
    pub fn clear_config(&self, server_id: u32, key: &str) -> Result<()> {
        let sql = format!(
            "DELETE FROM {} WHERE server_id = ? AND config_key = ?",
            self.names.configs()
        );
        self.session
            .execute(&sql, &[Value::from(server_id), Value::from(key)])
            .map_err(|e| e.wrap(format!("failed to clear config '{key}' of server {server_id}")))?;
        Ok(())
    }

    /// Every key and value stored for `server_id`.
    pub fn get_all_configs(&self, server_id: u32) -> Result<HashMap<String, String>> {
        let sql = format!(
            "SELECT config_key, config_value FROM {} WHERE server_id = ?",
            self.names.configs()
        );
        self.session
            .query(&sql, &[Value::from(server_id)])
            .and_then(|rows| {
                rows.iter()
                    .map(|row| -> Result<(String, String)> {
                        Ok((row.get_str(0)?.to_string(), row.get_str(1)?.to_string()))
                    })
                    .collect()
            })
            .map_err(|e| e.wrap(format!("failed to read configs of server {server_id}")))
    }

    /// Removes every key of `server_id`.
    pub fn clear_all_configs(&self, server_id: u32) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE server_id = ?", self.names.configs());
        let removed = self
            .session
            .execute(&sql, &[Value::from(server_id)])
            .map_err(|e| e.wrap(format!("failed to clear configs of server {server_id}")))?;
        debug!(server_id, removed, "cleared configs");
        Ok(())
    }
}
