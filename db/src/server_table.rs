use serverdb_core::{DbError, Result, Session, Value};
use tracing::debug;

use crate::schema::TableNames;

/// The registry of virtual servers.
///
/// Obtained from [`ServerDatabase::server_table`](crate::ServerDatabase::server_table).
#[derive(Clone, Copy)]
pub struct ServerTable<'a> {
    session: &'a dyn Session,
    names: &'a TableNames,
}

impl<'a> ServerTable<'a> {
    pub(crate) fn new(session: &'a dyn Session, names: &'a TableNames) -> Self {
        Self { session, names }
    }

    pub fn server_exists(&self, server_id: u32) -> Result<bool> {
        let sql = format!(
            "SELECT server_id FROM {} WHERE server_id = ?",
            self.names.servers()
        );
        let row = self
            .session
            .query_optional(&sql, &[Value::from(server_id)])
            .map_err(|e| e.wrap(format!("failed to look up server {server_id}")))?;
        Ok(row.is_some())
    }

    /// Registers `server_id`.
    ///
    /// # Errors
    ///
    /// Returns a [`Duplicate`](serverdb_core::ErrorKind::Duplicate) error if
    /// the ID is already registered. The registry is left unchanged.
    pub fn add_server(&self, server_id: u32) -> Result<()> {
        let sql = format!("INSERT INTO {} (server_id) VALUES (?)", self.names.servers());
        self.session
            .execute(&sql, &[Value::from(server_id)])
            .map_err(|e| {
                if e.is_duplicate() {
                    e.wrap(format!("server {server_id} already exists"))
                } else {
                    e.wrap(format!("failed to add server {server_id}"))
                }
            })?;
        debug!(server_id, "added server");
        Ok(())
    }

    /// Unregisters `server_id` together with its log entries and configuration.
    ///
    /// Removing an unknown ID is not an error.
    pub fn remove_server(&self, server_id: u32) -> Result<()> {
        let id = [Value::from(server_id)];
        let statements = [
            format!("DELETE FROM {} WHERE server_id = ?", self.names.logs()),
            format!("DELETE FROM {} WHERE server_id = ?", self.names.configs()),
            format!("DELETE FROM {} WHERE server_id = ?", self.names.servers()),
        ];
        let removed = self
            .session
            .with_transaction(|tx| {
                let mut affected = 0;
                for sql in &statements {
                    affected = tx.execute(sql, &id)?;
                }
                Ok(affected)
            })
            .map_err(|e| e.wrap(format!("failed to remove server {server_id}")))?;
        debug!(server_id, removed = removed > 0, "removed server");
        Ok(())
    }

    /// Every registered server ID, ascending.
    pub fn get_all_server_ids(&self) -> Result<Vec<u32>> {
        let sql = format!(
            "SELECT server_id FROM {} ORDER BY server_id",
            self.names.servers()
        );
        self.session
            .query(&sql, &[])
            .and_then(|rows| rows.iter().map(|row| row.get_u32(0)).collect())
            .map_err(|e| e.wrap("failed to list servers"))
    }

    /// The smallest positive ID that is not registered.
    pub fn get_free_server_id(&self) -> Result<u32> {
        let mut candidate: u32 = 1;
        for id in self.get_all_server_ids()? {
            if id > candidate {
                break;
            }
            if id == candidate {
                candidate = candidate
                    .checked_add(1)
                    .ok_or_else(|| DbError::backend("no free server ID left"))?;
            }
        }
        Ok(candidate)
    }
}
