//! Backend kinds.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The relational engines a database handle can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Embedded, file-based engine.
    Sqlite,
    /// Networked PostgreSQL server.
    #[serde(rename = "postgresql")]
    PostgreSql,
    /// Networked MySQL or MariaDB server.
    #[serde(rename = "mysql")]
    MySql,
}

impl Backend {
    /// All backend kinds, embedded engine first.
    pub const ALL: [Backend; 3] = [Backend::Sqlite, Backend::PostgreSql, Backend::MySql];

    /// Canonical name used in diagnostics and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Sqlite => "SQLite",
            Backend::PostgreSql => "PostgreSQL",
            Backend::MySql => "MySQL",
        }
    }

    /// Whether the engine is reached over the network.
    pub fn is_networked(self) -> bool {
        !matches!(self, Backend::Sqlite)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
