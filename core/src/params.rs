//! Connection parameters and their file format.
//!
//! Parameters are usually read from a small YAML document (JSON works too)
//! tagged by the backend kind:
//!
//! ```yaml
//! backend: sqlite
//! path: /var/lib/voice/servers.sqlite
//! ```
//!
//! ```yaml
//! backend: postgresql
//! host: db.internal
//! user: voice
//! password: secret
//! database: voice
//! pool:
//!   max_connections: 10
//! ```

use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::error::{DbError, Result};

/// Parameters for opening a session, one variant per backend kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum ConnectionParameters {
    Sqlite(SqliteParameters),
    #[serde(rename = "postgresql")]
    PostgreSql(NetworkParameters),
    #[serde(rename = "mysql")]
    MySql(NetworkParameters),
}

impl ConnectionParameters {
    /// Parameters for a SQLite database file at `path`.
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        ConnectionParameters::Sqlite(SqliteParameters::new(path))
    }

    /// The backend kind these parameters are for.
    pub fn backend(&self) -> Backend {
        match self {
            ConnectionParameters::Sqlite(_) => Backend::Sqlite,
            ConnectionParameters::PostgreSql(_) => Backend::PostgreSql,
            ConnectionParameters::MySql(_) => Backend::MySql,
        }
    }

    /// Loads parameters from a YAML or JSON file.
    ///
    /// # Errors
    ///
    /// Returns a [`Config`](crate::ErrorKind::Config) error if the file
    /// cannot be read, cannot be parsed, or fails [`validate`](Self::validate).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            DbError::config(format!(
                "failed to read connection parameters from '{}'",
                path.display()
            ))
            .with_cause(e)
        })?;
        let params: Self = serde_yaml::from_reader(BufReader::new(file)).map_err(|e| {
            DbError::config(format!(
                "invalid connection parameters in '{}'",
                path.display()
            ))
            .with_cause(e)
        })?;
        params.validate()?;
        Ok(params)
    }

    /// Parses parameters from a YAML or JSON string.
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let params: Self = serde_yaml::from_str(raw)
            .map_err(|e| DbError::config("invalid connection parameters").with_cause(e))?;
        params.validate()?;
        Ok(params)
    }

    /// Checks that every mandatory field is present.
    pub fn validate(&self) -> Result<()> {
        match self {
            ConnectionParameters::Sqlite(p) => {
                if p.path.as_os_str().is_empty() {
                    return Err(DbError::config("SQLite database path is empty"));
                }
                Ok(())
            }
            ConnectionParameters::PostgreSql(p) | ConnectionParameters::MySql(p) => {
                p.validate(self.backend())
            }
        }
    }
}

/// Parameters of the embedded engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteParameters {
    /// Location of the database file; `:memory:` opens a private in-memory database.
    pub path: PathBuf,
    /// Create the file if it does not exist yet.
    #[serde(default = "default_true")]
    pub create: bool,
    /// How long SQLite itself waits on a locked database before reporting busy.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

impl SqliteParameters {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            create: true,
            busy_timeout_ms: default_busy_timeout(),
        }
    }

    /// Whether the parameters name a private in-memory database.
    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == ":memory:"
    }
}

/// Parameters of a networked engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParameters {
    pub host: String,
    /// Defaults to the engine's well-known port when absent.
    #[serde(default)]
    pub port: Option<u16>,
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub database: String,
    #[serde(default)]
    pub pool: PoolSizing,
    /// Upper bound for establishing the session during initialization.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl NetworkParameters {
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: None,
            user: user.into(),
            password: password.into(),
            database: database.into(),
            pool: PoolSizing::default(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }

    /// The configured port, or the default port of `backend`.
    pub fn port_or_default(&self, backend: Backend) -> u16 {
        self.port.unwrap_or(match backend {
            Backend::MySql => 3306,
            _ => 5432,
        })
    }

    /// Checks the mandatory fields and the pool bounds for `backend`.
    pub fn validate(&self, backend: Backend) -> Result<()> {
        let missing = if self.host.is_empty() {
            Some("host")
        } else if self.user.is_empty() {
            Some("user")
        } else if self.database.is_empty() {
            Some("database")
        } else {
            None
        };
        if let Some(field) = missing {
            return Err(DbError::config(format!(
                "{backend} connection parameter '{field}' is empty"
            )));
        }
        if self.pool.max_connections == 0 || self.pool.min_connections > self.pool.max_connections
        {
            return Err(DbError::config(format!(
                "invalid {backend} pool sizing: min {} / max {}",
                self.pool.min_connections, self.pool.max_connections
            )));
        }
        Ok(())
    }
}

/// Connection pool bounds for networked engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSizing {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

impl Default for PoolSizing {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_busy_timeout() -> u64 {
    5_000
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}
