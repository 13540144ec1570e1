use std::fmt;

use serverdb_core::{Backend, ConnectionParameters, DbError, Result, Session};
use tracing::{info, warn};

use crate::config_table::ConfigTable;
use crate::factory;
use crate::log_table::LogTable;
use crate::schema::{self, TableNames};
use crate::server_table::ServerTable;

/// Lifecycle of a [`ServerDatabase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseState {
    /// Constructed; no session yet.
    Uninitialized,
    /// `init` is opening the session and preparing the schema.
    Initializing,
    /// Session open and schema in place; the tables are usable.
    Ready,
    /// `init` failed. The handle cannot be used any more.
    Failed,
    /// The session was released by `close`.
    Closed,
}

impl fmt::Display for DatabaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DatabaseState::Uninitialized => "uninitialized",
            DatabaseState::Initializing => "initializing",
            DatabaseState::Ready => "ready",
            DatabaseState::Failed => "failed",
            DatabaseState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A database handle bound to one backend.
///
/// The handle owns the session; the table views it hands out borrow it and
/// may be used from many threads at once.
///
/// # Examples
///
/// ```no_run
/// use serverdb::{ConnectionParameters, ServerDatabase};
///
/// let db = ServerDatabase::open(&ConnectionParameters::sqlite("servers.sqlite")).unwrap();
/// let servers = db.server_table().unwrap();
/// if !servers.server_exists(2).unwrap() {
///     servers.add_server(2).unwrap();
/// }
/// db.config_table().unwrap().set_config(2, "welcome", "Hi there").unwrap();
/// ```
pub struct ServerDatabase {
    backend: Backend,
    names: TableNames,
    state: DatabaseState,
    session: Option<Box<dyn Session>>,
}

impl ServerDatabase {
    /// An uninitialized handle for `backend` using unprefixed table names.
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            names: TableNames::default(),
            state: DatabaseState::Uninitialized,
            session: None,
        }
    }

    /// An uninitialized handle whose table names start with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns a [`Config`](serverdb_core::ErrorKind::Config) error if the
    /// prefix contains anything but ASCII alphanumerics and underscores.
    pub fn with_prefix(backend: Backend, prefix: &str) -> Result<Self> {
        Ok(Self {
            names: TableNames::new(prefix)?,
            ..Self::new(backend)
        })
    }

    /// Creates a handle for the backend of `params` and initializes it.
    pub fn open(params: &ConnectionParameters) -> Result<Self> {
        let mut db = Self::new(params.backend());
        db.init(params)?;
        Ok(db)
    }

    /// Like [`open`](Self::open), with prefixed table names.
    pub fn open_with_prefix(params: &ConnectionParameters, prefix: &str) -> Result<Self> {
        let mut db = Self::with_prefix(params.backend(), prefix)?;
        db.init(params)?;
        Ok(db)
    }

    /// Opens the session and makes sure the schema exists.
    ///
    /// On success the handle is [`Ready`](DatabaseState::Ready). Any failure
    /// leaves it [`Failed`](DatabaseState::Failed); it is not retried.
    ///
    /// # Errors
    ///
    /// - [`Config`](serverdb_core::ErrorKind::Config) if `params` are for
    ///   another backend, are incomplete, or name a backend that is not
    ///   compiled in.
    /// - [`Connection`](serverdb_core::ErrorKind::Connection) if the handle
    ///   is not uninitialized or the backend cannot be reached.
    /// - [`Schema`](serverdb_core::ErrorKind::Schema) if the tables cannot be
    ///   created.
    pub fn init(&mut self, params: &ConnectionParameters) -> Result<()> {
        if self.state != DatabaseState::Uninitialized {
            return Err(DbError::connection(format!(
                "cannot initialize a database handle that is {}",
                self.state
            )));
        }
        self.state = DatabaseState::Initializing;

        match self.connect(params) {
            Ok(session) => {
                self.session = Some(session);
                self.state = DatabaseState::Ready;
                info!(backend = %self.backend, prefix = self.names.prefix(), "database ready");
                Ok(())
            }
            Err(err) => {
                self.state = DatabaseState::Failed;
                warn!(backend = %self.backend, error = %err, "database initialization failed");
                Err(err.wrap(format!("failed to initialize {} database", self.backend)))
            }
        }
    }

    fn connect(&self, params: &ConnectionParameters) -> Result<Box<dyn Session>> {
        if params.backend() != self.backend {
            return Err(DbError::config(format!(
                "{} connection parameters given to a {} database handle",
                params.backend(),
                self.backend
            )));
        }
        let session = factory::open_session(params)?;
        if let Err(err) = schema::ensure_schema(session.as_ref(), &self.names) {
            if let Err(close_err) = session.close() {
                warn!(error = %close_err, "failed to close session after schema failure");
            }
            return Err(err);
        }
        Ok(session)
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn state(&self) -> DatabaseState {
        self.state
    }

    pub fn table_names(&self) -> &TableNames {
        &self.names
    }

    fn session(&self) -> Result<&dyn Session> {
        match (&self.session, self.state) {
            (Some(session), DatabaseState::Ready) => Ok(session.as_ref()),
            (_, state) => Err(DbError::connection(format!(
                "{} database is not ready (state: {state})",
                self.backend
            ))),
        }
    }

    /// The server registry.
    ///
    /// # Errors
    ///
    /// Returns a [`Connection`](serverdb_core::ErrorKind::Connection) error
    /// unless the handle is [`Ready`](DatabaseState::Ready); the same holds
    /// for [`log_table`](Self::log_table) and [`config_table`](Self::config_table).
    pub fn server_table(&self) -> Result<ServerTable<'_>> {
        Ok(ServerTable::new(self.session()?, &self.names))
    }

    pub fn log_table(&self) -> Result<LogTable<'_>> {
        Ok(LogTable::new(self.session()?, &self.names))
    }

    pub fn config_table(&self) -> Result<ConfigTable<'_>> {
        Ok(ConfigTable::new(self.session()?, &self.names))
    }

    /// Releases the session. Closing again is a no-op.
    pub fn close(&mut self) -> Result<()> {
        self.state = DatabaseState::Closed;
        if let Some(session) = self.session.take() {
            session
                .close()
                .map_err(|e| e.wrap(format!("failed to close {} database", self.backend)))?;
            info!(backend = %self.backend, "database closed");
        }
        Ok(())
    }

    /// Drops all tables. Only for tearing down test databases.
    #[cfg(feature = "test-utils")]
    pub fn destroy_tables(&self) -> Result<()> {
        schema::drop_tables(self.session()?, &self.names)
    }
}

impl fmt::Debug for ServerDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerDatabase")
            .field("backend", &self.backend)
            .field("names", &self.names)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
