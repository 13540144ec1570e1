//! Maps a backend kind to the session implementation compiled into this build.

use serverdb_core::{Backend, ConnectionParameters, DbError, Result, Session};

/// Opens a session for `params` with the matching backend.
///
/// # Errors
///
/// Returns a [`Config`](serverdb_core::ErrorKind::Config) error when the
/// backend was not enabled at compile time, and otherwise whatever the
/// backend reports while connecting.
pub(crate) fn open_session(params: &ConnectionParameters) -> Result<Box<dyn Session>> {
    params.validate()?;
    match params {
        #[cfg(feature = "sqlite")]
        ConnectionParameters::Sqlite(p) => Ok(Box::new(serverdb_sqlite::SqliteSession::open(p)?)),
        #[cfg(feature = "postgres")]
        ConnectionParameters::PostgreSql(p) => Ok(Box::new(serverdb_net::PgSession::connect(p)?)),
        #[cfg(feature = "mysql")]
        ConnectionParameters::MySql(p) => Ok(Box::new(serverdb_net::MySqlSession::connect(p)?)),
        #[allow(unreachable_patterns)]
        other => Err(not_compiled_in(other)),
    }
}

fn not_compiled_in(params: &ConnectionParameters) -> DbError {
    let backend = params.backend();
    let feature = match backend {
        Backend::Sqlite => "sqlite",
        Backend::PostgreSql => "postgres",
        Backend::MySql => "mysql",
    };
    DbError::config(format!(
        "the {backend} backend is not enabled in this build (cargo feature '{feature}')"
    ))
}
