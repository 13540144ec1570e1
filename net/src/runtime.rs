use std::future::Future;
use std::time::Duration;

use serverdb_core::{Backend, DbError, Result};
use tokio::runtime::{Builder, Handle, Runtime};

/// How long a statement waits for a free pooled connection once the
/// session is up. The configured connect timeout only bounds the first
/// connection.
pub(crate) const POOL_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(600);

/// Builds the runtime a networked session drives its pool on.
///
/// One worker is enough: callers block on every statement, so the runtime
/// only has to service pool housekeeping in the background.
///
/// Fails when called from inside another tokio runtime, where blocking on
/// (or dropping) the session would panic.
pub(crate) fn build(backend: Backend) -> Result<Runtime> {
    if Handle::try_current().is_ok() {
        return Err(DbError::connection(format!(
            "a {backend} session cannot be opened from inside an async runtime"
        )));
    }
    Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name(format!("serverdb-{}", backend.as_str().to_lowercase()))
        .enable_all()
        .build()
        .map_err(|e| {
            DbError::connection(format!("failed to start the {backend} driver runtime"))
                .with_cause(e)
        })
}

/// Drives `connect` to completion, giving up after `limit`.
pub(crate) fn connect_within<T>(
    runtime: &Runtime,
    limit: Duration,
    connect: impl Future<Output = std::result::Result<T, sqlx::Error>>,
) -> std::result::Result<T, sqlx::Error> {
    runtime
        .block_on(async { tokio::time::timeout(limit, connect).await })
        .unwrap_or(Err(sqlx::Error::PoolTimedOut))
}
