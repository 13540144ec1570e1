//! Translation of sqlx failures into the shared error taxonomy.

use serverdb_core::{Backend, DbError, ErrorKind};

/// Wraps an sqlx error into a [`DbError`], keeping it as the cause.
pub(crate) fn translate(err: sqlx::Error, backend: Backend, action: &str) -> DbError {
    let kind = classify(&err);
    let message = match kind {
        ErrorKind::Duplicate => format!("{action}: uniqueness constraint violated"),
        ErrorKind::NotFound => format!("{action}: referenced row does not exist"),
        _ => format!("{action} ({backend})"),
    };
    DbError::new(kind, message).with_cause(err)
}

fn classify(err: &sqlx::Error) -> ErrorKind {
    match err {
        sqlx::Error::Database(db) => match db.kind() {
            sqlx::error::ErrorKind::UniqueViolation => ErrorKind::Duplicate,
            sqlx::error::ErrorKind::ForeignKeyViolation => ErrorKind::NotFound,
            _ => ErrorKind::Backend,
        },
        sqlx::Error::Configuration(_)
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => ErrorKind::Connection,
        _ => ErrorKind::Backend,
    }
}
