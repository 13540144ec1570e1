//! Translation of rusqlite failures into the shared error taxonomy.

use rusqlite::ErrorCode;
use rusqlite::ffi;
use serverdb_core::{DbError, ErrorKind};

/// Wraps a rusqlite error into a [`DbError`] whose kind reflects the failure.
///
/// `action` describes what was being attempted and becomes the message; the
/// rusqlite error is kept as the cause.
pub(crate) fn translate(err: rusqlite::Error, action: &str) -> DbError {
    let kind = classify(&err);
    let message = match kind {
        ErrorKind::Duplicate => format!("{action}: uniqueness constraint violated"),
        ErrorKind::NotFound => format!("{action}: referenced row does not exist"),
        _ => format!("{action} (SQLite)"),
    };
    DbError::new(kind, message).with_cause(err)
}

fn classify(err: &rusqlite::Error) -> ErrorKind {
    let rusqlite::Error::SqliteFailure(failure, _) = err else {
        return ErrorKind::Backend;
    };
    match failure.code {
        ErrorCode::ConstraintViolation => match failure.extended_code {
            ffi::SQLITE_CONSTRAINT_PRIMARYKEY | ffi::SQLITE_CONSTRAINT_UNIQUE => {
                ErrorKind::Duplicate
            }
            ffi::SQLITE_CONSTRAINT_FOREIGNKEY => ErrorKind::NotFound,
            _ => ErrorKind::Backend,
        },
        ErrorCode::CannotOpen
        | ErrorCode::NotADatabase
        | ErrorCode::PermissionDenied
        | ErrorCode::SystemIoFailure => ErrorKind::Connection,
        _ => ErrorKind::Backend,
    }
}

/// Whether `err` stems from SQLite reporting a busy or locked database.
pub(crate) fn is_busy(err: &DbError) -> bool {
    matches!(
        err.find_cause::<rusqlite::Error>(),
        Some(rusqlite::Error::SqliteFailure(failure, _))
            if matches!(failure.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}
