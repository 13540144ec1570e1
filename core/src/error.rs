//! Error taxonomy shared by every crate of the workspace.
//!
//! All fallible operations return [`DbError`]. An error has a [`ErrorKind`]
//! that callers branch on, a human-readable message, and optionally the
//! lower-level failure it was translated from. Causes nest: a schema error
//! may wrap a backend error which in turn wraps the raw driver error.
//! [`DbError::chain`] walks that sequence from the outermost error to the
//! innermost one.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

/// Boxed lower-level failure preserved inside a [`DbError`].
pub type Cause = Box<dyn StdError + Send + Sync + 'static>;

/// The category of a [`DbError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A session could not be established, or is no longer usable.
    Connection,
    /// A required table could not be created.
    Schema,
    /// A referenced server does not exist.
    NotFound,
    /// An insert violated a uniqueness constraint.
    Duplicate,
    /// Any other failure reported by the backend.
    Backend,
    /// Connection parameters or table prefix are invalid.
    Config,
}

impl ErrorKind {
    /// Returns a short lowercase label for the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Schema => "schema",
            ErrorKind::NotFound => "not found",
            ErrorKind::Duplicate => "duplicate",
            ErrorKind::Backend => "backend",
            ErrorKind::Config => "configuration",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single error type crossing the database layer's boundary.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DbError {
    kind: ErrorKind,
    message: String,
    #[source]
    cause: Option<Cause>,
}

impl DbError {
    /// Creates an error without a cause.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, message)
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Schema, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn duplicate(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Duplicate, message)
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Backend, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    /// Attaches `cause` as the error this one was translated from.
    ///
    /// Replaces any cause set earlier.
    pub fn with_cause(mut self, cause: impl Into<Cause>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Wraps `self` as the cause of a new error of the given kind.
    ///
    /// ```
    /// use serverdb_core::{DbError, ErrorKind};
    ///
    /// let err = DbError::backend("no such table: servers")
    ///     .context(ErrorKind::Schema, "failed to create table 'servers'");
    /// assert_eq!(err.kind(), ErrorKind::Schema);
    /// assert_eq!(err.chain().count(), 2);
    /// ```
    pub fn context(self, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message).with_cause(self)
    }

    /// Like [`context`](Self::context), keeping the kind of `self`.
    pub fn wrap(self, message: impl Into<String>) -> Self {
        let kind = self.kind;
        self.context(kind, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The error this one was translated from, if any.
    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    pub fn is_connection(&self) -> bool {
        self.kind == ErrorKind::Connection
    }

    pub fn is_schema(&self) -> bool {
        self.kind == ErrorKind::Schema
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    pub fn is_duplicate(&self) -> bool {
        self.kind == ErrorKind::Duplicate
    }

    pub fn is_backend(&self) -> bool {
        self.kind == ErrorKind::Backend
    }

    pub fn is_config(&self) -> bool {
        self.kind == ErrorKind::Config
    }

    /// Iterates over this error and its causes, outermost first.
    pub fn chain(&self) -> Chain<'_> {
        Chain {
            next: Some(self as &(dyn StdError + 'static)),
        }
    }

    /// The innermost error of the chain.
    pub fn root_cause(&self) -> &(dyn StdError + 'static) {
        let mut current: &(dyn StdError + 'static) = self;
        while let Some(source) = current.source() {
            current = source;
        }
        current
    }

    /// Finds the first error of type `E` in the chain.
    ///
    /// Backends use this to inspect the raw driver failure they preserved.
    pub fn find_cause<E: StdError + 'static>(&self) -> Option<&E> {
        self.chain().find_map(|err| err.downcast_ref::<E>())
    }

    /// Renders every message of the chain, one per line, outermost first.
    ///
    /// Each line is indented by two spaces so the report can be printed
    /// directly below a heading such as `error:`.
    pub fn report(&self) -> String {
        let mut out = String::new();
        for (depth, err) in self.chain().enumerate() {
            if depth > 0 {
                out.push('\n');
            }
            out.push_str("  ");
            out.push_str(&err.to_string());
        }
        out
    }
}

/// Iterator returned by [`DbError::chain`].
#[derive(Clone)]
pub struct Chain<'a> {
    next: Option<&'a (dyn StdError + 'static)>,
}

impl<'a> Iterator for Chain<'a> {
    type Item = &'a (dyn StdError + 'static);

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.source();
        Some(current)
    }
}

/// Convenience alias for results with [`DbError`].
pub type Result<T> = std::result::Result<T, DbError>;
