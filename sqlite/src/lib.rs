//! Embedded SQLite backend for the virtual server database.
//!
//! [`SqliteSession`] implements [`Session`](serverdb_core::Session) on top of
//! a single rusqlite connection. Every connection runs with foreign keys
//! enabled, and statements that fail because another connection holds the
//! file lock are retried according to a bounded [`RetryPolicy`].
//!
//! # Architecture
//!
//! - **`session`**: connection lifecycle, statements and transactions
//! - **`dialect`**: SQLite column types and upsert syntax
//! - **`retry`**: busy/locked retry with linear backoff
//! - **`error`**: rusqlite error classification
//!
//! # Quick start
//!
//! ```no_run
//! use serverdb_core::{Session, SqliteParameters};
//! use serverdb_sqlite::SqliteSession;
//!
//! let session = SqliteSession::open(&SqliteParameters::new("servers.sqlite")).unwrap();
//! let rows = session.query("SELECT sqlite_version()", &[]).unwrap();
//! println!("SQLite {}", rows[0].get_str(0).unwrap());
//! ```

mod dialect;
mod error;
mod retry;
mod session;

pub use dialect::SqliteDialect;
pub use retry::RetryPolicy;
pub use session::SqliteSession;
