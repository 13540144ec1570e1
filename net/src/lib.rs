//! Networked SQL backends for the virtual server database.
//!
//! Each backend wraps an sqlx connection pool behind the blocking
//! [`Session`](serverdb_core::Session) interface. A session owns a small
//! tokio runtime and drives every statement to completion on it, so callers
//! stay synchronous and must not call into a session from inside an async
//! task. Opening a session there fails with a connection error.
//!
//! The configured connect timeout bounds establishing the pool. Later
//! statements wait up to ten minutes for a free pooled connection.
//!
//! Backends are compiled in through cargo features:
//!
//! - **`postgres`**: [`PgSession`] and [`PostgresDialect`]
//! - **`mysql`**: [`MySqlSession`] and [`MySqlDialect`]

#[cfg(any(feature = "postgres", feature = "mysql"))]
mod error;
#[cfg(feature = "mysql")]
mod mysql;
#[cfg(feature = "postgres")]
mod postgres;
#[cfg(any(feature = "postgres", feature = "mysql"))]
mod runtime;

#[cfg(feature = "mysql")]
pub use mysql::{MySqlDialect, MySqlSession};
#[cfg(feature = "postgres")]
pub use postgres::{PgSession, PostgresDialect};
