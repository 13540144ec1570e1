//! Shared foundations of the virtual server database.
//!
//! This crate holds everything the backends and the table layer agree on:
//!
//! - [`DbError`] / [`ErrorKind`]: the single error family, with preserved
//!   cause chains.
//! - [`Backend`]: the engines a database handle can be bound to.
//! - [`ConnectionParameters`]: per-backend connection settings and their
//!   YAML/JSON file format.
//! - [`Session`], [`Executor`], [`Dialect`]: the driver abstraction each
//!   backend implements.
//! - [`Value`] / [`Row`]: bound parameters and result rows.
//!
//! # Example
//!
//! ```
//! use serverdb_core::{Backend, ConnectionParameters};
//!
//! let params = ConnectionParameters::from_yaml_str("backend: sqlite\npath: servers.sqlite\n")
//!     .unwrap();
//! assert_eq!(params.backend(), Backend::Sqlite);
//! ```

mod backend;
mod driver;
mod error;
mod params;
mod value;

pub use backend::Backend;
pub use driver::{
    Dialect, Executor, Session, TransactionWork, insert_statement, numbered_placeholders,
};
pub use error::{Cause, Chain, DbError, ErrorKind, Result};
pub use params::{ConnectionParameters, NetworkParameters, PoolSizing, SqliteParameters};
pub use value::{Row, Value};
