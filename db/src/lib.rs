//! Persistence for a multi-tenant voice server.
//!
//! A [`ServerDatabase`] stores the registry of hosted virtual servers, their
//! log messages and their key/value configuration in SQLite, PostgreSQL or
//! MySQL. The same integrity rules hold on every backend:
//!
//! - server IDs are unique, enforced by the storage itself;
//! - log and config rows always belong to a registered server, and removing
//!   a server removes them too;
//! - multi-step operations run in one transaction.
//!
//! # Architecture
//!
//! - **`database`**: handle lifecycle and table accessors
//! - **`factory`**: backend kind to session mapping
//! - **`schema`**: table names, creation and the default server
//! - **`server_table`**, **`log_table`**, **`config_table`**: the three tables
//!
//! Sessions and error translation live in `serverdb-sqlite` and
//! `serverdb-net`; both implement the traits of `serverdb-core`.
//!
//! # Quick start
//!
//! ```no_run
//! use serverdb::{ConnectionParameters, ServerDatabase};
//!
//! let params = ConnectionParameters::load("serverdb.yaml").unwrap();
//! let db = ServerDatabase::open(&params).unwrap();
//!
//! let logs = db.log_table().unwrap();
//! if let Err(err) = logs.log_message(5, "hello") {
//!     assert!(err.is_not_found());
//!     eprintln!("error:\n{}", err.report());
//! }
//! ```
//!
//! # Features
//!
//! - **`sqlite`** (default): the embedded backend
//! - **`postgres`**, **`mysql`**: the networked backends
//! - **`test-utils`**: `ServerDatabase::destroy_tables` for test teardown

mod config_table;
mod database;
mod factory;
mod log_table;
mod schema;
mod server_table;

pub use config_table::ConfigTable;
pub use database::{DatabaseState, ServerDatabase};
pub use log_table::{LogEntry, LogTable};
pub use schema::{DEFAULT_SERVER_ID, TableNames};
pub use server_table::ServerTable;

pub use serverdb_core::{
    Backend, ConnectionParameters, DbError, ErrorKind, NetworkParameters, PoolSizing, Result,
    SqliteParameters,
};
