//! Table names and the statements that create and drop them.
//!
//! The schema is fixed: three tables, created with `CREATE TABLE IF NOT
//! EXISTS` so that initializing against existing storage changes nothing.
//!
//! # Table structure
//!
//! - `{prefix}servers`: registered virtual server IDs
//! - `{prefix}logs`: append-only log messages, oldest first by `id`
//! - `{prefix}configs`: one value per `(server_id, config_key)`
//!
//! Both dependent tables reference `servers` with `ON DELETE CASCADE`.
//!
//! # Custom prefix
//!
//! Prefixes may only contain ASCII alphanumerics and underscores, which
//! keeps the resulting names valid unquoted identifiers on every backend.
//! The empty prefix is allowed.

use serverdb_core::{DbError, Dialect, ErrorKind, Result, Session, Value};
use tracing::{debug, info};

/// The server registered when an empty registry is initialized.
pub const DEFAULT_SERVER_ID: u32 = 1;

/// Validates that a table prefix contains only ASCII alphanumerics and underscores.
pub(crate) fn validate_prefix(prefix: &str) -> Result<()> {
    if !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DbError::config(format!(
            "invalid table prefix '{prefix}': only ASCII letters, digits and '_' are allowed"
        )));
    }
    Ok(())
}

/// Fully prefixed names of the three tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    prefix: String,
    servers: String,
    logs: String,
    configs: String,
}

impl TableNames {
    /// # Errors
    ///
    /// Returns a [`Config`](ErrorKind::Config) error for an invalid prefix.
    pub fn new(prefix: &str) -> Result<Self> {
        validate_prefix(prefix)?;
        Ok(Self {
            prefix: prefix.to_string(),
            servers: format!("{prefix}servers"),
            logs: format!("{prefix}logs"),
            configs: format!("{prefix}configs"),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn servers(&self) -> &str {
        &self.servers
    }

    pub fn logs(&self) -> &str {
        &self.logs
    }

    pub fn configs(&self) -> &str {
        &self.configs
    }
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            servers: "servers".to_string(),
            logs: "logs".to_string(),
            configs: "configs".to_string(),
        }
    }
}

/// `CREATE TABLE` statements in dependency order, paired with the table name.
pub(crate) fn create_table_statements(
    names: &TableNames,
    dialect: &dyn Dialect,
) -> Vec<(String, String)> {
    let int = dialect.integer_type();
    let text = dialect.text_type();
    let options = match dialect.table_options() {
        "" => String::new(),
        options => format!(" {options}"),
    };
    let servers = names.servers();

    vec![
        (
            servers.to_string(),
            format!(
                "CREATE TABLE IF NOT EXISTS {servers} (\
                 server_id {int} NOT NULL PRIMARY KEY\
                 ){options}"
            ),
        ),
        (
            names.logs().to_string(),
            format!(
                "CREATE TABLE IF NOT EXISTS {logs} (\
                 id {id}, \
                 server_id {int} NOT NULL, \
                 message_date {int} NOT NULL, \
                 message {text} NOT NULL, \
                 FOREIGN KEY (server_id) REFERENCES {servers}(server_id) ON DELETE CASCADE\
                 ){options}",
                logs = names.logs(),
                id = dialect.auto_increment_primary_key(),
            ),
        ),
        (
            names.configs().to_string(),
            format!(
                "CREATE TABLE IF NOT EXISTS {configs} (\
                 server_id {int} NOT NULL, \
                 config_key {key} NOT NULL, \
                 config_value {text} NOT NULL, \
                 PRIMARY KEY (server_id, config_key), \
                 FOREIGN KEY (server_id) REFERENCES {servers}(server_id) ON DELETE CASCADE\
                 ){options}",
                configs = names.configs(),
                key = dialect.key_text_type(),
            ),
        ),
    ]
}

/// `DROP TABLE` statements in reverse dependency order.
#[cfg(feature = "test-utils")]
pub(crate) fn drop_table_statements(names: &TableNames) -> Vec<String> {
    [names.logs(), names.configs(), names.servers()]
        .iter()
        .map(|table| format!("DROP TABLE IF EXISTS {table}"))
        .collect()
}

/// Ensures all tables exist and that the registry is not empty.
///
/// Every failure is reported as a [`Schema`](ErrorKind::Schema) error with
/// the backend failure as its cause.
pub(crate) fn ensure_schema(session: &dyn Session, names: &TableNames) -> Result<()> {
    for (table, sql) in create_table_statements(names, session.dialect()) {
        debug!(%table, "ensuring table exists");
        create_table(session, &table, &sql)
            .map_err(|e| e.context(ErrorKind::Schema, format!("failed to create table '{table}'")))?;
    }
    ensure_default_server(session, names).map_err(|e| {
        e.context(
            ErrorKind::Schema,
            format!("failed to register default server {DEFAULT_SERVER_ID}"),
        )
    })
}

/// Runs one `CREATE TABLE IF NOT EXISTS`.
///
/// PostgreSQL reports a catalog uniqueness violation when another session
/// creates the same table at the same moment. By the time that error is
/// raised the other creation has committed, so a second attempt finds the
/// table and succeeds.
fn create_table(session: &dyn Session, table: &str, sql: &str) -> Result<()> {
    match session.execute(sql, &[]) {
        Err(err) if err.is_duplicate() => {
            debug!(%table, "table created concurrently, checking again");
            session.execute(sql, &[]).map(|_| ())
        }
        other => other.map(|_| ()),
    }
}

fn ensure_default_server(session: &dyn Session, names: &TableNames) -> Result<()> {
    let count_sql = format!("SELECT COUNT(*) FROM {}", names.servers());
    let insert_sql = format!("INSERT INTO {} (server_id) VALUES (?)", names.servers());

    let outcome = session.with_transaction(|tx| {
        let rows = tx.query(&count_sql, &[])?;
        let count = match rows.first() {
            Some(row) => row.get_i64(0)?,
            None => 0,
        };
        if count > 0 {
            return Ok(false);
        }
        tx.execute(&insert_sql, &[Value::from(DEFAULT_SERVER_ID)])?;
        Ok(true)
    });
    match outcome {
        Ok(true) => {
            info!(server_id = DEFAULT_SERVER_ID, "registered default server");
            Ok(())
        }
        Ok(false) => Ok(()),
        // Another initializer registered it first.
        Err(err) if err.is_duplicate() => Ok(()),
        Err(err) => Err(err),
    }
}

/// Drops every table, dependents first.
#[cfg(feature = "test-utils")]
pub(crate) fn drop_tables(session: &dyn Session, names: &TableNames) -> Result<()> {
    for sql in drop_table_statements(names) {
        session
            .execute(&sql, &[])
            .map_err(|e| e.context(ErrorKind::Schema, "failed to drop tables"))?;
    }
    Ok(())
}
