//! MySQL session on an sqlx pool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serverdb_core::{
    Backend, DbError, Dialect, ErrorKind, Executor, NetworkParameters, Result, Row, Session,
    TransactionWork, Value, insert_statement,
};
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::query::Query;
use sqlx::{MySql, Row as _, ValueRef as _};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::error::translate;
use crate::runtime;

/// SQL flavour of MySQL 5.7+ and MariaDB 10.2+ with InnoDB tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn auto_increment_primary_key(&self) -> &'static str {
        "BIGINT AUTO_INCREMENT PRIMARY KEY"
    }

    /// `TEXT` stops at 64 KiB; log messages and config values may be longer.
    fn text_type(&self) -> &'static str {
        "LONGTEXT"
    }

    /// Primary keys cannot contain `TEXT` columns, and 255 four-byte
    /// characters stay within the InnoDB key length limit.
    fn key_text_type(&self) -> &'static str {
        "VARCHAR(255)"
    }

    /// Binary collation keeps config keys case- and accent-sensitive.
    fn table_options(&self) -> &'static str {
        "ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_bin"
    }

    /// Uses `VALUES(column)`, which MySQL 8.0.20+ still accepts with a
    /// deprecation warning. The `AS alias` row form that replaces it is not
    /// understood by MariaDB or MySQL before 8.0.19.
    fn upsert(
        &self,
        table: &str,
        columns: &[&str],
        _conflict_columns: &[&str],
        update_columns: &[&str],
    ) -> String {
        let updates: Vec<String> = update_columns
            .iter()
            .map(|c| format!("{c} = VALUES({c})"))
            .collect();
        format!(
            "{} ON DUPLICATE KEY UPDATE {}",
            insert_statement(table, columns),
            updates.join(", ")
        )
    }
}

/// A [`Session`] backed by a MySQL connection pool.
pub struct MySqlSession {
    runtime: Runtime,
    pool: MySqlPool,
    target: String,
    closed: AtomicBool,
}

impl MySqlSession {
    /// Connects to the server described by `params`.
    ///
    /// Connections use the `utf8mb4` character set so that text outside the
    /// basic multilingual plane survives a round trip.
    pub fn connect(params: &NetworkParameters) -> Result<Self> {
        params.validate(Backend::MySql)?;
        let runtime = runtime::build(Backend::MySql)?;
        let port = params.port_or_default(Backend::MySql);
        let target = format!("{}:{}/{}", params.host, port, params.database);

        let options = MySqlConnectOptions::new()
            .host(&params.host)
            .port(port)
            .username(&params.user)
            .password(&params.password)
            .database(&params.database)
            .charset("utf8mb4");
        let pool = runtime::connect_within(
            &runtime,
            Duration::from_secs(params.connect_timeout_secs),
            MySqlPoolOptions::new()
                .max_connections(params.pool.max_connections)
                .min_connections(params.pool.min_connections)
                .acquire_timeout(runtime::POOL_ACQUIRE_TIMEOUT)
                .connect_with(options),
        )
        .map_err(|e| {
            translate(e, Backend::MySql, &format!("failed to connect to {target}"))
                .context(ErrorKind::Connection, "unable to establish MySQL session")
        })?;

        info!(%target, "opened MySQL session");
        Ok(Self {
            runtime,
            pool,
            target,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DbError::connection("MySQL session is closed"));
        }
        Ok(())
    }
}

impl Session for MySqlSession {
    fn backend(&self) -> Backend {
        Backend::MySql
    }

    fn dialect(&self) -> &dyn Dialect {
        &MySqlDialect
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.ensure_open()?;
        debug!(sql, "execute");
        self.runtime
            .block_on(bind(sqlx::query(sql), params).execute(&self.pool))
            .map(|done| done.rows_affected())
            .map_err(|e| translate(e, Backend::MySql, "statement failed"))
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.ensure_open()?;
        debug!(sql, "query");
        self.runtime
            .block_on(bind(sqlx::query(sql), params).fetch_all(&self.pool))
            .and_then(|rows| rows.iter().map(convert_row).collect())
            .map_err(|e| translate(e, Backend::MySql, "query failed"))
    }

    fn run_transaction(&self, work: &mut TransactionWork<'_>) -> Result<()> {
        self.ensure_open()?;
        let _guard = self.runtime.enter();
        let mut tx = self
            .runtime
            .block_on(self.pool.begin())
            .map_err(|e| translate(e, Backend::MySql, "failed to begin transaction"))?;

        let outcome = work(&mut MySqlExecutor {
            runtime: &self.runtime,
            tx: &mut tx,
        });
        match outcome {
            Ok(()) => self
                .runtime
                .block_on(tx.commit())
                .map_err(|e| translate(e, Backend::MySql, "failed to commit transaction")),
            Err(err) => {
                if let Err(rollback_err) = self.runtime.block_on(tx.rollback()) {
                    warn!(error = %rollback_err, "failed to roll back MySQL transaction");
                }
                Err(err)
            }
        }
    }

    fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.runtime.block_on(self.pool.close());
            info!(target = %self.target, "closed MySQL session");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for MySqlSession {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

struct MySqlExecutor<'a> {
    runtime: &'a Runtime,
    tx: &'a mut sqlx::Transaction<'static, MySql>,
}

impl Executor for MySqlExecutor<'_> {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        debug!(sql, "execute");
        self.runtime
            .block_on(bind(sqlx::query(sql), params).execute(&mut **self.tx))
            .map(|done| done.rows_affected())
            .map_err(|e| translate(e, Backend::MySql, "statement failed"))
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        debug!(sql, "query");
        self.runtime
            .block_on(bind(sqlx::query(sql), params).fetch_all(&mut **self.tx))
            .and_then(|rows| rows.iter().map(convert_row).collect())
            .map_err(|e| translate(e, Backend::MySql, "query failed"))
    }
}

fn bind<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &[Value],
) -> Query<'q, MySql, MySqlArguments> {
    for param in params {
        query = match param {
            Value::Null => query.bind(None::<String>),
            Value::Integer(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.clone()),
        };
    }
    query
}

fn convert_row(row: &MySqlRow) -> std::result::Result<Row, sqlx::Error> {
    let mut values = Vec::with_capacity(row.columns().len());
    for index in 0..row.columns().len() {
        if row.try_get_raw(index)?.is_null() {
            values.push(Value::Null);
        } else if let Ok(v) = row.try_get::<i64, _>(index) {
            values.push(Value::Integer(v));
        } else if let Ok(v) = row.try_get::<i32, _>(index) {
            values.push(Value::Integer(v.into()));
        } else {
            values.push(Value::Text(row.try_get::<String, _>(index)?));
        }
    }
    Ok(Row::new(values))
}
