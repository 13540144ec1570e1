//! PostgreSQL session on an sqlx pool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serverdb_core::{
    Backend, DbError, Dialect, ErrorKind, Executor, NetworkParameters, Result, Row, Session,
    TransactionWork, Value, insert_statement, numbered_placeholders,
};
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Postgres, Row as _, ValueRef as _};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::error::translate;
use crate::runtime;

/// SQL flavour of PostgreSQL 9.5 and later.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn auto_increment_primary_key(&self) -> &'static str {
        "BIGSERIAL PRIMARY KEY"
    }

    fn upsert(
        &self,
        table: &str,
        columns: &[&str],
        conflict_columns: &[&str],
        update_columns: &[&str],
    ) -> String {
        let updates: Vec<String> = update_columns
            .iter()
            .map(|c| format!("{c} = EXCLUDED.{c}"))
            .collect();
        format!(
            "{} ON CONFLICT ({}) DO UPDATE SET {}",
            insert_statement(table, columns),
            conflict_columns.join(", "),
            updates.join(", ")
        )
    }
}

/// A [`Session`] backed by a PostgreSQL connection pool.
pub struct PgSession {
    runtime: Runtime,
    pool: PgPool,
    target: String,
    closed: AtomicBool,
}

impl PgSession {
    /// Connects to the server described by `params`.
    ///
    /// At least one connection is established before this returns, so
    /// unreachable servers and rejected credentials are reported here.
    pub fn connect(params: &NetworkParameters) -> Result<Self> {
        params.validate(Backend::PostgreSql)?;
        let runtime = runtime::build(Backend::PostgreSql)?;
        let port = params.port_or_default(Backend::PostgreSql);
        let target = format!("{}:{}/{}", params.host, port, params.database);

        let options = PgConnectOptions::new()
            .host(&params.host)
            .port(port)
            .username(&params.user)
            .password(&params.password)
            .database(&params.database)
            .application_name("serverdb");
        let pool = runtime::connect_within(
            &runtime,
            Duration::from_secs(params.connect_timeout_secs),
            PgPoolOptions::new()
                .max_connections(params.pool.max_connections)
                .min_connections(params.pool.min_connections)
                .acquire_timeout(runtime::POOL_ACQUIRE_TIMEOUT)
                .connect_with(options),
        )
        .map_err(|e| {
            translate(e, Backend::PostgreSql, &format!("failed to connect to {target}"))
                .context(ErrorKind::Connection, "unable to establish PostgreSQL session")
        })?;

        info!(%target, "opened PostgreSQL session");
        Ok(Self {
            runtime,
            pool,
            target,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DbError::connection("PostgreSQL session is closed"));
        }
        Ok(())
    }
}

impl Session for PgSession {
    fn backend(&self) -> Backend {
        Backend::PostgreSql
    }

    fn dialect(&self) -> &dyn Dialect {
        &PostgresDialect
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.ensure_open()?;
        let sql = numbered_placeholders(sql);
        debug!(sql, "execute");
        self.runtime
            .block_on(bind(sqlx::query(&sql), params).execute(&self.pool))
            .map(|done| done.rows_affected())
            .map_err(|e| translate(e, Backend::PostgreSql, "statement failed"))
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.ensure_open()?;
        let sql = numbered_placeholders(sql);
        debug!(sql, "query");
        self.runtime
            .block_on(bind(sqlx::query(&sql), params).fetch_all(&self.pool))
            .and_then(|rows| rows.iter().map(convert_row).collect())
            .map_err(|e| translate(e, Backend::PostgreSql, "query failed"))
    }

    fn run_transaction(&self, work: &mut TransactionWork<'_>) -> Result<()> {
        self.ensure_open()?;
        // Keeps the runtime current so a transaction dropped mid-unwind can
        // still hand its connection back to the pool.
        let _guard = self.runtime.enter();
        let mut tx = self
            .runtime
            .block_on(self.pool.begin())
            .map_err(|e| translate(e, Backend::PostgreSql, "failed to begin transaction"))?;

        let outcome = work(&mut PgExecutor {
            runtime: &self.runtime,
            tx: &mut tx,
        });
        match outcome {
            Ok(()) => self
                .runtime
                .block_on(tx.commit())
                .map_err(|e| translate(e, Backend::PostgreSql, "failed to commit transaction")),
            Err(err) => {
                if let Err(rollback_err) = self.runtime.block_on(tx.rollback()) {
                    warn!(error = %rollback_err, "failed to roll back PostgreSQL transaction");
                }
                Err(err)
            }
        }
    }

    fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.runtime.block_on(self.pool.close());
            info!(target = %self.target, "closed PostgreSQL session");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for PgSession {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Statement runner handed to transaction work.
struct PgExecutor<'a> {
    runtime: &'a Runtime,
    tx: &'a mut sqlx::Transaction<'static, Postgres>,
}

impl Executor for PgExecutor<'_> {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        let sql = numbered_placeholders(sql);
        debug!(sql, "execute");
        self.runtime
            .block_on(bind(sqlx::query(&sql), params).execute(&mut **self.tx))
            .map(|done| done.rows_affected())
            .map_err(|e| translate(e, Backend::PostgreSql, "statement failed"))
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let sql = numbered_placeholders(sql);
        debug!(sql, "query");
        self.runtime
            .block_on(bind(sqlx::query(&sql), params).fetch_all(&mut **self.tx))
            .and_then(|rows| rows.iter().map(convert_row).collect())
            .map_err(|e| translate(e, Backend::PostgreSql, "query failed"))
    }
}

fn bind<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &[Value],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            Value::Null => query.bind(None::<String>),
            Value::Integer(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.clone()),
        };
    }
    query
}

fn convert_row(row: &PgRow) -> std::result::Result<Row, sqlx::Error> {
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
