//! Client facade over the pool and an optional active transaction.
//!
//! A `Client` is cheap to clone. A clone bound to a transaction routes every
//! statement through it; otherwise statements go to the pool. Every
//! statement is timed and fed to the slow-query log.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::TryStreamExt;
use sqlx::postgres::{PgArguments, PgPool, PgPoolCopyExt, PgQueryResult, PgRow};
use sqlx::query::Query;
use sqlx::{FromRow, Postgres, Row, Transaction};
use tokio::sync::Mutex;

use pgkit_core::{Error, Result, Value};

use crate::pool::{build_pool, DatabaseConfig, PoolStats};

type SharedTx = Arc<Mutex<Option<Transaction<'static, Postgres>>>>;

/// PostgreSQL client routing statements through the pool or, when bound,
/// through a single shared transaction.
#[derive(Clone)]
pub struct Client {
    pool: PgPool,
    tx: Option<SharedTx>,
    slow_query_threshold: Option<Duration>,
}

impl Client {
    /// Connect to the database and verify liveness with `SELECT 1`.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = build_pool(config).await?;
        let client = Self {
            pool,
            tx: None,
            slow_query_threshold: config.slow_query_threshold(),
        };
        client.execute_one("SELECT 1", Vec::new()).await?;
        Ok(client)
    }

    /// Wrap an existing pool.
    pub fn with_pool(pool: PgPool) -> Self {
        Self {
            pool,
            tx: None,
            slow_query_threshold: None,
        }
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Whether this client is bound to an active transaction.
    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    /// Execute a statement, returning the number of affected rows.
    pub async fn execute(&self, sql: &str, params: Vec<Value>) -> Result<u64> {
        let started = Instant::now();
        let result = self.run_execute(sql, params).await;
        self.log_statement(sql, started.elapsed(), result.as_ref().err());
        Ok(result?.rows_affected())
    }

    /// Execute a statement that must affect exactly one row.
    pub async fn execute_one(&self, sql: &str, params: Vec<Value>) -> Result<u64> {
        let affected = self.execute(sql, params).await?;
        if affected == 0 {
            return Err(Error::NotFound);
        }
        if affected > 1 {
            return Err(Error::internal(format!(
                "expected one affected row, got {}",
                affected
            )));
        }
        Ok(affected)
    }

    /// Fetch a single row; zero rows is `NotFound`.
    pub async fn fetch_one<T>(&self, sql: &str, params: Vec<Value>) -> Result<T>
    where
        T: for<'r> FromRow<'r, PgRow>,
    {
        self.fetch_optional(sql, params).await?.ok_or(Error::NotFound)
    }

    pub async fn fetch_optional<T>(&self, sql: &str, params: Vec<Value>) -> Result<Option<T>>
    where
        T: for<'r> FromRow<'r, PgRow>,
    {
        let row = self.run_fetch_optional(sql, params).await?;
        match row {
            Some(row) => Ok(Some(T::from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn fetch_all<T>(&self, sql: &str, params: Vec<Value>) -> Result<Vec<T>>
    where
        T: for<'r> FromRow<'r, PgRow>,
    {
        let rows = self.run_fetch_all(sql, params).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(T::from_row(row)?);
        }
        Ok(out)
    }

    /// Fetch the first column of a single row.
    pub async fn fetch_scalar<T>(&self, sql: &str, params: Vec<Value>) -> Result<T>
    where
        T: for<'r> sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
    {
        let row = self
            .run_fetch_optional(sql, params)
            .await?
            .ok_or(Error::NotFound)?;
        Ok(row.try_get::<T, _>(0)?)
    }

    /// Raw `COPY ... FROM STDIN` passthrough. Always runs on the pool,
    /// outside any active transaction.
    pub async fn copy_in(&self, statement: &str, data: &[u8]) -> Result<u64> {
        let mut sink = self.pool.copy_in_raw(statement).await?;
        sink.send(data).await?;
        Ok(sink.finish().await?)
    }

    /// Raw `COPY ... TO STDOUT` passthrough. Always runs on the pool,
    /// outside any active transaction.
    pub async fn copy_out(&self, statement: &str) -> Result<Vec<u8>> {
        let mut stream = self.pool.copy_out_raw(statement).await?;
        let mut data = Vec::new();
        while let Some(chunk) = stream.try_next().await? {
            data.extend_from_slice(&chunk);
        }
        Ok(data)
    }

    /// Check if the database is reachable
    pub async fn ping(&self) -> Result<()> {
        self.execute("SELECT 1", Vec::new()).await?;
        Ok(())
    }

    /// Close the connection pool
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("database pool closed");
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
        }
    }

    /// Begin a transaction and return a client bound to it.
    pub(crate) async fn begin(&self) -> Result<Client> {
        if self.tx.is_some() {
            return Err(Error::internal("transaction already active"));
        }
        let tx = self.pool.begin().await?;
        Ok(Client {
            pool: self.pool.clone(),
            tx: Some(Arc::new(Mutex::new(Some(tx)))),
            slow_query_threshold: self.slow_query_threshold,
        })
    }

    pub(crate) async fn commit(&self) -> Result<()> {
        let cell = self
            .tx
            .as_ref()
            .ok_or_else(|| Error::internal("no active transaction"))?;
        let mut guard = cell.lock().await;
        let tx = guard.take().ok_or_else(closed_tx)?;
        tx.commit().await?;
        Ok(())
    }

    pub(crate) async fn rollback(&self) -> Result<()> {
        let cell = self
            .tx
            .as_ref()
            .ok_or_else(|| Error::internal("no active transaction"))?;
        let mut guard = cell.lock().await;
        let tx = guard.take().ok_or_else(closed_tx)?;
        tx.rollback().await?;
        Ok(())
    }

    async fn run_execute(&self, sql: &str, params: Vec<Value>) -> Result<PgQueryResult> {
        let query = bind_params(sqlx::query(sql), params);
        match &self.tx {
            Some(cell) => {
                let mut guard = cell.lock().await;
                let tx = guard.as_mut().ok_or_else(closed_tx)?;
                Ok(query.execute(&mut **tx).await?)
            }
            None => Ok(query.execute(&self.pool).await?),
        }
    }

    async fn run_fetch_optional(&self, sql: &str, params: Vec<Value>) -> Result<Option<PgRow>> {
        let started = Instant::now();
        let query = bind_params(sqlx::query(sql), params);
        let result = match &self.tx {
            Some(cell) => {
                let mut guard = cell.lock().await;
                let tx = guard.as_mut().ok_or_else(closed_tx)?;
                query.fetch_optional(&mut **tx).await.map_err(Error::from)
            }
            None => query.fetch_optional(&self.pool).await.map_err(Error::from),
        };
        self.log_statement(sql, started.elapsed(), result.as_ref().err());
        result
    }

    async fn run_fetch_all(&self, sql: &str, params: Vec<Value>) -> Result<Vec<PgRow>> {
        let started = Instant::now();
        let query = bind_params(sqlx::query(sql), params);
        let result = match &self.tx {
            Some(cell) => {
                let mut guard = cell.lock().await;
                let tx = guard.as_mut().ok_or_else(closed_tx)?;
                query.fetch_all(&mut **tx).await.map_err(Error::from)
            }
            None => query.fetch_all(&self.pool).await.map_err(Error::from),
        };
        self.log_statement(sql, started.elapsed(), result.as_ref().err());
        result
    }

    fn log_statement<E: std::fmt::Display>(
        &self,
        sql: &str,
        elapsed: Duration,
        error: Option<&E>,
    ) {
        let elapsed_ms = elapsed.as_millis() as u64;
        match self.slow_query_threshold {
            Some(threshold) => {
                if elapsed < threshold {
                    return;
                }
                match error {
                    Some(err) => tracing::warn!(elapsed_ms, error = %err, "slow query: {}", sql),
                    None => tracing::warn!(elapsed_ms, "slow query: {}", sql),
                }
            }
            None => match error {
                Some(err) => tracing::debug!(elapsed_ms, error = %err, "query: {}", sql),
                None => tracing::debug!(elapsed_ms, "query: {}", sql),
            },
        }
    }
}

fn closed_tx() -> Error {
    Error::internal("transaction already closed")
}

fn bind_params(
    query: Query<'_, Postgres, PgArguments>,
    params: Vec<Value>,
) -> Query<'_, Postgres, PgArguments> {
    params.into_iter().fold(query, bind_value)
}

fn bind_value(
    query: Query<'_, Postgres, PgArguments>,
    value: Value,
) -> Query<'_, Postgres, PgArguments> {
    match value {
        Value::Int(v) => query.bind(v),
        Value::Float(v) => query.bind(v),
        Value::Text(v) => query.bind(v),
        Value::Bool(v) => query.bind(v),
        Value::Timestamp(v) => query.bind(v),
        Value::Json(v) => query.bind(v),
        Value::Uuid(v) => query.bind(v),
        // Statement builders render nulls inline, so this is a fallback
        Value::Null => query.bind(None::<String>),
        Value::IntList(v) => query.bind(v),
        Value::TextList(v) => query.bind(v),
    }
}
