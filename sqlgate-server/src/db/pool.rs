//! Database connection pool management
//!
//! Uses sqlx PgPool with explicit connection limits behind the
//! [`ConnectionPool`] trait, so the dispatcher can run against
//! [`MockPool`](super::MockPool) in tests.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow, PgTypeInfo};
use sqlx::{Connection, Either, Executor, PgPool, Postgres, Statement};
use thiserror::Error;

use sqlgate_core::ParamValue;

use super::{bind, decode};

/// Default maximum connections for the pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Default time a request may wait for a free connection.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Raised when a cached statement's result columns changed under it.
const STALE_PLAN_CODE: &str = "0A000";
const STALE_PLAN_MESSAGE: &str = "cached plan must not change result type";

/// Rows as positional arrays, in column order.
pub type PositionalRows = Vec<Vec<Value>>;

/// Rows as column-name to value mappings, in column order.
pub type NamedRows = Vec<Map<String, Value>>;

/// Failure to obtain a connection. Never caused by the request itself.
#[derive(Debug, Clone, Error)]
pub enum PoolError {
    #[error("timed out waiting for a database connection")]
    Timeout,

    #[error("connection pool is closed")]
    Closed,

    #[error("database unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for PoolError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut => Self::Timeout,
            sqlx::Error::PoolClosed => Self::Closed,
            other => Self::Unavailable(other.to_string()),
        }
    }
}

/// Error reported by the database while running a statement.
///
/// Keeps the server's message and SQLSTATE code only, so nothing else
/// from the driver's error object reaches a response body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DriverError {
    pub message: String,
    pub code: Option<String>,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl From<sqlx::Error> for DriverError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) => Self {
                message: db.message().to_string(),
                code: db.code().map(|c| c.into_owned()),
            },
            _ => Self::new(e.to_string()),
        }
    }
}

/// Point-in-time view of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Open connections, idle or leased
    pub size: u32,
    /// Open connections not currently leased
    pub idle: u32,
    /// Configured upper bound
    pub max: u32,
}

/// A bounded set of connections lent out one request at a time.
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    /// Wait for a free connection. Dropping the returned lease releases it.
    async fn acquire(&self) -> Result<Box<dyn PooledConnection>, PoolError>;

    fn stats(&self) -> PoolStats;

    /// Stop lending and close every connection.
    async fn close(&self);
}

/// A connection leased from a [`ConnectionPool`].
#[async_trait]
pub trait PooledConnection: Send {
    /// Run `sql` and return each row as an array of column values.
    async fn fetch_positional(
        &mut self,
        sql: &str,
        params: &[ParamValue],
    ) -> Result<PositionalRows, DriverError>;

    /// Run `sql` and return each row as a column-name keyed object.
    async fn fetch_named(
        &mut self,
        sql: &str,
        params: &[ParamValue],
    ) -> Result<NamedRows, DriverError>;
}

/// Pool settings.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }
}

/// PostgreSQL pool backed by sqlx.
#[derive(Clone)]
pub struct PgConnectionPool {
    pool: PgPool,
}

impl PgConnectionPool {
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn inner(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ConnectionPool for PgConnectionPool {
    async fn acquire(&self) -> Result<Box<dyn PooledConnection>, PoolError> {
        let conn = self.pool.acquire().await?;
        Ok(Box::new(PgLease { conn }))
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: u32::try_from(self.pool.num_idle()).unwrap_or(u32::MAX),
            max: self.pool.options().get_max_connections(),
        }
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// A leased sqlx connection; returns to the pool when dropped.
struct PgLease {
    conn: PoolConnection<Postgres>,
}

impl PgLease {
    /// Run `sql` with `params` converted to the parameter types the server
    /// infers, retrying once if the cached statement went stale after DDL.
    async fn fetch_rows(
        &mut self,
        sql: &str,
        params: &[ParamValue],
    ) -> Result<Vec<PgRow>, DriverError> {
        match self.run_prepared(sql, params).await {
            Err(err)
                if err.code.as_deref() == Some(STALE_PLAN_CODE)
                    && err.message == STALE_PLAN_MESSAGE =>
            {
                self.conn.clear_cached_statements().await?;
                self.run_prepared(sql, params).await
            }
            result => result,
        }
    }

    async fn run_prepared(
        &mut self,
        sql: &str,
        params: &[ParamValue],
    ) -> Result<Vec<PgRow>, DriverError> {
        // No declared types: PostgreSQL infers each parameter from context
        let statement = (&mut *self.conn).prepare_with(sql, &[]).await?;
        let types: &[PgTypeInfo] = match statement.parameters() {
            Some(Either::Left(types)) => types,
            _ => &[],
        };
        let values = bind::coerce_params(params, types)?;

        let query = values
            .into_iter()
            .fold(statement.query(), |query, value| query.bind(value));
        Ok(query.fetch_all(&mut *self.conn).await?)
    }
}

#[async_trait]
impl PooledConnection for PgLease {
    async fn fetch_positional(
        &mut self,
        sql: &str,
        params: &[ParamValue],
    ) -> Result<PositionalRows, DriverError> {
        let rows = self.fetch_rows(sql, params).await?;
        rows.iter().map(decode::row_to_array).collect()
    }

    async fn fetch_named(
        &mut self,
        sql: &str,
        params: &[ParamValue],
    ) -> Result<NamedRows, DriverError> {
        let rows = self.fetch_rows(sql, params).await?;
        rows.iter().map(decode::row_to_object).collect()
    }
}

/// Create a PostgreSQL connection pool with the default options.
///
/// The pool connects lazily: the first request opens the first
/// connection, so the server starts even while the database is down.
///
/// # Errors
///
/// Returns an error if the connection string cannot be parsed.
///
/// # Example
///
/// ```ignore
/// let pool = create_pool("postgres://localhost/app")?;
/// ```
pub fn create_pool(database_url: &str) -> Result<PgConnectionPool, sqlx::Error> {
    create_pool_with_options(database_url, &PoolOptions::default())
}

/// Create a PostgreSQL connection pool with custom options.
pub fn create_pool_with_options(
    database_url: &str,
    options: &PoolOptions,
) -> Result<PgConnectionPool, sqlx::Error> {
    let connect = PgConnectOptions::from_str(database_url)?;
    let pool = PgPoolOptions::new()
        .max_connections(options.max_connections)
        .acquire_timeout(options.acquire_timeout)
        .test_before_acquire(false)
        .connect_lazy_with(connect);

    Ok(PgConnectionPool::from_pool(pool))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // Integration tests require a real database
    // Run with: DATABASE_URL=postgres://... cargo test -p sqlgate-server -- --ignored

    fn database_url() -> String {
        std::env::var("DATABASE_URL").expect("DATABASE_URL required")
    }

    #[test]
    fn rejects_malformed_url() {
        assert!(create_pool("not a url").is_err());
    }

    #[test]
    fn driver_error_keeps_message_and_code() {
        let err = DriverError::new("relation \"t\" does not exist").with_code("42P01");
        assert_eq!(err.to_string(), "relation \"t\" does not exist");
        assert_eq!(err.code.as_deref(), Some("42P01"));
    }

    #[test]
    fn pool_timeout_maps_to_timeout() {
        assert!(matches!(
            PoolError::from(sqlx::Error::PoolTimedOut),
            PoolError::Timeout
        ));
        assert!(matches!(
            PoolError::from(sqlx::Error::PoolClosed),
            PoolError::Closed
        ));
    }

    #[tokio::test]
    async fn lazy_pool_reports_configured_max() {
        let options = PoolOptions {
            max_connections: 3,
            ..PoolOptions::default()
        };
        let pool = create_pool_with_options("postgres://localhost/unused", &options).unwrap();
        let stats = pool.stats();
        assert_eq!(stats.max, 3);
        assert_eq!(stats.size, 0);
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn select_one_both_modes() {
        let pool = create_pool(&database_url()).expect("pool creation failed");
        let mut conn = pool.acquire().await.expect("acquire failed");

        let rows = conn.fetch_positional("SELECT 1 AS x", &[]).await.unwrap();
        assert_eq!(rows, vec![vec![json!(1)]]);

        let rows = conn.fetch_named("SELECT 1 AS x", &[]).await.unwrap();
        assert_eq!(serde_json::to_value(rows).unwrap(), json!([{ "x": 1 }]));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn binds_params_positionally() {
        let pool = create_pool(&database_url()).expect("pool creation failed");
        let mut conn = pool.acquire().await.expect("acquire failed");

        let params = vec![
            ParamValue::Text("b".into()),
            ParamValue::Int(7),
            ParamValue::Null,
        ];
        let rows = conn
            .fetch_positional("SELECT $1::text, $2::int8, $3::int4 IS NULL", &params)
            .await
            .unwrap();
        assert_eq!(rows, vec![vec![json!("b"), json!(7), json!(true)]]);
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn text_params_take_the_inferred_type() {
        let pool = create_pool(&database_url()).expect("pool creation failed");
        let mut conn = pool.acquire().await.expect("acquire failed");

        let rows = conn
            .fetch_positional("SELECT 1 AS x WHERE 5 = $1", &[ParamValue::Text("5".into())])
            .await
            .unwrap();
        assert_eq!(rows, vec![vec![json!(1)]]);

        let rows = conn
            .fetch_positional(
                "SELECT DATE '2024-01-01' > $1",
                &[ParamValue::Text("2023-01-01".into())],
            )
            .await
            .unwrap();
        assert_eq!(rows, vec![vec![json!(true)]]);

        conn.fetch_positional(
            "CREATE TEMP TABLE typed_params (id uuid, at timestamptz, amount numeric)",
            &[],
        )
        .await
        .unwrap();
        let id = "67e55044-10b1-426f-9247-bb680e5fe0c8";
        conn.fetch_positional(
            "INSERT INTO typed_params VALUES ($1, $2, $3)",
            &[
                ParamValue::Text(id.into()),
                ParamValue::Text("2024-03-01T10:00:00Z".into()),
                ParamValue::Text("12.50".into()),
            ],
        )
        .await
        .unwrap();

        let rows = conn
            .fetch_named("SELECT * FROM typed_params WHERE id = $1", &[ParamValue::Text(id.into())])
            .await
            .unwrap();
        assert_eq!(
            serde_json::to_value(rows).unwrap(),
            json!([{ "id": id, "at": "2024-03-01T10:00:00.000Z", "amount": "12.50" }])
        );
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn malformed_text_param_is_a_driver_error() {
        let pool = create_pool(&database_url()).expect("pool creation failed");
        let mut conn = pool.acquire().await.expect("acquire failed");

        let err = conn
            .fetch_positional("SELECT 1 WHERE 5 = $1", &[ParamValue::Text("five".into())])
            .await
            .unwrap_err();
        assert_eq!(err.code.as_deref(), Some("22P02"));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn statement_survives_schema_change() {
        let pool = create_pool(&database_url()).expect("pool creation failed");
        let mut conn = pool.acquire().await.expect("acquire failed");

        conn.fetch_positional("CREATE TEMP TABLE reshaped (a int4)", &[])
            .await
            .unwrap();
        conn.fetch_positional("INSERT INTO reshaped VALUES (1)", &[])
            .await
            .unwrap();
        let rows = conn.fetch_positional("SELECT * FROM reshaped", &[]).await.unwrap();
        assert_eq!(rows, vec![vec![json!(1)]]);

        conn.fetch_positional("ALTER TABLE reshaped ADD COLUMN b text DEFAULT 'x'", &[])
            .await
            .unwrap();
        let rows = conn.fetch_positional("SELECT * FROM reshaped", &[]).await.unwrap();
        assert_eq!(rows, vec![vec![json!(1), json!("x")]]);
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn decodes_less_common_column_types() {
        let pool = create_pool(&database_url()).expect("pool creation failed");
        let mut conn = pool.acquire().await.expect("acquire failed");

        let rows = conn
            .fetch_named(
                "SELECT interval '1 day 02:00' AS span, '10.0.0.1'::inet AS host, \
                 '10.0.0.0/24'::cidr AS net, ARRAY[1.5::numeric, NULL] AS amounts, \
                 '12:00+02'::timetz AS noon, 'ab'::char(3) AS padded, \
                 (SELECT relkind FROM pg_class WHERE relname = 'pg_class') AS kind",
                &[],
            )
            .await
            .unwrap();
        assert_eq!(
            serde_json::to_value(rows).unwrap(),
            json!([{
                "span": "1 day 02:00:00",
                "host": "10.0.0.1",
                "net": "10.0.0.0/24",
                "amounts": ["1.5", null],
                "noon": "12:00:00+02:00",
                "padded": "ab ",
                "kind": "r",
            }])
        );
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn decodes_enum_columns_as_labels() {
        let pool = create_pool(&database_url()).expect("pool creation failed");
        let mut conn = pool.acquire().await.expect("acquire failed");

        conn.fetch_positional("CREATE TYPE pg_temp.mood AS ENUM ('calm', 'busy')", &[])
            .await
            .unwrap();
        let rows = conn
            .fetch_positional("SELECT $1::pg_temp.mood", &[ParamValue::Text("busy".into())])
            .await
            .unwrap();
        assert_eq!(rows, vec![vec![json!("busy")]]);
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn driver_error_carries_sqlstate() {
        let pool = create_pool(&database_url()).expect("pool creation failed");
        let mut conn = pool.acquire().await.expect("acquire failed");

        let err = conn
            .fetch_positional("SELECT * FROM no_such_table_here", &[])
            .await
            .unwrap_err();
        assert_eq!(err.code.as_deref(), Some("42P01"));

        // The same lease keeps working after a failed statement
        let rows = conn.fetch_positional("SELECT 2", &[]).await.unwrap();
        assert_eq!(rows, vec![vec![json!(2)]]);
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn concurrent_pool_access() {
        let options = PoolOptions {
            max_connections: 10,
            ..PoolOptions::default()
        };
        let pool = create_pool_with_options(&database_url(), &options).expect("pool creation failed");

        // 50 tasks share 10 connections
        let handles: Vec<_> = (0..50i64)
            .map(|i| {
                let pool = pool.clone();
                tokio::spawn(async move {
                    let mut conn = pool.acquire().await.expect("acquire failed");
                    conn.fetch_positional("SELECT $1::int8", &[ParamValue::Int(i)])
                        .await
                        .expect("concurrent query failed")
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let rows = handle.await.expect("task panicked");
            assert_eq!(rows, vec![vec![json!(i as i64)]]);
        }
        assert!(pool.stats().size <= 10);
    }
}
