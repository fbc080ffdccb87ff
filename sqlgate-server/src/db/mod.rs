//! Database layer - connection pool and drivers
//!
//! # Design Principles
//!
//! - One lease per request, released by dropping it - no shared connections
//! - Parameters bound as typed values, never spliced into the SQL text
//! - Column values decoded by PostgreSQL type name into JSON
//! - No health check on release: a connection that just failed goes back as-is

mod bind;
mod decode;
pub mod mock;
pub mod pool;

pub use mock::{ExecutedQuery, MockPool, MockResponse};
pub use pool::{
    create_pool, create_pool_with_options, ConnectionPool, DriverError, NamedRows,
    DEFAULT_ACQUIRE_TIMEOUT, DEFAULT_MAX_CONNECTIONS,
    PgConnectionPool, PoolError, PoolOptions, PoolStats, PooledConnection, PositionalRows,
};
