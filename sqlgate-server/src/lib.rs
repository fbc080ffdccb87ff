//! sqlgate-server: HTTP gateway for ad-hoc SQL
//!
//! Accepts a statement, positional parameters and a row mode, runs it
//! on a pooled PostgreSQL connection and returns the rows as JSON.

pub mod db;
pub mod dispatch;
pub mod http;
pub mod state;

pub use db::{create_pool, create_pool_with_options, ConnectionPool, PoolOptions};
pub use dispatch::{DispatchError, Dispatcher, QueryOutcome};
pub use http::{build_router, run_server, ServerConfig, ServerError};
pub use state::AppState;
