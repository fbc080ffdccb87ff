//! HTTP server layer
//!
//! Axum server with:
//! - `GET /`, `GET /ping`, `GET /health` liveness routes
//! - `POST /query` for ad-hoc SQL
//! - JSON error responses

pub mod error;
pub mod extractors;
pub mod routes;
pub mod server;

pub use error::{ApiError, ErrorBody};
pub use server::{build_router, run_server, ServerConfig, ServerError, DEFAULT_REQUEST_TIMEOUT};
