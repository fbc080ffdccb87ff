//! API error types with IntoResponse
//!
//! Errors are converted to JSON responses with a stable body:
//! `{"error": <message>, "kind": <tag>, "code": <SQLSTATE, optional>}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use sqlgate_core::{ValidationError, UNKNOWN_METHOD_MESSAGE};

use crate::db::{DriverError, PoolError};
use crate::dispatch::DispatchError;

/// Serialized error body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// API error type with HTTP status mapping
#[derive(Debug)]
pub enum ApiError {
    /// Unknown `method` (500, kept for compatibility with existing clients)
    InvalidMethod,

    /// Nothing left to run after sanitization (500)
    EmptySql,

    /// Body could not be parsed into a query request (400)
    InvalidBody { message: String },

    /// No connection available or database unreachable (503)
    PoolUnavailable(PoolError),

    /// Statement failed in the database (500, message exposed as-is)
    Driver(DriverError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidMethod | Self::EmptySql | Self::Driver(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::InvalidBody { .. } => StatusCode::BAD_REQUEST,
            Self::PoolUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn body(self) -> ErrorBody {
        match self {
            Self::InvalidMethod => ErrorBody {
                error: UNKNOWN_METHOD_MESSAGE.to_string(),
                kind: "invalid_method",
                code: None,
            },
            Self::EmptySql => ErrorBody {
                error: ValidationError::EmptySql.to_string(),
                kind: "empty_sql",
                code: None,
            },
            Self::InvalidBody { message } => ErrorBody {
                error: message,
                kind: "invalid_body",
                code: None,
            },
            Self::PoolUnavailable(e) => {
                tracing::error!("Pool error: {}", e);
                ErrorBody {
                    error: e.to_string(),
                    kind: "pool_unavailable",
                    code: None,
                }
            }
            Self::Driver(e) => ErrorBody {
                error: e.message,
                kind: "driver_error",
                code: e.code,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(self.body())).into_response()
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::Validation(ValidationError::InvalidMethod { .. }) => Self::InvalidMethod,
            DispatchError::Validation(ValidationError::EmptySql) => Self::EmptySql,
            DispatchError::Pool(e) => Self::PoolUnavailable(e),
            DispatchError::Driver(e) => Self::Driver(e),
        }
    }
}
