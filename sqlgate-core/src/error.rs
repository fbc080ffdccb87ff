//! Errors for incoming query requests.
//!
//! Uses `thiserror` so the server crate can wrap these in its own
//! error types without losing the original variant.

use thiserror::Error;

/// Message returned for any `method` other than `all` or `execute`.
pub const UNKNOWN_METHOD_MESSAGE: &str = "Unknown method value";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// `method` was missing or not one of the supported modes
    #[error("Unknown method value")]
    InvalidMethod { value: String },

    /// `sql` was empty once semicolons were removed
    #[error("sql cannot be empty")]
    EmptySql,
}

/// A JSON parameter with no bindable form. Raised while the body is
/// deserialized, so it surfaces as a malformed body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported parameter: {reason}")]
pub struct ParamError {
    pub reason: String,
}

impl ParamError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Result type alias for sqlgate-core operations
pub type Result<T> = std::result::Result<T, ValidationError>;

impl ValidationError {
    pub fn invalid_method(value: impl Into<String>) -> Self {
        Self::InvalidMethod {
            value: value.into(),
        }
    }
}
