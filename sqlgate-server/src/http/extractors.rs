//! Custom Axum extractors

use axum::extract::{FromRequest, Request};
use axum::Json;

use sqlgate_core::QueryRequest;

use super::error::ApiError;

/// JSON query request; parse failures become [`ApiError::InvalidBody`]
/// instead of axum's plain-text rejection.
pub struct QueryBody(pub QueryRequest);

impl<S> FromRequest<S> for QueryBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(request) = Json::<QueryRequest>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::InvalidBody {
                message: rejection.body_text(),
            })?;

        Ok(Self(request))
    }
}
