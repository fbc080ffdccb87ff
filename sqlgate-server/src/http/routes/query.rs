//! Ad-hoc SQL endpoint
//!
//! SECURITY: statements run exactly as given, minus semicolons. There is
//! no authentication and driver errors are returned verbatim.

use axum::extract::State;
use axum::{routing::post, Json, Router};

use crate::dispatch::QueryOutcome;
use crate::http::error::ApiError;
use crate::http::extractors::QueryBody;
use crate::state::AppState;

/// POST /query - run one statement and return its rows
async fn run_query(
    State(state): State<AppState>,
    QueryBody(request): QueryBody,
) -> Result<Json<QueryOutcome>, ApiError> {
    tracing::debug!(
        sql = %request.sql,
        params = ?request.params,
        method = %request.method,
        "request to /query"
    );

    let outcome = state.dispatcher().dispatch(&request).await?;
    Ok(Json(outcome))
}

/// Query routes
pub fn router() -> Router<AppState> {
    Router::new().route("/query", post(run_query))
}
