//! HTTP handlers that run the catalogue query through each execution model.

use axum::{Json, extract::State};

use crate::{AppState, errors::Result, query::ResultSet};

#[utoipa::path(
    get,
    path = "/test/slow",
    tag = "test",
    summary = "Query on a blocked worker",
    description = "Runs the catalogue query with synchronous I/O. The serving worker is occupied for the whole request, \
                   including the post-query delay.",
    responses(
        (status = 200, description = "Products with their categories, in database order", body = Vec<String>),
        (status = 500, description = "Database not configured or query failed"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_slow(State(state): State<AppState>) -> Result<Json<ResultSet>> {
    // No .await: this runs to completion on the current worker
    let outcome = state.blocking.run_blocking()?;
    Ok(Json(outcome.results))
}

#[utoipa::path(
    get,
    path = "/test/fast",
    tag = "test",
    summary = "Query with suspended waits",
    description = "Runs the catalogue query with asynchronous I/O. The serving worker is released at every wait.",
    responses(
        (status = 200, description = "Products with their categories, in database order", body = Vec<String>),
        (status = 500, description = "Database not configured or query failed"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_fast(State(state): State<AppState>) -> Result<Json<ResultSet>> {
    let outcome = state.non_blocking.run_non_blocking().await?;
    Ok(Json(outcome.results))
}
