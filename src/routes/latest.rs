//! Latest reading per station, annotated with staleness.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ApiError;
use crate::models::LatestReading;
use crate::store;

use super::AppState;

// ---

#[derive(Debug, Deserialize)]
struct LatestQuery {
    station_id: Option<String>,
}

#[derive(Serialize)]
struct LatestResponse {
    items: Vec<LatestReading>,
}

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/api/latest", get(handler))
}

/// Handle `GET /api/latest`, optionally filtered to one station.
///
/// Staleness is judged on `inserted_at` (when the collector last managed
/// to store something), not `measured_at`, so an upstream feed stuck on an
/// old timestamp still reads as fresh while a dead collector does not.
async fn handler(
    Query(params): Query<LatestQuery>,
    State(state): State<AppState>,
) -> Result<Json<LatestResponse>, ApiError> {
    // ---
    let station_id = super::optional_station_id(params.station_id.as_deref())?;

    let rows = store::latest_per_station(&state.pool, station_id).await?;
    let now = Utc::now().naive_utc();
    let items: Vec<LatestReading> = rows
        .into_iter()
        .map(|row| row.into_latest(now, state.config.stale_after_seconds))
        .collect();

    debug!(stations = items.len(), "served latest readings");
    Ok(Json(LatestResponse { items }))
}
