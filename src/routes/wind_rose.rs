//! Wind-rose histogram over a trailing window.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::aggregate::{self, RoseSector};
use crate::error::ApiError;
use crate::models::fmt_source_ts;
use crate::store;

use super::AppState;

// ---

const DEFAULT_RANGE: &str = "24h";
const DEFAULT_BINS: usize = 16;

#[derive(Debug, Deserialize)]
struct WindRoseQuery {
    station_id: Option<String>,
    range: Option<String>,
    bins: Option<String>,
}

#[derive(Serialize)]
struct WindRoseResponse {
    station_id: i64,
    range: String,
    bins: usize,
    from: String,
    to: String,
    items: Vec<RoseSector>,
}

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/api/wind-rose", get(handler))
}

/// Handle `GET /api/wind-rose`.
async fn handler(
    Query(params): Query<WindRoseQuery>,
    State(state): State<AppState>,
) -> Result<Json<WindRoseResponse>, ApiError> {
    // ---
    let station_id = super::require_station_id(params.station_id.as_deref())?;
    let range = params
        .range
        .as_deref()
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .unwrap_or(DEFAULT_RANGE)
        .to_string();

    let bins = match params.bins.as_deref().map(str::trim) {
        None => DEFAULT_BINS,
        Some(token) if token.is_empty() => DEFAULT_BINS,
        Some(token) => token
            .parse::<usize>()
            .ok()
            .filter(|b| (4..=36).contains(b))
            .ok_or_else(|| ApiError::validation("bins must be between 4 and 36"))?,
    };

    let (from, to) = super::resolve_window(&state.pool, station_id, &range).await?;
    let rows =
        store::readings_between(&state.pool, station_id, from, to, store::MAX_RANGE_ROWS).await?;
    let items = aggregate::wind_rose(&rows, bins);

    Ok(Json(WindRoseResponse {
        station_id,
        range,
        bins,
        from: fmt_source_ts(from),
        to: fmt_source_ts(to),
        items,
    }))
}
