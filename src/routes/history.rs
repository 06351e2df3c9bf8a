//! Reading history over a trailing window, raw or bucketed.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregate::{self, BucketSummary};
use crate::error::ApiError;
use crate::models::{fmt_source_ts, Reading};
use crate::store;

use super::AppState;

// ---

const DEFAULT_RANGE: &str = "6h";
const DEFAULT_LIMIT: i64 = 50_000;
/// Widest accepted bucket; wider values have no millisecond representation.
const MAX_BUCKET_MINUTES: i64 = i64::MAX / 60_000;

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    station_id: Option<String>,
    range: Option<String>,
    bucket_minutes: Option<String>,
    limit: Option<String>,
}

/// Either the raw window rows or one summary per non-empty bucket.
#[derive(Serialize)]
#[serde(untagged)]
enum HistoryItems {
    Raw(Vec<Reading>),
    Bucketed(Vec<BucketSummary>),
}

#[derive(Serialize)]
struct HistoryResponse {
    station_id: i64,
    range: String,
    bucket_minutes: Option<i64>,
    from: String,
    to: String,
    items: HistoryItems,
}

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/api/history", get(handler))
}

/// Handle `GET /api/history`.
///
/// The window ends at the station's latest `measured_at`; `bucket_minutes`
/// switches the items from raw rows to downsampled bucket summaries.
async fn handler(
    Query(params): Query<HistoryQuery>,
    State(state): State<AppState>,
) -> Result<Json<HistoryResponse>, ApiError> {
    // ---
    let station_id = super::require_station_id(params.station_id.as_deref())?;
    let range = params
        .range
        .as_deref()
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .unwrap_or(DEFAULT_RANGE)
        .to_string();

    let bucket_minutes = match params.bucket_minutes.as_deref().map(str::trim) {
        None => None,
        Some(token) if token.is_empty() => None,
        Some(token) => {
            let minutes = token
                .parse::<i64>()
                .ok()
                .filter(|m| (1..=MAX_BUCKET_MINUTES).contains(m))
                .ok_or_else(|| {
                    ApiError::validation("bucket_minutes must be a positive integer")
                })?;
            Some(minutes)
        }
    };

    let limit = match params.limit.as_deref().map(str::trim) {
        None => DEFAULT_LIMIT,
        Some(token) if token.is_empty() => DEFAULT_LIMIT,
        Some(token) => token
            .parse::<i64>()
            .ok()
            .filter(|l| (1..=store::MAX_RANGE_ROWS).contains(l))
            .ok_or_else(|| ApiError::validation("limit must be between 1 and 200000"))?,
    };

    let (from, to) = super::resolve_window(&state.pool, station_id, &range).await?;
    let rows = store::readings_between(&state.pool, station_id, from, to, limit).await?;
    debug!(station_id, rows = rows.len(), ?bucket_minutes, "history window fetched");

    let items = match bucket_minutes {
        Some(minutes) => HistoryItems::Bucketed(aggregate::bucket_readings(&rows, minutes)),
        None => HistoryItems::Raw(rows),
    };

    Ok(Json(HistoryResponse {
        station_id,
        range,
        bucket_minutes,
        from: fmt_source_ts(from),
        to: fmt_source_ts(to),
        items,
    }))
}
