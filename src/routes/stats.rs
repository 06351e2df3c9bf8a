//! Rolling-window statistics anchored at the station's latest reading.

use std::collections::BTreeMap;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::aggregate::{self, SpeedStats};
use crate::error::ApiError;
use crate::models::{fmt_source_ts, ms_to_ts, ts_format, ts_to_ms};
use crate::store;

use super::AppState;

// ---

const DEFAULT_WINDOWS: &str = "1m,5m,15m,24h";

#[derive(Debug, Deserialize)]
struct StatsQuery {
    station_id: Option<String>,
    windows: Option<String>,
}

/// Stats for one window token, tagged with its resolved bounds.
#[derive(Serialize)]
struct WindowStats {
    #[serde(flatten)]
    stats: SpeedStats,
    from: String,
    to: String,
}

#[derive(Serialize)]
struct StatsResponse {
    station_id: i64,
    #[serde(with = "ts_format")]
    latest_ts: NaiveDateTime,
    stats: BTreeMap<String, WindowStats>,
}

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/api/stats", get(handler))
}

/// Handle `GET /api/stats` for a comma-separated list of window tokens.
///
/// Every window shares the same anchor: the station's latest `measured_at`.
async fn handler(
    Query(params): Query<StatsQuery>,
    State(state): State<AppState>,
) -> Result<Json<StatsResponse>, ApiError> {
    // ---
    let station_id = super::require_station_id(params.station_id.as_deref())?;
    let windows: Vec<String> = params
        .windows
        .as_deref()
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .unwrap_or(DEFAULT_WINDOWS)
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect();

    let Some(latest) = store::latest_measured_at(&state.pool, station_id).await? else {
        return Err(ApiError::not_found(format!(
            "no readings stored for station {station_id}"
        )));
    };
    let latest_ms = ts_to_ms(latest);

    let mut stats = BTreeMap::new();
    for token in windows {
        let duration_ms = aggregate::parse_duration_ms(&token)?;
        let from = ms_to_ts(latest_ms.saturating_sub(duration_ms));
        let rows =
            store::readings_between(&state.pool, station_id, from, latest, store::MAX_RANGE_ROWS)
                .await?;

        stats.insert(
            token,
            WindowStats {
                stats: aggregate::compute_stats(&rows),
                from: fmt_source_ts(from),
                to: fmt_source_ts(latest),
            },
        );
    }

    Ok(Json(StatsResponse {
        station_id,
        latest_ts: latest,
        stats,
    }))
}
