//! HTTP route gateway for the viento backend.
//!
//! Each endpoint lives in its own sibling module and exports a subrouter;
//! this gateway merges them, attaches the CORS layer and owns the shared
//! application state, so `main.rs` never needs to know about individual
//! endpoints.

use axum::http::{HeaderValue, Method};
use axum::Router;
use chrono::NaiveDateTime;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};

use crate::aggregate;
use crate::collector::SharedCollectorState;
use crate::config::Config;
use crate::error::ApiError;
use crate::models::{ms_to_ts, ts_to_ms};
use crate::store;

mod health;
mod history;
mod latest;
mod stations;
mod stats;
mod wind_rose;

// ---

/// State shared by every route handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    pub collector: SharedCollectorState,
}

pub fn router(state: AppState) -> Router {
    // ---
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .merge(health::router())
        .merge(stations::router())
        .merge(latest::router())
        .merge(history::router())
        .merge(stats::router())
        .merge(wind_rose::router())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    // ---
    if origins.iter().any(|origin| origin == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    // Explicitly listed origins only get the read-only surface
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET])
        .allow_headers(Any)
}

// ---

/// Resolve a `range` token into the `[from, to]` window for a station,
/// anchored at the station's most recent `measured_at` rather than the
/// wall clock.
///
/// A station with no stored readings has no anchor; that is reported as
/// not-found, distinct from a valid-but-empty window. The window start
/// saturates rather than wrapping when the duration outruns the timestamp
/// range.
async fn resolve_window(
    pool: &SqlitePool,
    station_id: i64,
    range: &str,
) -> Result<(NaiveDateTime, NaiveDateTime), ApiError> {
    // ---
    let Some(latest) = store::latest_measured_at(pool, station_id).await? else {
        return Err(ApiError::not_found(format!(
            "no readings stored for station {station_id}"
        )));
    };
    let duration_ms = aggregate::parse_duration_ms(range)?;
    Ok((ms_to_ts(ts_to_ms(latest).saturating_sub(duration_ms)), latest))
}

/// Parse a mandatory `station_id` query parameter.
fn require_station_id(raw: Option<&str>) -> Result<i64, ApiError> {
    // ---
    let station_id: i64 = raw
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .and_then(|token| token.parse().ok())
        .ok_or_else(|| ApiError::validation("station_id is required and must be an integer"))?;

    if station_id <= 0 {
        return Err(ApiError::validation(
            "station_id is required and must be an integer",
        ));
    }
    Ok(station_id)
}

/// Parse an optional `station_id` query parameter; absent or empty means
/// "all stations".
fn optional_station_id(raw: Option<&str>) -> Result<Option<i64>, ApiError> {
    // ---
    match raw.map(str::trim) {
        None => Ok(None),
        Some(token) if token.is_empty() => Ok(None),
        Some(token) => token
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ApiError::validation("station_id must be an integer")),
    }
}
