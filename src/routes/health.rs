//! Service identity and health endpoints for the viento backend.
//!
//! `GET /` names the service and the configured stations so a dashboard can
//! confirm it is talking to the right deployment; `GET /health` adds the
//! stored row count and the collector's run counters, which is enough to
//! tell "API up" apart from "collector wedged". Both endpoints follow the
//! route-module convention: handlers stay private, the gateway merges the
//! exported subrouter.

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::collector;
use crate::error::ApiError;
use crate::store;

use super::AppState;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health))
}

/// Handle `GET /` — static identity, no storage access.
async fn service_info(State(state): State<AppState>) -> Json<Value> {
    // ---
    let stations: Vec<i64> = state
        .config
        .stations
        .iter()
        .map(|s| s.station_id)
        .collect();

    Json(json!({
        "service": "viento-dashboard-api",
        "status": "ok",
        "stations": stations,
    }))
}

/// Handle `GET /health` — row count plus a collector state snapshot.
async fn health(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    // ---
    let rows = store::count_readings(&state.pool).await?;
    let collector = collector::snapshot(&state.collector).await;

    Ok(Json(json!({
        "status": "ok",
        "rows": rows,
        "collector": collector,
    })))
}
