//! Station registry endpoint.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::error::ApiError;
use crate::models::Station;
use crate::store;

use super::AppState;

// ---

#[derive(Serialize)]
struct StationsResponse {
    stations: Vec<Station>,
}

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/api/stations", get(handler))
}

/// Handle `GET /api/stations` — every station the store knows about,
/// ordered by id.
async fn handler(State(state): State<AppState>) -> Result<Json<StationsResponse>, ApiError> {
    // ---
    let stations = store::list_stations(&state.pool).await?;
    Ok(Json(StationsResponse { stations }))
}
