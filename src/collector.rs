//! Background collector: polls the upstream wind API on a fixed cadence and
//! appends normalized readings to the store.
//!
//! The loop is deliberately single-flight. Each cycle runs to completion
//! (fetch, normalize, insert, bookkeeping) before the next one is
//! scheduled, and the wait is shortened by however long the cycle took, so
//! a slow upstream cannot stack concurrent cycles. Upstream failures are
//! recorded in [`CollectorRunState`] and never abort the loop.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::SqlitePool;
use tokio::sync::{watch, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{Config, StationConfig};
use crate::models::NewReading;
use crate::store;

// ---

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(20);

/// Run counters exposed by the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CollectorRunState {
    pub started_at: DateTime<Utc>,
    pub last_started_at: Option<DateTime<Utc>>,
    pub last_finished_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub total_runs: u64,
    pub total_inserted_rows: u64,
    pub total_errors: u64,
    pub last_error: Option<String>,
}

impl CollectorRunState {
    // ---
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            last_started_at: None,
            last_finished_at: None,
            last_success_at: None,
            total_runs: 0,
            total_inserted_rows: 0,
            total_errors: 0,
            last_error: None,
        }
    }
}

/// Handle shared between the collector task and the HTTP layer.
pub type SharedCollectorState = Arc<RwLock<CollectorRunState>>;

pub fn new_shared_state() -> SharedCollectorState {
    // ---
    Arc::new(RwLock::new(CollectorRunState::new()))
}

/// Point-in-time copy of the run counters.
pub async fn snapshot(state: &SharedCollectorState) -> CollectorRunState {
    // ---
    state.read().await.clone()
}

// ---

/// Owns the upstream HTTP client and drives the collection loop.
pub struct Collector {
    pool: SqlitePool,
    client: reqwest::Client,
    source_api_url: String,
    stations: Vec<StationConfig>,
    backfill_limit: u32,
    interval: Duration,
    state: SharedCollectorState,
    known_stations: HashSet<i64>,
}

impl Collector {
    // ---
    pub fn new(pool: SqlitePool, config: &Config, state: SharedCollectorState) -> Result<Self> {
        // ---
        let client = reqwest::Client::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .build()
            .context("failed to build upstream HTTP client")?;

        Ok(Self {
            pool,
            client,
            source_api_url: config.source_api_url.clone(),
            stations: config.stations.clone(),
            backfill_limit: config.backfill_limit,
            interval: Duration::from_secs(config.collect_interval_seconds),
            state,
            // Configured stations are registered by startup before we run
            known_stations: config.stations.iter().map(|s| s.station_id).collect(),
        })
    }

    /// Fetch one upstream envelope, enforcing the `ok: true` contract.
    async fn fetch_source_json(&self, params: &[(&str, String)]) -> Result<Value> {
        // ---
        let response = self
            .client
            .get(&self.source_api_url)
            .query(params)
            .send()
            .await
            .context("source API request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("source API HTTP {}", status.as_u16());
        }

        let payload: Value = response
            .json()
            .await
            .context("source API returned invalid JSON")?;
        if payload.get("ok").and_then(Value::as_bool) != Some(true) {
            let detail = payload
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("source API returned ok=false");
            anyhow::bail!("{detail}");
        }

        Ok(payload)
    }

    /// One-shot history fetch per configured station, run once at startup.
    /// Overlap with already-stored rows is fine; the insert dedups.
    pub async fn backfill(&mut self) -> Result<u64> {
        // ---
        let mut inserted_total = 0u64;
        for station in self.stations.clone() {
            let payload = self
                .fetch_source_json(&[
                    ("limit", self.backfill_limit.to_string()),
                    ("estacion", station.station_id.to_string()),
                ])
                .await?;

            let items = payload.get("items").and_then(Value::as_array);
            let readings: Vec<NewReading> = items
                .map(|rows| rows.iter().filter_map(NewReading::from_source_row).collect())
                .unwrap_or_default();

            self.register_stations(&readings).await?;
            let inserted = store::insert_readings(&self.pool, &readings).await?;
            debug!(
                station_id = station.station_id,
                fetched = items.map_or(0, Vec::len),
                inserted,
                "backfill page stored"
            );
            inserted_total += inserted;
        }
        Ok(inserted_total)
    }

    /// One steady-state cycle: pull the per-station latest rows and store
    /// whichever ones belong to a configured station.
    pub async fn collect_once(&mut self) -> Result<u64> {
        // ---
        let payload = self.fetch_source_json(&[]).await?;
        let latest_by_station = payload.get("latest_by_station").and_then(Value::as_object);

        let mut readings = Vec::new();
        if let Some(map) = latest_by_station {
            for station in &self.stations {
                if let Some(reading) = map
                    .get(&station.station_id.to_string())
                    .and_then(NewReading::from_source_row)
                {
                    readings.push(reading);
                }
            }
        }

        self.register_stations(&readings).await?;
        Ok(store::insert_readings(&self.pool, &readings).await?)
    }

    /// Upstream rows occasionally reference a station we were never
    /// configured with; register it before the insert so the foreign key
    /// holds.
    async fn register_stations(&mut self, readings: &[NewReading]) -> Result<(), sqlx::Error> {
        // ---
        for reading in readings {
            if !self.known_stations.contains(&reading.station_id) {
                let name = self.station_name(reading.station_id);
                store::upsert_station(&self.pool, reading.station_id, &name).await?;
                self.known_stations.insert(reading.station_id);
            }
        }
        Ok(())
    }

    fn station_name(&self, station_id: i64) -> String {
        // ---
        self.stations
            .iter()
            .find(|s| s.station_id == station_id)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| format!("Estacion {station_id}"))
    }

    /// Run one cycle and fold the outcome into the shared counters.
    async fn run_cycle(&mut self) {
        // ---
        {
            let mut state = self.state.write().await;
            state.total_runs += 1;
            state.last_started_at = Some(Utc::now());
        }

        match self.collect_once().await {
            Ok(inserted) => {
                if inserted > 0 {
                    debug!(inserted, "collector cycle stored new readings");
                }
                let mut state = self.state.write().await;
                state.total_inserted_rows += inserted;
                state.last_success_at = Some(Utc::now());
                state.last_error = None;
            }
            Err(error) => {
                warn!(error = %error, "collector cycle failed");
                let mut state = self.state.write().await;
                state.total_errors += 1;
                state.last_error = Some(error.to_string());
            }
        }

        self.state.write().await.last_finished_at = Some(Utc::now());
    }

    /// Backfill once, then poll until `shutdown` flips to true.
    ///
    /// The sleep between cycles is `interval - elapsed`, floored at zero,
    /// so cycle start times track the configured cadence instead of
    /// drifting by however long each fetch takes.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        // ---
        match self.backfill().await {
            Ok(inserted) => {
                info!(inserted, "startup backfill complete");
                let mut state = self.state.write().await;
                state.total_inserted_rows += inserted;
                state.last_success_at = Some(Utc::now());
            }
            Err(error) => {
                // Degraded start: recent data still arrives via the loop
                warn!(error = %error, "startup backfill failed");
                let mut state = self.state.write().await;
                state.total_errors += 1;
                state.last_error = Some(error.to_string());
            }
        }

        info!(
            interval_seconds = self.interval.as_secs(),
            stations = self.stations.len(),
            "collector loop started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let cycle_started = Instant::now();
            self.run_cycle().await;
            let wait = self.interval.saturating_sub(cycle_started.elapsed());

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!("collector loop stopped");
    }
}
