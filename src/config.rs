//! Configuration loader for the viento backend service.
//!
//! This module centralizes all runtime configuration values and their
//! defaults, loading from environment variables (with optional `.env` file
//! support provided by the caller). Every knob has a working default, so a
//! bare `viento-backend` starts against the public wind API out of the box.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};

/// Parse an optional numeric environment variable with a default value.
macro_rules! parse_env_num {
    ($var_name:expr, $ty:ty, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.trim().parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Read an optional string environment variable, treating empty as unset.
macro_rules! env_or {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| $default.to_string())
    };
}

// ---

const DEFAULT_SOURCE_API_URL: &str = "https://viento.saboresgaleazzi.com/api_viento_ultimos.php";

/// One station the collector keeps fresh.
#[derive(Debug, Clone, PartialEq)]
pub struct StationConfig {
    pub station_id: i64,
    pub name: String,
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent
/// configuration snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// Interface the HTTP server binds to.
    pub host: String,

    /// Port the HTTP server listens on.
    pub port: u16,

    /// Upstream wind API endpoint polled by the collector.
    pub source_api_url: String,

    /// Stations to collect, in configured order, with display names.
    pub stations: Vec<StationConfig>,

    /// Seconds between collector cycle starts (minimum 1).
    pub collect_interval_seconds: u64,

    /// Rows requested per station during the startup backfill (minimum 10).
    pub backfill_limit: u32,

    /// Age in seconds past which a station's latest reading is flagged
    /// stale (minimum 5).
    pub stale_after_seconds: i64,

    /// SQLite database file; parent directories are created at startup.
    pub db_path: PathBuf,

    /// Allowed CORS origins; `*` anywhere in the list allows any origin.
    pub cors_origins: Vec<String>,
}

/// Load configuration from environment variables with defaults.
///
/// Optional:
/// - `HOST` – bind interface (default: 0.0.0.0)
/// - `PORT` – listen port (default: 8080)
/// - `SOURCE_API_URL` – upstream wind API endpoint
/// - `STATION_IDS` – comma-separated positive ids (default: "1,2")
/// - `STATION_NAMES` – `id:name` pairs (default: "1:Chipilo,2:San Bernardino")
/// - `COLLECT_INTERVAL_SECONDS` – collector cadence (default: 5, min 1)
/// - `BACKFILL_LIMIT` – startup history depth per station (default: 1000, min 10)
/// - `STALE_AFTER_SECONDS` – staleness threshold (default: 20, min 5)
/// - `DB_PATH` – SQLite file (default: ./data/wind.sqlite3)
/// - `CORS_ORIGINS` – comma-separated origins (default: "*")
///
/// Returns an error if a numeric variable fails to parse or `STATION_IDS`
/// ends up empty after filtering.
pub fn load_from_env() -> Result<Config> {
    // ---
    let host = env_or!("HOST", "0.0.0.0");
    let port = parse_env_num!("PORT", u16, 8080);
    let source_api_url = env_or!("SOURCE_API_URL", DEFAULT_SOURCE_API_URL);

    let station_ids = parse_station_ids(&env_or!("STATION_IDS", "1,2"))?;
    let station_names =
        parse_station_names(&env_or!("STATION_NAMES", "1:Chipilo,2:San Bernardino"));
    let stations = resolve_stations(station_ids, &station_names);

    let collect_interval_seconds = parse_env_num!("COLLECT_INTERVAL_SECONDS", u64, 5).max(1);
    let backfill_limit = parse_env_num!("BACKFILL_LIMIT", u32, 1000).max(10);
    let stale_after_seconds = parse_env_num!("STALE_AFTER_SECONDS", i64, 20).max(5);
    let db_path = PathBuf::from(env_or!("DB_PATH", "./data/wind.sqlite3"));
    let cors_origins = split_csv(&env_or!("CORS_ORIGINS", "*"));

    Ok(Config {
        host,
        port,
        source_api_url,
        stations,
        collect_interval_seconds,
        backfill_limit,
        stale_after_seconds,
        db_path,
        cors_origins,
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    pub fn log_config(&self) {
        // ---
        let stations = self
            .stations
            .iter()
            .map(|s| format!("{}:{}", s.station_id, s.name))
            .collect::<Vec<_>>()
            .join(", ");

        tracing::info!("Configuration loaded:");
        tracing::info!("  HOST                     : {}", self.host);
        tracing::info!("  PORT                     : {}", self.port);
        tracing::info!("  SOURCE_API_URL           : {}", self.source_api_url);
        tracing::info!("  STATIONS                 : {}", stations);
        tracing::info!("  COLLECT_INTERVAL_SECONDS : {}", self.collect_interval_seconds);
        tracing::info!("  BACKFILL_LIMIT           : {}", self.backfill_limit);
        tracing::info!("  STALE_AFTER_SECONDS      : {}", self.stale_after_seconds);
        tracing::info!("  DB_PATH                  : {}", self.db_path.display());
        tracing::info!("  CORS_ORIGINS             : {}", self.cors_origins.join(", "));
    }
}

// ---

/// Comma-separated positive integers; junk tokens are dropped, an empty
/// result is a startup error.
fn parse_station_ids(raw: &str) -> Result<Vec<i64>> {
    // ---
    let ids: Vec<i64> = raw
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .filter_map(|token| token.parse::<i64>().ok())
        .filter(|id| *id > 0)
        .collect();

    if ids.is_empty() {
        return Err(anyhow!(
            "STATION_IDS must contain at least one positive station id"
        ));
    }
    Ok(ids)
}

/// Comma-separated `id:name` pairs; malformed entries are skipped.
fn parse_station_names(raw: &str) -> HashMap<i64, String> {
    // ---
    let mut names = HashMap::new();
    for part in raw.split(',') {
        let token = part.trim();
        if token.is_empty() {
            continue;
        }
        let Some((id_text, name)) = token.split_once(':') else {
            continue;
        };
        let Ok(station_id) = id_text.trim().parse::<i64>() else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        names.insert(station_id, name.to_string());
    }
    names
}

fn resolve_stations(station_ids: Vec<i64>, names: &HashMap<i64, String>) -> Vec<StationConfig> {
    // ---
    station_ids
        .into_iter()
        .map(|id| StationConfig {
            station_id: id,
            name: names
                .get(&id)
                .cloned()
                .unwrap_or_else(|| format!("Estacion {id}")),
        })
        .collect()
}

fn split_csv(raw: &str) -> Vec<String> {
    // ---
    raw.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_station_ids_drop_junk_tokens() {
        // ---
        assert_eq!(parse_station_ids("1, 2 ,x,-3,0,4").unwrap(), vec![1, 2, 4]);
        assert!(parse_station_ids("").is_err());
        assert!(parse_station_ids(" , ,abc,-1").is_err());
    }

    #[test]
    fn test_station_names_fall_back_per_station() {
        // ---
        let names =
            parse_station_names("1:Chipilo, 2:San Bernardino, bad, :sin-id, 5: , 9:Nueve");
        let stations = resolve_stations(vec![1, 2, 7], &names);

        assert_eq!(
            stations,
            vec![
                StationConfig {
                    station_id: 1,
                    name: "Chipilo".into()
                },
                StationConfig {
                    station_id: 2,
                    name: "San Bernardino".into()
                },
                StationConfig {
                    station_id: 7,
                    name: "Estacion 7".into()
                },
            ]
        );
    }

    #[test]
    fn test_cors_origins_split() {
        // ---
        assert_eq!(split_csv("*"), vec!["*"]);
        assert_eq!(
            split_csv(" https://a.example , https://b.example ,,"),
            vec!["https://a.example", "https://b.example"]
        );
    }
}
