//! Database schema management for `viento-backend`.
//!
//! Ensures required tables and indexes exist before the collector or any
//! query handler touches the store. Applied once on startup from `main.rs`.

use anyhow::Result;
use sqlx::SqlitePool;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates the `stations` and `readings` tables plus the two range-scan
/// indexes. `readings.source_id` is the primary key: the upstream source
/// issues it monotonically and it is the dedup identity for inserts.
/// Safe to call on every startup; no-op if the objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stations (
            station_id INTEGER PRIMARY KEY,
            name       TEXT NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Append-only observation log; rows are never updated or deleted
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS readings (
            source_id     INTEGER PRIMARY KEY,
            station_id    INTEGER NOT NULL,
            speed_kmh     REAL,
            direction_deg REAL,
            measured_at   TEXT NOT NULL,
            inserted_at   TEXT NOT NULL DEFAULT (CURRENT_TIMESTAMP),
            FOREIGN KEY(station_id) REFERENCES stations(station_id)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Per-station and global time-range scans
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_readings_station_time
            ON readings(station_id, measured_at DESC);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_readings_measured_time
            ON readings(measured_at DESC);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
