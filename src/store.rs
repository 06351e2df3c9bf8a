//! Time-series store: append-only readings log plus the station registry.
//!
//! All writes funnel through [`insert_readings`], which dedups on
//! `source_id` inside a single transaction per collector cycle, so a
//! concurrent reader either sees the whole cycle or none of it. Readings
//! are immutable once stored; there is no update or delete path.

use chrono::NaiveDateTime;
use sqlx::SqlitePool;

use crate::models::{fmt_source_ts, LatestRow, NewReading, Reading, Station};

// ---

/// Hard ceiling on rows returned by a single range query.
pub const MAX_RANGE_ROWS: i64 = 200_000;

const LATEST_BASE: &str = r#"
    SELECT r.source_id, r.station_id, s.name AS station_name,
           r.speed_kmh, r.direction_deg, r.measured_at, r.inserted_at
    FROM readings r
    JOIN (
        SELECT station_id, MAX(source_id) AS max_source_id
        FROM readings
        GROUP BY station_id
    ) latest
      ON latest.station_id = r.station_id
     AND latest.max_source_id = r.source_id
    LEFT JOIN stations s ON s.station_id = r.station_id
"#;

// ---

/// Idempotent create-or-rename of a station.
pub async fn upsert_station(
    pool: &SqlitePool,
    station_id: i64,
    name: &str,
) -> Result<(), sqlx::Error> {
    // ---
    sqlx::query(
        r#"
        INSERT INTO stations(station_id, name)
        VALUES(?1, ?2)
        ON CONFLICT(station_id) DO UPDATE SET name = excluded.name
        "#,
    )
    .bind(station_id)
    .bind(name)
    .execute(pool)
    .await?;

    Ok(())
}

/// All known stations, ordered by id.
pub async fn list_stations(pool: &SqlitePool) -> Result<Vec<Station>, sqlx::Error> {
    // ---
    sqlx::query_as::<_, Station>("SELECT station_id, name FROM stations ORDER BY station_id")
        .fetch_all(pool)
        .await
}

/// Insert a batch of normalized readings inside one transaction.
///
/// Each row is an `INSERT OR IGNORE` keyed on `source_id`: replays and
/// overlapping backfills are silent no-ops, never errors. Returns how many
/// rows were actually added.
pub async fn insert_readings(
    pool: &SqlitePool,
    readings: &[NewReading],
) -> Result<u64, sqlx::Error> {
    // ---
    let mut tx = pool.begin().await?;
    let mut inserted = 0u64;

    for reading in readings {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO readings(
                source_id, station_id, speed_kmh, direction_deg, measured_at
            ) VALUES(?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(reading.source_id)
        .bind(reading.station_id)
        .bind(reading.speed_kmh)
        .bind(reading.direction_deg)
        .bind(fmt_source_ts(reading.measured_at))
        .execute(&mut *tx)
        .await?;

        inserted += result.rows_affected();
    }

    tx.commit().await?;
    Ok(inserted)
}

/// Insert one reading; returns whether a new row was added.
pub async fn insert_reading(pool: &SqlitePool, reading: &NewReading) -> Result<bool, sqlx::Error> {
    // ---
    Ok(insert_readings(pool, std::slice::from_ref(reading)).await? == 1)
}

/// Freshest reading per station (or just the requested one).
///
/// "Freshest" means maximum `source_id`, NOT maximum `measured_at`: the
/// upstream source issues `source_id` monotonically, so it stays the
/// authoritative recency marker even when `measured_at` carries clock skew
/// or backfilled history lands with old timestamps.
pub async fn latest_per_station(
    pool: &SqlitePool,
    station_id: Option<i64>,
) -> Result<Vec<LatestRow>, sqlx::Error> {
    // ---
    match station_id {
        Some(id) => {
            let sql = format!("{LATEST_BASE} WHERE r.station_id = ?1 ORDER BY r.station_id ASC");
            sqlx::query_as::<_, LatestRow>(&sql).bind(id).fetch_all(pool).await
        }
        None => {
            let sql = format!("{LATEST_BASE} ORDER BY r.station_id ASC");
            sqlx::query_as::<_, LatestRow>(&sql).fetch_all(pool).await
        }
    }
}

/// Most recent `measured_at` for a station.
///
/// Anchors time windows at "now as the data understands it" instead of the
/// wall clock, so query results stay reproducible over a frozen dataset
/// and tolerate collector downtime.
pub async fn latest_measured_at(
    pool: &SqlitePool,
    station_id: i64,
) -> Result<Option<NaiveDateTime>, sqlx::Error> {
    // ---
    let row: Option<(NaiveDateTime,)> = sqlx::query_as(
        r#"
        SELECT measured_at FROM readings
        WHERE station_id = ?1
        ORDER BY measured_at DESC
        LIMIT 1
        "#,
    )
    .bind(station_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(ts,)| ts))
}

/// Readings for a station in `[from, to]` (inclusive bounds), ascending by
/// `measured_at`, capped at `limit` rows (never more than [`MAX_RANGE_ROWS`]).
pub async fn readings_between(
    pool: &SqlitePool,
    station_id: i64,
    from: NaiveDateTime,
    to: NaiveDateTime,
    limit: i64,
) -> Result<Vec<Reading>, sqlx::Error> {
    // ---
    sqlx::query_as::<_, Reading>(
        r#"
        SELECT source_id, station_id, speed_kmh, direction_deg, measured_at
        FROM readings
        WHERE station_id = ?1
          AND measured_at >= ?2
          AND measured_at <= ?3
        ORDER BY measured_at ASC
        LIMIT ?4
        "#,
    )
    .bind(station_id)
    .bind(fmt_source_ts(from))
    .bind(fmt_source_ts(to))
    .bind(limit.clamp(1, MAX_RANGE_ROWS))
    .fetch_all(pool)
    .await
}

/// Total stored readings, for the health endpoint.
pub async fn count_readings(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    // ---
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM readings")
        .fetch_one(pool)
        .await
}
