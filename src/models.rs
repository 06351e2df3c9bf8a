//! Data models for the wind pipeline, plus the upstream-row normalizer.

use chrono::{DateTime, NaiveDateTime};
use serde::Serialize;
use serde_json::Value;

// ---

/// Canonical timestamp layout shared by the upstream source, the database
/// and every API response: `YYYY-MM-DD HH:MM:SS`, UTC, second resolution.
pub const SOURCE_TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a source-format timestamp. Returns `None` on any mismatch.
pub fn parse_source_ts(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), SOURCE_TS_FORMAT).ok()
}

/// Format a timestamp back into the source layout.
pub fn fmt_source_ts(ts: NaiveDateTime) -> String {
    ts.format(SOURCE_TS_FORMAT).to_string()
}

/// Milliseconds since the Unix epoch for an (implicitly UTC) timestamp.
pub fn ts_to_ms(ts: NaiveDateTime) -> i64 {
    ts.and_utc().timestamp_millis()
}

/// Inverse of [`ts_to_ms`]. Out-of-range values clamp to the epoch rather
/// than panic; bucket starts and window bounds never get there in practice.
pub fn ms_to_ts(ms: i64) -> NaiveDateTime {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.naive_utc())
        .unwrap_or_default()
}

/// Serde adapter keeping `NaiveDateTime` fields in the source layout on the
/// wire instead of chrono's default `T`-separated ISO-8601.
pub mod ts_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{fmt_source_ts, parse_source_ts, SOURCE_TS_FORMAT};

    pub fn serialize<S>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&fmt_source_ts(*ts))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_source_ts(&raw).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid timestamp `{raw}`, expected `{SOURCE_TS_FORMAT}`"
            ))
        })
    }
}

// ---

/// A sensor station: fixed location identified by a small integer id.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Station {
    pub station_id: i64,
    pub name: String,
}

/// One stored wind observation, as returned by range queries.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Reading {
    pub source_id: i64,
    pub station_id: i64,
    pub speed_kmh: Option<f64>,
    pub direction_deg: Option<f64>,
    #[serde(with = "ts_format")]
    pub measured_at: NaiveDateTime,
}

/// Freshest reading for a station (max `source_id`), joined with its name.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LatestRow {
    pub source_id: i64,
    pub station_id: i64,
    pub station_name: Option<String>,
    pub speed_kmh: Option<f64>,
    pub direction_deg: Option<f64>,
    pub measured_at: NaiveDateTime,
    pub inserted_at: NaiveDateTime,
}

/// [`LatestRow`] plus derived staleness fields, as served by `/api/latest`.
///
/// `age_seconds` is measured from `inserted_at` (storage time), not
/// `measured_at`: staleness means "the collector stopped landing rows",
/// which upstream clock skew in `measured_at` must not mask.
#[derive(Debug, Clone, Serialize)]
pub struct LatestReading {
    pub source_id: i64,
    pub station_id: i64,
    pub station_name: Option<String>,
    pub speed_kmh: Option<f64>,
    pub direction_deg: Option<f64>,
    #[serde(with = "ts_format")]
    pub measured_at: NaiveDateTime,
    #[serde(with = "ts_format")]
    pub inserted_at: NaiveDateTime,
    pub age_seconds: i64,
    pub is_stale: bool,
}

impl LatestRow {
    /// Derive the wire-facing staleness fields against the given wall clock.
    pub fn into_latest(self, now: NaiveDateTime, stale_after_seconds: i64) -> LatestReading {
        // ---
        let age_seconds = (now - self.inserted_at).num_seconds().max(0);

        LatestReading {
            source_id: self.source_id,
            station_id: self.station_id,
            station_name: self.station_name,
            speed_kmh: self.speed_kmh,
            direction_deg: self.direction_deg,
            measured_at: self.measured_at,
            inserted_at: self.inserted_at,
            age_seconds,
            is_stale: age_seconds >= stale_after_seconds,
        }
    }
}

// ---

/// A normalized reading ready for insertion (the store assigns `inserted_at`).
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub source_id: i64,
    pub station_id: i64,
    pub speed_kmh: Option<f64>,
    pub direction_deg: Option<f64>,
    pub measured_at: NaiveDateTime,
}

impl NewReading {
    /// Coerce one loosely-typed upstream row into a canonical reading.
    ///
    /// Upstream rows carry `id`, `estacion`, `velocidad`, `direccion` and
    /// `tiempo`; numbers arrive either as JSON numbers or numeric strings,
    /// and the feed is known to contain malformed sentinel rows. So this is
    /// a pure accept-or-skip function, never an error:
    /// - `id` / `estacion` must coerce to positive integers, else the whole
    ///   row is rejected
    /// - `tiempo` must be a non-empty `YYYY-MM-DD HH:MM:SS` timestamp, else
    ///   the whole row is rejected
    /// - `velocidad` / `direccion` individually fall back to `NULL` when
    ///   missing, empty, unparseable, non-finite or (speed only) negative
    pub fn from_source_row(row: &Value) -> Option<NewReading> {
        // ---
        let source_id = coerce_i64(row.get("id")?)?;
        let station_id = coerce_i64(row.get("estacion")?)?;
        if source_id <= 0 || station_id <= 0 {
            return None;
        }

        let measured_at = match row.get("tiempo") {
            Some(Value::String(raw)) if !raw.trim().is_empty() => parse_source_ts(raw)?,
            _ => return None,
        };

        let speed_kmh = coerce_f64(row.get("velocidad")).filter(|v| *v >= 0.0);
        let direction_deg = coerce_f64(row.get("direccion"));

        Some(NewReading {
            source_id,
            station_id,
            speed_kmh,
            direction_deg,
            measured_at,
        })
    }
}

/// Integer coercion accepting JSON numbers and numeric strings.
fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Float coercion: absent, null, empty, unparseable or non-finite → `None`.
fn coerce_f64(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if !s.trim().is_empty() => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    fn source_row() -> Value {
        // ---
        json!({
            "id": 42,
            "estacion": 1,
            "velocidad": "12.5",
            "direccion": 270,
            "tiempo": "2024-01-01 00:00:00"
        })
    }

    #[test]
    fn test_normalizes_mixed_typing() {
        // ---
        let reading = NewReading::from_source_row(&source_row()).unwrap();

        assert_eq!(reading.source_id, 42);
        assert_eq!(reading.station_id, 1);
        assert_eq!(reading.speed_kmh, Some(12.5));
        assert_eq!(reading.direction_deg, Some(270.0));
        assert_eq!(fmt_source_ts(reading.measured_at), "2024-01-01 00:00:00");

        // Entirely string-typed rows are equally valid
        let stringly = json!({
            "id": "42", "estacion": "1", "velocidad": "12.5",
            "direccion": "270", "tiempo": "2024-01-01 00:00:00"
        });
        assert_eq!(NewReading::from_source_row(&stringly).unwrap(), reading);
    }

    #[test]
    fn test_rejects_bad_identity() {
        // ---
        for (key, value) in [
            ("id", json!(null)),
            ("id", json!("abc")),
            ("id", json!(0)),
            ("id", json!(-3)),
            ("id", json!(1.5)),
            ("estacion", json!("")),
            ("estacion", json!(0)),
        ] {
            let mut row = source_row();
            row[key] = value.clone();
            assert!(
                NewReading::from_source_row(&row).is_none(),
                "{key}={value} should reject the row"
            );
        }

        let mut row = source_row();
        row.as_object_mut().unwrap().remove("id");
        assert!(NewReading::from_source_row(&row).is_none());
    }

    #[test]
    fn test_rejects_bad_timestamp() {
        // ---
        for value in [
            json!(""),
            json!("   "),
            json!(null),
            json!(1704067200),
            json!("2024-13-01 00:00:00"),
            json!("2024-01-01T00:00:00"),
        ] {
            let mut row = source_row();
            row["tiempo"] = value.clone();
            assert!(
                NewReading::from_source_row(&row).is_none(),
                "tiempo={value} should reject the row"
            );
        }
    }

    #[test]
    fn test_unusable_measurements_become_null() {
        // ---
        for value in [json!(null), json!(""), json!("n/a"), json!("NaN"), json!(-4.0)] {
            let mut row = source_row();
            row["velocidad"] = value.clone();
            let reading = NewReading::from_source_row(&row).unwrap();
            assert_eq!(reading.speed_kmh, None, "velocidad={value} should store NULL");
            // A dead speed field never takes the direction with it
            assert_eq!(reading.direction_deg, Some(270.0));
        }

        // Directions may be any finite real; callers normalize into [0,360)
        let mut row = source_row();
        row["direccion"] = json!(-90.0);
        let reading = NewReading::from_source_row(&row).unwrap();
        assert_eq!(reading.direction_deg, Some(-90.0));

        row["direccion"] = json!("inf");
        assert_eq!(
            NewReading::from_source_row(&row).unwrap().direction_deg,
            None
        );
    }

    #[test]
    fn test_timestamp_round_trip() {
        // ---
        let ts = parse_source_ts(" 2024-06-30 23:59:59 ").unwrap();
        assert_eq!(fmt_source_ts(ts), "2024-06-30 23:59:59");
        assert_eq!(ms_to_ts(ts_to_ms(ts)), ts);
        assert!(parse_source_ts("2024-06-30").is_none());
    }

    #[test]
    fn test_staleness_derivation() {
        // ---
        let inserted_at = parse_source_ts("2024-01-01 00:00:00").unwrap();
        let row = LatestRow {
            source_id: 1,
            station_id: 1,
            station_name: Some("Chipilo".into()),
            speed_kmh: Some(10.0),
            direction_deg: Some(350.0),
            measured_at: inserted_at,
            inserted_at,
        };

        let now = parse_source_ts("2024-01-01 00:00:25").unwrap();
        let latest = row.clone().into_latest(now, 20);
        assert_eq!(latest.age_seconds, 25);
        assert!(latest.is_stale);

        let fresh = row
            .clone()
            .into_latest(parse_source_ts("2024-01-01 00:00:19").unwrap(), 20);
        assert_eq!(fresh.age_seconds, 19);
        assert!(!fresh.is_stale);

        // Clock skew (inserted_at in the future) floors at zero
        let skewed = row.into_latest(parse_source_ts("2023-12-31 23:59:00").unwrap(), 20);
        assert_eq!(skewed.age_seconds, 0);
        assert!(!skewed.is_stale);
    }
}
