//! Aggregation over slices of readings: duration parsing, circular wind
//! direction averaging, time-bucket summaries and wind-rose histograms.
//!
//! Everything here is pure computation over data already fetched from the
//! store, so the same code backs the history, stats and wind-rose
//! endpoints without touching SQL.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::ApiError;
use crate::models::{ms_to_ts, ts_format, ts_to_ms, Reading};

// ---

/// Sector labels for the 16-point compass rose, clockwise from north.
pub const COMPASS_16: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

/// Summary statistics over one time window of readings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeedStats {
    pub count: usize,
    pub avg_speed_kmh: Option<f64>,
    pub min_speed_kmh: Option<f64>,
    pub max_speed_kmh: Option<f64>,
    pub avg_direction_deg: Option<f64>,
}

/// One downsampled time bucket; `ts` is the bucket start.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketSummary {
    #[serde(with = "ts_format")]
    pub ts: NaiveDateTime,
    pub avg_speed_kmh: Option<f64>,
    pub min_speed_kmh: Option<f64>,
    pub max_speed_kmh: Option<f64>,
    pub avg_direction_deg: Option<f64>,
    pub sample_count: usize,
}

/// One angular sector of a wind-rose histogram.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoseSector {
    pub label: String,
    pub start_deg: f64,
    pub end_deg: f64,
    pub center_deg: f64,
    pub count: usize,
    pub avg_speed_kmh: Option<f64>,
}

// ---

/// Parse a duration token like `5m`, `6h` or `7d` into milliseconds.
///
/// Tokens are case-insensitive and may carry surrounding whitespace; the
/// value must be an unsigned integer and the unit one of `m`, `h`, `d`.
/// Anything else (including overflow) is a validation error.
pub fn parse_duration_ms(token: &str) -> Result<i64, ApiError> {
    // ---
    let normalized = token.trim().to_ascii_lowercase();
    let Some(unit) = normalized.chars().last() else {
        return Err(ApiError::validation("empty duration"));
    };
    let per_unit_ms: i64 = match unit {
        'm' => 60_000,
        'h' => 3_600_000,
        'd' => 86_400_000,
        _ => {
            return Err(ApiError::validation(format!(
                "invalid duration '{token}': unit must be one of m, h, d"
            )))
        }
    };

    let digits = &normalized[..normalized.len() - 1];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ApiError::validation(format!("invalid duration '{token}'")));
    }
    let value: i64 = digits
        .parse()
        .map_err(|_| ApiError::validation(format!("invalid duration '{token}'")))?;

    value
        .checked_mul(per_unit_ms)
        .ok_or_else(|| ApiError::validation(format!("duration '{token}' is out of range")))
}

/// Circular mean of wind directions in degrees, or `None` when the
/// directions cancel out (e.g. opposing winds) or the slice is empty.
///
/// Each direction becomes a unit vector; the mean vector's angle is the
/// answer, normalized to `[0, 360)`. A plain arithmetic mean would average
/// 350° and 10° to 180°, the exact opposite of the true north-ish answer.
pub fn circular_mean_deg(directions_deg: &[f64]) -> Option<f64> {
    // ---
    if directions_deg.is_empty() {
        return None;
    }

    let (mut x, mut y) = (0.0_f64, 0.0_f64);
    for direction in directions_deg {
        let radians = direction.to_radians();
        x += radians.cos();
        y += radians.sin();
    }

    if x.abs() < 1e-8 && y.abs() < 1e-8 {
        // No meaningful dominant direction
        return None;
    }

    let degrees = y.atan2(x).to_degrees().rem_euclid(360.0);
    Some(if degrees >= 360.0 { 0.0 } else { degrees })
}

/// Summarize one window of readings. Rows with a null speed still count
/// toward `count` but do not influence the speed statistics.
pub fn compute_stats(readings: &[Reading]) -> SpeedStats {
    // ---
    let speeds: Vec<f64> = readings.iter().filter_map(|r| r.speed_kmh).collect();
    let directions: Vec<f64> = readings.iter().filter_map(|r| r.direction_deg).collect();

    SpeedStats {
        count: readings.len(),
        avg_speed_kmh: mean(&speeds),
        min_speed_kmh: speeds.iter().copied().reduce(f64::min),
        max_speed_kmh: speeds.iter().copied().reduce(f64::max),
        avg_direction_deg: circular_mean_deg(&directions),
    }
}

/// Downsample readings into fixed buckets of `bucket_minutes`, ascending.
///
/// A reading lands in the bucket whose start is
/// `floor(epoch_ms / bucket_ms) * bucket_ms`; buckets with no readings are
/// omitted rather than emitted empty. Widths beyond the representable
/// millisecond range saturate, collapsing the whole slice into one
/// epoch-anchored bucket.
pub fn bucket_readings(readings: &[Reading], bucket_minutes: i64) -> Vec<BucketSummary> {
    // ---
    let bucket_ms = bucket_minutes.max(1).saturating_mul(60_000);

    let mut grouped: BTreeMap<i64, Vec<&Reading>> = BTreeMap::new();
    for reading in readings {
        let start_ms = ts_to_ms(reading.measured_at).div_euclid(bucket_ms) * bucket_ms;
        grouped.entry(start_ms).or_default().push(reading);
    }

    grouped
        .into_iter()
        .map(|(start_ms, rows)| {
            let speeds: Vec<f64> = rows.iter().filter_map(|r| r.speed_kmh).collect();
            let directions: Vec<f64> = rows.iter().filter_map(|r| r.direction_deg).collect();
            BucketSummary {
                ts: ms_to_ts(start_ms),
                avg_speed_kmh: mean(&speeds),
                min_speed_kmh: speeds.iter().copied().reduce(f64::min),
                max_speed_kmh: speeds.iter().copied().reduce(f64::max),
                avg_direction_deg: circular_mean_deg(&directions),
                sample_count: rows.len(),
            }
        })
        .collect()
}

/// Histogram readings into `bins` equal angular sectors starting at north.
///
/// `bins` is clamped to `4..=36`. All sectors are emitted even when empty;
/// readings without a direction are skipped entirely, while a known
/// direction with a null speed still counts toward its sector (and drags
/// the sector's speed average down, since the average is taken over every
/// binned reading). The 16-bin rose carries compass labels, every other
/// resolution gets degree-range labels.
pub fn wind_rose(readings: &[Reading], bins: usize) -> Vec<RoseSector> {
    // ---
    let bins = bins.clamp(4, 36);
    let width = 360.0 / bins as f64;

    let mut counts = vec![0usize; bins];
    let mut speed_sums = vec![0.0_f64; bins];

    for reading in readings {
        let Some(direction) = reading.direction_deg else {
            continue;
        };
        let normalized = direction.rem_euclid(360.0);
        let idx = ((normalized / width).floor() as usize) % bins;
        counts[idx] += 1;
        if let Some(speed) = reading.speed_kmh {
            speed_sums[idx] += speed;
        }
    }

    (0..bins)
        .map(|i| {
            let start = i as f64 * width;
            let end = start + width;
            let label = if bins == 16 {
                COMPASS_16[i].to_string()
            } else {
                format!("{}°-{}°", start.round(), end.round())
            };
            RoseSector {
                label,
                start_deg: start,
                end_deg: end,
                center_deg: start + width / 2.0,
                count: counts[i],
                avg_speed_kmh: (counts[i] > 0).then(|| speed_sums[i] / counts[i] as f64),
            }
        })
        .collect()
}

// ---

fn mean(values: &[f64]) -> Option<f64> {
    // ---
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::parse_source_ts;

    fn reading(speed: Option<f64>, direction: Option<f64>, ts: &str) -> Reading {
        // ---
        Reading {
            source_id: 0,
            station_id: 1,
            speed_kmh: speed,
            direction_deg: direction,
            measured_at: parse_source_ts(ts).unwrap(),
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_duration_tokens() {
        // ---
        assert_eq!(parse_duration_ms("1m").unwrap(), 60_000);
        assert_eq!(parse_duration_ms("15m").unwrap(), 900_000);
        assert_eq!(parse_duration_ms("6h").unwrap(), 21_600_000);
        assert_eq!(parse_duration_ms("7d").unwrap(), 604_800_000);
        assert_eq!(parse_duration_ms(" 24H ").unwrap(), 86_400_000);

        for bad in ["", "m", "5", "-5m", "+5m", "5x", "3.5h", "5 m"] {
            assert!(
                matches!(parse_duration_ms(bad), Err(ApiError::Validation(_))),
                "expected '{bad}' to be rejected"
            );
        }

        // Overflowing the millisecond arithmetic is a validation error, not a panic
        assert!(matches!(
            parse_duration_ms("99999999999999999d"),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn test_circular_mean_wraps_north() {
        // ---
        let mean = circular_mean_deg(&[350.0, 10.0]).unwrap();
        assert!(close(mean, 0.0) || close(mean, 360.0), "got {mean}");

        assert!(close(circular_mean_deg(&[90.0]).unwrap(), 90.0));
        assert!(close(circular_mean_deg(&[0.0, 90.0]).unwrap(), 45.0));
        assert!(close(circular_mean_deg(&[270.0, 270.0]).unwrap(), 270.0));
    }

    #[test]
    fn test_circular_mean_cancellation() {
        // ---
        assert_eq!(circular_mean_deg(&[0.0, 180.0]), None);
        assert_eq!(circular_mean_deg(&[90.0, 270.0]), None);
        assert_eq!(circular_mean_deg(&[]), None);
    }

    #[test]
    fn test_stats_skip_null_speeds() {
        // ---
        let readings = vec![
            reading(Some(10.0), Some(0.0), "2024-01-01 00:00:00"),
            reading(None, Some(90.0), "2024-01-01 00:00:05"),
            reading(Some(30.0), None, "2024-01-01 00:00:10"),
        ];

        let stats = compute_stats(&readings);
        assert_eq!(stats.count, 3);
        assert!(close(stats.avg_speed_kmh.unwrap(), 20.0));
        assert!(close(stats.min_speed_kmh.unwrap(), 10.0));
        assert!(close(stats.max_speed_kmh.unwrap(), 30.0));
        assert!(close(stats.avg_direction_deg.unwrap(), 45.0));
    }

    #[test]
    fn test_stats_over_empty_window() {
        // ---
        let stats = compute_stats(&[]);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.avg_speed_kmh, None);
        assert_eq!(stats.min_speed_kmh, None);
        assert_eq!(stats.max_speed_kmh, None);
        assert_eq!(stats.avg_direction_deg, None);
    }

    #[test]
    fn test_bucketing_floors_to_bucket_start() {
        // ---
        let readings = vec![
            reading(Some(10.0), Some(350.0), "2024-01-01 00:00:00"),
            reading(Some(20.0), Some(10.0), "2024-01-01 00:01:00"),
            reading(Some(5.0), Some(90.0), "2024-01-01 00:07:30"),
        ];

        let buckets = bucket_readings(&readings, 5);
        assert_eq!(buckets.len(), 2, "empty middle buckets are omitted");

        assert_eq!(buckets[0].ts, parse_source_ts("2024-01-01 00:00:00").unwrap());
        assert_eq!(buckets[0].sample_count, 2);
        assert!(close(buckets[0].avg_speed_kmh.unwrap(), 15.0));
        let direction = buckets[0].avg_direction_deg.unwrap();
        assert!(close(direction, 0.0) || close(direction, 360.0), "got {direction}");

        assert_eq!(buckets[1].ts, parse_source_ts("2024-01-01 00:05:00").unwrap());
        assert_eq!(buckets[1].sample_count, 1);
    }

    #[test]
    fn test_bucketing_total_preserved() {
        // ---
        let readings: Vec<Reading> = (0..20)
            .map(|i| {
                reading(
                    Some(i as f64),
                    Some(0.0),
                    &format!("2024-01-01 00:{:02}:30", i),
                )
            })
            .collect();

        let buckets = bucket_readings(&readings, 3);
        let total: usize = buckets.iter().map(|b| b.sample_count).sum();
        assert_eq!(total, readings.len());
        assert!(buckets.windows(2).all(|w| w[0].ts < w[1].ts));
    }

    #[test]
    fn test_bucketing_survives_oversized_widths() {
        // ---
        let readings = vec![
            reading(Some(10.0), Some(0.0), "2024-01-01 00:00:00"),
            reading(Some(20.0), Some(0.0), "2024-06-01 00:00:00"),
        ];

        // 2^59 minutes overflows the millisecond multiply; the width must
        // saturate instead, yielding a single bucket at the epoch
        let buckets = bucket_readings(&readings, 576_460_752_303_423_488);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].ts, parse_source_ts("1970-01-01 00:00:00").unwrap());
        assert_eq!(buckets[0].sample_count, 2);
        assert!(close(buckets[0].avg_speed_kmh.unwrap(), 15.0));
    }

    #[test]
    fn test_wind_rose_sector_assignment() {
        // ---
        let readings = vec![
            reading(Some(10.0), Some(0.0), "2024-01-01 00:00:00"),
            reading(Some(20.0), Some(11.0), "2024-01-01 00:01:00"),
            reading(None, Some(3.0), "2024-01-01 00:02:00"),
            reading(Some(7.0), None, "2024-01-01 00:03:00"),
        ];

        let rose = wind_rose(&readings, 16);
        assert_eq!(rose.len(), 16);
        assert_eq!(rose[0].label, "N");
        assert_eq!(rose[15].label, "NNW");

        // 0°, 11° and 3° all fall in the first 22.5° sector; the speedless
        // 3° reading still dilutes the sector average (30 over 3 readings)
        assert_eq!(rose[0].count, 3);
        assert!(close(rose[0].avg_speed_kmh.unwrap(), 10.0));

        // The direction-less reading is not binned anywhere
        let binned: usize = rose.iter().map(|s| s.count).sum();
        assert_eq!(binned, 3);
    }

    #[test]
    fn test_wind_rose_boundaries_and_clamp() {
        // ---
        let readings = vec![
            reading(Some(1.0), Some(359.9), "2024-01-01 00:00:00"),
            reading(Some(1.0), Some(-10.0), "2024-01-01 00:01:00"),
        ];

        let rose = wind_rose(&readings, 4);
        assert_eq!(rose.len(), 4);
        // Both wrap into the last quadrant (270°..360°)
        assert_eq!(rose[3].count, 2);
        assert_eq!(rose[3].label, "270°-360°");
        assert!(close(rose[3].center_deg, 315.0));

        assert_eq!(wind_rose(&[], 2).len(), 4, "bins clamp up to 4");
        assert_eq!(wind_rose(&[], 100).len(), 36, "bins clamp down to 36");
        assert!(wind_rose(&[], 8).iter().all(|s| s.count == 0));
    }
}
