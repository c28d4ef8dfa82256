//! Bar ingestion from CSV exports
//!
//! Loads `timestamp,open,high,low,close,volume` files (the format produced
//! by the multi-timeframe exporter) and resamples 5m bars up to 15m/1h when
//! a timeframe has no file of its own. Naive timestamps are interpreted as
//! exchange time (IST).

use crate::bars::{Bar, Timeframe};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Asia::Kolkata;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize)]
struct CsvBar {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%z") {
        return Ok(ts.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .with_context(|| format!("unparseable timestamp: {raw}"))?;
    let local = Kolkata
        .from_local_datetime(&naive)
        .single()
        .with_context(|| format!("ambiguous IST timestamp: {raw}"))?;
    Ok(local.with_timezone(&Utc))
}

/// Load a bar series from a CSV file, sorted by timestamp
pub fn load_bars(path: &Path) -> Result<Vec<Bar>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut bars = Vec::new();
    for (i, record) in reader.deserialize::<CsvBar>().enumerate() {
        let row = record.with_context(|| format!("bad row {} in {}", i + 2, path.display()))?;
        bars.push(Bar {
            timestamp: parse_timestamp(&row.timestamp)?,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }

    bars.sort_by_key(|b| b.timestamp);
    info!("Loaded {} bars from {}", bars.len(), path.display());
    Ok(bars)
}

/// Floor a timestamp to its timeframe bucket, in exchange time so the
/// 09:15 session open stays bucket-aligned on the hourly frame
fn bucket_start(ts: DateTime<Utc>, tf: Timeframe) -> DateTime<Utc> {
    let local = ts.with_timezone(&Kolkata);
    let minutes = (local.hour() * 60 + local.minute()) as i64;
    let offset = minutes % tf.minutes();
    (local - Duration::minutes(offset))
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(local)
        .with_timezone(&Utc)
}

/// Resample a 5m series into a coarser timeframe: first open, max high,
/// min low, last close, summed volume
pub fn resample(bars: &[Bar], tf: Timeframe) -> Vec<Bar> {
    let mut out: Vec<Bar> = Vec::new();
    for bar in bars {
        let start = bucket_start(bar.timestamp, tf);
        let same_bucket = out.last().is_some_and(|c| c.timestamp == start);
        if same_bucket {
            if let Some(current) = out.last_mut() {
                current.high = current.high.max(bar.high);
                current.low = current.low.min(bar.low);
                current.close = bar.close;
                current.volume += bar.volume;
            }
        } else {
            out.push(Bar {
                timestamp: start,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
            });
        }
    }
    out
}
