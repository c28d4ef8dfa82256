//! Per-timeframe zone construction
//!
//! Orchestrates one timeframe end to end: reversal swings clustered into
//! support/resistance bands, volume-profile confluence folded into
//! overlapping swing zones, VWAP/gap/prior-day zones added, flip detection
//! and live metadata, then scoring and filtering. Futures bars supply the
//! liquidity evidence when present; the index series has no usable volume.

use crate::bars::{Bar, Timeframe};
use crate::session;
use crate::zones::cluster::{cluster_levels, ClusterConfig};
use crate::zones::filter::{filter_and_validate_zones, FilterConfig};
use crate::zones::model::{
    zone_status, Band, Confidence, Zone, ZoneKind, ZoneSource, ZoneStatus, ZoneSubtype, DEFAULT_ATR,
};
use crate::zones::scorer::{score_zones, ScoreWeights};
use crate::zones::swing::{detect_reversal_swings, SwingConfig};
use crate::zones::volume_profile::volume_profile_zones;
use crate::zones::vwap::{vwap_zone, DEFAULT_VWAP_BUFFER};
use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use chrono_tz::Asia::Kolkata;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct BuilderConfig {
    pub swing: SwingConfig,
    pub cluster: ClusterConfig,
    pub weights: ScoreWeights,
    pub filter: FilterConfig,
    pub include_vwap: bool,
    pub vwap_buffer: f64,
    /// Minimum open gap as a percent of the prior close
    pub gap_threshold_pct: f64,
    /// Bars at the session open that may fill the gap
    pub gap_fill_bars: usize,
    /// Half-width of prior-day OHLC bands (points)
    pub fallback_half_span: f64,
    /// Band overlap tolerance when folding volume into swing zones
    pub overlap_buffer: f64,
    /// Retest margin as a fraction of band height, with a floor in points
    pub flip_margin_ratio: f64,
    pub flip_margin_floor: f64,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            // Shallower confirmation than the standalone detector defaults:
            // zone building wants more raw levels to cluster
            swing: SwingConfig {
                atr_window: 14,
                atr_multiplier: 0.4,
                lookback: 3,
                volume_filter: false,
            },
            cluster: ClusterConfig::default(),
            weights: ScoreWeights::default(),
            filter: FilterConfig::default(),
            include_vwap: true,
            vwap_buffer: DEFAULT_VWAP_BUFFER,
            gap_threshold_pct: 0.3,
            gap_fill_bars: 5,
            fallback_half_span: 5.0,
            overlap_buffer: 5.0,
            flip_margin_ratio: 0.25,
            flip_margin_floor: 2.0,
        }
    }
}

/// Trading date of a bar in exchange time
pub fn session_date(bar: &Bar) -> NaiveDate {
    bar.timestamp.with_timezone(&Kolkata).date_naive()
}

/// Mean of the rolling high-low range; the coarse volatility yardstick the
/// zone pipeline scales bands and gaps with
pub fn mean_range_atr(bars: &[Bar], window: usize) -> f64 {
    let n = bars.len();
    if n == 0 {
        return DEFAULT_ATR;
    }
    let ranges: Vec<f64> = bars.iter().map(|b| b.range()).collect();
    let mut sum = 0.0;
    let mut rolling = Vec::new();
    for i in 0..n {
        sum += ranges[i];
        if i >= window {
            sum -= ranges[i - window];
        }
        if i + 1 >= window {
            rolling.push(sum / window as f64);
        }
    }
    if rolling.is_empty() {
        return DEFAULT_ATR;
    }
    let mean = rolling.iter().sum::<f64>() / rolling.len() as f64;
    if mean > 0.0 {
        mean
    } else {
        DEFAULT_ATR
    }
}

fn bands_overlap(a: Band, b: Band, buffer: f64) -> bool {
    !(a.high < b.low - buffer || a.low > b.high + buffer)
}

/// Fold volume-profile confluence into overlapping swing zones; volume-only
/// zones that match nothing are appended as standalone entries
fn merge_volume_into_swing_zones(
    swing_zones: Vec<Zone>,
    volume_zones: Vec<Zone>,
    buffer: f64,
) -> Vec<Zone> {
    let mut merged: Vec<Zone> = Vec::new();

    for mut sz in swing_zones {
        if let Some(vz) = volume_zones
            .iter()
            .find(|vz| bands_overlap(sz.band, vz.band, buffer))
        {
            sz.volume_cluster = true;
            sz.sources.insert(ZoneSource::Swing);
            sz.sources.insert(ZoneSource::Volume);
            sz.subtype = ZoneSubtype::SwingVolume;
            sz.total_volume = vz.total_volume;
        }
        merged.push(sz);
    }

    for vz in volume_zones {
        let unmatched = merged
            .iter()
            .filter(|sz| sz.subtype != ZoneSubtype::VpZone)
            .all(|sz| !bands_overlap(vz.band, sz.band, buffer));
        if unmatched {
            merged.push(vz);
        }
    }

    merged
}

/// Prior distinct trading date in a series, given the current date
fn prior_session_date(bars: &[Bar], today: NaiveDate) -> Option<NaiveDate> {
    bars.iter()
        .map(session_date)
        .filter(|d| *d < today)
        .max()
}

/// Unfilled opening-gap zone: support under a gap-up, resistance over a
/// gap-down, banded at the prior close
fn detect_gap_zone(bars: &[Bar], mean_atr: f64, tf: Timeframe, config: &BuilderConfig) -> Option<Zone> {
    let last = bars.last()?;
    let today = session_date(last);
    let prev_date = prior_session_date(bars, today)?;

    let today_bars: Vec<&Bar> = bars.iter().filter(|b| session_date(b) == today).collect();
    let prev_bars: Vec<&Bar> = bars.iter().filter(|b| session_date(b) == prev_date).collect();
    let (first_today, last_prev) = (today_bars.first()?, prev_bars.last()?);

    let y_close = last_prev.close;
    let t_open = first_today.open;
    if y_close <= 0.0 {
        return None;
    }
    let gap_pct = (t_open - y_close).abs() / y_close * 100.0;
    if gap_pct <= config.gap_threshold_pct {
        return None;
    }

    let kind = if t_open > y_close {
        ZoneKind::Support
    } else {
        ZoneKind::Resistance
    };

    // Gap counts only while unfilled through the first bars of the session
    let open_window = &today_bars[..today_bars.len().min(config.gap_fill_bars)];
    let filled = match kind {
        ZoneKind::Support => open_window.iter().any(|b| b.low < y_close),
        _ => open_window.iter().any(|b| b.high > y_close),
    };
    if filled {
        debug!("Gap at {:.2} already filled - no zone", y_close);
        return None;
    }

    let mut zone = Zone::new(kind, Band::new(y_close - mean_atr, y_close + mean_atr));
    zone.price = y_close;
    zone.confidence = Confidence::Medium;
    zone.subtype = ZoneSubtype::Gap;
    zone.sources.insert(ZoneSource::Gap);
    zone.timeframes.insert(tf);
    zone.last_touched = Some(last.timestamp);
    Some(zone)
}

/// Prior-session OHLC bands: resistance at the high, support at the low
/// and close; the coarse levels everything else falls back to
fn prev_day_zones(bars: &[Bar], half_span: f64, current_price: f64) -> Vec<Zone> {
    let Some(last) = bars.last() else {
        return Vec::new();
    };
    let today = session_date(last);
    let Some(prev_date) = prior_session_date(bars, today) else {
        return Vec::new();
    };

    let prev: Vec<&Bar> = bars.iter().filter(|b| session_date(b) == prev_date).collect();
    let prev_high = prev.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let prev_low = prev.iter().map(|b| b.low).fold(f64::MAX, f64::min);
    let prev_close = match prev.last() {
        Some(b) => b.close,
        None => return Vec::new(),
    };
    let last_touched = prev.last().map(|b| b.timestamp);

    [
        (ZoneKind::Resistance, prev_high),
        (ZoneKind::Support, prev_low),
        (ZoneKind::Support, prev_close),
    ]
    .into_iter()
    .map(|(kind, level)| {
        let mut zone = Zone::new(kind, Band::new(level - half_span, level + half_span));
        zone.confidence = Confidence::Low;
        zone.subtype = ZoneSubtype::Fallback;
        zone.sources.insert(ZoneSource::Fallback);
        zone.last_touched = last_touched;
        if zone.band.contains(current_price) {
            zone.touch_count = 1;
        }
        zone
    })
    .collect()
}

/// Tag zones whose role flipped: a resistance retested from just below its
/// band, or a support retested from just above
fn detect_flip_zones(zones: Vec<Zone>, bars: &[Bar], config: &BuilderConfig, tf: Timeframe) -> Vec<Zone> {
    let Some(last) = bars.last() else {
        return zones;
    };
    let window_start = last.timestamp - Duration::minutes(tf.flip_window_minutes());
    let recent: Vec<f64> = bars
        .iter()
        .filter(|b| b.timestamp >= window_start)
        .map(|b| b.close)
        .collect();

    zones
        .into_iter()
        .map(|mut zone| {
            let margin = config
                .flip_margin_floor
                .max(zone.span() * config.flip_margin_ratio);
            let flipped = match zone.kind {
                ZoneKind::Resistance => recent
                    .iter()
                    .any(|&c| c < zone.band.high && c > zone.band.high - margin),
                ZoneKind::Support => recent
                    .iter()
                    .any(|&c| c > zone.band.low && c < zone.band.low + margin),
                _ => false,
            };
            if flipped {
                debug!(
                    "{} zone flipped to retest: band [{:.2}-{:.2}]",
                    zone.kind, zone.band.low, zone.band.high
                );
                zone.flipped = true;
                zone.subtype = ZoneSubtype::Retest;
            }
            zone
        })
        .collect()
}

/// Attach age and live status to each zone
fn enrich_zone_metadata(zones: Vec<Zone>, current_price: f64, now: DateTime<Utc>) -> Vec<Zone> {
    let today = now.with_timezone(&Kolkata).date_naive();

    zones
        .into_iter()
        .map(|mut zone| {
            zone.zone_age_minutes = zone.last_touched.map(|touched| {
                let mut age = (now - touched).num_seconds() as f64 / 60.0;
                // Overnight zones seen early in the session keep a usable
                // recency instead of a 17-hour penalty
                let from_earlier_day = touched.with_timezone(&Kolkata).date_naive() < today;
                if from_earlier_day && session::is_early_session(now) {
                    age = age.min(60.0);
                }
                (age * 100.0).round() / 100.0
            });
            zone.zone_status = zone_status(zone.band, current_price);
            zone
        })
        .collect()
}

/// Slice of the futures series feeding the volume profile: today's session
/// once the morning has developed, otherwise the prior session
fn volume_slice<'a>(fut_bars: &'a [Bar], now: DateTime<Utc>, today: NaiveDate) -> Vec<&'a Bar> {
    let afternoon = now.with_timezone(&Kolkata).hour() >= 12;
    let target = if afternoon {
        Some(today)
    } else {
        prior_session_date(fut_bars, today)
    };
    match target {
        Some(date) => fut_bars.iter().filter(|b| session_date(b) == date).collect(),
        None => Vec::new(),
    }
}

/// Build the active zone set for one timeframe
///
/// Degenerate inputs degrade to an empty list rather than failing; the
/// multi-timeframe merge treats that as "no zones from this frame".
pub fn active_zones(
    bars: &[Bar],
    fut_bars: Option<&[Bar]>,
    tf: Timeframe,
    config: &BuilderConfig,
) -> Vec<Zone> {
    let Some(last) = bars.last() else {
        return Vec::new();
    };
    let current_price = last.close;
    let now = last.timestamp;
    let today = session_date(last);

    debug!(
        "Building zones for {} | last candle {} | price {:.2}",
        tf, now, current_price
    );

    let mean_atr = mean_range_atr(bars, 14);

    // Swings -> clustered bands
    let (swing_highs, swing_lows) = detect_reversal_swings(bars, &config.swing);
    debug!(
        "Swings tf={} highs={} lows={}",
        tf,
        swing_highs.len(),
        swing_lows.len()
    );
    if swing_highs.is_empty() || swing_lows.is_empty() {
        warn!("No swings found in {} timeframe", tf);
        return Vec::new();
    }

    let mut zones: Vec<Zone> = Vec::new();
    for mut zone in cluster_levels(ZoneKind::Support, &swing_lows, mean_atr, &config.cluster)
        .into_iter()
        .chain(cluster_levels(ZoneKind::Resistance, &swing_highs, mean_atr, &config.cluster))
    {
        zone.timeframes.insert(tf);
        zones.push(zone);
    }

    // Volume-profile confluence from the futures series
    let volume_zones = match fut_bars {
        Some(fut) if !fut.is_empty() => {
            let slice = volume_slice(fut, now, today);
            let owned: Vec<Bar> = slice.into_iter().cloned().collect();
            debug!("Futures slice for volume zones: rows={}", owned.len());
            volume_profile_zones(&owned, mean_atr)
        }
        _ => Vec::new(),
    };
    zones = merge_volume_into_swing_zones(zones, volume_zones, config.overlap_buffer);

    // VWAP band over today's session
    if config.include_vwap {
        let vwap_src = match fut_bars {
            Some(fut) if !fut.is_empty() => fut,
            _ => bars,
        };
        let session_slice: Vec<Bar> = vwap_src
            .iter()
            .filter(|b| session_date(b) == today)
            .cloned()
            .collect();
        if let Some(mut zone) = vwap_zone(&session_slice, config.vwap_buffer) {
            zone.timeframes.insert(tf);
            zone.last_touched = Some(now);
            zones.push(zone);
        }
    }

    // Opening gap
    if let Some(zone) = detect_gap_zone(bars, mean_atr, tf, config) {
        zones.push(zone);
    }

    // Prior-day OHLC fallback
    let fallback_src = match fut_bars {
        Some(fut) if !fut.is_empty() => fut,
        _ => bars,
    };
    zones.extend(prev_day_zones(fallback_src, config.fallback_half_span, current_price));

    // Flip detection, live metadata, scoring, filtering
    let zones = detect_flip_zones(zones, bars, config, tf);
    let zones = enrich_zone_metadata(zones, current_price, now);

    let live = zones
        .iter()
        .filter(|z| matches!(z.zone_status, ZoneStatus::Inside | ZoneStatus::Testing))
        .count();
    info!("Total zones: {} | Live actionable: {}", zones.len(), live);

    let zones = score_zones(zones, current_price, &config.weights);
    filter_and_validate_zones(zones, Some(mean_atr), tf, Some(current_price), &config.filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bar_at(day: u32, h: u32, m: u32, open: f64, high: f64, low: f64, close: f64, vol: f64) -> Bar {
        Bar {
            timestamp: Kolkata
                .with_ymd_and_hms(2024, 7, day, h, m, 0)
                .unwrap()
                .with_timezone(&Utc),
            open,
            high,
            low,
            close,
            volume: vol,
        }
    }

    fn flat_day(day: u32, level: f64) -> Vec<Bar> {
        (0..12)
            .map(|i| {
                let m = (i * 5) % 60;
                let h = 10 + (i * 5) / 60;
                bar_at(day, h, m as u32, level, level + 1.0, level - 1.0, level, 500.0)
            })
            .collect()
    }

    #[test]
    fn test_gap_up_creates_support_zone() {
        let mut bars = flat_day(1, 100.0);
        // Next session opens 1% above the prior close and never fills
        bars.extend(flat_day(2, 101.0).into_iter().map(|mut b| {
            b.open = 101.0;
            b.high = 102.0;
            b.low = 100.5;
            b.close = 101.0;
            b
        }));

        let zone = detect_gap_zone(&bars, 2.0, Timeframe::M5, &BuilderConfig::default()).unwrap();
        assert_eq!(zone.kind, ZoneKind::Support);
        assert_eq!(zone.price, 100.0);
        assert_eq!(zone.band.low, 98.0);
        assert_eq!(zone.band.high, 102.0);
        assert_eq!(zone.subtype, ZoneSubtype::Gap);
    }

    #[test]
    fn test_filled_gap_is_ignored() {
        let mut bars = flat_day(1, 100.0);
        let mut today = flat_day(2, 101.0);
        // First bar dips back through the prior close
        today[0].open = 101.0;
        today[0].low = 99.5;
        bars.extend(today);

        assert!(detect_gap_zone(&bars, 2.0, Timeframe::M5, &BuilderConfig::default()).is_none());
    }

    #[test]
    fn test_small_gap_is_ignored() {
        let mut bars = flat_day(1, 100.0);
        bars.extend(flat_day(2, 100.1));
        assert!(detect_gap_zone(&bars, 2.0, Timeframe::M5, &BuilderConfig::default()).is_none());
    }

    #[test]
    fn test_prev_day_zones_levels() {
        let mut bars = flat_day(1, 100.0);
        bars.extend(flat_day(2, 105.0));

        let zones = prev_day_zones(&bars, 5.0, 100.5);
        assert_eq!(zones.len(), 3);
        // Resistance at prior high, supports at prior low and close
        assert_eq!(zones[0].kind, ZoneKind::Resistance);
        assert_eq!(zones[0].band.mid(), 101.0);
        assert_eq!(zones[1].kind, ZoneKind::Support);
        assert_eq!(zones[1].band.mid(), 99.0);
        assert_eq!(zones[2].band.mid(), 100.0);
        assert!(zones.iter().all(|z| z.confidence == Confidence::Low));
        assert!(zones.iter().all(|z| z.has_source(ZoneSource::Fallback)));
        // Current price sits inside all three +/-5 bands here
        assert!(zones.iter().all(|z| z.touch_count == 1));
    }

    #[test]
    fn test_single_day_has_no_fallback_zones() {
        let bars = flat_day(1, 100.0);
        assert!(prev_day_zones(&bars, 5.0, 100.0).is_empty());
    }

    #[test]
    fn test_resistance_flip_tagged_as_retest() {
        // Closes hover just under the resistance band's top edge
        let bars = flat_day(1, 109.2);
        let mut zone = Zone::new(ZoneKind::Resistance, Band::new(100.0, 110.0));
        zone.subtype = ZoneSubtype::Cluster;

        let out = detect_flip_zones(vec![zone], &bars, &BuilderConfig::default(), Timeframe::M5);
        assert!(out[0].flipped);
        assert_eq!(out[0].subtype, ZoneSubtype::Retest);
    }

    #[test]
    fn test_untested_zone_keeps_subtype() {
        let bars = flat_day(1, 150.0);
        let mut zone = Zone::new(ZoneKind::Resistance, Band::new(100.0, 110.0));
        zone.subtype = ZoneSubtype::Cluster;

        let out = detect_flip_zones(vec![zone], &bars, &BuilderConfig::default(), Timeframe::M5);
        assert!(!out[0].flipped);
        assert_eq!(out[0].subtype, ZoneSubtype::Cluster);
    }

    #[test]
    fn test_overnight_age_capped_early_session() {
        // Zone last touched yesterday afternoon; evaluation at 10:00 IST
        let touched = Kolkata
            .with_ymd_and_hms(2024, 7, 1, 15, 25, 0)
            .unwrap()
            .with_timezone(&Utc);
        let now = Kolkata
            .with_ymd_and_hms(2024, 7, 2, 10, 0, 0)
            .unwrap()
            .with_timezone(&Utc);

        let mut zone = Zone::new(ZoneKind::Support, Band::new(100.0, 110.0));
        zone.last_touched = Some(touched);
        let out = enrich_zone_metadata(vec![zone], 105.0, now);

        assert_eq!(out[0].zone_age_minutes, Some(60.0));
        assert_eq!(out[0].zone_status, ZoneStatus::Inside);
    }

    #[test]
    fn test_active_zones_on_degenerate_input_is_empty() {
        assert!(active_zones(&[], None, Timeframe::M5, &BuilderConfig::default()).is_empty());
        // Flat series: no swings, so no zones from this frame
        let bars = flat_day(1, 100.0);
        assert!(active_zones(&bars, None, Timeframe::M5, &BuilderConfig::default()).is_empty());
    }

    #[test]
    fn test_active_zones_from_swinging_series() {
        // Two sessions oscillating between well-separated levels with
        // enough travel to confirm reversal swings
        let mut bars: Vec<Bar> = Vec::new();
        for day in [1, 2] {
            for i in 0..36 {
                let phase = i % 12;
                let level = if phase < 6 {
                    100.0 + phase as f64 * 8.0
                } else {
                    100.0 + (11 - phase) as f64 * 8.0
                };
                let m = (i * 5) % 60;
                let h = 10 + (i * 5) / 60;
                bars.push(bar_at(
                    day,
                    h as u32,
                    m as u32,
                    level,
                    level + 2.0,
                    level - 2.0,
                    level,
                    800.0,
                ));
            }
        }

        let zones = active_zones(&bars, None, Timeframe::M5, &BuilderConfig::default());
        assert!(!zones.is_empty());
        assert!(zones.len() <= 8);
        for z in &zones {
            assert!(z.band.low <= z.band.high);
            assert!((0.0..=10.0).contains(&z.normalized_score));
        }
    }
}
