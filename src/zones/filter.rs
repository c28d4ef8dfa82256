//! Zone filtering
//!
//! Prunes overly wide, weak, stale or crowded zones per timeframe and caps
//! the retained count. Filtering never empties a non-empty input: when
//! nothing survives, the zones nearest to price (or the highest scorers)
//! come back instead.

use crate::bars::Timeframe;
use crate::zones::model::{Confidence, Zone, ZoneSource};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Max zone span = ATR * this multiplier
    pub atr_mult_width: f64,
    /// Min gap between zones = ATR * this multiplier
    pub atr_mult_gap: f64,
    /// Gap floor in points when ATR is small or missing
    pub min_gap_floor: f64,
    pub max_zones: usize,
    pub min_score: f64,
    /// Zones older than this are stale (minutes)
    pub max_zone_age: f64,
    /// How many zones the empty-result fallback returns
    pub fallback_count: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            atr_mult_width: 1.5,
            atr_mult_gap: 1.0,
            min_gap_floor: 5.0,
            max_zones: 8,
            min_score: 2.5,
            max_zone_age: 9999.0,
            fallback_count: 3,
        }
    }
}

/// Wide bands survive only with liquidity or fallback evidence behind them
fn width_exempt(zone: &Zone) -> bool {
    zone.volume_cluster || zone.vwap_zone || zone.has_source(ZoneSource::Fallback)
}

/// Filter a scored zone set for one timeframe
pub fn filter_and_validate_zones(
    zones: Vec<Zone>,
    atr: Option<f64>,
    tf: Timeframe,
    current_price: Option<f64>,
    config: &FilterConfig,
) -> Vec<Zone> {
    if zones.is_empty() {
        return zones;
    }

    let max_span = match atr {
        Some(a) if a > 0.0 => a * config.atr_mult_width,
        _ => tf.default_max_span(),
    };
    let min_gap = (atr.unwrap_or(0.0) * config.atr_mult_gap).max(config.min_gap_floor);
    debug!(
        "Filter config tf={} max_span={:.2} min_gap={:.2}",
        tf, max_span, min_gap
    );

    let mut sorted = zones.clone();
    sorted.sort_by(|a, b| {
        a.band
            .low
            .partial_cmp(&b.band.low)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut valid: Vec<Zone> = Vec::new();

    for zone in sorted {
        let zone_id = format!(
            "{} [{:.0}-{:.0}]",
            zone.kind, zone.band.low, zone.band.high
        );

        if zone.span() > max_span && !width_exempt(&zone) {
            debug!("Dropped {} - span too wide ({:.2})", zone_id, zone.span());
            continue;
        }

        if zone.score < config.min_score && zone.confidence != Confidence::High {
            debug!("Dropped {} - score too low ({:.2})", zone_id, zone.score);
            continue;
        }

        if let Some(age) = zone.zone_age_minutes {
            if age > config.max_zone_age {
                debug!("Dropped {} - stale zone ({:.1} mins old)", zone_id, age);
                continue;
            }
        }

        if let Some(prev) = valid.last() {
            if zone.band.low - prev.band.high < min_gap {
                if zone.confidence == Confidence::Low {
                    debug!("Dropped {} - low confidence + overlap", zone_id);
                } else {
                    debug!("Dropped {} - too close to previous zone", zone_id);
                }
                continue;
            }
        }

        valid.push(zone);
        if valid.len() >= config.max_zones {
            debug!("Reached max zone count: {}", config.max_zones);
            break;
        }
    }

    // Nothing survived: fall back to the nearest (or strongest) zones so
    // the caller never sees an empty set for a non-empty input
    if valid.is_empty() {
        let mut fallback = zones;
        match current_price {
            Some(price) => {
                fallback.sort_by(|a, b| {
                    let da = (a.price - price).abs();
                    let db = (b.price - price).abs();
                    da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
                });
                warn!("No zones passed filtering - returning nearest to {:.2}", price);
            }
            None => {
                fallback.sort_by(|a, b| {
                    b.score
                        .partial_cmp(&a.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                warn!("No zones passed filtering - returning top scorers");
            }
        }
        fallback.truncate(config.fallback_count);
        info!("Selected {} fallback zone(s)", fallback.len());
        return fallback;
    }

    info!("Final zones after filtering: {}", valid.len());
    valid
}
