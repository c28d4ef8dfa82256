//! Density clustering of swing levels into bands
//!
//! 1-D DBSCAN semantics: the neighborhood radius scales with average ATR,
//! points chain into a cluster while consecutive price gaps stay within the
//! radius, and chains below the minimum size are noise. A series that
//! produces no clusters still yields a single low-confidence band around
//! the most recent level, so downstream always has something to work with.

use crate::zones::model::{Band, Confidence, Zone, ZoneKind, ZoneSource, ZoneSubtype, DEFAULT_ATR};
use crate::zones::swing::SwingPoint;
use tracing::debug;

/// Half-width of the single-level fallback band
const FALLBACK_HALF_SPAN: f64 = 10.0;

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Neighborhood radius = average ATR * this multiplier
    pub atr_multiplier: f64,
    /// Minimum points to form a cluster
    pub min_cluster_size: usize,
    /// Discard clusters with fewer than 3 touches
    pub require_strong: bool,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            atr_multiplier: 1.0,
            min_cluster_size: 2,
            require_strong: false,
        }
    }
}

/// Cluster swing levels of one kind into zones
pub fn cluster_levels(
    kind: ZoneKind,
    levels: &[SwingPoint],
    avg_atr: f64,
    config: &ClusterConfig,
) -> Vec<Zone> {
    if levels.is_empty() {
        return Vec::new();
    }

    let atr = if avg_atr.is_nan() || avg_atr <= 0.0 {
        DEFAULT_ATR
    } else {
        avg_atr
    };
    let eps = (atr * config.atr_multiplier * 100.0).round() / 100.0;

    // Sort by price; clusters are maximal chains with gaps <= eps
    let mut order: Vec<usize> = (0..levels.len()).collect();
    order.sort_by(|&a, &b| {
        levels[a]
            .price
            .partial_cmp(&levels[b].price)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut zones = Vec::new();
    let mut chain: Vec<usize> = Vec::new();

    let flush = |chain: &mut Vec<usize>, zones: &mut Vec<Zone>| {
        if chain.len() >= config.min_cluster_size {
            let touch_count = chain.len();
            if !(config.require_strong && touch_count < 3) {
                zones.push(cluster_zone(kind, levels, chain, touch_count));
            }
        }
        chain.clear();
    };

    for &idx in &order {
        match chain.last().copied() {
            Some(prev) if levels[idx].price - levels[prev].price <= eps => chain.push(idx),
            Some(_) => {
                flush(&mut chain, &mut zones);
                chain.push(idx);
            }
            None => chain.push(idx),
        }
    }
    flush(&mut chain, &mut zones);

    // Fallback: band the most recent level so the list is never empty
    if zones.is_empty() {
        let last = levels.last().expect("levels checked non-empty");
        debug!(
            "No {} clusters at eps {:.2} - falling back to last level {:.2}",
            kind, eps, last.price
        );
        let mut zone = Zone::new(
            kind,
            Band::new(last.price - FALLBACK_HALF_SPAN, last.price + FALLBACK_HALF_SPAN),
        );
        zone.price = last.price;
        zone.touch_count = 1;
        zone.confidence = Confidence::Low;
        zone.subtype = ZoneSubtype::Cluster;
        zone.sources.insert(ZoneSource::Swing);
        zone.last_touched = Some(last.timestamp);
        zones.push(zone);
    }

    zones
}

fn cluster_zone(kind: ZoneKind, levels: &[SwingPoint], members: &[usize], touch_count: usize) -> Zone {
    let prices: Vec<f64> = members.iter().map(|&i| levels[i].price).collect();
    let low = prices.iter().cloned().fold(f64::MAX, f64::min);
    let high = prices.iter().cloned().fold(f64::MIN, f64::max);
    let mean = prices.iter().sum::<f64>() / prices.len() as f64;
    let last_touched = members.iter().map(|&i| levels[i].timestamp).max();

    let mut zone = Zone::new(kind, Band::new(low, high));
    zone.price = (mean * 100.0).round() / 100.0;
    zone.touch_count = touch_count as u32;
    zone.confidence = if touch_count >= 3 {
        Confidence::High
    } else {
        Confidence::Medium
    };
    zone.subtype = ZoneSubtype::Cluster;
    zone.sources.insert(ZoneSource::Swing);
    zone.last_touched = last_touched;
    zone
}
