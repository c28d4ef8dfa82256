//! Volume profile zones
//!
//! Bins closing prices at an ATR-scaled width, sums traded volume per bin,
//! and keeps the top bins as high-liquidity bands.

use crate::bars::Bar;
use crate::zones::model::{Band, Confidence, Zone, ZoneKind, ZoneSource, ZoneSubtype};
use std::collections::BTreeMap;

/// Bin width floor in points
const DEFAULT_BIN_WIDTH: f64 = 10.0;

/// How many of the highest-volume bins become zones
const TOP_BINS: usize = 3;

/// Build volume-profile zones from a bar slice
///
/// Returns no zones when the slice is empty or carries no volume; missing
/// liquidity data is not an error.
pub fn volume_profile_zones(bars: &[Bar], atr: f64) -> Vec<Zone> {
    if bars.is_empty() {
        return Vec::new();
    }

    let total: f64 = bars.iter().map(|b| b.volume).sum();
    if total <= 0.0 {
        return Vec::new();
    }

    let bin_width = (atr / 2.0).max(DEFAULT_BIN_WIDTH);
    let price_min = bars.iter().map(|b| b.close).fold(f64::MAX, f64::min);

    let mut volume_by_bin: BTreeMap<i64, f64> = BTreeMap::new();
    for bar in bars {
        let bin = ((bar.close - price_min) / bin_width).floor() as i64;
        *volume_by_bin.entry(bin).or_insert(0.0) += bar.volume;
    }

    let mut ranked: Vec<(i64, f64)> = volume_by_bin.into_iter().collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });

    let last_touched = bars.last().map(|b| b.timestamp);

    ranked
        .into_iter()
        .filter(|(_, volume)| *volume > 0.0)
        .take(TOP_BINS)
        .map(|(bin, volume)| {
            let low = price_min + bin as f64 * bin_width;
            let mut zone = Zone::new(ZoneKind::VpZone, Band::new(low, low + bin_width));
            zone.price = (zone.band.mid() * 100.0).round() / 100.0;
            zone.total_volume = Some(volume);
            zone.volume_cluster = true;
            zone.confidence = Confidence::Medium;
            zone.subtype = ZoneSubtype::VpZone;
            zone.sources.insert(ZoneSource::Volume);
            zone.last_touched = last_touched;
            zone
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bar(i: usize, close: f64, volume: f64) -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2024, 7, 1, 4, 0, 0).unwrap()
                + Duration::minutes(5 * i as i64),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume,
        }
    }

    #[test]
    fn test_top_bins_by_volume() {
        let bars = vec![
            bar(0, 100.0, 500.0),
            bar(1, 101.0, 500.0),
            bar(2, 150.0, 300.0),
            bar(3, 200.0, 100.0),
            bar(4, 250.0, 50.0),
        ];
        let zones = volume_profile_zones(&bars, 20.0);

        assert_eq!(zones.len(), 3);
        // Heaviest bin first: the two 500-volume closes share one bin
        assert_eq!(zones[0].total_volume, Some(1000.0));
        assert!(zones[0].band.contains(100.0));
        assert!(zones.iter().all(|z| z.volume_cluster));
        assert!(zones.iter().all(|z| z.has_source(ZoneSource::Volume)));
    }

    #[test]
    fn test_zero_volume_produces_no_zones() {
        let bars = vec![bar(0, 100.0, 0.0), bar(1, 101.0, 0.0)];
        assert!(volume_profile_zones(&bars, 20.0).is_empty());
    }

    #[test]
    fn test_bin_width_scales_with_atr() {
        let bars = vec![bar(0, 100.0, 100.0), bar(1, 130.0, 200.0)];
        let zones = volume_profile_zones(&bars, 80.0);
        // ATR/2 = 40 > floor, both closes land in one 40-point bin
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].total_volume, Some(300.0));
    }
}
