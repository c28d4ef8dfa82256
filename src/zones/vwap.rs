//! Anchored VWAP zone
//!
//! Builds one band around the session's cumulative volume-weighted average
//! price. No volume means no zone.

use crate::bars::Bar;
use crate::zones::model::{Band, Confidence, Zone, ZoneKind, ZoneSource, ZoneSubtype};

/// Percent buffer around the VWAP (0.005 = +/-0.5%)
pub const DEFAULT_VWAP_BUFFER: f64 = 0.005;

/// VWAP band over the supplied session slice
pub fn vwap_zone(bars: &[Bar], buffer: f64) -> Option<Zone> {
    let total_volume: f64 = bars.iter().map(|b| b.volume).sum();
    if bars.is_empty() || total_volume <= 0.0 {
        return None;
    }

    let pv: f64 = bars.iter().map(|b| b.close * b.volume).sum();
    let vwap = pv / total_volume;

    let low = ((vwap * (1.0 - buffer)) * 100.0).round() / 100.0;
    let high = ((vwap * (1.0 + buffer)) * 100.0).round() / 100.0;

    let mut zone = Zone::new(ZoneKind::Vwap, Band::new(low, high));
    zone.price = (zone.band.mid() * 100.0).round() / 100.0;
    zone.vwap_zone = true;
    zone.confidence = Confidence::Medium;
    zone.subtype = ZoneSubtype::VwapZone;
    zone.sources.insert(ZoneSource::Vwap);
    zone.last_touched = bars.last().map(|b| b.timestamp);
    Some(zone)
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
    fn test_vwap_band_is_volume_weighted() {
        // VWAP = (100*100 + 200*300) / 400 = 175
        let bars = vec![bar(0, 100.0, 100.0), bar(1, 200.0, 300.0)];
        let zone = vwap_zone(&bars, DEFAULT_VWAP_BUFFER).unwrap();

        assert_eq!(zone.band.low, 174.13);
        assert_eq!(zone.band.high, 175.88);
        assert!(zone.vwap_zone);
        assert_eq!(zone.kind, ZoneKind::Vwap);
    }

    #[test]
    fn test_no_volume_no_zone() {
        let bars = vec![bar(0, 100.0, 0.0)];
        assert!(vwap_zone(&bars, DEFAULT_VWAP_BUFFER).is_none());
        assert!(vwap_zone(&[], DEFAULT_VWAP_BUFFER).is_none());
    }
}
