//! Cross-timeframe zone merging
//!
//! Flattens the per-timeframe filtered zone lists and greedily unions
//! zones whose band edges sit within a volatility-scaled proximity. One
//! pass, seeded in band order; merging the output of a single timeframe
//! with itself reproduces the same bands.

use crate::bars::{Bar, Timeframe};
use crate::zones::builder::{active_zones, mean_range_atr, BuilderConfig};
use crate::zones::model::{normalize_score, Band, Zone, ZoneStatus, ZoneSubtype};
use tracing::{debug, info};

/// Proximity floor in points
const MIN_MERGE_PROXIMITY: f64 = 15.0;

/// Fraction of average ATR used as merge proximity
const MERGE_ATR_FACTOR: f64 = 0.75;

/// Merge per-timeframe zone lists into one unified list
pub fn merge_timeframe_zones(zones_by_tf: Vec<(Timeframe, Vec<Zone>)>, proximity: f64) -> Vec<Zone> {
    let mut all_zones: Vec<Zone> = Vec::new();
    for (tf, zones) in zones_by_tf {
        for mut zone in zones {
            zone.timeframes.insert(tf);
            all_zones.push(zone);
        }
    }

    all_zones.sort_by(|a, b| {
        a.band
            .low
            .partial_cmp(&b.band.low)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut merged_zones: Vec<Zone> = Vec::new();
    let mut seen = vec![false; all_zones.len()];

    for i in 0..all_zones.len() {
        if seen[i] {
            continue;
        }
        let seed_band = all_zones[i].band;
        let mut members: Vec<&Zone> = vec![&all_zones[i]];

        for j in (i + 1)..all_zones.len() {
            if seen[j] {
                continue;
            }
            let other = all_zones[j].band;
            if (seed_band.low - other.low).abs() <= proximity
                || (seed_band.high - other.high).abs() <= proximity
            {
                members.push(&all_zones[j]);
                seen[j] = true;
            }
        }

        merged_zones.push(merge_members(&members));
    }

    merged_zones
}

fn merge_members(members: &[&Zone]) -> Zone {
    let first = members[0];
    if members.len() == 1 {
        return first.clone();
    }

    let low = members.iter().map(|z| z.band.low).fold(f64::MAX, f64::min);
    let high = members.iter().map(|z| z.band.high).fold(f64::MIN, f64::max);
    let band = Band::new(low, high);

    let score = members.iter().map(|z| z.score).sum::<f64>() / members.len() as f64;

    let mut zone = Zone::new(first.kind, band);
    zone.price = (band.mid() * 100.0).round() / 100.0;
    zone.score = (score * 100.0).round() / 100.0;
    zone.normalized_score = normalize_score(zone.score);
    zone.confidence = members
        .iter()
        .map(|z| z.confidence)
        .max()
        .unwrap_or(first.confidence);
    zone.touch_count = members.iter().map(|z| z.touch_count).sum();
    zone.zone_age_minutes = members
        .iter()
        .filter_map(|z| z.zone_age_minutes)
        .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    zone.last_touched = members.iter().filter_map(|z| z.last_touched).max();
    zone.flipped = members.iter().any(|z| z.flipped);
    zone.vwap_zone = members.iter().any(|z| z.vwap_zone);
    zone.volume_cluster = members.iter().any(|z| z.volume_cluster);
    zone.merged_from = members.len() as u32;

    for member in members {
        zone.sources.extend(member.sources.iter().cloned());
        zone.timeframes.extend(member.timeframes.iter().cloned());
    }

    zone.subtype = if members.iter().all(|z| z.subtype == first.subtype) {
        first.subtype
    } else {
        ZoneSubtype::Mixed
    };

    zone.zone_status = if members.iter().any(|z| z.zone_status == ZoneStatus::Inside) {
        ZoneStatus::Inside
    } else if members.iter().any(|z| z.zone_status == ZoneStatus::Testing) {
        ZoneStatus::Testing
    } else {
        ZoneStatus::Untouched
    };

    // Volume magnitude carries over when any member brought it
    zone.total_volume = members
        .iter()
        .filter_map(|z| z.total_volume)
        .max_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    debug!(
        "Merged {} zones into [{:.2}-{:.2}] subtype={:?} flipped={}",
        members.len(),
        band.low,
        band.high,
        zone.subtype,
        zone.flipped
    );

    zone
}

/// Run zone detection on every timeframe and merge the results
///
/// `frames` pairs each timeframe's index bars with optional futures bars.
/// A frame that produces nothing contributes zero zones without aborting
/// the merge. The merged list comes back sorted by normalized score.
pub fn build_zones_multi_tf(
    frames: &[(Timeframe, Vec<Bar>, Option<Vec<Bar>>)],
    config: &BuilderConfig,
    top_n: Option<usize>,
) -> Vec<Zone> {
    let mut atrs: Vec<f64> = Vec::new();
    let mut zones_by_tf: Vec<(Timeframe, Vec<Zone>)> = Vec::new();

    for (tf, bars, fut_bars) in frames {
        if !bars.is_empty() {
            atrs.push(mean_range_atr(bars, 14));
        }
        let zones = active_zones(bars, fut_bars.as_deref(), *tf, config);
        info!("[{}] Zones generated: {}", tf, zones.len());
        zones_by_tf.push((*tf, zones));
    }

    let avg_atr = if atrs.is_empty() {
        crate::zones::model::DEFAULT_ATR
    } else {
        atrs.iter().sum::<f64>() / atrs.len() as f64
    };
    let proximity = (avg_atr * MERGE_ATR_FACTOR).max(MIN_MERGE_PROXIMITY);

    let mut merged = merge_timeframe_zones(zones_by_tf, proximity);
    info!("Total merged zones: {}", merged.len());

    merged.sort_by(|a, b| {
        b.normalized_score
            .partial_cmp(&a.normalized_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    if let Some(n) = top_n {
        merged.truncate(n);
        info!("Top {} zones retained", n);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zones::model::{Confidence, ZoneKind, ZoneSource};

    fn zone(low: f64, high: f64, score: f64, kind: ZoneKind) -> Zone {
        let mut z = Zone::new(kind, Band::new(low, high));
        z.score = score;
        z.normalized_score = normalize_score(score);
        z.subtype = ZoneSubtype::Cluster;
        z.sources.insert(ZoneSource::Swing);
        z.touch_count = 2;
        z
    }

    #[test]
    fn test_nearby_bands_union_across_timeframes() {
        let m5 = vec![zone(100.0, 110.0, 4.0, ZoneKind::Support)];
        let m15 = vec![zone(105.0, 118.0, 6.0, ZoneKind::Support)];

        let merged = merge_timeframe_zones(
            vec![(Timeframe::M5, m5), (Timeframe::M15, m15)],
            15.0,
        );

        assert_eq!(merged.len(), 1);
        let z = &merged[0];
        assert_eq!(z.band.low, 100.0);
        assert_eq!(z.band.high, 118.0);
        assert_eq!(z.score, 5.0);
        assert_eq!(z.merged_from, 2);
        assert_eq!(z.touch_count, 4);
        assert_eq!(z.timeframes.len(), 2);
        assert_eq!(z.subtype, ZoneSubtype::Cluster);
    }

    #[test]
    fn test_distant_bands_stay_separate() {
        let m5 = vec![zone(100.0, 110.0, 4.0, ZoneKind::Support)];
        let h1 = vec![zone(200.0, 210.0, 4.0, ZoneKind::Resistance)];

        let merged = merge_timeframe_zones(
            vec![(Timeframe::M5, m5), (Timeframe::H1, h1)],
            15.0,
        );
        assert_eq!(merged.len(), 2);
        assert!(merged.iter().all(|z| z.merged_from == 1));
    }

    #[test]
    fn test_merge_is_idempotent_on_single_source() {
        let zones = vec![
            zone(100.0, 110.0, 4.0, ZoneKind::Support),
            zone(200.0, 210.0, 5.0, ZoneKind::Resistance),
        ];
        let once = merge_timeframe_zones(vec![(Timeframe::M5, zones)], 15.0);
        let bands: Vec<Band> = once.iter().map(|z| z.band).collect();

        let again = merge_timeframe_zones(vec![(Timeframe::M5, once)], 15.0);
        let bands_again: Vec<Band> = again.iter().map(|z| z.band).collect();
        assert_eq!(bands, bands_again);
    }

    #[test]
    fn test_unlike_subtypes_become_mixed() {
        let mut vwap = zone(102.0, 112.0, 3.0, ZoneKind::Vwap);
        vwap.subtype = ZoneSubtype::VwapZone;
        vwap.vwap_zone = true;
        let cluster = zone(100.0, 110.0, 4.0, ZoneKind::Support);

        let merged = merge_timeframe_zones(
            vec![(Timeframe::M5, vec![cluster, vwap])],
            15.0,
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].subtype, ZoneSubtype::Mixed);
        assert!(merged[0].vwap_zone);
        // Ordinal confidence: both Medium stays Medium
        assert_eq!(merged[0].confidence, Confidence::Medium);
    }
}
