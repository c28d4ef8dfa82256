//! Zone strength scoring
//!
//! Additive multi-factor scoring with every weight in one named config so
//! tests can vary a single knob. The raw score is normalized to 0-10 and
//! mapped to a confidence label; when an entire set scores weak, the zone
//! nearest to price is boosted so an evaluation always has one usable zone.

use crate::zones::model::{
    confidence_for_score, normalize_score, Confidence, Zone, ZoneSource, ZoneStatus, ZoneSubtype,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Age assumed for zones that were never touched
const UNKNOWN_AGE_MINUTES: f64 = 9999.0;

/// Every scoring weight and threshold in one place
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreWeights {
    /// Credit per touch for cluster-backed zones
    pub touch_unit: f64,
    /// Touches counted toward the credit
    pub touch_cap: u32,
    /// Recency credit at age zero
    pub recency_weight: f64,
    /// Floor fraction of the recency credit
    pub recency_floor: f64,
    /// Ages beyond this stop decaying further (minutes)
    pub recency_age_cap: f64,
    /// Decay denominator (minutes); floor is reached at the age cap
    pub recency_scale: f64,
    pub multi_tf_weight: f64,
    pub source_diversity_weight: f64,
    pub vwap_tag_bonus: f64,
    pub volume_tag_bonus: f64,
    /// Volume divisor for the magnitude credit
    pub volume_unit: f64,
    pub volume_cap: f64,
    pub status_inside: f64,
    pub status_testing: f64,
    pub status_rejected: f64,
    pub flip_bonus: f64,
    /// Spans wider than this are penalized (points)
    pub span_limit: f64,
    pub span_penalty: f64,
    /// Ages beyond this are penalized (minutes)
    pub stale_age_limit: f64,
    pub stale_penalty: f64,
    /// Multiplier applied to fallback-sourced zones
    pub fallback_factor: f64,
    /// Below this every zone counts as weak
    pub weak_threshold: f64,
    /// Boost given to the nearest zone when all are weak
    pub weak_boost: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            touch_unit: 0.5,
            touch_cap: 2,
            recency_weight: 1.5,
            recency_floor: 0.2,
            recency_age_cap: 720.0,
            recency_scale: 900.0,
            multi_tf_weight: 1.0,
            source_diversity_weight: 0.8,
            vwap_tag_bonus: 0.5,
            volume_tag_bonus: 0.5,
            volume_unit: 100_000.0,
            volume_cap: 1.2,
            status_inside: 1.2,
            status_testing: 1.0,
            status_rejected: 0.2,
            flip_bonus: 0.5,
            span_limit: 60.0,
            span_penalty: -0.1,
            stale_age_limit: 720.0,
            stale_penalty: -0.1,
            fallback_factor: 0.75,
            weak_threshold: 2.5,
            weak_boost: 1.2,
        }
    }
}

fn score_one(zone: &Zone, weights: &ScoreWeights) -> (f64, Vec<(String, f64)>) {
    let mut components: Vec<(String, f64)> = Vec::new();
    let push = |components: &mut Vec<(String, f64)>, name: &str, value: f64| {
        components.push((name.to_string(), value));
        value
    };

    let mut score = 0.0;

    // Touch count only counts for swing-cluster evidence
    let touch = if matches!(zone.subtype, ZoneSubtype::Cluster | ZoneSubtype::SwingVolume) {
        zone.touch_count.min(weights.touch_cap) as f64 * weights.touch_unit
    } else {
        0.0
    };
    score += push(&mut components, "touch", touch);

    // Recency decays linearly to the floor by the age cap
    let age = zone.zone_age_minutes.unwrap_or(UNKNOWN_AGE_MINUTES);
    let recency_frac = (1.0 - age.min(weights.recency_age_cap) / weights.recency_scale)
        .max(weights.recency_floor);
    score += push(&mut components, "recency", recency_frac * weights.recency_weight);

    let tf_score =
        (zone.timeframes.len() as f64 / 3.0).min(1.0) * weights.multi_tf_weight;
    score += push(&mut components, "multi_tf", tf_score);

    let source_score =
        (zone.sources.len() as f64 / 3.0).min(1.0) * weights.source_diversity_weight;
    score += push(&mut components, "source_diversity", source_score);

    let vwap_bonus = if zone.vwap_zone { weights.vwap_tag_bonus } else { 0.0 };
    score += push(&mut components, "vwap_tag", vwap_bonus);
    let volume_bonus = if zone.volume_cluster { weights.volume_tag_bonus } else { 0.0 };
    score += push(&mut components, "volume_tag", volume_bonus);

    let volume_strength = match (zone.volume_cluster, zone.total_volume) {
        (true, Some(v)) if v > 0.0 => (v / weights.volume_unit).min(weights.volume_cap),
        _ => 0.0,
    };
    score += push(&mut components, "volume_strength", volume_strength);

    let status_score = match zone.zone_status {
        ZoneStatus::Inside => weights.status_inside,
        ZoneStatus::Testing => weights.status_testing,
        ZoneStatus::Rejected => weights.status_rejected,
        ZoneStatus::Untouched => 0.0,
    };
    score += push(&mut components, "status", status_score);

    let flip_score = if zone.flipped || zone.subtype == ZoneSubtype::Retest {
        weights.flip_bonus
    } else {
        0.0
    };
    score += push(&mut components, "flip_retest", flip_score);

    let span_penalty = if zone.span() > weights.span_limit {
        weights.span_penalty
    } else {
        0.0
    };
    score += push(&mut components, "span_penalty", span_penalty);

    let age_penalty = if age > weights.stale_age_limit {
        weights.stale_penalty
    } else {
        0.0
    };
    score += push(&mut components, "age_penalty", age_penalty);

    if zone.has_source(ZoneSource::Fallback) {
        let penalty = score * (weights.fallback_factor - 1.0);
        score *= weights.fallback_factor;
        push(&mut components, "fallback_penalty", penalty);
    }

    (score, components)
}

/// Score a zone set against the current price, returning a new collection
pub fn score_zones(zones: Vec<Zone>, current_price: f64, weights: &ScoreWeights) -> Vec<Zone> {
    let mut scored: Vec<Zone> = zones
        .into_iter()
        .map(|zone| {
            let (score, components) = score_one(&zone, weights);
            let mut z = zone;
            z.score = score;
            z.normalized_score = normalize_score(score);
            z.confidence = confidence_for_score(score);
            z.score_components = components;
            z
        })
        .collect();

    // When nothing qualifies, boost the zone nearest to price so the
    // evaluation still has one usable candidate
    if !scored.is_empty() && scored.iter().all(|z| z.score < weights.weak_threshold) {
        let nearest = scored
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                let da = (a.price - current_price).abs();
                let db = (b.price - current_price).abs();
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, _)| i)
            .expect("non-empty scored set");

        let z = &mut scored[nearest];
        z.score += weights.weak_boost;
        z.normalized_score = normalize_score(z.score);
        z.confidence = Confidence::Medium;
        z.score_components
            .push(("fallback_boost".to_string(), weights.weak_boost));
        info!(
            "Weak zone set - boosted nearest zone at {:.2} to score {:.2}",
            z.price, z.score
        );
    }

    for z in &scored {
        debug!(
            "{} @ {:.2} | score={:.2} norm={:.2} | status={:?} | subtype={:?} | sources={:?}",
            z.kind, z.price, z.score, z.normalized_score, z.zone_status, z.subtype, z.sources
        );
    }

    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zones::model::{Band, Zone, ZoneKind};

    fn base_zone(low: f64, high: f64) -> Zone {
        let mut z = Zone::new(ZoneKind::Support, Band::new(low, high));
        z.zone_age_minutes = Some(0.0);
        z
    }

    #[test]
    fn test_touch_credit_only_for_cluster_subtypes() {
        let weights = ScoreWeights::default();

        let mut cluster = base_zone(100.0, 110.0);
        cluster.subtype = ZoneSubtype::Cluster;
        cluster.touch_count = 5;

        let mut vp = base_zone(100.0, 110.0);
        vp.subtype = ZoneSubtype::VpZone;
        vp.touch_count = 5;

        let (cluster_score, comps) = score_one(&cluster, &weights);
        let (vp_score, _) = score_one(&vp, &weights);
        // Capped at 2 touches * 0.5
        assert_eq!(comps.iter().find(|(n, _)| n == "touch").unwrap().1, 1.0);
        assert_eq!(cluster_score - vp_score, 1.0);
    }

    #[test]
    fn test_recency_decay_to_floor() {
        let weights = ScoreWeights::default();
        let recency = |age: Option<f64>| {
            let mut z = base_zone(100.0, 110.0);
            z.zone_age_minutes = age;
            let (_, comps) = score_one(&z, &weights);
            comps.iter().find(|(n, _)| n == "recency").unwrap().1
        };

        assert_eq!(recency(Some(0.0)), 1.5);
        assert!((recency(Some(360.0)) - 0.9).abs() < 1e-9);
        assert!((recency(Some(720.0)) - 0.3).abs() < 1e-9);
        // Never below the floor, even for unknown/ancient ages
        assert!((recency(None) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_fallback_source_is_penalized_multiplicatively() {
        let weights = ScoreWeights::default();
        let mut plain = base_zone(100.0, 110.0);
        plain.zone_status = ZoneStatus::Inside;

        let mut fallback = plain.clone();
        fallback.sources.insert(ZoneSource::Fallback);

        let (plain_score, _) = score_one(&plain, &weights);
        let (fallback_score, _) = score_one(&fallback, &weights);
        // Fallback adds source diversity before the multiplier, so compare
        // against its own pre-penalty sum
        let pre_penalty = plain_score + weights.source_diversity_weight / 3.0;
        assert!((fallback_score - pre_penalty * 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_weak_set_boosts_nearest_zone() {
        let far = base_zone(300.0, 310.0);
        let near = base_zone(100.0, 110.0);
        let scored = score_zones(vec![far, near], 104.0, &ScoreWeights::default());

        assert!(scored.iter().any(|z| z
            .score_components
            .iter()
            .any(|(n, _)| n == "fallback_boost")));
        let boosted = scored
            .iter()
            .find(|z| z.score_components.iter().any(|(n, _)| n == "fallback_boost"))
            .unwrap();
        assert_eq!(boosted.price, 105.0);
        assert_eq!(boosted.confidence, Confidence::Medium);
        // Normalized score stays consistent with the boosted raw score
        assert!((boosted.normalized_score - normalize_score(boosted.score)).abs() < 1e-9);
    }

    #[test]
    fn test_normalized_monotonic_in_score() {
        let weights = ScoreWeights::default();
        let mut weak = base_zone(100.0, 110.0);
        weak.zone_age_minutes = Some(720.0);
        let mut strong = weak.clone();
        strong.zone_status = ZoneStatus::Inside;
        strong.flipped = true;

        let scored = score_zones(vec![weak, strong], 500.0, &weights);
        assert!(scored[1].score > scored[0].score);
        assert!(scored[1].normalized_score >= scored[0].normalized_score);
        assert!(scored.iter().all(|z| (0.0..=10.0).contains(&z.normalized_score)));
    }
}
