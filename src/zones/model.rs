//! Zone model
//!
//! Zones are immutable value records: every pipeline stage (enrichment,
//! scoring, filtering, merging) takes a collection and produces a new one,
//! so stages stay composable and testable in isolation.

use crate::bars::Timeframe;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Substitute volatility when an ATR is undefined or non-positive
pub const DEFAULT_ATR: f64 = 20.0;

/// Price band, low <= high always
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub low: f64,
    pub high: f64,
}

impl Band {
    pub fn new(a: f64, b: f64) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    pub fn span(&self) -> f64 {
        self.high - self.low
    }

    pub fn mid(&self) -> f64 {
        (self.low + self.high) / 2.0
    }

    pub fn contains(&self, price: f64) -> bool {
        self.low <= price && price <= self.high
    }

    /// Distance from a price to the nearest band edge (0 inside is NOT
    /// implied; callers check `contains` first where it matters)
    pub fn edge_distance(&self, price: f64) -> f64 {
        (price - self.low).abs().min((price - self.high).abs())
    }
}

/// What a zone is expected to do to price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    Support,
    Resistance,
    Vwap,
    VpZone,
}

impl std::fmt::Display for ZoneKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ZoneKind::Support => write!(f, "support"),
            ZoneKind::Resistance => write!(f, "resistance"),
            ZoneKind::Vwap => write!(f, "vwap"),
            ZoneKind::VpZone => write!(f, "vp_zone"),
        }
    }
}

/// Origin of a zone's evidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneSource {
    Swing,
    Volume,
    Vwap,
    Gap,
    Fallback,
}

/// How the zone was constructed; Retest marks a detected role flip and
/// Mixed marks a cross-timeframe merge of unlike zones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneSubtype {
    Cluster,
    SwingVolume,
    VpZone,
    VwapZone,
    Gap,
    Fallback,
    Retest,
    Primary,
    Mixed,
}

/// Ordinal confidence label (Low < Medium < High)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Where current price sits relative to the band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneStatus {
    Inside,
    Testing,
    Rejected,
    Untouched,
}

/// A support/resistance price band with its evidence and live metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub kind: ZoneKind,
    pub band: Band,
    /// Representative price (cluster mean or band midpoint)
    pub price: f64,
    pub score: f64,
    pub normalized_score: f64,
    pub confidence: Confidence,
    pub touch_count: u32,
    pub sources: BTreeSet<ZoneSource>,
    pub timeframes: BTreeSet<Timeframe>,
    pub subtype: ZoneSubtype,
    pub flipped: bool,
    pub vwap_zone: bool,
    pub volume_cluster: bool,
    /// Total traded volume for volume-profile evidence
    pub total_volume: Option<f64>,
    pub zone_age_minutes: Option<f64>,
    pub zone_status: ZoneStatus,
    pub last_touched: Option<DateTime<Utc>>,
    /// How many zones were unioned into this one (1 = unmerged)
    pub merged_from: u32,
    /// Ordered per-factor score contributions from the last scoring pass,
    /// kept on the zone for the diagnostics trail
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub score_components: Vec<(String, f64)>,
}

impl Zone {
    /// Fresh zone with neutral metadata; builders fill in their evidence
    pub fn new(kind: ZoneKind, band: Band) -> Self {
        Self {
            kind,
            price: band.mid(),
            band,
            score: 0.0,
            normalized_score: 0.0,
            confidence: Confidence::Medium,
            touch_count: 0,
            sources: BTreeSet::new(),
            timeframes: BTreeSet::new(),
            subtype: ZoneSubtype::Primary,
            flipped: false,
            vwap_zone: false,
            volume_cluster: false,
            total_volume: None,
            zone_age_minutes: None,
            zone_status: ZoneStatus::Untouched,
            last_touched: None,
            merged_from: 1,
            score_components: Vec::new(),
        }
    }

    /// Band width; always identical to `band.high - band.low`
    pub fn span(&self) -> f64 {
        self.band.span()
    }

    pub fn has_source(&self, source: ZoneSource) -> bool {
        self.sources.contains(&source)
    }
}

/// Normalize a raw score to the 0-10 display scale
pub fn normalize_score(score: f64) -> f64 {
    (score / 6.0 * 10.0).min(10.0)
}

/// Confidence label for a raw score
pub fn confidence_for_score(score: f64) -> Confidence {
    if score >= 6.0 {
        Confidence::High
    } else if score >= 2.5 {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

/// Classify price against a band: inside, testing (within 10% of the band
/// width of either edge), rejected (above), untouched (below)
pub fn zone_status(band: Band, price: f64) -> ZoneStatus {
    if band.contains(price) {
        ZoneStatus::Inside
    } else if (price - band.low).abs() <= 0.1 * band.span()
        || (price - band.high).abs() <= 0.1 * band.span()
    {
        ZoneStatus::Testing
    } else if price > band.high {
        ZoneStatus::Rejected
    } else {
        ZoneStatus::Untouched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_orders_endpoints() {
        let band = Band::new(110.0, 100.0);
        assert_eq!(band.low, 100.0);
        assert_eq!(band.high, 110.0);
        assert_eq!(band.span(), 10.0);
    }

    #[test]
    fn test_span_matches_band_width() {
        let zone = Zone::new(ZoneKind::Support, Band::new(100.0, 112.5));
        assert_eq!(zone.span(), zone.band.high - zone.band.low);
    }

    #[test]
    fn test_normalize_score_bounds() {
        assert_eq!(normalize_score(0.0), 0.0);
        assert_eq!(normalize_score(6.0), 10.0);
        assert_eq!(normalize_score(9.0), 10.0);
        // Monotonic below the cap
        assert!(normalize_score(2.0) < normalize_score(3.0));
    }

    #[test]
    fn test_zone_status_classification() {
        let band = Band::new(100.0, 110.0);
        assert_eq!(zone_status(band, 105.0), ZoneStatus::Inside);
        assert_eq!(zone_status(band, 110.5), ZoneStatus::Testing);
        assert_eq!(zone_status(band, 99.5), ZoneStatus::Testing);
        assert_eq!(zone_status(band, 120.0), ZoneStatus::Rejected);
        assert_eq!(zone_status(band, 80.0), ZoneStatus::Untouched);
    }

    #[test]
    fn test_confidence_ordering() {
        assert!(Confidence::High > Confidence::Medium);
        assert!(Confidence::Medium > Confidence::Low);
    }
}
