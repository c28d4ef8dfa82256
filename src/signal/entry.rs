//! Entry scoring and thresholding
//!
//! Scores a potential entry against candle shape, trend strength, zone
//! proximity and quality, bias agreement and pattern strength, recording
//! every factor's contribution in an ordered trail for the audit log. The
//! allow/deny threshold adapts to the volatility regime and the selected
//! zone's character.

use crate::bars::Bar;
use crate::signal::engine::OptionSide;
use crate::signal::patterns::PatternRecord;
use crate::signal::volatility::Regime;
use crate::zones::model::{Confidence, Zone, ZoneSource, ZoneSubtype};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Patterns that frequently trap late entries
const TRAP_PATTERNS: [&str; 3] = ["doji", "shooting_star", "hanging_man"];

/// How aggressively the score treats marginal setups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryMode {
    Strict,
    Normal,
    Lenient,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryConfig {
    pub mode: EntryMode,
    pub base_threshold: f64,
    pub min_threshold: f64,
    pub max_threshold: f64,
    pub highvol_adjust: f64,
    pub lowvol_adjust: f64,
    pub retest_adjust: f64,
    pub high_confidence_adjust: f64,
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            mode: EntryMode::Lenient,
            base_threshold: 0.25,
            min_threshold: 0.15,
            max_threshold: 0.7,
            highvol_adjust: -0.05,
            lowvol_adjust: 0.05,
            retest_adjust: -0.03,
            high_confidence_adjust: -0.02,
        }
    }
}

/// Everything the entry score reads for one evaluation
#[derive(Debug, Clone)]
pub struct EntryContext<'a> {
    pub price: f64,
    pub candle: &'a Bar,
    pub pattern: &'a PatternRecord,
    pub zone: Option<&'a Zone>,
    pub atr: f64,
    pub rsi: f64,
    pub ema9: f64,
    pub ema21: f64,
    pub adx: f64,
    pub direction: Option<OptionSide>,
    pub bias: Option<OptionSide>,
    pub pattern_strength: f64,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Score a potential entry; returns the total and the per-factor trail
pub fn evaluate_entry_score(
    ctx: &EntryContext<'_>,
    config: &EntryConfig,
) -> (f64, Vec<(String, f64)>) {
    let mut reasons: Vec<(String, f64)> = Vec::new();

    let Some(zone) = ctx.zone else {
        reasons.push(("zone_missing".to_string(), 0.0));
        return (0.0, reasons);
    };

    let candle = ctx.candle;
    let body = candle.body();
    let range = candle.range() + 1e-6;
    let body_ratio = body / range;
    let is_strong_body = body_ratio > 0.5;
    let strict = config.mode == EntryMode::Strict;

    // Trap candle penalty, waived for flipped zones or a trending tape
    let trap = TRAP_PATTERNS.contains(&ctx.pattern.name) && !zone.flipped && ctx.adx < 20.0;
    let trap_score = if trap {
        if strict {
            -0.1
        } else {
            -0.05
        }
    } else {
        0.0
    };
    reasons.push(("trap_candle".to_string(), trap_score));

    let body_score = if is_strong_body {
        if strict {
            0.3
        } else {
            0.2
        }
    } else {
        -0.1
    };
    reasons.push(("body_strength".to_string(), body_score));

    // Rejection wick on the entry side
    let wick_score = match ctx.direction {
        Some(OptionSide::Ce) if candle.lower_wick() > 1.2 * body => 0.1,
        Some(OptionSide::Pe) if candle.upper_wick() > 1.2 * body => 0.1,
        _ => 0.0,
    };
    reasons.push(("rejection_wick".to_string(), wick_score));

    // Trend momentum blend
    let mut trend_score = 0.0;
    if ctx.adx > 16.0 {
        trend_score += 0.1;
    }
    if ctx.direction == Some(OptionSide::Ce) && ctx.price > ctx.ema9 && ctx.ema9 > ctx.ema21 {
        trend_score += 0.1;
    }
    if ctx.direction == Some(OptionSide::Pe) && ctx.price < ctx.ema9 && ctx.ema9 < ctx.ema21 {
        trend_score += 0.1;
    }
    if (ctx.direction == Some(OptionSide::Ce) && ctx.rsi > 52.0)
        || (ctx.direction == Some(OptionSide::Pe) && ctx.rsi < 48.0)
    {
        trend_score += 0.1;
    }
    if ctx.adx > 25.0 {
        trend_score += 0.1;
    }
    reasons.push(("trend_alignment".to_string(), round2(trend_score)));

    // Proximity to the zone band
    let distance = zone.band.edge_distance(ctx.price);
    let proximity = if zone.band.contains(ctx.price) {
        0.4
    } else if distance <= 0.75 * ctx.atr {
        0.3
    } else if distance <= 1.5 * ctx.atr {
        0.15
    } else {
        -0.1
    };
    reasons.push(("zone_proximity".to_string(), proximity));

    // Zone quality
    let mut zone_bonus = 0.0;
    if zone.flipped {
        zone_bonus += 0.15;
    }
    if zone.subtype == ZoneSubtype::Retest {
        zone_bonus += 0.1;
    }
    if zone.has_source(ZoneSource::Vwap) {
        zone_bonus += 0.05;
    }
    if zone.touch_count >= 3 {
        zone_bonus += 0.05;
    }
    reasons.push(("zone_quality".to_string(), round2(zone_bonus)));

    // Bias agreement, with extra credit in a trending tape
    let mut bias_score = if ctx.bias.is_some() && ctx.direction == ctx.bias {
        0.1
    } else {
        0.0
    };
    if ctx.adx > 22.0 {
        bias_score += 0.1;
    }
    reasons.push(("bias_alignment".to_string(), round2(bias_score)));

    let pattern_score = if ctx.pattern_strength >= 0.6 {
        round2((ctx.pattern_strength * 0.3).min(0.3))
    } else {
        0.0
    };
    reasons.push(("pattern_strength".to_string(), pattern_score));

    let score = round2(reasons.iter().map(|(_, v)| v).sum());
    debug!(
        "Entry score {:.2} | subtype={:?} flipped={} touches={}",
        score, zone.subtype, zone.flipped, zone.touch_count
    );
    (score, reasons)
}

/// Regime- and zone-adjusted entry threshold, clamped to a sane band
pub fn entry_threshold(regime: Regime, zone: Option<&Zone>, config: &EntryConfig) -> f64 {
    let mut threshold = config.base_threshold;

    match regime {
        Regime::HighVol => threshold += config.highvol_adjust,
        Regime::LowVol => threshold += config.lowvol_adjust,
        Regime::Normal => {}
    }

    if let Some(zone) = zone {
        if zone.subtype == ZoneSubtype::Retest {
            threshold += config.retest_adjust;
        }
        if zone.confidence == Confidence::High {
            threshold += config.high_confidence_adjust;
        }
    }

    round2(threshold.clamp(config.min_threshold, config.max_threshold))
}

/// Decide whether an entry score clears the adjusted threshold
pub fn is_entry_allowed(score: f64, regime: Regime, zone: Option<&Zone>, config: &EntryConfig) -> bool {
    let threshold = entry_threshold(regime, zone, config);
    let allowed = score >= threshold;
    debug!(
        "Entry check score={:.2} threshold={:.2} allowed={}",
        score, threshold, allowed
    );
    allowed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::patterns::NO_PATTERN;
    use crate::zones::model::{Band, Zone, ZoneKind};
    use chrono::{TimeZone, Utc};

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2024, 7, 1, 6, 0, 0).unwrap(),
            open,
            high,
            low,
            close,
            volume: 1000.0,
        }
    }

    fn support_zone(low: f64, high: f64) -> Zone {
        Zone::new(ZoneKind::Support, Band::new(low, high))
    }

    fn ctx<'a>(
        price: f64,
        candle: &'a Bar,
        zone: Option<&'a Zone>,
        atr: f64,
    ) -> EntryContext<'a> {
        EntryContext {
            price,
            candle,
            pattern: &NO_PATTERN,
            zone,
            atr,
            rsi: 50.0,
            ema9: price,
            ema21: price,
            adx: 10.0,
            direction: Some(OptionSide::Ce),
            bias: None,
            pattern_strength: 0.0,
        }
    }

    #[test]
    fn test_inside_band_proximity_is_04() {
        let zone = support_zone(100.0, 110.0);
        let candle = candle(104.0, 106.0, 103.0, 105.5);
        let (_, reasons) = evaluate_entry_score(
            &ctx(105.0, &candle, Some(&zone), 20.0),
            &EntryConfig::default(),
        );
        let proximity = reasons
            .iter()
            .find(|(n, _)| n == "zone_proximity")
            .unwrap()
            .1;
        assert_eq!(proximity, 0.4);
    }

    #[test]
    fn test_proximity_tiers_scale_with_atr() {
        let zone = support_zone(100.0, 110.0);
        let candle = candle(104.0, 106.0, 103.0, 105.5);
        let config = EntryConfig::default();

        let proximity_at = |price: f64| {
            let (_, reasons) =
                evaluate_entry_score(&ctx(price, &candle, Some(&zone), 20.0), &config);
            reasons.iter().find(|(n, _)| n == "zone_proximity").unwrap().1
        };

        assert_eq!(proximity_at(120.0), 0.3); // 10 points <= 0.75 * 20
        assert_eq!(proximity_at(135.0), 0.15); // 25 points <= 1.5 * 20
        assert_eq!(proximity_at(150.0), -0.1); // beyond 1.5 * ATR
    }

    #[test]
    fn test_missing_zone_scores_zero() {
        let candle = candle(104.0, 106.0, 103.0, 105.5);
        let (score, reasons) = evaluate_entry_score(
            &ctx(105.0, &candle, None, 20.0),
            &EntryConfig::default(),
        );
        assert_eq!(score, 0.0);
        assert_eq!(reasons.len(), 1);
        assert_eq!(reasons[0].0, "zone_missing");
    }

    #[test]
    fn test_highvol_retest_highconf_threshold_floor() {
        let mut zone = support_zone(100.0, 110.0);
        zone.subtype = ZoneSubtype::Retest;
        zone.confidence = Confidence::High;
        let config = EntryConfig::default();

        // 0.25 - 0.05 - 0.03 - 0.02 = 0.15, exactly the floor
        assert_eq!(entry_threshold(Regime::HighVol, Some(&zone), &config), 0.15);
        assert!(is_entry_allowed(0.15, Regime::HighVol, Some(&zone), &config));
        assert!(!is_entry_allowed(0.14, Regime::HighVol, Some(&zone), &config));
    }

    #[test]
    fn test_lowvol_raises_threshold() {
        let config = EntryConfig::default();
        assert_eq!(entry_threshold(Regime::LowVol, None, &config), 0.3);
        assert_eq!(entry_threshold(Regime::Normal, None, &config), 0.25);
    }

    #[test]
    fn test_trap_candle_penalty_waived_when_flipped() {
        let doji = PatternRecord {
            name: "doji",
            bias: crate::signal::patterns::PatternBias::Neutral,
            strength: 0.4,
        };
        let candle = candle(105.0, 106.0, 104.0, 105.05);
        let zone = support_zone(100.0, 110.0);
        let mut flipped_zone = support_zone(100.0, 110.0);
        flipped_zone.flipped = true;
        let config = EntryConfig::default();

        let trap_component = |z: &Zone| {
            let mut c = ctx(105.0, &candle, None, 20.0);
            c.zone = Some(z);
            c.pattern = &doji;
            let (_, reasons) = evaluate_entry_score(&c, &config);
            reasons.iter().find(|(n, _)| n == "trap_candle").unwrap().1
        };

        assert_eq!(trap_component(&zone), -0.05);
        assert_eq!(trap_component(&flipped_zone), 0.0);
    }
}
