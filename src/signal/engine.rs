//! Trade signal engine
//!
//! Combines pattern detection, trend/bias inference, the volatility
//! regime, and zone selection into one decision record per evaluation
//! cycle. The record carries the full per-factor reason trail so every
//! allow/deny can be audited after the fact.

use crate::bars::Bar;
use crate::indicators::IndicatorBar;
use crate::signal::entry::{
    entry_threshold, evaluate_entry_score, is_entry_allowed, EntryConfig, EntryContext,
};
use crate::signal::patterns::{detect_patterns, PatternBias, PatternRecord, NO_PATTERN};
use crate::signal::volatility::{
    atr_percentile, bollinger_width, volatility_regime, Regime, ATR_PERCENTILE_WINDOW,
    BOLLINGER_WINDOW,
};
use crate::zones::model::{Confidence, Zone, ZoneKind, ZoneSubtype};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

/// Option side of a trade: call entry or put entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionSide {
    #[serde(rename = "CE")]
    Ce,
    #[serde(rename = "PE")]
    Pe,
}

impl std::fmt::Display for OptionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionSide::Ce => write!(f, "CE"),
            OptionSide::Pe => write!(f, "PE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Sideways,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::Up => write!(f, "up"),
            Trend::Down => write!(f, "down"),
            Trend::Sideways => write!(f, "sideways"),
        }
    }
}

/// Strike-selection hint for the order-placement collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrikeHint {
    #[serde(rename = "ATM")]
    Atm,
    #[serde(rename = "OTM_CE")]
    OtmCe,
    #[serde(rename = "OTM_PE")]
    OtmPe,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub entry: EntryConfig,
    /// EMA spread percent that separates trending from sideways
    pub trend_threshold_pct: f64,
    /// Bars the EMA stack must hold for the inertia bonus
    pub inertia_window: usize,
    pub inertia_bonus: f64,
    /// Pattern strength needed for the no-clean-zone override
    pub fallback_pattern_strength: f64,
    /// Inertia needed for the no-clean-zone override
    pub fallback_inertia: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            entry: EntryConfig::default(),
            trend_threshold_pct: 0.1,
            inertia_window: 3,
            inertia_bonus: 0.15,
            fallback_pattern_strength: 0.75,
            fallback_inertia: 0.1,
        }
    }
}

/// Indicator values the decision was based on
#[derive(Debug, Clone, Serialize)]
pub struct IndicatorSnapshot {
    pub rsi: f64,
    pub ema9: f64,
    pub ema21: f64,
    pub adx: f64,
    pub atr: f64,
}

/// One evaluation cycle's decision record; created once, never mutated
#[derive(Debug, Clone, Serialize)]
pub struct TradeSignal {
    pub id: Uuid,
    pub direction: Option<OptionSide>,
    pub strike: StrikeHint,
    pub confidence: Confidence,
    pub pattern: PatternRecord,
    pub pattern_strength: f64,
    pub zone: Option<Zone>,
    pub trend: Trend,
    pub regime: Regime,
    pub bias: Option<OptionSide>,
    pub allowed: bool,
    pub entry_score: f64,
    pub threshold: f64,
    /// Ordered factor-name -> contribution trail
    pub entry_reasons: Vec<(String, f64)>,
    pub reason: String,
    pub debug_reason: String,
    pub indicators: IndicatorSnapshot,
    pub signal_time: DateTime<Utc>,
}

/// EMA9 vs EMA21 spread against a percent threshold
pub fn infer_trend(indicators: &[IndicatorBar], threshold_pct: f64) -> Trend {
    let Some(last) = indicators.last() else {
        return Trend::Sideways;
    };
    if last.ema21 == 0.0 || last.ema21.is_nan() {
        return Trend::Sideways;
    }
    let diff_pct = (last.ema9 - last.ema21) / last.ema21 * 100.0;
    if diff_pct > threshold_pct {
        Trend::Up
    } else if diff_pct < -threshold_pct {
        Trend::Down
    } else {
        Trend::Sideways
    }
}

/// Rule cascade combining trend, RSI band, and pattern alignment
pub fn infer_bias(
    indicators: &[IndicatorBar],
    pattern: &PatternRecord,
    config: &EngineConfig,
) -> Option<OptionSide> {
    let last = indicators.last()?;
    let trend = infer_trend(indicators, config.trend_threshold_pct);
    let rsi = last.rsi;

    // Priority 1: strong trend confirmation
    if trend == Trend::Up && rsi > 52.0 {
        return Some(OptionSide::Ce);
    }
    if trend == Trend::Down && rsi < 45.0 {
        return Some(OptionSide::Pe);
    }

    // Priority 2: pattern confirmation in the trend direction
    if trend == Trend::Down && (45.0..=50.0).contains(&rsi) && pattern.bias == PatternBias::Bearish {
        return Some(OptionSide::Pe);
    }
    if trend == Trend::Up && (50.0..=52.0).contains(&rsi) && pattern.bias == PatternBias::Bullish {
        return Some(OptionSide::Ce);
    }

    // Priority 3: sideways market with strong confirmation
    if trend == Trend::Sideways {
        if rsi < 45.0 && pattern.bias == PatternBias::Bearish {
            return Some(OptionSide::Pe);
        }
        if rsi > 55.0 && pattern.bias == PatternBias::Bullish {
            return Some(OptionSide::Ce);
        }
    }

    // Priority 4: strong pattern override
    if pattern.strength >= 0.8 {
        return match pattern.bias {
            PatternBias::Bullish => Some(OptionSide::Ce),
            PatternBias::Bearish => Some(OptionSide::Pe),
            PatternBias::Neutral => None,
        };
    }

    None
}

/// Pick the highest-weighted candidate zone of one kind: score less a
/// distance drag, plus flip/retest/confidence/bias-alignment credits
pub fn select_best_zone<'a>(
    zones: &'a [Zone],
    price: f64,
    kind: ZoneKind,
    bias: Option<OptionSide>,
) -> Option<&'a Zone> {
    let bias_aligned = |zone_kind: ZoneKind| match (bias, zone_kind) {
        (Some(OptionSide::Ce), ZoneKind::Support) => true,
        (Some(OptionSide::Pe), ZoneKind::Resistance) => true,
        _ => false,
    };

    zones
        .iter()
        .filter(|z| z.kind == kind)
        .map(|z| {
            let proximity = (z.band.mid() - price).abs();
            let mut weight = z.score - proximity * 0.01;
            if z.flipped {
                weight += 0.2;
            }
            if z.subtype == ZoneSubtype::Retest {
                weight += 0.1;
            }
            if z.confidence == Confidence::High {
                weight += 0.1;
            }
            if bias_aligned(z.kind) {
                weight += 0.1;
            }
            (z, weight)
        })
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(z, _)| z)
}

/// Bonus for an EMA stack held over the trailing window
pub fn compute_trend_inertia(
    indicators: &[IndicatorBar],
    direction: Option<OptionSide>,
    config: &EngineConfig,
) -> f64 {
    let window = config.inertia_window;
    if indicators.len() < window + 1 {
        return 0.0;
    }
    let recent = &indicators[indicators.len() - window..];
    match direction {
        Some(OptionSide::Ce) if recent.iter().all(|r| r.ema9 > r.ema21) => config.inertia_bonus,
        Some(OptionSide::Pe) if recent.iter().all(|r| r.ema9 < r.ema21) => config.inertia_bonus,
        _ => 0.0,
    }
}

/// Volatility-scaled proximity check used to veto reversal patterns far
/// from their zone
pub fn is_valid_proximity(price: f64, zone: &Zone, atr: f64, entry_score: f64, adx: f64) -> bool {
    let distance = (price - zone.band.mid()).abs();

    let mut buffer = 0.5 * atr;
    // High-conviction setups and strong trends get more room
    if entry_score > 0.9 || adx > 35.0 {
        buffer = atr;
    }
    // Very wide zones get a little extra tolerance, capped
    if zone.span() > 2.0 * atr {
        buffer = (buffer * 1.2).min(atr * 1.5);
    }

    distance <= buffer
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn nan_to(v: f64, default: f64) -> f64 {
    if v.is_nan() {
        default
    } else {
        v
    }
}

/// Run one full evaluation cycle over the latest bars, indicators and
/// merged zones
pub fn generate_trade_signal(
    index_bars: &[Bar],
    indicators: &[IndicatorBar],
    zones: &[Zone],
    config: &EngineConfig,
) -> TradeSignal {
    let (Some(latest), Some(last_ind)) = (index_bars.last(), indicators.last()) else {
        warn!("Signal engine called without bars - emitting inert record");
        return inert_signal();
    };
    let price = latest.close;

    // Pattern detection
    let pattern = detect_patterns(index_bars);
    let mut pattern_strength = pattern.strength;
    info!(
        "Pattern {} detected | strength={:.2}",
        pattern.name, pattern_strength
    );

    // Volatility regime
    let closes: Vec<f64> = index_bars.iter().map(|b| b.close).collect();
    let bb = bollinger_width(&closes, BOLLINGER_WINDOW);
    let atr_values: Vec<f64> = indicators.iter().map(|r| r.atr).collect();
    let atr_pct = atr_percentile(&atr_values, ATR_PERCENTILE_WINDOW);
    let regime = volatility_regime(
        atr_pct.last().copied().unwrap_or(f64::NAN),
        bb.last().copied().unwrap_or(f64::NAN),
    );

    // Trend + bias
    let trend = infer_trend(indicators, config.trend_threshold_pct);
    let bias = infer_bias(indicators, &pattern, config);
    let direction = bias;

    // Zone selection per direction
    let support_zone = select_best_zone(zones, price, ZoneKind::Support, bias);
    let resistance_zone = select_best_zone(zones, price, ZoneKind::Resistance, bias);
    let selected_zone = match direction {
        Some(OptionSide::Ce) => support_zone,
        Some(OptionSide::Pe) => resistance_zone,
        None => None,
    };

    match selected_zone {
        Some(zone) => info!(
            "Zone selected {} | band [{:.2}-{:.2}] | score {:.2}",
            zone.kind, zone.band.low, zone.band.high, zone.score
        ),
        None => warn!("No suitable zone near price {:.2}", price),
    }

    let snapshot = IndicatorSnapshot {
        rsi: last_ind.rsi,
        ema9: last_ind.ema9,
        ema21: last_ind.ema21,
        adx: last_ind.adx,
        atr: nan_to(last_ind.atr, 0.0),
    };

    // Trend inertia boost
    let inertia_score = compute_trend_inertia(indicators, direction, config);

    // Boost pattern strength when it agrees with the selected zone and RSI
    if let Some(zone) = selected_zone {
        if pattern.bias == PatternBias::Bullish
            && zone.kind == ZoneKind::Support
            && snapshot.rsi < 45.0
        {
            pattern_strength += 0.05;
        } else if pattern.bias == PatternBias::Bearish
            && zone.kind == ZoneKind::Resistance
            && snapshot.rsi > 55.0
        {
            pattern_strength += 0.05;
        }
        pattern_strength = pattern_strength.min(1.0);
    }

    // Entry score
    let ctx = EntryContext {
        price,
        candle: latest,
        pattern: &pattern,
        zone: selected_zone,
        atr: snapshot.atr,
        rsi: snapshot.rsi,
        ema9: snapshot.ema9,
        ema21: snapshot.ema21,
        adx: snapshot.adx,
        direction,
        bias,
        pattern_strength,
    };
    let (mut entry_score, mut entry_reasons) = evaluate_entry_score(&ctx, &config.entry);
    entry_score = round2(entry_score + inertia_score);
    entry_reasons.push(("trend_inertia".to_string(), round2(inertia_score)));

    let allowed = is_entry_allowed(entry_score, regime, selected_zone, &config.entry);

    // Fallback: a strong pattern with held trend can trade without a clean
    // zone, evaluated BEFORE the reversal-pattern veto below
    let fallback_allowed = !allowed
        && pattern_strength >= config.fallback_pattern_strength
        && inertia_score >= config.fallback_inertia;
    if fallback_allowed {
        warn!("Strong pattern + trend inertia - allowing trade without clean zone");
    }
    let mut final_allowed = allowed || fallback_allowed;

    let strike = match (regime, direction) {
        (Regime::HighVol, _) | (_, None) => StrikeHint::Atm,
        (_, Some(OptionSide::Ce)) => StrikeHint::OtmCe,
        (_, Some(OptionSide::Pe)) => StrikeHint::OtmPe,
    };

    // Reversal patterns must print near the zone they trade against
    let mut vetoed = false;
    if matches!(pattern.name, "hammer" | "inverted_hammer" | "doji") {
        if let Some(zone) = selected_zone {
            if !is_valid_proximity(price, zone, snapshot.atr, entry_score, snapshot.adx) {
                final_allowed = false;
                vetoed = true;
            }
        }
    }

    let debug_reason = if vetoed {
        "pattern_far_from_zone"
    } else if fallback_allowed {
        "fallback_allowed"
    } else if final_allowed {
        "entry_passed"
    } else {
        "score_below_threshold"
    };

    let confidence = if entry_score > 0.6 {
        Confidence::High
    } else if entry_score > 0.3 {
        Confidence::Medium
    } else {
        Confidence::Low
    };

    let direction_label = direction.map(|d| d.to_string()).unwrap_or_else(|| "no".into());

    TradeSignal {
        id: Uuid::new_v4(),
        direction,
        strike,
        confidence,
        pattern,
        pattern_strength: round2(pattern_strength),
        zone: selected_zone.cloned(),
        trend,
        regime,
        bias,
        allowed: final_allowed,
        entry_score,
        threshold: entry_threshold(regime, selected_zone, &config.entry),
        entry_reasons,
        reason: format!("{} near {} zone in {} trend", pattern.name, direction_label, trend),
        debug_reason: debug_reason.to_string(),
        indicators: snapshot,
        signal_time: latest.timestamp,
    }
}

fn inert_signal() -> TradeSignal {
    TradeSignal {
        id: Uuid::new_v4(),
        direction: None,
        strike: StrikeHint::Atm,
        confidence: Confidence::Low,
        pattern: NO_PATTERN,
        pattern_strength: 0.0,
        zone: None,
        trend: Trend::Sideways,
        regime: Regime::Normal,
        bias: None,
        allowed: false,
        entry_score: 0.0,
        threshold: 0.0,
        entry_reasons: vec![("no_data".to_string(), 0.0)],
        reason: "no data".to_string(),
        debug_reason: "no_data".to_string(),
        indicators: IndicatorSnapshot {
            rsi: f64::NAN,
            ema9: f64::NAN,
            ema21: f64::NAN,
            adx: f64::NAN,
            atr: 0.0,
        },
        signal_time: DateTime::<Utc>::MIN_UTC,
    }
}
