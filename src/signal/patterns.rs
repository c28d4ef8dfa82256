//! Candlestick pattern recognition
//!
//! Each predicate inspects the trailing one to three bars; the detector
//! walks a fixed priority list (strongest, most specific formations first)
//! and returns the first match. Short input is a non-match, never an
//! error, so the detector always yields exactly one record.

use crate::bars::Bar;
use serde::Serialize;

/// Directional reading of a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternBias {
    Bullish,
    Bearish,
    Neutral,
}

/// One detected formation with its static strength weight
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PatternRecord {
    pub name: &'static str,
    pub bias: PatternBias,
    pub strength: f64,
}

pub const NO_PATTERN: PatternRecord = PatternRecord {
    name: "none",
    bias: PatternBias::Neutral,
    strength: 0.0,
};

fn last_two(bars: &[Bar]) -> Option<(&Bar, &Bar)> {
    if bars.len() < 2 {
        return None;
    }
    Some((&bars[bars.len() - 2], &bars[bars.len() - 1]))
}

fn last_three(bars: &[Bar]) -> Option<(&Bar, &Bar, &Bar)> {
    if bars.len() < 3 {
        return None;
    }
    Some((&bars[bars.len() - 3], &bars[bars.len() - 2], &bars[bars.len() - 1]))
}

// === Two-candle reversals ===

/// Green candle fully engulfs the prior red body
pub fn is_bullish_engulfing(bars: &[Bar]) -> bool {
    let Some((prev, curr)) = last_two(bars) else {
        return false;
    };
    prev.is_red() && curr.is_green() && curr.close > prev.open && curr.open < prev.close
}

/// Red candle fully engulfs the prior green body
pub fn is_bearish_engulfing(bars: &[Bar]) -> bool {
    let Some((prev, curr)) = last_two(bars) else {
        return false;
    };
    prev.is_green() && curr.is_red() && curr.open > prev.close && curr.close < prev.open
}

// === Single-candle patterns ===

/// Small body in the upper part of the range with a long lower wick
pub fn is_hammer(bars: &[Bar]) -> bool {
    let Some(c) = bars.last() else {
        return false;
    };
    let range = c.range();
    if range == 0.0 {
        return false;
    }
    let body = c.body();
    let body_position = (c.open.max(c.close) - c.low) / range;
    c.lower_wick() > 2.0 * body && c.upper_wick() < body * 0.5 && body_position > 0.6
}

/// Long upper wick with the body squeezed against the high
pub fn is_inverted_hammer(bars: &[Bar]) -> bool {
    let Some(c) = bars.last() else {
        return false;
    };
    let range = c.range();
    if range == 0.0 {
        return false;
    }
    let body = c.body();
    let body_position = (c.high - c.open.min(c.close)) / range;
    c.upper_wick() > 2.0 * body && c.lower_wick() < body * 0.5 && body_position < 0.4
}

/// Hammer shape closing red after an advance
pub fn is_hanging_man(bars: &[Bar]) -> bool {
    let Some(c) = bars.last() else {
        return false;
    };
    let body = c.body();
    c.lower_wick() > 2.0 * body && c.upper_wick() < body && c.is_red()
}

pub fn is_shooting_star(bars: &[Bar]) -> bool {
    let Some(c) = bars.last() else {
        return false;
    };
    let range = c.range();
    if range == 0.0 {
        return false;
    }
    let body = c.body();
    let body_position = (c.high - c.open.min(c.close)) / range;
    c.upper_wick() > 2.0 * body && c.lower_wick() < body * 0.5 && body_position < 0.4
}

/// Open and close nearly equal; indecision
pub fn is_doji(bars: &[Bar]) -> bool {
    let Some(c) = bars.last() else {
        return false;
    };
    c.body() <= c.range() * 0.1
}

/// Full green body with no wicks
pub fn is_marubozu_green(bars: &[Bar]) -> bool {
    let Some(c) = bars.last() else {
        return false;
    };
    c.open == c.low && c.close == c.high && c.is_green()
}

/// Full red body with no wicks
pub fn is_marubozu_red(bars: &[Bar]) -> bool {
    let Some(c) = bars.last() else {
        return false;
    };
    c.open == c.high && c.close == c.low && c.is_red()
}

// === Three-candle patterns ===

/// Bearish candle, small middle body, then a bullish close above the first
/// body's midpoint
pub fn is_morning_star(bars: &[Bar]) -> bool {
    let Some((a, b, c)) = last_three(bars) else {
        return false;
    };
    a.is_red()
        && b.body() <= a.range() * 0.3
        && c.is_green()
        && c.close > (a.open + a.close) / 2.0
}

/// Bullish candle, small middle body, then a bearish close below the first
/// body's midpoint
pub fn is_evening_star(bars: &[Bar]) -> bool {
    let Some((a, b, c)) = last_three(bars) else {
        return false;
    };
    a.is_green()
        && b.body() <= a.range() * 0.3
        && c.is_red()
        && c.close < (a.open + a.close) / 2.0
}

/// Three green candles stepping higher
pub fn is_three_white_soldiers(bars: &[Bar]) -> bool {
    let Some((a, b, c)) = last_three(bars) else {
        return false;
    };
    a.is_green()
        && b.is_green()
        && c.is_green()
        && a.close < b.open
        && b.open < b.close
        && b.close < c.open
        && c.open < c.close
}

/// Three red candles stepping lower
pub fn is_three_black_crows(bars: &[Bar]) -> bool {
    let Some((a, b, c)) = last_three(bars) else {
        return false;
    };
    a.is_red()
        && b.is_red()
        && c.is_red()
        && a.close > b.open
        && b.open > b.close
        && b.close > c.open
        && c.open > c.close
}

// === Contraction / expansion patterns ===

/// Current range entirely within the previous bar's range
pub fn is_inside_bar(bars: &[Bar]) -> bool {
    let Some((prev, curr)) = last_two(bars) else {
        return false;
    };
    curr.high < prev.high && curr.low > prev.low
}

/// Current range breaks both the previous high and low
pub fn is_outside_bar(bars: &[Bar]) -> bool {
    let Some((prev, curr)) = last_two(bars) else {
        return false;
    };
    curr.high > prev.high && curr.low < prev.low
}

pub fn is_piercing_line(bars: &[Bar]) -> bool {
    let Some((prev, curr)) = last_two(bars) else {
        return false;
    };
    prev.is_red()
        && curr.is_green()
        && curr.open < prev.low
        && curr.close > (prev.open + prev.close) / 2.0
}

pub fn is_dark_cloud_cover(bars: &[Bar]) -> bool {
    let Some((prev, curr)) = last_two(bars) else {
        return false;
    };
    prev.is_green()
        && curr.is_red()
        && curr.open > prev.high
        && curr.close < (prev.open + prev.close) / 2.0
}

/// Matching lows, first bar red then green
pub fn is_tweezer_bottom(bars: &[Bar]) -> bool {
    let Some((prev, curr)) = last_two(bars) else {
        return false;
    };
    let level = (prev.low + curr.low) / 2.0;
    let tolerance = level * (0.05 / 100.0);
    (prev.low - curr.low).abs() <= tolerance && prev.is_red() && curr.is_green()
}

/// Matching highs, first bar green then red
pub fn is_tweezer_top(bars: &[Bar]) -> bool {
    let Some((prev, curr)) = last_two(bars) else {
        return false;
    };
    let level = (prev.high + curr.high) / 2.0;
    let tolerance = level * (0.05 / 100.0);
    (prev.high - curr.high).abs() <= tolerance && prev.is_green() && curr.is_red()
}

type Predicate = fn(&[Bar]) -> bool;

/// Priority-ordered pattern table; the first matching entry wins
const PATTERNS: &[(Predicate, PatternRecord)] = &[
    (is_bullish_engulfing, PatternRecord { name: "bullish_engulfing", bias: PatternBias::Bullish, strength: 0.8 }),
    (is_bearish_engulfing, PatternRecord { name: "bearish_engulfing", bias: PatternBias::Bearish, strength: 0.8 }),
    (is_morning_star, PatternRecord { name: "morning_star", bias: PatternBias::Bullish, strength: 0.75 }),
    (is_evening_star, PatternRecord { name: "evening_star", bias: PatternBias::Bearish, strength: 0.75 }),
    (is_three_white_soldiers, PatternRecord { name: "three_white_soldiers", bias: PatternBias::Bullish, strength: 0.7 }),
    (is_three_black_crows, PatternRecord { name: "three_black_crows", bias: PatternBias::Bearish, strength: 0.7 }),
    (is_hammer, PatternRecord { name: "hammer", bias: PatternBias::Bullish, strength: 0.6 }),
    (is_inverted_hammer, PatternRecord { name: "inverted_hammer", bias: PatternBias::Bearish, strength: 0.6 }),
    (is_hanging_man, PatternRecord { name: "hanging_man", bias: PatternBias::Bearish, strength: 0.6 }),
    (is_shooting_star, PatternRecord { name: "shooting_star", bias: PatternBias::Bearish, strength: 0.6 }),
    (is_marubozu_green, PatternRecord { name: "marubozu_green", bias: PatternBias::Bullish, strength: 0.55 }),
    (is_marubozu_red, PatternRecord { name: "marubozu_red", bias: PatternBias::Bearish, strength: 0.55 }),
    (is_inside_bar, PatternRecord { name: "inside_bar", bias: PatternBias::Neutral, strength: 0.5 }),
    (is_outside_bar, PatternRecord { name: "outside_bar", bias: PatternBias::Neutral, strength: 0.5 }),
    (is_doji, PatternRecord { name: "doji", bias: PatternBias::Neutral, strength: 0.4 }),
    (is_piercing_line, PatternRecord { name: "piercing_line", bias: PatternBias::Bullish, strength: 0.75 }),
    (is_dark_cloud_cover, PatternRecord { name: "dark_cloud_cover", bias: PatternBias::Bearish, strength: 0.75 }),
    (is_tweezer_bottom, PatternRecord { name: "tweezer_bottom", bias: PatternBias::Bullish, strength: 0.75 }),
    (is_tweezer_top, PatternRecord { name: "tweezer_top", bias: PatternBias::Bearish, strength: 0.75 }),
];

/// Scan the trailing bars and return the first pattern detected
pub fn detect_patterns(bars: &[Bar]) -> PatternRecord {
    for (predicate, record) in PATTERNS {
        if predicate(bars) {
            return *record;
        }
    }
    NO_PATTERN
}
