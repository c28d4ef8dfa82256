//! OHLCV bars and timeframes
//!
//! A `Bar` is one aggregated candle for a timeframe. Bars are produced by
//! the data layer, enriched with indicators, and consumed read-only by the
//! zone pipeline and signal engine.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Single OHLCV candle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Absolute body size
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    /// High-to-low range
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn upper_wick(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    pub fn lower_wick(&self) -> f64 {
        self.open.min(self.close) - self.low
    }

    pub fn is_green(&self) -> bool {
        self.close > self.open
    }

    pub fn is_red(&self) -> bool {
        self.close < self.open
    }

    /// True range against this bar's own close (the variant the swing
    /// detector's ATR is built from)
    pub fn true_range(&self) -> f64 {
        (self.high - self.low)
            .max((self.high - self.close).abs())
            .max((self.low - self.close).abs())
    }

    /// Calendar date of the bar (UTC)
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Analysis timeframe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 3] = [Timeframe::M5, Timeframe::M15, Timeframe::H1];

    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
        }
    }

    pub fn minutes(&self) -> i64 {
        match self {
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::H1 => 60,
        }
    }

    /// Lookback window (minutes) for flip/retest detection: 6 bars on 5m,
    /// 4 bars on 15m, 2 bars on 1h
    pub fn flip_window_minutes(&self) -> i64 {
        match self {
            Timeframe::M5 => 30,
            Timeframe::M15 => 60,
            Timeframe::H1 => 120,
        }
    }

    /// Fallback max zone span (points) when no ATR is available
    pub fn default_max_span(&self) -> f64 {
        match self {
            Timeframe::M5 => 60.0,
            Timeframe::M15 => 75.0,
            Timeframe::H1 => 90.0,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bar(open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2024, 7, 1, 9, 15, 0).unwrap(),
            open,
            high,
            low,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn test_candle_anatomy() {
        let b = bar(100.0, 110.0, 95.0, 104.0);
        assert_eq!(b.body(), 4.0);
        assert_eq!(b.range(), 15.0);
        assert_eq!(b.upper_wick(), 6.0);
        assert_eq!(b.lower_wick(), 5.0);
        assert!(b.is_green());
    }

    #[test]
    fn test_flip_windows() {
        assert_eq!(Timeframe::M5.flip_window_minutes(), 30);
        assert_eq!(Timeframe::M15.flip_window_minutes(), 60);
        assert_eq!(Timeframe::H1.flip_window_minutes(), 120);
    }
}
