//! Reversal swing detection
//!
//! A bar is a swing high when it is the structural maximum of its
//! surrounding window AND the following bars travel far enough back down,
//! scaled by ATR, to confirm the reversal. Swing lows are symmetric.

use crate::bars::Bar;
use crate::zones::model::DEFAULT_ATR;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SwingConfig {
    /// ATR period for volatility estimation
    pub atr_window: usize,
    /// Minimum confirming move as a multiple of ATR
    pub atr_multiplier: f64,
    /// Bars on each side for structure confirmation
    pub lookback: usize,
    /// Skip bars trading below the series' mean volume
    pub volume_filter: bool,
}

impl Default for SwingConfig {
    fn default() -> Self {
        Self {
            atr_window: 14,
            atr_multiplier: 1.2,
            lookback: 5,
            volume_filter: false,
        }
    }
}

/// A confirmed local extreme
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwingPoint {
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    /// The extreme itself: bar high for swing highs, bar low for swing lows
    pub price: f64,
    /// Size of the confirming reversal move
    pub strength: f64,
    pub atr_at_swing: f64,
    pub volume: f64,
}

/// Rolling mean of own-close true range; NaN until the window fills
pub fn rolling_atr(bars: &[Bar], window: usize) -> Vec<f64> {
    let tr: Vec<f64> = bars.iter().map(|b| b.true_range()).collect();
    let n = tr.len();
    let mut out = vec![f64::NAN; n];
    let mut sum = 0.0;
    for i in 0..n {
        sum += tr[i];
        if i >= window {
            sum -= tr[i - window];
        }
        if i + 1 >= window {
            out[i] = sum / window as f64;
        }
    }
    out
}

/// Detect swing highs and lows confirmed by future price movement
pub fn detect_reversal_swings(bars: &[Bar], config: &SwingConfig) -> (Vec<SwingPoint>, Vec<SwingPoint>) {
    let lookback = config.lookback;
    if bars.len() < 2 * lookback + 1 {
        return (Vec::new(), Vec::new());
    }

    let atr = rolling_atr(bars, config.atr_window);
    let avg_volume = if config.volume_filter {
        bars.iter().map(|b| b.volume).sum::<f64>() / bars.len() as f64
    } else {
        0.0
    };

    let mut highs = Vec::new();
    let mut lows = Vec::new();

    for i in lookback..(bars.len() - lookback) {
        let current = &bars[i];

        let mut bar_atr = atr[i];
        if bar_atr.is_nan() || bar_atr <= 0.0 {
            debug!(
                "Invalid ATR at {} - using fallback {}",
                current.timestamp, DEFAULT_ATR
            );
            bar_atr = DEFAULT_ATR;
        }
        let threshold = bar_atr * config.atr_multiplier;

        if config.volume_filter && current.volume < avg_volume {
            continue;
        }

        let window = &bars[i - lookback..=i + lookback];
        let future = &bars[i + 1..=i + lookback];

        // Swing high: window maximum, then enough downside follow-through
        let window_high = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        if current.high == window_high {
            let future_low = future.iter().map(|b| b.low).fold(f64::MAX, f64::min);
            if current.high - future_low >= threshold {
                highs.push(SwingPoint {
                    index: i,
                    timestamp: current.timestamp,
                    price: current.high,
                    strength: current.high - future_low,
                    atr_at_swing: bar_atr,
                    volume: current.volume,
                });
            }
        }

        // Swing low: window minimum, then enough upside follow-through
        let window_low = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
        if current.low == window_low {
            let future_high = future.iter().map(|b| b.high).fold(f64::MIN, f64::max);
            if future_high - current.low >= threshold {
                lows.push(SwingPoint {
                    index: i,
                    timestamp: current.timestamp,
                    price: current.low,
                    strength: future_high - current.low,
                    atr_at_swing: bar_atr,
                    volume: current.volume,
                });
            }
        }
    }

    (highs, lows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn bars_from_path(path: &[f64]) -> Vec<Bar> {
        path.iter()
            .enumerate()
            .map(|(i, &mid)| Bar {
                timestamp: Utc.with_ymd_and_hms(2024, 7, 1, 4, 0, 0).unwrap()
                    + Duration::minutes(5 * i as i64),
                open: mid - 0.5,
                high: mid + 1.0,
                low: mid - 1.0,
                close: mid,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn test_spike_with_reversal_is_a_swing_high() {
        // Flat series, a spike to 140, then a hard drop: confirming move
        // far exceeds ATR * multiplier
        let mut path = vec![100.0; 10];
        path.extend([120.0, 140.0, 110.0, 95.0, 90.0, 90.0, 90.0]);
        let bars = bars_from_path(&path);

        let config = SwingConfig {
            lookback: 3,
            atr_multiplier: 0.4,
            ..SwingConfig::default()
        };
        let (highs, lows) = detect_reversal_swings(&bars, &config);

        assert!(highs.iter().any(|s| s.price == 141.0));
        assert!(highs.iter().all(|s| s.strength > 0.0 && s.atr_at_swing > 0.0));
        // The drop terminal also confirms as a swing low once price stops falling
        assert!(lows.iter().all(|s| s.strength > 0.0));
    }

    #[test]
    fn test_flat_series_has_no_swings() {
        let bars = bars_from_path(&[100.0; 20]);
        let config = SwingConfig::default();
        let (highs, lows) = detect_reversal_swings(&bars, &config);
        assert!(highs.is_empty());
        assert!(lows.is_empty());
    }

    #[test]
    fn test_short_series_is_empty() {
        let bars = bars_from_path(&[100.0, 101.0, 102.0]);
        let (highs, lows) = detect_reversal_swings(&bars, &SwingConfig::default());
        assert!(highs.is_empty() && lows.is_empty());
    }
}
