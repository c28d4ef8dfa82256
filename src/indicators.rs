//! Technical indicator enrichment
//!
//! Appends RSI(14), EMA(9/21), MACD histogram, ADX(14), ATR(14), 10-bar
//! average volume and a session-anchored VWAP to a bar series. Warmup
//! entries are NaN, mirroring how the indicator frames behave upstream;
//! consumers substitute safe defaults instead of failing.

use crate::bars::Bar;
use chrono::NaiveDate;
use chrono_tz::Asia::Kolkata;
use serde::{Deserialize, Serialize};

pub const RSI_WINDOW: usize = 14;
pub const ADX_WINDOW: usize = 14;
pub const ATR_WINDOW: usize = 14;
pub const AVG_VOL_WINDOW: usize = 10;

/// Bar plus derived indicator columns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorBar {
    pub bar: Bar,
    pub rsi: f64,
    pub ema9: f64,
    pub ema21: f64,
    /// MACD histogram (12/26 line minus 9-period signal)
    pub macd: f64,
    pub adx: f64,
    pub atr: f64,
    pub avg_vol: f64,
    /// Volume-weighted average price, anchored to the session open
    pub vwap: f64,
}

fn session_date(bar: &Bar) -> NaiveDate {
    bar.timestamp.with_timezone(&Kolkata).date_naive()
}

/// Exponential moving average, seeded from the first value (adjust=False)
fn ema_series(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev = f64::NAN;
    for &v in values {
        prev = if prev.is_nan() { v } else { alpha * v + (1.0 - alpha) * prev };
        out.push(prev);
    }
    out
}

/// Wilder RSI: seeded with a simple average of the first window, then
/// smoothed with alpha = 1/window
fn rsi_series(closes: &[f64], window: usize) -> Vec<f64> {
    let n = closes.len();
    let mut out = vec![f64::NAN; n];
    if n <= window {
        return out;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=window {
        let delta = closes[i] - closes[i - 1];
        avg_gain += delta.max(0.0);
        avg_loss += (-delta).max(0.0);
    }
    avg_gain /= window as f64;
    avg_loss /= window as f64;
    out[window] = rsi_value(avg_gain, avg_loss);

    for i in (window + 1)..n {
        let delta = closes[i] - closes[i - 1];
        let w = window as f64;
        avg_gain = (avg_gain * (w - 1.0) + delta.max(0.0)) / w;
        avg_loss = (avg_loss * (w - 1.0) + (-delta).max(0.0)) / w;
        out[i] = rsi_value(avg_gain, avg_loss);
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
}

/// Wilder ATR over the classic true range (uses the prior close)
fn atr_series(bars: &[Bar], window: usize) -> Vec<f64> {
    let n = bars.len();
    let mut out = vec![f64::NAN; n];
    if n < window + 1 {
        return out;
    }

    let tr = |i: usize| -> f64 {
        let prev_close = bars[i - 1].close;
        (bars[i].high - bars[i].low)
            .max((bars[i].high - prev_close).abs())
            .max((bars[i].low - prev_close).abs())
    };

    let mut atr = (1..=window).map(tr).sum::<f64>() / window as f64;
    out[window] = atr;
    for i in (window + 1)..n {
        atr = (atr * (window as f64 - 1.0) + tr(i)) / window as f64;
        out[i] = atr;
    }
    out
}

/// Wilder ADX from smoothed directional movement
fn adx_series(bars: &[Bar], window: usize) -> Vec<f64> {
    let n = bars.len();
    let mut out = vec![f64::NAN; n];
    if n < 2 * window + 1 {
        return out;
    }

    let w = window as f64;
    let mut sm_tr = 0.0;
    let mut sm_plus = 0.0;
    let mut sm_minus = 0.0;
    let mut dx = vec![f64::NAN; n];

    for i in 1..n {
        let up = bars[i].high - bars[i - 1].high;
        let down = bars[i - 1].low - bars[i].low;
        let plus_dm = if up > down && up > 0.0 { up } else { 0.0 };
        let minus_dm = if down > up && down > 0.0 { down } else { 0.0 };
        let prev_close = bars[i - 1].close;
        let tr = (bars[i].high - bars[i].low)
            .max((bars[i].high - prev_close).abs())
            .max((bars[i].low - prev_close).abs());

        if i <= window {
            sm_tr += tr;
            sm_plus += plus_dm;
            sm_minus += minus_dm;
        } else {
            sm_tr = sm_tr - sm_tr / w + tr;
            sm_plus = sm_plus - sm_plus / w + plus_dm;
            sm_minus = sm_minus - sm_minus / w + minus_dm;
        }

        if i >= window && sm_tr > 0.0 {
            let plus_di = 100.0 * sm_plus / sm_tr;
            let minus_di = 100.0 * sm_minus / sm_tr;
            let di_sum = plus_di + minus_di;
            dx[i] = if di_sum > 0.0 {
                100.0 * (plus_di - minus_di).abs() / di_sum
            } else {
                0.0
            };
        }
    }

    let mut adx = dx[window..=2 * window].iter().sum::<f64>() / (w + 1.0);
    out[2 * window] = adx;
    for i in (2 * window + 1)..n {
        adx = (adx * (w - 1.0) + dx[i]) / w;
        out[i] = adx;
    }
    out
}

fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    let mut sum = 0.0;
    for i in 0..n {
        sum += values[i];
        if i >= window {
            sum -= values[i - window];
        }
        if i + 1 >= window {
            out[i] = sum / window as f64;
        }
    }
    out
}

/// Session-anchored VWAP: cumulative price*volume over volume, reset at
/// each new trading date; zero cumulative volume falls back to the close
fn vwap_series(bars: &[Bar]) -> Vec<f64> {
    let mut out = Vec::with_capacity(bars.len());
    let mut day: Option<NaiveDate> = None;
    let mut pv = 0.0;
    let mut vol = 0.0;
    for bar in bars {
        let d = session_date(bar);
        if day != Some(d) {
            day = Some(d);
            pv = 0.0;
            vol = 0.0;
        }
        pv += bar.close * bar.volume;
        vol += bar.volume;
        out.push(if vol > 0.0 { pv / vol } else { bar.close });
    }
    out
}

/// Enrich a bar series with the indicator columns the signal engine reads
pub fn enrich_with_indicators(bars: &[Bar]) -> Vec<IndicatorBar> {
    if bars.is_empty() {
        return Vec::new();
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

    let rsi = rsi_series(&closes, RSI_WINDOW);
    let ema9 = ema_series(&closes, 9);
    let ema21 = ema_series(&closes, 21);
    let ema12 = ema_series(&closes, 12);
    let ema26 = ema_series(&closes, 26);
    let macd_line: Vec<f64> = ema12.iter().zip(&ema26).map(|(a, b)| a - b).collect();
    let macd_signal = ema_series(&macd_line, 9);
    let adx = adx_series(bars, ADX_WINDOW);
    let atr = atr_series(bars, ATR_WINDOW);
    let avg_vol = rolling_mean(&volumes, AVG_VOL_WINDOW);
    let vwap = vwap_series(bars);

    bars.iter()
        .enumerate()
        .map(|(i, bar)| IndicatorBar {
            bar: bar.clone(),
            rsi: rsi[i],
            ema9: ema9[i],
            ema21: ema21[i],
            macd: macd_line[i] - macd_signal[i],
            adx: adx[i],
            atr: atr[i],
            avg_vol: avg_vol[i],
            vwap: vwap[i],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                timestamp: Utc.with_ymd_and_hms(2024, 7, 1, 4, 0, 0).unwrap()
                    + chrono::Duration::minutes(5 * i as i64),
                open: c - 0.5,
                high: c + 1.0,
                low: c - 1.0,
                close: c,
                volume: 100.0,
            })
            .collect()
    }

    #[test]
    fn test_rsi_all_gains_is_100() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let rsi = rsi_series(&closes, 14);
        assert!(rsi[13].is_nan());
        assert_eq!(rsi[29], 100.0);
    }

    #[test]
    fn test_ema_seeds_from_first_value() {
        let ema = ema_series(&[10.0, 10.0, 10.0], 9);
        assert_eq!(ema, vec![10.0, 10.0, 10.0]);
    }

    #[test]
    fn test_enrich_lengths_match() {
        let bars = bars_from_closes(&(0..40).map(|i| 100.0 + (i % 5) as f64).collect::<Vec<_>>());
        let enriched = enrich_with_indicators(&bars);
        assert_eq!(enriched.len(), bars.len());
        let last = enriched.last().unwrap();
        assert!(!last.rsi.is_nan());
        assert!(!last.atr.is_nan());
        assert!(!last.adx.is_nan());
        assert!(!last.vwap.is_nan());
    }

    #[test]
    fn test_vwap_resets_per_session() {
        let mut bars = bars_from_closes(&[100.0, 100.0]);
        bars[1].timestamp = bars[1].timestamp + chrono::Duration::days(1);
        bars[1].close = 200.0;
        bars[1].open = 199.5;
        bars[1].high = 201.0;
        bars[1].low = 199.0;
        let vwap = vwap_series(&bars);
        assert_eq!(vwap[1], 200.0);
    }
}
