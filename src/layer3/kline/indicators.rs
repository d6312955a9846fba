// Indicator math over the candle sequence
// Wilder ATR/ADX, Wilder RSI, rolling Z-score bands. All single pass, O(n).

use crate::core::types::{Candle, ZScoreBands};
use crate::layer3::common::stats::{mean, sample_std_dev};

/// Guard for a zero smoothed true range
const TR_EPSILON: f64 = 1e-10;

fn true_range(candle: &Candle, prev_close: f64) -> f64 {
    (candle.high - candle.low)
        .max((candle.high - prev_close).abs())
        .max((candle.low - prev_close).abs())
}

/// Wilder ATR at the last candle. The first bar contributes high-low, so
/// `period` candles are enough.
pub fn atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period {
        return None;
    }

    let mut trs = Vec::with_capacity(candles.len());
    trs.push(candles[0].high - candles[0].low);
    for w in candles.windows(2) {
        trs.push(true_range(&w[1], w[0].close));
    }

    let p = period as f64;
    let mut value = trs[..period].iter().sum::<f64>() / p;
    for tr in &trs[period..] {
        value = (value * (p - 1.0) + tr) / p;
    }
    Some(value)
}

/// ADX for every candle; `None` until warmed up.
///
/// Directional movement starts at the second bar. Smoothed TR/DM sums are
/// seeded over the first `period` moves, ADX over the first `period` DX values,
/// so the first value lands at index `2·period − 1` and the sequence needs at
/// least `2·period` candles.
pub fn adx_series(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let n = candles.len();
    let mut out = vec![None; n];
    if period == 0 || n < 2 * period {
        return out;
    }

    let p = period as f64;
    let (mut s_tr, mut s_plus, mut s_minus) = (0.0, 0.0, 0.0);
    let mut dx_seed = Vec::with_capacity(period);
    let mut adx: Option<f64> = None;

    for i in 1..n {
        let (cur, prev) = (&candles[i], &candles[i - 1]);
        let tr = true_range(cur, prev.close);
        let up = cur.high - prev.high;
        let down = prev.low - cur.low;
        let plus_dm = if up > down && up > 0.0 { up } else { 0.0 };
        let minus_dm = if down > up && down > 0.0 { down } else { 0.0 };

        if i <= period {
            s_tr += tr;
            s_plus += plus_dm;
            s_minus += minus_dm;
            if i < period {
                continue;
            }
        } else {
            s_tr = s_tr - s_tr / p + tr;
            s_plus = s_plus - s_plus / p + plus_dm;
            s_minus = s_minus - s_minus / p + minus_dm;
        }

        let denom = s_tr.max(TR_EPSILON);
        let plus_di = 100.0 * s_plus / denom;
        let minus_di = 100.0 * s_minus / denom;
        let di_sum = plus_di + minus_di;
        let dx = if di_sum > 0.0 {
            100.0 * (plus_di - minus_di).abs() / di_sum
        } else {
            0.0
        };

        adx = match adx {
            Some(prev_adx) => Some((prev_adx * (p - 1.0) + dx) / p),
            None => {
                dx_seed.push(dx);
                if dx_seed.len() == period {
                    Some(mean(&dx_seed))
                } else {
                    None
                }
            }
        };
        out[i] = adx.map(|v| v.clamp(0.0, 100.0));
    }

    out
}

pub fn adx(candles: &[Candle], period: usize) -> Option<f64> {
    adx_series(candles, period).last().copied().flatten()
}

/// Wilder RSI of the closes; 50 before `period + 1` samples, 100 with no losses
pub fn rsi(closes: &[f64], period: usize) -> f64 {
    if period == 0 || closes.len() < period + 1 {
        return 50.0;
    }

    let p = period as f64;
    let (mut avg_gain, mut avg_loss) = (0.0, 0.0);
    for (i, w) in closes.windows(2).enumerate() {
        let change = w[1] - w[0];
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        if i < period {
            avg_gain += gain / p;
            avg_loss += loss / p;
        } else {
            avg_gain = (avg_gain * (p - 1.0) + gain) / p;
            avg_loss = (avg_loss * (p - 1.0) + loss) / p;
        }
    }

    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// Bands over a window of closes. A flat window collapses every bound onto
/// the price itself.
pub fn bands_for_window(window: &[f64]) -> Option<ZScoreBands> {
    let first = *window.first()?;
    let flat = window.iter().all(|c| *c == first);
    let (m, std_dev) = if flat {
        (first, 0.0)
    } else {
        (mean(window), sample_std_dev(window))
    };

    Some(ZScoreBands {
        mean: m,
        std_dev,
        upper_1: m + std_dev,
        lower_1: m - std_dev,
        upper_2: m + 2.0 * std_dev,
        lower_2: m - 2.0 * std_dev,
    })
}

/// Bands over the trailing `window` closes
pub fn zscore_bands(closes: &[f64], window: usize) -> Option<ZScoreBands> {
    if window < 2 || closes.len() < window {
        return None;
    }
    bands_for_window(&closes[closes.len() - window..])
}

/// Rolling bands for every close; `None` until `window` closes exist
pub fn zscore_band_series(closes: &[f64], window: usize) -> Vec<Option<ZScoreBands>> {
    let mut out = vec![None; closes.len()];
    if window < 2 {
        return out;
    }
    for (i, w) in closes.windows(window).enumerate() {
        out[i + window - 1] = bands_for_window(w);
    }
    out
}
