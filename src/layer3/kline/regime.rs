// Regime Classifier - trend/volatility state from ATR ratio, SMA distance,
// range expansion and ADX confirmation

use serde::Serialize;
use std::fmt;
use tracing::trace;

use crate::core::config::IndicatorConfig;
use crate::core::types::{Candle, MarketRegime};
use crate::layer3::common::stats;
use crate::layer3::kline::indicators::{adx, atr};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegimeState {
    pub regime: MarketRegime,
    pub volatility_ratio: f64,
    pub volatility_percentile: f64,
    pub adx: f64,
    pub short_atr: f64,
    pub long_atr: f64,
    pub sma: f64,
    /// Recent vs prior range, as a fraction (0.25 = 25% wider)
    pub range_change: f64,
}

impl Default for RegimeState {
    fn default() -> Self {
        Self {
            regime: MarketRegime::Uncertain,
            volatility_ratio: 0.0,
            volatility_percentile: 0.0,
            adx: 0.0,
            short_atr: 0.0,
            long_atr: 0.0,
            sma: 0.0,
            range_change: 0.0,
        }
    }
}

impl fmt::Display for RegimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RegimeState({}, vol_ratio={:.2}, adx={:.1})",
            self.regime, self.volatility_ratio, self.adx
        )
    }
}

fn window_range(candles: &[Candle]) -> f64 {
    let high = candles.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let low = candles.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    if candles.is_empty() {
        0.0
    } else {
        high - low
    }
}

pub struct RegimeClassifier {
    config: IndicatorConfig,
}

impl RegimeClassifier {
    pub fn new(config: IndicatorConfig) -> Self {
        Self { config }
    }

    /// Pure function of the candle sequence
    pub fn classify(&self, candles: &[Candle]) -> RegimeState {
        let cfg = &self.config;
        let Some(last) = candles.last() else {
            return RegimeState::default();
        };
        if candles.len() < cfg.regime_min_candles.max(1) {
            return RegimeState::default();
        }

        let short_atr = atr(candles, cfg.short_atr_period).unwrap_or(0.0);
        let long_atr = atr(candles, cfg.long_atr_period).unwrap_or(0.0);
        let volatility_ratio = if long_atr > 0.0 { short_atr / long_atr } else { 1.0 };
        let volatility_percentile = (volatility_ratio * 50.0).clamp(0.0, 100.0);

        let price = last.close;
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let sma = stats::sma(&closes, cfg.sma_period.clamp(1, closes.len())).unwrap_or(price);
        let trend = if price >= sma {
            MarketRegime::TrendingUp
        } else {
            MarketRegime::TrendingDown
        };

        let lookback = cfg.range_lookback.max(1);
        let n = candles.len();
        let recent = window_range(&candles[n.saturating_sub(lookback)..]);
        let prior = window_range(&candles[n.saturating_sub(2 * lookback)..n.saturating_sub(lookback)]);
        let range_change = if prior > 0.0 { (recent - prior) / prior } else { 0.0 };

        let mut regime = if (price - sma).abs() > cfg.trend_atr_multiple * short_atr {
            trend
        } else if range_change > cfg.range_change_threshold {
            MarketRegime::Expanding
        } else if range_change < -cfg.range_change_threshold && volatility_ratio < 1.0 {
            MarketRegime::Compressing
        } else {
            MarketRegime::Ranging
        };

        let adx_value = adx(candles, cfg.adx_period).unwrap_or(0.0);
        if adx_value > cfg.adx_trend_threshold {
            regime = trend;
        }

        trace!(regime = %regime, adx = adx_value, vol_ratio = volatility_ratio, "Regime classified");

        RegimeState {
            regime,
            volatility_ratio,
            volatility_percentile,
            adx: adx_value,
            short_atr,
            long_atr,
            sma,
            range_change,
        }
    }
}
