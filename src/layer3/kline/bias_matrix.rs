// Bias Matrix - per-timeframe directional bias over trailing slices of one
// candle sequence

use serde::Serialize;
use tracing::debug;

use crate::core::config::BiasConfig;
use crate::core::types::{Bias, Candle};
use crate::layer3::common::stats::mean;
use crate::layer3::kline::indicators::rsi;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeframeBias {
    pub label: String,
    pub bias: Bias,
    pub sparkline: Vec<f64>,
    pub rsi: f64,
    pub sma: f64,
    pub last_updated: i64,
}

/// A bucket whose bias flipped during a recompute
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BiasChange {
    pub label: String,
    pub from: Bias,
    pub to: Bias,
}

pub struct BiasMatrix {
    config: BiasConfig,
    rsi_period: usize,
    entries: Vec<TimeframeBias>,
    is_loading: bool,
}

impl BiasMatrix {
    pub fn new(config: BiasConfig, rsi_period: usize) -> Self {
        let entries = config
            .buckets
            .iter()
            .map(|b| TimeframeBias {
                label: b.label.clone(),
                bias: Bias::Neutral,
                sparkline: Vec::new(),
                rsi: 50.0,
                sma: 0.0,
                last_updated: 0,
            })
            .collect();

        Self {
            config,
            rsi_period,
            entries,
            is_loading: false,
        }
    }

    /// Bias of one trailing slice
    pub fn classify(&self, slice: &[Candle], label: &str, timestamp: i64) -> TimeframeBias {
        let closes: Vec<f64> = slice.iter().map(|c| c.close).collect();
        let spark_from = closes.len().saturating_sub(self.config.sparkline_len);
        let sparkline = closes[spark_from..].to_vec();

        let sma = mean(&closes);
        let rsi_value = rsi(&closes, self.rsi_period);

        let bias = match closes.last() {
            Some(&close) if closes.len() > self.rsi_period => {
                if close > sma && rsi_value > self.config.bull_rsi {
                    Bias::Bull
                } else if close < sma && rsi_value < self.config.bear_rsi {
                    Bias::Bear
                } else {
                    Bias::Neutral
                }
            }
            _ => Bias::Neutral,
        };

        TimeframeBias {
            label: label.to_string(),
            bias,
            sparkline,
            rsi: rsi_value,
            sma,
            last_updated: timestamp,
        }
    }

    /// Rebuild every bucket from the sequence; returns the buckets that flipped.
    /// A recompute already in flight makes this a no-op.
    pub fn recompute(&mut self, candles: &[Candle], timestamp: i64) -> Vec<BiasChange> {
        if self.is_loading {
            debug!("Bias recompute already in progress, skipped");
            return Vec::new();
        }
        self.is_loading = true;

        let fresh: Vec<TimeframeBias> = self
            .config
            .buckets
            .iter()
            .map(|bucket| {
                let start = candles.len().saturating_sub(bucket.window);
                self.classify(&candles[start..], &bucket.label, timestamp)
            })
            .collect();

        let changes = self
            .entries
            .iter()
            .zip(&fresh)
            .filter(|(old, new)| old.bias != new.bias)
            .map(|(old, new)| BiasChange {
                label: new.label.clone(),
                from: old.bias,
                to: new.bias,
            })
            .collect();

        self.entries = fresh;
        self.is_loading = false;
        changes
    }

    pub fn entries(&self) -> &[TimeframeBias] {
        &self.entries
    }

    pub fn get(&self, label: &str) -> Option<&TimeframeBias> {
        self.entries.iter().find(|e| e.label == label)
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone(), self.rsi_period);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candles_from(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle {
                time: i as i64 * 60,
                open: c,
                high: c + 0.5,
                low: c - 0.5,
                close: c,
                volume: 1.0,
                delta: 0.0,
                cvd: 0.0,
                is_closed: true,
                adx: None,
                bands: None,
            })
            .collect()
    }

    #[test]
    fn test_rising_window_is_bull_everywhere() {
        let closes: Vec<f64> = (0..25).map(|i| 100.0 + i as f64).collect();
        let mut matrix = BiasMatrix::new(BiasConfig::default(), 14);
        let changes = matrix.recompute(&candles_from(&closes), 1_000);

        assert_eq!(changes.len(), 4);
        for entry in matrix.entries() {
            assert_eq!(entry.bias, Bias::Bull, "{}", entry.label);
            assert_eq!(entry.last_updated, 1_000);
            assert!(entry.sparkline.len() <= 20);
        }
        assert_eq!(matrix.get("5M").map(|e| e.sparkline.len()), Some(20));
        assert_eq!(matrix.get("5M").and_then(|e| e.sparkline.last().copied()), Some(124.0));
    }

    #[test]
    fn test_falling_window_is_bear() {
        let closes: Vec<f64> = (0..30).map(|i| 200.0 - i as f64).collect();
        let mut matrix = BiasMatrix::new(BiasConfig::default(), 14);
        matrix.recompute(&candles_from(&closes), 0);
        assert!(matrix.entries().iter().all(|e| e.bias == Bias::Bear));
    }

    #[test]
    fn test_short_history_is_neutral() {
        let closes: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        let mut matrix = BiasMatrix::new(BiasConfig::default(), 14);
        let changes = matrix.recompute(&candles_from(&closes), 0);
        assert!(changes.is_empty());
        assert!(matrix.entries().iter().all(|e| e.bias == Bias::Neutral));
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let closes: Vec<f64> = (0..300).map(|i| 100.0 + (i as f64 * 0.1).sin() * 3.0).collect();
        let candles = candles_from(&closes);
        let mut matrix = BiasMatrix::new(BiasConfig::default(), 14);
        matrix.recompute(&candles, 5);
        let first = matrix.entries().to_vec();

        assert!(matrix.recompute(&candles, 5).is_empty());
        assert_eq!(matrix.entries(), first.as_slice());
        assert!(!matrix.is_loading());
    }
}
