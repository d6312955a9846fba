// Toxicity Estimator - VPIN proxy from volume-bucketed trade imbalance
//
// Trades fill fixed-volume buckets in arrival order. A bucket closes once its
// volume reaches the threshold; only closed buckets count and a partially
// filled trailing bucket is dropped rather than carried forward.

use std::collections::VecDeque;

use crate::core::config::ToxicityConfig;
use crate::core::types::{Side, TradePrint};

#[derive(Debug, Clone, Copy, PartialEq)]
struct VolumeBucket {
    buy: f64,
    sell: f64,
}

impl VolumeBucket {
    fn total(&self) -> f64 {
        self.buy + self.sell
    }

    fn imbalance(&self) -> f64 {
        let total = self.total();
        if total > 0.0 {
            (self.buy - self.sell).abs() / total
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToxicityEstimator {
    bucket_volume: f64,
    max_buckets: usize,
    min_trades: usize,
}

impl ToxicityEstimator {
    pub fn new(config: &ToxicityConfig) -> Self {
        Self {
            bucket_volume: config.bucket_volume,
            max_buckets: config.max_buckets.max(1),
            min_trades: config.min_trades,
        }
    }

    fn closed_buckets<'a, I>(&self, trades: I) -> (usize, VecDeque<VolumeBucket>)
    where
        I: IntoIterator<Item = &'a TradePrint>,
    {
        let mut count = 0;
        let mut closed = VecDeque::with_capacity(self.max_buckets);
        let mut current = VolumeBucket { buy: 0.0, sell: 0.0 };

        for trade in trades {
            count += 1;
            match trade.side {
                Side::Buy => current.buy += trade.size,
                Side::Sell => current.sell += trade.size,
            }
            if current.total() >= self.bucket_volume {
                if closed.len() == self.max_buckets {
                    closed.pop_front();
                }
                closed.push_back(current);
                current = VolumeBucket { buy: 0.0, sell: 0.0 };
            }
        }

        (count, closed)
    }

    /// Mean |buy−sell|/(buy+sell) over the closed buckets, or `None` when the
    /// sample is too small to score
    pub fn mean_imbalance<'a, I>(&self, trades: I) -> Option<f64>
    where
        I: IntoIterator<Item = &'a TradePrint>,
    {
        let (count, closed) = self.closed_buckets(trades);
        if count < self.min_trades || closed.is_empty() {
            return None;
        }
        Some(closed.iter().map(VolumeBucket::imbalance).sum::<f64>() / closed.len() as f64)
    }

    /// Toxicity score, an integer in [0, 100]
    pub fn estimate<'a, I>(&self, trades: I) -> u8
    where
        I: IntoIterator<Item = &'a TradePrint>,
    {
        match self.mean_imbalance(trades) {
            Some(mean) => (mean * 200.0).clamp(0.0, 100.0).round() as u8,
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(side: Side, size: f64, ts: i64) -> TradePrint {
        TradePrint::new(100.0, size, side, ts)
    }

    fn estimator() -> ToxicityEstimator {
        ToxicityEstimator::new(&ToxicityConfig::default())
    }

    #[test]
    fn test_too_few_trades_is_zero() {
        let trades: Vec<TradePrint> = (0..9).map(|i| trade(Side::Buy, 100.0, i)).collect();
        assert_eq!(estimator().estimate(&trades), 0);
    }

    #[test]
    fn test_one_sided_flow_saturates() {
        let trades: Vec<TradePrint> = (0..20).map(|i| trade(Side::Buy, 25.0, i)).collect();
        assert_eq!(estimator().estimate(&trades), 100);
    }

    #[test]
    fn test_balanced_flow_is_zero() {
        let trades: Vec<TradePrint> = (0..20)
            .map(|i| trade(if i % 2 == 0 { Side::Buy } else { Side::Sell }, 25.0, i))
            .collect();
        assert_eq!(estimator().estimate(&trades), 0);
    }

    #[test]
    fn test_partial_bucket_discarded() {
        // Ten balanced 5-unit trades close one bucket; the one-sided tail never fills
        let mut trades: Vec<TradePrint> = (0..10)
            .map(|i| trade(if i % 2 == 0 { Side::Buy } else { Side::Sell }, 5.0, i))
            .collect();
        trades.extend((10..15).map(|i| trade(Side::Buy, 5.0, i)));
        assert_eq!(estimator().mean_imbalance(&trades), Some(0.0));
        assert_eq!(estimator().estimate(&trades), 0);
    }

    #[test]
    fn test_mild_imbalance_scaled() {
        // 30 buy / 20 sell per bucket: imbalance 0.2, score 40
        let mut trades = Vec::new();
        for b in 0..4 {
            trades.push(trade(Side::Buy, 30.0, b * 2));
            trades.push(trade(Side::Sell, 20.0, b * 2 + 1));
        }
        trades.extend((100..104).map(|i| trade(Side::Sell, 1.0, i)));
        assert_eq!(estimator().estimate(&trades), 40);
    }

    #[test]
    fn test_bucket_cap_keeps_newest() {
        let config = ToxicityConfig { max_buckets: 2, min_trades: 1, ..ToxicityConfig::default() };
        let est = ToxicityEstimator::new(&config);
        let trades = vec![
            trade(Side::Buy, 50.0, 0),  // imbalance 1
            trade(Side::Buy, 25.0, 1),
            trade(Side::Sell, 25.0, 2), // imbalance 0
            trade(Side::Buy, 25.0, 3),
            trade(Side::Sell, 25.0, 4), // imbalance 0
        ];
        assert_eq!(est.mean_imbalance(&trades), Some(0.0));
    }
}
