// Trade Flow Tracker - recent trade prints and the order-flow metrics built on them
// Keeps a fixed ring of the latest prints plus a rolling time window

use serde::Serialize;
use std::collections::VecDeque;
use tracing::trace;

use crate::core::config::ToxicityConfig;
use crate::core::types::{Side, TradePrint};
use crate::layer3::common::time_windows::TimeWindow;
use crate::layer3::trade::toxicity::ToxicityEstimator;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlowMetrics {
    /// (buy − sell) / (buy + sell) over the time window, in [−1, 1]
    pub ofi: f64,
    pub buy_volume: f64,
    pub sell_volume: f64,
    pub window_trades: usize,
    /// VPIN score over the trade ring, as of the last refresh
    pub toxicity: u8,
    /// VPIN score over the time window, as of the last refresh
    pub short_toxicity: u8,
}

pub struct TradeFlowTracker {
    ring: VecDeque<TradePrint>,
    ring_capacity: usize,
    window: TimeWindow<TradePrint>,
    estimator: ToxicityEstimator,
    // Running window sums, adjusted as prints enter and leave
    buy_volume: f64,
    sell_volume: f64,
    scores: (u8, u8),
    trades_processed: u64,
}

fn signed_volume(trade: &TradePrint) -> (f64, f64) {
    match trade.side {
        Side::Buy => (trade.size, 0.0),
        Side::Sell => (0.0, trade.size),
    }
}

impl TradeFlowTracker {
    pub fn new(config: &ToxicityConfig) -> Self {
        Self {
            ring: VecDeque::with_capacity(config.ring_capacity.max(1)),
            ring_capacity: config.ring_capacity.max(1),
            window: TimeWindow::new(config.window_ms, config.window_capacity),
            estimator: ToxicityEstimator::new(config),
            buy_volume: 0.0,
            sell_volume: 0.0,
            scores: (0, 0),
            trades_processed: 0,
        }
    }

    pub fn push(&mut self, trade: &TradePrint) {
        self.trades_processed += 1;

        if self.ring.len() == self.ring_capacity {
            self.ring.pop_front();
        }
        self.ring.push_back(trade.clone());

        let (buy, sell) = signed_volume(trade);
        self.buy_volume += buy;
        self.sell_volume += sell;
        let (mut out_buy, mut out_sell) = (0.0, 0.0);
        self.window.push_evicting(trade.timestamp, trade.clone(), |old| {
            let (b, s) = signed_volume(&old);
            out_buy += b;
            out_sell += s;
        });
        self.settle(out_buy, out_sell);

        trace!(price = trade.price, size = trade.size, side = %trade.side, "Trade recorded");
    }

    /// Drop window entries that aged out relative to `now_ms`
    pub fn prune(&mut self, now_ms: i64) {
        let (mut out_buy, mut out_sell) = (0.0, 0.0);
        self.window.prune_evicting(now_ms, |old| {
            let (b, s) = signed_volume(&old);
            out_buy += b;
            out_sell += s;
        });
        self.settle(out_buy, out_sell);
    }

    fn settle(&mut self, out_buy: f64, out_sell: f64) {
        if self.window.is_empty() {
            // Drop accumulated rounding along with the last print
            self.buy_volume = 0.0;
            self.sell_volume = 0.0;
        } else {
            self.buy_volume = (self.buy_volume - out_buy).max(0.0);
            self.sell_volume = (self.sell_volume - out_sell).max(0.0);
        }
    }

    pub fn buy_sell_volume(&self) -> (f64, f64) {
        (self.buy_volume, self.sell_volume)
    }

    pub fn ofi(&self) -> f64 {
        let (buy, sell) = self.buy_sell_volume();
        let total = buy + sell;
        if total > 0.0 {
            (buy - sell) / total
        } else {
            0.0
        }
    }

    pub fn toxicity(&self) -> u8 {
        self.estimator.estimate(&self.ring)
    }

    pub fn short_toxicity(&self) -> u8 {
        self.estimator.estimate(self.window.values())
    }

    /// Rerun both VPIN estimates; `metrics` reports the stored scores
    pub fn refresh_toxicity(&mut self) -> (u8, u8) {
        self.scores = (self.toxicity(), self.short_toxicity());
        self.scores
    }

    pub fn metrics(&self) -> FlowMetrics {
        FlowMetrics {
            ofi: self.ofi(),
            buy_volume: self.buy_volume,
            sell_volume: self.sell_volume,
            window_trades: self.window.len(),
            toxicity: self.scores.0,
            short_toxicity: self.scores.1,
        }
    }

    pub fn recent(&self) -> impl Iterator<Item = &TradePrint> {
        self.ring.iter()
    }

    pub fn trades_processed(&self) -> u64 {
        self.trades_processed
    }

    pub fn clear(&mut self) {
        self.ring.clear();
        self.window.clear();
        self.buy_volume = 0.0;
        self.sell_volume = 0.0;
        self.scores = (0, 0);
    }
}
