// Depth Book - latest bid/ask ladder and the metrics derived from it

use ordered_float::OrderedFloat;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, trace};

use crate::core::types::{BookLevel, DepthSnapshot};

type Price = OrderedFloat<f64>;
type Quantity = f64;

/// Book metrics published in the engine snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DepthMetrics {
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    pub mid_price: Option<f64>,
    pub spread_bps: Option<f64>,
    /// (bidQty - askQty) / (bidQty + askQty) over the top levels, in [-1, 1]
    pub imbalance: f64,
    pub bid_levels: usize,
    pub ask_levels: usize,
    pub timestamp: i64,
}

impl fmt::Display for DepthMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DepthMetrics(mid={:?}, spread_bps={:?}, imbalance={:.3})",
            self.mid_price, self.spread_bps, self.imbalance
        )
    }
}

pub struct DepthBook {
    // BTreeMap keeps entries sorted automatically
    bids: BTreeMap<Price, Quantity>,
    asks: BTreeMap<Price, Quantity>,
    depth_levels: usize,
    last_update: i64,
    snapshot_count: u64,
    update_count: u64,
}

impl DepthBook {
    pub fn new(depth_levels: usize) -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            depth_levels: depth_levels.max(1),
            last_update: 0,
            snapshot_count: 0,
            update_count: 0,
        }
    }

    /// Replace the entire book
    pub fn apply_snapshot(&mut self, snapshot: &DepthSnapshot) {
        self.bids.clear();
        self.asks.clear();
        insert_levels(&mut self.bids, &snapshot.bids);
        insert_levels(&mut self.asks, &snapshot.asks);
        self.last_update = snapshot.timestamp;
        self.snapshot_count += 1;

        debug!(
            bid_levels = self.bids.len(),
            ask_levels = self.asks.len(),
            "Depth snapshot applied"
        );
    }

    /// Merge level changes; a zero size removes the level
    pub fn apply_update(&mut self, update: &DepthSnapshot) {
        merge_levels(&mut self.bids, &update.bids);
        merge_levels(&mut self.asks, &update.asks);
        if update.timestamp > 0 {
            self.last_update = update.timestamp;
        }
        self.update_count += 1;
        trace!(bids = update.bids.len(), asks = update.asks.len(), "Depth update merged");
    }

    pub fn best_bid(&self) -> Option<(f64, f64)> {
        self.bids.iter().next_back().map(|(p, q)| (p.0, *q))
    }

    pub fn best_ask(&self) -> Option<(f64, f64)> {
        self.asks.iter().next().map(|(p, q)| (p.0, *q))
    }

    pub fn mid_price(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => Some((bid + ask) / 2.0),
            _ => None,
        }
    }

    pub fn spread_bps(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask(), self.mid_price()) {
            (Some((bid, _)), Some((ask, _)), Some(mid)) if mid > 0.0 => {
                Some((ask - bid) / mid * 10_000.0)
            }
            _ => None,
        }
    }

    /// Size imbalance over the best `depth_levels` on each side; 0 on an empty book
    pub fn imbalance(&self) -> f64 {
        let bid_qty: f64 = self.bids.values().rev().take(self.depth_levels).sum();
        let ask_qty: f64 = self.asks.values().take(self.depth_levels).sum();
        let total = bid_qty + ask_qty;
        if total > 0.0 {
            (bid_qty - ask_qty) / total
        } else {
            0.0
        }
    }

    /// Best-first levels on each side
    pub fn top_levels(&self, n: usize) -> DepthSnapshot {
        DepthSnapshot {
            bids: self.bids.iter().rev().take(n).map(|(p, q)| BookLevel::new(p.0, *q)).collect(),
            asks: self.asks.iter().take(n).map(|(p, q)| BookLevel::new(p.0, *q)).collect(),
            timestamp: self.last_update,
        }
    }

    pub fn metrics(&self) -> DepthMetrics {
        DepthMetrics {
            best_bid: self.best_bid().map(|(p, _)| p),
            best_ask: self.best_ask().map(|(p, _)| p),
            mid_price: self.mid_price(),
            spread_bps: self.spread_bps(),
            imbalance: self.imbalance(),
            bid_levels: self.bids.len(),
            ask_levels: self.asks.len(),
            timestamp: self.last_update,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    pub fn stats(&self) -> (u64, u64) {
        (self.snapshot_count, self.update_count)
    }

    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.last_update = 0;
    }
}

fn insert_levels(side: &mut BTreeMap<Price, Quantity>, levels: &[BookLevel]) {
    for level in levels {
        if level.size > 0.0 {
            side.insert(OrderedFloat(level.price), level.size);
        }
    }
}

fn merge_levels(side: &mut BTreeMap<Price, Quantity>, levels: &[BookLevel]) {
    for level in levels {
        let key = OrderedFloat(level.price);
        if level.size == 0.0 {
            side.remove(&key);
        } else {
            side.insert(key, level.size);
        }
    }
}
