// Engine Snapshot - the read-only view handed to the presentation layer,
// and the per-ingest delta describing what one input changed

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::core::types::{Candle, Interval, MarketRegime};
use crate::layer2::orderbook::DepthMetrics;
use crate::layer3::kline::bias_matrix::{BiasChange, TimeframeBias};
use crate::layer3::kline::candle_aggregator::TickOutcome;
use crate::layer3::kline::regime::RegimeState;
use crate::layer3::risk::alerts::AlertDecision;
use crate::layer3::risk::expected_value::EdgeEstimate;
use crate::layer3::risk::position::{ClosedTrade, DailyStats, Position};
use crate::layer3::structure::liquidity::{LiquidityEvent, LiquidityState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineStatus {
    /// No candles yet, neither backfilled nor live
    NotReady,
    Ready,
}

/// Derived values replaced as a whole at the end of every recompute
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedMetrics {
    pub regime: RegimeState,
    pub adx: Option<f64>,
    pub rsi: f64,
    pub skew: f64,
    pub kurtosis: f64,
    pub computed_at: i64,
}

impl Default for DerivedMetrics {
    fn default() -> Self {
        Self {
            regime: RegimeState::default(),
            adx: None,
            rsi: 50.0,
            skew: 0.0,
            kurtosis: 0.0,
            computed_at: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketMetrics {
    pub price: f64,
    pub change_pct: f64,
    pub toxicity: u8,
    pub short_toxicity: u8,
    pub ofi: f64,
    pub buy_volume: f64,
    pub sell_volume: f64,
    pub cvd: f64,
    pub posterior: f64,
    pub z_score: f64,
    pub derived: DerivedMetrics,
    pub depth: DepthMetrics,
}

/// Whole-state view. The sequence-sized parts are shared with the engine and
/// only rebuilt when their source changes, so consecutive snapshots taken
/// across trade or depth inputs point at the same buffers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSnapshot {
    pub symbol: String,
    pub interval: Interval,
    pub status: EngineStatus,
    pub candles: Arc<[Candle]>,
    pub metrics: MarketMetrics,
    pub bias: Arc<[TimeframeBias]>,
    pub bias_loading: bool,
    pub liquidity: Arc<LiquidityState>,
    pub position: Option<Position>,
    /// Target-or-stop edge of the active position at the current belief
    pub edge: Option<EdgeEstimate>,
    pub daily: DailyStats,
    pub history: Arc<[ClosedTrade]>,
    pub risk_percent: f64,
    pub account_size: f64,
    pub last_alert: Option<AlertDecision>,
    pub recomputes: u64,
}

impl EngineSnapshot {
    pub fn is_ready(&self) -> bool {
        self.status == EngineStatus::Ready
    }

    pub fn regime(&self) -> MarketRegime {
        self.metrics.derived.regime.regime
    }
}

impl fmt::Display for EngineSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EngineSnapshot({} {}, status={:?}, candles={}, price={:.2}, regime={})",
            self.symbol,
            self.interval,
            self.status,
            self.candles.len(),
            self.metrics.price,
            self.regime()
        )
    }
}

/// What a single ingest changed
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SnapshotDelta {
    pub candle: Option<TickOutcome>,
    pub last_candle: Option<Candle>,
    pub trade_processed: bool,
    pub depth_updated: bool,
    pub backfilled: Option<usize>,
    pub position: Option<Position>,
    pub closed_trade: Option<ClosedTrade>,
    pub posterior: Option<f64>,
    pub recompute_armed: bool,
    pub recomputed: bool,
    pub new_events: Vec<LiquidityEvent>,
    pub regime_change: Option<(MarketRegime, MarketRegime)>,
    pub bias_changes: Vec<BiasChange>,
    pub alert: Option<AlertDecision>,
    pub reset: bool,
}

impl SnapshotDelta {
    pub fn is_empty(&self) -> bool {
        *self == SnapshotDelta::default()
    }

    /// Fold a later delta into this one
    pub fn merge(&mut self, other: SnapshotDelta) {
        self.candle = other.candle.or(self.candle);
        self.last_candle = other.last_candle.or(self.last_candle.take());
        self.trade_processed |= other.trade_processed;
        self.depth_updated |= other.depth_updated;
        self.backfilled = other.backfilled.or(self.backfilled);
        self.position = other.position.or(self.position.take());
        self.closed_trade = other.closed_trade.or(self.closed_trade.take());
        self.posterior = other.posterior.or(self.posterior);
        self.recompute_armed |= other.recompute_armed;
        self.recomputed |= other.recomputed;
        self.new_events.extend(other.new_events);
        self.regime_change = other.regime_change.or(self.regime_change);
        self.bias_changes.extend(other.bias_changes);
        self.alert = other.alert.or(self.alert.take());
        self.reset |= other.reset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_delta() {
        assert!(SnapshotDelta::default().is_empty());
        let d = SnapshotDelta { trade_processed: true, ..Default::default() };
        assert!(!d.is_empty());
    }

    #[test]
    fn test_merge_keeps_latest() {
        let mut a = SnapshotDelta {
            posterior: Some(0.4),
            recompute_armed: true,
            ..Default::default()
        };
        a.merge(SnapshotDelta {
            posterior: Some(0.6),
            recomputed: true,
            ..Default::default()
        });
        assert_eq!(a.posterior, Some(0.6));
        assert!(a.recompute_armed && a.recomputed);
    }
}
