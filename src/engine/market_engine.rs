// Market Engine - one instrument's complete analytics state
// Cheap per-tick updates run inline; windowed recomputation is debounced

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::config::EngineConfig;
use crate::core::events::{Event, EventBus, EventPriority};
use crate::core::types::{Backfill, Candle, DepthSnapshot, Direction, Interval, KlineTick, TradePrint};
use crate::engine::scheduler::RecomputeScheduler;
use crate::engine::snapshot::{DerivedMetrics, EngineSnapshot, EngineStatus, MarketMetrics, SnapshotDelta};
use crate::layer2::orderbook::DepthBook;
use crate::layer2::parser::{MessageParser, ParseError, ParsedMessage};
use crate::layer3::common::event_types::{
    ALERT_TRIGGERED, BIAS_CHANGE, BREAK_OF_STRUCTURE, FAIR_VALUE_GAP, INSTRUMENT_RESET,
    LIQUIDITY_SWEEP, POSITION_CLOSED, POSITION_OPENED, REGIME_CHANGE,
};
use crate::layer3::common::stats::{excess_kurtosis, log_returns, skewness};
use crate::layer3::kline::indicators::{adx_series, rsi, zscore_band_series};
use crate::layer3::kline::bias_matrix::TimeframeBias;
use crate::layer3::kline::{BiasMatrix, CandleSeries, RegimeClassifier, TickOutcome};
use crate::layer3::risk::{
    position_edge, AlertDecision, AlertEvaluator, AlertSnapshot, BayesianBelief, ClosedTrade,
    RiskEngine, RiskError,
};
use crate::layer3::structure::{LiquidityEvent, LiquidityEventDetector, LiquidityState};
use crate::layer3::trade::TradeFlowTracker;

const SOURCE: &str = "market_engine";

/// Closes used for the return-distribution shape, as a multiple of the band window
const SHAPE_MULTIPLE: usize = 5;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Risk(#[from] RiskError),
    #[error("Engine service closed")]
    ServiceClosed,
    #[error("Engine input queue full")]
    QueueFull,
}

/// Commands from the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    OpenPosition {
        direction: Direction,
        entry: f64,
        stop: f64,
        target: f64,
    },
    ClosePosition {
        exit_price: f64,
    },
    SetRiskPercent(f64),
    /// Full reset for a new instrument
    SetInstrument {
        symbol: String,
        interval: Interval,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineInput {
    Kline(KlineTick),
    Trade(TradePrint),
    DepthSnapshot(DepthSnapshot),
    DepthUpdate(DepthSnapshot),
    Backfill(Backfill),
    /// Raw feed payload, parsed at the boundary
    Raw(String),
    Command(EngineCommand),
    /// Debounce timer fired
    Recompute,
}

impl From<ParsedMessage> for EngineInput {
    fn from(msg: ParsedMessage) -> Self {
        match msg {
            ParsedMessage::Kline(k) => EngineInput::Kline(k),
            ParsedMessage::Trade(t) => EngineInput::Trade(t),
            ParsedMessage::DepthSnapshot(d) => EngineInput::DepthSnapshot(d),
            ParsedMessage::DepthUpdate(d) => EngineInput::DepthUpdate(d),
        }
    }
}

/// Shared snapshot parts; `None` means the source changed since the last build
#[derive(Default)]
struct SnapshotViews {
    candles: Option<Arc<[Candle]>>,
    bias: Option<Arc<[TimeframeBias]>>,
    liquidity: Option<Arc<LiquidityState>>,
    history: Option<Arc<[ClosedTrade]>>,
}

pub struct MarketEngine {
    config: EngineConfig,
    parser: MessageParser,
    series: CandleSeries,
    flow: TradeFlowTracker,
    book: DepthBook,
    belief: BayesianBelief,
    risk: RiskEngine,
    regime: RegimeClassifier,
    structure: LiquidityEventDetector,
    bias: BiasMatrix,
    alerts: AlertEvaluator,
    scheduler: RecomputeScheduler,
    derived: DerivedMetrics,
    last_alert: Option<AlertDecision>,
    views: SnapshotViews,
    event_bus: Arc<EventBus>,
    recomputes: u64,
}

impl MarketEngine {
    pub fn new(config: EngineConfig) -> Self {
        let event_bus = Arc::new(EventBus::new(config.monitoring.event_history));
        Self::with_event_bus(config, event_bus)
    }

    pub fn with_event_bus(config: EngineConfig, event_bus: Arc<EventBus>) -> Self {
        info!(
            symbol = %config.feed.symbol,
            interval = %config.feed.interval,
            "Creating market engine"
        );

        Self {
            parser: MessageParser::new(&config.feed.symbol, config.feed.interval),
            series: CandleSeries::new(config.feed.history_limit),
            flow: TradeFlowTracker::new(&config.toxicity),
            book: DepthBook::new(config.monitoring.depth_levels),
            belief: BayesianBelief::new(&config.risk),
            risk: RiskEngine::new(&config.risk),
            regime: RegimeClassifier::new(config.indicators.clone()),
            structure: LiquidityEventDetector::new(config.structure.clone()),
            bias: BiasMatrix::new(config.bias.clone(), config.indicators.rsi_period),
            alerts: AlertEvaluator::new(),
            scheduler: RecomputeScheduler::new(config.scheduler.debounce_ms),
            derived: DerivedMetrics::default(),
            last_alert: None,
            views: SnapshotViews::default(),
            event_bus,
            recomputes: 0,
            config,
        }
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.event_bus.clone()
    }

    pub fn symbol(&self) -> &str {
        &self.config.feed.symbol
    }

    pub fn interval(&self) -> Interval {
        self.config.feed.interval
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &RecomputeScheduler {
        &self.scheduler
    }

    pub fn parser(&self) -> &MessageParser {
        &self.parser
    }

    pub fn status(&self) -> EngineStatus {
        if self.series.is_empty() {
            EngineStatus::NotReady
        } else {
            EngineStatus::Ready
        }
    }

    /// Ingest at wall-clock time
    pub fn ingest(&mut self, input: EngineInput) -> Result<SnapshotDelta, EngineError> {
        self.ingest_at(input, Utc::now().timestamp_millis())
    }

    pub fn ingest_at(&mut self, input: EngineInput, now_ms: i64) -> Result<SnapshotDelta, EngineError> {
        match input {
            EngineInput::Kline(tick) => Ok(self.on_kline(&tick, now_ms)),
            EngineInput::Trade(trade) => Ok(self.on_trade(&trade)),
            EngineInput::DepthSnapshot(depth) => {
                self.book.apply_snapshot(&depth);
                Ok(SnapshotDelta { depth_updated: true, ..Default::default() })
            }
            EngineInput::DepthUpdate(depth) => {
                self.book.apply_update(&depth);
                Ok(SnapshotDelta { depth_updated: true, ..Default::default() })
            }
            EngineInput::Backfill(backfill) => Ok(self.on_backfill(&backfill, now_ms)),
            EngineInput::Raw(raw) => self.ingest_raw(&raw, now_ms),
            EngineInput::Command(command) => self.execute(command, now_ms),
            EngineInput::Recompute => {
                // A reset may have cancelled the deadline after the timer fired
                if self.scheduler.is_pending() {
                    Ok(self.recompute(now_ms))
                } else {
                    Ok(SnapshotDelta::default())
                }
            }
        }
    }

    /// Parse a raw feed payload and ingest it. Failures are counted by the parser.
    pub fn ingest_raw(&mut self, raw_json: &str, now_ms: i64) -> Result<SnapshotDelta, EngineError> {
        match self.parser.parse(raw_json) {
            Ok(msg) => self.ingest_at(msg.into(), now_ms),
            Err(e) => {
                warn!(error = %e, "Dropping unparseable feed message");
                Err(e.into())
            }
        }
    }

    /// Run the pending recompute if its deadline has passed
    pub fn poll(&mut self, now_ms: i64) -> Option<SnapshotDelta> {
        if self.scheduler.due(now_ms) {
            Some(self.recompute(now_ms))
        } else {
            None
        }
    }

    fn on_kline(&mut self, tick: &KlineTick, now_ms: i64) -> SnapshotDelta {
        let outcome = self.series.apply(tick);
        if outcome == TickOutcome::Discarded {
            return SnapshotDelta { candle: Some(outcome), ..Default::default() };
        }

        self.views.candles = None;

        // Quiet tape still ages out of the flow window
        self.flow.prune(now_ms);
        let posterior = self.belief.observe(tick.close, self.flow.ofi());
        let position = self.risk.mark(tick.close).cloned();
        self.scheduler.arm(now_ms);

        SnapshotDelta {
            candle: Some(outcome),
            last_candle: self.series.last().cloned(),
            position,
            posterior: Some(posterior),
            recompute_armed: true,
            ..Default::default()
        }
    }

    fn on_trade(&mut self, trade: &TradePrint) -> SnapshotDelta {
        self.flow.push(trade);
        SnapshotDelta {
            trade_processed: true,
            position: self.risk.mark(trade.price).cloned(),
            ..Default::default()
        }
    }

    fn on_backfill(&mut self, backfill: &Backfill, now_ms: i64) -> SnapshotDelta {
        let loaded = self.series.load_backfill(backfill);
        self.views.candles = None;
        info!(
            symbol = %self.config.feed.symbol,
            candles = loaded,
            cvd_seed = backfill.cvd_seed,
            "Backfill applied"
        );
        if loaded == 0 {
            warn!(symbol = %self.config.feed.symbol, "Backfill was empty, engine not ready");
            return SnapshotDelta { backfilled: Some(0), ..Default::default() };
        }

        // Bulk load: recompute now rather than waiting out the debounce
        self.scheduler.arm(now_ms);
        let mut delta = SnapshotDelta {
            backfilled: Some(loaded),
            last_candle: self.series.last().cloned(),
            ..Default::default()
        };
        delta.merge(self.recompute(now_ms));
        delta
    }

    /// Apply a presentation-layer command. A refusal leaves state untouched.
    pub fn execute(&mut self, command: EngineCommand, now_ms: i64) -> Result<SnapshotDelta, EngineError> {
        match command {
            EngineCommand::OpenPosition { direction, entry, stop, target } => {
                let last_price = self.series.last().map(|c| c.close);
                self.risk.open(direction, entry, stop, target, now_ms)?;
                let position = match last_price {
                    Some(price) => self.risk.mark(price).cloned(),
                    None => self.risk.active().cloned(),
                };
                if let Some(p) = &position {
                    self.publish(POSITION_OPENED, now_ms, p, EventPriority::Critical);
                }
                Ok(SnapshotDelta { position, ..Default::default() })
            }
            EngineCommand::ClosePosition { exit_price } => {
                let trade = self.risk.close(exit_price, now_ms)?;
                self.views.history = None;
                self.publish(POSITION_CLOSED, now_ms, &trade, EventPriority::Critical);
                Ok(SnapshotDelta { closed_trade: Some(trade), ..Default::default() })
            }
            EngineCommand::SetRiskPercent(pct) => {
                self.risk.set_risk_percent(pct)?;
                info!(risk_percent = pct, "Risk percent updated");
                Ok(SnapshotDelta::default())
            }
            EngineCommand::SetInstrument { symbol, interval } => {
                Ok(self.reset_instrument(&symbol, interval, now_ms))
            }
        }
    }

    /// Drop every piece of derived state so nothing leaks across instruments
    fn reset_instrument(&mut self, symbol: &str, interval: Interval, now_ms: i64) -> SnapshotDelta {
        let symbol = symbol.to_uppercase();
        info!(
            from = %self.config.feed.symbol,
            to = %symbol,
            interval = %interval,
            "Switching instrument"
        );

        self.scheduler.cancel();
        self.series.clear();
        self.flow.clear();
        self.book.clear();
        self.belief.reset();
        self.structure.clear();
        self.bias.reset();
        self.derived = DerivedMetrics::default();
        self.last_alert = None;
        self.views = SnapshotViews::default();
        if let Some(abandoned) = self.risk.abandon() {
            warn!(position = %abandoned.id, "Open position abandoned on instrument switch");
        }

        self.config.feed.symbol = symbol.clone();
        self.config.feed.interval = interval;
        self.parser.set_instrument(&symbol, interval);

        self.publish(
            INSTRUMENT_RESET,
            now_ms,
            &serde_json::json!({ "symbol": symbol, "interval": interval }),
            EventPriority::Info,
        );
        SnapshotDelta { reset: true, ..Default::default() }
    }

    /// Windowed recomputation over the whole candle sequence
    pub fn recompute(&mut self, now_ms: i64) -> SnapshotDelta {
        if !self.scheduler.begin() {
            return SnapshotDelta::default();
        }
        let started = Instant::now();
        let cfg = &self.config.indicators;

        let adx = adx_series(self.series.candles(), cfg.adx_period);
        let closes = self.series.closes();
        let bands = zscore_band_series(&closes, cfg.band_window);
        self.series.annotate(&adx, &bands);

        let candles = self.series.candles();
        let regime = self.regime.classify(candles);
        let new_events = self.structure.scan(candles);
        let bias_changes = self.bias.recompute(candles, now_ms);

        let shape_from = closes.len().saturating_sub(cfg.band_window * SHAPE_MULTIPLE);
        let returns = log_returns(&closes[shape_from..]);

        let next = DerivedMetrics {
            adx: adx.last().copied().flatten(),
            rsi: rsi(&closes, cfg.rsi_period),
            skew: skewness(&returns),
            kurtosis: excess_kurtosis(&returns),
            computed_at: now_ms,
            regime,
        };

        self.flow.refresh_toxicity();

        let previous = self.derived.regime.regime;
        let current = next.regime.regime;
        self.derived = next;
        self.recomputes += 1;
        self.views.candles = None;
        self.views.bias = None;
        self.views.liquidity = None;

        let regime_change = (previous != current).then_some((previous, current));
        if regime_change.is_some() {
            info!(from = %previous, to = %current, "Regime changed");
            self.publish(
                REGIME_CHANGE,
                now_ms,
                &serde_json::json!({ "from": previous, "to": current }),
                EventPriority::Medium,
            );
        }
        for event in &new_events {
            let (event_type, priority) = match event {
                LiquidityEvent::Sweep { .. } => (LIQUIDITY_SWEEP, EventPriority::Medium),
                LiquidityEvent::BreakOfStructure { .. } => (BREAK_OF_STRUCTURE, EventPriority::High),
                LiquidityEvent::FairValueGap { .. } => (FAIR_VALUE_GAP, EventPriority::Low),
            };
            self.publish(event_type, now_ms, event, priority);
        }
        for change in &bias_changes {
            self.publish(BIAS_CHANGE, now_ms, change, EventPriority::Low);
        }

        let alert = self.evaluate_alert();
        if alert.should_alert {
            self.publish(ALERT_TRIGGERED, now_ms, &alert, EventPriority::High);
        }
        self.last_alert = Some(alert.clone());

        self.scheduler.finish();
        debug!(
            candles = self.series.len(),
            new_events = new_events.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "Recompute finished"
        );

        SnapshotDelta {
            recomputed: true,
            new_events,
            regime_change,
            bias_changes,
            alert: Some(alert),
            ..Default::default()
        }
    }

    fn price(&self) -> f64 {
        self.series.last().map_or(0.0, |c| c.close)
    }

    fn z_score(&self) -> f64 {
        self.series
            .last()
            .and_then(|c| c.bands.map(|b| b.z_score(c.close)))
            .unwrap_or(0.0)
    }

    fn change_pct(&self) -> f64 {
        match (self.series.candles().first(), self.series.last()) {
            (Some(first), Some(last)) if first.open != 0.0 => (last.close - first.open) / first.open * 100.0,
            _ => 0.0,
        }
    }

    fn evaluate_alert(&self) -> AlertDecision {
        let posterior = self.belief.posterior();
        let latest_sweep_side = match self.structure.latest_sweep() {
            Some(LiquidityEvent::Sweep { side, .. }) => Some(*side),
            _ => None,
        };
        self.alerts.evaluate(&AlertSnapshot {
            symbol: self.config.feed.symbol.clone(),
            price: self.price(),
            z_score: self.z_score(),
            tactical_probability: posterior * 100.0,
            directional_score: posterior - 0.5,
            latest_sweep_side,
        })
    }

    fn publish<T: serde::Serialize>(&self, event_type: &str, now_ms: i64, payload: &T, priority: EventPriority) {
        self.event_bus
            .publish(Event::from_payload(event_type, now_ms, payload, SOURCE, priority));
    }

    /// Whole-state view; built from owned state so it is never partial.
    /// Shared parts are reused until their source changes.
    pub fn snapshot(&mut self) -> EngineSnapshot {
        let candles = self
            .views
            .candles
            .get_or_insert_with(|| Arc::from(self.series.candles()))
            .clone();
        let bias = self
            .views
            .bias
            .get_or_insert_with(|| Arc::from(self.bias.entries()))
            .clone();
        let liquidity = self
            .views
            .liquidity
            .get_or_insert_with(|| Arc::new(self.structure.state()))
            .clone();
        let history = self
            .views
            .history
            .get_or_insert_with(|| Arc::from(self.risk.history()))
            .clone();

        let flow = self.flow.metrics();
        EngineSnapshot {
            symbol: self.config.feed.symbol.clone(),
            interval: self.config.feed.interval,
            status: self.status(),
            candles,
            metrics: MarketMetrics {
                price: self.price(),
                change_pct: self.change_pct(),
                toxicity: flow.toxicity,
                short_toxicity: flow.short_toxicity,
                ofi: flow.ofi,
                buy_volume: flow.buy_volume,
                sell_volume: flow.sell_volume,
                cvd: self.series.cvd().running(),
                posterior: self.belief.posterior(),
                z_score: self.z_score(),
                derived: self.derived.clone(),
                depth: self.book.metrics(),
            },
            bias,
            bias_loading: self.bias.is_loading(),
            liquidity,
            position: self.risk.active().cloned(),
            edge: self.risk.active().map(|p| {
                let posterior = self.belief.posterior();
                let win_probability = match p.direction {
                    Direction::Long => posterior,
                    Direction::Short => 1.0 - posterior,
                };
                position_edge(p, win_probability)
            }),
            daily: self.risk.daily_stats().clone(),
            history,
            risk_percent: self.risk.risk_percent(),
            account_size: self.risk.account_size(),
            last_alert: self.last_alert.clone(),
            recomputes: self.recomputes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{MarketRegime, Side};

    const MIN: i64 = 60_000;

    fn tick(i: i64, close: f64, is_closed: bool) -> KlineTick {
        KlineTick::new(i * MIN, close, close + 1.0, close - 1.0, close, 10.0, Some(6.0), is_closed)
    }

    fn backfill(n: i64) -> Backfill {
        Backfill {
            klines: (0..n).map(|i| tick(i, 100.0 + i as f64, i < n - 1)).collect(),
            cvd_seed: 0.0,
        }
    }

    fn engine() -> MarketEngine {
        MarketEngine::new(EngineConfig::default())
    }

    #[test]
    fn test_not_ready_until_candles() {
        let mut e = engine();
        assert_eq!(e.snapshot().status, EngineStatus::NotReady);
        let d = e.ingest_at(EngineInput::Backfill(Backfill::default()), 0).unwrap();
        assert_eq!(d.backfilled, Some(0));
        assert!(!e.snapshot().is_ready());
    }

    #[test]
    fn test_backfill_recomputes_immediately() {
        let mut e = engine();
        let d = e.ingest_at(EngineInput::Backfill(backfill(120)), 0).unwrap();
        assert!(d.recomputed);
        let snap = e.snapshot();
        assert!(snap.is_ready());
        assert_eq!(snap.candles.len(), 120);
        assert_eq!(snap.recomputes, 1);
        assert_eq!(snap.regime(), MarketRegime::TrendingUp);
        assert!(snap.metrics.derived.adx.is_some());
    }

    #[test]
    fn test_ticks_debounce_recompute() {
        let mut e = engine();
        e.ingest_at(EngineInput::Backfill(backfill(60)), 0).unwrap();

        for ms in [100, 400, 900] {
            let d = e.ingest_at(EngineInput::Kline(tick(59, 160.0, false)), ms).unwrap();
            assert!(d.recompute_armed);
            assert!(!d.recomputed);
        }
        assert!(e.poll(1_500).is_none());
        assert!(e.poll(1_900).is_some_and(|d| d.recomputed));
        assert!(e.poll(5_000).is_none());
        assert_eq!(e.snapshot().recomputes, 2);
    }

    #[test]
    fn test_stale_tick_leaves_state() {
        let mut e = engine();
        e.ingest_at(EngineInput::Backfill(backfill(10)), 0).unwrap();
        let before = e.snapshot();
        let d = e.ingest_at(EngineInput::Kline(tick(3, 1.0, true)), 10).unwrap();
        assert_eq!(d.candle, Some(TickOutcome::Discarded));
        assert!(!e.scheduler().is_pending());
        assert_eq!(e.snapshot(), before);
    }

    #[test]
    fn test_position_commands() {
        let mut e = engine();
        e.ingest_at(EngineInput::Backfill(backfill(10)), 0).unwrap();

        let open = EngineCommand::OpenPosition {
            direction: Direction::Long,
            entry: 100.0,
            stop: 95.0,
            target: 110.0,
        };
        let d = e.execute(open.clone(), 1).unwrap();
        assert_eq!(d.position.as_ref().map(|p| p.size), Some(20.0));
        let edge = e.snapshot().edge.unwrap();
        assert_eq!(edge.rr_ratio, 2.0);
        assert_eq!(edge.loss_amount, 100.0);
        assert!(matches!(e.execute(open, 2), Err(EngineError::Risk(RiskError::PositionAlreadyOpen))));

        let d = e.ingest_at(EngineInput::Trade(TradePrint::new(105.0, 1.0, Side::Buy, 3)), 3).unwrap();
        assert_eq!(d.position.map(|p| p.floating_r), Some(1.0));

        let d = e.execute(EngineCommand::ClosePosition { exit_price: 105.0 }, 4).unwrap();
        assert_eq!(d.closed_trade.map(|t| t.realized_pnl), Some(100.0));

        let snap = e.snapshot();
        assert!(snap.position.is_none());
        assert_eq!(snap.daily.trades, 1);
        assert_eq!(snap.history.len(), 1);
        assert_eq!(e.event_bus().get_recent_events(Some(POSITION_CLOSED), None).len(), 1);
    }

    #[test]
    fn test_instrument_switch_resets() {
        let mut e = engine();
        e.ingest_at(EngineInput::Backfill(backfill(60)), 0).unwrap();
        e.ingest_at(EngineInput::Kline(tick(60, 161.0, false)), 10).unwrap();
        assert!(e.scheduler().is_pending());

        let d = e
            .execute(
                EngineCommand::SetInstrument { symbol: "ethusdt".to_string(), interval: Interval::FiveMinutes },
                20,
            )
            .unwrap();
        assert!(d.reset);
        assert!(!e.scheduler().is_pending());

        // Timer message that was already in flight
        let d = e.ingest_at(EngineInput::Recompute, 2_000).unwrap();
        assert!(!d.recomputed);

        let snap = e.snapshot();
        assert_eq!(snap.symbol, "ETHUSDT");
        assert_eq!(snap.interval, Interval::FiveMinutes);
        assert_eq!(snap.status, EngineStatus::NotReady);
        assert_eq!(snap.metrics.cvd, 0.0);
        assert_eq!(snap.metrics.derived, DerivedMetrics::default());
        assert!(snap.liquidity.sweeps.is_empty());
    }

    #[test]
    fn test_snapshot_reuses_unchanged_buffers() {
        let mut e = engine();
        e.ingest_at(EngineInput::Backfill(backfill(60)), 0).unwrap();
        let first = e.snapshot();

        e.ingest_at(EngineInput::Trade(TradePrint::new(158.0, 1.0, Side::Sell, 5)), 5).unwrap();
        e.ingest_at(EngineInput::DepthSnapshot(DepthSnapshot::default()), 6).unwrap();
        let second = e.snapshot();
        assert!(Arc::ptr_eq(&first.candles, &second.candles));
        assert!(Arc::ptr_eq(&first.bias, &second.bias));
        assert!(Arc::ptr_eq(&first.liquidity, &second.liquidity));
        assert!(Arc::ptr_eq(&first.history, &second.history));
        assert_eq!(second.metrics.sell_volume, 1.0);

        // A kline moves the candle buffer but leaves the recompute outputs alone
        e.ingest_at(EngineInput::Kline(tick(59, 160.5, false)), 7).unwrap();
        let third = e.snapshot();
        assert!(!Arc::ptr_eq(&second.candles, &third.candles));
        assert_eq!(third.candles.last().map(|c| c.close), Some(160.5));
        assert!(Arc::ptr_eq(&second.bias, &third.bias));

        assert!(e.poll(2_000).is_some());
        let fourth = e.snapshot();
        assert!(!Arc::ptr_eq(&third.liquidity, &fourth.liquidity));
    }

    #[test]
    fn test_toxicity_refreshes_with_recompute() {
        let mut e = engine();
        e.ingest_at(EngineInput::Backfill(backfill(60)), 0).unwrap();
        for i in 0..20 {
            e.ingest_at(EngineInput::Trade(TradePrint::new(159.0, 25.0, Side::Buy, i)), i).unwrap();
        }
        assert_eq!(e.snapshot().metrics.toxicity, 0);

        e.ingest_at(EngineInput::Kline(tick(59, 159.5, false)), 30).unwrap();
        assert!(e.poll(1_030).is_some());
        let snap = e.snapshot();
        assert_eq!(snap.metrics.toxicity, 100);
        assert_eq!(snap.metrics.short_toxicity, 100);
    }

    #[test]
    fn test_raw_errors_surface() {
        let mut e = engine();
        assert!(matches!(e.ingest_raw("not json", 0), Err(EngineError::Parse(_))));
        assert_eq!(e.parser().stats.parse_errors, 1);
    }
}
