// Liquidity Event Detector - pivots, sweeps, breaks of structure, fair value gaps
// Rescans a trailing window on every refresh; results are deduplicated and capped

use serde::Serialize;
use std::collections::VecDeque;
use tracing::debug;

use crate::core::config::StructureConfig;
use crate::core::types::{Bias, Candle, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PivotKind {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pivot {
    /// Index into the slice that was scanned
    pub index: usize,
    pub price: f64,
    pub kind: PivotKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LiquidityEvent {
    /// Price poked through a pivot and closed back; `side` is the liquidity taken
    Sweep { price: f64, side: Side, time: i64 },
    /// Price closed beyond a pivot; `direction` is the breakout direction
    BreakOfStructure { price: f64, direction: Bias, time: i64 },
    FairValueGap {
        start_price: f64,
        end_price: f64,
        direction: Bias,
        time: i64,
    },
}

impl LiquidityEvent {
    pub fn time(&self) -> i64 {
        match self {
            LiquidityEvent::Sweep { time, .. }
            | LiquidityEvent::BreakOfStructure { time, .. }
            | LiquidityEvent::FairValueGap { time, .. } => *time,
        }
    }

    /// Same category, same side, prices within `tolerance`
    pub fn is_duplicate_of(&self, other: &LiquidityEvent, tolerance: f64) -> bool {
        let near = |a: f64, b: f64| (a - b).abs() <= tolerance;
        match (self, other) {
            (
                LiquidityEvent::Sweep { price: a, side: sa, .. },
                LiquidityEvent::Sweep { price: b, side: sb, .. },
            ) => sa == sb && near(*a, *b),
            (
                LiquidityEvent::BreakOfStructure { price: a, direction: da, .. },
                LiquidityEvent::BreakOfStructure { price: b, direction: db, .. },
            ) => da == db && near(*a, *b),
            (
                LiquidityEvent::FairValueGap { start_price: s1, end_price: e1, direction: d1, .. },
                LiquidityEvent::FairValueGap { start_price: s2, end_price: e2, direction: d2, .. },
            ) => d1 == d2 && near(*s1, *s2) && near(*e1, *e2),
            _ => false,
        }
    }
}

/// Retained events per category, newest first
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LiquidityState {
    pub sweeps: Vec<LiquidityEvent>,
    pub breaks: Vec<LiquidityEvent>,
    pub gaps: Vec<LiquidityEvent>,
}

/// Pivot highs and lows in `candles`. A candidate needs `confirmation`
/// candles on each side and must beat its `span` neighbours on both sides.
pub fn find_pivots(candles: &[Candle], span: usize, confirmation: usize) -> Vec<Pivot> {
    let margin = span.max(confirmation).max(1);
    let mut pivots = Vec::new();
    if candles.len() <= 2 * margin {
        return pivots;
    }

    for i in margin..candles.len() - margin {
        let neighbours = (1..=span).flat_map(|d| [i - d, i + d]);
        let c = &candles[i];
        if neighbours.clone().all(|j| c.high > candles[j].high) {
            pivots.push(Pivot { index: i, price: c.high, kind: PivotKind::High });
        }
        if neighbours.clone().all(|j| c.low < candles[j].low) {
            pivots.push(Pivot { index: i, price: c.low, kind: PivotKind::Low });
        }
    }
    pivots
}

/// Sweep and break of a pivot resolve independently. The first wick through
/// without a close beyond is the sweep; the first close beyond is the break,
/// which retires the pivot.
fn resolve_pivot(candles: &[Candle], pivot: &Pivot) -> Vec<LiquidityEvent> {
    let mut events = Vec::new();
    let mut swept = false;
    for c in &candles[pivot.index + 1..] {
        let (pierced, closed_beyond) = match pivot.kind {
            PivotKind::High => (c.high > pivot.price, c.close > pivot.price),
            PivotKind::Low => (c.low < pivot.price, c.close < pivot.price),
        };
        if closed_beyond {
            let direction = match pivot.kind {
                PivotKind::High => Bias::Bull,
                PivotKind::Low => Bias::Bear,
            };
            events.push(LiquidityEvent::BreakOfStructure { price: pivot.price, direction, time: c.time });
            break;
        }
        if pierced && !swept {
            swept = true;
            let side = match pivot.kind {
                PivotKind::High => Side::Buy,
                PivotKind::Low => Side::Sell,
            };
            events.push(LiquidityEvent::Sweep { price: pivot.price, side, time: c.time });
        }
    }
    events
}

/// Three-candle gaps between candle i-2 and candle i
pub fn find_fair_value_gaps(candles: &[Candle]) -> Vec<LiquidityEvent> {
    candles
        .windows(3)
        .filter_map(|w| {
            let (first, last) = (&w[0], &w[2]);
            if last.low > first.high {
                Some(LiquidityEvent::FairValueGap {
                    start_price: first.high,
                    end_price: last.low,
                    direction: Bias::Bull,
                    time: last.time,
                })
            } else if last.high < first.low {
                Some(LiquidityEvent::FairValueGap {
                    start_price: last.high,
                    end_price: first.low,
                    direction: Bias::Bear,
                    time: last.time,
                })
            } else {
                None
            }
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
struct EventLog {
    events: VecDeque<LiquidityEvent>,
    watermark: Option<i64>,
}

impl EventLog {
    /// Insert unless stale or a near-duplicate; true when inserted
    fn offer(&mut self, event: LiquidityEvent, tolerance: f64, cap: usize) -> bool {
        if matches!(self.watermark, Some(w) if event.time() < w) {
            return false;
        }
        if self.events.iter().any(|e| event.is_duplicate_of(e, tolerance)) {
            return false;
        }
        self.events.push_front(event);
        self.events.truncate(cap);
        self.watermark = Some(event.time());
        true
    }
}

pub struct LiquidityEventDetector {
    config: StructureConfig,
    sweeps: EventLog,
    breaks: EventLog,
    gaps: EventLog,
}

impl LiquidityEventDetector {
    pub fn new(config: StructureConfig) -> Self {
        Self {
            config,
            sweeps: EventLog::default(),
            breaks: EventLog::default(),
            gaps: EventLog::default(),
        }
    }

    /// Scan the trailing window of finished candles; returns newly recorded
    /// events oldest first
    pub fn scan(&mut self, candles: &[Candle]) -> Vec<LiquidityEvent> {
        let finished = match candles.last() {
            Some(last) if !last.is_closed => &candles[..candles.len() - 1],
            _ => candles,
        };
        let start = finished.len().saturating_sub(self.config.scan_window);
        let window = &finished[start..];

        let mut candidates: Vec<LiquidityEvent> =
            find_pivots(window, self.config.pivot_span, self.config.pivot_confirmation)
                .iter()
                .flat_map(|p| resolve_pivot(window, p))
                .collect();
        candidates.extend(find_fair_value_gaps(window));
        candidates.sort_by_key(LiquidityEvent::time);

        let (tolerance, cap) = (self.config.price_tolerance, self.config.max_events.max(1));
        let mut fresh = Vec::new();
        for event in candidates {
            let log = match event {
                LiquidityEvent::Sweep { .. } => &mut self.sweeps,
                LiquidityEvent::BreakOfStructure { .. } => &mut self.breaks,
                LiquidityEvent::FairValueGap { .. } => &mut self.gaps,
            };
            if log.offer(event, tolerance, cap) {
                fresh.push(event);
            }
        }

        if !fresh.is_empty() {
            debug!(new_events = fresh.len(), window = window.len(), "Liquidity events detected");
        }
        fresh
    }

    pub fn state(&self) -> LiquidityState {
        LiquidityState {
            sweeps: self.sweeps.events.iter().copied().collect(),
            breaks: self.breaks.events.iter().copied().collect(),
            gaps: self.gaps.events.iter().copied().collect(),
        }
    }

    pub fn latest_sweep(&self) -> Option<&LiquidityEvent> {
        self.sweeps.events.front()
    }

    pub fn clear(&mut self) {
        self.sweeps = EventLog::default();
        self.breaks = EventLog::default();
        self.gaps = EventLog::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(i: usize, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            time: i as i64 * 60,
            open: (high + low) / 2.0,
            high,
            low,
            close,
            volume: 1.0,
            delta: 0.0,
            cvd: 0.0,
            is_closed: true,
            adx: None,
            bands: None,
        }
    }

    /// Bars oscillating inside 99..101 with a single spike high at index 5
    fn base_with_pivot_high() -> Vec<Candle> {
        (0..10)
            .map(|i| if i == 5 { bar(i, 105.0, 99.5, 100.0) } else { bar(i, 101.0, 99.0, 100.0) })
            .collect()
    }

    #[test]
    fn test_find_pivot_high_requires_confirmation() {
        let candles = base_with_pivot_high();
        let pivots = find_pivots(&candles, 2, 3);
        assert_eq!(pivots, vec![Pivot { index: 5, price: 105.0, kind: PivotKind::High }]);

        // Only two candles after the spike
        assert!(find_pivots(&candles[..8], 2, 3).is_empty());
    }

    #[test]
    fn test_sweep_of_high() {
        let mut candles = base_with_pivot_high();
        candles.push(bar(10, 106.0, 99.0, 104.0));

        let mut detector = LiquidityEventDetector::new(StructureConfig::default());
        let fresh = detector.scan(&candles);
        assert_eq!(fresh, vec![LiquidityEvent::Sweep { price: 105.0, side: Side::Buy, time: 600 }]);
        assert_eq!(detector.latest_sweep(), fresh.first());
    }

    #[test]
    fn test_break_of_structure_high() {
        let mut candles = base_with_pivot_high();
        candles.push(bar(10, 107.0, 100.0, 106.0));

        let mut detector = LiquidityEventDetector::new(StructureConfig::default());
        detector.scan(&candles);
        let state = detector.state();
        assert!(state.sweeps.is_empty());
        assert_eq!(
            state.breaks,
            vec![LiquidityEvent::BreakOfStructure { price: 105.0, direction: Bias::Bull, time: 600 }]
        );
    }

    #[test]
    fn test_sweep_then_break_of_same_high() {
        let mut candles = base_with_pivot_high();
        candles.push(bar(10, 106.0, 99.0, 104.0));
        candles.push(bar(11, 109.0, 104.0, 108.0));

        let mut detector = LiquidityEventDetector::new(StructureConfig::default());
        detector.scan(&candles);
        let state = detector.state();
        assert_eq!(state.sweeps, vec![LiquidityEvent::Sweep { price: 105.0, side: Side::Buy, time: 600 }]);
        assert_eq!(
            state.breaks,
            vec![LiquidityEvent::BreakOfStructure { price: 105.0, direction: Bias::Bull, time: 660 }]
        );

        // A second wick after the break adds nothing
        candles.push(bar(12, 106.0, 103.0, 104.0));
        detector.scan(&candles);
        assert_eq!(detector.state().sweeps.len(), 1);
        assert_eq!(detector.state().breaks.len(), 1);
    }

    #[test]
    fn test_repeated_wicks_sweep_once() {
        let mut candles = base_with_pivot_high();
        candles.push(bar(10, 106.0, 99.0, 104.0));
        candles.push(bar(11, 105.5, 99.0, 103.0));

        let mut detector = LiquidityEventDetector::new(StructureConfig::default());
        let fresh = detector.scan(&candles);
        assert_eq!(fresh, vec![LiquidityEvent::Sweep { price: 105.0, side: Side::Buy, time: 600 }]);
        assert!(detector.state().breaks.is_empty());
    }

    #[test]
    fn test_sweep_of_low() {
        let mut candles: Vec<Candle> = (0..10)
            .map(|i| if i == 4 { bar(i, 100.5, 95.0, 100.0) } else { bar(i, 101.0, 99.0, 100.0) })
            .collect();
        candles.push(bar(10, 101.0, 94.0, 99.0));

        let mut detector = LiquidityEventDetector::new(StructureConfig::default());
        let fresh = detector.scan(&candles);
        assert_eq!(fresh, vec![LiquidityEvent::Sweep { price: 95.0, side: Side::Sell, time: 600 }]);
    }

    #[test]
    fn test_open_candle_is_not_scanned() {
        let mut candles = base_with_pivot_high();
        let mut open = bar(10, 106.0, 99.0, 104.0);
        open.is_closed = false;
        candles.push(open);

        let mut detector = LiquidityEventDetector::new(StructureConfig::default());
        assert!(detector.scan(&candles).is_empty());
    }

    #[test]
    fn test_bullish_fvg_bounds() {
        let candles = vec![bar(0, 100.0, 98.0, 99.5), bar(1, 104.0, 99.0, 103.0), bar(2, 108.0, 105.0, 107.0)];
        let gaps = find_fair_value_gaps(&candles);
        assert_eq!(
            gaps,
            vec![LiquidityEvent::FairValueGap { start_price: 100.0, end_price: 105.0, direction: Bias::Bull, time: 120 }]
        );
    }

    #[test]
    fn test_bearish_fvg_bounds() {
        let candles = vec![bar(0, 110.0, 105.0, 106.0), bar(1, 106.0, 101.0, 102.0), bar(2, 100.0, 97.0, 98.0)];
        let gaps = find_fair_value_gaps(&candles);
        assert_eq!(
            gaps,
            vec![LiquidityEvent::FairValueGap { start_price: 100.0, end_price: 105.0, direction: Bias::Bear, time: 120 }]
        );
    }

    #[test]
    fn test_rescan_does_not_duplicate() {
        let mut candles = base_with_pivot_high();
        candles.push(bar(10, 106.0, 99.0, 104.0));

        let mut detector = LiquidityEventDetector::new(StructureConfig::default());
        assert_eq!(detector.scan(&candles).len(), 1);
        assert!(detector.scan(&candles).is_empty());
        assert_eq!(detector.state().sweeps.len(), 1);
    }

    #[test]
    fn test_near_price_duplicate_rejected() {
        let mut log = EventLog::default();
        let a = LiquidityEvent::Sweep { price: 100.0, side: Side::Buy, time: 60 };
        let b = LiquidityEvent::Sweep { price: 100.05, side: Side::Buy, time: 120 };
        let c = LiquidityEvent::Sweep { price: 100.05, side: Side::Sell, time: 120 };
        assert!(log.offer(a, 0.1, 10));
        assert!(!log.offer(b, 0.1, 10));
        assert!(log.offer(c, 0.1, 10));
    }

    #[test]
    fn test_retention_cap_newest_first() {
        let mut log = EventLog::default();
        for i in 0..15 {
            log.offer(LiquidityEvent::Sweep { price: i as f64, side: Side::Buy, time: i }, 0.1, 10);
        }
        assert_eq!(log.events.len(), 10);
        assert_eq!(log.events.front().map(LiquidityEvent::time), Some(14));
        assert_eq!(log.events.back().map(LiquidityEvent::time), Some(5));

        // Evicted events are not re-admitted on a rescan
        assert!(!log.offer(LiquidityEvent::Sweep { price: 0.0, side: Side::Buy, time: 0 }, 0.1, 10));
    }
}
