// Candle Aggregator - folds kline ticks into the canonical candle sequence
// Same period updates in place, a newer period appends, an older one is dropped

use serde::Serialize;
use tracing::{debug, trace};

use crate::core::types::{Backfill, Candle, KlineTick, ZScoreBands};
use crate::layer3::kline::cvd_tracker::{estimate_delta, CvdTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TickOutcome {
    /// The open candle absorbed the tick
    Updated,
    /// A new candle opened (the previous one, if any, was finalized)
    Appended,
    /// The tick belonged to an older period and was ignored
    Discarded,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CandleSeriesStats {
    pub ticks_processed: u64,
    pub candles_appended: u64,
    pub stale_discarded: u64,
    pub truncated: u64,
}

pub struct CandleSeries {
    candles: Vec<Candle>,
    history_limit: usize,
    cvd: CvdTracker,
    stats: CandleSeriesStats,
}

impl CandleSeries {
    pub fn new(history_limit: usize) -> Self {
        Self {
            candles: Vec::with_capacity(history_limit.min(4096)),
            history_limit: history_limit.max(1),
            cvd: CvdTracker::default(),
            stats: CandleSeriesStats::default(),
        }
    }

    /// Apply one kline tick; O(1) apart from front truncation
    pub fn apply(&mut self, tick: &KlineTick) -> TickOutcome {
        self.stats.ticks_processed += 1;
        let time = tick.period_start_secs();

        let last_time = self.candles.last().map(|c| c.time);
        match last_time {
            Some(last) if time == last => {
                self.update_open(tick);
                TickOutcome::Updated
            }
            Some(last) if time < last => {
                self.stats.stale_discarded += 1;
                trace!(tick_time = time, last_time = last, "Stale kline discarded");
                TickOutcome::Discarded
            }
            _ => {
                self.open_new(tick, time);
                TickOutcome::Appended
            }
        }
    }

    fn update_open(&mut self, tick: &KlineTick) {
        let Some(candle) = self.candles.last_mut() else {
            return;
        };
        candle.high = candle.high.max(tick.high);
        candle.low = candle.low.min(tick.low);
        candle.close = tick.close;
        candle.volume = tick.volume;
        candle.is_closed = tick.is_closed;

        // Estimate over the merged bar so the OHLCV fallback sees the full range
        let merged = KlineTick::new(
            tick.period_start_ms,
            candle.open,
            candle.high,
            candle.low,
            candle.close,
            candle.volume,
            tick.taker_buy_volume,
            tick.is_closed,
        );
        candle.delta = estimate_delta(&merged);
        candle.cvd = self.cvd.update_open(candle.delta);
    }

    fn open_new(&mut self, tick: &KlineTick, time: i64) {
        if let Some(prev) = self.candles.last_mut() {
            prev.is_closed = true;
            self.cvd.commit();
        }

        let delta = estimate_delta(tick);
        let cvd = self.cvd.update_open(delta);
        self.candles.push(Candle {
            time,
            open: tick.open,
            high: tick.high,
            low: tick.low,
            close: tick.close,
            volume: tick.volume,
            delta,
            cvd,
            is_closed: tick.is_closed,
            adx: None,
            bands: None,
        });
        self.stats.candles_appended += 1;

        if self.candles.len() > self.history_limit {
            let excess = self.candles.len() - self.history_limit;
            self.candles.drain(..excess);
            self.stats.truncated += excess as u64;
        }

        debug!(time = time, open = tick.open, candles = self.candles.len(), "Candle appended");
    }

    /// Replace the whole sequence with a historical backfill
    pub fn load_backfill(&mut self, backfill: &Backfill) -> usize {
        self.clear();
        self.cvd.reset(backfill.cvd_seed);
        for tick in &backfill.klines {
            self.apply(tick);
        }
        self.candles.len()
    }

    /// Attach per-candle indicator values computed over the whole sequence
    pub fn annotate(&mut self, adx: &[Option<f64>], bands: &[Option<ZScoreBands>]) {
        for (i, candle) in self.candles.iter_mut().enumerate() {
            candle.adx = adx.get(i).copied().flatten();
            candle.bands = bands.get(i).copied().flatten();
        }
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn cvd(&self) -> &CvdTracker {
        &self.cvd
    }

    pub fn stats(&self) -> &CandleSeriesStats {
        &self.stats
    }

    pub fn clear(&mut self) {
        self.candles.clear();
        self.cvd.reset(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(t_secs: i64, open: f64, close: f64, volume: f64, taker_buy: f64) -> KlineTick {
        KlineTick::new(
            t_secs * 1000,
            open,
            open.max(close) + 1.0,
            open.min(close) - 1.0,
            close,
            volume,
            Some(taker_buy),
            false,
        )
    }

    #[test]
    fn test_update_in_place() {
        let mut series = CandleSeries::new(100);
        assert_eq!(series.apply(&tick(60, 100.0, 101.0, 5.0, 3.0)), TickOutcome::Appended);

        let mut t = tick(60, 100.0, 103.0, 8.0, 6.0);
        t.low = 98.0;
        assert_eq!(series.apply(&t), TickOutcome::Updated);

        let c = series.last().unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(c.open, 100.0);
        assert_eq!(c.close, 103.0);
        assert_eq!(c.high, 104.0);
        assert_eq!(c.low, 98.0);
        assert_eq!(c.volume, 8.0);
        assert_eq!(c.delta, 4.0);
        assert_eq!(c.cvd, 4.0);
    }

    #[test]
    fn test_append_commits_baseline_once() {
        let mut series = CandleSeries::new(100);
        series.apply(&tick(60, 100.0, 101.0, 10.0, 7.0)); // delta 4
        series.apply(&tick(60, 100.0, 101.0, 12.0, 8.0)); // delta 4 again
        series.apply(&tick(120, 101.0, 100.0, 10.0, 2.0)); // delta -6

        let candles = series.candles();
        assert!(candles[0].is_closed);
        assert_eq!(candles[1].cvd, -2.0);
        assert_eq!(series.cvd().baseline(), 4.0);
        assert_eq!(series.cvd().commits(), 1);
    }

    #[test]
    fn test_stale_tick_discarded() {
        let mut series = CandleSeries::new(100);
        series.apply(&tick(120, 100.0, 101.0, 1.0, 1.0));
        let before = series.candles().to_vec();

        assert_eq!(series.apply(&tick(60, 50.0, 51.0, 1.0, 1.0)), TickOutcome::Discarded);
        assert_eq!(series.candles(), before.as_slice());
        assert_eq!(series.stats().stale_discarded, 1);
    }

    #[test]
    fn test_history_limit_truncates_front() {
        let mut series = CandleSeries::new(3);
        for i in 1..=5 {
            series.apply(&tick(i * 60, 100.0, 100.0, 1.0, 0.5));
        }
        assert_eq!(series.len(), 3);
        assert_eq!(series.candles()[0].time, 180);
        assert_eq!(series.stats().truncated, 2);
    }

    #[test]
    fn test_backfill_seeds_cvd() {
        let mut series = CandleSeries::new(100);
        let backfill = Backfill {
            klines: vec![tick(60, 1.0, 2.0, 10.0, 6.0), tick(120, 2.0, 3.0, 10.0, 6.0)],
            cvd_seed: 100.0,
        };
        assert_eq!(series.load_backfill(&backfill), 2);
        assert_eq!(series.candles()[0].cvd, 102.0);
        assert_eq!(series.candles()[1].cvd, 104.0);
        assert_eq!(series.cvd().baseline(), 102.0);
        assert!(!series.last().unwrap().is_closed);
    }
}
