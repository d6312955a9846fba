// CVD Tracker - cumulative volume delta across candle boundaries
// Baseline holds CVD through the last closed candle; the open candle rides on top

use tracing::trace;

use crate::core::types::KlineTick;

/// Signed order flow for one kline.
///
/// With taker-buy volume: buy minus sell aggressor volume. Without it the
/// body-to-range ratio apportions the volume; a zero range yields 0.
pub fn estimate_delta(tick: &KlineTick) -> f64 {
    match tick.taker_buy_volume {
        Some(taker_buy) => 2.0 * taker_buy - tick.volume,
        None => {
            let range = tick.high - tick.low;
            if range > 0.0 {
                (tick.close - tick.open) / range * tick.volume
            } else {
                0.0
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CvdTracker {
    baseline: f64,
    open_delta: f64,
    commits: u64,
}

impl CvdTracker {
    pub fn new(seed: f64) -> Self {
        Self {
            baseline: seed,
            open_delta: 0.0,
            commits: 0,
        }
    }

    /// Replace the open candle's delta; returns the running CVD
    pub fn update_open(&mut self, delta: f64) -> f64 {
        self.open_delta = delta;
        self.running()
    }

    /// Fold the open candle's final delta into the baseline.
    /// Called once per candle, when its successor opens.
    pub fn commit(&mut self) -> f64 {
        self.baseline += self.open_delta;
        self.open_delta = 0.0;
        self.commits += 1;
        trace!(baseline = self.baseline, commits = self.commits, "CVD baseline committed");
        self.baseline
    }

    pub fn running(&self) -> f64 {
        self.baseline + self.open_delta
    }

    pub fn baseline(&self) -> f64 {
        self.baseline
    }

    pub fn open_delta(&self) -> f64 {
        self.open_delta
    }

    pub fn commits(&self) -> u64 {
        self.commits
    }

    pub fn reset(&mut self, seed: f64) {
        *self = Self::new(seed);
    }
}
