// Kline analytics - candle sequence, cumulative delta, indicators, regime and bias

pub mod candle_aggregator;
pub mod cvd_tracker;
pub mod indicators;
pub mod regime;
pub mod bias_matrix;

// Re-exports
pub use candle_aggregator::{CandleSeries, CandleSeriesStats, TickOutcome};
pub use cvd_tracker::{estimate_delta, CvdTracker};
pub use regime::{RegimeClassifier, RegimeState};
pub use bias_matrix::{BiasChange, BiasMatrix, TimeframeBias};
