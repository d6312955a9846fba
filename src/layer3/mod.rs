// Layer 3 - Analytics
// Derives indicators and structural events from the typed feed

// Common utilities
pub mod common;

// Candles, CVD, indicators, regime, bias
pub mod kline;

// Trade flow and toxicity
pub mod trade;

// Liquidity structure
pub mod structure;

// Belief, position risk, alerts
pub mod risk;

pub use kline::{BiasMatrix, CandleSeries, CvdTracker, RegimeClassifier, RegimeState, TickOutcome};
pub use trade::{FlowMetrics, ToxicityEstimator, TradeFlowTracker};
pub use structure::{LiquidityEvent, LiquidityEventDetector, LiquidityState};
pub use risk::{AlertEvaluator, BayesianBelief, RiskEngine, RiskError};
