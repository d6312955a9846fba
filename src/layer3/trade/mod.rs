// Trade analytics - trade ring, rolling window, order-flow imbalance and VPIN toxicity

pub mod flow_tracker;
pub mod toxicity;

pub use flow_tracker::{FlowMetrics, TradeFlowTracker};
pub use toxicity::ToxicityEstimator;
