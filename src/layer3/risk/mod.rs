// Risk - trend belief, position arithmetic, expected value and alerting

pub mod belief;
pub mod position;
pub mod expected_value;
pub mod alerts;

pub use belief::{bayes_update, BayesianBelief};
pub use position::{ClosedTrade, DailyStats, Position, RiskEngine, RiskError};
pub use expected_value::{expected_value, position_edge, rr_ratio, EdgeEstimate};
pub use alerts::{AlertDecision, AlertEvaluator, AlertSnapshot, TradePlan};
