// Alert Evaluator - decides whether the current market picture deserves an alert
// and drafts a trade plan alongside

use serde::Serialize;

use crate::core::types::{Direction, Side};

const ZSCORE_DISLOCATION: f64 = 2.0;
const HIGH_PROBABILITY: f64 = 75.0;
const SWEEP_PROBABILITY: f64 = 60.0;
const STOP_FRACTION: f64 = 0.99;
const TARGET_FRACTION: f64 = 1.02;

/// Inputs the evaluator looks at
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertSnapshot {
    pub symbol: String,
    pub price: f64,
    pub z_score: f64,
    /// Percent, 0..100
    pub tactical_probability: f64,
    /// Signed conviction; > 0 leans long
    pub directional_score: f64,
    /// Side of the most recent liquidity sweep, if any
    pub latest_sweep_side: Option<Side>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradePlan {
    pub direction: Direction,
    pub confidence: f64,
    pub entry: f64,
    pub stop: f64,
    pub target: f64,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertDecision {
    pub should_alert: bool,
    pub passed_conditions: Vec<String>,
    pub score: usize,
    pub plan: TradePlan,
}

#[derive(Debug, Clone, Default)]
pub struct AlertEvaluator;

impl AlertEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(&self, snapshot: &AlertSnapshot) -> AlertDecision {
        let mut reasons = Vec::new();
        let mut should_alert = false;

        // Dislocation is context only; it never alerts by itself
        if snapshot.z_score.abs() > ZSCORE_DISLOCATION {
            reasons.push(format!("Z-Score Dislocation ({:.2})", snapshot.z_score));
        }

        if snapshot.tactical_probability > HIGH_PROBABILITY {
            reasons.push(format!("Tactical High Prob ({:.0}%)", snapshot.tactical_probability));
            should_alert = true;
        }

        // Sell-side liquidity taken below a low sets up a long
        if snapshot.latest_sweep_side == Some(Side::Sell)
            && snapshot.tactical_probability > SWEEP_PROBABILITY
        {
            reasons.push("Liquidity Sweep (Long)".to_string());
            should_alert = true;
        }

        let reasoning = if reasons.is_empty() {
            "Monitoring".to_string()
        } else {
            reasons.join(" & ")
        };

        AlertDecision {
            should_alert,
            score: reasons.len(),
            plan: TradePlan {
                direction: if snapshot.directional_score > 0.0 {
                    Direction::Long
                } else {
                    Direction::Short
                },
                confidence: snapshot.directional_score,
                entry: snapshot.price,
                stop: snapshot.price * STOP_FRACTION,
                target: snapshot.price * TARGET_FRACTION,
                reasoning,
            },
            passed_conditions: reasons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(z: f64, prob: f64, sweep: Option<Side>) -> AlertSnapshot {
        AlertSnapshot {
            symbol: "BTCUSDT".to_string(),
            price: 100.0,
            z_score: z,
            tactical_probability: prob,
            directional_score: 0.2,
            latest_sweep_side: sweep,
        }
    }

    #[test]
    fn test_quiet_market_monitors() {
        let d = AlertEvaluator::new().evaluate(&snapshot(0.5, 50.0, None));
        assert!(!d.should_alert);
        assert_eq!(d.score, 0);
        assert_eq!(d.plan.reasoning, "Monitoring");
        assert_eq!(d.plan.direction, Direction::Long);
        assert_eq!(d.plan.stop, 99.0);
        assert_eq!(d.plan.target, 102.0);
    }

    #[test]
    fn test_zscore_alone_does_not_alert() {
        let d = AlertEvaluator::new().evaluate(&snapshot(-2.5, 50.0, None));
        assert!(!d.should_alert);
        assert_eq!(d.score, 1);
        assert!(d.passed_conditions[0].starts_with("Z-Score Dislocation"));
    }

    #[test]
    fn test_high_probability_alerts() {
        let d = AlertEvaluator::new().evaluate(&snapshot(2.5, 80.0, None));
        assert!(d.should_alert);
        assert_eq!(d.score, 2);
        assert!(d.plan.reasoning.contains(" & "));
    }

    #[test]
    fn test_sell_sweep_alerts_long() {
        let d = AlertEvaluator::new().evaluate(&snapshot(0.0, 65.0, Some(Side::Sell)));
        assert!(d.should_alert);
        assert_eq!(d.passed_conditions, vec!["Liquidity Sweep (Long)".to_string()]);

        let d = AlertEvaluator::new().evaluate(&snapshot(0.0, 65.0, Some(Side::Buy)));
        assert!(!d.should_alert);
    }
}
