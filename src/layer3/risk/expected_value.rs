// Expected value and reward/risk arithmetic

use serde::Serialize;

use crate::layer3::risk::position::Position;

/// p·win − (1−p)·loss
pub fn expected_value(win_probability: f64, win_amount: f64, loss_amount: f64) -> f64 {
    win_probability * win_amount - (1.0 - win_probability) * loss_amount
}

/// win / loss, 0 when nothing is at risk
pub fn rr_ratio(win_amount: f64, loss_amount: f64) -> f64 {
    if loss_amount == 0.0 {
        0.0
    } else {
        win_amount / loss_amount
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EdgeEstimate {
    pub win_probability: f64,
    pub win_amount: f64,
    pub loss_amount: f64,
    pub expected_value: f64,
    pub rr_ratio: f64,
}

/// Edge of a position if it runs to target or stop with the given odds
pub fn position_edge(position: &Position, win_probability: f64) -> EdgeEstimate {
    let win_amount = position.size * (position.target - position.entry).abs();
    let loss_amount = position.risk_amount;
    EdgeEstimate {
        win_probability,
        win_amount,
        loss_amount,
        expected_value: expected_value(win_probability, win_amount, loss_amount),
        rr_ratio: rr_ratio(win_amount, loss_amount),
    }
}
