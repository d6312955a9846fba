// Risk Engine - the single active position, its floating R, closed trade
// history and running daily statistics

use chrono::{DateTime, NaiveDate};
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::core::config::RiskConfig;
use crate::core::types::Direction;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RiskError {
    #[error("A position is already open")]
    PositionAlreadyOpen,
    #[error("Entry equals stop; risk distance is zero")]
    ZeroRiskDistance,
    #[error("No active position")]
    NoActivePosition,
    #[error("Risk percent must be in (0, 100], got {0}")]
    InvalidRiskPercent(f64),
    #[error("Invalid price for {field}: {value}")]
    InvalidPrice { field: &'static str, value: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub id: String,
    pub direction: Direction,
    pub entry: f64,
    pub stop: f64,
    pub target: f64,
    pub size: f64,
    pub risk_amount: f64,
    /// Reward multiple at target
    pub planned_r: f64,
    pub floating_r: f64,
    pub unrealized_pnl: f64,
    pub open_time: i64,
}

impl Position {
    pub fn risk_distance(&self) -> f64 {
        (self.entry - self.stop).abs()
    }

    fn mark(&mut self, price: f64) {
        let signed = self.direction.signed_distance(self.entry, price);
        self.floating_r = signed / self.risk_distance();
        self.unrealized_pnl = self.size * signed;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosedTrade {
    pub position: Position,
    pub exit_price: f64,
    pub result_r: f64,
    pub realized_pnl: f64,
    pub close_time: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DailyStats {
    pub date: Option<NaiveDate>,
    pub trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub scratches: u32,
    pub total_r: f64,
    pub realized_pnl: f64,
    pub cumulative_r: f64,
    /// Running minimum of cumulative R, never above 0
    pub max_drawdown: f64,
}

impl DailyStats {
    pub fn win_rate(&self) -> f64 {
        if self.trades > 0 {
            self.wins as f64 / self.trades as f64 * 100.0
        } else {
            0.0
        }
    }

    fn record(&mut self, trade: &ClosedTrade) {
        self.trades += 1;
        if trade.result_r > 0.0 {
            self.wins += 1;
        } else if trade.result_r < 0.0 {
            self.losses += 1;
        } else {
            self.scratches += 1;
        }
        self.total_r += trade.result_r;
        self.realized_pnl += trade.realized_pnl;
        self.cumulative_r += trade.result_r;
        self.max_drawdown = self.max_drawdown.min(self.cumulative_r);
    }
}

fn utc_date(ms: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(ms).map(|dt| dt.date_naive())
}

fn check_price(field: &'static str, value: f64) -> Result<(), RiskError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(RiskError::InvalidPrice { field, value })
    }
}

pub struct RiskEngine {
    account_size: f64,
    risk_percent: f64,
    active: Option<Position>,
    history: Vec<ClosedTrade>,
    daily: DailyStats,
}

impl RiskEngine {
    pub fn new(config: &RiskConfig) -> Self {
        Self {
            account_size: config.account_size,
            risk_percent: config.risk_percent,
            active: None,
            history: Vec::new(),
            daily: DailyStats::default(),
        }
    }

    pub fn risk_amount(&self) -> f64 {
        self.account_size * self.risk_percent / 100.0
    }

    pub fn open(
        &mut self,
        direction: Direction,
        entry: f64,
        stop: f64,
        target: f64,
        now_ms: i64,
    ) -> Result<&Position, RiskError> {
        if self.active.is_some() {
            return Err(RiskError::PositionAlreadyOpen);
        }
        check_price("entry", entry)?;
        check_price("stop", stop)?;
        check_price("target", target)?;

        let distance = (entry - stop).abs();
        if distance == 0.0 {
            return Err(RiskError::ZeroRiskDistance);
        }

        let risk_amount = self.risk_amount();
        let position = Position {
            id: Uuid::new_v4().to_string(),
            direction,
            entry,
            stop,
            target,
            size: risk_amount / distance,
            risk_amount,
            planned_r: (target - entry).abs() / distance,
            floating_r: 0.0,
            unrealized_pnl: 0.0,
            open_time: now_ms,
        };

        info!(
            direction = %direction,
            entry = entry,
            stop = stop,
            target = target,
            size = position.size,
            "Position opened"
        );
        Ok(&*self.active.insert(position))
    }

    /// Recompute floating R and PnL of the active position
    pub fn mark(&mut self, price: f64) -> Option<&Position> {
        let position = self.active.as_mut()?;
        position.mark(price);
        Some(&*position)
    }

    pub fn close(&mut self, exit_price: f64, now_ms: i64) -> Result<ClosedTrade, RiskError> {
        check_price("exit", exit_price)?;
        let mut position = self.active.take().ok_or(RiskError::NoActivePosition)?;
        position.mark(exit_price);

        let trade = ClosedTrade {
            exit_price,
            result_r: position.floating_r,
            realized_pnl: position.unrealized_pnl,
            close_time: now_ms,
            position,
        };

        let day = utc_date(now_ms);
        if self.daily.date.is_some() && self.daily.date != day {
            self.daily = DailyStats::default();
        }
        self.daily.date = day;
        self.daily.record(&trade);
        self.history.push(trade.clone());

        info!(
            exit = exit_price,
            result_r = trade.result_r,
            pnl = trade.realized_pnl,
            "Position closed"
        );
        Ok(trade)
    }

    pub fn set_risk_percent(&mut self, risk_percent: f64) -> Result<(), RiskError> {
        if !(risk_percent > 0.0 && risk_percent <= 100.0) {
            return Err(RiskError::InvalidRiskPercent(risk_percent));
        }
        self.risk_percent = risk_percent;
        Ok(())
    }

    pub fn risk_percent(&self) -> f64 {
        self.risk_percent
    }

    pub fn account_size(&self) -> f64 {
        self.account_size
    }

    pub fn active(&self) -> Option<&Position> {
        self.active.as_ref()
    }

    pub fn history(&self) -> &[ClosedTrade] {
        &self.history
    }

    pub fn daily_stats(&self) -> &DailyStats {
        &self.daily
    }

    /// Drop the active position without recording a trade
    pub fn abandon(&mut self) -> Option<Position> {
        self.active.take()
    }
}
