// Core Type Definitions for the QuantDesk analytics engine
// Feed-facing and derived domain types shared by every layer

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Enums
// ============================================================================

/// Aggressor side of a trade print, or the side of liquidity being swept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

impl std::str::FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            _ => Err(format!("Invalid Side: '{}'. Expected 'BUY' or 'SELL'", s)),
        }
    }
}

/// Position direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Signed distance from `entry` to `price` in the position's favour
    pub fn signed_distance(&self, entry: f64, price: f64) -> f64 {
        match self {
            Direction::Long => price - entry,
            Direction::Short => entry - price,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LONG" => Ok(Direction::Long),
            "SHORT" => Ok(Direction::Short),
            _ => Err(format!("Invalid Direction: '{}'. Expected 'LONG' or 'SHORT'", s)),
        }
    }
}

/// Directional bias of a window, or the direction of a structural break
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Bias {
    Bull,
    Bear,
    Neutral,
}

impl fmt::Display for Bias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bias::Bull => write!(f, "BULL"),
            Bias::Bear => write!(f, "BEAR"),
            Bias::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketRegime {
    TrendingUp,
    TrendingDown,
    Expanding,
    Compressing,
    Ranging,
    Uncertain,
}

impl fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Kline intervals the feed and backfill sources understand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    OneDay,
}

impl Interval {
    pub fn seconds(&self) -> i64 {
        match self {
            Interval::OneMinute => 60,
            Interval::FiveMinutes => 300,
            Interval::FifteenMinutes => 900,
            Interval::OneHour => 3_600,
            Interval::FourHours => 14_400,
            Interval::OneDay => 86_400,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::OneHour => "1h",
            Interval::FourHours => "4h",
            Interval::OneDay => "1d",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Interval::OneMinute),
            "5m" => Ok(Interval::FiveMinutes),
            "15m" => Ok(Interval::FifteenMinutes),
            "1h" => Ok(Interval::OneHour),
            "4h" => Ok(Interval::FourHours),
            "1d" => Ok(Interval::OneDay),
            _ => Err(format!("Invalid Interval: '{}'", s)),
        }
    }
}

// ============================================================================
// KlineTick (typed ingestion record)
// ============================================================================

/// One kline update as delivered by the feed, after parsing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KlineTick {
    pub period_start_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Absent when the source only carries OHLCV
    pub taker_buy_volume: Option<f64>,
    pub is_closed: bool,
}

impl KlineTick {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        period_start_ms: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
        taker_buy_volume: Option<f64>,
        is_closed: bool,
    ) -> Self {
        Self {
            period_start_ms,
            open,
            high,
            low,
            close,
            volume,
            taker_buy_volume,
            is_closed,
        }
    }

    pub fn period_start_secs(&self) -> i64 {
        self.period_start_ms.div_euclid(1000)
    }
}

impl fmt::Display for KlineTick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "KlineTick(t={}, O={:.2}, H={:.2}, L={:.2}, C={:.2}, V={:.4})",
            self.period_start_ms, self.open, self.high, self.low, self.close, self.volume
        )
    }
}

// ============================================================================
// Candle
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZScoreBands {
    pub mean: f64,
    pub std_dev: f64,
    pub upper_1: f64,
    pub lower_1: f64,
    pub upper_2: f64,
    pub lower_2: f64,
}

impl ZScoreBands {
    /// Z-score of `price` against the band window; 0 when the window is flat
    pub fn z_score(&self, price: f64) -> f64 {
        if self.std_dev > 0.0 {
            (price - self.mean) / self.std_dev
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Period start, seconds
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub delta: f64,
    pub cvd: f64,
    pub is_closed: bool,
    pub adx: Option<f64>,
    pub bands: Option<ZScoreBands>,
}

impl fmt::Display for Candle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Candle(t={}, O={:.2}, H={:.2}, L={:.2}, C={:.2}, delta={:.4}, cvd={:.4})",
            self.time, self.open, self.high, self.low, self.close, self.delta, self.cvd
        )
    }
}

// ============================================================================
// TradePrint
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePrint {
    pub price: f64,
    pub size: f64,
    pub side: Side,
    pub timestamp: i64, // milliseconds
}

impl TradePrint {
    pub fn new(price: f64, size: f64, side: Side, timestamp: i64) -> Self {
        Self { price, size, side, timestamp }
    }
}

impl fmt::Display for TradePrint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TradePrint(price={:.2}, size={:.4}, side={})",
            self.price, self.size, self.side
        )
    }
}

// ============================================================================
// Depth
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub size: f64,
}

impl BookLevel {
    pub fn new(price: f64, size: f64) -> Self {
        Self { price, size }
    }
}

/// Ordered bid/ask levels, best first on each side
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DepthSnapshot {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    pub timestamp: i64,
}

impl fmt::Display for DepthSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DepthSnapshot(bids={}, asks={}, t={})",
            self.bids.len(), self.asks.len(), self.timestamp
        )
    }
}

// ============================================================================
// Backfill
// ============================================================================

/// Historical klines used to pre-populate the candle sequence
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Backfill {
    pub klines: Vec<KlineTick>,
    /// Cumulative delta before the first backfilled candle
    pub cvd_seed: f64,
}
