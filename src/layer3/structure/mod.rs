// Market structure - liquidity pivots and the events derived from them

pub mod liquidity;

pub use liquidity::{
    find_fair_value_gaps, find_pivots, LiquidityEvent, LiquidityEventDetector, LiquidityState,
    Pivot, PivotKind,
};
