// Event Type Constants - names published on the engine's event bus
// Centralized constants for consistency between publishers and subscribers

// ============================================================================
// Liquidity Structure Events (3)
// ============================================================================

pub const LIQUIDITY_SWEEP: &str = "liquidity_sweep";
pub const BREAK_OF_STRUCTURE: &str = "break_of_structure";
pub const FAIR_VALUE_GAP: &str = "fair_value_gap";

// ============================================================================
// Market State Events (2)
// ============================================================================

pub const REGIME_CHANGE: &str = "regime_change";
pub const BIAS_CHANGE: &str = "bias_change";

// ============================================================================
// Position Events (2)
// ============================================================================

pub const POSITION_OPENED: &str = "position_opened";
pub const POSITION_CLOSED: &str = "position_closed";

// ============================================================================
// Engine Events (2)
// ============================================================================

pub const ALERT_TRIGGERED: &str = "alert_triggered";
pub const INSTRUMENT_RESET: &str = "instrument_reset";

pub const ALL_EVENT_TYPES: [&str; 9] = [
    LIQUIDITY_SWEEP,
    BREAK_OF_STRUCTURE,
    FAIR_VALUE_GAP,
    REGIME_CHANGE,
    BIAS_CHANGE,
    POSITION_OPENED,
    POSITION_CLOSED,
    ALERT_TRIGGERED,
    INSTRUMENT_RESET,
];
