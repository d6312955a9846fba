// QuantDesk Core - streaming market analytics for a single instrument
//
// core    - types, config, logging, event bus
// layer2  - feed parsing and depth book
// layer3  - candles, indicators, flow toxicity, structure, risk
// engine  - MarketEngine, debounced recompute, async service

pub mod core;
pub mod layer2;
pub mod layer3;
pub mod engine;

pub use crate::core::config::{ConfigManager, EngineConfig};
pub use crate::core::logger::setup_logging;
pub use engine::{
    EngineCommand, EngineError, EngineInput, EngineService, EngineSnapshot, MarketEngine,
    SnapshotDelta,
};
