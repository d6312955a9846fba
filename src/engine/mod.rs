// Engine - owned per-instrument state, debounced recompute and the async driver

pub mod scheduler;
pub mod snapshot;
pub mod market_engine;
pub mod service;

pub use scheduler::{DebounceTimer, RecomputeScheduler, SchedulerStats};
pub use snapshot::{DerivedMetrics, EngineSnapshot, EngineStatus, MarketMetrics, SnapshotDelta};
pub use market_engine::{EngineCommand, EngineError, EngineInput, MarketEngine};
pub use service::EngineService;
