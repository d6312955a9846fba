// Layer3 Common Module - shared utilities for the analytics trackers

pub mod time_windows;
pub mod event_types;
pub mod stats;

pub use time_windows::TimeWindow;
pub use event_types::*;
