// Configuration Management for the QuantDesk analytics engine
// Sectioned serde config, JSON file + environment overlay

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::core::types::Interval;

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

// ============================================================================
// Configuration Structures
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub symbol: String,
    pub interval: Interval,
    /// Maximum candles retained; older candles are truncated from the front
    pub history_limit: usize,
    /// Candles requested from a backfill source
    pub backfill_limit: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            interval: Interval::OneMinute,
            history_limit: 1000,
            backfill_limit: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub adx_period: usize,
    pub rsi_period: usize,
    pub band_window: usize,

    // Regime classification
    pub short_atr_period: usize,
    pub long_atr_period: usize,
    pub sma_period: usize,
    pub range_lookback: usize,
    pub range_change_threshold: f64,   // fraction, 0.2 = 20%
    pub trend_atr_multiple: f64,
    pub adx_trend_threshold: f64,
    pub regime_min_candles: usize,

    // Return distribution shape
    pub shape_window: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            adx_period: 14,
            rsi_period: 14,
            band_window: 20,
            short_atr_period: 14,
            long_atr_period: 50,
            sma_period: 20,
            range_lookback: 14,
            range_change_threshold: 0.2,
            trend_atr_multiple: 2.0,
            adx_trend_threshold: 25.0,
            regime_min_candles: 50,
            shape_window: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToxicityConfig {
    pub bucket_volume: f64,
    pub max_buckets: usize,
    pub min_trades: usize,
    pub ring_capacity: usize,
    pub window_ms: i64,
    pub window_capacity: usize,
}

impl Default for ToxicityConfig {
    fn default() -> Self {
        Self {
            bucket_volume: 50.0,
            max_buckets: 50,
            min_trades: 10,
            ring_capacity: 50,
            window_ms: 60_000,
            window_capacity: 20_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureConfig {
    /// Neighbours compared on each side of a pivot candidate
    pub pivot_span: usize,
    /// Candles that must exist on each side before a pivot is considered
    pub pivot_confirmation: usize,
    pub scan_window: usize,
    pub price_tolerance: f64,
    pub max_events: usize,
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            pivot_span: 2,
            pivot_confirmation: 3,
            scan_window: 100,
            price_tolerance: 0.1,
            max_events: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeBucket {
    pub label: String,
    pub window: usize,
}

impl TimeframeBucket {
    pub fn new(label: &str, window: usize) -> Self {
        Self { label: label.to_string(), window }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BiasConfig {
    pub buckets: Vec<TimeframeBucket>,
    pub bull_rsi: f64,
    pub bear_rsi: f64,
    pub sparkline_len: usize,
}

impl Default for BiasConfig {
    fn default() -> Self {
        Self {
            buckets: vec![
                TimeframeBucket::new("1D", 240),
                TimeframeBucket::new("4H", 120),
                TimeframeBucket::new("1H", 60),
                TimeframeBucket::new("5M", 20),
            ],
            bull_rsi: 55.0,
            bear_rsi: 45.0,
            sparkline_len: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub account_size: f64,
    pub risk_percent: f64,   // percent of account, 1.0 = 1%
    pub belief_prior: f64,
    pub belief_floor: f64,
    pub strong_flow: f64,
    pub mild_flow: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            account_size: 10_000.0,
            risk_percent: 1.0,
            belief_prior: 0.5,
            belief_floor: 0.01,
            strong_flow: 0.3,
            mild_flow: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub debounce_ms: u64,
    pub channel_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            channel_capacity: 4096,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: String,
    pub json_logs: bool,
    pub event_history: usize,
    pub depth_levels: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "INFO".to_string(),
            json_logs: false,
            event_history: 1000,
            depth_levels: 10,
        }
    }
}

/// Complete per-engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub feed: FeedConfig,
    pub indicators: IndicatorConfig,
    pub toxicity: ToxicityConfig,
    pub structure: StructureConfig,
    pub bias: BiasConfig,
    pub risk: RiskConfig,
    pub scheduler: SchedulerConfig,
    pub monitoring: MonitoringConfig,
}

// ============================================================================
// Configuration Summary
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub symbol: String,
    pub interval: String,
    pub history_limit: usize,
    pub debounce_ms: u64,
    pub account_size: f64,
    pub risk_percent: f64,
    pub log_level: String,
}

// ============================================================================
// Configuration Manager
// ============================================================================

pub struct ConfigManager {
    config: EngineConfig,
}

impl ConfigManager {
    pub fn new(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut manager = Self { config: EngineConfig::default() };

        if let Some(path) = config_path {
            manager.load_from_file(path)?;
        }

        manager.load_from_env();

        info!("Configuration initialized");
        Ok(manager)
    }

    /// Load configuration sections from a JSON file; missing sections keep defaults
    pub fn load_from_file(&mut self, config_path: &str) -> Result<(), ConfigError> {
        let path = Path::new(config_path);
        if !path.exists() {
            warn!(path = config_path, "Config file not found");
            return Ok(());
        }

        let content = fs::read_to_string(path)?;
        let sections: HashMap<String, serde_json::Value> = serde_json::from_str(&content)?;

        for (name, value) in sections {
            match name.as_str() {
                "feed" => self.config.feed = serde_json::from_value(value)?,
                "indicators" => self.config.indicators = serde_json::from_value(value)?,
                "toxicity" => self.config.toxicity = serde_json::from_value(value)?,
                "structure" => self.config.structure = serde_json::from_value(value)?,
                "bias" => self.config.bias = serde_json::from_value(value)?,
                "risk" => self.config.risk = serde_json::from_value(value)?,
                "scheduler" => self.config.scheduler = serde_json::from_value(value)?,
                "monitoring" => self.config.monitoring = serde_json::from_value(value)?,
                other => warn!(section = other, "Unknown config section ignored"),
            }
        }

        info!(path = config_path, "Configuration loaded");
        Ok(())
    }

    /// Overlay selected values from environment variables
    pub fn load_from_env(&mut self) {
        self.apply_env(|key| std::env::var(key).ok());
    }

    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(symbol) = lookup("QUANTDESK_SYMBOL") {
            self.config.feed.symbol = symbol.to_uppercase();
        }
        if let Some(interval) = lookup("QUANTDESK_INTERVAL") {
            match interval.parse::<Interval>() {
                Ok(i) => self.config.feed.interval = i,
                Err(e) => warn!(error = %e, "Ignoring QUANTDESK_INTERVAL"),
            }
        }
        if let Some(size) = lookup("QUANTDESK_ACCOUNT_SIZE") {
            match size.parse::<f64>() {
                Ok(v) => self.config.risk.account_size = v,
                Err(_) => warn!(value = %size, "Ignoring QUANTDESK_ACCOUNT_SIZE"),
            }
        }
        if let Some(pct) = lookup("QUANTDESK_RISK_PERCENT") {
            match pct.parse::<f64>() {
                Ok(v) => self.config.risk.risk_percent = v,
                Err(_) => warn!(value = %pct, "Ignoring QUANTDESK_RISK_PERCENT"),
            }
        }
        if let Some(ms) = lookup("QUANTDESK_DEBOUNCE_MS") {
            match ms.parse::<u64>() {
                Ok(v) => self.config.scheduler.debounce_ms = v,
                Err(_) => warn!(value = %ms, "Ignoring QUANTDESK_DEBOUNCE_MS"),
            }
        }
        if let Some(level) = lookup("QUANTDESK_LOG_LEVEL") {
            self.config.monitoring.log_level = level;
        }
    }

    /// Save configuration to a JSON file
    pub fn save_to_file(&self, config_path: &str) -> Result<(), ConfigError> {
        if let Some(parent) = Path::new(config_path).parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(&self.config)?;
        fs::write(config_path, json)?;

        info!(path = config_path, "Configuration saved");
        Ok(())
    }

    /// Validate configuration, logging every problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        let c = &self.config;

        if c.feed.symbol.is_empty() {
            errors.push("feed.symbol must not be empty".to_string());
        }
        if c.feed.history_limit < c.indicators.regime_min_candles {
            errors.push("feed.history_limit must cover indicators.regime_min_candles".to_string());
        }
        if c.indicators.adx_period == 0 || c.indicators.rsi_period == 0 || c.indicators.band_window < 2 {
            errors.push("indicator periods must be positive (band_window >= 2)".to_string());
        }
        if c.toxicity.bucket_volume <= 0.0 || c.toxicity.max_buckets == 0 {
            errors.push("toxicity bucket volume and bucket count must be positive".to_string());
        }
        if c.structure.pivot_confirmation < c.structure.pivot_span {
            errors.push("structure.pivot_confirmation must be >= pivot_span".to_string());
        }
        if c.bias.bear_rsi > c.bias.bull_rsi {
            errors.push("bias.bear_rsi must not exceed bias.bull_rsi".to_string());
        }
        if c.risk.account_size <= 0.0 {
            errors.push("risk.account_size must be positive".to_string());
        }
        if c.risk.risk_percent <= 0.0 || c.risk.risk_percent > 100.0 {
            errors.push("risk.risk_percent must be in (0, 100]".to_string());
        }
        if !(0.0..=1.0).contains(&c.risk.belief_prior) {
            errors.push("risk.belief_prior must be in [0, 1]".to_string());
        }

        if !errors.is_empty() {
            for error in &errors {
                warn!(error = %error, "Config validation error");
            }
            return Err(ConfigError::Validation(errors.join("; ")));
        }

        info!("Configuration validated successfully");
        Ok(())
    }

    pub fn summary(&self) -> ConfigSummary {
        let c = &self.config;
        ConfigSummary {
            symbol: c.feed.symbol.clone(),
            interval: c.feed.interval.to_string(),
            history_limit: c.feed.history_limit,
            debounce_ms: c.scheduler.debounce_ms,
            account_size: c.risk.account_size,
            risk_percent: c.risk.risk_percent,
            log_level: c.monitoring.log_level.clone(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn into_config(self) -> EngineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configs() {
        let config = EngineConfig::default();
        assert_eq!(config.feed.symbol, "BTCUSDT");
        assert_eq!(config.feed.history_limit, 1000);
        assert_eq!(config.indicators.adx_period, 14);
        assert_eq!(config.toxicity.bucket_volume, 50.0);
        assert_eq!(config.scheduler.debounce_ms, 1000);
        assert_eq!(config.bias.buckets.len(), 4);
    }

    #[test]
    fn test_config_manager_validates_defaults() {
        let manager = ConfigManager::new(None).unwrap();
        assert!(manager.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_risk() {
        let mut manager = ConfigManager { config: EngineConfig::default() };
        manager.config.risk.risk_percent = 0.0;
        assert!(matches!(manager.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_env_overlay() {
        let mut manager = ConfigManager { config: EngineConfig::default() };
        manager.apply_env(|key| match key {
            "QUANTDESK_SYMBOL" => Some("ethusdt".to_string()),
            "QUANTDESK_INTERVAL" => Some("15m".to_string()),
            "QUANTDESK_RISK_PERCENT" => Some("2.5".to_string()),
            "QUANTDESK_DEBOUNCE_MS" => Some("not-a-number".to_string()),
            _ => None,
        });
        assert_eq!(manager.config().feed.symbol, "ETHUSDT");
        assert_eq!(manager.config().feed.interval, Interval::FifteenMinutes);
        assert_eq!(manager.config().risk.risk_percent, 2.5);
        assert_eq!(manager.config().scheduler.debounce_ms, 1000);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = std::env::temp_dir().join(format!("quantdesk_cfg_{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.json");
        let path_str = path.to_string_lossy().to_string();

        let mut manager = ConfigManager { config: EngineConfig::default() };
        manager.config.feed.symbol = "SOLUSDT".to_string();
        manager.config.structure.max_events = 20;
        manager.save_to_file(&path_str).unwrap();

        let mut loaded = ConfigManager { config: EngineConfig::default() };
        loaded.load_from_file(&path_str).unwrap();
        assert_eq!(loaded.config().feed.symbol, "SOLUSDT");
        assert_eq!(loaded.config().structure.max_events, 20);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_partial_section_keeps_defaults() {
        let dir = std::env::temp_dir().join(format!("quantdesk_cfg_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("partial.json");
        fs::write(&path, r#"{"risk": {"account_size": 5000.0}}"#).unwrap();

        let mut manager = ConfigManager { config: EngineConfig::default() };
        manager.load_from_file(&path.to_string_lossy()).unwrap();
        assert_eq!(manager.config().risk.account_size, 5000.0);
        assert_eq!(manager.config().risk.risk_percent, 1.0);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_config_summary() {
        let manager = ConfigManager { config: EngineConfig::default() };
        let summary = manager.summary();
        assert_eq!(summary.symbol, "BTCUSDT");
        assert_eq!(summary.interval, "1m");
    }
}
