//! Configuration management for Zero services.
//!
//! The level scanner reads a single configuration file at `~/.zero-levels/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (ZERO_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! ## Scanner
//! - `ZERO_LEVELS_THRESHOLD` → levels.proximity_threshold
//! - `ZERO_LEVELS_WORKERS` → levels.workers
//! - `ZERO_LEVELS_CACHE_TTL_SECS` → levels.cache_ttl_secs
//! - `ZERO_LEVELS_TOP_K` → levels.top_k
//!
//! ## Observability
//! - `ZERO_LOG_LEVEL` → observability.log_level
//! - `ZERO_LOG_FORMAT` → observability.log_format

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, ResultExt};

/// Level names understood by the scanner, in display order.
pub const KNOWN_LEVELS: &[&str] = &["month_high", "month_low", "week_high", "week_low"];

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".zero-levels"),
        |dirs| dirs.home_dir().join(".zero-levels"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// JSON Schema reference
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Logging configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Level scanner configuration
    #[serde(default)]
    pub levels: LevelsConfig,
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// A missing file is not an error; defaults are used instead.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .context(format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides applied.
    pub fn load_with_env(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load_from(p)?,
            None => Self::load()?,
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Unparsable values are ignored with a warning rather than replacing
    /// the configured value.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse::<f64>("ZERO_LEVELS_THRESHOLD") {
            self.levels.proximity_threshold = v;
        }
        if let Some(v) = env_parse::<usize>("ZERO_LEVELS_WORKERS") {
            self.levels.workers = v;
        }
        if let Some(v) = env_parse::<u64>("ZERO_LEVELS_CACHE_TTL_SECS") {
            self.levels.cache_ttl_secs = v;
        }
        if let Some(v) = env_parse::<usize>("ZERO_LEVELS_TOP_K") {
            self.levels.top_k = v;
        }
        if let Ok(level) = std::env::var("ZERO_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Ok(format) = std::env::var("ZERO_LOG_FORMAT") {
            self.observability.log_format = format;
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparsable environment override");
            None
        }
    }
}

// ============================================================================
// Observability
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets clamped to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

// ============================================================================
// Level Scanner
// ============================================================================

/// Level scanner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelsConfig {
    /// Proximity threshold in percent
    #[serde(default = "default_threshold")]
    pub proximity_threshold: f64,

    /// Smallest accepted threshold (percent)
    #[serde(default = "default_threshold_min")]
    pub threshold_min: f64,

    /// Largest accepted threshold (percent)
    #[serde(default = "default_threshold_max")]
    pub threshold_max: f64,

    /// Worker pool size
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Bar cache time-to-live in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Level names to evaluate (subset of [`KNOWN_LEVELS`])
    #[serde(default = "default_enabled_levels")]
    pub enabled_levels: Vec<String>,

    /// Size of the "closest N" ranking
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Bar source for previous-period levels: "daily" or "native"
    #[serde(default = "default_level_source")]
    pub level_source: String,

    /// Seconds between scheduled passes
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Include the per-instrument diagnostic table in reports
    #[serde(default)]
    pub diagnostics: bool,

    /// Instrument universe filter
    #[serde(default)]
    pub universe: UniverseConfig,

    /// Bitget market data gateway
    #[serde(default)]
    pub bitget: BitgetConfig,
}

impl Default for LevelsConfig {
    fn default() -> Self {
        Self {
            proximity_threshold: default_threshold(),
            threshold_min: default_threshold_min(),
            threshold_max: default_threshold_max(),
            workers: default_workers(),
            cache_ttl_secs: default_cache_ttl_secs(),
            enabled_levels: default_enabled_levels(),
            top_k: default_top_k(),
            level_source: default_level_source(),
            refresh_interval_secs: default_refresh_interval_secs(),
            diagnostics: false,
            universe: UniverseConfig::default(),
            bitget: BitgetConfig::default(),
        }
    }
}

fn default_threshold() -> f64 {
    0.5
}

fn default_threshold_min() -> f64 {
    0.1
}

fn default_threshold_max() -> f64 {
    20.0
}

fn default_workers() -> usize {
    8
}

fn default_cache_ttl_secs() -> u64 {
    900
}

fn default_enabled_levels() -> Vec<String> {
    KNOWN_LEVELS.iter().map(|s| (*s).to_string()).collect()
}

fn default_top_k() -> usize {
    10
}

fn default_level_source() -> String {
    "daily".to_string()
}

fn default_refresh_interval_secs() -> u64 {
    900
}

/// Instrument universe filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniverseConfig {
    /// Quote currency (e.g. "USDT")
    #[serde(default = "default_quote")]
    pub quote: String,

    /// Contract type (e.g. "perpetual")
    #[serde(default = "default_contract_type")]
    pub contract_type: String,

    /// Explicit symbols; when non-empty, the universe is restricted to these
    #[serde(default)]
    pub symbols: Vec<String>,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            quote: default_quote(),
            contract_type: default_contract_type(),
            symbols: Vec::new(),
        }
    }
}

fn default_quote() -> String {
    "USDT".to_string()
}

fn default_contract_type() -> String {
    "perpetual".to_string()
}

/// Bitget REST gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitgetConfig {
    #[serde(default = "default_bitget_base_url")]
    pub base_url: String,

    /// Product type passed to the mix market endpoints
    #[serde(default = "default_product_type")]
    pub product_type: String,

    /// Proactive request budget (requests per minute)
    #[serde(default = "default_rate_limit_rpm")]
    pub rate_limit_rpm: u32,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BitgetConfig {
    fn default() -> Self {
        Self {
            base_url: default_bitget_base_url(),
            product_type: default_product_type(),
            rate_limit_rpm: default_rate_limit_rpm(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_bitget_base_url() -> String {
    "https://api.bitget.com".to_string()
}

fn default_product_type() -> String {
    "USDT-FUTURES".to_string()
}

fn default_rate_limit_rpm() -> u32 {
    600 // 10 req/sec, well under the public market limit
}

fn default_timeout_secs() -> u64 {
    15
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.observability.log_level, "info");
        assert!((config.levels.proximity_threshold - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.levels.workers, 8);
        assert_eq!(config.levels.cache_ttl_secs, 900);
        assert_eq!(config.levels.enabled_levels.len(), 4);
        assert_eq!(config.levels.top_k, 10);
        assert_eq!(config.levels.bitget.product_type, "USDT-FUTURES");
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{ "levels": { "proximity_threshold": 1.5, "enabled_levels": ["week_high"] } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!((config.levels.proximity_threshold - 1.5).abs() < f64::EPSILON);
        assert_eq!(config.levels.enabled_levels, vec!["week_high".to_string()]);
        assert_eq!(config.levels.workers, 8);
        assert_eq!(config.observability.log_format, "pretty");
    }

    #[test]
    fn test_observability_aliases() {
        let json = r#"{ "observability": { "level": "debug", "format": "json" } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.observability.log_level, "debug");
        assert_eq!(config.observability.log_format, "json");
    }

    #[test]
    fn test_load_from_file_keeps_defaults_for_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "levels": { "top_k": 25 } }"#).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.levels.top_k, 25);
        assert_eq!(loaded.levels.workers, 8);
    }

    #[test]
    fn test_load_from_invalid_json_has_context() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }
}
