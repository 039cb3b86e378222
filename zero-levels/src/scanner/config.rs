//! Scanner settings.
//!
//! Typed, validated view of [`LevelsConfig`] used by the engine, the
//! scheduler and the CLI.

use std::time::Duration;
use zero_common::{LevelsConfig, Validate, ValidationError};

use crate::data::UniverseFilter;

use super::engine::ScanError;
use super::levels::EnabledLevels;
use super::proximity::ProximityThreshold;
use super::resolver::LevelSource;

/// Run-wide scanner settings.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub threshold: ProximityThreshold,
    /// Accepted threshold range, for later overrides
    pub threshold_bounds: (f64, f64),
    pub workers: usize,
    pub cache_ttl: Duration,
    pub enabled: EnabledLevels,
    pub top_k: usize,
    pub level_source: LevelSource,
    pub refresh_interval: Duration,
    pub diagnostics: bool,
    pub universe: UniverseFilter,
}

impl ScanSettings {
    /// Validate `config` and build settings from it.
    pub fn from_config(config: &LevelsConfig) -> Result<Self, ScanError> {
        config.validate()?;

        let level_source = config
            .level_source
            .parse::<LevelSource>()
            .map_err(|reason| ValidationError::InvalidValue {
                field: "levels.level_source".into(),
                reason,
            })?;

        Ok(Self {
            threshold: ProximityThreshold::new(
                config.proximity_threshold,
                config.threshold_min,
                config.threshold_max,
            )?,
            threshold_bounds: (config.threshold_min, config.threshold_max),
            workers: config.workers,
            cache_ttl: Duration::from_secs(config.cache_ttl_secs),
            enabled: EnabledLevels::from_names(&config.enabled_levels)?,
            top_k: config.top_k,
            level_source,
            refresh_interval: Duration::from_secs(config.refresh_interval_secs),
            diagnostics: config.diagnostics,
            universe: UniverseFilter::from_config(&config.universe),
        })
    }

    /// Validate a threshold override against the configured range.
    pub fn threshold_override(&self, value: f64) -> Result<ProximityThreshold, ScanError> {
        let (min, max) = self.threshold_bounds;
        Ok(ProximityThreshold::new(value, min, max)?)
    }

    /// Validate a closest-N override; zero would leave the ranking empty.
    pub fn top_k_override(&self, value: usize) -> Result<usize, ScanError> {
        if value == 0 {
            return Err(ValidationError::InvalidValue {
                field: "levels.top_k".into(),
                reason: "must be greater than 0".into(),
            }
            .into());
        }
        Ok(value)
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            threshold: ProximityThreshold::default(),
            threshold_bounds: (ProximityThreshold::DEFAULT_MIN, ProximityThreshold::DEFAULT_MAX),
            workers: 8,
            cache_ttl: Duration::from_secs(900),
            enabled: EnabledLevels::all(),
            top_k: super::aggregate::DEFAULT_TOP_K,
            level_source: LevelSource::Daily,
            refresh_interval: Duration::from_secs(900),
            diagnostics: false,
            universe: UniverseFilter::default(),
        }
    }
}
