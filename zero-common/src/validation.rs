//! Configuration validation for Zero services.
//!
//! Provides validation logic for configuration fields to ensure
//! all required values are present and within valid ranges.

use thiserror::Error;

use crate::config::{BitgetConfig, Config, LevelsConfig, ObservabilityConfig, KNOWN_LEVELS};

/// Largest worker pool the scanner accepts.
pub const MAX_WORKERS: usize = 64;

/// Longest accepted cache TTL and refresh interval (one week).
pub const MAX_PERIOD_SECS: u64 = 7 * 24 * 60 * 60;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["pretty", "json"];
const LEVEL_SOURCES: &[&str] = &["daily", "native"];

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("{field} = {value} is outside [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Configuration conflict: {reason}")]
    Conflict { reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

/// Check that `value` lies within `[min, max]`.
pub fn check_range(field: &str, value: f64, min: f64, max: f64) -> ValidationResult<()> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            field: field.to_string(),
            value,
            min,
            max,
        })
    }
}

fn collect(errors: Vec<ValidationError>) -> ValidationResult<()> {
    let mut errors = errors;
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.observability.validate() {
            errors.push(e);
        }
        if let Err(e) = self.levels.validate() {
            errors.push(e);
        }

        collect(errors)
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        // EnvFilter directives such as "info,zero_levels=debug" are accepted as-is.
        let base = self.log_level.split(',').next().unwrap_or_default();
        if !base.contains('=') && !LOG_LEVELS.contains(&base.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("expected one of {LOG_LEVELS:?}"),
            });
        }
        if !LOG_FORMATS.contains(&self.log_format.as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("expected one of {LOG_FORMATS:?}"),
            });
        }
        Ok(())
    }
}

impl Validate for LevelsConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if !(self.threshold_min > 0.0 && self.threshold_min <= self.threshold_max) {
            errors.push(ValidationError::Conflict {
                reason: format!(
                    "levels.threshold_min ({}) must be positive and not exceed levels.threshold_max ({})",
                    self.threshold_min, self.threshold_max
                ),
            });
        } else if let Err(e) = check_range(
            "levels.proximity_threshold",
            self.proximity_threshold,
            self.threshold_min,
            self.threshold_max,
        ) {
            errors.push(e);
        }

        if let Err(e) = check_range("levels.workers", self.workers as f64, 1.0, MAX_WORKERS as f64) {
            errors.push(e);
        }

        if let Err(e) = check_range(
            "levels.cache_ttl_secs",
            self.cache_ttl_secs as f64,
            1.0,
            MAX_PERIOD_SECS as f64,
        ) {
            errors.push(e);
        }

        if self.top_k == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "levels.top_k".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if let Err(e) = check_range(
            "levels.refresh_interval_secs",
            self.refresh_interval_secs as f64,
            1.0,
            MAX_PERIOD_SECS as f64,
        ) {
            errors.push(e);
        }

        if self.enabled_levels.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "levels.enabled_levels".into(),
            });
        }
        for name in &self.enabled_levels {
            if !KNOWN_LEVELS.contains(&name.as_str()) {
                errors.push(ValidationError::InvalidValue {
                    field: "levels.enabled_levels".into(),
                    reason: format!("unknown level '{name}', expected one of {KNOWN_LEVELS:?}"),
                });
            }
        }

        if !LEVEL_SOURCES.contains(&self.level_source.as_str()) {
            errors.push(ValidationError::InvalidValue {
                field: "levels.level_source".into(),
                reason: format!("expected one of {LEVEL_SOURCES:?}"),
            });
        }

        if let Err(e) = self.bitget.validate() {
            errors.push(e);
        }

        collect(errors)
    }
}

impl Validate for BitgetConfig {
    fn validate(&self) -> ValidationResult<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ValidationError::InvalidValue {
                field: "levels.bitget.base_url".into(),
                reason: "must be an http(s) URL".into(),
            });
        }
        if self.rate_limit_rpm == 0 {
            return Err(ValidationError::InvalidValue {
                field: "levels.bitget.rate_limit_rpm".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "levels.bitget.timeout_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_threshold_out_of_range() {
        let mut levels = LevelsConfig::default();
        levels.proximity_threshold = 25.0;
        let err = levels.validate().unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { .. }));
        assert!(err.to_string().contains("levels.proximity_threshold"));
    }

    #[test]
    fn test_threshold_bounds_inclusive() {
        let mut levels = LevelsConfig::default();
        levels.proximity_threshold = 0.1;
        assert!(levels.validate().is_ok());
        levels.proximity_threshold = 20.0;
        assert!(levels.validate().is_ok());
    }

    #[test]
    fn test_nan_threshold_rejected() {
        assert!(check_range("x", f64::NAN, 0.1, 20.0).is_err());
    }

    #[test]
    fn test_workers_bounds() {
        let mut levels = LevelsConfig::default();
        levels.workers = 0;
        assert!(levels.validate().is_err());
        levels.workers = MAX_WORKERS + 1;
        assert!(levels.validate().is_err());
        levels.workers = MAX_WORKERS;
        assert!(levels.validate().is_ok());
    }

    #[test]
    fn test_period_upper_bounds() {
        let mut levels = LevelsConfig::default();
        levels.cache_ttl_secs = 9_000_000_000_000_000;
        let err = levels.validate().unwrap_err();
        assert!(err.to_string().contains("levels.cache_ttl_secs"));

        levels.cache_ttl_secs = MAX_PERIOD_SECS;
        levels.refresh_interval_secs = MAX_PERIOD_SECS + 1;
        let err = levels.validate().unwrap_err();
        assert!(err.to_string().contains("levels.refresh_interval_secs"));

        levels.refresh_interval_secs = MAX_PERIOD_SECS;
        assert!(levels.validate().is_ok());
    }

    #[test]
    fn test_unknown_level_name() {
        let mut levels = LevelsConfig::default();
        levels.enabled_levels = vec!["day_high".into()];
        let err = levels.validate().unwrap_err();
        assert!(err.to_string().contains("day_high"));
    }

    #[test]
    fn test_multiple_errors_collected() {
        let mut levels = LevelsConfig::default();
        levels.workers = 0;
        levels.top_k = 0;
        levels.cache_ttl_secs = 0;
        match levels.validate().unwrap_err() {
            ValidationError::Multiple(errors) => assert_eq!(errors.len(), 3),
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test]
    fn test_inverted_bounds_conflict() {
        let mut levels = LevelsConfig::default();
        levels.threshold_min = 5.0;
        levels.threshold_max = 1.0;
        assert!(matches!(
            levels.validate().unwrap_err(),
            ValidationError::Conflict { .. }
        ));
    }

    #[test]
    fn test_log_level_directive_accepted() {
        let mut obs = ObservabilityConfig::default();
        obs.log_level = "info,zero_levels=debug".into();
        assert!(obs.validate().is_ok());
        obs.log_level = "loud".into();
        assert!(obs.validate().is_err());
    }
}
