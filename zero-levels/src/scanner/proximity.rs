//! Proximity evaluation.
//!
//! Turns a current price and a set of reference levels into signed
//! percentage distances, and picks out those within the threshold.

use serde::{Deserialize, Serialize};
use zero_common::validation::check_range;
use zero_common::ValidationResult;

use super::levels::{EnabledLevels, LevelName, ReferenceLevels};

/// Signed distance of `price` from `level`, in percent of the level.
///
/// Positive when price is above the level. Returns `None` for a zero or
/// non-finite level, or a non-finite price.
pub fn distance_pct(price: f64, level: f64) -> Option<f64> {
    if !price.is_finite() || !level.is_finite() || level == 0.0 {
        return None;
    }
    let d = (price - level) / level * 100.0;
    d.is_finite().then_some(d)
}

/// A validated proximity threshold in percent.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProximityThreshold(f64);

impl ProximityThreshold {
    pub const DEFAULT_MIN: f64 = 0.1;
    pub const DEFAULT_MAX: f64 = 20.0;
    pub const DEFAULT: f64 = 0.5;

    /// Validate `value` against `[min, max]`.
    pub fn new(value: f64, min: f64, max: f64) -> ValidationResult<Self> {
        check_range("levels.proximity_threshold", value, min, max)?;
        Ok(Self(value))
    }

    /// Validate against the default bounds.
    pub fn bounded(value: f64) -> ValidationResult<Self> {
        Self::new(value, Self::DEFAULT_MIN, Self::DEFAULT_MAX)
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Whether a signed distance is within the threshold.
    pub fn admits(&self, distance_pct: f64) -> bool {
        distance_pct.abs() <= self.0
    }
}

impl Default for ProximityThreshold {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl std::fmt::Display for ProximityThreshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Distance of one instrument's price from one of its levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceRecord {
    pub symbol: String,
    pub level: LevelName,
    pub level_value: f64,
    pub price: f64,
    /// Signed, positive when price is above the level
    pub distance_pct: f64,
}

impl DistanceRecord {
    pub fn abs_distance(&self) -> f64 {
        self.distance_pct.abs()
    }
}

/// A distance within the proximity threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRow {
    pub symbol: String,
    pub level: LevelName,
    pub level_value: f64,
    pub price: f64,
    pub distance_pct: f64,
}

impl MatchRow {
    pub fn abs_distance(&self) -> f64 {
        self.distance_pct.abs()
    }
}

impl From<&DistanceRecord> for MatchRow {
    fn from(record: &DistanceRecord) -> Self {
        Self {
            symbol: record.symbol.clone(),
            level: record.level,
            level_value: record.level_value,
            price: record.price,
            distance_pct: record.distance_pct,
        }
    }
}

/// Output of evaluating one instrument.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Every enabled, resolvable level
    pub distances: Vec<DistanceRecord>,
    /// The subset within the threshold
    pub matches: Vec<MatchRow>,
}

/// Evaluate `price` against every enabled level in `levels`.
pub fn evaluate(
    symbol: &str,
    price: f64,
    levels: &ReferenceLevels,
    threshold: ProximityThreshold,
    enabled: &EnabledLevels,
) -> Evaluation {
    let distances: Vec<DistanceRecord> = levels
        .iter()
        .filter(|(name, _)| enabled.contains(*name))
        .filter_map(|(name, value)| {
            distance_pct(price, value).map(|d| DistanceRecord {
                symbol: symbol.to_string(),
                level: name,
                level_value: value,
                price,
                distance_pct: d,
            })
        })
        .collect();

    let matches = distances
        .iter()
        .filter(|r| threshold.admits(r.distance_pct))
        .map(MatchRow::from)
        .collect();

    Evaluation { distances, matches }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn week_levels() -> ReferenceLevels {
        [(LevelName::WeekHigh, 110.0), (LevelName::WeekLow, 90.0)]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_distance_sign_and_value() {
        let d = distance_pct(111.0, 110.0).unwrap();
        assert!((d - 0.909_090).abs() < 1e-4);
        assert!(distance_pct(89.0, 90.0).unwrap() < 0.0);
        assert_eq!(distance_pct(90.0, 90.0), Some(0.0));
    }

    #[test]
    fn test_zero_or_non_finite_level_skipped() {
        assert_eq!(distance_pct(1.0, 0.0), None);
        assert_eq!(distance_pct(1.0, f64::NAN), None);
        assert_eq!(distance_pct(f64::INFINITY, 1.0), None);
    }

    #[test]
    fn test_threshold_bounds() {
        assert!(ProximityThreshold::bounded(0.1).is_ok());
        assert!(ProximityThreshold::bounded(20.0).is_ok());
        assert!(ProximityThreshold::bounded(0.05).is_err());
        assert!(ProximityThreshold::bounded(25.0).is_err());
        assert!(ProximityThreshold::bounded(f64::NAN).is_err());
        assert_eq!(ProximityThreshold::default().value(), 0.5);
    }

    #[test]
    fn test_price_just_above_week_high_matches() {
        let threshold = ProximityThreshold::bounded(2.0).unwrap();
        let eval = evaluate("BTCUSDT", 111.0, &week_levels(), threshold, &EnabledLevels::all());

        assert_eq!(eval.distances.len(), 2);
        assert_eq!(eval.matches.len(), 1);
        let m = &eval.matches[0];
        assert_eq!(m.level, LevelName::WeekHigh);
        assert_eq!(format!("{:+.2}", m.distance_pct), "+0.91");
    }

    #[test]
    fn test_price_equal_to_level_matches_minimum_threshold() {
        let threshold = ProximityThreshold::bounded(0.1).unwrap();
        let eval = evaluate("ETHUSDT", 90.0, &week_levels(), threshold, &EnabledLevels::all());
        assert_eq!(eval.matches.len(), 1);
        assert_eq!(eval.matches[0].distance_pct, 0.0);
        assert_eq!(eval.matches[0].level, LevelName::WeekLow);
    }

    #[test]
    fn test_disabled_levels_produce_nothing() {
        let enabled: EnabledLevels = [LevelName::WeekLow].into_iter().collect();
        let threshold = ProximityThreshold::bounded(20.0).unwrap();
        let eval = evaluate("BTCUSDT", 100.0, &week_levels(), threshold, &enabled);

        assert_eq!(eval.distances.len(), 1);
        assert!(eval.distances.iter().all(|r| r.level == LevelName::WeekLow));
        assert!(eval.matches.iter().all(|r| r.level == LevelName::WeekLow));
    }

    #[test]
    fn test_zero_level_is_skipped_without_error() {
        let levels: ReferenceLevels = [(LevelName::MonthLow, 0.0), (LevelName::MonthHigh, 50.0)]
            .into_iter()
            .collect();
        let eval = evaluate("X", 50.0, &levels, ProximityThreshold::default(), &EnabledLevels::all());
        assert_eq!(eval.distances.len(), 1);
        assert_eq!(eval.distances[0].level, LevelName::MonthHigh);
    }

    proptest! {
        #[test]
        fn prop_sign_follows_price_minus_level(price in 0.0001f64..1e6, level in 0.0001f64..1e6) {
            let d = distance_pct(price, level).unwrap();
            if price > level {
                prop_assert!(d > 0.0);
            } else if price < level {
                prop_assert!(d < 0.0);
            } else {
                prop_assert_eq!(d, 0.0);
            }
        }

        #[test]
        fn prop_matches_within_threshold_non_matches_outside(
            price in 1.0f64..1000.0,
            values in prop::collection::vec(1.0f64..1000.0, 4),
            t in 0.1f64..20.0,
        ) {
            let levels: ReferenceLevels = LevelName::ALL.into_iter().zip(values).collect();
            let threshold = ProximityThreshold::bounded(t).unwrap();
            let eval = evaluate("P", price, &levels, threshold, &EnabledLevels::all());

            prop_assert_eq!(eval.distances.len(), 4);
            for m in &eval.matches {
                prop_assert!(m.abs_distance() <= t);
            }
            for r in &eval.distances {
                let matched = eval.matches.iter().any(|m| m.level == r.level);
                prop_assert_eq!(matched, r.abs_distance() <= t);
            }
        }
    }
}
