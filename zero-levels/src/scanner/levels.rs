//! Reference level names and per-instrument level maps.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use zero_common::{ValidationError, ValidationResult};

use super::calendar::Period;

/// Which extreme of a period a level represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelSide {
    High,
    Low,
}

/// A named reference level.
///
/// Ordering follows the report layout: month levels before week levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelName {
    MonthHigh,
    MonthLow,
    WeekHigh,
    WeekLow,
}

impl LevelName {
    /// All level names in report order.
    pub const ALL: [LevelName; 4] = [
        LevelName::MonthHigh,
        LevelName::MonthLow,
        LevelName::WeekHigh,
        LevelName::WeekLow,
    ];

    /// Identifier used in configuration and JSON output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MonthHigh => "month_high",
            Self::MonthLow => "month_low",
            Self::WeekHigh => "week_high",
            Self::WeekLow => "week_low",
        }
    }

    /// Human-readable title for tables.
    pub fn title(&self) -> &'static str {
        match self {
            Self::MonthHigh => "Near Previous Month High",
            Self::MonthLow => "Near Previous Month Low",
            Self::WeekHigh => "Near Previous Week High",
            Self::WeekLow => "Near Previous Week Low",
        }
    }

    pub fn period(&self) -> Period {
        match self {
            Self::MonthHigh | Self::MonthLow => Period::Month,
            Self::WeekHigh | Self::WeekLow => Period::Week,
        }
    }

    pub fn side(&self) -> LevelSide {
        match self {
            Self::MonthHigh | Self::WeekHigh => LevelSide::High,
            Self::MonthLow | Self::WeekLow => LevelSide::Low,
        }
    }

    /// The level for a given period and side.
    pub fn of(period: Period, side: LevelSide) -> Self {
        match (period, side) {
            (Period::Month, LevelSide::High) => Self::MonthHigh,
            (Period::Month, LevelSide::Low) => Self::MonthLow,
            (Period::Week, LevelSide::High) => Self::WeekHigh,
            (Period::Week, LevelSide::Low) => Self::WeekLow,
        }
    }
}

impl std::fmt::Display for LevelName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LevelName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "month_high" => Ok(Self::MonthHigh),
            "month_low" => Ok(Self::MonthLow),
            "week_high" => Ok(Self::WeekHigh),
            "week_low" => Ok(Self::WeekLow),
            _ => Err(format!("Unknown level name: {}", s)),
        }
    }
}

/// Resolved levels for one instrument in one pass.
///
/// A missing key means the level could not be resolved this pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceLevels(BTreeMap<LevelName, f64>);

impl ReferenceLevels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a level, replacing any previous value for that name.
    pub fn insert(&mut self, name: LevelName, value: f64) {
        self.0.insert(name, value);
    }

    pub fn get(&self, name: LevelName) -> Option<f64> {
        self.0.get(&name).copied()
    }

    pub fn contains(&self, name: LevelName) -> bool {
        self.0.contains_key(&name)
    }

    /// Iterate resolved levels in report order.
    pub fn iter(&self) -> impl Iterator<Item = (LevelName, f64)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(LevelName, f64)> for ReferenceLevels {
    fn from_iter<I: IntoIterator<Item = (LevelName, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The set of level names a pass reports on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnabledLevels(BTreeSet<LevelName>);

impl EnabledLevels {
    pub fn all() -> Self {
        Self(LevelName::ALL.into_iter().collect())
    }

    /// Parse configured names; unknown names are rejected.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> ValidationResult<Self> {
        let set = names
            .iter()
            .map(|n| {
                n.as_ref()
                    .parse::<LevelName>()
                    .map_err(|reason| ValidationError::InvalidValue {
                        field: "levels.enabled_levels".into(),
                        reason,
                    })
            })
            .collect::<ValidationResult<BTreeSet<_>>>()?;

        if set.is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "levels.enabled_levels".into(),
                reason: "at least one level must be enabled".into(),
            });
        }
        Ok(Self(set))
    }

    pub fn contains(&self, name: LevelName) -> bool {
        self.0.contains(&name)
    }

    /// Enabled names in report order.
    pub fn iter(&self) -> impl Iterator<Item = LevelName> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for EnabledLevels {
    fn default() -> Self {
        Self::all()
    }
}

impl FromIterator<LevelName> for EnabledLevels {
    fn from_iter<I: IntoIterator<Item = LevelName>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_name_roundtrip() {
        for name in LevelName::ALL {
            assert_eq!(name.as_str().parse::<LevelName>().unwrap(), name);
            assert_eq!(LevelName::of(name.period(), name.side()), name);
        }
        assert!("day_high".parse::<LevelName>().is_err());
    }

    #[test]
    fn test_level_names_match_config_constants() {
        let names: Vec<&str> = LevelName::ALL.iter().map(|n| n.as_str()).collect();
        assert_eq!(names, zero_common::config::KNOWN_LEVELS);
    }

    #[test]
    fn test_reference_levels_one_value_per_name() {
        let mut levels = ReferenceLevels::new();
        levels.insert(LevelName::WeekHigh, 110.0);
        levels.insert(LevelName::WeekHigh, 112.0);
        assert_eq!(levels.len(), 1);
        assert_eq!(levels.get(LevelName::WeekHigh), Some(112.0));
        assert_eq!(levels.get(LevelName::MonthLow), None);
    }

    #[test]
    fn test_enabled_levels_from_names() {
        let enabled = EnabledLevels::from_names(&["week_low", "month_high"]).unwrap();
        let order: Vec<LevelName> = enabled.iter().collect();
        assert_eq!(order, vec![LevelName::MonthHigh, LevelName::WeekLow]);
        assert!(!enabled.contains(LevelName::WeekHigh));

        assert!(EnabledLevels::from_names(&["week_low", "bogus"]).is_err());
        assert!(EnabledLevels::from_names::<&str>(&[]).is_err());
        assert_eq!(EnabledLevels::default().len(), 4);
    }

    #[test]
    fn test_reference_levels_serialize_as_map() {
        let levels: ReferenceLevels = [(LevelName::WeekLow, 90.0)].into_iter().collect();
        let json = serde_json::to_string(&levels).unwrap();
        assert_eq!(json, r#"{"week_low":90.0}"#);
    }
}
