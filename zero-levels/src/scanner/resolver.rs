//! Previous-period level resolution.
//!
//! Derives week/month highs and lows from bar series fetched through the
//! shared [`BarCache`]. Only bars opened before the start of the current
//! period contribute.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::data::{Bar, BarCache, Instrument, Timeframe};

use super::calendar::{Period, PeriodBoundaries, Window};
use super::levels::{LevelName, LevelSide, ReferenceLevels};

/// Which bar timeframe levels are derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelSource {
    /// Daily bars filtered to the previous period window.
    #[default]
    Daily,
    /// Native weekly/monthly bars.
    Native,
}

impl std::str::FromStr for LevelSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "native" => Ok(Self::Native),
            _ => Err(format!("Unknown level source: {}", s)),
        }
    }
}

impl std::fmt::Display for LevelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Daily => write!(f, "daily"),
            Self::Native => write!(f, "native"),
        }
    }
}

/// High/low pair for one completed period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodExtremes {
    pub high: f64,
    pub low: f64,
}

/// Resolves reference levels for one instrument at a time.
#[derive(Clone)]
pub struct LevelResolver {
    cache: Arc<BarCache>,
    source: LevelSource,
}

impl LevelResolver {
    pub fn new(cache: Arc<BarCache>, source: LevelSource) -> Self {
        Self { cache, source }
    }

    pub fn cache(&self) -> &Arc<BarCache> {
        &self.cache
    }

    /// Resolve all four levels for `instrument`.
    ///
    /// Week and month are fetched concurrently and independently; a period
    /// with no usable bars simply leaves its two keys absent.
    pub async fn resolve(
        &self,
        instrument: &Instrument,
        boundaries: &PeriodBoundaries,
    ) -> ReferenceLevels {
        let (week, month) = tokio::join!(
            self.resolve_period(instrument, boundaries, Period::Week),
            self.resolve_period(instrument, boundaries, Period::Month),
        );

        let mut levels = ReferenceLevels::new();
        for (period, extremes) in [(Period::Week, week), (Period::Month, month)] {
            match extremes {
                Some(e) => {
                    levels.insert(LevelName::of(period, LevelSide::High), e.high);
                    levels.insert(LevelName::of(period, LevelSide::Low), e.low);
                }
                None => debug!(symbol = %instrument, %period, "No previous-period bars"),
            }
        }
        levels
    }

    async fn resolve_period(
        &self,
        instrument: &Instrument,
        boundaries: &PeriodBoundaries,
        period: Period,
    ) -> Option<PeriodExtremes> {
        let window = boundaries.previous(period);
        match self.source {
            LevelSource::Daily => {
                let bars = self
                    .cache
                    .get(instrument, Timeframe::Daily, window.start, daily_limit(period))
                    .await;
                previous_period_extremes(&bars, window)
            }
            LevelSource::Native => {
                let (timeframe, fetch_from) = match period {
                    Period::Week => (Timeframe::Weekly, window.start - chrono::Duration::weeks(3)),
                    Period::Month => (Timeframe::Monthly, window.start - chrono::Duration::days(93)),
                };
                let bars = self
                    .cache
                    .get(instrument, timeframe, fetch_from, NATIVE_LIMIT)
                    .await;
                native_period_extremes(&bars, window)
            }
        }
    }
}

/// Native bars requested per period: a few closed periods plus the open one.
const NATIVE_LIMIT: usize = 6;

/// Daily bars requested per period, with slack for exchange gaps.
fn daily_limit(period: Period) -> usize {
    match period {
        Period::Week => 14,
        Period::Month => 62,
    }
}

/// Max high / min low over well-formed bars inside `window`.
pub fn previous_period_extremes(bars: &[Bar], window: Window) -> Option<PeriodExtremes> {
    extremes(
        bars.iter()
            .filter(|b| b.is_well_formed() && window.contains(b.timestamp)),
    )
}

/// Extremes from native period bars.
///
/// Uses bars inside `window`; failing that, the most recent well-formed bar
/// opened before `window.end` (the start of the current period). A series
/// holding only the still-open bar yields nothing.
pub fn native_period_extremes(bars: &[Bar], window: Window) -> Option<PeriodExtremes> {
    previous_period_extremes(bars, window).or_else(|| {
        bars.iter()
            .filter(|b| b.is_well_formed() && b.timestamp < window.end)
            .max_by_key(|b| b.timestamp)
            .map(|b| PeriodExtremes {
                high: b.high,
                low: b.low,
            })
    })
}

fn extremes<'a>(bars: impl Iterator<Item = &'a Bar>) -> Option<PeriodExtremes> {
    bars.fold(None, |acc: Option<PeriodExtremes>, bar| {
        Some(match acc {
            Some(e) => PeriodExtremes {
                high: e.high.max(bar.high),
                low: e.low.min(bar.low),
            },
            None => PeriodExtremes {
                high: bar.high,
                low: bar.low,
            },
        })
    })
}
