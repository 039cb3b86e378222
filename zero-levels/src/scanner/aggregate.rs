//! Result aggregation.
//!
//! Buckets matches per level, ranks every distance into a top-K view and
//! lays out the per-instrument diagnostic table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::engine::{OutcomeStatus, ScanFailure, ScanRun};
use super::levels::LevelName;
use super::proximity::{DistanceRecord, MatchRow};

/// Default size of the ranked view.
pub const DEFAULT_TOP_K: usize = 10;

/// Matches for one level, closest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelBucket {
    pub level: LevelName,
    pub rows: Vec<MatchRow>,
}

/// One diagnostic cell; `distance_pct: None` marks "no data".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticCell {
    pub level: LevelName,
    pub distance_pct: Option<f64>,
}

/// One row per attempted instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticRow {
    pub symbol: String,
    pub price: Option<f64>,
    pub cells: Vec<DiagnosticCell>,
    pub failure: Option<String>,
}

/// Aggregated view of a pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelTables {
    pub scan_id: String,
    pub generated_at: DateTime<Utc>,
    pub threshold_pct: f64,
    pub total: usize,
    pub completed: usize,
    pub evaluated: usize,
    /// Enabled levels only, in report order
    pub buckets: Vec<LevelBucket>,
    pub top_k: usize,
    pub top: Vec<DistanceRecord>,
    pub diagnostics: Vec<DiagnosticRow>,
    pub failures: Vec<ScanFailure>,
}

impl LevelTables {
    pub fn bucket(&self, level: LevelName) -> Option<&LevelBucket> {
        self.buckets.iter().find(|b| b.level == level)
    }

    pub fn match_count(&self) -> usize {
        self.buckets.iter().map(|b| b.rows.len()).sum()
    }
}

fn by_abs_distance(a: f64, b: f64) -> Ordering {
    a.abs().total_cmp(&b.abs())
}

/// Build all tables for `run`.
pub fn aggregate(run: &ScanRun, top_k: usize) -> LevelTables {
    let buckets = run
        .enabled
        .iter()
        .map(|level| {
            let mut rows: Vec<MatchRow> = run
                .matches
                .iter()
                .filter(|m| m.level == level)
                .cloned()
                .collect();
            rows.sort_by(|a, b| {
                by_abs_distance(a.distance_pct, b.distance_pct).then_with(|| a.symbol.cmp(&b.symbol))
            });
            LevelBucket { level, rows }
        })
        .collect();

    let mut top: Vec<DistanceRecord> = run
        .distances
        .iter()
        .filter(|r| run.enabled.contains(r.level) && r.distance_pct.is_finite())
        .cloned()
        .collect();
    top.sort_by(|a, b| {
        by_abs_distance(a.distance_pct, b.distance_pct)
            .then_with(|| a.symbol.cmp(&b.symbol))
            .then_with(|| a.level.cmp(&b.level))
    });
    top.truncate(top_k);

    let mut diagnostics: Vec<DiagnosticRow> = run
        .outcomes
        .iter()
        .map(|outcome| DiagnosticRow {
            symbol: outcome.symbol.clone(),
            price: outcome.price,
            cells: run
                .enabled
                .iter()
                .map(|level| DiagnosticCell {
                    level,
                    distance_pct: outcome
                        .distances
                        .iter()
                        .find(|r| r.level == level)
                        .map(|r| r.distance_pct),
                })
                .collect(),
            failure: match &outcome.status {
                OutcomeStatus::Failed(message) => Some(message.clone()),
                _ => None,
            },
        })
        .collect();
    diagnostics.sort_by(|a, b| a.symbol.cmp(&b.symbol));

    let mut failures = run.failures.clone();
    failures.sort_by(|a, b| a.symbol.cmp(&b.symbol));

    LevelTables {
        scan_id: run.id.clone(),
        generated_at: run.completed_at,
        threshold_pct: run.threshold.value(),
        total: run.total,
        completed: run.completed,
        evaluated: run.evaluated_count(),
        buckets,
        top_k,
        top,
        diagnostics,
        failures,
    }
}
