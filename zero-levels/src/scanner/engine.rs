//! Level scan engine.
//!
//! Fans one task per instrument out over a bounded worker pool and folds
//! the outcomes into a [`ScanRun`] from a single collector, in completion
//! order.

use chrono::{DateTime, Utc};
use futures_util::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use zero_common::validation::MAX_WORKERS;
use zero_common::ValidationError;

use crate::data::{GatewayError, Instrument, MarketGateway, UniverseFilter, UniverseProvider};

use super::calendar::PeriodBoundaries;
use super::levels::{EnabledLevels, ReferenceLevels};
use super::proximity::{evaluate, DistanceRecord, MatchRow, ProximityThreshold};
use super::resolver::LevelResolver;

// ============================================================================
// Errors
// ============================================================================

/// Pass-level errors. Per-instrument problems never surface here.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Rejected before any worker starts
    #[error("Configuration error: {0}")]
    Configuration(#[from] ValidationError),

    /// The instrument universe could not be listed
    #[error("Universe unavailable: {0}")]
    Universe(#[from] GatewayError),
}

// ============================================================================
// Outcomes
// ============================================================================

/// A per-instrument failure recorded in the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanFailure {
    pub symbol: String,
    pub message: String,
}

/// How a single instrument's scan ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Price and at least one level resolved
    Evaluated,
    /// Nothing to report: missing price or no resolvable level
    NoData,
    /// The worker failed; carries the error description
    Failed(String),
}

/// Everything one worker produced for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentOutcome {
    pub symbol: String,
    pub price: Option<f64>,
    pub levels: ReferenceLevels,
    pub distances: Vec<DistanceRecord>,
    pub matches: Vec<MatchRow>,
    pub status: OutcomeStatus,
}

impl InstrumentOutcome {
    fn empty(symbol: &str, status: OutcomeStatus) -> Self {
        Self {
            symbol: symbol.to_string(),
            price: None,
            levels: ReferenceLevels::new(),
            distances: Vec::new(),
            matches: Vec::new(),
            status,
        }
    }

    fn failed(symbol: &str, message: impl Into<String>) -> Self {
        Self::empty(symbol, OutcomeStatus::Failed(message.into()))
    }
}

// ============================================================================
// Progress
// ============================================================================

#[derive(Debug, Default)]
struct ProgressInner {
    completed: AtomicUsize,
    total: AtomicUsize,
}

/// Completed/total counter for one pass.
///
/// Cheap to clone; every clone observes the same pass.
#[derive(Debug, Clone, Default)]
pub struct ScanProgress {
    inner: Arc<ProgressInner>,
}

/// Point-in-time view of a [`ScanProgress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub total: usize,
}

impl ProgressSnapshot {
    pub fn is_done(&self) -> bool {
        self.completed >= self.total
    }

    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

impl ScanProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            completed: self.inner.completed.load(Ordering::Acquire),
            total: self.inner.total.load(Ordering::Acquire),
        }
    }

    fn start(&self, total: usize) {
        self.inner.completed.store(0, Ordering::Release);
        self.inner.total.store(total, Ordering::Release);
    }

    fn complete_one(&self) -> usize {
        self.inner.completed.fetch_add(1, Ordering::AcqRel) + 1
    }
}

// ============================================================================
// Scan Run
// ============================================================================

/// The result of one pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRun {
    /// Pass ID (timestamp plus sequence)
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Boundaries shared by every worker in the pass
    pub boundaries: PeriodBoundaries,
    pub threshold: ProximityThreshold,
    pub enabled: EnabledLevels,
    /// Instruments attempted
    pub total: usize,
    /// Instruments finished, successfully or not
    pub completed: usize,
    /// One entry per attempted instrument, in completion order
    pub outcomes: Vec<InstrumentOutcome>,
    pub distances: Vec<DistanceRecord>,
    pub matches: Vec<MatchRow>,
    pub failures: Vec<ScanFailure>,
}

impl ScanRun {
    fn new(
        id: String,
        boundaries: PeriodBoundaries,
        threshold: ProximityThreshold,
        enabled: EnabledLevels,
        total: usize,
    ) -> Self {
        Self {
            id,
            started_at: Utc::now(),
            completed_at: Utc::now(),
            boundaries,
            threshold,
            enabled,
            total,
            completed: 0,
            outcomes: Vec::with_capacity(total),
            distances: Vec::new(),
            matches: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn merge(&mut self, outcome: InstrumentOutcome) {
        if let OutcomeStatus::Failed(message) = &outcome.status {
            self.failures.push(ScanFailure {
                symbol: outcome.symbol.clone(),
                message: message.clone(),
            });
        }
        self.distances.extend(outcome.distances.iter().cloned());
        self.matches.extend(outcome.matches.iter().cloned());
        self.outcomes.push(outcome);
        self.completed += 1;
    }

    /// Instruments that produced at least one distance.
    pub fn evaluated_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Evaluated)
            .count()
    }

    pub fn duration_secs(&self) -> f64 {
        (self.completed_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    /// Summary string for logging.
    pub fn summary(&self) -> String {
        format!(
            "Scanned {}/{} instruments in {:.1}s: {} matches, {} failures",
            self.completed,
            self.total,
            self.duration_secs(),
            self.matches.len(),
            self.failures.len()
        )
    }
}

// ============================================================================
// Level Scanner
// ============================================================================

/// The scan orchestrator.
///
/// Gateway and resolver are injected; the scanner owns no market state of
/// its own beyond a pass counter.
pub struct LevelScanner {
    gateway: Arc<dyn MarketGateway>,
    resolver: LevelResolver,
    workers: usize,
    enabled: EnabledLevels,
    sequence: AtomicU64,
}

impl LevelScanner {
    /// Create a scanner with a pool of `workers` (1 to 64).
    pub fn new(
        gateway: Arc<dyn MarketGateway>,
        resolver: LevelResolver,
        workers: usize,
        enabled: EnabledLevels,
    ) -> Result<Self, ScanError> {
        if workers == 0 || workers > MAX_WORKERS {
            return Err(ValidationError::OutOfRange {
                field: "levels.workers".into(),
                value: workers as f64,
                min: 1.0,
                max: MAX_WORKERS as f64,
            }
            .into());
        }
        if enabled.is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "levels.enabled_levels".into(),
                reason: "at least one level must be enabled".into(),
            }
            .into());
        }

        Ok(Self {
            gateway,
            resolver,
            workers,
            enabled,
            sequence: AtomicU64::new(0),
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn enabled(&self) -> &EnabledLevels {
        &self.enabled
    }

    pub fn resolver(&self) -> &LevelResolver {
        &self.resolver
    }

    /// Run one pass over `universe`.
    pub async fn scan(
        &self,
        universe: &[Instrument],
        now: DateTime<Utc>,
        threshold: ProximityThreshold,
    ) -> ScanRun {
        self.scan_with_progress(universe, now, threshold, &ScanProgress::new())
            .await
    }

    /// List the universe from `provider`, then run one pass over it.
    pub async fn scan_universe(
        &self,
        provider: &dyn UniverseProvider,
        filter: &UniverseFilter,
        now: DateTime<Utc>,
        threshold: ProximityThreshold,
        progress: &ScanProgress,
    ) -> Result<ScanRun, ScanError> {
        let universe = provider.fetch_universe(filter).await?;
        Ok(self.scan_with_progress(&universe, now, threshold, progress).await)
    }

    /// Run one pass, reporting completion through `progress`.
    pub async fn scan_with_progress(
        &self,
        universe: &[Instrument],
        now: DateTime<Utc>,
        threshold: ProximityThreshold,
        progress: &ScanProgress,
    ) -> ScanRun {
        let boundaries = PeriodBoundaries::at(now);
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let id = format!("scan_{}_{}", now.format("%Y%m%d_%H%M%S"), seq);

        let mut run = ScanRun::new(
            id,
            boundaries,
            threshold,
            self.enabled.clone(),
            universe.len(),
        );
        progress.start(universe.len());

        info!(
            scan_id = %run.id,
            total = universe.len(),
            workers = self.workers,
            threshold = threshold.value(),
            "Starting level scan"
        );

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut pending = FuturesUnordered::new();

        for instrument in universe {
            let worker = Worker {
                gateway: Arc::clone(&self.gateway),
                resolver: self.resolver.clone(),
                enabled: self.enabled.clone(),
                boundaries,
                threshold,
            };
            let semaphore = Arc::clone(&semaphore);
            let task_instrument = instrument.clone();

            let handle = tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return InstrumentOutcome::failed(
                            &task_instrument.symbol,
                            "worker pool closed",
                        )
                    }
                };
                worker.run(&task_instrument).await
            });

            let symbol = instrument.symbol.clone();
            pending.push(async move { (symbol, handle.await) });
        }

        while let Some((symbol, joined)) = pending.next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => {
                    warn!(scan_id = %run.id, %symbol, "Worker panicked");
                    InstrumentOutcome::failed(&symbol, format!("worker panicked: {}", panic_message(e)))
                }
                Err(e) => InstrumentOutcome::failed(&symbol, format!("worker cancelled: {}", e)),
            };

            run.merge(outcome);
            let completed = progress.complete_one();
            debug!(scan_id = %run.id, %symbol, completed, total = run.total, "Instrument done");
        }

        run.completed_at = Utc::now();
        info!(
            scan_id = %run.id,
            completed = run.completed,
            total = run.total,
            matches = run.matches.len(),
            failures = run.failures.len(),
            "{}",
            run.summary()
        );
        run
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string()),
        Err(e) => e.to_string(),
    }
}

/// Per-task state; everything cloned out of the scanner so the task is `'static`.
struct Worker {
    gateway: Arc<dyn MarketGateway>,
    resolver: LevelResolver,
    enabled: EnabledLevels,
    boundaries: PeriodBoundaries,
    threshold: ProximityThreshold,
}

impl Worker {
    async fn run(&self, instrument: &Instrument) -> InstrumentOutcome {
        let quote = match self.gateway.fetch_current_price(instrument).await {
            Ok(quote) if quote.price.is_finite() && quote.price > 0.0 => quote,
            Ok(quote) => {
                warn!(symbol = %instrument, price = quote.price, "Unusable price");
                return InstrumentOutcome::failed(
                    &instrument.symbol,
                    GatewayError::Malformed(format!("unusable price {}", quote.price)).to_string(),
                );
            }
            // An empty ticker is "no data"; everything else is a failure.
            Err(e @ GatewayError::DataNotAvailable(_)) => {
                debug!(symbol = %instrument, error = %e, "No price data, skipping");
                return InstrumentOutcome::empty(&instrument.symbol, OutcomeStatus::NoData);
            }
            Err(e) => {
                warn!(symbol = %instrument, error = %e, transient = e.is_transient(), "Price fetch failed");
                return InstrumentOutcome::failed(&instrument.symbol, e.to_string());
            }
        };

        let levels = self.resolver.resolve(instrument, &self.boundaries).await;
        let evaluation = evaluate(
            &instrument.symbol,
            quote.price,
            &levels,
            self.threshold,
            &self.enabled,
        );

        let status = if evaluation.distances.is_empty() {
            OutcomeStatus::NoData
        } else {
            OutcomeStatus::Evaluated
        };

        InstrumentOutcome {
            symbol: instrument.symbol.clone(),
            price: Some(quote.price),
            levels,
            distances: evaluation.distances,
            matches: evaluation.matches,
            status,
        }
    }
}
