//! Scan scheduler.
//!
//! Runs a pass every refresh interval, accepts manual triggers, and
//! publishes the latest aggregated tables. A newer pass supersedes any
//! pass still in flight; the older pass runs to completion but its result
//! is discarded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Notify, RwLock};
use tracing::{debug, info, warn};

use crate::data::UniverseProvider;

use super::aggregate::{aggregate, LevelTables};
use super::config::ScanSettings;
use super::engine::{LevelScanner, ProgressSnapshot, ScanError, ScanProgress};

// ============================================================================
// Scheduler State
// ============================================================================

/// State of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    /// Waiting for the next tick or trigger
    Idle,
    /// A pass is in flight
    Running,
    /// Stopped
    Stopped,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Scheduler status information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    pub last_pass_at: Option<DateTime<Utc>>,
    pub next_pass_at: Option<DateTime<Utc>>,
    pub last_scan_id: Option<String>,
    pub last_total: Option<usize>,
    pub last_match_count: Option<usize>,
    pub last_failure_count: Option<usize>,
    /// Passes whose results were dropped because a newer pass started
    pub superseded_passes: u64,
    pub error_message: Option<String>,
}

impl Default for SchedulerStatus {
    fn default() -> Self {
        Self {
            state: SchedulerState::Idle,
            last_pass_at: None,
            next_pass_at: None,
            last_scan_id: None,
            last_total: None,
            last_match_count: None,
            last_failure_count: None,
            superseded_passes: 0,
            error_message: None,
        }
    }
}

// ============================================================================
// Scan Scheduler
// ============================================================================

/// Scheduler for repeated level scans.
pub struct ScanScheduler {
    scanner: Arc<LevelScanner>,
    universe: Arc<dyn UniverseProvider>,
    settings: ScanSettings,
    status: RwLock<SchedulerStatus>,
    progress: RwLock<ScanProgress>,
    generation: AtomicU64,
    latest: watch::Sender<Option<Arc<LevelTables>>>,
    trigger: Notify,
    shutdown: watch::Sender<bool>,
}

impl ScanScheduler {
    /// Create a new scheduler.
    pub fn new(
        scanner: Arc<LevelScanner>,
        universe: Arc<dyn UniverseProvider>,
        settings: ScanSettings,
    ) -> Self {
        let (latest, _) = watch::channel(None);
        let (shutdown, _) = watch::channel(false);

        Self {
            scanner,
            universe,
            settings,
            status: RwLock::new(SchedulerStatus::default()),
            progress: RwLock::new(ScanProgress::new()),
            generation: AtomicU64::new(0),
            latest,
            trigger: Notify::new(),
            shutdown,
        }
    }

    /// Get current scheduler status.
    pub async fn status(&self) -> SchedulerStatus {
        self.status.read().await.clone()
    }

    /// Get current state.
    pub async fn state(&self) -> SchedulerState {
        self.status.read().await.state
    }

    /// Progress of the most recently started pass.
    pub async fn progress(&self) -> ProgressSnapshot {
        self.progress.read().await.snapshot()
    }

    /// Get the latest published tables.
    pub fn latest(&self) -> Option<Arc<LevelTables>> {
        self.latest.borrow().clone()
    }

    /// Receive every newly published result.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<LevelTables>>> {
        self.latest.subscribe()
    }

    /// Request a pass now. Supersedes any pass in flight.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Stop the scheduler loop. In-flight passes finish but publish nothing.
    pub async fn stop(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.shutdown.send_replace(true);

        let mut status = self.status.write().await;
        status.state = SchedulerState::Stopped;
        status.next_pass_at = None;

        info!("Scan scheduler stopped");
    }

    /// Run one pass and publish it unless a newer pass started meanwhile.
    ///
    /// Returns `Ok(None)` for a superseded pass.
    pub async fn run_pass(&self) -> Result<Option<Arc<LevelTables>>, ScanError> {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let progress = ScanProgress::new();
        *self.progress.write().await = progress.clone();

        {
            let mut status = self.status.write().await;
            if status.state == SchedulerState::Stopped {
                return Ok(None);
            }
            status.state = SchedulerState::Running;
            status.error_message = None;
        }

        let result = self
            .scanner
            .scan_universe(
                self.universe.as_ref(),
                &self.settings.universe,
                Utc::now(),
                self.settings.threshold,
                &progress,
            )
            .await;

        if self.generation.load(Ordering::Acquire) != generation {
            debug!(generation, "Pass superseded, discarding result");
            self.status.write().await.superseded_passes += 1;
            return Ok(None);
        }

        let run = match result {
            Ok(run) => run,
            Err(e) => {
                warn!(error = %e, "Scan pass failed");
                let mut status = self.status.write().await;
                status.state = SchedulerState::Idle;
                status.error_message = Some(e.to_string());
                return Err(e);
            }
        };

        let tables = Arc::new(aggregate(&run, self.settings.top_k));
        {
            let mut status = self.status.write().await;
            status.state = SchedulerState::Idle;
            status.last_pass_at = Some(run.completed_at);
            status.last_scan_id = Some(run.id.clone());
            status.last_total = Some(run.total);
            status.last_match_count = Some(tables.match_count());
            status.last_failure_count = Some(run.failures.len());
        }
        self.latest.send_replace(Some(Arc::clone(&tables)));

        let trimmed = self.scanner.resolver().cache().clear_expired();
        if trimmed > 0 {
            debug!(trimmed, "Cleared expired bar cache entries");
        }

        Ok(Some(tables))
    }

    /// Run passes on the refresh interval and on manual triggers until
    /// [`stop`](Self::stop) is called.
    pub async fn run(self: Arc<Self>) {
        let period = self.settings.refresh_interval;
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut shutdown = self.shutdown.subscribe();

        info!(interval_secs = period.as_secs(), "Scan scheduler started");

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = self.trigger.notified() => {
                    info!("Manual scan triggered");
                    interval.reset();
                }
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }

            if let Ok(next) = chrono::Duration::from_std(period) {
                self.status.write().await.next_pass_at = Some(Utc::now() + next);
            }

            let this = Arc::clone(&self);
            tokio::spawn(async move {
                if let Ok(Some(tables)) = this.run_pass().await {
                    info!(
                        scan_id = %tables.scan_id,
                        matches = tables.match_count(),
                        failures = tables.failures.len(),
                        "Published scan result"
                    );
                }
            });
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{
        Bar, BarCache, GatewayError, Instrument, MarketGateway, PriceQuote, Timeframe, UniverseFilter,
    };
    use crate::scanner::levels::EnabledLevels;
    use crate::scanner::resolver::{LevelResolver, LevelSource};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    struct StubMarket {
        slow: AtomicBool,
    }

    #[async_trait]
    impl MarketGateway for StubMarket {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn fetch_current_price(&self, instrument: &Instrument) -> Result<PriceQuote, GatewayError> {
            if self.slow.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            Ok(PriceQuote {
                symbol: instrument.symbol.clone(),
                price: 100.0,
                observed_at: Utc::now(),
            })
        }

        async fn fetch_bars(
            &self,
            _instrument: &Instrument,
            _timeframe: Timeframe,
            window_start: DateTime<Utc>,
            _limit: usize,
        ) -> Result<Vec<Bar>, GatewayError> {
            Ok(vec![Bar {
                timestamp: window_start,
                open: 100.0,
                high: 100.1,
                low: 95.0,
                close: 99.0,
                volume: 1.0,
            }])
        }
    }

    #[async_trait]
    impl UniverseProvider for StubMarket {
        async fn fetch_universe(&self, _filter: &UniverseFilter) -> Result<Vec<Instrument>, GatewayError> {
            Ok(vec![Instrument::new("BTCUSDT"), Instrument::new("ETHUSDT")])
        }
    }

    fn scheduler(slow: bool) -> (Arc<StubMarket>, Arc<ScanScheduler>) {
        let market = Arc::new(StubMarket {
            slow: AtomicBool::new(slow),
        });
        let cache = Arc::new(BarCache::new(market.clone()));
        let resolver = LevelResolver::new(cache, LevelSource::Daily);
        let scanner = LevelScanner::new(market.clone(), resolver, 4, EnabledLevels::all()).unwrap();
        let scheduler = ScanScheduler::new(Arc::new(scanner), market.clone(), ScanSettings::default());
        (market, Arc::new(scheduler))
    }

    #[test]
    fn test_scheduler_state_display() {
        assert_eq!(SchedulerState::Idle.to_string(), "idle");
        assert_eq!(SchedulerState::Running.to_string(), "running");
        assert_eq!(SchedulerState::Stopped.to_string(), "stopped");
    }

    #[tokio::test]
    async fn test_run_pass_publishes_latest() {
        let (_, scheduler) = scheduler(false);
        let mut rx = scheduler.subscribe();

        let tables = scheduler.run_pass().await.unwrap().unwrap();
        assert_eq!(tables.total, 2);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().as_ref().unwrap().scan_id, tables.scan_id);

        let status = scheduler.status().await;
        assert_eq!(status.state, SchedulerState::Idle);
        assert_eq!(status.last_total, Some(2));
        assert_eq!(scheduler.progress().await.completed, 2);
    }

    #[tokio::test]
    async fn test_newer_pass_supersedes_in_flight_pass() {
        let (market, scheduler) = scheduler(true);

        let older = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.run_pass().await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        market.slow.store(false, Ordering::SeqCst);

        let newer = scheduler.run_pass().await.unwrap().unwrap();
        let stale = older.await.unwrap().unwrap();

        assert!(stale.is_none());
        assert_eq!(scheduler.latest().unwrap().scan_id, newer.scan_id);
        assert_eq!(scheduler.status().await.superseded_passes, 1);
    }

    #[tokio::test]
    async fn test_stop_ends_loop() {
        let (_, scheduler) = scheduler(false);
        let handle = tokio::spawn(Arc::clone(&scheduler).run());

        // The first interval tick fires immediately.
        let mut rx = scheduler.subscribe();
        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .unwrap()
            .unwrap();

        scheduler.stop().await;
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(scheduler.state().await, SchedulerState::Stopped);
        assert!(scheduler.run_pass().await.unwrap().is_none());
    }
}
