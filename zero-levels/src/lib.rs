//! Zero Levels Library
//!
//! Screens USDT perpetual contracts for prices sitting close to the previous
//! calendar week's or month's high or low.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                       zero-levels                                   │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────┐      │
//! │  │  Market Data    │  │  Level Scanner  │  │  Scheduler /    │      │
//! │  │  Gateway+Cache  │─▶│  (worker pool)  │─▶│  Report         │      │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────┘      │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Concepts
//!
//! - **Reference levels**: high/low of the last completed week (Monday
//!   00:00 UTC) and month (day 1, 00:00 UTC); the open period never counts.
//! - **Distance**: `(price - level) / level * 100`, sign kept.
//! - **Match**: a distance whose absolute value is within the threshold.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod data;
pub mod scanner;

use std::sync::Arc;
use chrono::Utc;
use tracing::info;
use zero_common::config::Config;

use crate::data::{BarCache, BitgetGateway, MarketGateway, UniverseProvider};
use crate::scanner::{
    aggregate, LevelResolver, LevelScanner, LevelTables, ProximityThreshold, ScanError,
    ScanProgress, ScanScheduler, ScanSettings,
};

pub use crate::scanner::ScanRun;

/// Wired-up scanner: gateway, cache, resolver, orchestrator.
pub struct LevelsService {
    /// Configuration
    pub config: Config,
    /// Validated scanner settings
    pub settings: ScanSettings,
    /// Shared bar cache
    pub cache: Arc<BarCache>,
    /// Scan orchestrator
    pub scanner: Arc<LevelScanner>,
    universe: Arc<dyn UniverseProvider>,
}

impl LevelsService {
    /// Build a service backed by the Bitget gateway.
    pub fn new(config: Config) -> Result<Self, ScanError> {
        let bitget = Arc::new(BitgetGateway::from_config(&config.levels.bitget));
        let gateway: Arc<dyn MarketGateway> = bitget.clone();
        Self::with_gateway(config, gateway, bitget)
    }

    /// Build a service around injected collaborators.
    pub fn with_gateway(
        config: Config,
        gateway: Arc<dyn MarketGateway>,
        universe: Arc<dyn UniverseProvider>,
    ) -> Result<Self, ScanError> {
        let settings = ScanSettings::from_config(&config.levels)?;
        let cache = Arc::new(BarCache::with_ttl(Arc::clone(&gateway), settings.cache_ttl));
        let resolver = LevelResolver::new(Arc::clone(&cache), settings.level_source);
        let scanner = LevelScanner::new(gateway, resolver, settings.workers, settings.enabled.clone())?;

        info!(
            workers = settings.workers,
            threshold = settings.threshold.value(),
            cache_ttl_secs = settings.cache_ttl.as_secs(),
            level_source = %settings.level_source,
            "Level scanner ready"
        );

        Ok(Self {
            config,
            settings,
            cache,
            scanner: Arc::new(scanner),
            universe,
        })
    }

    /// Run a single pass and aggregate it.
    pub async fn scan_once(
        &self,
        threshold: ProximityThreshold,
        top_k: usize,
        progress: &ScanProgress,
    ) -> Result<LevelTables, ScanError> {
        let run = self
            .scanner
            .scan_universe(
                self.universe.as_ref(),
                &self.settings.universe,
                Utc::now(),
                threshold,
                progress,
            )
            .await?;
        Ok(aggregate(&run, top_k))
    }

    /// Create a scheduler sharing this service's scanner and cache.
    pub fn scheduler(&self) -> Arc<ScanScheduler> {
        Arc::new(ScanScheduler::new(
            Arc::clone(&self.scanner),
            Arc::clone(&self.universe),
            self.settings.clone(),
        ))
    }
}
