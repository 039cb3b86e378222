//! Key Level Scanner Module.
//!
//! Screens a universe of perpetual contracts for instruments trading close
//! to the previous week's or month's high or low.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       Level scan pipeline                        │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  ┌─────────────┐   ┌──────────────┐   ┌──────────────────────┐   │
//! │  │  Scheduler  │──▶│ LevelScanner │──▶│ worker (per symbol)  │   │
//! │  │ tick/trigger│   │ semaphore N  │   │ price + resolve +    │   │
//! │  └─────────────┘   └──────┬───────┘   │ evaluate             │   │
//! │                           │           └──────────┬───────────┘   │
//! │                           ▼                      │               │
//! │                    ┌─────────────┐        ┌──────▼──────┐        │
//! │                    │  ScanRun    │◀───────│  BarCache   │        │
//! │                    │ (collector) │        │  (TTL)      │        │
//! │                    └──────┬──────┘        └─────────────┘        │
//! │                           ▼                                      │
//! │                    ┌─────────────┐                               │
//! │                    │ LevelTables │ buckets, top-K, diagnostics   │
//! │                    └─────────────┘                               │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use zero_levels::scanner::{aggregate, LevelScanner, ProximityThreshold};
//!
//! let run = scanner.scan(&universe, Utc::now(), ProximityThreshold::bounded(2.0)?).await;
//! let tables = aggregate(&run, 10);
//! ```

pub mod aggregate;
pub mod calendar;
pub mod config;
pub mod engine;
pub mod levels;
pub mod proximity;
pub mod report;
pub mod resolver;
pub mod scheduler;

pub use aggregate::{aggregate, DiagnosticCell, DiagnosticRow, LevelBucket, LevelTables, DEFAULT_TOP_K};
pub use calendar::{Period, PeriodBoundaries, Window};
pub use config::ScanSettings;
pub use engine::{
    InstrumentOutcome, LevelScanner, OutcomeStatus, ProgressSnapshot, ScanError, ScanFailure,
    ScanProgress, ScanRun,
};
pub use levels::{EnabledLevels, LevelName, LevelSide, ReferenceLevels};
pub use proximity::{distance_pct, evaluate, DistanceRecord, Evaluation, MatchRow, ProximityThreshold};
pub use report::{LevelReport, ReportFormat};
pub use resolver::{LevelResolver, LevelSource, PeriodExtremes};
pub use scheduler::{ScanScheduler, SchedulerState, SchedulerStatus};
