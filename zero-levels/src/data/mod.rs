//! Market data module for perpetual swap instruments.
//!
//! Provides the gateway abstraction, the TTL bar cache shared by scan
//! workers, and the Bitget REST adapter.

mod bitget;
mod cache;
mod provider;
mod rate_limiter;

pub use bitget::BitgetGateway;
pub use cache::{BarCache, CacheStats};
pub use provider::{GatewayError, MarketGateway, UniverseFilter, UniverseProvider};
pub use rate_limiter::{shared_limiter, RateLimiter, SharedRateLimiter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Core Data Types
// ============================================================================

/// A tradable contract, e.g. `BTCUSDT` perpetual.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Instrument {
    /// Exchange symbol
    pub symbol: String,
    /// Base asset (e.g. "BTC")
    #[serde(default)]
    pub base: String,
    /// Quote asset (e.g. "USDT")
    #[serde(default)]
    pub quote: String,
}

impl Instrument {
    /// Create an instrument from a bare symbol.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            base: String::new(),
            quote: String::new(),
        }
    }

    /// Create an instrument with base/quote assets.
    pub fn with_assets(
        symbol: impl Into<String>,
        base: impl Into<String>,
        quote: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            base: base.into(),
            quote: quote.into(),
        }
    }
}

impl std::fmt::Display for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.symbol)
    }
}

/// Timeframe for bar data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    /// Daily bars
    Daily,
    /// Weekly bars (open Monday 00:00 UTC)
    Weekly,
    /// Monthly bars (open on day 1, 00:00 UTC)
    Monthly,
}

impl Timeframe {
    /// Approximate bar length in days, used to size fetch windows.
    pub fn approx_days(&self) -> i64 {
        match self {
            Self::Daily => 1,
            Self::Weekly => 7,
            Self::Monthly => 31,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Daily => write!(f, "1D"),
            Self::Weekly => write!(f, "1W"),
            Self::Monthly => write!(f, "1M"),
        }
    }
}

/// A single OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar open time
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// A bar is well formed when all prices are finite and `low <= high`.
    pub fn is_well_formed(&self) -> bool {
        [self.open, self.high, self.low, self.close]
            .iter()
            .all(|v| v.is_finite())
            && self.low <= self.high
    }
}

/// The current tradable price of an instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub symbol: String,
    pub price: f64,
    /// When the quote was observed
    pub observed_at: DateTime<Utc>,
}
