//! Market data gateway abstraction.
//!
//! Defines the `MarketGateway` and `UniverseProvider` traits that every
//! data source implements, so the scanner can run against Bitget in
//! production and against in-memory fakes in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::{Bar, Instrument, PriceQuote, Timeframe};

// ============================================================================
// Gateway Error
// ============================================================================

/// Errors returned by market data gateways.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Network error (connection failed, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// Rate limit exceeded
    #[error("Rate limited{}", retry_suffix(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    /// Provider is temporarily unavailable
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// Data not available for the requested instrument/timeframe
    #[error("Data not available: {0}")]
    DataNotAvailable(String),

    /// Response did not have the expected shape
    #[error("Malformed data: {0}")]
    Malformed(String),

    /// Invalid request parameters (unknown symbol, bad window)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal provider error
    #[error("Internal error: {0}")]
    Internal(String),
}

fn retry_suffix(retry_after_secs: &Option<u64>) -> String {
    retry_after_secs
        .map(|secs| format!(", retry after {secs} seconds"))
        .unwrap_or_default()
}

impl GatewayError {
    /// Transient errors are worth retrying on the next pass.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimited { .. } | Self::Unavailable(_)
        )
    }

    /// Errors meaning "nothing to show" rather than "something broke".
    pub fn is_data_unavailable(&self) -> bool {
        matches!(self, Self::DataNotAvailable(_) | Self::Malformed(_))
    }
}

// ============================================================================
// Gateway Traits
// ============================================================================

/// Source of prices and historical bars.
///
/// Both calls may be slow and may fail independently per call.
#[async_trait]
pub trait MarketGateway: Send + Sync {
    /// Get the gateway name (e.g., "bitget")
    fn name(&self) -> &'static str;

    /// Fetch the current tradable price.
    async fn fetch_current_price(&self, instrument: &Instrument) -> Result<PriceQuote, GatewayError>;

    /// Fetch up to `limit` bars opening at or after `window_start`,
    /// ordered by timestamp ascending.
    async fn fetch_bars(
        &self,
        instrument: &Instrument,
        timeframe: Timeframe,
        window_start: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Bar>, GatewayError>;
}

/// Market-type filter applied when listing the universe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniverseFilter {
    /// Quote currency, e.g. "USDT"
    pub quote: String,
    /// Contract type, e.g. "perpetual"
    pub contract_type: String,
    /// When non-empty, only these symbols are kept
    pub symbols: Vec<String>,
}

impl Default for UniverseFilter {
    fn default() -> Self {
        Self {
            quote: "USDT".to_string(),
            contract_type: "perpetual".to_string(),
            symbols: Vec::new(),
        }
    }
}

impl UniverseFilter {
    /// Build from the shared configuration section.
    pub fn from_config(config: &zero_common::UniverseConfig) -> Self {
        Self {
            quote: config.quote.clone(),
            contract_type: config.contract_type.clone(),
            symbols: config.symbols.clone(),
        }
    }

    /// Apply the explicit symbol allow-list, if any.
    pub fn retain_listed(&self, instruments: &mut Vec<Instrument>) {
        if self.symbols.is_empty() {
            return;
        }
        instruments.retain(|i| self.symbols.iter().any(|s| s.eq_ignore_ascii_case(&i.symbol)));
    }
}

/// Source of the tradable instrument universe.
#[async_trait]
pub trait UniverseProvider: Send + Sync {
    /// List instruments matching the filter; a snapshot for one pass.
    async fn fetch_universe(&self, filter: &UniverseFilter) -> Result<Vec<Instrument>, GatewayError>;
}
