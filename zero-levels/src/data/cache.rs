//! Bar cache for market data.
//!
//! Time-bounded cache keyed by (instrument, timeframe, window start) that
//! sits in front of a [`MarketGateway`] and is shared by all scan workers.
//! Failed fetches degrade to an empty series and are never stored.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

use super::provider::MarketGateway;
use super::{Bar, Instrument, Timeframe};

/// Cache entry with TTL
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    data: T,
    expires_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    fn new(data: T, ttl: Duration) -> Self {
        Self {
            data,
            expires_at: Utc::now()
                .checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    symbol: String,
    timeframe: Timeframe,
    window_start: DateTime<Utc>,
}

/// Shared bar cache.
///
/// The whole map sits behind one reader/writer lock and entries are
/// replaced wholesale, so a reader never sees a partially written series.
/// Concurrent misses on the same key may both reach the gateway; the last
/// write wins.
pub struct BarCache {
    gateway: Arc<dyn MarketGateway>,
    entries: RwLock<EntryMap>,
    ttl: Duration,
}

type EntryMap = HashMap<CacheKey, CacheEntry<Arc<Vec<Bar>>>>;

impl BarCache {
    /// Default time-to-live (15 minutes)
    pub const DEFAULT_TTL_SECS: u64 = 900;

    /// Create a cache with the default TTL.
    pub fn new(gateway: Arc<dyn MarketGateway>) -> Self {
        Self::with_ttl(gateway, std::time::Duration::from_secs(Self::DEFAULT_TTL_SECS))
    }

    /// Create with custom TTL
    pub fn with_ttl(gateway: Arc<dyn MarketGateway>, ttl: std::time::Duration) -> Self {
        Self {
            gateway,
            entries: RwLock::new(HashMap::new()),
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::seconds(Self::DEFAULT_TTL_SECS as i64)),
        }
    }

    /// Get the bar series for a key, fetching through the gateway on a miss.
    ///
    /// An empty series means "no data"; gateway errors are logged and
    /// swallowed here.
    pub async fn get(
        &self,
        instrument: &Instrument,
        timeframe: Timeframe,
        window_start: DateTime<Utc>,
        limit: usize,
    ) -> Arc<Vec<Bar>> {
        let key = CacheKey {
            symbol: instrument.symbol.clone(),
            timeframe,
            window_start,
        };

        if let Some(bars) = self.lookup(&key) {
            debug!(symbol = %instrument.symbol, %timeframe, "Bar cache hit");
            return bars;
        }

        match self
            .gateway
            .fetch_bars(instrument, timeframe, window_start, limit)
            .await
        {
            Ok(mut bars) => {
                bars.sort_by_key(|b| b.timestamp);
                let bars = Arc::new(bars);
                self.store(key, Arc::clone(&bars));
                bars
            }
            Err(e) if e.is_data_unavailable() => {
                debug!(symbol = %instrument.symbol, %timeframe, error = %e, "No usable bars");
                Arc::new(Vec::new())
            }
            Err(e) => {
                warn!(
                    symbol = %instrument.symbol,
                    %timeframe,
                    gateway = self.gateway.name(),
                    error = %e,
                    "Bar fetch failed, treating as no data"
                );
                Arc::new(Vec::new())
            }
        }
    }

    // Entries are inserted and removed whole, so a poisoned map is still consistent.
    fn read_entries(&self) -> RwLockReadGuard<'_, EntryMap> {
        self.entries.read().unwrap_or_else(|poisoned| {
            warn!("Bar cache lock poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, EntryMap> {
        self.entries.write().unwrap_or_else(|poisoned| {
            warn!("Bar cache lock poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }

    fn lookup(&self, key: &CacheKey) -> Option<Arc<Vec<Bar>>> {
        self.read_entries()
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| Arc::clone(&entry.data))
    }

    fn store(&self, key: CacheKey, bars: Arc<Vec<Bar>>) {
        let entry = CacheEntry::new(bars, self.ttl);
        self.write_entries().insert(key, entry);
    }

    /// Invalidate all cached series for a symbol
    pub fn invalidate(&self, symbol: &str) {
        self.write_entries().retain(|k, _| k.symbol != symbol);
    }

    /// Clear all expired entries, returning how many were removed.
    pub fn clear_expired(&self) -> usize {
        let mut entries = self.write_entries();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        before - entries.len()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let (total, expired) = {
            let entries = self.read_entries();
            (entries.len(), entries.values().filter(|v| v.is_expired()).count())
        };

        CacheStats {
            total_entries: total,
            expired_entries: expired,
            active_entries: total - expired,
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub active_entries: usize,
}

// ============================================================================
// Tests
// ============================================================================
