//! Bitget API adapter for USDT-margined perpetual swaps.
//!
//! # API Documentation
//! <https://www.bitget.com/api-doc/contract/market/Get-All-Symbols-Contracts>
//!
//! # Endpoints
//! - `/api/v2/mix/market/contracts`: instrument universe
//! - `/api/v2/mix/market/ticker`: last traded price
//! - `/api/v2/mix/market/candles`: OHLCV bars (UTC-aligned granularities)
//!
//! # Rate Limits
//! - Public market endpoints allow 20 requests/second per IP
//! - Proactive rate limiting keeps a full-universe pass under that budget

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::provider::{GatewayError, MarketGateway, UniverseFilter, UniverseProvider};
use super::rate_limiter::{shared_limiter, SharedRateLimiter};
use super::{Bar, Instrument, PriceQuote, Timeframe};

// ============================================================================
// Constants
// ============================================================================

const CONTRACTS_ENDPOINT: &str = "/api/v2/mix/market/contracts";
const TICKER_ENDPOINT: &str = "/api/v2/mix/market/ticker";
const CANDLES_ENDPOINT: &str = "/api/v2/mix/market/candles";

/// Envelope code for a successful response
const SUCCESS_CODE: &str = "00000";

/// Largest page the candles endpoint serves
const MAX_CANDLES: usize = 1000;

/// Retry hint after HTTP 429 (seconds)
const RATE_LIMIT_RETRY_SECS: u64 = 1;

/// Convert Timeframe to the Bitget `granularity` parameter.
///
/// The plain `1D`/`1W`/`1M` granularities roll over at UTC+8; the `utc`
/// variants align with the calendar boundaries the scanner uses.
fn granularity(tf: Timeframe) -> &'static str {
    match tf {
        Timeframe::Daily => "1Dutc",
        Timeframe::Weekly => "1Wutc",
        Timeframe::Monthly => "1Mutc",
    }
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct BitgetResponse<T> {
    code: String,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContractInfo {
    symbol: String,
    #[serde(default)]
    base_coin: String,
    #[serde(default)]
    quote_coin: String,
    #[serde(default)]
    symbol_type: String,
    #[serde(default)]
    symbol_status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerInfo {
    #[serde(default)]
    symbol: String,
    last_pr: Option<String>,
}

// ============================================================================
// Bitget Gateway
// ============================================================================

/// Bitget REST gateway.
///
/// Implements both [`MarketGateway`] and [`UniverseProvider`]. Requests are
/// unauthenticated public market-data calls.
pub struct BitgetGateway {
    base_url: String,
    product_type: String,
    client: reqwest::Client,
    rate_limiter: SharedRateLimiter,
}

impl BitgetGateway {
    /// Create a gateway against the given base URL.
    pub fn new(
        base_url: impl Into<String>,
        product_type: impl Into<String>,
        rate_limit_rpm: u32,
        timeout: std::time::Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            product_type: product_type.into(),
            client,
            rate_limiter: shared_limiter("bitget", rate_limit_rpm),
        }
    }

    /// Create from config
    pub fn from_config(config: &zero_common::BitgetConfig) -> Self {
        Self::new(
            &config.base_url,
            &config.product_type,
            config.rate_limit_rpm,
            std::time::Duration::from_secs(config.timeout_secs),
        )
    }

    /// Issue a GET and unwrap the Bitget envelope.
    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, GatewayError> {
        let url = format!("{}{}", self.base_url, endpoint);

        self.rate_limiter.acquire().await;

        debug!(url = %url, ?query, "Requesting Bitget");

        let response = self
            .client
            .get(&url)
            .query(query)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Network("Request timeout".into())
                } else if e.is_connect() {
                    GatewayError::Network("Connection failed".into())
                } else {
                    GatewayError::Network(e.to_string())
                }
            })?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GatewayError::RateLimited {
                retry_after_secs: Some(RATE_LIMIT_RETRY_SECS),
            });
        }

        if status.is_server_error() {
            return Err(GatewayError::Unavailable(format!("HTTP {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let envelope: BitgetResponse<T> = serde_json::from_str(&body).map_err(|e| {
            if status.is_success() {
                GatewayError::Malformed(format!("Failed to parse response: {}", e))
            } else {
                GatewayError::Internal(format!("HTTP {}: {}", status, body))
            }
        })?;

        if envelope.code != SUCCESS_CODE {
            // 400 with an envelope is Bitget's way of rejecting parameters,
            // e.g. a delisted symbol.
            return Err(if status == reqwest::StatusCode::BAD_REQUEST {
                GatewayError::InvalidRequest(format!("{} ({})", envelope.msg, envelope.code))
            } else {
                GatewayError::Internal(format!("{} ({})", envelope.msg, envelope.code))
            });
        }

        Ok(envelope.data)
    }
}

/// Read a numeric cell that Bitget may encode as a string or a number.
fn numeric_cell(row: &[Value], idx: usize) -> Option<f64> {
    match row.get(idx)? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Parse candle rows `[ts, open, high, low, close, baseVolume, quoteVolume]`.
fn parse_candles(rows: &[Vec<Value>]) -> Result<Vec<Bar>, GatewayError> {
    let mut bars = Vec::with_capacity(rows.len());

    for row in rows {
        let ts = numeric_cell(row, 0)
            .ok_or_else(|| GatewayError::Malformed(format!("Invalid candle timestamp: {:?}", row.first())))?
            as i64;
        let timestamp = Utc
            .timestamp_millis_opt(ts)
            .single()
            .ok_or_else(|| GatewayError::Malformed(format!("Invalid timestamp: {}", ts)))?;

        let field = |idx: usize, name: &str| {
            numeric_cell(row, idx)
                .ok_or_else(|| GatewayError::Malformed(format!("Candle at {} missing {}", ts, name)))
        };

        bars.push(Bar {
            timestamp,
            open: field(1, "open")?,
            high: field(2, "high")?,
            low: field(3, "low")?,
            close: field(4, "close")?,
            volume: field(5, "volume").unwrap_or(0.0),
        });
    }

    bars.sort_by_key(|b| b.timestamp);
    Ok(bars)
}

// ============================================================================
// Trait Implementations
// ============================================================================

#[async_trait]
impl MarketGateway for BitgetGateway {
    fn name(&self) -> &'static str {
        "bitget"
    }

    async fn fetch_current_price(&self, instrument: &Instrument) -> Result<PriceQuote, GatewayError> {
        let tickers: Vec<TickerInfo> = self
            .get(
                TICKER_ENDPOINT,
                &[
                    ("symbol", instrument.symbol.clone()),
                    ("productType", self.product_type.clone()),
                ],
            )
            .await?
            .unwrap_or_default();

        let ticker = tickers
            .into_iter()
            .find(|t| t.symbol.is_empty() || t.symbol == instrument.symbol)
            .ok_or_else(|| GatewayError::DataNotAvailable(format!("No ticker for {}", instrument)))?;

        let raw = ticker
            .last_pr
            .ok_or_else(|| GatewayError::Malformed(format!("Ticker for {} has no lastPr", instrument)))?;

        let price: f64 = raw
            .parse()
            .map_err(|_| GatewayError::Malformed(format!("Unparsable lastPr '{}'", raw)))?;

        if !price.is_finite() || price <= 0.0 {
            return Err(GatewayError::Malformed(format!("Non-positive price {} for {}", price, instrument)));
        }

        Ok(PriceQuote {
            symbol: instrument.symbol.clone(),
            price,
            observed_at: Utc::now(),
        })
    }

    async fn fetch_bars(
        &self,
        instrument: &Instrument,
        timeframe: Timeframe,
        window_start: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Bar>, GatewayError> {
        let limit = limit.clamp(1, MAX_CANDLES);
        let window_end = (window_start + Duration::days(timeframe.approx_days() * limit as i64)).min(Utc::now());

        if window_end <= window_start {
            return Err(GatewayError::InvalidRequest(format!(
                "Window starting {} is in the future",
                window_start
            )));
        }

        let rows: Vec<Vec<Value>> = self
            .get(
                CANDLES_ENDPOINT,
                &[
                    ("symbol", instrument.symbol.clone()),
                    ("productType", self.product_type.clone()),
                    ("granularity", granularity(timeframe).to_string()),
                    ("startTime", window_start.timestamp_millis().to_string()),
                    ("endTime", window_end.timestamp_millis().to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?
            .unwrap_or_default();

        let bars = parse_candles(&rows)?;
        debug!(symbol = %instrument, %timeframe, count = bars.len(), "Fetched bars");
        Ok(bars)
    }
}

#[async_trait]
impl UniverseProvider for BitgetGateway {
    async fn fetch_universe(&self, filter: &UniverseFilter) -> Result<Vec<Instrument>, GatewayError> {
        let contracts: Vec<ContractInfo> = self
            .get(CONTRACTS_ENDPOINT, &[("productType", self.product_type.clone())])
            .await?
            .unwrap_or_default();

        let mut instruments: Vec<Instrument> = contracts
            .into_iter()
            .filter(|c| c.quote_coin.eq_ignore_ascii_case(&filter.quote))
            .filter(|c| c.symbol_type.eq_ignore_ascii_case(&filter.contract_type))
            .filter(|c| c.symbol_status.is_empty() || c.symbol_status == "normal")
            .map(|c| Instrument::with_assets(c.symbol, c.base_coin, c.quote_coin))
            .collect();

        filter.retain_listed(&mut instruments);
        instruments.sort();

        Ok(instruments)
    }
}
