//! Bitget REST gateway against a mock HTTP server.

use chrono::{Duration, Utc};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use zero_common::config::Config;
use zero_levels::data::{
    BitgetGateway, GatewayError, Instrument, MarketGateway, Timeframe, UniverseFilter,
    UniverseProvider,
};
use zero_levels::scanner::{LevelName, PeriodBoundaries, ScanProgress};
use zero_levels::LevelsService;

const CONTRACTS: &str = "/api/v2/mix/market/contracts";
const TICKER: &str = "/api/v2/mix/market/ticker";
const CANDLES: &str = "/api/v2/mix/market/candles";

fn gateway(server: &MockServer) -> BitgetGateway {
    BitgetGateway::new(
        server.uri(),
        "USDT-FUTURES",
        6000,
        std::time::Duration::from_secs(5),
    )
}

fn ok(data: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "code": "00000",
        "msg": "success",
        "requestTime": 1718193600000u64,
        "data": data
    }))
}

fn contracts() -> serde_json::Value {
    json!([
        { "symbol": "ETHUSDT", "baseCoin": "ETH", "quoteCoin": "USDT", "symbolType": "perpetual", "symbolStatus": "normal" },
        { "symbol": "BTCUSDT", "baseCoin": "BTC", "quoteCoin": "USDT", "symbolType": "perpetual", "symbolStatus": "normal" },
        { "symbol": "BTCUSDT0927", "baseCoin": "BTC", "quoteCoin": "USDT", "symbolType": "delivery", "symbolStatus": "normal" },
        { "symbol": "BTCPERP", "baseCoin": "BTC", "quoteCoin": "USDC", "symbolType": "perpetual", "symbolStatus": "normal" },
        { "symbol": "OLDUSDT", "baseCoin": "OLD", "quoteCoin": "USDT", "symbolType": "perpetual", "symbolStatus": "off" }
    ])
}

#[tokio::test]
async fn test_universe_filters_perpetual_usdt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CONTRACTS))
        .and(query_param("productType", "USDT-FUTURES"))
        .respond_with(ok(contracts()))
        .mount(&server)
        .await;

    let universe = gateway(&server)
        .fetch_universe(&UniverseFilter::default())
        .await
        .unwrap();

    let symbols: Vec<&str> = universe.iter().map(|i| i.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["BTCUSDT", "ETHUSDT"]);
    assert_eq!(universe[0].base, "BTC");
}

#[tokio::test]
async fn test_ticker_last_price() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TICKER))
        .and(query_param("symbol", "BTCUSDT"))
        .respond_with(ok(json!([{ "symbol": "BTCUSDT", "lastPr": "67012.5" }])))
        .mount(&server)
        .await;

    let quote = gateway(&server)
        .fetch_current_price(&Instrument::new("BTCUSDT"))
        .await
        .unwrap();
    assert_eq!(quote.price, 67012.5);
}

#[tokio::test]
async fn test_empty_ticker_is_data_not_available() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TICKER))
        .respond_with(ok(json!([])))
        .mount(&server)
        .await;

    let err = gateway(&server)
        .fetch_current_price(&Instrument::new("GHOSTUSDT"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::DataNotAvailable(_)));
}

#[tokio::test]
async fn test_http_errors_are_classified() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TICKER))
        .and(query_param("symbol", "HOTUSDT"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(TICKER))
        .and(query_param("symbol", "DOWNUSDT"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(TICKER))
        .and(query_param("symbol", "BADUSDT"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": "40034",
            "msg": "Parameter does not exist",
            "data": null
        })))
        .mount(&server)
        .await;

    let gw = gateway(&server);

    let err = gw.fetch_current_price(&Instrument::new("HOTUSDT")).await.unwrap_err();
    assert!(matches!(err, GatewayError::RateLimited { .. }));
    assert!(err.is_transient());

    let err = gw.fetch_current_price(&Instrument::new("DOWNUSDT")).await.unwrap_err();
    assert!(matches!(err, GatewayError::Unavailable(_)));

    let err = gw.fetch_current_price(&Instrument::new("BADUSDT")).await.unwrap_err();
    assert!(matches!(err, GatewayError::InvalidRequest(_)));
    assert!(err.to_string().contains("40034"));
}

#[tokio::test]
async fn test_garbage_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TICKER))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = gateway(&server)
        .fetch_current_price(&Instrument::new("BTCUSDT"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Malformed(_)));
}

#[tokio::test]
async fn test_candles_request_and_parse() {
    let server = MockServer::start().await;
    let start = Utc::now() - Duration::days(10);

    Mock::given(method("GET"))
        .and(path(CANDLES))
        .and(query_param("symbol", "BTCUSDT"))
        .and(query_param("granularity", "1Dutc"))
        .and(query_param("startTime", start.timestamp_millis().to_string()))
        .and(query_param("limit", "14"))
        .respond_with(ok(json!([
            [(start + Duration::days(1)).timestamp_millis().to_string(), "100", "110", "95", "108", "10", "1000"],
            [start.timestamp_millis().to_string(), "99", "101", "90", "100", "10", "1000"]
        ])))
        .mount(&server)
        .await;

    let bars = gateway(&server)
        .fetch_bars(&Instrument::new("BTCUSDT"), Timeframe::Daily, start, 14)
        .await
        .unwrap();

    assert_eq!(bars.len(), 2);
    assert!(bars[0].timestamp < bars[1].timestamp);
    assert_eq!(bars[1].high, 110.0);
}

#[tokio::test]
async fn test_future_window_is_rejected() {
    let server = MockServer::start().await;
    let err = gateway(&server)
        .fetch_bars(
            &Instrument::new("BTCUSDT"),
            Timeframe::Weekly,
            Utc::now() + Duration::days(3),
            4,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_full_pass_through_service() {
    let server = MockServer::start().await;
    let b = PeriodBoundaries::at(Utc::now());
    let week_bar = b.last_week + Duration::days(1);
    let month_bar = b.last_month + Duration::days(1);

    Mock::given(method("GET"))
        .and(path(CONTRACTS))
        .respond_with(ok(contracts()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(TICKER))
        .and(query_param("symbol", "BTCUSDT"))
        .respond_with(ok(json!([{ "symbol": "BTCUSDT", "lastPr": "110.5" }])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(TICKER))
        .and(query_param("symbol", "ETHUSDT"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CANDLES))
        .respond_with(ok(json!([
            [month_bar.timestamp_millis().to_string(), "100", "130", "80", "100", "1", "1"],
            [week_bar.timestamp_millis().to_string(), "100", "110", "90", "100", "1", "1"]
        ])))
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.levels.bitget.base_url = server.uri();
    config.levels.bitget.rate_limit_rpm = 6000;
    let service = LevelsService::new(config).unwrap();

    let progress = ScanProgress::new();
    let tables = service
        .scan_once(service.settings.threshold, 10, &progress)
        .await
        .unwrap();

    assert_eq!(tables.total, 2);
    assert_eq!(progress.snapshot().completed, 2);
    assert_eq!(tables.failures.len(), 1);
    assert_eq!(tables.failures[0].symbol, "ETHUSDT");

    let week_high = tables.bucket(LevelName::WeekHigh).unwrap();
    assert_eq!(week_high.rows.len(), 1);
    assert_eq!(week_high.rows[0].symbol, "BTCUSDT");
    assert!(tables.top.iter().all(|r| r.symbol == "BTCUSDT"));
}
