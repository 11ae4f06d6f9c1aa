//! Behavior-driven tests for the intraday series service
//!
//! These script the HTTP transport and walk the per-symbol cache tiers and
//! the live fallback chain: AwesomeAPI for FX, the Yahoo chart endpoint, and
//! the Stooq snapshot of last resort.

use std::sync::Arc;
use std::time::Duration;

use quotedeck_core::cache::keys;
use quotedeck_core::http_client::testing::ScriptedHttpClient;
use quotedeck_core::{
    normalize_symbol, CacheClient, HttpResponse, InstrumentKind, IntradayPoint, IntradaySeries,
    IntradayService, Settings, UpstreamEnvelope, UtcDateTime,
};

struct Harness {
    client: Arc<ScriptedHttpClient>,
    cache: CacheClient,
    service: IntradayService,
}

fn harness(settings: Settings) -> Harness {
    let settings = Arc::new(settings);
    let client = Arc::new(ScriptedHttpClient::new());
    let cache = CacheClient::new();
    let service = IntradayService::new(settings, client.clone(), cache.clone());
    Harness {
        client,
        cache,
        service,
    }
}

const AWESOMEAPI_TICK: &str = r#"{
    "EURUSD": {
        "code": "EUR",
        "codein": "USD",
        "bid": "1.0851",
        "ask": "1.0853",
        "varBid": "0.0012",
        "pctChange": "0.11",
        "timestamp": "1772483070",
        "create_date": "2026-03-02 19:24:30"
    }
}"#;

const YAHOO_CHART_BODY: &str = r#"{
    "chart": {
        "result": [
            {
                "meta": {
                    "currency": "USD",
                    "regularMarketPrice": 232.5,
                    "chartPreviousClose": 230.0,
                    "regularMarketTime": 1772380800,
                    "regularMarketVolume": 1200000
                },
                "timestamp": [1772377200, 1772377500, 1772377800],
                "indicators": {
                    "quote": [
                        {
                            "close": [231.0, null, 232.5],
                            "volume": [100.0, null, 250.0]
                        }
                    ]
                }
            }
        ],
        "error": null
    }
}"#;

const STOOQ_SNAPSHOT_CSV: &str = "\
Symbol,Date,Time,Open,High,Low,Close,Volume,Name\n\
AAPL.US,2026-03-02,21:59:59,230.00,233.10,229.40,232.50,41250000,Apple\n";

// =============================================================================
// Intraday: Live sources
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_an_fx_pair_is_requested_awesomeapi_serves_the_tick() {
    // Given: AwesomeAPI answering for EUR/USD
    let harness = harness(Settings::default());
    harness
        .client
        .respond("economia.awesomeapi.com.br", HttpResponse::ok(AWESOMEAPI_TICK));

    // When: The series is fetched
    let series = harness
        .service
        .get_intraday("EUR/USD")
        .await
        .expect("fx series");

    // Then: The tick is served with the FX refresh floor
    assert_eq!(series.symbol, "EURUSD");
    assert_eq!(series.source, "AwesomeAPI FX");
    assert_eq!(series.last_price, 1.0851);
    assert_eq!(series.change, 0.0012);
    assert_eq!(series.source_refresh_interval_seconds, Some(60));
    assert_eq!(series.upstream_refresh_interval_seconds, Some(60));
    assert!(!series.stale);
    assert!(series.warnings.is_empty());
    assert_eq!(series.points.len(), 1);
    assert_eq!(series.points[0].time, 1_772_483_070);

    // And: A repeat request inside the UI TTL stays off the network
    let requests = harness.client.request_count();
    let again = harness
        .service
        .get_intraday("eurusd")
        .await
        .expect("cached series");
    assert_eq!(harness.client.request_count(), requests);
    assert_eq!(again.last_price, series.last_price);
}

#[tokio::test(start_paused = true)]
async fn when_an_equity_is_requested_the_yahoo_chart_builds_the_series() {
    // Given: The Yahoo chart endpoint answering for AAPL
    let harness = harness(Settings::default());
    harness
        .client
        .respond("v8/finance/chart/AAPL", HttpResponse::ok(YAHOO_CHART_BODY));

    // When: The series is fetched
    let series = harness
        .service
        .get_intraday("AAPL")
        .await
        .expect("equity series");

    // Then: Chart bars become points, skipping null closes
    assert_eq!(series.source, "Yahoo Chart");
    assert_eq!(series.points.len(), 2);
    assert_eq!(series.last_price, 232.5);
    assert!((series.change - 2.5).abs() < 1e-9);
    assert_eq!(series.currency.as_deref(), Some("USD"));
    assert!(!series.stale);
    assert_eq!(series.source_refresh_interval_seconds, Some(300));
}

// =============================================================================
// Intraday: Fallback chain
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_yahoo_fails_the_stooq_snapshot_steps_in_with_warnings() {
    // Given: Yahoo unreachable, Stooq still answering
    let harness = harness(Settings::default());
    harness
        .client
        .respond("stooq.com/q/l", HttpResponse::ok(STOOQ_SNAPSHOT_CSV));

    // When: The series is fetched
    let series = harness
        .service
        .get_intraday("AAPL")
        .await
        .expect("snapshot series");

    // Then: The snapshot serves as a stale two-point series
    assert_eq!(series.source, "Stooq Snapshot");
    assert!(series.stale);
    assert_eq!(series.last_price, 232.5);
    assert_eq!(series.points.len(), 2);
    assert_eq!(series.source_refresh_interval_seconds, Some(900));

    // And: The failed hop and the snapshot lag are both reported
    assert!(series
        .warnings
        .iter()
        .any(|warning| warning.starts_with("Yahoo chart unavailable")));
    assert!(series
        .warnings
        .iter()
        .any(|warning| warning.contains("can lag by ~15 minutes")));
}

#[tokio::test(start_paused = true)]
async fn when_every_source_fails_an_unavailable_series_is_served() {
    // Given: Nothing answering and no cached snapshot
    let harness = harness(Settings::default());

    // When: The series is fetched
    let series = harness
        .service
        .get_intraday("AAPL")
        .await
        .expect("placeholder series");

    // Then: A flagged placeholder goes out instead of an error
    assert_eq!(series.source, "Unavailable");
    assert_eq!(series.last_price, 0.0);
    assert!(series.stale);
    assert!(series.points.is_empty());
    assert_eq!(series.warnings[0], "No live intraday data available.");
    assert!(series
        .warnings
        .iter()
        .any(|warning| warning.starts_with("Yahoo chart unavailable")));
    assert!(series
        .warnings
        .iter()
        .any(|warning| warning.starts_with("Stooq snapshot unavailable")));
}

#[tokio::test(start_paused = true)]
async fn when_live_fails_an_aged_upstream_snapshot_is_served_stale() {
    // Given: An upstream snapshot old enough to warrant a refresh
    let harness = harness(Settings::default());
    let descriptor = normalize_symbol("AAPL").expect("valid symbol");
    let fetched_at =
        UtcDateTime::from_unix(UtcDateTime::now().unix() - 1_000).expect("valid timestamp");

    let cached = IntradaySeries {
        symbol: descriptor.canonical.clone(),
        display_symbol: descriptor.display_symbol.clone(),
        instrument_type: InstrumentKind::Equity,
        source: "Yahoo Chart".to_owned(),
        as_of: fetched_at,
        last_price: 231.0,
        change: 1.0,
        change_percent: 0.43,
        volume: Some(100.0),
        currency: Some("USD".to_owned()),
        stale: false,
        freshness_seconds: None,
        source_refresh_interval_seconds: Some(300),
        upstream_refresh_interval_seconds: None,
        warnings: Vec::new(),
        points: vec![IntradayPoint {
            time: fetched_at.unix(),
            price: 231.0,
            volume: Some(100.0),
        }],
    };
    harness
        .cache
        .put_json(
            &keys::upstream_intraday(&descriptor.cache_key()),
            &UpstreamEnvelope {
                fetched_at,
                payload: cached,
            },
            Duration::from_secs(300),
        )
        .await;

    // When: The refresh attempt finds every live source down
    let series = harness
        .service
        .get_intraday("AAPL")
        .await
        .expect("stale series");

    // Then: The old snapshot is served, marked stale
    assert!(series.stale);
    assert_eq!(series.last_price, 231.0);
    assert!(series
        .warnings
        .contains(&"Live refresh failed; serving stale snapshot.".to_owned()));
}

// =============================================================================
// Intraday: Refresh coalescing
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_concurrent_requests_race_for_one_symbol_a_single_fetch_serves_all() {
    // Given: AwesomeAPI answering once for EUR/USD
    let harness = harness(Settings::default());
    harness
        .client
        .respond("economia.awesomeapi.com.br", HttpResponse::ok(AWESOMEAPI_TICK));

    // When: Three spellings of the pair arrive at the same time
    let (first, second, third) = tokio::join!(
        harness.service.get_intraday("EUR/USD"),
        harness.service.get_intraday("eurusd"),
        harness.service.get_intraday("EURUSD=X"),
    );

    // Then: One upstream request fed every caller
    assert_eq!(harness.client.request_count(), 1);
    for series in [
        first.expect("fx series"),
        second.expect("fx series"),
        third.expect("fx series"),
    ] {
        assert_eq!(series.symbol, "EURUSD");
        assert_eq!(series.last_price, 1.0851);
    }
}

#[tokio::test(start_paused = true)]
async fn when_an_fx_snapshot_outlives_the_fx_floor_it_is_refreshed_live() {
    // Given: A tight FX refresh floor and a snapshot older than it
    let mut settings = Settings::default();
    settings.market_fx_upstream_refresh = Duration::from_secs(3);
    let harness = harness(settings);

    let descriptor = normalize_symbol("EUR/USD").expect("valid symbol");
    let fetched_at =
        UtcDateTime::from_unix(UtcDateTime::now().unix() - 10).expect("valid timestamp");
    let cached = IntradaySeries {
        symbol: descriptor.canonical.clone(),
        display_symbol: descriptor.display_symbol.clone(),
        instrument_type: InstrumentKind::Fx,
        source: "AwesomeAPI FX".to_owned(),
        as_of: fetched_at,
        last_price: 1.0700,
        change: 0.0005,
        change_percent: 0.05,
        volume: None,
        currency: None,
        stale: false,
        freshness_seconds: None,
        source_refresh_interval_seconds: Some(60),
        upstream_refresh_interval_seconds: None,
        warnings: Vec::new(),
        points: vec![IntradayPoint {
            time: fetched_at.unix(),
            price: 1.0700,
            volume: None,
        }],
    };
    harness
        .cache
        .put_json(
            &keys::upstream_intraday(&descriptor.cache_key()),
            &UpstreamEnvelope {
                fetched_at,
                payload: cached,
            },
            Duration::from_secs(300),
        )
        .await;
    harness
        .client
        .respond("economia.awesomeapi.com.br", HttpResponse::ok(AWESOMEAPI_TICK));

    // When: The pair is requested ten seconds after the snapshot
    let series = harness
        .service
        .get_intraday("EUR/USD")
        .await
        .expect("fx series");

    // Then: The aged snapshot is bypassed for a live tick
    assert_eq!(harness.client.request_count(), 1);
    assert_eq!(series.last_price, 1.0851);
    assert!(!series.stale);
}

// =============================================================================
// Intraday: Input validation
// =============================================================================

#[tokio::test]
async fn when_the_symbol_is_invalid_the_request_fails_up_front() {
    let harness = harness(Settings::default());
    assert!(harness.service.get_intraday("$$$").await.is_err());
    assert!(harness.service.get_intraday("").await.is_err());
    assert_eq!(harness.client.request_count(), 0);
}
