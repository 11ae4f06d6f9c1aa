//! Behavior-driven tests for the market overview service
//!
//! Each test scripts the HTTP transport, runs a full refresh through the
//! cache tiers, and checks the assembled snapshot: section coverage, fallback
//! sources, banners, warnings, and the degraded flag.

use std::sync::Arc;
use std::time::Duration;

use quotedeck_core::cache::keys;
use quotedeck_core::http_client::testing::ScriptedHttpClient;
use quotedeck_core::{
    CacheClient, HealthStatus, HttpResponse, MarketOverview, MarketPoint, MemorySnapshotStore,
    OverviewService, ProviderHealthRegistry, ProviderId, SectionId, Settings, SnapshotStore,
    StoredSectionSnapshot, UtcDateTime,
};

struct Harness {
    client: Arc<ScriptedHttpClient>,
    cache: CacheClient,
    store: Arc<MemorySnapshotStore>,
    service: OverviewService,
}

fn harness(settings: Settings) -> Harness {
    let settings = Arc::new(settings);
    let client = Arc::new(ScriptedHttpClient::new());
    let cache = CacheClient::new();
    let health = Arc::new(ProviderHealthRegistry::new(&settings));
    let store = Arc::new(MemorySnapshotStore::new());
    let service = OverviewService::new(
        settings,
        client.clone(),
        cache.clone(),
        health,
        store.clone(),
    );
    Harness {
        client,
        cache,
        store,
        service,
    }
}

const STOOQ_PRIMARY_CSV: &str = "\
Symbol,Date,Time,Open,High,Low,Close,Volume,Name\n\
^SPX,2026-03-02,21:59:59,5990.10,6015.00,5985.00,6010.50,0,S&P 500\n\
^DJI,2026-03-02,21:59:59,41800.00,41950.00,41750.00,41900.00,0,Dow Jones\n\
^NDQ,2026-03-02,21:59:59,18900.00,19010.00,18880.00,18975.00,0,Nasdaq Composite\n\
IWM.US,2026-03-02,21:59:59,205.10,206.80,204.90,206.40,31200000,iShares Russell 2000\n\
EURUSD,2026-03-02,22:04:30,1.0830,1.0860,1.0825,1.0851,N/D,EUR/USD\n\
USDJPY,2026-03-02,22:04:30,149.20,149.90,149.10,149.80,N/D,USD/JPY\n\
GBPUSD,2026-03-02,22:04:30,1.2650,1.2695,1.2640,1.2685,N/D,GBP/USD\n\
CL.F,2026-03-02,21:59:59,71.90,72.80,71.60,72.60,0,Crude Oil WTI\n\
GC.F,2026-03-02,21:59:59,2350.00,2362.00,2348.00,2358.00,0,Gold\n\
SI.F,2026-03-02,21:59:59,29.00,29.40,28.95,29.30,0,Silver\n\
HG.F,2026-03-02,21:59:59,4.00,4.07,3.99,4.05,0,Copper\n";

const COINGECKO_BODY: &str = r#"{
    "bitcoin": {"usd": 67890.0, "usd_24h_change": -1.74},
    "ethereum": {"usd": 3301.5, "usd_24h_change": 0.8},
    "solana": {"usd": 141.2, "usd_24h_change": 2.1}
}"#;

const YAHOO_QUOTE_BODY: &str = r#"{
    "quoteResponse": {
        "result": [
            {
                "symbol": "^GSPC",
                "shortName": "S&P 500",
                "regularMarketPrice": 6012.0,
                "regularMarketChange": 15.0,
                "regularMarketChangePercent": 0.25,
                "currency": "USD"
            }
        ],
        "error": null
    }
}"#;

fn script_stooq(client: &ScriptedHttpClient) {
    client.respond("stooq.com/q/l", HttpResponse::ok(STOOQ_PRIMARY_CSV));
}

fn script_fred(client: &ScriptedHttpClient) {
    client.respond(
        "id=DGS10",
        HttpResponse::ok("DATE,DGS10\n2026-02-27,4.20\n2026-03-02,4.25\n"),
    );
    client.respond(
        "id=DGS5",
        HttpResponse::ok("DATE,DGS5\n2026-02-27,3.92\n2026-03-02,3.95\n"),
    );
    client.respond(
        "id=DGS3MO",
        HttpResponse::ok("DATE,DGS3MO\n2026-02-27,4.28\n2026-03-02,4.30\n"),
    );
}

fn script_coingecko(client: &ScriptedHttpClient) {
    client.respond("coingecko.com", HttpResponse::ok(COINGECKO_BODY));
}

fn script_yahoo(client: &ScriptedHttpClient) {
    client.respond("v7/finance/quote", HttpResponse::ok(YAHOO_QUOTE_BODY));
}

fn lkg_point(symbol: &str, price: f64) -> MarketPoint {
    MarketPoint {
        symbol: symbol.to_owned(),
        name: symbol.to_owned(),
        price,
        change: Some(0.0),
        change_percent: Some(0.0),
        currency: Some("USD".to_owned()),
        source: "stooq".to_owned(),
        as_of: Some(UtcDateTime::now()),
    }
}

// =============================================================================
// Overview: Healthy refresh
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_live_providers_cover_every_section_the_snapshot_is_clean() {
    // Given: Yahoo, Stooq, FRED, and CoinGecko all answering
    let harness = harness(Settings::default());
    script_yahoo(&harness.client);
    script_stooq(&harness.client);
    script_fred(&harness.client);
    script_coingecko(&harness.client);

    // When: The overview is refreshed
    let overview = harness.service.get_overview().await;

    // Then: Nothing is degraded and every section is fully covered
    assert!(overview.banner.is_none());
    assert!(!overview.degraded);
    assert!(overview.warnings.is_empty());
    assert_eq!(overview.sections.len(), 5);
    for section in &overview.sections {
        assert_eq!(
            section.section_meta.loaded, section.section_meta.expected,
            "section {} incomplete",
            section.id
        );
        assert!(!section.section_meta.stale);
        assert!(section.section_meta.warning.is_none());
    }

    // And: Each section reports the provider that actually filled it
    let indices = &overview.sections[0];
    assert_eq!(indices.id, SectionId::Indices);
    assert_eq!(indices.section_meta.source, "Stooq");
    assert_eq!(indices.points[0].symbol, "^GSPC");
    assert_eq!(indices.points[0].price, 6010.50);

    let rates = &overview.sections[1];
    assert_eq!(rates.section_meta.source, "FRED Public");
    assert_eq!(rates.points[0].symbol, "^TNX");
    assert_eq!(rates.points[0].price, 4.25);
    assert!(rates.points[0].name.contains("(FRED Public)"));

    let crypto = &overview.sections[4];
    assert_eq!(crypto.section_meta.source, "CoinGecko");
    assert_eq!(crypto.points[0].symbol, "BTC-USD");
    assert_eq!(crypto.points[0].price, 67890.0);

    // And: Live-filled sections were persisted as last-known-good
    let saved = harness
        .store
        .load_section(SectionId::Indices)
        .await
        .expect("load")
        .expect("indices snapshot saved");
    assert_eq!(saved.source, "Stooq");
    assert_eq!(saved.points.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn when_the_snapshot_is_fresh_repeat_calls_skip_the_providers() {
    // Given: A fully successful refresh already served
    let harness = harness(Settings::default());
    script_yahoo(&harness.client);
    script_stooq(&harness.client);
    script_fred(&harness.client);
    script_coingecko(&harness.client);
    let first = harness.service.get_overview().await;
    let requests_after_first = harness.client.request_count();

    // When: A second caller arrives inside the fresh TTL
    let second = harness.service.get_overview().await;

    // Then: The cached snapshot is served without any provider traffic
    assert_eq!(harness.client.request_count(), requests_after_first);
    assert_eq!(second.as_of, first.as_of);
}

// =============================================================================
// Overview: Yahoo outage
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_yahoo_is_down_the_banner_names_the_fallback_sources() {
    // Given: Yahoo unreachable, every fallback provider healthy
    let harness = harness(Settings::default());
    script_stooq(&harness.client);
    script_fred(&harness.client);
    script_coingecko(&harness.client);

    // When: The overview is refreshed
    let overview = harness.service.get_overview().await;

    // Then: Full coverage, but a banner advertising the fallback sources
    assert_eq!(
        overview.banner.as_deref(),
        Some("Yahoo down, serving from Stooq/FRED Public/CoinGecko.")
    );
    assert!(overview.degraded);
    assert!(overview.warnings.is_empty());
    for section in &overview.sections {
        assert_eq!(section.section_meta.loaded, section.section_meta.expected);
    }

    // And: The status surface reflects the outage
    let report = harness.service.provider_status();
    assert_eq!(report.status, "degraded");
    let yahoo = report
        .providers
        .iter()
        .find(|state| state.provider == ProviderId::Yahoo)
        .expect("yahoo state present");
    assert!(matches!(
        yahoo.status,
        HealthStatus::Degraded | HealthStatus::Cooldown
    ));
}

// =============================================================================
// Overview: Total outage
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_every_live_provider_fails_bootstrap_covers_the_board() {
    // Given: No provider answering at all
    let harness = harness(Settings::default());

    // When: The overview is refreshed
    let overview = harness.service.get_overview().await;

    // Then: Every section is filled from static data and marked stale
    for section in &overview.sections {
        assert_eq!(section.section_meta.loaded, section.section_meta.expected);
        assert!(section.section_meta.stale, "section {} not stale", section.id);
        assert!(section.section_meta.warning.is_none());
    }

    let indices = &overview.sections[0];
    assert_eq!(indices.section_meta.source, "Bootstrap Snapshot");
    assert_eq!(indices.points[0].source, "bootstrap");

    let rates = &overview.sections[1];
    assert_eq!(rates.section_meta.source, "Default Snapshot");
    assert_eq!(rates.points[0].source, "rates-default");

    // And: The banner only names sources worth advertising
    assert_eq!(
        overview.banner.as_deref(),
        Some("Yahoo down, serving from Default Snapshot.")
    );
    assert!(overview.degraded);

    // And: Nothing was persisted, since no live provider contributed
    assert!(harness
        .store
        .load_section(SectionId::Indices)
        .await
        .expect("load")
        .is_none());
}

// =============================================================================
// Overview: Last-known-good fallback
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_live_fails_a_saved_snapshot_serves_with_rewritten_sources() {
    // Given: No live providers, no static fallbacks, one saved indices snapshot
    let mut settings = Settings::default();
    settings.bootstrap_enabled = false;
    settings.rates_defaults_enabled = false;
    let harness = harness(settings);

    let snapshot = StoredSectionSnapshot {
        saved_at: UtcDateTime::now(),
        source: "Stooq".to_owned(),
        points: vec![
            lkg_point("^GSPC", 6_010.5),
            lkg_point("^DJI", 41_900.0),
            lkg_point("^IXIC", 18_975.0),
            lkg_point("^RUT", 2_065.0),
        ],
    };
    harness
        .store
        .save_section(SectionId::Indices, &snapshot)
        .await
        .expect("seed snapshot");

    // When: The overview is refreshed
    let overview = harness.service.get_overview().await;

    // Then: Indices serve from the saved snapshot with rewritten point sources
    let indices = &overview.sections[0];
    assert_eq!(indices.section_meta.loaded, 4);
    assert!(indices.section_meta.stale);
    assert_eq!(indices.section_meta.source, "Last Known Good");
    assert_eq!(indices.points[0].source, "lkg:stooq");

    // And: The uncovered sections each carry a warning
    assert_eq!(overview.warnings.len(), 4);
    assert!(overview
        .warnings
        .contains(&"No rates data available from live providers or cache.".to_owned()));
    assert!(overview
        .warnings
        .contains(&"No fx data available from live providers or cache.".to_owned()));

    // And: With only hidden sources contributing, the banner stays generic
    assert_eq!(
        overview.banner.as_deref(),
        Some("Yahoo down, serving from fallback providers.")
    );
    assert!(overview.degraded);
}

#[tokio::test(start_paused = true)]
async fn when_a_section_merges_cached_points_the_saved_snapshot_is_left_alone() {
    // Given: Stooq covering a single index, the rest seeded as last-known-good
    let mut settings = Settings::default();
    settings.bootstrap_enabled = false;
    settings.rates_defaults_enabled = false;
    let harness = harness(settings);

    let seeded_at = UtcDateTime::from_unix(UtcDateTime::now().unix() - 120).expect("valid timestamp");
    let snapshot = StoredSectionSnapshot {
        saved_at: seeded_at,
        source: "Stooq".to_owned(),
        points: vec![
            lkg_point("^GSPC", 5_900.0),
            lkg_point("^DJI", 41_900.0),
            lkg_point("^IXIC", 18_975.0),
            lkg_point("^RUT", 2_065.0),
        ],
    };
    harness
        .store
        .save_section(SectionId::Indices, &snapshot)
        .await
        .expect("seed snapshot");
    harness.client.respond(
        "stooq.com/q/l",
        HttpResponse::ok(
            "Symbol,Date,Time,Open,High,Low,Close,Volume,Name\n\
             ^SPX,2026-03-02,21:59:59,5990.10,6015.00,5985.00,6010.50,0,S&P 500\n",
        ),
    );

    // When: The overview is refreshed
    let overview = harness.service.get_overview().await;

    // Then: The live point and the cached remainder are merged, marked stale
    let indices = &overview.sections[0];
    assert_eq!(indices.section_meta.loaded, 4);
    assert!(indices.section_meta.stale);
    assert_eq!(indices.points[0].price, 6010.50);
    assert_eq!(indices.points[1].source, "lkg:stooq");

    // And: The merged section did not overwrite the saved snapshot
    let saved = harness
        .store
        .load_section(SectionId::Indices)
        .await
        .expect("load")
        .expect("snapshot still present");
    assert_eq!(saved.saved_at, seeded_at);
    assert_eq!(saved.points[0].price, 5_900.0);
    assert!(saved
        .points
        .iter()
        .all(|point| !point.source.starts_with("lkg:")));
}

#[tokio::test(start_paused = true)]
async fn when_the_saved_snapshot_is_too_old_it_is_ignored() {
    // Given: A saved indices snapshot well past the last-known-good TTL
    let mut settings = Settings::default();
    settings.bootstrap_enabled = false;
    settings.rates_defaults_enabled = false;
    settings.market_lkg_ttl = Duration::from_secs(60);
    let harness = harness(settings);

    let aged = UtcDateTime::from_unix(UtcDateTime::now().unix() - 1_000).expect("valid timestamp");
    let snapshot = StoredSectionSnapshot {
        saved_at: aged,
        source: "Stooq".to_owned(),
        points: vec![lkg_point("^GSPC", 6_010.5)],
    };
    harness
        .store
        .save_section(SectionId::Indices, &snapshot)
        .await
        .expect("seed snapshot");

    // When: The overview is refreshed with every live provider down
    let overview = harness.service.get_overview().await;

    // Then: The expired snapshot contributes nothing
    let indices = &overview.sections[0];
    assert_eq!(indices.section_meta.loaded, 0);
    assert_eq!(
        indices.section_meta.warning.as_deref(),
        Some("No indices data available from live providers or cache.")
    );
    assert!(overview.degraded);
}

// =============================================================================
// Overview: Stale tier of last resort
// =============================================================================

#[tokio::test(start_paused = true)]
async fn when_nothing_loads_the_stale_tier_is_served_with_a_banner() {
    // Given: No providers, no static fallbacks, but a previous snapshot in
    // the stale tier
    let mut settings = Settings::default();
    settings.bootstrap_enabled = false;
    settings.rates_defaults_enabled = false;
    let harness = harness(settings);

    let seeded = MarketOverview {
        sections: Vec::new(),
        banner: None,
        as_of: UtcDateTime::from_unix(1_772_400_000).expect("valid timestamp"),
        degraded: false,
        warnings: Vec::new(),
    };
    harness
        .cache
        .put_json(&keys::overview_stale(), &seeded, Duration::from_secs(300))
        .await;

    // When: A refresh comes up completely empty
    let overview = harness.service.get_overview().await;

    // Then: The stale snapshot is served, flagged as a degraded fallback
    assert_eq!(
        overview.banner.as_deref(),
        Some("All live providers unavailable, serving stale snapshot.")
    );
    assert!(overview.degraded);
    assert_eq!(overview.as_of, seeded.as_of);
}

// =============================================================================
// Overview: Status surface
// =============================================================================

#[test]
fn provider_status_reports_chains_and_disabled_providers() {
    let harness = harness(Settings::default());
    let report = harness.service.provider_status();

    assert_eq!(report.status, "ok");
    assert_eq!(report.matrix.len(), 5);
    assert_eq!(report.matrix[0].section, SectionId::Indices);
    assert_eq!(
        report.matrix[0].providers,
        vec![
            "Stooq",
            "Stooq Proxy",
            "Yahoo",
            "Last Known Good",
            "Bootstrap Snapshot"
        ]
    );

    // FRED API has no key configured, so it is reported disabled.
    let fred_api = report
        .providers
        .iter()
        .find(|state| state.provider == ProviderId::FredApi)
        .expect("fred_api state present");
    assert_eq!(fred_api.status, HealthStatus::Disabled);
}
