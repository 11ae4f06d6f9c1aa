//! Stooq adapter: batch CSV quotes for the overview sections (direct symbols
//! plus ETF proxies) and a single-symbol snapshot used as the last live
//! intraday fallback.
//!
//! The CSV format is `s d2 t2 o h l c v n`: symbol, date, time, open, high,
//! low, close, volume, name. Placeholder values (`N/D`, `.`) read as missing.

use std::sync::Arc;

use crate::fetch::{Fetcher, RetryPolicy};
use crate::http_client::HttpRequest;
use crate::providers::{empty_payload, has_any_payload, malformed, safe_float, SectionPayload};
use crate::throttle::RateGate;
use crate::{
    CoreError, IntradayPoint, IntradaySeries, MarketPoint, SectionId, Settings, SymbolDescriptor,
    UtcDateTime,
};

/// Snapshot rows can lag by roughly fifteen minutes.
pub const SNAPSHOT_REFRESH_INTERVAL_SECONDS: u64 = 900;

const SNAPSHOT_WARNING: &str =
    "Near real-time snapshot from fallback source (can lag by ~15 minutes).";

/// One mapped quote: (section, stooq symbol, output symbol, name, currency).
pub type StooqMapping = (
    SectionId,
    &'static str,
    &'static str,
    &'static str,
    Option<&'static str>,
);

/// Direct symbols Stooq quotes natively.
pub const PRIMARY_SYMBOLS: [StooqMapping; 11] = [
    (SectionId::Indices, "^spx", "^GSPC", "S&P 500", Some("USD")),
    (
        SectionId::Indices,
        "^dji",
        "^DJI",
        "Dow Jones Industrial Average",
        Some("USD"),
    ),
    (
        SectionId::Indices,
        "^ndq",
        "^IXIC",
        "Nasdaq Composite",
        Some("USD"),
    ),
    (
        SectionId::Indices,
        "iwm.us",
        "^RUT",
        "Russell 2000 (ETF Proxy)",
        Some("USD"),
    ),
    (SectionId::Fx, "eurusd", "EURUSD=X", "EUR/USD", Some("USD")),
    (SectionId::Fx, "usdjpy", "USDJPY=X", "USD/JPY", Some("JPY")),
    (SectionId::Fx, "gbpusd", "GBPUSD=X", "GBP/USD", Some("USD")),
    (
        SectionId::Commodities,
        "cl.f",
        "CL=F",
        "WTI Crude Oil",
        Some("USD"),
    ),
    (SectionId::Commodities, "gc.f", "GC=F", "Gold", Some("USD")),
    (SectionId::Commodities, "si.f", "SI=F", "Silver", Some("USD")),
    (SectionId::Commodities, "hg.f", "HG=F", "Copper", Some("USD")),
];

/// ETF proxies for indices and commodities, used as a distinct provider.
pub const PROXY_SYMBOLS: [StooqMapping; 8] = [
    (
        SectionId::Indices,
        "spy.us",
        "^GSPC",
        "S&P 500 (SPY Proxy)",
        Some("USD"),
    ),
    (
        SectionId::Indices,
        "dia.us",
        "^DJI",
        "Dow Jones (DIA Proxy)",
        Some("USD"),
    ),
    (
        SectionId::Indices,
        "qqq.us",
        "^IXIC",
        "Nasdaq Composite (QQQ Proxy)",
        Some("USD"),
    ),
    (
        SectionId::Indices,
        "iwm.us",
        "^RUT",
        "Russell 2000 (IWM Proxy)",
        Some("USD"),
    ),
    (
        SectionId::Commodities,
        "uso.us",
        "CL=F",
        "WTI Crude (USO Proxy)",
        Some("USD"),
    ),
    (
        SectionId::Commodities,
        "gld.us",
        "GC=F",
        "Gold (GLD Proxy)",
        Some("USD"),
    ),
    (
        SectionId::Commodities,
        "slv.us",
        "SI=F",
        "Silver (SLV Proxy)",
        Some("USD"),
    ),
    (
        SectionId::Commodities,
        "cper.us",
        "HG=F",
        "Copper (CPER Proxy)",
        Some("USD"),
    ),
];

pub struct StooqProvider {
    fetcher: Fetcher,
    gate: RateGate,
    settings: Arc<Settings>,
}

impl StooqProvider {
    pub fn new(fetcher: Fetcher, settings: Arc<Settings>) -> Self {
        Self {
            fetcher,
            gate: RateGate::per_minute(settings.stooq_rate_per_minute),
            settings,
        }
    }

    fn request(&self, symbols: &str) -> HttpRequest {
        // Stooq separates batch symbols with literal '+', which must not be
        // percent-encoded, so the query is baked into the URL.
        HttpRequest::get(format!(
            "https://stooq.com/q/l/?s={symbols}&f=sd2t2ohlcvn&e=csv"
        ))
        .with_header("Accept", "text/csv,*/*;q=0.8")
        .with_header("User-Agent", &self.settings.yahoo_user_agent)
        .with_timeout_ms(8_000)
    }

    pub async fn fetch_primary_sections(&self) -> Result<SectionPayload, CoreError> {
        self.fetch_mapped_sections(&PRIMARY_SYMBOLS, "stooq").await
    }

    pub async fn fetch_proxy_sections(&self) -> Result<SectionPayload, CoreError> {
        self.fetch_mapped_sections(&PROXY_SYMBOLS, "stooq-proxy")
            .await
    }

    async fn fetch_mapped_sections(
        &self,
        mappings: &[StooqMapping],
        source: &str,
    ) -> Result<SectionPayload, CoreError> {
        self.gate.acquire().await;

        let symbols: Vec<&str> = mappings.iter().map(|(_, s, _, _, _)| *s).collect();
        let request = self.request(&symbols.join("+"));
        let url = request.url.clone();

        let body = self
            .fetcher
            .fetch_text(request, RetryPolicy::retries(2))
            .await
            .map_err(|source| CoreError::ProviderFetch {
                provider: "stooq",
                source,
            })?;

        let payload = parse_mapped_csv(&body, mappings, source);
        if has_any_payload(&payload) {
            Ok(payload)
        } else {
            Err(malformed("stooq", &url, "Stooq returned no usable rows"))
        }
    }

    /// Single-symbol snapshot serving as the last intraday fallback.
    pub async fn fetch_intraday_snapshot(
        &self,
        descriptor: &SymbolDescriptor,
    ) -> Result<IntradaySeries, CoreError> {
        let stooq_symbol = descriptor.stooq_symbol().ok_or_else(|| {
            malformed("stooq", "https://stooq.com/q/l/", "No Stooq mapping available")
        })?;

        self.gate.acquire().await;

        let request = self.request(&stooq_symbol);
        let url = request.url.clone();
        let body = self
            .fetcher
            .fetch_text(request, RetryPolicy::retries(1))
            .await
            .map_err(|source| CoreError::ProviderFetch {
                provider: "stooq",
                source,
            })?;

        let mut series =
            parse_snapshot(&body, descriptor).map_err(|detail| malformed("stooq", &url, &detail))?;
        series.source_refresh_interval_seconds =
            Some(self.settings.stooq_intraday_refresh.as_secs());
        Ok(series)
    }
}

/// Split one CSV line into at most nine fields, rejoining any comma inside
/// the trailing name column.
fn split_row(line: &str) -> Vec<String> {
    let mut fields: Vec<String> = line.split(',').map(str::to_owned).collect();
    if fields.len() > 9 {
        let name = fields.split_off(8).join(",");
        fields.push(name);
    }
    fields
}

/// Parse a batch CSV body against the requested mappings.
pub fn parse_mapped_csv(body: &str, mappings: &[StooqMapping], source: &str) -> SectionPayload {
    let mut by_symbol = std::collections::HashMap::new();
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields = split_row(line);
        let key = fields
            .first()
            .map(|s| s.trim().to_ascii_uppercase())
            .unwrap_or_default();
        if key.is_empty() || key == "SYMBOL" {
            continue;
        }
        by_symbol.insert(key, fields);
    }

    let fetch_time = UtcDateTime::now();
    let mut payload = empty_payload();

    for (section, stooq_symbol, output_symbol, default_name, currency) in mappings {
        let Some(fields) = by_symbol.get(&stooq_symbol.to_ascii_uppercase()) else {
            continue;
        };

        let open = fields.get(3).and_then(|v| safe_float(v));
        let Some(close) = fields.get(6).and_then(|v| safe_float(v)) else {
            continue;
        };

        let (change, change_percent) = match open {
            Some(open) if open != 0.0 => {
                let change = close - open;
                (change, change / open * 100.0)
            }
            _ => (0.0, 0.0),
        };

        let label = fields
            .get(8)
            .map(|s| s.trim())
            .filter(|label| !label.is_empty() && *label != "N/D" && label != output_symbol)
            .unwrap_or(default_name);

        if let Some(points) = payload.get_mut(section) {
            points.push(MarketPoint {
                symbol: (*output_symbol).to_owned(),
                name: label.to_owned(),
                price: close,
                change: Some(change),
                change_percent: Some(change_percent),
                currency: currency.map(str::to_owned),
                source: source.to_owned(),
                as_of: Some(fetch_time),
            });
        }
    }

    payload
}

/// Parse a single-symbol CSV snapshot into a two-point stale series.
pub fn parse_snapshot(body: &str, descriptor: &SymbolDescriptor) -> Result<IntradaySeries, String> {
    let mut rows = body.lines().map(str::trim).filter(|line| !line.is_empty());
    let mut fields = split_row(rows.next().ok_or_else(|| "Empty Stooq payload".to_owned())?);
    if fields
        .first()
        .is_some_and(|f| f.trim().eq_ignore_ascii_case("SYMBOL"))
    {
        fields = split_row(rows.next().ok_or_else(|| "Empty Stooq payload".to_owned())?);
    }

    if fields.len() < 7 {
        return Err("Unexpected Stooq row format".to_owned());
    }

    let open = fields.get(3).and_then(|v| safe_float(v));
    let close = fields
        .get(6)
        .and_then(|v| safe_float(v))
        .ok_or_else(|| "No close value from Stooq".to_owned())?;
    let volume = fields.get(7).and_then(|v| safe_float(v));

    let as_of = parse_stooq_datetime(
        fields.get(1).map(String::as_str).unwrap_or(""),
        fields.get(2).map(String::as_str).unwrap_or("00:00:00"),
    )
    .unwrap_or_else(UtcDateTime::now);

    let previous = match open {
        Some(open) if open != 0.0 => open,
        _ => close,
    };
    let change = close - previous;
    let change_percent = if previous != 0.0 {
        change / previous * 100.0
    } else {
        0.0
    };

    let points = vec![
        IntradayPoint {
            time: as_of.unix() - 300,
            price: previous,
            volume,
        },
        IntradayPoint {
            time: as_of.unix(),
            price: close,
            volume,
        },
    ];

    let currency = match descriptor.kind {
        crate::InstrumentKind::Equity | crate::InstrumentKind::Crypto => Some("USD".to_owned()),
        _ => None,
    };

    Ok(IntradaySeries {
        symbol: descriptor.canonical.clone(),
        display_symbol: descriptor.display_symbol.clone(),
        instrument_type: descriptor.kind,
        source: "Stooq Snapshot".to_owned(),
        as_of,
        last_price: close,
        change,
        change_percent,
        volume,
        currency,
        stale: true,
        freshness_seconds: None,
        source_refresh_interval_seconds: Some(SNAPSHOT_REFRESH_INTERVAL_SECONDS),
        upstream_refresh_interval_seconds: None,
        warnings: vec![SNAPSHOT_WARNING.to_owned()],
        points,
    })
}

/// Stooq dates are `YYYY-MM-DD` with an optional `HH:MM:SS` time column.
fn parse_stooq_datetime(date_raw: &str, time_raw: &str) -> Option<UtcDateTime> {
    let date_raw = date_raw.trim();
    if date_raw.is_empty() {
        return None;
    }
    let time_raw = time_raw.trim();
    let time_part = if time_raw.is_empty() { "00:00:00" } else { time_raw };
    UtcDateTime::parse(&format!("{date_raw}T{time_part}Z")).ok()
}
