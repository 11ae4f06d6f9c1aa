//! Treasury-yield adapters backed by FRED.
//!
//! The public `fredgraph.csv` endpoint needs no key and serves one series per
//! request; the JSON observations API is keyed and only used when a key is
//! configured. Both report yields in percent, and the daily series pads
//! holidays with `.` placeholders that read as missing.

use std::sync::Arc;

use serde::Deserialize;

use crate::fetch::{Fetcher, RetryPolicy};
use crate::http_client::HttpRequest;
use crate::providers::{empty_payload, has_any_payload, malformed, safe_float, SectionPayload};
use crate::throttle::RateGate;
use crate::{CoreError, MarketPoint, SectionId, Settings, UtcDateTime};

const FRED_GRAPH_URL: &str = "https://fred.stlouisfed.org/graph/fredgraph.csv";
const FRED_API_URL: &str = "https://api.stlouisfed.org/fred/series/observations";

/// FRED series feeding the rates section: (series id, output symbol, name).
pub const RATE_SERIES: [(&str, &str, &str); 3] = [
    ("DGS10", "^TNX", "US 10Y Treasury Yield"),
    ("DGS5", "^FVX", "US 5Y Treasury Yield"),
    ("DGS3MO", "^IRX", "US 13W Treasury Yield"),
];

pub struct FredProvider {
    fetcher: Fetcher,
    gate: RateGate,
    settings: Arc<Settings>,
}

impl FredProvider {
    pub fn new(fetcher: Fetcher, settings: Arc<Settings>) -> Self {
        Self {
            fetcher,
            gate: RateGate::per_minute(settings.fred_rate_per_minute),
            settings,
        }
    }

    /// Unkeyed CSV endpoint, one request per series.
    pub async fn fetch_public_rates(&self) -> Result<SectionPayload, CoreError> {
        let mut points = Vec::new();
        let mut last_error: Option<CoreError> = None;

        for (series_id, symbol, name) in RATE_SERIES {
            self.gate.acquire().await;
            let request = HttpRequest::get(FRED_GRAPH_URL)
                .with_query("id", series_id)
                .with_timeout_ms(8_000);
            let body = match self
                .fetcher
                .fetch_text(request, RetryPolicy::retries(1))
                .await
            {
                Ok(body) => body,
                Err(source) => {
                    last_error = Some(CoreError::ProviderFetch {
                        provider: "fred_public",
                        source,
                    });
                    continue;
                }
            };
            if let Some(point) = parse_fredgraph_csv(&body, symbol, name) {
                points.push(point);
            }
        }

        finish_rates_payload(points, last_error, "fred_public", FRED_GRAPH_URL)
    }

    /// Keyed JSON observations endpoint. Callers must not route here when no
    /// key is configured; the health registry keeps the provider disabled.
    pub async fn fetch_api_rates(&self) -> Result<SectionPayload, CoreError> {
        let Some(api_key) = self.settings.fred_api_key.as_deref() else {
            return Err(malformed("fred_api", FRED_API_URL, "No API key configured"));
        };

        let mut points = Vec::new();
        let mut last_error: Option<CoreError> = None;

        for (series_id, symbol, name) in RATE_SERIES {
            self.gate.acquire().await;
            let request = HttpRequest::get(FRED_API_URL)
                .with_query("series_id", series_id)
                .with_query("api_key", api_key)
                .with_query("file_type", "json")
                .with_query("sort_order", "desc")
                .with_query("limit", "3")
                .with_timeout_ms(8_000);
            let response: ObservationsResponse = match self
                .fetcher
                .fetch_json(request, RetryPolicy::retries(1))
                .await
            {
                Ok(response) => response,
                Err(source) => {
                    last_error = Some(CoreError::ProviderFetch {
                        provider: "fred_api",
                        source,
                    });
                    continue;
                }
            };
            if let Some(point) = observations_to_point(&response, symbol, name) {
                points.push(point);
            }
        }

        finish_rates_payload(points, last_error, "fred_api", FRED_API_URL)
    }
}

fn finish_rates_payload(
    points: Vec<MarketPoint>,
    last_error: Option<CoreError>,
    provider: &'static str,
    url: &str,
) -> Result<SectionPayload, CoreError> {
    if points.is_empty() {
        return Err(last_error.unwrap_or_else(|| malformed(provider, url, "No usable yield rows")));
    }
    let mut payload = empty_payload();
    payload.insert(SectionId::Rates, points);
    debug_assert!(has_any_payload(&payload));
    Ok(payload)
}

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    #[serde(default)]
    observations: Vec<Observation>,
}

#[derive(Debug, Deserialize)]
struct Observation {
    #[serde(default)]
    date: String,
    #[serde(default)]
    value: String,
}

/// Latest vs. previous numeric observation, newest first.
fn observations_to_point(
    response: &ObservationsResponse,
    symbol: &str,
    name: &str,
) -> Option<MarketPoint> {
    let mut numeric = response
        .observations
        .iter()
        .filter_map(|obs| safe_float(&obs.value).map(|value| (obs.date.as_str(), value)));

    let (latest_date, latest) = numeric.next()?;
    let previous = numeric.next().map(|(_, value)| value);

    Some(rate_point(
        symbol,
        &format!("{name} (FRED API)"),
        "fred-api",
        latest,
        previous,
        latest_date,
    ))
}

/// Parse a `fredgraph.csv` body: a DATE column plus one column named after
/// the series, with the last two numeric rows giving latest and previous.
pub fn parse_fredgraph_csv(body: &str, symbol: &str, name: &str) -> Option<MarketPoint> {
    let mut numeric: Vec<(String, f64)> = Vec::new();
    for line in body.lines().skip(1) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.splitn(2, ',');
        let date = parts.next().unwrap_or("").trim();
        let value = parts.next().unwrap_or("").trim();
        if let Some(value) = safe_float(value) {
            numeric.push((date.to_owned(), value));
        }
    }

    let (latest_date, latest) = numeric.last()?.clone();
    let previous = numeric
        .len()
        .checked_sub(2)
        .and_then(|i| numeric.get(i))
        .map(|(_, value)| *value);

    Some(rate_point(
        symbol,
        &format!("{name} (FRED Public)"),
        "fred-public",
        latest,
        previous,
        &latest_date,
    ))
}

fn rate_point(
    symbol: &str,
    name: &str,
    source: &str,
    latest: f64,
    previous: Option<f64>,
    latest_date: &str,
) -> MarketPoint {
    let (change, change_percent) = match previous {
        Some(previous) if previous != 0.0 => {
            let change = latest - previous;
            (change, change / previous * 100.0)
        }
        _ => (0.0, 0.0),
    };
    let as_of = UtcDateTime::parse(&format!("{latest_date}T00:00:00Z"))
        .unwrap_or_else(|_| UtcDateTime::now());
    MarketPoint {
        symbol: symbol.to_owned(),
        name: name.to_owned(),
        price: latest,
        change: Some(change),
        change_percent: Some(change_percent),
        currency: Some("PCT".to_owned()),
        source: source.to_owned(),
        as_of: Some(as_of),
    }
}
