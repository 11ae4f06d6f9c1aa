//! Yahoo Finance adapter: batch v7 quotes for the overview sections and the
//! v8 chart endpoint for intraday series.

use std::sync::Arc;

use serde::Deserialize;

use crate::fetch::{Fetcher, RetryPolicy};
use crate::http_client::HttpRequest;
use crate::providers::{empty_payload, has_any_payload, malformed, SectionPayload};
use crate::sections::yahoo_symbols;
use crate::throttle::RateGate;
use crate::{
    CoreError, FetchError, IntradayPoint, IntradaySeries, MarketPoint, Settings,
    SymbolDescriptor, UtcDateTime,
};

const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Chart bars arrive at five-minute granularity.
pub const CHART_REFRESH_INTERVAL_SECONDS: u64 = 300;

pub struct YahooProvider {
    fetcher: Fetcher,
    gate: RateGate,
    settings: Arc<Settings>,
}

impl YahooProvider {
    pub fn new(fetcher: Fetcher, settings: Arc<Settings>) -> Self {
        Self {
            fetcher,
            gate: RateGate::per_minute(settings.yahoo_rate_per_minute),
            settings,
        }
    }

    fn base_request(&self, url: &str) -> HttpRequest {
        HttpRequest::get(url)
            .with_header("Accept", "application/json,text/plain,*/*")
            .with_header("Accept-Language", &self.settings.yahoo_accept_language)
            .with_header("Origin", "https://finance.yahoo.com")
            .with_header("Referer", "https://finance.yahoo.com/")
            .with_header("User-Agent", &self.settings.yahoo_user_agent)
            .with_timeout_ms(self.settings.yahoo_timeout.as_millis() as u64)
    }

    /// Fetch all section symbols in one batch quote call, trying each
    /// configured endpoint in order.
    pub async fn fetch_sections(&self) -> Result<SectionPayload, CoreError> {
        let symbols: Vec<&str> = yahoo_symbols().iter().map(|(_, s, _)| *s).collect();
        let symbols = symbols.join(",");
        let policy = RetryPolicy::retries(self.settings.yahoo_max_retries);

        let mut last_error: Option<FetchError> = None;
        for endpoint in &self.settings.yahoo_quote_endpoints {
            self.gate.acquire().await;

            let request = self.base_request(endpoint).with_query("symbols", &symbols);
            let body = match self.fetcher.fetch_text(request, policy).await {
                Ok(body) => body,
                Err(error) => {
                    last_error = Some(error);
                    continue;
                }
            };

            match parse_quote_payload(&body) {
                Ok(payload) if has_any_payload(&payload) => return Ok(payload),
                Ok(_) => {
                    last_error = Some(FetchError {
                        url: endpoint.clone(),
                        attempts: 1,
                        status_code: None,
                        detail: Some("empty quote payload".to_owned()),
                    });
                }
                Err(detail) => {
                    last_error = Some(FetchError {
                        url: endpoint.clone(),
                        attempts: 1,
                        status_code: None,
                        detail: Some(detail),
                    });
                }
            }
        }

        Err(CoreError::ProviderFetch {
            provider: "yahoo",
            source: last_error.unwrap_or(FetchError {
                url: "yahoo".to_owned(),
                attempts: 0,
                status_code: None,
                detail: Some("no quote endpoints configured".to_owned()),
            }),
        })
    }

    /// Fetch a 1-day, 5-minute-interval intraday chart for one symbol.
    pub async fn fetch_chart(
        &self,
        descriptor: &SymbolDescriptor,
    ) -> Result<IntradaySeries, CoreError> {
        self.gate.acquire().await;

        let encoded = urlencoding::encode(&descriptor.provider_symbol);
        let url = format!("{CHART_URL}/{encoded}");
        let request = self
            .base_request(&url)
            .with_query("interval", "5m")
            .with_query("range", "1d")
            .with_query("includePrePost", "false")
            .with_query("events", "div,splits");

        let body = self
            .fetcher
            .fetch_text(request, RetryPolicy::retries(self.settings.yahoo_max_retries))
            .await
            .map_err(|source| CoreError::ProviderFetch {
                provider: "yahoo",
                source,
            })?;

        parse_chart_payload(&body, descriptor).map_err(|detail| malformed("yahoo", &url, &detail))
    }
}

#[derive(Debug, Deserialize)]
struct QuoteEnvelope {
    #[serde(rename = "quoteResponse")]
    quote_response: Option<QuoteResponse>,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    result: Option<Vec<QuoteRow>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteRow {
    symbol: Option<String>,
    regular_market_price: Option<f64>,
    #[serde(default)]
    regular_market_change: Option<f64>,
    #[serde(default)]
    regular_market_change_percent: Option<f64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    short_name: Option<String>,
    #[serde(default)]
    long_name: Option<String>,
}

/// Parse a v7 batch quote body into per-section points.
pub fn parse_quote_payload(body: &str) -> Result<SectionPayload, String> {
    let envelope: QuoteEnvelope =
        serde_json::from_str(body).map_err(|e| format!("unexpected Yahoo response shape: {e}"))?;
    let rows = envelope
        .quote_response
        .and_then(|qr| qr.result)
        .ok_or_else(|| "Yahoo quote result missing".to_owned())?;

    let mut by_symbol = std::collections::HashMap::new();
    for row in rows {
        if let Some(symbol) = row.symbol.as_deref() {
            by_symbol.insert(symbol.to_ascii_uppercase(), row);
        }
    }

    let fetch_time = UtcDateTime::now();
    let mut payload = empty_payload();

    for (section, symbol, default_name) in yahoo_symbols() {
        let Some(row) = by_symbol.get(&symbol.to_ascii_uppercase()) else {
            continue;
        };
        let Some(price) = row.regular_market_price.filter(|p| p.is_finite()) else {
            continue;
        };

        let name = row
            .short_name
            .clone()
            .or_else(|| row.long_name.clone())
            .unwrap_or_else(|| default_name.to_owned());

        if let Some(points) = payload.get_mut(&section) {
            points.push(MarketPoint {
                symbol: symbol.to_owned(),
                name,
                price,
                change: Some(row.regular_market_change.unwrap_or(0.0)),
                change_percent: Some(row.regular_market_change_percent.unwrap_or(0.0)),
                currency: row.currency.clone(),
                source: "yahoo".to_owned(),
                as_of: Some(fetch_time),
            });
        }
    }

    Ok(payload)
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Option<Chart>,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: Option<ChartMeta>,
    #[serde(default)]
    timestamp: Option<Vec<Option<i64>>>,
    #[serde(default)]
    indicators: Option<ChartIndicators>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    regular_market_price: Option<f64>,
    #[serde(default)]
    chart_previous_close: Option<f64>,
    #[serde(default)]
    previous_close: Option<f64>,
    #[serde(default)]
    regular_market_time: Option<i64>,
    #[serde(default)]
    regular_market_volume: Option<f64>,
    #[serde(default)]
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Option<Vec<ChartQuote>>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    close: Option<Vec<Option<f64>>>,
    #[serde(default)]
    volume: Option<Vec<Option<f64>>>,
}

/// Parse a v8 chart body into an intraday series for `descriptor`.
pub fn parse_chart_payload(
    body: &str,
    descriptor: &SymbolDescriptor,
) -> Result<IntradaySeries, String> {
    let envelope: ChartEnvelope =
        serde_json::from_str(body).map_err(|e| format!("malformed Yahoo chart payload: {e}"))?;
    let chart = envelope
        .chart
        .ok_or_else(|| "malformed Yahoo chart payload".to_owned())?;

    if let Some(error) = chart.error {
        return Err(error
            .description
            .unwrap_or_else(|| "unknown error".to_owned()));
    }

    let result = chart
        .result
        .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
        .ok_or_else(|| "Yahoo chart returned no result".to_owned())?;

    let meta = result.meta.unwrap_or_default();

    let timestamps = result.timestamp.unwrap_or_default();
    let quote = result
        .indicators
        .and_then(|i| i.quote)
        .and_then(|mut q| if q.is_empty() { None } else { Some(q.remove(0)) });
    let closes = quote
        .as_ref()
        .and_then(|q| q.close.clone())
        .unwrap_or_default();
    let volumes = quote
        .as_ref()
        .and_then(|q| q.volume.clone())
        .unwrap_or_default();

    let mut by_timestamp = std::collections::BTreeMap::new();
    for (idx, ts) in timestamps.iter().enumerate() {
        let Some(ts) = ts else { continue };
        let Some(close) = closes.get(idx).copied().flatten().filter(|c| c.is_finite()) else {
            continue;
        };
        let volume = volumes.get(idx).copied().flatten();
        by_timestamp.insert(
            *ts,
            IntradayPoint {
                time: *ts,
                price: close,
                volume,
            },
        );
    }

    let mut points: Vec<IntradayPoint> = by_timestamp.into_values().collect();

    let last_price = meta
        .regular_market_price
        .filter(|p| p.is_finite())
        .or_else(|| points.last().map(|p| p.price))
        .ok_or_else(|| "Yahoo chart had no usable last price".to_owned())?;

    let previous_close = meta
        .chart_previous_close
        .or(meta.previous_close)
        .filter(|p| p.is_finite())
        .or_else(|| points.first().map(|p| p.price));

    let as_of_unix = meta
        .regular_market_time
        .or_else(|| points.last().map(|p| p.time))
        .unwrap_or_else(|| UtcDateTime::now().unix());
    let as_of = UtcDateTime::from_unix(as_of_unix)
        .map_err(|_| "Yahoo chart timestamp out of range".to_owned())?;

    if points.is_empty() {
        points.push(IntradayPoint {
            time: as_of_unix,
            price: last_price,
            volume: meta.regular_market_volume,
        });
    }

    let volume = meta
        .regular_market_volume
        .or_else(|| points.last().and_then(|p| p.volume));

    let (change, change_percent) = match previous_close {
        Some(prev) if prev != 0.0 => {
            let change = last_price - prev;
            (change, change / prev * 100.0)
        }
        _ => (0.0, 0.0),
    };

    Ok(IntradaySeries {
        symbol: descriptor.canonical.clone(),
        display_symbol: descriptor.display_symbol.clone(),
        instrument_type: descriptor.kind,
        source: "Yahoo Chart".to_owned(),
        as_of,
        last_price,
        change,
        change_percent,
        volume,
        currency: meta.currency,
        stale: false,
        freshness_seconds: None,
        source_refresh_interval_seconds: Some(CHART_REFRESH_INTERVAL_SECONDS),
        upstream_refresh_interval_seconds: None,
        warnings: vec![],
        points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize_symbol;

    const QUOTE_FIXTURE: &str = r#"{
        "quoteResponse": {
            "result": [
                {
                    "symbol": "^GSPC",
                    "shortName": "S&P 500",
                    "regularMarketPrice": 6011.25,
                    "regularMarketChange": 14.5,
                    "regularMarketChangePercent": 0.24,
                    "currency": "USD"
                },
                {
                    "symbol": "BTC-USD",
                    "shortName": "Bitcoin USD",
                    "regularMarketPrice": 67890.0,
                    "regularMarketChange": -1200.0,
                    "regularMarketChangePercent": -1.74,
                    "currency": "USD"
                },
                {
                    "symbol": "EURUSD=X",
                    "regularMarketPrice": null,
                    "currency": "USD"
                }
            ],
            "error": null
        }
    }"#;

    #[test]
    fn quote_payload_groups_rows_into_sections() {
        let payload = parse_quote_payload(QUOTE_FIXTURE).expect("fixture parses");
        let indices = payload.get(&crate::SectionId::Indices).expect("indices");
        assert_eq!(indices.len(), 1);
        assert_eq!(indices[0].symbol, "^GSPC");
        assert_eq!(indices[0].name, "S&P 500");
        assert_eq!(indices[0].price, 6011.25);

        let crypto = payload.get(&crate::SectionId::Crypto).expect("crypto");
        assert_eq!(crypto.len(), 1);
        assert_eq!(crypto[0].change_percent, Some(-1.74));

        // Null price rows are skipped entirely.
        let fx = payload.get(&crate::SectionId::Fx).expect("fx");
        assert!(fx.is_empty());
    }

    #[test]
    fn quote_payload_rejects_wrong_shape() {
        assert!(parse_quote_payload("{}").is_err());
        assert!(parse_quote_payload("not json").is_err());
    }

    const CHART_FIXTURE: &str = r#"{
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

    #[test]
    fn chart_payload_builds_series_and_skips_null_closes() {
        let descriptor = normalize_symbol("AAPL").expect("valid symbol");
        let series = parse_chart_payload(CHART_FIXTURE, &descriptor).expect("fixture parses");

        assert_eq!(series.symbol, "AAPL");
        assert_eq!(series.points.len(), 2);
        assert_eq!(series.last_price, 232.5);
        assert!((series.change - 2.5).abs() < 1e-9);
        assert!((series.change_percent - (2.5 / 230.0 * 100.0)).abs() < 1e-9);
        assert_eq!(series.currency.as_deref(), Some("USD"));
        assert!(!series.stale);
        assert_eq!(series.as_of.unix(), 1_772_380_800);
    }

    #[test]
    fn chart_error_description_is_surfaced() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let descriptor = normalize_symbol("ZZZZ").expect("valid symbol");
        let err = parse_chart_payload(body, &descriptor).expect_err("error body");
        assert!(err.contains("delisted"));
    }

    #[test]
    fn chart_without_prices_is_rejected() {
        let body = r#"{"chart":{"result":[{"meta":{},"timestamp":[],"indicators":{"quote":[{"close":[]}]}}],"error":null}}"#;
        let descriptor = normalize_symbol("AAPL").expect("valid symbol");
        assert!(parse_chart_payload(body, &descriptor).is_err());
    }
}
