//! FX rate adapters for the overview FX section.
//!
//! Both upstreams quote USD-based rates only, so EUR/USD and GBP/USD are
//! derived by inverting the returned rate. Neither source exposes a change
//! figure for the day, so points carry a zero change.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::fetch::{Fetcher, RetryPolicy};
use crate::http_client::HttpRequest;
use crate::providers::{empty_payload, malformed, SectionPayload};
use crate::throttle::RateGate;
use crate::{CoreError, MarketPoint, SectionId, Settings, UtcDateTime};

const FRANKFURTER_URL: &str = "https://api.frankfurter.app/latest";
const EXCHANGERATE_HOST_URL: &str = "https://api.exchangerate.host/latest";

#[derive(Debug, Deserialize)]
struct RatesResponse {
    #[serde(default)]
    rates: HashMap<String, f64>,
}

pub struct FxRatesProvider {
    fetcher: Fetcher,
    gate: RateGate,
}

impl FxRatesProvider {
    pub fn new(fetcher: Fetcher, settings: Arc<Settings>) -> Self {
        Self {
            fetcher,
            gate: RateGate::per_minute(settings.fx_rate_per_minute),
        }
    }

    pub async fn fetch_frankfurter(&self) -> Result<SectionPayload, CoreError> {
        self.gate.acquire().await;
        let request = HttpRequest::get(FRANKFURTER_URL)
            .with_query("from", "USD")
            .with_query("to", "EUR,JPY,GBP")
            .with_timeout_ms(8_000);
        let response: RatesResponse = self
            .fetcher
            .fetch_json(request, RetryPolicy::retries(2))
            .await
            .map_err(|source| CoreError::ProviderFetch {
                provider: "frankfurter",
                source,
            })?;
        build_fx_payload(&response.rates, "Frankfurter", "frankfurter")
            .ok_or_else(|| malformed("frankfurter", FRANKFURTER_URL, "No usable FX rates"))
    }

    pub async fn fetch_exchangerate_host(&self) -> Result<SectionPayload, CoreError> {
        self.gate.acquire().await;
        let request = HttpRequest::get(EXCHANGERATE_HOST_URL)
            .with_query("base", "USD")
            .with_query("symbols", "EUR,JPY,GBP")
            .with_timeout_ms(8_000);
        let response: RatesResponse = self
            .fetcher
            .fetch_json(request, RetryPolicy::retries(2))
            .await
            .map_err(|source| CoreError::ProviderFetch {
                provider: "exchangerate_host",
                source,
            })?;
        build_fx_payload(&response.rates, "ExchangeRate.host", "exchangerate.host").ok_or_else(
            || {
                malformed(
                    "exchangerate_host",
                    EXCHANGERATE_HOST_URL,
                    "No usable FX rates",
                )
            },
        )
    }
}

/// Map USD-based rates onto the FX section targets. Returns `None` when no
/// target pair can be derived.
pub fn build_fx_payload(
    rates: &HashMap<String, f64>,
    label_suffix: &str,
    source: &str,
) -> Option<SectionPayload> {
    let as_of = UtcDateTime::now();
    let mut points = Vec::new();

    // USD-per-EUR and USD-per-GBP are the inverse of the quoted rates.
    if let Some(eur) = positive_rate(rates, "EUR") {
        points.push(fx_point(
            "EURUSD=X",
            &format!("EUR/USD ({label_suffix})"),
            1.0 / eur,
            "USD",
            source,
            as_of,
        ));
    }
    if let Some(jpy) = positive_rate(rates, "JPY") {
        points.push(fx_point(
            "USDJPY=X",
            &format!("USD/JPY ({label_suffix})"),
            jpy,
            "JPY",
            source,
            as_of,
        ));
    }
    if let Some(gbp) = positive_rate(rates, "GBP") {
        points.push(fx_point(
            "GBPUSD=X",
            &format!("GBP/USD ({label_suffix})"),
            1.0 / gbp,
            "USD",
            source,
            as_of,
        ));
    }

    if points.is_empty() {
        return None;
    }
    let mut payload = empty_payload();
    payload.insert(SectionId::Fx, points);
    Some(payload)
}

fn positive_rate(rates: &HashMap<String, f64>, code: &str) -> Option<f64> {
    rates
        .get(code)
        .copied()
        .filter(|rate| rate.is_finite() && *rate > 0.0)
}

fn fx_point(
    symbol: &str,
    name: &str,
    price: f64,
    currency: &str,
    source: &str,
    as_of: UtcDateTime,
) -> MarketPoint {
    MarketPoint {
        symbol: symbol.to_owned(),
        name: name.to_owned(),
        price,
        change: Some(0.0),
        change_percent: Some(0.0),
        currency: Some(currency.to_owned()),
        source: source.to_owned(),
        as_of: Some(as_of),
    }
}
