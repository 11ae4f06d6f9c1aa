//! CoinGecko adapter for the crypto section.
//!
//! One `simple/price` call covers all tracked coins. CoinGecko reports a
//! 24-hour percent change, from which the absolute change is derived.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::fetch::{Fetcher, RetryPolicy};
use crate::http_client::HttpRequest;
use crate::providers::{empty_payload, malformed, SectionPayload};
use crate::throttle::RateGate;
use crate::{CoreError, MarketPoint, SectionId, Settings, UtcDateTime};

const SIMPLE_PRICE_URL: &str = "https://api.coingecko.com/api/v3/simple/price";

/// Tracked coins: (CoinGecko id, output symbol, display name).
pub const COINS: [(&str, &str, &str); 3] = [
    ("bitcoin", "BTC-USD", "Bitcoin"),
    ("ethereum", "ETH-USD", "Ethereum"),
    ("solana", "SOL-USD", "Solana"),
];

#[derive(Debug, Deserialize)]
struct CoinQuote {
    usd: Option<f64>,
    #[serde(rename = "usd_24h_change")]
    usd_24h_change: Option<f64>,
}

pub struct CoingeckoProvider {
    fetcher: Fetcher,
    gate: RateGate,
    settings: Arc<Settings>,
}

impl CoingeckoProvider {
    pub fn new(fetcher: Fetcher, settings: Arc<Settings>) -> Self {
        Self {
            fetcher,
            gate: RateGate::per_minute(settings.coingecko_rate_per_minute),
            settings,
        }
    }

    pub async fn fetch_crypto(&self) -> Result<SectionPayload, CoreError> {
        self.gate.acquire().await;

        let ids: Vec<&str> = COINS.iter().map(|(id, _, _)| *id).collect();
        let request = HttpRequest::get(SIMPLE_PRICE_URL)
            .with_query("ids", &ids.join(","))
            .with_query("vs_currencies", "usd")
            .with_query("include_24hr_change", "true")
            .with_timeout_ms(self.settings.coingecko_timeout.as_millis() as u64);

        let quotes: HashMap<String, CoinQuote> = self
            .fetcher
            .fetch_json(request, RetryPolicy::retries(2))
            .await
            .map_err(|source| CoreError::ProviderFetch {
                provider: "coingecko",
                source,
            })?;

        quotes_to_payload(&quotes)
            .ok_or_else(|| malformed("coingecko", SIMPLE_PRICE_URL, "No usable coin quotes"))
    }
}

fn quotes_to_payload(quotes: &HashMap<String, CoinQuote>) -> Option<SectionPayload> {
    let as_of = UtcDateTime::now();
    let mut points = Vec::new();

    for (id, symbol, name) in COINS {
        let Some(quote) = quotes.get(id) else {
            continue;
        };
        let Some(price) = quote.usd.filter(|p| p.is_finite() && *p > 0.0) else {
            continue;
        };
        let change_percent = quote.usd_24h_change.filter(|c| c.is_finite()).unwrap_or(0.0);
        points.push(MarketPoint {
            symbol: symbol.to_owned(),
            name: name.to_owned(),
            price,
            change: Some(price * change_percent / 100.0),
            change_percent: Some(change_percent),
            currency: Some("USD".to_owned()),
            source: "coingecko".to_owned(),
            as_of: Some(as_of),
        });
    }

    if points.is_empty() {
        return None;
    }
    let mut payload = empty_payload();
    payload.insert(SectionId::Crypto, points);
    Some(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(usd: Option<f64>, change: Option<f64>) -> CoinQuote {
        CoinQuote {
            usd,
            usd_24h_change: change,
        }
    }

    #[test]
    fn coin_quotes_map_to_crypto_points() {
        let mut quotes = HashMap::new();
        quotes.insert("bitcoin".to_owned(), quote(Some(64_250.0), Some(2.5)));
        quotes.insert("ethereum".to_owned(), quote(Some(3_210.0), Some(-1.0)));

        let payload = quotes_to_payload(&quotes).expect("payload");
        let crypto = payload.get(&SectionId::Crypto).expect("crypto section");
        assert_eq!(crypto.len(), 2);

        let btc = crypto.iter().find(|p| p.symbol == "BTC-USD").expect("BTC");
        assert_eq!(btc.price, 64_250.0);
        assert!((btc.change.expect("change") - 64_250.0 * 0.025).abs() < 1e-6);
        assert_eq!(btc.source, "coingecko");
    }

    #[test]
    fn missing_change_defaults_to_zero() {
        let mut quotes = HashMap::new();
        quotes.insert("solana".to_owned(), quote(Some(121.0), None));
        let payload = quotes_to_payload(&quotes).expect("payload");
        let crypto = payload.get(&SectionId::Crypto).expect("crypto section");
        assert_eq!(crypto[0].change, Some(0.0));
    }

    #[test]
    fn nonpositive_prices_are_dropped() {
        let mut quotes = HashMap::new();
        quotes.insert("bitcoin".to_owned(), quote(Some(0.0), Some(1.0)));
        quotes.insert("ethereum".to_owned(), quote(None, None));
        assert!(quotes_to_payload(&quotes).is_none());
    }
}
