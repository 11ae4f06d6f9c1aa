//! AwesomeAPI adapter: near-real-time FX ticks.
//!
//! Each call returns a single latest tick per pair. Successive ticks are
//! merged into the previously cached series so the chart accumulates history
//! across refreshes, deduplicated by tick timestamp and capped at the
//! configured point limit.

use std::sync::Arc;

use serde::Deserialize;

use crate::fetch::{Fetcher, RetryPolicy};
use crate::http_client::HttpRequest;
use crate::providers::{malformed, safe_float};
use crate::throttle::RateGate;
use crate::{
    CoreError, IntradayPoint, IntradaySeries, Settings, SymbolDescriptor, UtcDateTime,
};

const LAST_TICK_URL: &str = "https://economia.awesomeapi.com.br/json/last";

/// FX ticks move fast enough to warrant a short refresh floor.
pub const REFRESH_INTERVAL_SECONDS: u64 = 60;

const FLAT_TICK_WARNING: &str = "FX provider reported no price change on latest tick.";

#[derive(Debug, Default, Deserialize)]
struct FxTick {
    #[serde(default)]
    bid: String,
    #[serde(default)]
    ask: String,
    #[serde(default, rename = "varBid")]
    var_bid: String,
    #[serde(default, rename = "pctChange")]
    pct_change: String,
    #[serde(default)]
    timestamp: String,
    #[serde(default)]
    create_date: String,
}

pub struct AwesomeapiProvider {
    fetcher: Fetcher,
    gate: RateGate,
    settings: Arc<Settings>,
}

impl AwesomeapiProvider {
    pub fn new(fetcher: Fetcher, settings: Arc<Settings>) -> Self {
        Self {
            fetcher,
            gate: RateGate::per_minute(settings.fx_rate_per_minute),
            settings,
        }
    }

    /// Fetch the latest tick and merge it into `previous`, when present.
    pub async fn fetch_fx_series(
        &self,
        descriptor: &SymbolDescriptor,
        previous: Option<&IntradaySeries>,
    ) -> Result<IntradaySeries, CoreError> {
        let pair = descriptor
            .awesomeapi_pair()
            .ok_or_else(|| malformed("awesomeapi", LAST_TICK_URL, "Not an FX pair"))?;
        let url = format!("{LAST_TICK_URL}/{pair}");

        self.gate.acquire().await;

        let body = self
            .fetcher
            .fetch_text(
                HttpRequest::get(&url).with_timeout_ms(8_000),
                RetryPolicy::retries(2),
            )
            .await
            .map_err(|source| CoreError::ProviderFetch {
                provider: "awesomeapi",
                source,
            })?;

        build_fx_series(
            &body,
            descriptor,
            previous,
            self.settings.max_intraday_points,
        )
        .map_err(|detail| malformed("awesomeapi", &url, &detail))
    }
}

/// Parse a last-tick response and merge it into the prior series.
pub fn build_fx_series(
    body: &str,
    descriptor: &SymbolDescriptor,
    previous: Option<&IntradaySeries>,
    max_points: usize,
) -> Result<IntradaySeries, String> {
    let response: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(body).map_err(|e| format!("Unparseable FX tick payload: {e}"))?;

    // Responses are keyed by the squashed pair code; fall back to the first
    // entry when the key does not match.
    let raw_tick = response
        .get(descriptor.canonical.as_str())
        .or_else(|| response.values().next())
        .ok_or_else(|| "Empty FX tick payload".to_owned())?;
    let tick: FxTick = serde_json::from_value(raw_tick.clone())
        .map_err(|e| format!("Unexpected FX tick shape: {e}"))?;

    let last_price = safe_float(&tick.bid)
        .or_else(|| safe_float(&tick.ask))
        .filter(|price| *price > 0.0)
        .ok_or_else(|| "FX tick carried no usable price".to_owned())?;

    let as_of = tick
        .timestamp
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(|ts| UtcDateTime::from_unix(ts).ok())
        .or_else(|| parse_create_date(&tick.create_date))
        .unwrap_or_else(UtcDateTime::now);

    let reported_change = safe_float(&tick.var_bid);
    let reported_pct = safe_float(&tick.pct_change);
    let (change, change_percent) = match (reported_change, reported_pct) {
        (Some(change), Some(pct)) => (change, pct),
        _ => match previous {
            Some(prev) if prev.last_price != 0.0 => {
                let change = last_price - prev.last_price;
                (change, change / prev.last_price * 100.0)
            }
            _ => (0.0, 0.0),
        },
    };

    let mut warnings = Vec::new();
    if change == 0.0 && change_percent == 0.0 {
        warnings.push(FLAT_TICK_WARNING.to_owned());
    }

    let points = merge_tick_points(
        previous.map(|series| series.points.as_slice()).unwrap_or(&[]),
        IntradayPoint {
            time: as_of.unix(),
            price: last_price,
            volume: None,
        },
        as_of,
        max_points,
    );

    let currency = descriptor
        .fx_legs()
        .map(|(_, quote)| quote.to_owned())
        .unwrap_or_else(|| "USD".to_owned());

    Ok(IntradaySeries {
        symbol: descriptor.canonical.clone(),
        display_symbol: descriptor.display_symbol.clone(),
        instrument_type: descriptor.kind,
        source: "AwesomeAPI FX".to_owned(),
        as_of,
        last_price,
        change,
        change_percent,
        volume: None,
        currency: Some(currency),
        stale: false,
        freshness_seconds: None,
        source_refresh_interval_seconds: Some(REFRESH_INTERVAL_SECONDS),
        upstream_refresh_interval_seconds: None,
        warnings,
        points,
    })
}

/// Keep prior points older than the new tick, append it, dedupe by
/// timestamp, and keep only the newest `max_points`.
fn merge_tick_points(
    previous: &[IntradayPoint],
    tick: IntradayPoint,
    as_of: UtcDateTime,
    max_points: usize,
) -> Vec<IntradayPoint> {
    let cutoff = as_of.unix();
    let mut merged: Vec<IntradayPoint> = previous
        .iter()
        .filter(|point| point.time < cutoff)
        .cloned()
        .collect();
    merged.push(tick);

    merged.sort_by_key(|point| point.time);
    merged.dedup_by_key(|point| point.time);

    if merged.len() > max_points {
        merged.drain(..merged.len() - max_points);
    }
    merged
}

/// `create_date` is `YYYY-MM-DD HH:MM:SS` in UTC.
fn parse_create_date(raw: &str) -> Option<UtcDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    UtcDateTime::parse(&format!("{}Z", raw.replacen(' ', "T", 1))).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize_symbol;

    const TICK_FIXTURE: &str = r#"{
        "EURUSD": {
            "code": "EUR",
            "codein": "USD",
            "bid": "1.0851",
            "ask": "1.0853",
            "varBid": "0.0012",
            "pctChange": "0.11",
            "timestamp": "1772483070",
            "create_date": "2026-03-02 21:44:30"
        }
    }"#;

    fn eurusd() -> SymbolDescriptor {
        normalize_symbol("EUR/USD").expect("valid pair")
    }

    #[test]
    fn tick_parses_into_fx_series() {
        let series = build_fx_series(TICK_FIXTURE, &eurusd(), None, 240).expect("series");
        assert_eq!(series.symbol, "EURUSD");
        assert_eq!(series.last_price, 1.0851);
        assert_eq!(series.change, 0.0012);
        assert_eq!(series.change_percent, 0.11);
        assert_eq!(series.as_of.unix(), 1_772_483_070);
        assert_eq!(series.currency.as_deref(), Some("USD"));
        assert_eq!(series.points.len(), 1);
        assert!(series.warnings.is_empty());
        assert!(!series.stale);
    }

    #[test]
    fn successive_ticks_accumulate_and_dedupe() {
        let first = build_fx_series(TICK_FIXTURE, &eurusd(), None, 240).expect("first");

        let next = TICK_FIXTURE
            .replace("1772483070", "1772483130")
            .replace("\"1.0851\"", "\"1.0855\"");
        let second = build_fx_series(&next, &eurusd(), Some(&first), 240).expect("second");
        assert_eq!(second.points.len(), 2);
        assert_eq!(second.points[1].price, 1.0855);

        // Replaying the same tick does not duplicate the point.
        let third = build_fx_series(&next, &eurusd(), Some(&second), 240).expect("third");
        assert_eq!(third.points.len(), 2);
    }

    #[test]
    fn merged_history_is_capped() {
        let mut series = build_fx_series(TICK_FIXTURE, &eurusd(), None, 3).expect("seed");
        for step in 1..6 {
            let ts = 1_772_483_070 + step * 60;
            let next = TICK_FIXTURE.replace("1772483070", &ts.to_string());
            series = build_fx_series(&next, &eurusd(), Some(&series), 3).expect("tick");
        }
        assert_eq!(series.points.len(), 3);
        assert_eq!(series.points[2].time, series.as_of.unix());
    }

    #[test]
    fn flat_tick_carries_a_warning() {
        let flat = TICK_FIXTURE
            .replace("\"0.0012\"", "\"0\"")
            .replace("\"0.11\"", "\"0\"");
        let series = build_fx_series(&flat, &eurusd(), None, 240).expect("series");
        assert_eq!(series.warnings, vec![FLAT_TICK_WARNING.to_owned()]);
    }

    #[test]
    fn unkeyed_payload_falls_back_to_first_entry() {
        let renamed = TICK_FIXTURE.replace("\"EURUSD\"", "\"EUR-USD\"");
        let series = build_fx_series(&renamed, &eurusd(), None, 240).expect("series");
        assert_eq!(series.last_price, 1.0851);
    }

    #[test]
    fn priceless_tick_is_rejected() {
        let broken = TICK_FIXTURE
            .replace("\"1.0851\"", "\"\"")
            .replace("\"1.0853\"", "\"N/D\"");
        assert!(build_fx_series(&broken, &eurusd(), None, 240).is_err());
    }
}
