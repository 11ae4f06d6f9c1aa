//! Per-symbol intraday series with a two-tier cache.
//!
//! Each symbol has a short-TTL UI tier and a dated upstream envelope. A
//! per-symbol async lock serializes refreshes so concurrent chart requests
//! for the same instrument trigger at most one upstream fetch. The live
//! chain depends on the instrument: FX pairs try AwesomeAPI first, then the
//! Yahoo chart API, then the Stooq snapshot; everything else starts at
//! Yahoo. Failures degrade to the last upstream snapshot before giving up
//! with an empty series.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::cache::{keys, CacheClient, UpstreamEnvelope};
use crate::fetch::Fetcher;
use crate::http_client::HttpClient;
use crate::providers::awesomeapi::AwesomeapiProvider;
use crate::providers::stooq::StooqProvider;
use crate::providers::yahoo::YahooProvider;
use crate::throttle::RateGate;
use crate::{
    normalize_symbol, CoreError, InstrumentKind, IntradaySeries, Settings, SymbolDescriptor,
    UtcDateTime,
};

const STALE_SERVE_WARNING: &str = "Live refresh failed; serving stale snapshot.";
const NO_DATA_WARNING: &str = "No live intraday data available.";

pub struct IntradayService {
    settings: Arc<Settings>,
    cache: CacheClient,
    awesomeapi: AwesomeapiProvider,
    yahoo: YahooProvider,
    stooq: StooqProvider,
    /// Overall live-fetch budget across all symbols, on top of the
    /// per-provider gates.
    gate: RateGate,
    /// One refresh lock per symbol cache key, created on first use.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl IntradayService {
    pub fn new(settings: Arc<Settings>, http: Arc<dyn HttpClient>, cache: CacheClient) -> Self {
        let fetcher = Fetcher::new(http);
        Self {
            awesomeapi: AwesomeapiProvider::new(fetcher.clone(), settings.clone()),
            yahoo: YahooProvider::new(fetcher.clone(), settings.clone()),
            stooq: StooqProvider::new(fetcher, settings.clone()),
            gate: RateGate::per_minute(settings.intraday_rate_per_minute),
            settings,
            cache,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Serve an intraday series for a raw symbol.
    ///
    /// # Errors
    /// Only symbol normalization fails; provider trouble degrades the series
    /// instead.
    pub async fn get_intraday(&self, raw_symbol: &str) -> Result<IntradaySeries, CoreError> {
        let descriptor = normalize_symbol(raw_symbol)?;
        let cache_key = descriptor.cache_key();
        let ui_key = keys::ui_intraday(&cache_key);

        if let Some(series) = self.cache.get_json::<IntradaySeries>(&ui_key).await {
            return Ok(series);
        }

        let lock = self.symbol_lock(&cache_key).await;
        let _guard = lock.lock().await;

        // Another task may have refreshed while this one waited on the lock.
        if let Some(series) = self.cache.get_json::<IntradaySeries>(&ui_key).await {
            return Ok(series);
        }

        let upstream_key = keys::upstream_intraday(&cache_key);
        let envelope = self
            .cache
            .get_json::<UpstreamEnvelope<IntradaySeries>>(&upstream_key)
            .await;

        let refresh_secs = self.refresh_interval_seconds(&descriptor, envelope.as_ref());
        // FX ticks move fast enough that the refresh decision follows the
        // configured FX floor, not the source's advertised interval.
        let refresh_after = if descriptor.kind == InstrumentKind::Fx {
            refresh_secs.min(self.settings.upstream_refresh_for(true).as_secs())
        } else {
            refresh_secs
        };
        if let Some(envelope) = &envelope {
            if (envelope.age_seconds() as u64) < refresh_after {
                let series = self.finalize(envelope.payload.clone(), refresh_secs);
                self.cache
                    .put_json(&ui_key, &series, self.settings.market_cache_ttl)
                    .await;
                return Ok(series);
            }
        }

        let previous = envelope.as_ref().map(|envelope| &envelope.payload);
        let mut live_warnings = Vec::new();

        match self.fetch_live(&descriptor, previous, &mut live_warnings).await {
            Some(mut series) => {
                series.warnings = [live_warnings, series.warnings].concat();
                self.cache
                    .put_json(
                        &upstream_key,
                        &UpstreamEnvelope::new(series.clone()),
                        self.settings.market_stale_ttl,
                    )
                    .await;
                let refresh_secs = series
                    .source_refresh_interval_seconds
                    .unwrap_or(refresh_secs);
                let series = self.finalize(series, refresh_secs);
                self.cache
                    .put_json(&ui_key, &series, self.settings.market_cache_ttl)
                    .await;
                Ok(series)
            }
            None => {
                let series = match envelope {
                    Some(envelope) => {
                        let mut series = envelope.payload;
                        series.stale = true;
                        series.warnings.push(STALE_SERVE_WARNING.to_owned());
                        series.warnings.extend(live_warnings);
                        self.finalize(series, refresh_secs)
                    }
                    None => {
                        let mut warnings = vec![NO_DATA_WARNING.to_owned()];
                        warnings.extend(live_warnings);
                        empty_series(&descriptor, warnings)
                    }
                };
                self.cache
                    .put_json(&ui_key, &series, self.settings.market_cache_ttl)
                    .await;
                Ok(series)
            }
        }
    }

    async fn symbol_lock(&self, cache_key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(cache_key.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Refresh floor for this symbol: the cached series' own interval when
    /// known, otherwise the per-kind default.
    fn refresh_interval_seconds(
        &self,
        descriptor: &SymbolDescriptor,
        envelope: Option<&UpstreamEnvelope<IntradaySeries>>,
    ) -> u64 {
        if let Some(interval) =
            envelope.and_then(|envelope| envelope.payload.source_refresh_interval_seconds)
        {
            return interval;
        }
        if descriptor.kind == InstrumentKind::Fx {
            self.settings.awesomeapi_refresh.as_secs()
        } else {
            self.settings.yahoo_chart_refresh.as_secs()
        }
    }

    /// Walk the live chain, accumulating a warning per failed source.
    async fn fetch_live(
        &self,
        descriptor: &SymbolDescriptor,
        previous: Option<&IntradaySeries>,
        warnings: &mut Vec<String>,
    ) -> Option<IntradaySeries> {
        self.gate.acquire().await;

        if descriptor.kind == InstrumentKind::Fx {
            match self.awesomeapi.fetch_fx_series(descriptor, previous).await {
                Ok(series) => return Some(series),
                Err(err) => warnings.push(format!("AwesomeAPI FX unavailable ({err}).")),
            }
        }

        match self.yahoo.fetch_chart(descriptor).await {
            Ok(series) => return Some(series),
            Err(err) => warnings.push(format!("Yahoo chart unavailable ({err}).")),
        }

        match self.stooq.fetch_intraday_snapshot(descriptor).await {
            Ok(series) => Some(series),
            Err(err) => {
                warnings.push(format!("Stooq snapshot unavailable ({err})."));
                None
            }
        }
    }

    /// Stamp derived serving fields before the series goes to a caller.
    fn finalize(&self, mut series: IntradaySeries, refresh_secs: u64) -> IntradaySeries {
        series.freshness_seconds = Some(UtcDateTime::now().seconds_since(series.as_of));
        series.upstream_refresh_interval_seconds = Some(refresh_secs);
        series
    }
}

/// Placeholder series when nothing could be served at all.
fn empty_series(descriptor: &SymbolDescriptor, warnings: Vec<String>) -> IntradaySeries {
    IntradaySeries {
        symbol: descriptor.canonical.clone(),
        display_symbol: descriptor.display_symbol.clone(),
        instrument_type: descriptor.kind,
        source: "Unavailable".to_owned(),
        as_of: UtcDateTime::now(),
        last_price: 0.0,
        change: 0.0,
        change_percent: 0.0,
        volume: None,
        currency: None,
        stale: true,
        freshness_seconds: Some(0),
        source_refresh_interval_seconds: None,
        upstream_refresh_interval_seconds: None,
        warnings,
        points: Vec::new(),
    }
}
