//! Market overview aggregation.
//!
//! `get_overview` reads through three cache tiers. The fresh tier absorbs
//! bursts of UI traffic, the upstream tier holds the last assembled snapshot
//! in a dated envelope and is served as long as it is younger than the
//! refresh floor, and the stale tier is the in-process fallback of last
//! resort. A refresh walks every section's provider fallback chain, fetching
//! each live provider at most once per cycle and recording the outcome in the
//! health registry, then fills the remaining gaps from last-known-good
//! snapshots and the static bootstrap data.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::cache::{keys, CacheClient, UpstreamEnvelope};
use crate::fetch::Fetcher;
use crate::health::{HealthStatus, ProviderHealthRegistry, ProviderState};
use crate::http_client::HttpClient;
use crate::providers::coingecko::CoingeckoProvider;
use crate::providers::fred::FredProvider;
use crate::providers::fx::FxRatesProvider;
use crate::providers::stooq::StooqProvider;
use crate::providers::yahoo::YahooProvider;
use crate::providers::SectionPayload;
use crate::sections::{
    bootstrap_points, expected_count, provider_chain, rates_default_points, section_label,
    section_targets,
};
use crate::{
    CoreError, MarketOverview, MarketPoint, MarketSection, ProviderId, SectionId, SectionMeta,
    Settings, UtcDateTime,
};

const STALE_FALLBACK_BANNER: &str = "All live providers unavailable, serving stale snapshot.";

/// Labels never advertised as fallback sources in the banner.
const BANNER_EXCLUDED_LABELS: [&str; 3] = ["Yahoo", "Last Known Good", "Bootstrap Snapshot"];

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Durable per-section snapshot used as the last-known-good fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSectionSnapshot {
    pub saved_at: UtcDateTime,
    /// Label of the provider the snapshot originally came from.
    pub source: String,
    pub points: Vec<MarketPoint>,
}

/// Persistence seam for last-known-good section snapshots.
pub trait SnapshotStore: Send + Sync {
    fn load_section<'a>(
        &'a self,
        section: SectionId,
    ) -> StoreFuture<'a, Result<Option<StoredSectionSnapshot>, CoreError>>;

    fn save_section<'a>(
        &'a self,
        section: SectionId,
        snapshot: &'a StoredSectionSnapshot,
    ) -> StoreFuture<'a, Result<(), CoreError>>;
}

/// In-memory [`SnapshotStore`] used when no database is attached.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    sections: std::sync::Mutex<HashMap<SectionId, StoredSectionSnapshot>>,
}

impl MemorySnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load_section<'a>(
        &'a self,
        section: SectionId,
    ) -> StoreFuture<'a, Result<Option<StoredSectionSnapshot>, CoreError>> {
        Box::pin(async move {
            let sections = self
                .sections
                .lock()
                .map_err(|_| CoreError::Storage("snapshot store poisoned".to_owned()))?;
            Ok(sections.get(&section).cloned())
        })
    }

    fn save_section<'a>(
        &'a self,
        section: SectionId,
        snapshot: &'a StoredSectionSnapshot,
    ) -> StoreFuture<'a, Result<(), CoreError>> {
        Box::pin(async move {
            let mut sections = self
                .sections
                .lock()
                .map_err(|_| CoreError::Storage("snapshot store poisoned".to_owned()))?;
            sections.insert(section, snapshot.clone());
            Ok(())
        })
    }
}

/// Aggregate health surface served alongside the overview.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatusReport {
    pub as_of: UtcDateTime,
    /// `ok` unless any live provider is degraded or cooling down.
    pub status: String,
    pub providers: Vec<ProviderState>,
    pub matrix: Vec<SectionChain>,
}

/// One section's fallback chain, by provider label.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionChain {
    pub section: SectionId,
    pub providers: Vec<&'static str>,
}

pub struct OverviewService {
    settings: Arc<Settings>,
    cache: CacheClient,
    health: Arc<ProviderHealthRegistry>,
    store: Arc<dyn SnapshotStore>,
    yahoo: YahooProvider,
    stooq: StooqProvider,
    fx: FxRatesProvider,
    fred: FredProvider,
    coingecko: CoingeckoProvider,
    refresh_lock: Mutex<()>,
}

impl OverviewService {
    pub fn new(
        settings: Arc<Settings>,
        http: Arc<dyn HttpClient>,
        cache: CacheClient,
        health: Arc<ProviderHealthRegistry>,
        store: Arc<dyn SnapshotStore>,
    ) -> Self {
        let fetcher = Fetcher::new(http);
        Self {
            yahoo: YahooProvider::new(fetcher.clone(), settings.clone()),
            stooq: StooqProvider::new(fetcher.clone(), settings.clone()),
            fx: FxRatesProvider::new(fetcher.clone(), settings.clone()),
            fred: FredProvider::new(fetcher.clone(), settings.clone()),
            coingecko: CoingeckoProvider::new(fetcher, settings.clone()),
            settings,
            cache,
            health,
            store,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Serve the overview snapshot. Failures degrade the snapshot, they
    /// never surface as errors.
    pub async fn get_overview(&self) -> MarketOverview {
        if let Some(fresh) = self.cache.get_json::<MarketOverview>(&keys::overview_fresh()).await {
            return fresh;
        }

        if let Some(envelope) = self
            .cache
            .get_json::<UpstreamEnvelope<MarketOverview>>(&keys::overview_upstream())
            .await
        {
            if !envelope.needs_refresh(self.settings.market_upstream_refresh) {
                self.cache
                    .put_json(
                        &keys::overview_fresh(),
                        &envelope.payload,
                        self.settings.market_cache_ttl,
                    )
                    .await;
                return envelope.payload;
            }
        }

        let _refresh = self.refresh_lock.lock().await;
        // Another caller may have refreshed while this one waited.
        if let Some(fresh) = self.cache.get_json::<MarketOverview>(&keys::overview_fresh()).await {
            return fresh;
        }

        let overview = self.refresh_overview().await;
        self.cache
            .put_json(&keys::overview_fresh(), &overview, self.settings.market_cache_ttl)
            .await;
        self.cache
            .put_json(
                &keys::overview_upstream(),
                &UpstreamEnvelope::new(overview.clone()),
                self.settings.market_stale_ttl,
            )
            .await;
        self.cache
            .put_json(&keys::overview_stale(), &overview, self.settings.market_stale_ttl)
            .await;
        overview
    }

    /// Health snapshot plus the per-section fallback matrix.
    pub fn provider_status(&self) -> ProviderStatusReport {
        let providers = self.health.snapshot();
        let degraded = providers.iter().any(|state| {
            matches!(state.status, HealthStatus::Degraded | HealthStatus::Cooldown)
        });
        let matrix = SectionId::ALL
            .iter()
            .map(|section| SectionChain {
                section: *section,
                providers: provider_chain(*section)
                    .iter()
                    .map(|provider| provider.label())
                    .collect(),
            })
            .collect();
        ProviderStatusReport {
            as_of: UtcDateTime::now(),
            status: if degraded { "degraded" } else { "ok" }.to_owned(),
            providers,
            matrix,
        }
    }

    async fn refresh_overview(&self) -> MarketOverview {
        let mut memo: HashMap<ProviderId, Option<SectionPayload>> = HashMap::new();

        // Yahoo is probed up front so its health state reflects this cycle
        // before the banner is decided.
        self.ensure_fetched(ProviderId::Yahoo, &mut memo).await;

        let mut sections = Vec::with_capacity(SectionId::ALL.len());
        let mut warnings = Vec::new();
        let mut contributing_labels: Vec<&'static str> = Vec::new();
        let mut any_stale_section = false;
        let mut total_points = 0usize;

        for section in SectionId::ALL {
            let assembled = self.assemble_section(section, &mut memo).await;

            total_points += assembled.points.len();
            if assembled.section_meta.stale {
                any_stale_section = true;
            }
            if let Some(warning) = &assembled.section_meta.warning {
                warnings.push(warning.clone());
            }
            for provider in &assembled.section_meta.sources {
                let label = provider.label();
                if !contributing_labels.contains(&label) {
                    contributing_labels.push(label);
                }
            }
            sections.push(assembled);
        }

        if total_points == 0 {
            if let Some(mut stale) = self
                .cache
                .get_json::<MarketOverview>(&keys::overview_stale())
                .await
            {
                stale.degraded = true;
                stale.banner = Some(STALE_FALLBACK_BANNER.to_owned());
                return stale;
            }
        }

        let yahoo_down = self.health.is_unhealthy(ProviderId::Yahoo);
        let banner = if yahoo_down && total_points > 0 {
            Some(fallback_banner(&contributing_labels))
        } else {
            None
        };

        let degraded = banner.is_some() || !warnings.is_empty() || any_stale_section;

        MarketOverview {
            sections,
            banner,
            as_of: UtcDateTime::now(),
            degraded,
            warnings,
        }
    }

    /// Walk one section's fallback chain, merging only the target symbols
    /// still missing, until the expected count is reached.
    async fn assemble_section(
        &self,
        section: SectionId,
        memo: &mut HashMap<ProviderId, Option<SectionPayload>>,
    ) -> MarketSection {
        let expected = expected_count(section);
        let mut by_symbol: HashMap<String, MarketPoint> = HashMap::new();
        let mut sources: Vec<ProviderId> = Vec::new();
        let mut used_live = false;
        let mut stale = false;

        for provider in provider_chain(section) {
            if by_symbol.len() >= expected {
                break;
            }

            let points = if provider.is_internal() {
                self.internal_points(section, *provider).await
            } else {
                self.ensure_fetched(*provider, memo).await;
                memo.get(provider)
                    .and_then(|payload| payload.as_ref())
                    .and_then(|payload| payload.get(&section))
                    .cloned()
                    .unwrap_or_default()
            };

            let mut contributed = false;
            for point in points {
                if by_symbol.contains_key(&point.symbol) {
                    continue;
                }
                if !is_section_target(section, &point.symbol) {
                    continue;
                }
                by_symbol.insert(point.symbol.clone(), point);
                contributed = true;
            }

            if contributed {
                sources.push(*provider);
                if provider.is_internal() {
                    stale = true;
                } else {
                    used_live = true;
                }
            }
        }

        let points = ordered_points(section, &by_symbol);
        let loaded = points.len();

        // Only a fully-live section is worth keeping: a merge that leaned on
        // cache or bootstrap points would re-save them under a fresher stamp.
        if loaded > 0 && used_live && !stale {
            let snapshot = StoredSectionSnapshot {
                saved_at: UtcDateTime::now(),
                source: sources.first().map(|p| p.label()).unwrap_or_default().to_owned(),
                points: points.clone(),
            };
            // Best effort: a failed save must not degrade the response.
            let _ = self.store.save_section(section, &snapshot).await;
        }

        let warning = if loaded == 0 {
            Some(format!(
                "No {section} data available from live providers or cache."
            ))
        } else if loaded < expected {
            Some(format!("Partial {section} coverage ({loaded}/{expected})."))
        } else {
            None
        };

        let freshest_as_of = points
            .iter()
            .filter_map(|point| point.as_of)
            .max_by_key(|as_of| as_of.unix());

        let source = sources
            .first()
            .map(|provider| provider.label().to_owned())
            .unwrap_or_else(|| "none".to_owned());

        MarketSection {
            id: section,
            label: section_label(section).to_owned(),
            points,
            section_meta: SectionMeta {
                source,
                sources,
                freshest_as_of,
                loaded,
                expected,
                stale,
                warning,
            },
        }
    }

    /// Points for the internal chain entries: last-known-good, the static
    /// rates snapshot, and bootstrap data.
    async fn internal_points(&self, section: SectionId, provider: ProviderId) -> Vec<MarketPoint> {
        match provider {
            ProviderId::Lkg => {
                let Ok(Some(snapshot)) = self.store.load_section(section).await else {
                    return Vec::new();
                };
                let age = UtcDateTime::now().seconds_since(snapshot.saved_at);
                if age > self.settings.market_lkg_ttl.as_secs() as i64 {
                    return Vec::new();
                }
                snapshot
                    .points
                    .into_iter()
                    .map(|mut point| {
                        point.source = format!("lkg:{}", point.source);
                        point
                    })
                    .collect()
            }
            ProviderId::RatesDefaults if self.settings.rates_defaults_enabled => {
                rates_default_points(UtcDateTime::now())
            }
            ProviderId::Bootstrap if self.settings.bootstrap_enabled => {
                bootstrap_points(section, UtcDateTime::now())
            }
            _ => Vec::new(),
        }
    }

    /// Fetch a live provider at most once per refresh cycle, recording the
    /// outcome in the health registry.
    async fn ensure_fetched(
        &self,
        provider: ProviderId,
        memo: &mut HashMap<ProviderId, Option<SectionPayload>>,
    ) {
        if memo.contains_key(&provider) {
            return;
        }
        if !self.health.call_allowed(provider) {
            memo.insert(provider, None);
            return;
        }
        match self.fetch_live(provider).await {
            Ok(payload) => {
                self.health.record_result(provider, true, None);
                memo.insert(provider, Some(payload));
            }
            Err(err) => {
                self.health.record_result(provider, false, Some(&err.to_string()));
                memo.insert(provider, None);
            }
        }
    }

    async fn fetch_live(&self, provider: ProviderId) -> Result<SectionPayload, CoreError> {
        match provider {
            ProviderId::Yahoo => self.yahoo.fetch_sections().await,
            ProviderId::Stooq => self.stooq.fetch_primary_sections().await,
            ProviderId::StooqProxy => self.stooq.fetch_proxy_sections().await,
            ProviderId::Frankfurter => self.fx.fetch_frankfurter().await,
            ProviderId::ExchangerateHost => self.fx.fetch_exchangerate_host().await,
            ProviderId::FredPublic => self.fred.fetch_public_rates().await,
            ProviderId::FredApi => self.fred.fetch_api_rates().await,
            ProviderId::Coingecko => self.coingecko.fetch_crypto().await,
            ProviderId::Awesomeapi
            | ProviderId::Lkg
            | ProviderId::RatesDefaults
            | ProviderId::Bootstrap => Err(CoreError::Storage(format!(
                "provider {provider} does not serve overview sections"
            ))),
        }
    }
}

fn is_section_target(section: SectionId, symbol: &str) -> bool {
    section_targets(section)
        .iter()
        .any(|(target, _, _)| *target == symbol)
}

/// Points reordered to the section's canonical target order.
fn ordered_points(section: SectionId, by_symbol: &HashMap<String, MarketPoint>) -> Vec<MarketPoint> {
    section_targets(section)
        .iter()
        .filter_map(|(symbol, _, _)| by_symbol.get(*symbol).cloned())
        .collect()
}

/// Banner shown when Yahoo is unhealthy but other sources still delivered.
fn fallback_banner(contributing_labels: &[&'static str]) -> String {
    let visible: Vec<&str> = contributing_labels
        .iter()
        .copied()
        .filter(|label| !BANNER_EXCLUDED_LABELS.contains(label))
        .collect();
    let joined = if visible.is_empty() {
        "fallback providers".to_owned()
    } else {
        visible.join("/")
    };
    format!("Yahoo down, serving from {joined}.")
}
