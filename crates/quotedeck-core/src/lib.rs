//! Core engine for quotedeck.
//!
//! This crate contains:
//! - Canonical domain models, symbol normalization, and validation
//! - Provider identifiers, health tracking, and throttling
//! - The provider adapters and their retrying HTTP fetch layer
//! - The cache-tiered overview and intraday aggregation services
//! - Price alert evaluation

pub mod alerts;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod health;
pub mod http_client;
pub mod intraday;
pub mod overview;
pub mod providers;
pub mod sections;
pub mod source;
pub mod throttle;

pub use alerts::{
    compute_trigger_state, evaluate_alert, validate_cooldown, validate_event_limit,
    validate_threshold, AlertCondition, AlertEvaluation, AlertTriggerEvent, PriceAlert,
    PriceSnapshot, TriggerState, DEFAULT_COOLDOWN_SECONDS, MAX_COOLDOWN_SECONDS, MAX_EVENT_LIMIT,
};
pub use cache::{CacheClient, MemoryCache, UpstreamEnvelope};
pub use config::Settings;
pub use domain::{
    normalize_symbol, InstrumentKind, IntradayPoint, IntradaySeries, MarketOverview, MarketPoint,
    MarketSection, SectionId, SectionMeta, SymbolDescriptor, UtcDateTime,
};
pub use error::{CoreError, FetchError, ValidationError};
pub use fetch::{Fetcher, RetryPolicy};
pub use health::{HealthPolicy, HealthStatus, ProviderHealthRegistry, ProviderState};
pub use http_client::{
    HttpClient, HttpError, HttpRequest, HttpResponse, NoopHttpClient, ReqwestHttpClient,
};
pub use intraday::IntradayService;
pub use overview::{
    MemorySnapshotStore, OverviewService, ProviderStatusReport, SectionChain, SnapshotStore,
    StoredSectionSnapshot,
};
pub use source::ProviderId;
pub use throttle::RateGate;
