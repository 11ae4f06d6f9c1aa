//! Runtime settings with conservative defaults.
//!
//! Every tunable lives here so services receive an explicit [`Settings`]
//! instead of reaching for globals. `Settings::from_env` applies
//! `QUOTEDECK_`-prefixed overrides on top of the defaults.

use std::time::Duration;

/// All runtime tunables for the aggregation and intraday services.
#[derive(Debug, Clone)]
pub struct Settings {
    /// TTL of the fresh (UI) cache tier.
    pub market_cache_ttl: Duration,
    /// Age at which an upstream snapshot is refreshed.
    pub market_upstream_refresh: Duration,
    /// FX pairs refresh more aggressively than other instruments.
    pub market_fx_upstream_refresh: Duration,
    /// TTL of the stale fallback tier.
    pub market_stale_ttl: Duration,
    /// TTL applied when loading last-known-good snapshots.
    pub market_lkg_ttl: Duration,

    pub bootstrap_enabled: bool,
    pub rates_defaults_enabled: bool,

    /// Consecutive failures before a live provider enters cooldown.
    pub provider_failure_threshold: u32,
    pub provider_cooldown: Duration,
    /// Yahoo trips faster and cools longer than the rest.
    pub yahoo_failure_threshold: u32,
    pub yahoo_cooldown: Duration,

    pub yahoo_timeout: Duration,
    pub yahoo_max_retries: u32,
    pub yahoo_user_agent: String,
    pub yahoo_accept_language: String,
    /// Quote endpoints tried in order (query1, then query2).
    pub yahoo_quote_endpoints: Vec<String>,

    /// Per-provider request budgets, expressed as requests per minute.
    pub yahoo_rate_per_minute: u32,
    pub stooq_rate_per_minute: u32,
    pub fx_rate_per_minute: u32,
    pub coingecko_rate_per_minute: u32,
    pub fred_rate_per_minute: u32,
    pub intraday_rate_per_minute: u32,

    pub coingecko_timeout: Duration,

    /// Intraday upstream refresh floors per source.
    pub yahoo_chart_refresh: Duration,
    pub awesomeapi_refresh: Duration,
    pub stooq_intraday_refresh: Duration,

    pub max_intraday_points: usize,

    /// Optional FRED API key; `fred_api` stays disabled without one.
    pub fred_api_key: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            market_cache_ttl: Duration::from_secs(2),
            market_upstream_refresh: Duration::from_secs(8),
            market_fx_upstream_refresh: Duration::from_secs(8),
            market_stale_ttl: Duration::from_secs(300),
            market_lkg_ttl: Duration::from_secs(604_800),
            bootstrap_enabled: true,
            rates_defaults_enabled: true,
            provider_failure_threshold: 3,
            provider_cooldown: Duration::from_secs(180),
            yahoo_failure_threshold: 2,
            yahoo_cooldown: Duration::from_secs(300),
            yahoo_timeout: Duration::from_secs(8),
            yahoo_max_retries: 2,
            yahoo_user_agent: concat!(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 ",
                "(KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36"
            )
            .to_owned(),
            yahoo_accept_language: "en-US,en;q=0.9".to_owned(),
            yahoo_quote_endpoints: vec![
                "https://query1.finance.yahoo.com/v7/finance/quote".to_owned(),
                "https://query2.finance.yahoo.com/v7/finance/quote".to_owned(),
            ],
            yahoo_rate_per_minute: 40,
            stooq_rate_per_minute: 30,
            fx_rate_per_minute: 30,
            coingecko_rate_per_minute: 20,
            fred_rate_per_minute: 30,
            intraday_rate_per_minute: 40,
            coingecko_timeout: Duration::from_secs(8),
            yahoo_chart_refresh: Duration::from_secs(300),
            awesomeapi_refresh: Duration::from_secs(60),
            stooq_intraday_refresh: Duration::from_secs(900),
            max_intraday_points: 240,
            fred_api_key: None,
        }
    }
}

impl Settings {
    /// Build settings from the environment, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Some(secs) = env_u64("QUOTEDECK_MARKET_CACHE_TTL_SECONDS") {
            settings.market_cache_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("QUOTEDECK_MARKET_UPSTREAM_REFRESH_SECONDS") {
            settings.market_upstream_refresh = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("QUOTEDECK_MARKET_FX_UPSTREAM_REFRESH_SECONDS") {
            settings.market_fx_upstream_refresh = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("QUOTEDECK_MARKET_STALE_TTL_SECONDS") {
            settings.market_stale_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("QUOTEDECK_MARKET_LKG_TTL_SECONDS") {
            settings.market_lkg_ttl = Duration::from_secs(secs);
        }
        if let Some(flag) = env_bool("QUOTEDECK_BOOTSTRAP_ENABLED") {
            settings.bootstrap_enabled = flag;
        }
        if let Some(flag) = env_bool("QUOTEDECK_RATES_DEFAULTS_ENABLED") {
            settings.rates_defaults_enabled = flag;
        }
        if let Some(n) = env_u64("QUOTEDECK_PROVIDER_FAILURE_THRESHOLD") {
            settings.provider_failure_threshold = n as u32;
        }
        if let Some(secs) = env_u64("QUOTEDECK_PROVIDER_COOLDOWN_SECONDS") {
            settings.provider_cooldown = Duration::from_secs(secs);
        }
        if let Some(n) = env_u64("QUOTEDECK_YAHOO_FAILURE_THRESHOLD") {
            settings.yahoo_failure_threshold = n as u32;
        }
        if let Some(secs) = env_u64("QUOTEDECK_YAHOO_COOLDOWN_SECONDS") {
            settings.yahoo_cooldown = Duration::from_secs(secs);
        }
        if let Ok(key) = std::env::var("QUOTEDECK_FRED_API_KEY") {
            let key = key.trim().to_owned();
            if !key.is_empty() {
                settings.fred_api_key = Some(key);
            }
        }

        settings
    }

    /// Upstream refresh floor for a given instrument kind.
    #[must_use]
    pub fn upstream_refresh_for(&self, is_fx: bool) -> Duration {
        if is_fx {
            self.market_fx_upstream_refresh
        } else {
            self.market_upstream_refresh
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.trim().parse().ok()
}

fn env_bool(name: &str) -> Option<bool> {
    match std::env::var(name).ok()?.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
