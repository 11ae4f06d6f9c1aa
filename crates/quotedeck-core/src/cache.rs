//! In-memory cache tiers.
//!
//! The aggregation services read through three tiers keyed by prefix:
//! a short-TTL `ui:` tier served straight to callers, an `upstream:` tier
//! holding `(fetchedAt, payload)` envelopes that decouple client traffic from
//! live provider traffic, and a long-TTL `stale:` tier used as the last
//! in-process fallback. Entries expire lazily on read.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::UtcDateTime;

#[derive(Debug, Clone)]
struct CacheEntry {
    body: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
}

/// Async shared in-memory cache with per-entry TTLs.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    inner: Arc<RwLock<CacheInner>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        {
            let inner = self.inner.read().await;
            let entry = inner.entries.get(key)?;
            if entry.expires_at > Instant::now() {
                return Some(entry.body.clone());
            }
        }
        // Entry expired; drop it under the write lock.
        let mut inner = self.inner.write().await;
        if let Some(entry) = inner.entries.get(key) {
            if entry.expires_at > Instant::now() {
                return Some(entry.body.clone());
            }
            inner.entries.remove(key);
        }
        None
    }

    pub async fn put(&self, key: impl Into<String>, body: impl Into<String>, ttl: Duration) {
        let mut inner = self.inner.write().await;
        inner.entries.insert(
            key.into(),
            CacheEntry {
                body: body.into(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub async fn remove(&self, key: &str) {
        let mut inner = self.inner.write().await;
        inner.entries.remove(key);
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.entries.clear();
    }

    pub async fn len(&self) -> usize {
        let inner = self.inner.read().await;
        inner.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// JSON convenience layer over [`MemoryCache`].
///
/// The cache is best-effort: malformed stored payloads read as misses and
/// unserializable values are silently skipped, so the cache can never become
/// a failure source for the services above it.
#[derive(Debug, Clone, Default)]
pub struct CacheClient {
    cache: MemoryCache,
}

impl CacheClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let body = self.cache.get(key).await?;
        serde_json::from_str(&body).ok()
    }

    pub async fn put_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        if let Ok(body) = serde_json::to_string(value) {
            self.cache.put(key, body, ttl).await;
        }
    }

    pub async fn remove(&self, key: &str) {
        self.cache.remove(key).await;
    }

    pub async fn clear(&self) {
        self.cache.clear().await;
    }
}

/// Upstream-tier envelope recording when a payload was fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamEnvelope<T> {
    pub fetched_at: UtcDateTime,
    pub payload: T,
}

impl<T> UpstreamEnvelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            fetched_at: UtcDateTime::now(),
            payload,
        }
    }

    /// Whole seconds since the payload was fetched.
    #[must_use]
    pub fn age_seconds(&self) -> i64 {
        UtcDateTime::now().seconds_since(self.fetched_at)
    }

    /// Whether the payload is old enough to warrant a live refresh.
    #[must_use]
    pub fn needs_refresh(&self, refresh_interval: Duration) -> bool {
        refresh_interval.is_zero() || self.age_seconds() >= refresh_interval.as_secs() as i64
    }
}

/// Key builders for the cache tiers.
pub mod keys {
    #[must_use]
    pub fn ui_intraday(cache_key: &str) -> String {
        format!("market:intraday:{cache_key}:ui")
    }

    #[must_use]
    pub fn upstream_intraday(cache_key: &str) -> String {
        format!("market:intraday:{cache_key}:upstream")
    }

    #[must_use]
    pub fn overview_fresh() -> String {
        "market:overview:fresh".to_owned()
    }

    #[must_use]
    pub fn overview_upstream() -> String {
        "market:overview:upstream".to_owned()
    }

    #[must_use]
    pub fn overview_stale() -> String {
        "market:overview:stale".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entries_expire_on_read() {
        let cache = MemoryCache::new();
        cache.put("k", "v", Duration::from_millis(5)).await;
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(cache.get("k").await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn json_round_trip_and_malformed_miss() {
        let client = CacheClient::new();
        client
            .put_json("nums", &vec![1_u32, 2, 3], Duration::from_secs(5))
            .await;
        let back: Option<Vec<u32>> = client.get_json("nums").await;
        assert_eq!(back, Some(vec![1, 2, 3]));

        // Stored string does not parse as the requested type.
        let miss: Option<u64> = client.get_json("nums").await;
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn upstream_envelope_reports_age() {
        let envelope = UpstreamEnvelope::new(42_u32);
        assert!(envelope.age_seconds() <= 1);
        assert!(!envelope.needs_refresh(Duration::from_secs(8)));
        assert!(envelope.needs_refresh(Duration::ZERO));
    }

    #[test]
    fn tier_keys_embed_symbol_cache_key() {
        assert_eq!(keys::ui_intraday("EUR_USD"), "market:intraday:EUR_USD:ui");
        assert_eq!(
            keys::upstream_intraday("BTC_USD"),
            "market:intraday:BTC_USD:upstream"
        );
    }
}
