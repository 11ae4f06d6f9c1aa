//! Provider health registry.
//!
//! One [`ProviderState`] per provider, mutated under a single mutex. This is
//! a flat circuit breaker: closed (`ok`/`unknown`) opens into `cooldown` after
//! a threshold of consecutive failures, probes again once the cooldown timer
//! lapses, and closes on the next success. Internal pseudo-providers (lkg,
//! rates_defaults, bootstrap) never trip; a provider whose required API key is
//! absent is permanently `disabled`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::{ProviderId, Settings};

/// Health status of one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Unknown,
    Ok,
    Degraded,
    Cooldown,
    Disabled,
    Internal,
}

/// Per-provider failure thresholds and cooldown timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthPolicy {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

#[derive(Debug, Clone)]
struct ProviderStateInner {
    status: HealthStatus,
    consecutive_failures: u32,
    cooldown_until: Option<Instant>,
    last_error: Option<String>,
}

/// Snapshot of one provider's health, for status surfaces.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderState {
    pub provider: ProviderId,
    pub label: String,
    pub status: HealthStatus,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_remaining_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Tracks health for every provider behind one mutex.
pub struct ProviderHealthRegistry {
    states: Mutex<HashMap<ProviderId, ProviderStateInner>>,
    policies: HashMap<ProviderId, HealthPolicy>,
}

impl ProviderHealthRegistry {
    /// Build a registry from settings. `fred_api` starts disabled when no API
    /// key is configured; internal providers start (and stay) `Internal`.
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        let default_policy = HealthPolicy {
            failure_threshold: settings.provider_failure_threshold,
            cooldown: settings.provider_cooldown,
        };
        let yahoo_policy = HealthPolicy {
            failure_threshold: settings.yahoo_failure_threshold,
            cooldown: settings.yahoo_cooldown,
        };

        let mut policies = HashMap::new();
        let mut states = HashMap::new();
        for provider in ProviderId::ALL {
            let policy = if provider == ProviderId::Yahoo {
                yahoo_policy
            } else {
                default_policy
            };
            policies.insert(provider, policy);

            let status = if provider.is_internal() {
                HealthStatus::Internal
            } else if provider == ProviderId::FredApi && settings.fred_api_key.is_none() {
                HealthStatus::Disabled
            } else {
                HealthStatus::Unknown
            };
            states.insert(
                provider,
                ProviderStateInner {
                    status,
                    consecutive_failures: 0,
                    cooldown_until: None,
                    last_error: None,
                },
            );
        }

        Self {
            states: Mutex::new(states),
            policies,
        }
    }

    /// Whether a call to `provider` should be attempted right now.
    ///
    /// An elapsed cooldown clears the failure count and resets the provider to
    /// `Unknown` so the next call acts as the half-open probe.
    pub fn call_allowed(&self, provider: ProviderId) -> bool {
        let mut states = self
            .states
            .lock()
            .expect("provider health registry lock is not poisoned");
        let Some(state) = states.get_mut(&provider) else {
            return false;
        };

        match state.status {
            HealthStatus::Internal => true,
            HealthStatus::Disabled => false,
            _ => match state.cooldown_until {
                Some(until) if Instant::now() < until => {
                    state.status = HealthStatus::Cooldown;
                    false
                }
                Some(_) => {
                    state.cooldown_until = None;
                    state.consecutive_failures = 0;
                    state.status = HealthStatus::Unknown;
                    true
                }
                None => true,
            },
        }
    }

    /// Record the outcome of a live provider call.
    pub fn record_result(&self, provider: ProviderId, success: bool, error: Option<&str>) {
        let mut states = self
            .states
            .lock()
            .expect("provider health registry lock is not poisoned");
        let Some(state) = states.get_mut(&provider) else {
            return;
        };
        if matches!(state.status, HealthStatus::Internal | HealthStatus::Disabled) {
            return;
        }

        if success {
            state.consecutive_failures = 0;
            state.cooldown_until = None;
            state.last_error = None;
            state.status = HealthStatus::Ok;
            return;
        }

        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_error = error.map(str::to_owned);

        let policy = self.policies.get(&provider).copied().unwrap_or(HealthPolicy {
            failure_threshold: 3,
            cooldown: Duration::from_secs(180),
        });
        if state.consecutive_failures >= policy.failure_threshold {
            state.status = HealthStatus::Cooldown;
            state.cooldown_until = Some(Instant::now() + policy.cooldown);
        } else {
            state.status = HealthStatus::Degraded;
        }
    }

    /// Current status of one provider.
    pub fn status(&self, provider: ProviderId) -> HealthStatus {
        let states = self
            .states
            .lock()
            .expect("provider health registry lock is not poisoned");
        states
            .get(&provider)
            .map_or(HealthStatus::Unknown, |state| state.status)
    }

    /// Whether the provider is currently degraded or cooling down.
    pub fn is_unhealthy(&self, provider: ProviderId) -> bool {
        matches!(
            self.status(provider),
            HealthStatus::Degraded | HealthStatus::Cooldown
        )
    }

    /// Cloneable view of every provider's state, for status surfaces.
    pub fn snapshot(&self) -> Vec<ProviderState> {
        let states = self
            .states
            .lock()
            .expect("provider health registry lock is not poisoned");
        let now = Instant::now();
        let mut snapshot: Vec<ProviderState> = ProviderId::ALL
            .iter()
            .filter_map(|provider| {
                let state = states.get(provider)?;
                let cooldown_remaining_seconds = state.cooldown_until.and_then(|until| {
                    until
                        .checked_duration_since(now)
                        .map(|remaining| remaining.as_secs())
                });
                Some(ProviderState {
                    provider: *provider,
                    label: provider.label().to_owned(),
                    status: state.status,
                    consecutive_failures: state.consecutive_failures,
                    cooldown_remaining_seconds,
                    last_error: state.last_error.clone(),
                })
            })
            .collect();
        snapshot.sort_by_key(|state| state.provider.as_str());
        snapshot
    }
}
