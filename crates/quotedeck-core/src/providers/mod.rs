//! Provider adapters.
//!
//! Each provider module pairs an async fetch (throttled, retried) with a pure
//! parse function unit-tested against fixture payloads. Section providers
//! return a [`SectionPayload`]; intraday providers return an
//! [`crate::IntradaySeries`].

use std::collections::HashMap;

use crate::{CoreError, FetchError, MarketPoint, SectionId};

pub mod awesomeapi;
pub mod coingecko;
pub mod fred;
pub mod fx;
pub mod stooq;
pub mod yahoo;

/// Points a provider produced, grouped by section.
pub type SectionPayload = HashMap<SectionId, Vec<MarketPoint>>;

#[must_use]
pub fn empty_payload() -> SectionPayload {
    SectionId::ALL
        .iter()
        .map(|section| (*section, Vec::new()))
        .collect()
}

#[must_use]
pub fn has_any_payload(payload: &SectionPayload) -> bool {
    payload.values().any(|points| !points.is_empty())
}

/// Parse a numeric field, treating provider placeholder values as missing.
#[must_use]
pub fn safe_float(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if matches!(trimmed, "" | "N/D" | "." | "null" | "None") {
        return None;
    }
    trimmed.parse().ok()
}

/// A structurally-invalid payload is reported like a failed fetch.
pub(crate) fn malformed(provider: &'static str, url: &str, detail: &str) -> CoreError {
    CoreError::ProviderFetch {
        provider,
        source: FetchError {
            url: url.to_owned(),
            attempts: 1,
            status_code: None,
            detail: Some(detail.to_owned()),
        },
    }
}
