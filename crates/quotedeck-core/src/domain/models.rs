use serde::{Deserialize, Serialize};

use crate::{ProviderId, UtcDateTime, ValidationError};

/// Canonical instrument class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    Equity,
    Fx,
    Crypto,
    Index,
    Rate,
    Commodity,
}

impl InstrumentKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Equity => "equity",
            Self::Fx => "fx",
            Self::Crypto => "crypto",
            Self::Index => "index",
            Self::Rate => "rate",
            Self::Commodity => "commodity",
        }
    }
}

impl std::str::FromStr for InstrumentKind {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "equity" => Ok(Self::Equity),
            "fx" => Ok(Self::Fx),
            "crypto" => Ok(Self::Crypto),
            "index" => Ok(Self::Index),
            "rate" => Ok(Self::Rate),
            "commodity" => Ok(Self::Commodity),
            other => Err(ValidationError::InvalidSource {
                value: other.to_owned(),
            }),
        }
    }
}

/// The five market-overview sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionId {
    Indices,
    Rates,
    Fx,
    Commodities,
    Crypto,
}

impl SectionId {
    pub const ALL: [Self; 5] = [
        Self::Indices,
        Self::Rates,
        Self::Fx,
        Self::Commodities,
        Self::Crypto,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Indices => "indices",
            Self::Rates => "rates",
            Self::Fx => "fx",
            Self::Commodities => "commodities",
            Self::Crypto => "crypto",
        }
    }
}

impl std::str::FromStr for SectionId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "indices" => Ok(Self::Indices),
            "rates" => Ok(Self::Rates),
            "fx" => Ok(Self::Fx),
            "commodities" => Ok(Self::Commodities),
            "crypto" => Ok(Self::Crypto),
            other => Err(ValidationError::InvalidSection {
                value: other.to_owned(),
            }),
        }
    }
}

impl std::fmt::Display for SectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One quote inside a market-overview section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketPoint {
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub change: Option<f64>,
    pub change_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub as_of: Option<UtcDateTime>,
}

/// Per-section metadata describing how the section was filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionMeta {
    /// Label of the first provider that contributed points.
    pub source: String,
    /// All contributing providers, in fallback-chain order.
    pub sources: Vec<ProviderId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freshest_as_of: Option<UtcDateTime>,
    pub loaded: usize,
    pub expected: usize,
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// A filled market-overview section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSection {
    pub id: SectionId,
    pub label: String,
    pub points: Vec<MarketPoint>,
    pub section_meta: SectionMeta,
}

/// The full five-section overview snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketOverview {
    pub sections: Vec<MarketSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
    pub as_of: UtcDateTime,
    /// True when any banner, warning, or stale section degraded the snapshot.
    #[serde(default)]
    pub degraded: bool,
    pub warnings: Vec<String>,
}

/// A single intraday tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntradayPoint {
    /// Unix timestamp in whole seconds.
    pub time: i64,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

/// Intraday series for one symbol, with provenance and staleness flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntradaySeries {
    pub symbol: String,
    pub display_symbol: String,
    pub instrument_type: InstrumentKind,
    pub source: String,
    pub as_of: UtcDateTime,
    pub last_price: f64,
    pub change: f64,
    pub change_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freshness_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_refresh_interval_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_refresh_interval_seconds: Option<u64>,
    pub warnings: Vec<String>,
    pub points: Vec<IntradayPoint>,
}
