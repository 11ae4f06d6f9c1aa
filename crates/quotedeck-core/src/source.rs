use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Canonical provider identifiers used in section metadata and health tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    Yahoo,
    Stooq,
    StooqProxy,
    Frankfurter,
    ExchangerateHost,
    FredPublic,
    FredApi,
    Coingecko,
    Awesomeapi,
    Lkg,
    RatesDefaults,
    Bootstrap,
}

impl ProviderId {
    pub const ALL: [Self; 12] = [
        Self::Yahoo,
        Self::Stooq,
        Self::StooqProxy,
        Self::Frankfurter,
        Self::ExchangerateHost,
        Self::FredPublic,
        Self::FredApi,
        Self::Coingecko,
        Self::Awesomeapi,
        Self::Lkg,
        Self::RatesDefaults,
        Self::Bootstrap,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Yahoo => "yahoo",
            Self::Stooq => "stooq",
            Self::StooqProxy => "stooq_proxy",
            Self::Frankfurter => "frankfurter",
            Self::ExchangerateHost => "exchangerate_host",
            Self::FredPublic => "fred_public",
            Self::FredApi => "fred_api",
            Self::Coingecko => "coingecko",
            Self::Awesomeapi => "awesomeapi",
            Self::Lkg => "lkg",
            Self::RatesDefaults => "rates_defaults",
            Self::Bootstrap => "bootstrap",
        }
    }

    /// Human-readable label used in banners and section metadata.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Yahoo => "Yahoo",
            Self::Stooq => "Stooq",
            Self::StooqProxy => "Stooq Proxy",
            Self::Frankfurter => "Frankfurter",
            Self::ExchangerateHost => "ExchangeRate.host",
            Self::FredPublic => "FRED Public",
            Self::FredApi => "FRED API",
            Self::Coingecko => "CoinGecko",
            Self::Awesomeapi => "AwesomeAPI",
            Self::Lkg => "Last Known Good",
            Self::RatesDefaults => "Default Snapshot",
            Self::Bootstrap => "Bootstrap Snapshot",
        }
    }

    /// Live providers hit the network and participate in health tracking.
    pub const fn is_live(self) -> bool {
        !self.is_internal()
    }

    /// Internal providers serve locally-held data and never trip health state.
    pub const fn is_internal(self) -> bool {
        matches!(self, Self::Lkg | Self::RatesDefaults | Self::Bootstrap)
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "yahoo" => Ok(Self::Yahoo),
            "stooq" => Ok(Self::Stooq),
            "stooq_proxy" => Ok(Self::StooqProxy),
            "frankfurter" => Ok(Self::Frankfurter),
            "exchangerate_host" => Ok(Self::ExchangerateHost),
            "fred_public" => Ok(Self::FredPublic),
            "fred_api" => Ok(Self::FredApi),
            "coingecko" => Ok(Self::Coingecko),
            "awesomeapi" => Ok(Self::Awesomeapi),
            "lkg" => Ok(Self::Lkg),
            "rates_defaults" => Ok(Self::RatesDefaults),
            "bootstrap" => Ok(Self::Bootstrap),
            other => Err(ValidationError::InvalidSource {
                value: other.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_strings() {
        for provider in ProviderId::ALL {
            let parsed: ProviderId = provider.as_str().parse().expect("parse back");
            assert_eq!(parsed, provider);
        }
    }

    #[test]
    fn internal_providers_are_not_live() {
        assert!(ProviderId::Yahoo.is_live());
        assert!(ProviderId::Stooq.is_live());
        assert!(!ProviderId::Lkg.is_live());
        assert!(!ProviderId::Bootstrap.is_live());
        assert!(!ProviderId::RatesDefaults.is_live());
    }
}
