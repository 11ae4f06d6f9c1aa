//! Static section catalog: target symbols, fallback matrices, and the
//! bootstrap/default snapshots served when everything else fails.

use crate::{MarketPoint, ProviderId, SectionId, UtcDateTime};

/// One target slot in a section: (canonical symbol, display name, currency).
pub type SectionTarget = (&'static str, &'static str, Option<&'static str>);

pub const INDICES_TARGETS: [SectionTarget; 4] = [
    ("^GSPC", "S&P 500", Some("USD")),
    ("^DJI", "Dow Jones Industrial Average", Some("USD")),
    ("^IXIC", "Nasdaq Composite", Some("USD")),
    ("^RUT", "Russell 2000", Some("USD")),
];

pub const RATES_TARGETS: [SectionTarget; 3] = [
    ("^TNX", "US 10Y Treasury Yield", Some("PCT")),
    ("^FVX", "US 5Y Treasury Yield", Some("PCT")),
    ("^IRX", "US 13W Treasury Yield", Some("PCT")),
];

pub const FX_TARGETS: [SectionTarget; 3] = [
    ("EURUSD=X", "EUR/USD", Some("USD")),
    ("USDJPY=X", "USD/JPY", Some("JPY")),
    ("GBPUSD=X", "GBP/USD", Some("USD")),
];

pub const COMMODITIES_TARGETS: [SectionTarget; 4] = [
    ("CL=F", "WTI Crude Oil", Some("USD")),
    ("GC=F", "Gold", Some("USD")),
    ("SI=F", "Silver", Some("USD")),
    ("HG=F", "Copper", Some("USD")),
];

pub const CRYPTO_TARGETS: [SectionTarget; 3] = [
    ("BTC-USD", "Bitcoin", Some("USD")),
    ("ETH-USD", "Ethereum", Some("USD")),
    ("SOL-USD", "Solana", Some("USD")),
];

#[must_use]
pub fn section_targets(section: SectionId) -> &'static [SectionTarget] {
    match section {
        SectionId::Indices => &INDICES_TARGETS,
        SectionId::Rates => &RATES_TARGETS,
        SectionId::Fx => &FX_TARGETS,
        SectionId::Commodities => &COMMODITIES_TARGETS,
        SectionId::Crypto => &CRYPTO_TARGETS,
    }
}

#[must_use]
pub fn expected_count(section: SectionId) -> usize {
    section_targets(section).len()
}

#[must_use]
pub fn section_label(section: SectionId) -> &'static str {
    match section {
        SectionId::Indices => "Indices",
        SectionId::Rates => "Rates",
        SectionId::Fx => "FX",
        SectionId::Commodities => "Commodities",
        SectionId::Crypto => "Crypto",
    }
}

/// Ordered provider fallback chain per section.
#[must_use]
pub fn provider_chain(section: SectionId) -> &'static [ProviderId] {
    use ProviderId::{
        Bootstrap, Coingecko, ExchangerateHost, Frankfurter, FredApi, FredPublic, Lkg,
        RatesDefaults, Stooq, StooqProxy, Yahoo,
    };
    match section {
        SectionId::Indices => &[Stooq, StooqProxy, Yahoo, Lkg, Bootstrap],
        SectionId::Fx => &[Stooq, Frankfurter, ExchangerateHost, Yahoo, Lkg, Bootstrap],
        SectionId::Commodities => &[Stooq, StooqProxy, Yahoo, Lkg, Bootstrap],
        SectionId::Rates => &[FredPublic, FredApi, Lkg, RatesDefaults, Bootstrap],
        SectionId::Crypto => &[Coingecko, Yahoo, Lkg, Bootstrap],
    }
}

/// All symbols requested from Yahoo in one batch quote call.
#[must_use]
pub fn yahoo_symbols() -> Vec<(SectionId, &'static str, &'static str)> {
    let mut out = Vec::new();
    for section in SectionId::ALL {
        for (symbol, name, _) in section_targets(section) {
            out.push((section, *symbol, *name));
        }
    }
    out
}

const BOOTSTRAP_INDICES: [(&str, &str, f64, Option<&str>); 4] = [
    ("^GSPC", "S&P 500 (Bootstrap)", 5_980.0, Some("USD")),
    ("^DJI", "Dow Jones (Bootstrap)", 41_850.0, Some("USD")),
    ("^IXIC", "Nasdaq Composite (Bootstrap)", 18_950.0, Some("USD")),
    ("^RUT", "Russell 2000 (Bootstrap)", 2_065.0, Some("USD")),
];

const BOOTSTRAP_RATES: [(&str, &str, f64, Option<&str>); 3] = [
    ("^TNX", "US 10Y Treasury Yield (Bootstrap)", 4.12, Some("PCT")),
    ("^FVX", "US 5Y Treasury Yield (Bootstrap)", 3.90, Some("PCT")),
    ("^IRX", "US 13W Treasury Yield (Bootstrap)", 4.22, Some("PCT")),
];

const BOOTSTRAP_FX: [(&str, &str, f64, Option<&str>); 3] = [
    ("EURUSD=X", "EUR/USD (Bootstrap)", 1.0850, Some("USD")),
    ("USDJPY=X", "USD/JPY (Bootstrap)", 150.0, Some("JPY")),
    ("GBPUSD=X", "GBP/USD (Bootstrap)", 1.2680, Some("USD")),
];

const BOOTSTRAP_COMMODITIES: [(&str, &str, f64, Option<&str>); 4] = [
    ("CL=F", "WTI Crude Oil (Bootstrap)", 72.4, Some("USD")),
    ("GC=F", "Gold (Bootstrap)", 2_355.0, Some("USD")),
    ("SI=F", "Silver (Bootstrap)", 29.2, Some("USD")),
    ("HG=F", "Copper (Bootstrap)", 4.01, Some("USD")),
];

const BOOTSTRAP_CRYPTO: [(&str, &str, f64, Option<&str>); 3] = [
    ("BTC-USD", "Bitcoin (Bootstrap)", 64_000.0, Some("USD")),
    ("ETH-USD", "Ethereum (Bootstrap)", 3_200.0, Some("USD")),
    ("SOL-USD", "Solana (Bootstrap)", 120.0, Some("USD")),
];

const RATES_DEFAULT_SNAPSHOT: [(&str, &str, f64, Option<&str>); 3] = [
    ("^TNX", "US 10Y Treasury Yield (Default Snapshot)", 4.15, Some("PCT")),
    ("^FVX", "US 5Y Treasury Yield (Default Snapshot)", 3.95, Some("PCT")),
    ("^IRX", "US 13W Treasury Yield (Default Snapshot)", 4.30, Some("PCT")),
];

fn snapshot_points(
    rows: &[(&str, &str, f64, Option<&str>)],
    source: &str,
    as_of: UtcDateTime,
) -> Vec<MarketPoint> {
    rows.iter()
        .map(|(symbol, name, price, currency)| MarketPoint {
            symbol: (*symbol).to_owned(),
            name: (*name).to_owned(),
            price: *price,
            change: Some(0.0),
            change_percent: Some(0.0),
            currency: currency.map(str::to_owned),
            source: source.to_owned(),
            as_of: Some(as_of),
        })
        .collect()
}

/// Static bootstrap points for one section.
#[must_use]
pub fn bootstrap_points(section: SectionId, as_of: UtcDateTime) -> Vec<MarketPoint> {
    let rows: &[(&str, &str, f64, Option<&str>)] = match section {
        SectionId::Indices => &BOOTSTRAP_INDICES,
        SectionId::Rates => &BOOTSTRAP_RATES,
        SectionId::Fx => &BOOTSTRAP_FX,
        SectionId::Commodities => &BOOTSTRAP_COMMODITIES,
        SectionId::Crypto => &BOOTSTRAP_CRYPTO,
    };
    snapshot_points(rows, "bootstrap", as_of)
}

/// Static default treasury-yield snapshot.
#[must_use]
pub fn rates_default_points(as_of: UtcDateTime) -> Vec<MarketPoint> {
    snapshot_points(&RATES_DEFAULT_SNAPSHOT, "rates-default", as_of)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_section_has_a_chain_ending_in_bootstrap() {
        for section in SectionId::ALL {
            let chain = provider_chain(section);
            assert!(!chain.is_empty());
            assert_eq!(*chain.last().expect("non-empty"), ProviderId::Bootstrap);
            assert!(chain.contains(&ProviderId::Lkg));
        }
    }

    #[test]
    fn bootstrap_covers_all_targets() {
        let now = UtcDateTime::now();
        for section in SectionId::ALL {
            let points = bootstrap_points(section, now);
            assert_eq!(points.len(), expected_count(section));
            for (point, (symbol, _, _)) in points.iter().zip(section_targets(section)) {
                assert_eq!(point.symbol, *symbol);
            }
        }
    }

    #[test]
    fn yahoo_symbol_batch_spans_all_sections() {
        let symbols = yahoo_symbols();
        assert_eq!(
            symbols.len(),
            SectionId::ALL.iter().map(|s| expected_count(*s)).sum::<usize>()
        );
    }
}
