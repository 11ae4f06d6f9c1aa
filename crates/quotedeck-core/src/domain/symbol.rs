//! Symbol normalization.
//!
//! Accepts the loose spellings users and upstream feeds produce (`EUR/USD`,
//! `EURUSD=X`, `EURUSD Curncy`, `BTCUSD`, `BRK.B`, `^GSPC`) and resolves each
//! to one canonical [`SymbolDescriptor`]. Normalization is idempotent:
//! feeding a canonical symbol back in yields the same descriptor.

use serde::{Deserialize, Serialize};

use crate::{CoreError, InstrumentKind};

const MAX_RAW_LEN: usize = 32;

/// Fiat currencies recognized in FX pair detection.
pub const FIAT_CODES: [&str; 14] = [
    "USD", "EUR", "JPY", "GBP", "CHF", "CAD", "AUD", "NZD", "BRL", "CNY", "HKD", "SEK", "NOK",
    "MXN",
];

/// Crypto bases recognized in pair detection.
pub const CRYPTO_CODES: [&str; 10] = [
    "BTC", "ETH", "SOL", "XRP", "DOGE", "BNB", "ADA", "AVAX", "DOT", "LTC",
];

/// Index symbols with a dedicated Stooq spelling.
const INDEX_TO_STOOQ: [(&str, &str); 4] = [
    ("^GSPC", "^spx"),
    ("^DJI", "^dji"),
    ("^IXIC", "^ndq"),
    ("^RUT", "^rut"),
];

/// FX pairs quoted upside-down by some feeds.
const FX_ALIASES: [(&str, &str); 1] = [("BRLUSD", "USDBRL")];

/// A normalized symbol with per-provider spellings resolved up front.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolDescriptor {
    /// Canonical form, e.g. `EURUSD`, `BTC-USD`, `^GSPC`, `BRK.B`.
    pub canonical: String,
    /// Spelling sent to Yahoo endpoints, e.g. `EURUSD=X`, `BRK-B`.
    pub provider_symbol: String,
    /// Human-facing form, e.g. `EUR/USD`, `BTC/USD`.
    pub display_symbol: String,
    pub kind: InstrumentKind,
}

impl SymbolDescriptor {
    /// Cache key: canonical with non-alphanumerics collapsed to underscores.
    #[must_use]
    pub fn cache_key(&self) -> String {
        let mut out = String::with_capacity(self.canonical.len());
        let mut last_was_sep = false;
        for ch in self.canonical.chars() {
            if ch.is_ascii_alphanumeric() {
                out.push(ch.to_ascii_uppercase());
                last_was_sep = false;
            } else if !last_was_sep {
                out.push('_');
                last_was_sep = true;
            }
        }
        let trimmed = out.trim_matches('_');
        if trimmed.is_empty() {
            "SYMBOL".to_owned()
        } else {
            trimmed.to_owned()
        }
    }

    /// FX legs as (base, quote) when this is an FX pair.
    #[must_use]
    pub fn fx_legs(&self) -> Option<(&str, &str)> {
        if self.kind != InstrumentKind::Fx || self.canonical.len() != 6 {
            return None;
        }
        Some((&self.canonical[..3], &self.canonical[3..]))
    }

    /// Stooq spelling for this instrument, when one exists.
    #[must_use]
    pub fn stooq_symbol(&self) -> Option<String> {
        if let Some((_, mapped)) = INDEX_TO_STOOQ
            .iter()
            .find(|(canonical, _)| *canonical == self.canonical)
        {
            return Some((*mapped).to_owned());
        }

        match self.kind {
            InstrumentKind::Fx => {
                let fx: String = self
                    .canonical
                    .chars()
                    .filter(|ch| ch.is_ascii_alphabetic())
                    .collect();
                if fx.len() == 6 {
                    Some(fx.to_ascii_lowercase())
                } else {
                    None
                }
            }
            InstrumentKind::Equity => {
                let symbol: String = self
                    .canonical
                    .chars()
                    .filter(|ch| *ch != '^')
                    .map(|ch| if ch == '.' { '-' } else { ch.to_ascii_lowercase() })
                    .collect();
                if symbol.is_empty() {
                    None
                } else if symbol.contains(".us") {
                    Some(symbol)
                } else {
                    Some(format!("{symbol}.us"))
                }
            }
            _ => None,
        }
    }

    /// AwesomeAPI pair spelling (`EUR-USD`) for FX symbols.
    #[must_use]
    pub fn awesomeapi_pair(&self) -> Option<String> {
        let (base, quote) = self.fx_legs()?;
        Some(format!("{base}-{quote}"))
    }
}

/// Normalize a raw user- or feed-provided symbol.
///
/// # Errors
/// Returns [`CoreError::InvalidSymbolFormat`] when the input is empty, too
/// long, or matches no supported instrument format.
pub fn normalize_symbol(raw_symbol: &str) -> Result<SymbolDescriptor, CoreError> {
    let invalid = || CoreError::InvalidSymbolFormat {
        raw: raw_symbol.to_owned(),
    };

    let mut raw: String = raw_symbol
        .trim()
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .map(|ch| ch.to_ascii_uppercase())
        .collect();

    if raw.is_empty() {
        return Err(invalid());
    }
    if raw.len() > MAX_RAW_LEN {
        return Err(invalid());
    }

    // Bloomberg-style FX: EURUSD CURNCY / EURUSDCURRENCY (whitespace already stripped).
    for suffix in ["CURNCY", "CURRENCY"] {
        if let Some(stripped) = raw.strip_suffix(suffix) {
            if stripped.len() == 6 && stripped.bytes().all(|b| b.is_ascii_uppercase()) {
                raw = stripped.to_owned();
                break;
            }
        }
    }

    if let Some(descriptor) = match_fx_with_separator(&raw) {
        return Ok(descriptor);
    }

    if let Some(descriptor) = match_yahoo_fx(&raw) {
        return Ok(descriptor);
    }

    if raw.len() == 6 && raw.bytes().all(|b| b.is_ascii_uppercase()) {
        let base = &raw[..3];
        let quote = &raw[3..];
        if CRYPTO_CODES.contains(&base) && quote == "USD" {
            return Ok(crypto_descriptor(base, quote));
        }
        if FIAT_CODES.contains(&base) && FIAT_CODES.contains(&quote) {
            return Ok(fx_descriptor(base, quote));
        }
    }

    if let Some(descriptor) = match_dashed_pair(&raw) {
        return Ok(descriptor);
    }

    if let Some(descriptor) = match_equity_or_index(&raw) {
        return Ok(descriptor);
    }

    Err(invalid())
}

/// `XXX/YYY` or `XXX-YYY` with two 3-letter legs.
fn match_fx_with_separator(raw: &str) -> Option<SymbolDescriptor> {
    if raw.len() != 7 {
        return None;
    }
    let bytes = raw.as_bytes();
    if bytes[3] != b'/' && bytes[3] != b'-' {
        return None;
    }
    let base = &raw[..3];
    let quote = &raw[4..];
    if !is_alpha(base) || !is_alpha(quote) {
        return None;
    }
    // Crypto bases resolve as crypto pairs so canonical forms re-normalize to themselves.
    if CRYPTO_CODES.contains(&base) {
        return Some(crypto_descriptor(base, quote));
    }
    Some(fx_descriptor(base, quote))
}

/// Yahoo FX spelling `XXXYYY=X`.
fn match_yahoo_fx(raw: &str) -> Option<SymbolDescriptor> {
    let pair = raw.strip_suffix("=X")?;
    if pair.len() != 6 || !is_alpha(pair) {
        return None;
    }
    Some(fx_descriptor(&pair[..3], &pair[3..]))
}

/// `BASE-QUOTE` where base is 2..=6 letters and quote 3..=4 letters.
fn match_dashed_pair(raw: &str) -> Option<SymbolDescriptor> {
    let (base, quote) = raw.split_once('-')?;
    if !(2..=6).contains(&base.len()) || !(3..=4).contains(&quote.len()) {
        return None;
    }
    if !is_alpha(base) || !is_alpha(quote) {
        return None;
    }
    let kind = if CRYPTO_CODES.contains(&base) {
        InstrumentKind::Crypto
    } else {
        InstrumentKind::Equity
    };
    Some(SymbolDescriptor {
        canonical: raw.to_owned(),
        provider_symbol: raw.to_owned(),
        display_symbol: format!("{base}/{quote}"),
        kind,
    })
}

/// Plain ticker or caret-prefixed index, up to 16 chars.
fn match_equity_or_index(raw: &str) -> Option<SymbolDescriptor> {
    if raw.is_empty() || raw.len() > 16 {
        return None;
    }
    let mut chars = raw.chars();
    let first = chars.next()?;
    if first != '^' && !first.is_ascii_uppercase() {
        return None;
    }
    if !chars.all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch == '.' || ch == '-') {
        return None;
    }

    let kind = if first == '^' {
        InstrumentKind::Index
    } else {
        InstrumentKind::Equity
    };
    Some(SymbolDescriptor {
        canonical: raw.to_owned(),
        provider_symbol: equity_provider_symbol(raw),
        display_symbol: raw.to_owned(),
        kind,
    })
}

fn fx_descriptor(base: &str, quote: &str) -> SymbolDescriptor {
    let candidate = format!("{base}{quote}");
    let canonical = FX_ALIASES
        .iter()
        .find(|(alias, _)| *alias == candidate)
        .map_or(candidate, |(_, target)| (*target).to_owned());
    SymbolDescriptor {
        provider_symbol: format!("{canonical}=X"),
        display_symbol: format!("{}/{}", &canonical[..3], &canonical[3..]),
        canonical,
        kind: InstrumentKind::Fx,
    }
}

fn crypto_descriptor(base: &str, quote: &str) -> SymbolDescriptor {
    let canonical = format!("{base}-{quote}");
    SymbolDescriptor {
        provider_symbol: canonical.clone(),
        display_symbol: format!("{base}/{quote}"),
        canonical,
        kind: InstrumentKind::Crypto,
    }
}

/// Yahoo expects class shares in dash format (BRK-B) while traders commonly input BRK.B.
fn equity_provider_symbol(symbol: &str) -> String {
    if symbol.starts_with('^') {
        return symbol.to_owned();
    }
    if let Some((head, tail)) = symbol.split_once('.') {
        if !head.is_empty() && tail.len() == 1 && !tail.contains('.') {
            return format!("{head}-{tail}");
        }
    }
    symbol.to_owned()
}

fn is_alpha(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_uppercase())
}
