//! Core domain types.
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`SymbolDescriptor`] | Normalized symbol with provider spellings |
//! | [`MarketPoint`] | One quote inside an overview section |
//! | [`MarketSection`] | A filled overview section with metadata |
//! | [`MarketOverview`] | The full five-section snapshot |
//! | [`IntradaySeries`] | Per-symbol intraday tick series |
//! | [`UtcDateTime`] | UTC timestamp |

mod models;
mod symbol;
mod timestamp;

pub use models::{
    InstrumentKind, IntradayPoint, IntradaySeries, MarketOverview, MarketPoint, MarketSection,
    SectionId, SectionMeta,
};
pub use symbol::{normalize_symbol, SymbolDescriptor, CRYPTO_CODES, FIAT_CODES};
pub use timestamp::UtcDateTime;
