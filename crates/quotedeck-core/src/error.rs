use thiserror::Error;

/// Validation and contract errors exposed by `quotedeck-core`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("invalid condition '{value}', expected one of price_above, price_below, crosses_above, crosses_below, percent_move_up, percent_move_down")]
    InvalidCondition { value: String },
    #[error("invalid source '{value}'")]
    InvalidSource { value: String },
    #[error("invalid section '{value}'")]
    InvalidSection { value: String },

    #[error("threshold must be a finite positive number")]
    InvalidThreshold,
    #[error("percent threshold must not exceed 100, got {value}")]
    PercentThresholdTooLarge { value: f64 },
    #[error("cooldown_seconds must be within 0..=86400, got {value}")]
    InvalidCooldown { value: i64 },

    #[error("limit must be within 1..=200, got {value}")]
    InvalidEventLimit { value: i64 },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
}

impl ValidationError {
    /// Stable machine-readable code for API surfaces and logs.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidCondition { .. } => "validation.condition",
            Self::InvalidSource { .. } => "validation.source",
            Self::InvalidSection { .. } => "validation.section",
            Self::InvalidThreshold | Self::PercentThresholdTooLarge { .. } => {
                "validation.threshold"
            }
            Self::InvalidCooldown { .. } => "validation.cooldown",
            Self::InvalidEventLimit { .. } => "validation.limit",
            Self::TimestampNotUtc { .. } => "validation.timestamp",
        }
    }
}

/// A terminal transport failure after retries were exhausted.
#[derive(Debug, Clone)]
pub struct FetchError {
    pub url: String,
    pub attempts: u32,
    pub status_code: Option<u16>,
    pub detail: Option<String>,
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fetch of {} failed after {} attempt(s)", self.url, self.attempts)?;
        if let Some(code) = self.status_code {
            write!(f, " (status {code})")?;
        }
        if let Some(detail) = self.detail.as_deref() {
            write!(f, ": {detail}")?;
        }
        Ok(())
    }
}

impl std::error::Error for FetchError {}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid symbol format: '{raw}'")]
    InvalidSymbolFormat { raw: String },

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("provider '{provider}' fetch failed: {source}")]
    ProviderFetch {
        provider: &'static str,
        #[source]
        source: FetchError,
    },

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
