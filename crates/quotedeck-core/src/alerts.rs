//! Price alert evaluation.
//!
//! Evaluation is pure: it takes an alert row and a price snapshot and
//! reports what should happen, leaving persistence to the storage layer.
//! Level conditions (`price_above`, `price_below` and the percent variants)
//! fire on the rising edge of their predicate, so a price hovering above a
//! threshold produces one notification, not one per tick. Cross conditions
//! fire every time the price moves through the threshold between two
//! consecutive ticks. A cooldown suppresses notifications without freezing
//! the tracked condition state, and one-shot alerts disable themselves after
//! firing.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{UtcDateTime, ValidationError};

pub const DEFAULT_COOLDOWN_SECONDS: u32 = 60;
pub const MAX_COOLDOWN_SECONDS: u32 = 86_400;
pub const MAX_EVENT_LIMIT: usize = 200;

/// Shortest and longest time a just-fired alert reports [`TriggerState::Triggered`].
const TRIGGERED_WINDOW_MIN_SECONDS: i64 = 5;
const TRIGGERED_WINDOW_MAX_SECONDS: i64 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCondition {
    PriceAbove,
    PriceBelow,
    PercentMoveUp,
    PercentMoveDown,
    CrossesAbove,
    CrossesBelow,
}

impl AlertCondition {
    pub const ALL: [Self; 6] = [
        Self::PriceAbove,
        Self::PriceBelow,
        Self::PercentMoveUp,
        Self::PercentMoveDown,
        Self::CrossesAbove,
        Self::CrossesBelow,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PriceAbove => "price_above",
            Self::PriceBelow => "price_below",
            Self::PercentMoveUp => "percent_move_up",
            Self::PercentMoveDown => "percent_move_down",
            Self::CrossesAbove => "crosses_above",
            Self::CrossesBelow => "crosses_below",
        }
    }

    /// Percent conditions compare against the day's percent change.
    pub const fn is_percent(self) -> bool {
        matches!(self, Self::PercentMoveUp | Self::PercentMoveDown)
    }

    /// Cross conditions fire on every threshold crossing rather than on the
    /// rising edge of a level predicate.
    pub const fn is_cross(self) -> bool {
        matches!(self, Self::CrossesAbove | Self::CrossesBelow)
    }

    /// Value recorded on a trigger event: the day percent for percent
    /// conditions, the tick price otherwise.
    #[must_use]
    pub fn trigger_value(self, snapshot: &PriceSnapshot) -> Option<f64> {
        if self.is_percent() {
            snapshot.change_percent
        } else {
            Some(snapshot.last_price)
        }
    }
}

impl Display for AlertCondition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertCondition {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "price_above" => Ok(Self::PriceAbove),
            "price_below" => Ok(Self::PriceBelow),
            "percent_move_up" => Ok(Self::PercentMoveUp),
            "percent_move_down" => Ok(Self::PercentMoveDown),
            "crosses_above" => Ok(Self::CrossesAbove),
            "crosses_below" => Ok(Self::CrossesBelow),
            other => Err(ValidationError::InvalidCondition {
                value: other.to_owned(),
            }),
        }
    }
}

/// A configured alert row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceAlert {
    pub id: i64,
    /// Set when the alert is bound to a watchlist item.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watchlist_item_id: Option<i64>,
    pub symbol: String,
    pub condition: AlertCondition,
    pub threshold: f64,
    pub cooldown_seconds: u32,
    pub enabled: bool,
    pub one_shot: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_triggered_at: Option<UtcDateTime>,
    /// Price at the most recent fire.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_trigger_price: Option<f64>,
    /// Price of the most recent processed tick; the crossing baseline when a
    /// tick arrives without its own previous price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen_price: Option<f64>,
    pub last_condition_state: bool,
    pub created_at: UtcDateTime,
    pub updated_at: UtcDateTime,
}

/// A recorded notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertTriggerEvent {
    pub id: i64,
    pub alert_id: i64,
    pub symbol: String,
    pub condition: AlertCondition,
    pub threshold: f64,
    /// Price at the moment the alert fired.
    pub price: f64,
    /// Measured value behind the fire: the day percent for percent
    /// conditions, the price otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_value: Option<f64>,
    /// Where the tick came from, when the caller labels it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub triggered_at: UtcDateTime,
}

/// Price inputs for one evaluation tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceSnapshot {
    pub last_price: f64,
    /// Price of the preceding tick, when one exists.
    pub previous_price: Option<f64>,
    /// Day percent change, when the source reports one.
    pub change_percent: Option<f64>,
    /// Label of the feed that produced the tick.
    pub source: Option<&'static str>,
    pub as_of: UtcDateTime,
}

/// Outcome of evaluating one alert against one snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertEvaluation {
    /// A notification event should be recorded.
    pub fired: bool,
    /// New value for `last_condition_state`.
    pub condition_state: bool,
    /// The condition wanted to fire but the cooldown held it back.
    pub cooldown_suppressed: bool,
    /// The alert is one-shot and fired, so it should be disabled.
    pub disable_after_fire: bool,
    /// New value for `last_seen_price`; `None` when the tick was skipped.
    pub seen_price: Option<f64>,
}

impl AlertEvaluation {
    const fn unchanged(state: bool) -> Self {
        Self {
            fired: false,
            condition_state: state,
            cooldown_suppressed: false,
            disable_after_fire: false,
            seen_price: None,
        }
    }
}

/// UI-facing alert lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerState {
    Inactive,
    Triggered,
    Cooldown,
    Active,
    Armed,
}

impl TriggerState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Triggered => "triggered",
            Self::Cooldown => "cooldown",
            Self::Active => "active",
            Self::Armed => "armed",
        }
    }
}

/// Evaluate one alert against one snapshot.
///
/// Disabled alerts and non-positive prices leave the alert untouched.
#[must_use]
pub fn evaluate_alert(
    alert: &PriceAlert,
    snapshot: &PriceSnapshot,
    now: UtcDateTime,
) -> AlertEvaluation {
    if !alert.enabled {
        return AlertEvaluation::unchanged(alert.last_condition_state);
    }
    if !snapshot.last_price.is_finite() || snapshot.last_price <= 0.0 {
        return AlertEvaluation::unchanged(alert.last_condition_state);
    }

    // A tick without its own preceding price crosses against the price the
    // alert last saw.
    let effective = PriceSnapshot {
        previous_price: snapshot.previous_price.or(alert.last_seen_price),
        ..*snapshot
    };

    let condition_state = condition_met(alert.condition, alert.threshold, &effective);
    let wants_fire = if alert.condition.is_cross() {
        condition_state
    } else {
        condition_state && !alert.last_condition_state
    };

    let in_cooldown = alert
        .last_triggered_at
        .is_some_and(|at| now.seconds_since(at) < i64::from(alert.cooldown_seconds));

    let fired = wants_fire && !in_cooldown;
    AlertEvaluation {
        fired,
        condition_state,
        cooldown_suppressed: wants_fire && in_cooldown,
        disable_after_fire: fired && alert.one_shot,
        seen_price: Some(snapshot.last_price),
    }
}

fn condition_met(condition: AlertCondition, threshold: f64, snapshot: &PriceSnapshot) -> bool {
    let last = snapshot.last_price;
    match condition {
        AlertCondition::PriceAbove => last >= threshold,
        AlertCondition::PriceBelow => last <= threshold,
        AlertCondition::PercentMoveUp => snapshot
            .change_percent
            .is_some_and(|pct| pct.is_finite() && pct >= threshold),
        AlertCondition::PercentMoveDown => snapshot
            .change_percent
            .is_some_and(|pct| pct.is_finite() && pct <= -threshold),
        AlertCondition::CrossesAbove => snapshot
            .previous_price
            .is_some_and(|prev| prev <= threshold && threshold < last),
        AlertCondition::CrossesBelow => snapshot
            .previous_price
            .is_some_and(|prev| prev >= threshold && threshold > last),
    }
}

/// Lifecycle state shown next to an alert.
#[must_use]
pub fn compute_trigger_state(alert: &PriceAlert, now: UtcDateTime) -> TriggerState {
    if !alert.enabled {
        return TriggerState::Inactive;
    }
    if let Some(at) = alert.last_triggered_at {
        let since = now.seconds_since(at);
        let window = i64::from(alert.cooldown_seconds)
            .clamp(TRIGGERED_WINDOW_MIN_SECONDS, TRIGGERED_WINDOW_MAX_SECONDS);
        if since < window {
            return TriggerState::Triggered;
        }
        if since < i64::from(alert.cooldown_seconds) {
            return TriggerState::Cooldown;
        }
    }
    if alert.last_condition_state {
        TriggerState::Active
    } else {
        TriggerState::Armed
    }
}

/// Thresholds must be positive and finite; percent thresholds are capped at
/// a 100% move.
pub fn validate_threshold(
    condition: AlertCondition,
    threshold: f64,
) -> Result<(), ValidationError> {
    if !threshold.is_finite() || threshold <= 0.0 {
        return Err(ValidationError::InvalidThreshold);
    }
    if condition.is_percent() && threshold > 100.0 {
        return Err(ValidationError::PercentThresholdTooLarge { value: threshold });
    }
    Ok(())
}

/// Cooldowns run from zero (fire every matching tick) to one day.
pub fn validate_cooldown(value: i64) -> Result<u32, ValidationError> {
    if !(0..=i64::from(MAX_COOLDOWN_SECONDS)).contains(&value) {
        return Err(ValidationError::InvalidCooldown { value });
    }
    Ok(value as u32)
}

/// Event page sizes must be positive; oversized requests are capped rather
/// than rejected.
pub fn validate_event_limit(value: i64) -> Result<usize, ValidationError> {
    if value <= 0 {
        return Err(ValidationError::InvalidEventLimit { value });
    }
    Ok((value as usize).min(MAX_EVENT_LIMIT))
}
