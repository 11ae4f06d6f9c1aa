//! Price alert persistence and atomic trigger commits.

use ::duckdb::params;
use quotedeck_core::{
    evaluate_alert, normalize_symbol, validate_cooldown, validate_event_limit, validate_threshold,
    AlertCondition, AlertTriggerEvent, PriceAlert, PriceSnapshot, UtcDateTime,
    DEFAULT_COOLDOWN_SECONDS,
};

use crate::{in_transaction, Store, StoreError};

const ALERT_COLUMNS: &str = "id, watchlist_item_id, symbol, condition, threshold, \
     cooldown_seconds, enabled, one_shot, last_triggered_at, last_trigger_price, \
     last_seen_price, last_condition_state, created_at, updated_at";

/// Inputs for creating an alert.
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub symbol: String,
    pub condition: AlertCondition,
    pub threshold: f64,
    /// Defaults to [`DEFAULT_COOLDOWN_SECONDS`] when absent.
    pub cooldown_seconds: Option<i64>,
    pub one_shot: bool,
    pub watchlist_item_id: Option<i64>,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct AlertUpdate {
    pub condition: Option<AlertCondition>,
    pub threshold: Option<f64>,
    pub cooldown_seconds: Option<i64>,
    pub enabled: Option<bool>,
    pub one_shot: Option<bool>,
}

/// Alert shape used when binding an alert to a watchlist item.
#[derive(Debug, Clone)]
pub struct AlertSpec {
    pub condition: AlertCondition,
    pub threshold: f64,
    pub cooldown_seconds: Option<i64>,
    pub one_shot: bool,
}

/// Listing filters; defaults select everything.
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub symbol: Option<String>,
    pub enabled_only: bool,
}

/// Event page selection. With `after_id` set, events come back oldest-first
/// starting past that id; otherwise newest-first.
#[derive(Debug, Clone)]
pub struct EventQuery {
    pub alert_id: Option<i64>,
    pub after_id: Option<i64>,
    pub limit: i64,
}

impl Default for EventQuery {
    fn default() -> Self {
        Self {
            alert_id: None,
            after_id: None,
            limit: 50,
        }
    }
}

struct AlertRow {
    id: i64,
    watchlist_item_id: Option<i64>,
    symbol: String,
    condition: String,
    threshold: f64,
    cooldown_seconds: i64,
    enabled: bool,
    one_shot: bool,
    last_triggered_at: Option<i64>,
    last_trigger_price: Option<f64>,
    last_seen_price: Option<f64>,
    last_condition_state: bool,
    created_at: i64,
    updated_at: i64,
}

impl AlertRow {
    fn into_alert(self) -> Result<PriceAlert, StoreError> {
        let condition = self
            .condition
            .parse::<AlertCondition>()
            .map_err(StoreError::Validation)?;
        Ok(PriceAlert {
            id: self.id,
            watchlist_item_id: self.watchlist_item_id,
            symbol: self.symbol,
            condition,
            threshold: self.threshold,
            cooldown_seconds: self.cooldown_seconds as u32,
            enabled: self.enabled,
            one_shot: self.one_shot,
            last_triggered_at: self
                .last_triggered_at
                .map(UtcDateTime::from_unix)
                .transpose()?,
            last_trigger_price: self.last_trigger_price,
            last_seen_price: self.last_seen_price,
            last_condition_state: self.last_condition_state,
            created_at: UtcDateTime::from_unix(self.created_at)?,
            updated_at: UtcDateTime::from_unix(self.updated_at)?,
        })
    }
}

impl Store {
    pub fn create_alert(&self, new: NewAlert) -> Result<PriceAlert, StoreError> {
        let descriptor = normalize_symbol(&new.symbol)
            .map_err(|_| StoreError::InvalidSymbol(new.symbol.clone()))?;
        validate_threshold(new.condition, new.threshold)?;
        let cooldown = validate_cooldown(
            new.cooldown_seconds
                .unwrap_or(i64::from(DEFAULT_COOLDOWN_SECONDS)),
        )?;

        let now = UtcDateTime::now().unix();
        let connection = self.connection()?;
        let id: i64 = connection.query_row(
            "INSERT INTO price_alerts (watchlist_item_id, symbol, condition, threshold, \
             cooldown_seconds, enabled, one_shot, last_condition_state, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, TRUE, ?, FALSE, ?, ?) RETURNING id",
            params![
                new.watchlist_item_id,
                descriptor.canonical,
                new.condition.as_str(),
                new.threshold,
                i64::from(cooldown),
                new.one_shot,
                now,
                now
            ],
            |row| row.get(0),
        )?;
        self.get_alert(id)
    }

    pub fn get_alert(&self, id: i64) -> Result<PriceAlert, StoreError> {
        let connection = self.connection()?;
        query_alert(&connection, id)?.ok_or_else(|| StoreError::NotFound {
            entity: "alert",
            key: id.to_string(),
        })
    }

    pub fn list_alerts(&self, filter: &AlertFilter) -> Result<Vec<PriceAlert>, StoreError> {
        let connection = self.connection()?;
        let sql = format!("SELECT {ALERT_COLUMNS} FROM price_alerts");

        let mut statement;
        let rows = match (&filter.symbol, filter.enabled_only) {
            (Some(symbol), true) => {
                statement = connection.prepare(&format!(
                    "{sql} WHERE symbol = ? AND enabled ORDER BY id"
                ))?;
                statement.query_map([symbol.as_str()], row_to_alert)?
            }
            (Some(symbol), false) => {
                statement = connection.prepare(&format!("{sql} WHERE symbol = ? ORDER BY id"))?;
                statement.query_map([symbol.as_str()], row_to_alert)?
            }
            (None, true) => {
                statement = connection.prepare(&format!("{sql} WHERE enabled ORDER BY id"))?;
                statement.query_map([], row_to_alert)?
            }
            (None, false) => {
                statement = connection.prepare(&format!("{sql} ORDER BY id"))?;
                statement.query_map([], row_to_alert)?
            }
        };

        let mut alerts = Vec::new();
        for row in rows {
            alerts.push(row?.into_alert()?);
        }
        Ok(alerts)
    }

    pub fn update_alert(&self, id: i64, update: &AlertUpdate) -> Result<PriceAlert, StoreError> {
        let current = self.get_alert(id)?;

        let condition = update.condition.unwrap_or(current.condition);
        let threshold = update.threshold.unwrap_or(current.threshold);
        validate_threshold(condition, threshold)?;
        let cooldown = match update.cooldown_seconds {
            Some(value) => validate_cooldown(value)?,
            None => current.cooldown_seconds,
        };
        let enabled = update.enabled.unwrap_or(current.enabled);
        let one_shot = update.one_shot.unwrap_or(current.one_shot);

        // Changing what the alert watches re-arms it and drops the crossing
        // baseline, so the next tick starts a fresh comparison.
        let rearmed = condition != current.condition || threshold != current.threshold;
        let last_condition_state = if rearmed {
            false
        } else {
            current.last_condition_state
        };
        let last_seen_price = if rearmed {
            None
        } else {
            current.last_seen_price
        };

        let connection = self.connection()?;
        connection.execute(
            "UPDATE price_alerts SET condition = ?, threshold = ?, cooldown_seconds = ?, \
             enabled = ?, one_shot = ?, last_condition_state = ?, last_seen_price = ?, \
             updated_at = ? WHERE id = ?",
            params![
                condition.as_str(),
                threshold,
                i64::from(cooldown),
                enabled,
                one_shot,
                last_condition_state,
                last_seen_price,
                UtcDateTime::now().unix(),
                id
            ],
        )?;
        self.get_alert(id)
    }

    /// Delete an alert and its recorded events.
    pub fn delete_alert(&self, id: i64) -> Result<(), StoreError> {
        let connection = self.connection()?;
        in_transaction(&connection, || {
            let removed = connection.execute("DELETE FROM price_alerts WHERE id = ?", [id])?;
            if removed == 0 {
                return Err(StoreError::NotFound {
                    entity: "alert",
                    key: id.to_string(),
                });
            }
            connection.execute("DELETE FROM alert_events WHERE alert_id = ?", [id])?;
            Ok(())
        })
    }

    /// Create or replace the single alert bound to a watchlist item.
    pub fn upsert_alert_for_watchlist_item(
        &self,
        item_id: i64,
        spec: &AlertSpec,
    ) -> Result<PriceAlert, StoreError> {
        let item = self.get_watchlist_item(item_id)?;
        validate_threshold(spec.condition, spec.threshold)?;
        let cooldown = validate_cooldown(
            spec.cooldown_seconds
                .unwrap_or(i64::from(DEFAULT_COOLDOWN_SECONDS)),
        )?;

        let connection = self.connection()?;
        let existing: Option<i64> = match connection.query_row(
            "SELECT id FROM price_alerts WHERE watchlist_item_id = ?",
            [item_id],
            |row| row.get(0),
        ) {
            Ok(id) => Some(id),
            Err(::duckdb::Error::QueryReturnedNoRows) => None,
            Err(error) => return Err(error.into()),
        };

        let now = UtcDateTime::now().unix();
        let id = match existing {
            Some(id) => {
                connection.execute(
                    "UPDATE price_alerts SET condition = ?, threshold = ?, cooldown_seconds = ?, \
                     enabled = TRUE, one_shot = ?, last_condition_state = FALSE, \
                     last_seen_price = NULL, updated_at = ? WHERE id = ?",
                    params![
                        spec.condition.as_str(),
                        spec.threshold,
                        i64::from(cooldown),
                        spec.one_shot,
                        now,
                        id
                    ],
                )?;
                id
            }
            None => connection.query_row(
                "INSERT INTO price_alerts (watchlist_item_id, symbol, condition, threshold, \
                 cooldown_seconds, enabled, one_shot, last_condition_state, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, TRUE, ?, FALSE, ?, ?) RETURNING id",
                params![
                    item_id,
                    item.symbol,
                    spec.condition.as_str(),
                    spec.threshold,
                    i64::from(cooldown),
                    spec.one_shot,
                    now,
                    now
                ],
                |row| row.get(0),
            )?,
        };
        drop(connection);
        self.get_alert(id)
    }

    /// Evaluate one alert against a tick and commit the outcome atomically:
    /// the state update and any trigger event land in one transaction.
    pub fn process_tick(
        &self,
        alert_id: i64,
        snapshot: &PriceSnapshot,
    ) -> Result<Option<AlertTriggerEvent>, StoreError> {
        let now = UtcDateTime::now();
        let connection = self.connection()?;
        in_transaction(&connection, || {
            let alert = query_alert(&connection, alert_id)?.ok_or_else(|| StoreError::NotFound {
                entity: "alert",
                key: alert_id.to_string(),
            })?;

            let evaluation = evaluate_alert(&alert, snapshot, now);
            let seen_price = evaluation.seen_price.or(alert.last_seen_price);

            connection.execute(
                "UPDATE price_alerts SET last_condition_state = ?, last_seen_price = ?, \
                 updated_at = ? WHERE id = ?",
                params![evaluation.condition_state, seen_price, now.unix(), alert_id],
            )?;
            if evaluation.fired {
                connection.execute(
                    "UPDATE price_alerts SET last_triggered_at = ?, last_trigger_price = ? \
                     WHERE id = ?",
                    params![now.unix(), snapshot.last_price, alert_id],
                )?;
            }
            if evaluation.disable_after_fire {
                connection.execute(
                    "UPDATE price_alerts SET enabled = FALSE WHERE id = ?",
                    [alert_id],
                )?;
            }

            if !evaluation.fired {
                return Ok(None);
            }

            let trigger_value = alert.condition.trigger_value(snapshot);
            let source = snapshot.source.map(str::to_owned);
            let event_id: i64 = connection.query_row(
                "INSERT INTO alert_events (alert_id, symbol, condition, threshold, price, \
                 trigger_value, source, triggered_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
                 RETURNING id",
                params![
                    alert.id,
                    alert.symbol,
                    alert.condition.as_str(),
                    alert.threshold,
                    snapshot.last_price,
                    trigger_value,
                    source,
                    now.unix()
                ],
                |row| row.get(0),
            )?;

            Ok(Some(AlertTriggerEvent {
                id: event_id,
                alert_id: alert.id,
                symbol: alert.symbol,
                condition: alert.condition,
                threshold: alert.threshold,
                price: snapshot.last_price,
                trigger_value,
                source,
                triggered_at: now,
            }))
        })
    }

    /// Evaluate every enabled alert on a symbol against one tick.
    pub fn process_symbol_tick(
        &self,
        symbol: &str,
        snapshot: &PriceSnapshot,
    ) -> Result<Vec<AlertTriggerEvent>, StoreError> {
        let alerts = self.list_alerts(&AlertFilter {
            symbol: Some(symbol.to_owned()),
            enabled_only: true,
        })?;
        let mut events = Vec::new();
        for alert in alerts {
            if let Some(event) = self.process_tick(alert.id, snapshot)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    pub fn list_events(&self, query: &EventQuery) -> Result<Vec<AlertTriggerEvent>, StoreError> {
        let limit = validate_event_limit(query.limit)? as i64;
        let connection = self.connection()?;

        let mut statement;
        let rows = match (query.alert_id, query.after_id) {
            (Some(alert_id), Some(after_id)) => {
                statement = connection.prepare(
                    "SELECT id, alert_id, symbol, condition, threshold, price, trigger_value, source, \
                     triggered_at \
                     FROM alert_events WHERE alert_id = ? AND id > ? ORDER BY id ASC LIMIT ?",
                )?;
                statement.query_map(params![alert_id, after_id, limit], row_to_event)?
            }
            (Some(alert_id), None) => {
                statement = connection.prepare(
                    "SELECT id, alert_id, symbol, condition, threshold, price, trigger_value, source, \
                     triggered_at \
                     FROM alert_events WHERE alert_id = ? ORDER BY id DESC LIMIT ?",
                )?;
                statement.query_map(params![alert_id, limit], row_to_event)?
            }
            (None, Some(after_id)) => {
                statement = connection.prepare(
                    "SELECT id, alert_id, symbol, condition, threshold, price, trigger_value, source, \
                     triggered_at \
                     FROM alert_events WHERE id > ? ORDER BY id ASC LIMIT ?",
                )?;
                statement.query_map(params![after_id, limit], row_to_event)?
            }
            (None, None) => {
                statement = connection.prepare(
                    "SELECT id, alert_id, symbol, condition, threshold, price, trigger_value, source, \
                     triggered_at \
                     FROM alert_events ORDER BY id DESC LIMIT ?",
                )?;
                statement.query_map(params![limit], row_to_event)?
            }
        };

        let mut events = Vec::new();
        for row in rows {
            let (raw_condition, mut event) = row?;
            event.condition = raw_condition
                .parse::<AlertCondition>()
                .map_err(StoreError::Validation)?;
            events.push(event);
        }
        Ok(events)
    }
}

fn row_to_alert(row: &::duckdb::Row<'_>) -> Result<AlertRow, ::duckdb::Error> {
    Ok(AlertRow {
        id: row.get(0)?,
        watchlist_item_id: row.get(1)?,
        symbol: row.get(2)?,
        condition: row.get(3)?,
        threshold: row.get(4)?,
        cooldown_seconds: row.get(5)?,
        enabled: row.get(6)?,
        one_shot: row.get(7)?,
        last_triggered_at: row.get(8)?,
        last_trigger_price: row.get(9)?,
        last_seen_price: row.get(10)?,
        last_condition_state: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

fn row_to_event(
    row: &::duckdb::Row<'_>,
) -> Result<(String, AlertTriggerEvent), ::duckdb::Error> {
    let raw_condition: String = row.get(3)?;
    let event = AlertTriggerEvent {
        id: row.get(0)?,
        alert_id: row.get(1)?,
        symbol: row.get(2)?,
        // Placeholder; replaced once the raw string is parsed.
        condition: AlertCondition::PriceAbove,
        threshold: row.get(4)?,
        price: row.get(5)?,
        trigger_value: row.get(6)?,
        source: row.get(7)?,
        triggered_at: UtcDateTime::from_unix(row.get(8)?).map_err(|error| {
            ::duckdb::Error::FromSqlConversionFailure(
                8,
                ::duckdb::types::Type::BigInt,
                Box::new(error),
            )
        })?,
    };
    Ok((raw_condition, event))
}

fn query_alert(
    connection: &::duckdb::Connection,
    id: i64,
) -> Result<Option<PriceAlert>, StoreError> {
    let row = connection.query_row(
        &format!("SELECT {ALERT_COLUMNS} FROM price_alerts WHERE id = ?"),
        [id],
        row_to_alert,
    );
    match row {
        Ok(row) => Ok(Some(row.into_alert()?)),
        Err(::duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(error) => Err(error.into()),
    }
}
