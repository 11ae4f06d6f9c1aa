//! Watchlist item persistence.

use quotedeck_core::{normalize_symbol, InstrumentKind, UtcDateTime};
use serde::{Deserialize, Serialize};

use crate::{in_transaction, Store, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistItem {
    pub id: i64,
    /// Canonical symbol; unique per watchlist.
    pub symbol: String,
    pub display_symbol: String,
    pub instrument_type: InstrumentKind,
    pub created_at: UtcDateTime,
}

struct ItemRow {
    id: i64,
    symbol: String,
    display_symbol: String,
    instrument_type: String,
    created_at: i64,
}

impl ItemRow {
    fn into_item(self) -> Result<WatchlistItem, StoreError> {
        let instrument_type = self
            .instrument_type
            .parse::<InstrumentKind>()
            .map_err(StoreError::Validation)?;
        Ok(WatchlistItem {
            id: self.id,
            symbol: self.symbol,
            display_symbol: self.display_symbol,
            instrument_type,
            created_at: UtcDateTime::from_unix(self.created_at)?,
        })
    }
}

impl Store {
    /// Add a symbol to the watchlist. Adding an already-watched symbol
    /// returns the existing item unchanged.
    pub fn add_watchlist_item(&self, raw_symbol: &str) -> Result<WatchlistItem, StoreError> {
        let descriptor = normalize_symbol(raw_symbol)
            .map_err(|_| StoreError::InvalidSymbol(raw_symbol.to_owned()))?;

        let connection = self.connection()?;
        if let Some(existing) = query_item_by_symbol(&connection, &descriptor.canonical)? {
            return existing.into_item();
        }

        let now = UtcDateTime::now().unix();
        let id: i64 = connection.query_row(
            "INSERT INTO watchlist_items (symbol, display_symbol, instrument_type, created_at) \
             VALUES (?, ?, ?, ?) RETURNING id",
            ::duckdb::params![
                descriptor.canonical,
                descriptor.display_symbol,
                descriptor.kind.as_str(),
                now
            ],
            |row| row.get(0),
        )?;

        Ok(WatchlistItem {
            id,
            symbol: descriptor.canonical,
            display_symbol: descriptor.display_symbol,
            instrument_type: descriptor.kind,
            created_at: UtcDateTime::from_unix(now)?,
        })
    }

    pub fn get_watchlist_item(&self, id: i64) -> Result<WatchlistItem, StoreError> {
        let connection = self.connection()?;
        let row = connection.query_row(
            "SELECT id, symbol, display_symbol, instrument_type, created_at \
             FROM watchlist_items WHERE id = ?",
            [id],
            row_to_item,
        );
        match row {
            Ok(row) => row.into_item(),
            Err(::duckdb::Error::QueryReturnedNoRows) => Err(StoreError::NotFound {
                entity: "watchlist item",
                key: id.to_string(),
            }),
            Err(error) => Err(error.into()),
        }
    }

    pub fn list_watchlist_items(&self) -> Result<Vec<WatchlistItem>, StoreError> {
        let connection = self.connection()?;
        let mut statement = connection.prepare(
            "SELECT id, symbol, display_symbol, instrument_type, created_at \
             FROM watchlist_items ORDER BY id",
        )?;
        let rows = statement.query_map([], row_to_item)?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row?.into_item()?);
        }
        Ok(items)
    }

    /// Remove an item along with its alerts and their recorded events.
    pub fn remove_watchlist_item(&self, id: i64) -> Result<(), StoreError> {
        let connection = self.connection()?;
        in_transaction(&connection, || {
            let removed = connection.execute("DELETE FROM watchlist_items WHERE id = ?", [id])?;
            if removed == 0 {
                return Err(StoreError::NotFound {
                    entity: "watchlist item",
                    key: id.to_string(),
                });
            }
            connection.execute(
                "DELETE FROM alert_events WHERE alert_id IN \
                 (SELECT id FROM price_alerts WHERE watchlist_item_id = ?)",
                [id],
            )?;
            connection.execute(
                "DELETE FROM price_alerts WHERE watchlist_item_id = ?",
                [id],
            )?;
            Ok(())
        })
    }
}

fn row_to_item(row: &::duckdb::Row<'_>) -> Result<ItemRow, ::duckdb::Error> {
    Ok(ItemRow {
        id: row.get(0)?,
        symbol: row.get(1)?,
        display_symbol: row.get(2)?,
        instrument_type: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn query_item_by_symbol(
    connection: &::duckdb::Connection,
    symbol: &str,
) -> Result<Option<ItemRow>, StoreError> {
    let row = connection.query_row(
        "SELECT id, symbol, display_symbol, instrument_type, created_at \
         FROM watchlist_items WHERE symbol = ?",
        [symbol],
        row_to_item,
    );
    match row {
        Ok(row) => Ok(Some(row)),
        Err(::duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(error) => Err(error.into()),
    }
}
