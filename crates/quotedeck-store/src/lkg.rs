//! Last-known-good market snapshots.
//!
//! The overview service saves each live-filled section here and reads it
//! back through [`SnapshotStore`] when every live provider fails. Points are
//! stored as a JSON payload; section identity, save time, and the origin
//! label are proper columns so saves can replace by section.

use ::duckdb::params;
use quotedeck_core::overview::{SnapshotStore, StoreFuture, StoredSectionSnapshot};
use quotedeck_core::{CoreError, MarketPoint, SectionId, UtcDateTime};

use crate::{Store, StoreError};

impl Store {
    fn load_snapshot(&self, section: SectionId) -> Result<Option<StoredSectionSnapshot>, StoreError> {
        let connection = self.connection()?;
        let row = connection.query_row(
            "SELECT saved_at, source, payload FROM market_snapshots WHERE section = ?",
            [section.as_str()],
            |row| {
                let saved_at: i64 = row.get(0)?;
                let source: String = row.get(1)?;
                let payload: String = row.get(2)?;
                Ok((saved_at, source, payload))
            },
        );
        let (saved_at, source, payload) = match row {
            Ok(row) => row,
            Err(::duckdb::Error::QueryReturnedNoRows) => return Ok(None),
            Err(error) => return Err(error.into()),
        };
        let points: Vec<MarketPoint> = serde_json::from_str(&payload)?;
        Ok(Some(StoredSectionSnapshot {
            saved_at: UtcDateTime::from_unix(saved_at)?,
            source,
            points,
        }))
    }

    fn save_snapshot(
        &self,
        section: SectionId,
        snapshot: &StoredSectionSnapshot,
    ) -> Result<(), StoreError> {
        let payload = serde_json::to_string(&snapshot.points)?;
        let connection = self.connection()?;
        connection.execute(
            "INSERT OR REPLACE INTO market_snapshots (section, saved_at, source, payload) \
             VALUES (?, ?, ?, ?)",
            params![
                section.as_str(),
                snapshot.saved_at.unix(),
                snapshot.source,
                payload
            ],
        )?;
        Ok(())
    }
}

impl SnapshotStore for Store {
    fn load_section<'a>(
        &'a self,
        section: SectionId,
    ) -> StoreFuture<'a, Result<Option<StoredSectionSnapshot>, CoreError>> {
        Box::pin(async move {
            self.load_snapshot(section)
                .map_err(|error| CoreError::Storage(error.to_string()))
        })
    }

    fn save_section<'a>(
        &'a self,
        section: SectionId,
        snapshot: &'a StoredSectionSnapshot,
    ) -> StoreFuture<'a, Result<(), CoreError>> {
        Box::pin(async move {
            self.save_snapshot(section, snapshot)
                .map_err(|error| CoreError::Storage(error.to_string()))
        })
    }
}
