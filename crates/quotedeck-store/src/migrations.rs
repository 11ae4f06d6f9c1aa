//! Versioned schema migrations, applied once per database file.
//!
//! All timestamps are stored as unix seconds so rows round-trip without any
//! timezone formatting.

use ::duckdb::Connection;

struct Migration {
    version: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_watchlist_and_alerts",
        sql: r#"
CREATE SEQUENCE IF NOT EXISTS watchlist_items_id_seq;
CREATE TABLE IF NOT EXISTS watchlist_items (
    id BIGINT PRIMARY KEY DEFAULT nextval('watchlist_items_id_seq'),
    symbol TEXT NOT NULL UNIQUE,
    display_symbol TEXT NOT NULL,
    instrument_type TEXT NOT NULL,
    created_at BIGINT NOT NULL
);

CREATE SEQUENCE IF NOT EXISTS price_alerts_id_seq;
CREATE TABLE IF NOT EXISTS price_alerts (
    id BIGINT PRIMARY KEY DEFAULT nextval('price_alerts_id_seq'),
    watchlist_item_id BIGINT,
    symbol TEXT NOT NULL,
    condition TEXT NOT NULL,
    threshold DOUBLE NOT NULL,
    cooldown_seconds INTEGER NOT NULL,
    enabled BOOLEAN NOT NULL,
    one_shot BOOLEAN NOT NULL,
    last_triggered_at BIGINT,
    last_trigger_price DOUBLE,
    last_seen_price DOUBLE,
    last_condition_state BOOLEAN NOT NULL DEFAULT FALSE,
    created_at BIGINT NOT NULL,
    updated_at BIGINT NOT NULL
);

CREATE SEQUENCE IF NOT EXISTS alert_events_id_seq;
CREATE TABLE IF NOT EXISTS alert_events (
    id BIGINT PRIMARY KEY DEFAULT nextval('alert_events_id_seq'),
    alert_id BIGINT NOT NULL,
    symbol TEXT NOT NULL,
    condition TEXT NOT NULL,
    threshold DOUBLE NOT NULL,
    price DOUBLE NOT NULL,
    trigger_value DOUBLE,
    source TEXT,
    triggered_at BIGINT NOT NULL
);
"#,
    },
    Migration {
        version: "0002_market_snapshots",
        sql: r#"
CREATE TABLE IF NOT EXISTS market_snapshots (
    section TEXT PRIMARY KEY,
    saved_at BIGINT NOT NULL,
    source TEXT NOT NULL,
    payload TEXT NOT NULL
);
"#,
    },
    Migration {
        version: "0003_indexes",
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_price_alerts_symbol ON price_alerts(symbol);
CREATE INDEX IF NOT EXISTS idx_price_alerts_watchlist_item ON price_alerts(watchlist_item_id);
CREATE INDEX IF NOT EXISTS idx_alert_events_alert_id ON alert_events(alert_id, id);
"#,
    },
];

pub fn apply_migrations(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    )?;

    for migration in MIGRATIONS {
        let applied: i64 = connection.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = ?",
            [migration.version],
            |row| row.get(0),
        )?;
        if applied == 0 {
            connection.execute_batch(migration.sql)?;
            connection.execute(
                "INSERT INTO schema_migrations (version) VALUES (?)",
                [migration.version],
            )?;
        }
    }

    Ok(())
}
