//! SQLite-backed dedup history

use chrono::{DateTime, Utc};
use osprey_core::{Alert, Rule};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;

use crate::{is_unique, HistoryStore, RuleStore, Sighting, StoreError, StoredRule};

pub struct SqliteHistory {
    conn: Mutex<Connection>,
}

/// Timestamps are stored as nanoseconds since the epoch so the decay
/// boundary compares exactly
fn to_nanos(at: DateTime<Utc>) -> Result<i64, StoreError> {
    at.timestamp_nanos_opt()
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {}", at)))
}

fn from_nanos(ns: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_nanos(ns)
}

fn latest(conn: &Connection, data: &str, rule_id: &str) -> Result<Option<Sighting>, StoreError> {
    let created_at: Option<i64> = conn
        .query_row(
            "SELECT created_at FROM sightings
             WHERE data = ?1 AND rule_id = ?2
             ORDER BY created_at DESC LIMIT 1",
            params![data, rule_id],
            |row| row.get(0),
        )
        .optional()?;

    Ok(created_at.map(|ns| Sighting {
        data: data.to_string(),
        rule_id: rule_id.to_string(),
        created_at: from_nanos(ns),
    }))
}

impl SqliteHistory {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sightings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                data TEXT NOT NULL,
                rule_id TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sightings_lookup
                ON sightings(data, rule_id, created_at DESC);

            CREATE TABLE IF NOT EXISTS alerts (
                id TEXT PRIMARY KEY,
                rule_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                source TEXT NOT NULL,
                tags TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            -- Full artifact JSON, enrichment included
            CREATE TABLE IF NOT EXISTS artifacts (
                id TEXT PRIMARY KEY,
                alert_id TEXT NOT NULL,
                data TEXT NOT NULL,
                data_type TEXT,
                rule_id TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                body TEXT NOT NULL,
                FOREIGN KEY (alert_id) REFERENCES alerts(id)
            );

            CREATE INDEX IF NOT EXISTS idx_artifacts_alert
                ON artifacts(alert_id);

            CREATE TABLE IF NOT EXISTS rules (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                body TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    pub fn alert_count(&self, rule_id: &str) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM alerts WHERE rule_id = ?1",
            params![rule_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Artifacts stored for one alert, in insertion order
    pub fn artifacts_for(&self, alert_id: &str) -> Result<Vec<osprey_core::Artifact>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT body FROM artifacts WHERE alert_id = ?1 ORDER BY rowid")?;
        let bodies = stmt
            .query_map(params![alert_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        bodies
            .iter()
            .map(|body| serde_json::from_str(body).map_err(StoreError::from))
            .collect()
    }
}

impl HistoryStore for SqliteHistory {
    fn find_latest(&self, data: &str, rule_id: &str) -> Result<Option<Sighting>, StoreError> {
        let conn = self.conn.lock();
        latest(&conn, data, rule_id)
    }

    fn record_if_unique(
        &self,
        data: &str,
        rule_id: &str,
        lifetime: Option<u64>,
        base_time: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.lock();
        // IMMEDIATE takes the write lock up front, so other processes sharing the file queue here
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let prior = latest(&tx, data, rule_id)?;
        if !is_unique(prior.as_ref(), lifetime, base_time) {
            tx.rollback()?;
            return Ok(false);
        }

        tx.execute(
            "INSERT INTO sightings (data, rule_id, created_at) VALUES (?1, ?2, ?3)",
            params![data, rule_id, to_nanos(base_time)?],
        )?;
        tx.commit()?;
        Ok(true)
    }

    fn persist(&self, alert: &Alert) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO alerts (id, rule_id, title, description, source, tags, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                alert.id.to_string(),
                alert.rule_id,
                alert.title,
                alert.description,
                alert.source,
                serde_json::to_string(&alert.tags)?,
                to_nanos(alert.created_at)?,
            ],
        )?;

        for artifact in &alert.artifacts {
            tx.execute(
                "INSERT INTO artifacts (id, alert_id, data, data_type, rule_id, created_at, body)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    artifact.id.to_string(),
                    alert.id.to_string(),
                    artifact.data,
                    artifact.data_type.map(|t| t.as_str()),
                    alert.rule_id,
                    to_nanos(artifact.created_at)?,
                    serde_json::to_string(artifact)?,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }
}

impl RuleStore for SqliteHistory {
    fn find_rule(&self, id: &str) -> Result<Option<StoredRule>, StoreError> {
        let conn = self.conn.lock();
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT body, updated_at FROM rules WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        row.map(|(body, updated_at)| -> Result<StoredRule, StoreError> {
            let rule = Rule::from_toml(&body)
                .map_err(|e| StoreError::Corrupt(format!("stored rule {}: {}", id, e)))?;
            Ok(StoredRule {
                rule,
                body,
                updated_at: from_nanos(updated_at),
            })
        })
        .transpose()
    }

    fn save_rule(&self, rule: &Rule, body: &str, updated_at: DateTime<Utc>) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO rules (id, title, description, body, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                body = excluded.body,
                updated_at = excluded.updated_at",
            params![rule.id, rule.title, rule.description, body, to_nanos(updated_at)?],
        )?;
        Ok(())
    }
}
