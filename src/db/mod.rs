use anyhow::{Context, Result};
use rusqlite::types::Type;
use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

pub mod models;
use models::*;

/// Thread-safe SQLite handle (single connection with mutex).
///
/// Both stores share the file but own separate tables; each table is written
/// as a whole document inside one transaction.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::from_connection(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    #[cfg(test)]
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn()?.execute_batch(sql)?;
        Ok(())
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database connection mutex poisoned"))
    }

    // ── Odds history ──────────────────────────────────────────────────────────

    /// Load every tracking record.
    pub fn load_odds_history(&self) -> Result<HashMap<String, TrackingRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT event_key, initial, last_reported, previous, current, last_updated
             FROM odds_history",
        )?;
        let rows = stmt
            .query_map([], map_tracking_record)?
            .collect::<rusqlite::Result<HashMap<_, _>>>()?;
        Ok(rows)
    }

    /// Replace the whole odds-history document atomically.
    pub fn replace_odds_history(&self, records: &HashMap<String, TrackingRecord>) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM odds_history", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO odds_history (
                    event_key, initial, last_reported, previous, current, last_updated
                 ) VALUES (?1,?2,?3,?4,?5,?6)",
            )?;
            for (key, rec) in records {
                let previous = match &rec.previous {
                    Some(p) => Some(serde_json::to_string(p)?),
                    None => None,
                };
                stmt.execute(params![
                    key,
                    serde_json::to_string(&rec.initial)?,
                    serde_json::to_string(&rec.last_reported)?,
                    previous,
                    serde_json::to_string(&rec.current)?,
                    rec.last_updated,
                ])?;
            }
        }
        tx.commit().context("Failed to commit odds history")?;
        Ok(())
    }

    // ── Known matches ─────────────────────────────────────────────────────────

    /// Load every known match.
    pub fn load_known_matches(&self) -> Result<HashMap<String, KnownMatch>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT event_key, start_time, last_seen FROM known_matches")?;
        let rows = stmt
            .query_map([], |row| {
                let m = KnownMatch {
                    event_key: row.get(0)?,
                    start_time: row.get(1)?,
                    last_seen: row.get(2)?,
                };
                Ok((m.event_key.clone(), m))
            })?
            .collect::<rusqlite::Result<HashMap<_, _>>>()?;
        Ok(rows)
    }

    /// Replace the whole known-matches document atomically.
    pub fn replace_known_matches(&self, matches: &HashMap<String, KnownMatch>) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM known_matches", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO known_matches (event_key, start_time, last_seen)
                 VALUES (?1,?2,?3)",
            )?;
            for m in matches.values() {
                stmt.execute(params![m.event_key, m.start_time, m.last_seen])?;
            }
        }
        tx.commit().context("Failed to commit known matches")?;
        Ok(())
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

fn json_column<T: DeserializeOwned>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn map_tracking_record(row: &rusqlite::Row) -> rusqlite::Result<(String, TrackingRecord)> {
    let previous = match row.get::<_, Option<String>>(3)? {
        Some(_) => Some(json_column(row, 3)?),
        None => None,
    };
    Ok((
        row.get(0)?,
        TrackingRecord {
            initial: json_column(row, 1)?,
            last_reported: json_column(row, 2)?,
            previous,
            current: json_column(row, 4)?,
            last_updated: row.get(5)?,
        },
    ))
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS odds_history (
    event_key     TEXT PRIMARY KEY,
    initial       TEXT NOT NULL,
    last_reported TEXT NOT NULL,
    previous      TEXT,
    current       TEXT NOT NULL,
    last_updated  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS known_matches (
    event_key  TEXT PRIMARY KEY,
    start_time TEXT NOT NULL,
    last_seen  TEXT NOT NULL
);
"#;
