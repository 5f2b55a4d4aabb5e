//! Resident odds history, persisted to the `odds_history` table.
//!
//! Mutations only touch memory; `save()` writes the whole document in one
//! transaction. The detector flushes once at the end of each cycle.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::{info, warn};

use crate::db::models::{OddsFields, TrackingRecord};
use crate::db::Database;

pub struct OddsHistory {
    db: Database,
    records: HashMap<String, TrackingRecord>,
}

impl OddsHistory {
    /// Load the persisted history. A failed load starts from an empty store.
    pub fn load(db: Database) -> Self {
        let records = match db.load_odds_history() {
            Ok(records) => {
                info!("Loaded odds history: {} tracked event(s)", records.len());
                records
            }
            Err(e) => {
                warn!("Failed to load odds history, starting empty: {:#}", e);
                HashMap::new()
            }
        };
        OddsHistory { db, records }
    }

    pub fn get(&self, key: &str) -> Option<&TrackingRecord> {
        self.records.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Return the record for `key`, creating it from `fields` if absent.
    pub fn get_or_init(
        &mut self,
        key: &str,
        fields: &OddsFields,
        now: DateTime<Utc>,
    ) -> &TrackingRecord {
        self.records
            .entry(key.to_string())
            .or_insert_with(|| TrackingRecord {
                initial: fields.clone(),
                last_reported: fields.clone(),
                previous: None,
                current: fields.clone(),
                last_updated: now,
            })
    }

    /// Record a new sample for an existing event.
    ///
    /// `previous` takes the old sample, entries of `new_last_reported` replace
    /// the matching reference entries, and `last_updated` is refreshed.
    /// Returns `false` when the key is unknown.
    pub fn update(
        &mut self,
        key: &str,
        new_fields: OddsFields,
        new_last_reported: &OddsFields,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(rec) = self.records.get_mut(key) else {
            return false;
        };
        rec.previous = Some(std::mem::replace(&mut rec.current, new_fields));
        for (field, value) in new_last_reported {
            rec.last_reported.insert(*field, *value);
        }
        rec.last_updated = now;
        true
    }

    /// Drop every record idle for longer than `retention`. Returns the removed keys.
    pub fn sweep(&mut self, retention: Duration, now: DateTime<Utc>) -> Vec<String> {
        let mut removed: Vec<String> = self
            .records
            .iter()
            .filter(|(_, rec)| now - rec.last_updated > retention)
            .map(|(key, _)| key.clone())
            .collect();
        removed.sort();
        for key in &removed {
            self.records.remove(key);
            info!("Removing stale event from odds history: {}", key);
        }
        removed
    }

    /// Persist the whole history. On failure the in-memory state stays authoritative.
    pub fn save(&self) -> Result<()> {
        self.db.replace_odds_history(&self.records)
    }
}
