//! New-match detection with start-time drift tolerance.
//!
//! The page reschedules fixtures, so the same "A vs B" may show up with a
//! slightly different start time on the next scrape. A known key whose time
//! moved by no more than the buffer (measured around the 24h dial) is the
//! same match; anything further away is treated as a new fixture.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

use crate::db::models::{KnownMatch, Snapshot};
use crate::db::Database;

use super::clock;

pub struct MatchTracker {
    db: Database,
    known: HashMap<String, KnownMatch>,
    buffer_minutes: u16,
    retention: Duration,
}

impl MatchTracker {
    /// Load known matches. A failed load starts from an empty store.
    pub fn load(db: Database, buffer_minutes: u16, retention_days: u32) -> Self {
        let known = match db.load_known_matches() {
            Ok(known) => {
                info!("Loaded {} known match(es)", known.len());
                known
            }
            Err(e) => {
                warn!("Failed to load known matches, starting empty: {:#}", e);
                HashMap::new()
            }
        };
        MatchTracker {
            db,
            known,
            buffer_minutes,
            retention: Duration::days(i64::from(retention_days)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&KnownMatch> {
        self.known.get(key)
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    /// Whether `reported` is within the buffer of `stored`. Unparseable times never match.
    pub fn is_same_fixture(&self, key: &str, stored: &str, reported: &str) -> bool {
        match clock::distance(stored, reported) {
            Ok(d) => d <= self.buffer_minutes,
            Err(e) => {
                warn!("Bad start time for {} ({:?} vs {:?}): {}", key, stored, reported, e);
                false
            }
        }
    }

    pub fn find_new(&mut self, snapshot: &Snapshot) -> Snapshot {
        self.find_new_at(snapshot, Utc::now())
    }

    /// Classify every event in `snapshot` and remember its latest start time.
    ///
    /// Returns the new events under the keys the feed reported them with.
    pub fn find_new_at(&mut self, snapshot: &Snapshot, now: DateTime<Utc>) -> Snapshot {
        let swept = self.sweep(now);

        if snapshot.is_empty() {
            warn!("Empty match snapshot, nothing to classify this cycle");
            if swept > 0 {
                self.flush();
            }
            return Snapshot::new();
        }

        let mut new_matches = Snapshot::new();
        for (key, m) in snapshot {
            let is_new = match self.known.get(key) {
                None => true,
                Some(known) => {
                    let same = self.is_same_fixture(key, &known.start_time, &m.time);
                    if same {
                        debug!("Known match {} ({} -> {})", key, known.start_time, m.time);
                    } else {
                        info!(
                            "Start time of {} moved {} -> {}, treating as a new fixture",
                            key, known.start_time, m.time
                        );
                    }
                    !same
                }
            };

            self.known.insert(
                key.clone(),
                KnownMatch {
                    event_key: key.clone(),
                    start_time: m.time.clone(),
                    last_seen: now,
                },
            );
            if is_new {
                new_matches.insert(key.clone(), m.clone());
            }
        }

        self.flush();
        info!(
            "Match cycle: {} event(s) seen, {} new, {} known",
            snapshot.len(),
            new_matches.len(),
            self.known.len()
        );
        new_matches
    }

    /// Forget matches not seen within the retention window. Returns how many were dropped.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.known.len();
        let retention = self.retention;
        self.known.retain(|key, m| {
            let keep = now - m.last_seen <= retention;
            if !keep {
                info!("Removing stale match from known matches: {}", key);
            }
            keep
        });
        before - self.known.len()
    }

    pub fn save(&self) -> Result<()> {
        self.db.replace_known_matches(&self.known)
    }

    fn flush(&self) {
        if let Err(e) = self.save() {
            error!("Failed to save known matches: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::MatchSnapshot;
    use crate::feed::http::parse_snapshot;
    use serde_json::json;

    fn snapshot(entries: &[(&str, &str)]) -> Snapshot {
        entries
            .iter()
            .map(|(key, time)| {
                let (team1, team2) = key.split_once(" vs ").unwrap();
                (
                    key.to_string(),
                    MatchSnapshot {
                        team1: team1.into(),
                        team2: team2.into(),
                        time: time.to_string(),
                        odds: Default::default(),
                        handicap1: None,
                        handicap2: None,
                    },
                )
            })
            .collect()
    }

    fn tracker() -> MatchTracker {
        MatchTracker::load(Database::open_in_memory().unwrap(), 300, 7)
    }

    fn keys(matches: &Snapshot) -> Vec<String> {
        matches.keys().cloned().collect()
    }

    #[test]
    fn test_first_sighting_is_new() {
        let mut t = tracker();
        let new = t.find_new(&snapshot(&[("A vs B", "20:00"), ("C vs D", "21:00")]));
        assert_eq!(keys(&new), vec!["A vs B", "C vs D"]);
        assert_eq!(t.find_new(&snapshot(&[("A vs B", "20:00")])).len(), 0);
    }

    #[test]
    fn test_drift_within_buffer_is_same_match() {
        let mut t = tracker();
        t.find_new(&snapshot(&[("A vs B", "20:00")]));

        assert!(t.find_new(&snapshot(&[("A vs B", "23:30")])).is_empty());
        assert_eq!(t.get("A vs B").unwrap().start_time, "23:30");

        // 150 minutes across midnight
        assert!(t.find_new(&snapshot(&[("A vs B", "02:00")])).is_empty());
        assert_eq!(t.get("A vs B").unwrap().start_time, "02:00");
    }

    #[test]
    fn test_drift_beyond_buffer_is_new_fixture() {
        let mut t = tracker();
        t.find_new(&snapshot(&[("A vs B", "08:00")]));
        let new = t.find_new(&snapshot(&[("A vs B", "14:00")]));
        assert_eq!(keys(&new), vec!["A vs B"]);
        assert_eq!(t.get("A vs B").unwrap().start_time, "14:00");
    }

    #[test]
    fn test_buffer_edge_is_inclusive() {
        let mut t = tracker();
        t.find_new(&snapshot(&[("A vs B", "10:00")]));
        assert!(t.find_new(&snapshot(&[("A vs B", "15:00")])).is_empty());
        assert_eq!(t.find_new(&snapshot(&[("A vs B", "20:01")])).len(), 1);
    }

    #[test]
    fn test_malformed_time_is_treated_as_new() {
        let mut t = tracker();
        t.find_new(&snapshot(&[("A vs B", "20:00")]));
        let new = t.find_new(&snapshot(&[("A vs B", "N/A")]));
        assert_eq!(keys(&new), vec!["A vs B"]);
        assert_eq!(t.get("A vs B").unwrap().start_time, "N/A");

        // The stored time is now malformed, so even a sane time reads as new once
        assert_eq!(t.find_new(&snapshot(&[("A vs B", "20:00")])).len(), 1);
        assert!(t.find_new(&snapshot(&[("A vs B", "20:00")])).is_empty());
    }

    #[test]
    fn test_empty_snapshot_keeps_known_matches() {
        let mut t = tracker();
        t.find_new(&snapshot(&[("A vs B", "20:00")]));
        assert!(t.find_new(&Snapshot::new()).is_empty());
        assert!(t.get("A vs B").is_some());
    }

    #[test]
    fn test_sweep_forgets_idle_matches() {
        let mut t = tracker();
        let now = Utc::now();
        t.find_new_at(&snapshot(&[("A vs B", "20:00")]), now - Duration::days(8));
        t.find_new_at(&snapshot(&[("C vs D", "20:00")]), now - Duration::days(6));
        assert_eq!(t.sweep(now), 1);
        assert!(t.get("A vs B").is_none());
        assert!(t.get("C vs D").is_some());
    }

    #[test]
    fn test_known_matches_survive_reload() {
        let db = Database::open_in_memory().unwrap();
        let mut t = MatchTracker::load(db.clone(), 300, 7);
        t.find_new(&snapshot(&[("A vs B", "20:00")]));

        let mut reloaded = MatchTracker::load(db, 300, 7);
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.find_new(&snapshot(&[("A vs B", "21:00")])).is_empty());
    }

    #[test]
    fn test_new_match_keeps_feed_key() {
        let raw = json!({
            "Spirit vs Tundra (Bo3)": {
                "team1": "Team Spirit (Match)",
                "team2": "Tundra (Match)",
                "time": "19:30"
            }
        });
        let mut t = tracker();
        let new = t.find_new(&parse_snapshot(&raw));
        assert_eq!(keys(&new), vec!["Spirit vs Tundra (Bo3)"]);
        assert_eq!(new["Spirit vs Tundra (Bo3)"].team1, "Team Spirit");
        assert!(t.get("Spirit vs Tundra (Bo3)").is_some());
        assert!(t.find_new(&parse_snapshot(&raw)).is_empty());
    }

    #[test]
    fn test_failed_load_starts_empty() {
        let db = Database::open_in_memory().unwrap();
        db.execute_batch(
            "INSERT INTO known_matches VALUES ('A vs B', '20:00', 'not a timestamp');",
        )
        .unwrap();
        assert!(db.load_known_matches().is_err());

        let mut t = MatchTracker::load(db, 300, 7);
        assert_eq!(t.len(), 0);
        assert_eq!(keys(&t.find_new(&snapshot(&[("A vs B", "20:00")]))), vec!["A vs B"]);
    }

    #[test]
    fn test_failed_save_keeps_memory_authoritative() {
        let db = Database::open_in_memory().unwrap();
        let mut t = MatchTracker::load(db.clone(), 300, 7);
        db.execute_batch("DROP TABLE known_matches;").unwrap();

        assert!(t.save().is_err());
        assert_eq!(t.find_new(&snapshot(&[("A vs B", "20:00")])).len(), 1);
        assert!(t.find_new(&snapshot(&[("A vs B", "21:00")])).is_empty());
        assert_eq!(t.get("A vs B").unwrap().start_time, "21:00");
    }
}
