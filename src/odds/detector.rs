//! Cumulative odds-movement detection.
//!
//! Each field is compared against its sticky reference (`last_reported`),
//! not against the previous sample. Small moves accumulate across cycles
//! until they cross the tiered threshold; once a movement is reported the
//! reference jumps to the reported value and accumulation restarts from
//! there.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

use crate::db::models::{MatchSnapshot, OddsField, OddsFields, Snapshot};

use super::history::OddsHistory;
use super::policy;

/// Comparison of one field against its reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FieldComparison {
    /// Reference the current value was compared against
    pub previous: f64,
    pub current: f64,
    /// `current - previous`; negative means the odds dropped
    pub diff: f64,
    pub significant: bool,
}

/// An event with at least one significant movement this cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OddsChange {
    pub key: String,
    pub current: MatchSnapshot,
    pub initial: OddsFields,
    /// Every field present on both sides, significant or not
    pub comparisons: BTreeMap<OddsField, FieldComparison>,
}

impl OddsChange {
    pub fn significant_fields(&self) -> impl Iterator<Item = OddsField> + '_ {
        self.comparisons
            .iter()
            .filter(|(_, c)| c.significant)
            .map(|(f, _)| *f)
    }
}

/// Compare one field against its reference. `None` when either side is missing.
pub fn compare_field(reference: Option<f64>, current: Option<f64>) -> Option<FieldComparison> {
    let (previous, current) = (reference?, current?);
    Some(FieldComparison {
        previous,
        current,
        diff: current - previous,
        significant: policy::is_significant(previous, current),
    })
}

/// Owns the odds history and turns feed snapshots into movement alerts.
pub struct ChangeDetector {
    history: OddsHistory,
    retention: Duration,
}

impl ChangeDetector {
    pub fn new(history: OddsHistory, retention_days: u32) -> Self {
        ChangeDetector {
            history,
            retention: Duration::days(i64::from(retention_days)),
        }
    }

    pub fn history(&self) -> &OddsHistory {
        &self.history
    }

    pub fn detect_changes(&mut self, snapshot: &Snapshot) -> Vec<OddsChange> {
        self.detect_changes_at(snapshot, Utc::now())
    }

    /// Run one detection cycle: sweep, compare, update references, flush.
    pub fn detect_changes_at(
        &mut self,
        snapshot: &Snapshot,
        now: DateTime<Utc>,
    ) -> Vec<OddsChange> {
        let removed = self.history.sweep(self.retention, now);
        if !removed.is_empty() {
            info!("Retention sweep removed {} event(s)", removed.len());
        }

        if snapshot.is_empty() {
            warn!("Empty odds snapshot, nothing to compare this cycle");
            if !removed.is_empty() {
                self.flush();
            }
            return Vec::new();
        }

        let mut changes = Vec::new();
        let mut new_events = 0usize;

        for (key, current) in snapshot {
            if !self.history.contains(key) {
                self.history.get_or_init(key, &current.odds, now);
                new_events += 1;
                debug!("New event tracked: {} {:?}", key, current.odds);
                continue;
            }
            if let Some(change) = self.process_event(key, current, now) {
                changes.push(change);
            }
        }

        self.flush();

        info!(
            "Odds cycle: {} event(s) seen, {} new, {} with significant movement, {} tracked",
            snapshot.len(),
            new_events,
            changes.len(),
            self.history.len()
        );
        changes
    }

    fn process_event(
        &mut self,
        key: &str,
        current: &MatchSnapshot,
        now: DateTime<Utc>,
    ) -> Option<OddsChange> {
        let record = self.history.get(key)?;
        let initial = record.initial.clone();
        let mut reference = record.last_reported.clone();
        let mut comparisons = BTreeMap::new();

        for field in OddsField::ALL {
            let value = current.odds.get(&field).copied();
            match (reference.get(&field).copied(), value) {
                (None, Some(v)) => {
                    // First sighting of this line: it becomes the baseline, nothing to compare.
                    reference.insert(field, v);
                }
                (last, value) => {
                    let Some(cmp) = compare_field(last, value) else {
                        continue;
                    };
                    debug!(
                        "{} {}: {} -> {} (diff {:+.3}, threshold {:.2}, significant={})",
                        key,
                        field,
                        cmp.previous,
                        cmp.current,
                        cmp.diff,
                        policy::threshold(cmp.previous),
                        cmp.significant
                    );
                    if cmp.significant {
                        reference.insert(field, cmp.current);
                    }
                    comparisons.insert(field, cmp);
                }
            }
        }

        self.history.update(key, current.odds.clone(), &reference, now);

        if comparisons.values().any(|c| c.significant) {
            let change = OddsChange {
                key: key.to_string(),
                current: current.clone(),
                initial,
                comparisons,
            };
            info!(
                "Significant movement for {}: {:?}",
                key,
                change.significant_fields().collect::<Vec<_>>()
            );
            Some(change)
        } else {
            None
        }
    }

    fn flush(&self) {
        if let Err(e) = self.history.save() {
            error!("Failed to save odds history: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use approx::assert_relative_eq;

    fn snapshot_of(key: &str, odds: &[(OddsField, f64)]) -> Snapshot {
        let (team1, team2) = key.split_once(" vs ").unwrap();
        let m = MatchSnapshot {
            team1: team1.into(),
            team2: team2.into(),
            time: "20:00".into(),
            odds: odds.iter().copied().collect(),
            handicap1: None,
            handicap2: None,
        };
        [(key.to_string(), m)].into_iter().collect()
    }

    fn detector() -> ChangeDetector {
        let history = OddsHistory::load(Database::open_in_memory().unwrap());
        ChangeDetector::new(history, 7)
    }

    fn odds1(v: f64) -> Snapshot {
        snapshot_of("A vs B", &[(OddsField::Odds1, v), (OddsField::Odds2, 1.80)])
    }

    fn reference(d: &ChangeDetector, field: OddsField) -> f64 {
        d.history().get("A vs B").unwrap().last_reported[&field]
    }

    #[test]
    fn test_new_event_is_not_reported_on_first_cycle() {
        let mut d = detector();
        let changes = d.detect_changes(&odds1(2.0));
        assert!(changes.is_empty());
        assert!(d.history().contains("A vs B"));
    }

    #[test]
    fn test_small_moves_accumulate_until_threshold() {
        let mut d = detector();
        let t0 = Utc::now();
        assert!(d.detect_changes_at(&odds1(2.00), t0).is_empty());

        assert!(d.detect_changes_at(&odds1(1.95), t0 + Duration::minutes(5)).is_empty());
        assert_relative_eq!(reference(&d, OddsField::Odds1), 2.00);

        assert!(d.detect_changes_at(&odds1(1.92), t0 + Duration::minutes(10)).is_empty());
        assert_relative_eq!(reference(&d, OddsField::Odds1), 2.00);

        let changes = d.detect_changes_at(&odds1(1.88), t0 + Duration::minutes(15));
        assert_eq!(changes.len(), 1);
        let cmp = changes[0].comparisons[&OddsField::Odds1];
        assert!(cmp.significant);
        assert_relative_eq!(cmp.previous, 2.00);
        assert_relative_eq!(cmp.diff, -0.12, epsilon = 1e-9);
        assert_relative_eq!(reference(&d, OddsField::Odds1), 1.88);
    }

    #[test]
    fn test_reference_is_sticky_after_report() {
        let mut d = detector();
        d.detect_changes(&odds1(2.00));
        assert_eq!(d.detect_changes(&odds1(1.88)).len(), 1);

        // 1.80 is 0.20 from the initial 2.00 but only 0.08 from the reported 1.88
        // (threshold for 1.88 is 0.07, so it still fires, measured from 1.88)
        let changes = d.detect_changes(&odds1(1.80));
        assert_eq!(changes.len(), 1);
        let cmp = changes[0].comparisons[&OddsField::Odds1];
        assert_relative_eq!(cmp.previous, 1.88);
        assert_relative_eq!(changes[0].initial[&OddsField::Odds1], 2.00);

        // Back up by 0.05 from 1.80: below 0.07, nothing fires
        assert!(d.detect_changes(&odds1(1.85)).is_empty());
        assert_relative_eq!(reference(&d, OddsField::Odds1), 1.80);
    }

    #[test]
    fn test_increase_is_significant_too() {
        let mut d = detector();
        d.detect_changes(&odds1(2.00));
        let changes = d.detect_changes(&odds1(2.15));
        assert_eq!(changes.len(), 1);
        assert!(changes[0].comparisons[&OddsField::Odds1].diff > 0.0);
    }

    #[test]
    fn test_result_carries_all_present_fields() {
        let mut d = detector();
        d.detect_changes(&odds1(2.00));
        let changes = d.detect_changes(&snapshot_of(
            "A vs B",
            &[(OddsField::Odds1, 1.85), (OddsField::Odds2, 1.82)],
        ));
        assert_eq!(changes.len(), 1);
        let c = &changes[0];
        assert_eq!(c.comparisons.len(), 2);
        assert!(c.comparisons[&OddsField::Odds1].significant);
        assert!(!c.comparisons[&OddsField::Odds2].significant);
        assert_eq!(c.significant_fields().collect::<Vec<_>>(), vec![OddsField::Odds1]);
        // odds2 moved below threshold, its reference stays put
        assert_relative_eq!(reference(&d, OddsField::Odds2), 1.80);
    }

    #[test]
    fn test_missing_field_keeps_stale_reference() {
        let mut d = detector();
        d.detect_changes(&odds1(2.00));

        let without_odds1 = snapshot_of("A vs B", &[(OddsField::Odds2, 1.80)]);
        assert!(d.detect_changes(&without_odds1).is_empty());
        assert_relative_eq!(reference(&d, OddsField::Odds1), 2.00);

        let changes = d.detect_changes(&odds1(1.89));
        assert_eq!(changes.len(), 1);
        assert_relative_eq!(changes[0].comparisons[&OddsField::Odds1].previous, 2.00);
    }

    #[test]
    fn test_late_field_becomes_baseline_without_report() {
        let mut d = detector();
        d.detect_changes(&odds1(2.00));
        let with_handicap = snapshot_of(
            "A vs B",
            &[
                (OddsField::Odds1, 2.00),
                (OddsField::Odds2, 1.80),
                (OddsField::HandicapOdd1, 1.95),
            ],
        );
        assert!(d.detect_changes(&with_handicap).is_empty());
        assert_relative_eq!(reference(&d, OddsField::HandicapOdd1), 1.95);
        let rec = d.history().get("A vs B").unwrap();
        assert!(!rec.initial.contains_key(&OddsField::HandicapOdd1));
    }

    #[test]
    fn test_unchanged_values_do_not_report() {
        let mut d = detector();
        d.detect_changes(&odds1(2.00));
        assert!(d.detect_changes(&odds1(2.00)).is_empty());
        let rec = d.history().get("A vs B").unwrap();
        assert!(rec.previous.is_some());
    }

    #[test]
    fn test_empty_snapshot_still_sweeps() {
        let mut d = detector();
        let t0 = Utc::now();
        d.detect_changes_at(&odds1(2.00), t0 - Duration::days(8));
        let changes = d.detect_changes_at(&Snapshot::new(), t0);
        assert!(changes.is_empty());
        assert_eq!(d.history().len(), 0);
    }

    #[test]
    fn test_swept_event_starts_over_as_new() {
        let mut d = detector();
        let t0 = Utc::now();
        d.detect_changes_at(&odds1(2.00), t0 - Duration::days(8));
        // Re-observed after expiry: treated as brand new, no alert despite a big move
        assert!(d.detect_changes_at(&odds1(1.50), t0).is_empty());
        let rec = d.history().get("A vs B").unwrap();
        assert_relative_eq!(rec.initial[&OddsField::Odds1], 1.50);
    }

    #[test]
    fn test_compare_field_requires_both_sides() {
        assert!(compare_field(None, Some(2.0)).is_none());
        assert!(compare_field(Some(2.0), None).is_none());
        let cmp = compare_field(Some(2.0), Some(2.0)).unwrap();
        assert!(!cmp.significant);
        assert_relative_eq!(cmp.diff, 0.0);
    }

    #[test]
    fn test_failed_save_keeps_moved_reference() {
        let db = Database::open_in_memory().unwrap();
        let mut d = ChangeDetector::new(OddsHistory::load(db.clone()), 7);
        db.execute_batch("DROP TABLE odds_history;").unwrap();

        assert!(d.detect_changes(&odds1(2.00)).is_empty());
        assert!(d.history().save().is_err());

        let changes = d.detect_changes(&odds1(1.88));
        assert_eq!(changes.len(), 1);
        assert_relative_eq!(reference(&d, OddsField::Odds1), 1.88);

        // Still measured from the in-memory reference
        assert!(d.detect_changes(&odds1(1.85)).is_empty());
        assert_relative_eq!(reference(&d, OddsField::Odds1), 1.88);
    }
}
