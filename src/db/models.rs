use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One of the four odds lines the feed exposes per match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OddsField {
    /// Money line, first team
    Odds1,
    /// Money line, second team
    Odds2,
    /// Handicap price, first team
    HandicapOdd1,
    /// Handicap price, second team
    HandicapOdd2,
}

impl OddsField {
    pub const ALL: [OddsField; 4] = [
        OddsField::Odds1,
        OddsField::Odds2,
        OddsField::HandicapOdd1,
        OddsField::HandicapOdd2,
    ];

    /// Name used in the feed document and in persisted rows.
    pub fn as_str(self) -> &'static str {
        match self {
            OddsField::Odds1 => "odds1",
            OddsField::Odds2 => "odds2",
            OddsField::HandicapOdd1 => "handicap_odd1",
            OddsField::HandicapOdd2 => "handicap_odd2",
        }
    }
}

impl fmt::Display for OddsField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field → decimal odds. A missing entry means the page did not show that line.
pub type OddsFields = BTreeMap<OddsField, f64>;

/// A single match as reported by the feed in one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub team1: String,
    pub team2: String,
    /// Start time as printed on the page, expected "HH:MM"
    pub time: String,
    pub odds: OddsFields,
    /// Handicap line for team1, e.g. "-1.5" (display only)
    pub handicap1: Option<String>,
    /// Handicap line for team2, e.g. "+1.5" (display only)
    pub handicap2: Option<String>,
}

impl MatchSnapshot {
    /// Stable identifier used by both stores: "TeamA vs TeamB".
    pub fn event_key(&self) -> String {
        format!("{} vs {}", self.team1, self.team2)
    }
}

/// One feed sample: event key → match.
pub type Snapshot = BTreeMap<String, MatchSnapshot>;

/// Per-event state kept by the odds history store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingRecord {
    /// Odds at first observation; never overwritten
    pub initial: OddsFields,
    /// Reference for the next significance test; moves only on a reported movement
    pub last_reported: OddsFields,
    /// Sample from the preceding cycle (diagnostics only)
    pub previous: Option<OddsFields>,
    /// Latest sample
    pub current: OddsFields,
    pub last_updated: DateTime<Utc>,
}

/// Per-event state kept by the new-match tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownMatch {
    pub event_key: String,
    /// Last reported start time, "HH:MM" as scraped (may be malformed)
    pub start_time: String,
    pub last_seen: DateTime<Utc>,
}
