use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::provider::FeedSource;
use crate::db::models::{MatchSnapshot, OddsField, OddsFields, Snapshot};

/// Feed backed by an HTTP endpoint serving an already-extracted odds document.
pub struct HttpFeed {
    http: Client,
    url: String,
}

impl HttpFeed {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(HttpFeed {
            http,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl FeedSource for HttpFeed {
    fn name(&self) -> &str {
        "http-feed"
    }

    async fn snapshot(&self) -> Result<Snapshot> {
        debug!("Fetching odds snapshot from {}", self.url);

        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .context("Odds feed request failed")?;

        if !resp.status().is_success() {
            anyhow::bail!("Odds feed error: {}", resp.status());
        }

        let raw: Value = resp
            .json()
            .await
            .context("Failed to parse odds feed response")?;

        Ok(parse_snapshot(&raw))
    }
}

/// Parse a feed document into a snapshot.
///
/// Accepted shapes: an object keyed by event key, `{"matches": [...]}`, or a
/// bare array. Entries without both team names are skipped; odds that are
/// neither numbers nor numeric strings drop just that field.
pub fn parse_snapshot(raw: &Value) -> Snapshot {
    let mut snapshot = Snapshot::new();

    let mut push = |key: Option<&str>, entry: &Value| match parse_match(entry) {
        Some(m) => {
            let key = key.map(str::to_string).unwrap_or_else(|| m.event_key());
            snapshot.insert(key, m);
        }
        None => warn!("Skipping feed entry without team names: {}", entry),
    };

    match raw {
        Value::Array(entries) => entries.iter().for_each(|e| push(None, e)),
        Value::Object(obj) => match obj.get("matches") {
            Some(Value::Array(entries)) => entries.iter().for_each(|e| push(None, e)),
            _ => obj.iter().for_each(|(k, e)| push(Some(k.as_str()), e)),
        },
        _ => warn!("Unexpected odds feed document: {}", raw),
    }

    snapshot
}

fn parse_match(entry: &Value) -> Option<MatchSnapshot> {
    let team1 = clean_team(entry["team1"].as_str()?);
    let team2 = clean_team(entry["team2"].as_str()?);
    if team1.is_empty() || team2.is_empty() {
        return None;
    }

    let odds: OddsFields = OddsField::ALL
        .into_iter()
        .filter_map(|field| parse_odds(&entry[field.as_str()]).map(|v| (field, v)))
        .collect();

    Some(MatchSnapshot {
        team1,
        team2,
        time: entry["time"].as_str().unwrap_or_default().trim().to_string(),
        odds,
        handicap1: text_field(&entry["handicap1"]),
        handicap2: text_field(&entry["handicap2"]),
    })
}

/// The page suffixes main-market participants with "(Match)".
fn clean_team(name: &str) -> String {
    name.replace("(Match)", "").trim().to_string()
}

fn parse_odds(v: &Value) -> Option<f64> {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
        .filter(|x: &f64| x.is_finite() && *x > 0.0)
}

fn text_field(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
