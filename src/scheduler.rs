//! The two periodic jobs: odds-movement alerts and new-match announcements.
//!
//! Each job runs in its own task and awaits its cycle inline, so a cycle
//! never overlaps the next firing of the same job. The two jobs may run at
//! the same time; they share no mutable state.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::feed::FeedSource;
use crate::matches::MatchTracker;
use crate::notify::Notifier;
use crate::odds::ChangeDetector;

/// One odds cycle. Returns the number of alerted events.
///
/// A feed failure aborts the cycle before any store is touched.
pub async fn run_odds_cycle(
    feed: &dyn FeedSource,
    detector: &mut ChangeDetector,
    notifier: &dyn Notifier,
) -> Result<usize> {
    let snapshot = feed
        .snapshot()
        .await
        .with_context(|| format!("feed '{}' failed", feed.name()))?;

    let changes = detector.detect_changes(&snapshot);
    if !changes.is_empty() {
        if let Err(e) = notifier.notify_odds_changes(&changes).await {
            error!("Notifier '{}' failed to deliver odds alerts: {:#}", notifier.name(), e);
        }
    }
    Ok(changes.len())
}

/// One new-match cycle. Returns the number of announced matches.
pub async fn run_matches_cycle(
    feed: &dyn FeedSource,
    tracker: &mut MatchTracker,
    notifier: &dyn Notifier,
) -> Result<usize> {
    let snapshot = feed
        .snapshot()
        .await
        .with_context(|| format!("feed '{}' failed", feed.name()))?;

    let new_matches = tracker.find_new(&snapshot);
    if !new_matches.is_empty() {
        if let Err(e) = notifier.notify_new_matches(&new_matches).await {
            error!("Notifier '{}' failed to deliver new matches: {:#}", notifier.name(), e);
        }
    }
    Ok(new_matches.len())
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Spawn the odds-movement job. The detector is owned by the task.
pub fn spawn_odds_job(
    feed: Arc<dyn FeedSource>,
    mut detector: ChangeDetector,
    notifier: Arc<dyn Notifier>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Odds job started (feed={}, interval={:?})", feed.name(), period);
        let mut interval = ticker(period);
        loop {
            interval.tick().await;
            if let Err(e) = run_odds_cycle(feed.as_ref(), &mut detector, notifier.as_ref()).await {
                warn!("Odds cycle aborted: {:#}", e);
            }
        }
    })
}

/// Spawn the new-match job. The tracker is owned by the task.
pub fn spawn_matches_job(
    feed: Arc<dyn FeedSource>,
    mut tracker: MatchTracker,
    notifier: Arc<dyn Notifier>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Match job started (feed={}, interval={:?})", feed.name(), period);
        let mut interval = ticker(period);
        loop {
            interval.tick().await;
            if let Err(e) = run_matches_cycle(feed.as_ref(), &mut tracker, notifier.as_ref()).await
            {
                warn!("Match cycle aborted: {:#}", e);
            }
        }
    })
}
