pub mod format;
pub mod telegram;

pub use telegram::TelegramNotifier;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::db::models::Snapshot;
use crate::odds::OddsChange;

/// Delivery side for both detection cycles.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Announce fixtures seen for the first time, keyed by event key.
    async fn notify_new_matches(&self, matches: &Snapshot) -> Result<()>;

    /// Alert on events with at least one significant movement.
    async fn notify_odds_changes(&self, changes: &[OddsChange]) -> Result<()>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

/// Writes rendered messages to the log. Used when no bot token is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify_new_matches(&self, matches: &Snapshot) -> Result<()> {
        for (key, m) in matches {
            info!("New match:\n{}", format::render_new_match(key, m));
        }
        Ok(())
    }

    async fn notify_odds_changes(&self, changes: &[OddsChange]) -> Result<()> {
        for c in changes {
            info!("Odds movement:\n{}", format::render_odds_change(c));
        }
        Ok(())
    }
}
