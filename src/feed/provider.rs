use anyhow::Result;
use async_trait::async_trait;

use crate::db::models::Snapshot;

/// Trait that every odds feed must implement.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Return the current slate of matches. An empty map means "no data this cycle".
    async fn snapshot(&self) -> Result<Snapshot>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}
