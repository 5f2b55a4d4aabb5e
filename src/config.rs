use clap::Parser;

/// Bookmaker odds watcher: movement alerts and new-match announcements
#[derive(Parser, Debug, Clone)]
#[command(name = "oddswatch", version, about)]
pub struct Config {
    /// SQLite database path (odds history + known matches)
    #[arg(long, env = "DATABASE_PATH", default_value = "oddswatch.db")]
    pub database_path: String,

    /// URL serving the current odds snapshot as JSON
    #[arg(long, env = "FEED_URL")]
    pub feed_url: String,

    /// Feed request timeout in seconds
    #[arg(long, env = "FEED_TIMEOUT_SECS", default_value = "30")]
    pub feed_timeout_secs: u64,

    /// Interval between odds-movement cycles in seconds
    #[arg(long, env = "UPDATE_INTERVAL", default_value = "300")]
    pub odds_interval_secs: u64,

    /// Interval between new-match cycles in seconds
    #[arg(long, env = "MATCHES_INTERVAL", default_value = "300")]
    pub matches_interval_secs: u64,

    /// Days an event may go unseen before its history is dropped
    #[arg(long, env = "RETENTION_DAYS", default_value = "7")]
    pub retention_days: u32,

    /// Start-time drift (minutes) still considered the same fixture
    #[arg(long, env = "TIME_BUFFER_MINUTES", default_value = "300")]
    pub time_buffer_minutes: u16,

    /// Telegram Bot API base URL
    #[arg(long, env = "TELEGRAM_API_URL", default_value = "https://api.telegram.org")]
    pub telegram_api_url: String,

    /// Telegram bot token; alerts are only logged when unset
    #[arg(long, env = "TELEGRAM_TOKEN")]
    pub telegram_token: Option<String>,

    /// Chat receiving new-match announcements
    #[arg(long, env = "EARLY_LINE_CHAT_ID", allow_hyphen_values = true)]
    pub early_line_chat_id: Option<i64>,

    /// Chat receiving odds-movement alerts
    #[arg(long, env = "MOVEMENT_CHAT_ID", allow_hyphen_values = true)]
    pub movement_chat_id: Option<i64>,

    /// Default log filter when RUST_LOG is not set
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// Also append plain-text logs to this file
    #[arg(long, env = "LOG_FILE")]
    pub log_file: Option<String>,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.feed_url.trim().is_empty() {
            anyhow::bail!("feed_url must not be empty");
        }
        if self.odds_interval_secs == 0 || self.matches_interval_secs == 0 {
            anyhow::bail!("cycle intervals must be at least 1 second");
        }
        if self.feed_timeout_secs == 0 {
            anyhow::bail!("feed_timeout_secs must be positive");
        }
        if self.retention_days == 0 {
            anyhow::bail!("retention_days must be positive");
        }
        if self.time_buffer_minutes > 720 {
            anyhow::bail!("time_buffer_minutes must not exceed 720 (half a day)");
        }
        if self.telegram_token.is_some()
            && self.early_line_chat_id.is_none()
            && self.movement_chat_id.is_none()
        {
            anyhow::bail!(
                "TELEGRAM_TOKEN is set but neither EARLY_LINE_CHAT_ID nor MOVEMENT_CHAT_ID is"
            );
        }
        Ok(())
    }
}
