use anyhow::{Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter, Layer};

mod config;
mod db;
mod feed;
mod matches;
mod notify;
mod odds;
mod scheduler;

use config::Config;
use db::Database;
use feed::{FeedSource, HttpFeed};
use matches::MatchTracker;
use notify::{LogNotifier, Notifier, TelegramNotifier};
use odds::{ChangeDetector, OddsHistory};

fn init_logging(config: &Config) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let stdout = if config.log_json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().boxed()
    };

    // Rotation is left to the host (logrotate with copytruncate)
    let file = match &config.log_file {
        Some(path) => {
            if let Some(dir) = Path::new(path).parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout)
        .with(file)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    init_logging(&config)?;
    config.validate()?;

    // Open database
    let db = Database::open(&config.database_path)?;
    info!("Database opened: {}", config.database_path);

    let feed: Arc<dyn FeedSource> = Arc::new(HttpFeed::new(
        &config.feed_url,
        Duration::from_secs(config.feed_timeout_secs),
    )?);

    let notifier: Arc<dyn Notifier> = match &config.telegram_token {
        Some(token) => Arc::new(TelegramNotifier::new(
            &config.telegram_api_url,
            token.clone(),
            config.early_line_chat_id,
            config.movement_chat_id,
        )?),
        None => {
            warn!("TELEGRAM_TOKEN not set – alerts will only be logged");
            Arc::new(LogNotifier)
        }
    };
    info!("Feed: {}, notifier: {}", config.feed_url, notifier.name());

    // Each job owns its store for the lifetime of the process
    let detector = ChangeDetector::new(OddsHistory::load(db.clone()), config.retention_days);
    let tracker = MatchTracker::load(
        db.clone(),
        config.time_buffer_minutes,
        config.retention_days,
    );
    info!(
        "Tracking {} event(s), {} known match(es)",
        detector.history().len(),
        tracker.len()
    );

    let odds_job = scheduler::spawn_odds_job(
        Arc::clone(&feed),
        detector,
        Arc::clone(&notifier),
        Duration::from_secs(config.odds_interval_secs),
    );
    let matches_job = scheduler::spawn_matches_job(
        feed,
        tracker,
        notifier,
        Duration::from_secs(config.matches_interval_secs),
    );

    tokio::select! {
        res = odds_job => error!("Odds job exited unexpectedly: {:?}", res),
        res = matches_job => error!("Match job exited unexpectedly: {:?}", res),
        _ = tokio::signal::ctrl_c() => info!("Shutdown requested"),
    }

    Ok(())
}
