use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{format, Notifier};
use crate::db::models::Snapshot;
use crate::odds::OddsChange;

/// Telegram caps a message at 4096 characters; stay well below it.
const MAX_MESSAGE_CHARS: usize = 3500;

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

/// Telegram Bot API notifier.
///
/// New matches go to the early-line chat, movement alerts to the movement
/// chat. A missing chat id disables that stream.
#[derive(Clone)]
pub struct TelegramNotifier {
    http: Client,
    api_url: String,
    token: String,
    early_line_chat: Option<i64>,
    movement_chat: Option<i64>,
}

impl TelegramNotifier {
    pub fn new(
        api_url: &str,
        token: String,
        early_line_chat: Option<i64>,
        movement_chat: Option<i64>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(TelegramNotifier {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
            early_line_chat,
            movement_chat,
        })
    }

    /// POST one message to `sendMessage`.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_url, self.token);
        let body = SendMessage {
            chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Telegram request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Telegram API error {}: {}", status, body);
        }
        debug!("Sent {} chars to chat {}", text.len(), chat_id);
        Ok(())
    }

    /// Send every batch to `chat_id` in order. Fails if any batch failed.
    async fn send_all(&self, chat_id: i64, messages: Vec<String>) -> Result<()> {
        let mut failed = 0;
        let mut first_error = None;
        for text in &messages {
            if let Err(e) = self.send_message(chat_id, text).await {
                warn!("Telegram message to chat {} failed: {:#}", chat_id, e);
                failed += 1;
                first_error.get_or_insert(e);
            }
        }
        if let Some(first) = first_error {
            anyhow::bail!(
                "{} of {} Telegram message(s) failed, first: {:#}",
                failed,
                messages.len(),
                first
            );
        }
        Ok(())
    }
}

/// Join rendered blocks into messages that respect the size cap.
///
/// A block too large for one message is split on line breaks, and a single
/// overlong line is cut at a char boundary.
pub fn batch_messages(header: &str, blocks: &[String]) -> Vec<String> {
    let room = MAX_MESSAGE_CHARS.saturating_sub(header.len() + 1).max(1);
    let mut out = Vec::new();
    let mut current = String::from(header);
    for block in blocks.iter().flat_map(|b| split_block(b, room)) {
        if current.len() + block.len() + 1 > MAX_MESSAGE_CHARS && current.len() > header.len() {
            out.push(std::mem::replace(&mut current, String::from(header)));
        }
        current.push('\n');
        current.push_str(&block);
    }
    if current.len() > header.len() {
        out.push(current);
    }
    out
}

fn split_block(block: &str, max: usize) -> Vec<String> {
    if block.len() <= max {
        return vec![block.to_string()];
    }
    let mut parts = Vec::new();
    let mut part = String::new();
    for line in block.lines().flat_map(|l| split_line(l, max)) {
        if !part.is_empty() && part.len() + line.len() + 1 > max {
            parts.push(std::mem::take(&mut part));
        }
        if !part.is_empty() {
            part.push('\n');
        }
        part.push_str(line);
    }
    if !part.is_empty() {
        parts.push(part);
    }
    parts
}

fn split_line(line: &str, max: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = line;
    while rest.len() > max {
        let mut cut = max;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            // A single char wider than `max`; emit it whole
            cut = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }
        let (head, tail) = rest.split_at(cut);
        pieces.push(head);
        rest = tail;
    }
    pieces.push(rest);
    pieces
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn notify_new_matches(&self, matches: &Snapshot) -> Result<()> {
        let Some(chat_id) = self.early_line_chat else {
            warn!("No early-line chat configured, dropping {} new match(es)", matches.len());
            return Ok(());
        };
        let blocks: Vec<String> = matches
            .iter()
            .map(|(key, m)| format::render_new_match(key, m))
            .collect();
        let messages = batch_messages("🎮 <b>New matches</b>\n", &blocks);
        info!("Announcing {} new match(es) in {} message(s)", matches.len(), messages.len());
        self.send_all(chat_id, messages).await
    }

    async fn notify_odds_changes(&self, changes: &[OddsChange]) -> Result<()> {
        let Some(chat_id) = self.movement_chat else {
            warn!("No movement chat configured, dropping {} alert(s)", changes.len());
            return Ok(());
        };
        let blocks: Vec<String> = changes.iter().map(format::render_odds_change).collect();
        let messages = batch_messages("📊 <b>Odds movement</b>\n", &blocks);
        info!("Sending {} odds alert(s) in {} message(s)", changes.len(), messages.len());
        self.send_all(chat_id, messages).await
    }
}
