use async_trait::async_trait;
use graph_flow::{Context, NextAction, Result, Task, TaskResult};
use reqwest::Client;
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::context_keys;
use crate::config::TelegramConfig;
use crate::models::NotificationStatus;

pub const TELEGRAM_ENDPOINT: &str = "https://api.telegram.org";

/// Telegram rejects messages above 4096 characters
pub const TELEGRAM_CHUNK_CHARS: usize = 4000;

/// Split `text` into contiguous pieces of at most `max_chars` characters.
pub fn chunk_message(text: &str, max_chars: usize) -> Vec<&str> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        let split = rest
            .char_indices()
            .nth(max_chars)
            .map(|(index, _)| index)
            .unwrap_or(rest.len());
        let (chunk, tail) = rest.split_at(split);
        chunks.push(chunk);
        rest = tail;
    }
    chunks
}

/// Delivery channel for finished recommendations
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send `text`, returning the number of messages issued. Delivery
    /// problems are logged, never returned.
    async fn deliver(&self, text: &str) -> usize;
}

pub struct TelegramNotifier {
    http: Client,
    send_url: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            http: Client::new(),
            send_url: format!(
                "{}/bot{}/sendMessage",
                config.api_url.trim_end_matches('/'),
                config.bot_token.expose_secret()
            ),
            chat_id: config.chat_id.clone(),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn deliver(&self, text: &str) -> usize {
        let chunks = chunk_message(text, TELEGRAM_CHUNK_CHARS);
        for (index, chunk) in chunks.iter().enumerate() {
            let sent = self
                .http
                .post(&self.send_url)
                .form(&[("chat_id", self.chat_id.as_str()), ("text", *chunk)])
                .send()
                .await;
            match sent {
                Ok(response) => {
                    debug!(chunk = index + 1, status = %response.status(), "Telegram chunk posted")
                }
                // The URL carries the bot token, keep it out of the logs
                Err(e) => warn!(chunk = index + 1, error = %e.without_url(), "Telegram chunk failed"),
            }
        }
        chunks.len()
    }
}

/// Forwards the recommendation and ends the run
pub struct NotificationTask {
    notifier: Option<Arc<dyn Notifier>>,
}

impl NotificationTask {
    pub fn new(notifier: Option<Arc<dyn Notifier>>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl Task for NotificationTask {
    async fn run(&self, context: Context) -> Result<TaskResult> {
        let recommendation: String = context.require(context_keys::RECOMMENDATION)?;

        let status = match &self.notifier {
            Some(notifier) => {
                let chunks = notifier.deliver(&recommendation).await;
                info!(chunks, "Recommendation sent to Telegram");
                NotificationStatus::Delivered { chunks }
            }
            None => {
                warn!("Telegram credentials not configured, skipping delivery");
                NotificationStatus::Skipped {
                    reason: "Telegram bot token or chat id not configured".to_string(),
                }
            }
        };

        let message = match &status {
            NotificationStatus::Delivered { chunks } => {
                format!("Recommendation sent to Telegram in {chunks} message(s)")
            }
            NotificationStatus::Skipped { reason } => format!("Telegram delivery skipped: {reason}"),
        };
        context.set(context_keys::NOTIFICATION, &status)?;

        Ok(TaskResult::new_with_status(
            Some(recommendation),
            NextAction::End,
            Some(message),
        ))
    }
}
