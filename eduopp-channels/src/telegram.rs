use async_trait::async_trait;
use eduopp_core::config::ChannelsConfig;
use eduopp_core::types::ChannelKind;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing;

use crate::channel::{Channel, InboundEvent, InboundMessage, InboundPayload};

const API_BASE: &str = "https://api.telegram.org";
const POLL_TIMEOUT_SECS: u64 = 25;

/// Telegram Bot API channel. Outbound goes through `sendMessage`; inbound
/// arrives either from the long-poll loop started by `start` or from the
/// webhook endpoint, both normalized by `receive`.
pub struct TelegramChannel {
    client: Option<Arc<reqwest::Client>>,
    token: Option<String>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl TelegramChannel {
    pub fn new(config: &ChannelsConfig) -> Self {
        let (client, token) = match &config.telegram_bot_token {
            Some(token) => {
                let client = reqwest::Client::builder()
                    // Must outlive the long-poll window.
                    .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 10))
                    .build()
                    .ok()
                    .map(Arc::new);
                (client, Some(token.clone()))
            }
            None => {
                tracing::warn!("Telegram channel disabled (missing bot token)");
                (None, None)
            }
        };
        Self {
            client,
            token,
            poll_task: Mutex::new(None),
        }
    }

    fn method_url(token: &str, method: &str) -> String {
        format!("{}/bot{}/{}", API_BASE, token, method)
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Telegram
    }

    fn is_configured(&self) -> bool {
        self.client.is_some() && self.token.is_some()
    }

    async fn start(&self, inbound: mpsc::Sender<InboundMessage>) -> anyhow::Result<()> {
        let (client, token) = match (&self.client, &self.token) {
            (Some(client), Some(token)) => (client.clone(), token.clone()),
            _ => {
                tracing::warn!("Telegram channel not configured, skipping start");
                return Ok(());
            }
        };

        let me: Value = client
            .get(Self::method_url(&token, "getMe"))
            .send()
            .await?
            .json()
            .await?;
        let username = me
            .pointer("/result/username")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        tracing::info!(bot = username, "Telegram channel started, polling for updates");

        let handle = tokio::spawn(poll_updates(client, token, inbound));
        *self.poll_task.lock().await = Some(handle);
        Ok(())
    }

    async fn stop(&self) {
        if let Some(handle) = self.poll_task.lock().await.take() {
            handle.abort();
        }
        tracing::info!("Telegram channel stopped");
    }

    async fn send(&self, recipient: &str, text: &str) -> bool {
        let (client, token) = match (&self.client, &self.token) {
            (Some(client), Some(token)) => (client, token),
            _ => {
                tracing::debug!("Telegram not configured, skipping send");
                return false;
            }
        };

        let payload = serde_json::json!({
            "chat_id": recipient,
            "text": text,
            "parse_mode": "Markdown",
        });
        match client
            .post(Self::method_url(token, "sendMessage"))
            .json(&payload)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                tracing::error!(recipient, status = %resp.status(), "Telegram rejected message");
                false
            }
            Err(e) => {
                tracing::error!(recipient, error = %e, "Failed to send Telegram message");
                false
            }
        }
    }

    fn receive(&self, payload: InboundPayload) -> anyhow::Result<InboundEvent> {
        let InboundPayload::Json(update) = payload else {
            anyhow::bail!("Telegram webhook expects a JSON update");
        };
        Ok(normalize_update(&update).map_or(InboundEvent::Ignored, InboundEvent::Message))
    }
}

async fn poll_updates(
    client: Arc<reqwest::Client>,
    token: String,
    inbound: mpsc::Sender<InboundMessage>,
) {
    let url = TelegramChannel::method_url(&token, "getUpdates");
    let mut offset: i64 = 0;
    let mut error_count = 0u32;

    loop {
        let result = client
            .get(&url)
            .query(&[
                ("timeout", POLL_TIMEOUT_SECS.to_string()),
                ("offset", offset.to_string()),
            ])
            .send()
            .await;

        let body: Result<Value, _> = match result {
            Ok(resp) => resp.json().await,
            Err(e) => Err(e),
        };

        match body {
            Ok(body) => {
                error_count = 0;
                let updates = body
                    .get("result")
                    .and_then(|r| r.as_array())
                    .cloned()
                    .unwrap_or_default();
                for update in updates {
                    if let Some(update_id) = update.get("update_id").and_then(|v| v.as_i64()) {
                        offset = offset.max(update_id + 1);
                    }
                    if let Some(message) = normalize_update(&update) {
                        if inbound.send(message).await.is_err() {
                            tracing::info!("Inbound queue closed, stopping Telegram poll loop");
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                error_count += 1;
                tracing::warn!(error = %e, error_count, "Telegram poll failed");
                // Exponential backoff: 2s, 4s, ... capped at 30s.
                let backoff =
                    Duration::from_secs(1 << error_count.min(5)).min(Duration::from_secs(30));
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

fn normalize_update(update: &Value) -> Option<InboundMessage> {
    let message = update.get("message")?;
    let text = message.get("text")?.as_str()?;
    let chat_id = message.pointer("/chat/id")?.as_i64()?;
    Some(InboundMessage {
        channel: ChannelKind::Telegram,
        sender: chat_id.to_string(),
        text: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_text_updates() {
        let update = serde_json::json!({
            "update_id": 10,
            "message": {
                "chat": {"id": 12345},
                "text": "/subscribe 3",
            }
        });
        let message = normalize_update(&update).unwrap();
        assert_eq!(message.sender, "12345");
        assert_eq!(message.text, "/subscribe 3");
        assert_eq!(message.channel, ChannelKind::Telegram);
    }

    #[test]
    fn ignores_updates_without_text() {
        let update = serde_json::json!({
            "update_id": 11,
            "message": {"chat": {"id": 1}, "photo": []}
        });
        assert!(normalize_update(&update).is_none());
    }
}
