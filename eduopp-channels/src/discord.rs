use async_trait::async_trait;
use eduopp_core::config::ChannelsConfig;
use eduopp_core::types::ChannelKind;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing;

use crate::channel::{Channel, InboundEvent, InboundMessage, InboundPayload};

const API_BASE: &str = "https://discord.com/api/v10";

/// Discord REST channel. Outbound messages go through a DM channel created
/// per recipient; inbound message events arrive via the webhook endpoint
/// only (no gateway session is held).
pub struct DiscordChannel {
    client: Option<Arc<reqwest::Client>>,
    token: Option<String>,
}

impl DiscordChannel {
    pub fn new(config: &ChannelsConfig) -> Self {
        let (client, token) = match &config.discord_bot_token {
            Some(token) => {
                let client = reqwest::Client::builder()
                    .timeout(Duration::from_secs(30))
                    .build()
                    .ok()
                    .map(Arc::new);
                (client, Some(token.clone()))
            }
            None => {
                tracing::warn!("Discord channel disabled (missing bot token)");
                (None, None)
            }
        };
        Self { client, token }
    }
}

#[async_trait]
impl Channel for DiscordChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Discord
    }

    fn is_configured(&self) -> bool {
        self.client.is_some() && self.token.is_some()
    }

    async fn start(&self, _inbound: mpsc::Sender<InboundMessage>) -> anyhow::Result<()> {
        let (client, token) = match (&self.client, &self.token) {
            (Some(client), Some(token)) => (client, token),
            _ => {
                tracing::warn!("Discord channel not configured, skipping start");
                return Ok(());
            }
        };

        let me: Value = client
            .get(format!("{}/users/@me", API_BASE))
            .header("Authorization", format!("Bot {}", token))
            .send()
            .await?
            .json()
            .await?;
        let username = me.get("username").and_then(|v| v.as_str()).unwrap_or("unknown");
        tracing::info!(bot = username, "Discord channel started (webhook mode)");
        Ok(())
    }

    async fn stop(&self) {
        tracing::info!("Discord channel stopped");
    }

    async fn send(&self, recipient: &str, text: &str) -> bool {
        let (client, token) = match (&self.client, &self.token) {
            (Some(client), Some(token)) => (client, token),
            _ => {
                tracing::debug!("Discord not configured, skipping send");
                return false;
            }
        };
        let auth = format!("Bot {}", token);

        // DMs require a channel per recipient; create (or fetch) it first.
        let dm: Value = match client
            .post(format!("{}/users/@me/channels", API_BASE))
            .header("Authorization", &auth)
            .json(&serde_json::json!({"recipient_id": recipient}))
            .send()
            .await
        {
            Ok(resp) => match resp.json().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::error!(recipient, error = %e, "Failed to parse Discord DM channel");
                    return false;
                }
            },
            Err(e) => {
                tracing::error!(recipient, error = %e, "Failed to open Discord DM channel");
                return false;
            }
        };
        let Some(channel_id) = dm.get("id").and_then(|v| v.as_str()) else {
            tracing::error!(recipient, "Discord DM channel response missing id");
            return false;
        };

        match client
            .post(format!("{}/channels/{}/messages", API_BASE, channel_id))
            .header("Authorization", &auth)
            .json(&serde_json::json!({"content": text}))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                tracing::error!(recipient, status = %resp.status(), "Discord rejected message");
                false
            }
            Err(e) => {
                tracing::error!(recipient, error = %e, "Failed to send Discord message");
                false
            }
        }
    }

    fn receive(&self, payload: InboundPayload) -> anyhow::Result<InboundEvent> {
        let InboundPayload::Json(event) = payload else {
            anyhow::bail!("Discord webhook expects a JSON event");
        };
        // Drop bot echoes so replies never loop back in.
        if event.pointer("/author/bot").and_then(|v| v.as_bool()) == Some(true) {
            return Ok(InboundEvent::Ignored);
        }
        let author = event
            .pointer("/author/id")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let content = event.get("content").and_then(|v| v.as_str());
        match (author, content) {
            (Some(sender), Some(text)) if !text.is_empty() => {
                Ok(InboundEvent::Message(InboundMessage {
                    channel: ChannelKind::Discord,
                    sender,
                    text: text.to_string(),
                }))
            }
            _ => Ok(InboundEvent::Ignored),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eduopp_core::config::Config;

    fn unconfigured() -> DiscordChannel {
        DiscordChannel::new(&Config::default().channels)
    }

    #[test]
    fn normalizes_message_events() {
        let channel = unconfigured();
        let event = serde_json::json!({
            "author": {"id": "555", "bot": false},
            "content": "/opportunities",
        });
        let InboundEvent::Message(message) = channel.receive(InboundPayload::Json(event)).unwrap()
        else {
            panic!("expected a message");
        };
        assert_eq!(message.sender, "555");
    }

    #[test]
    fn drops_bot_echoes() {
        let channel = unconfigured();
        let event = serde_json::json!({
            "author": {"id": "999", "bot": true},
            "content": "echo",
        });
        assert_eq!(
            channel.receive(InboundPayload::Json(event)).unwrap(),
            InboundEvent::Ignored
        );
    }

    #[tokio::test]
    async fn unconfigured_send_is_a_clean_failure() {
        assert!(!unconfigured().send("1", "hello").await);
    }
}
