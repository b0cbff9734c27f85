use async_trait::async_trait;
use eduopp_core::config::ChannelsConfig;
use eduopp_core::types::ChannelKind;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing;

use crate::discord::DiscordChannel;
use crate::telegram::TelegramChannel;
use crate::whatsapp::WhatsappChannel;

/// Raw webhook payload as the platform delivered it.
#[derive(Debug, Clone)]
pub enum InboundPayload {
    Json(serde_json::Value),
    Form(HashMap<String, String>),
}

/// A platform-agnostic inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub channel: ChannelKind,
    pub sender: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Message(InboundMessage),
    /// A payload the channel understands but has nothing to do with
    /// (edits, bot echoes, delivery receipts).
    Ignored,
}

/// One chat platform. Implementations hold the long-lived platform session
/// and are process-wide: constructed once at startup and shared.
#[async_trait]
pub trait Channel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    fn is_configured(&self) -> bool;

    /// Acquire the platform session and begin listening where the platform
    /// supports it. Missing credentials make this a no-op with a logged
    /// warning, never an error that blocks the rest of startup.
    async fn start(&self, inbound: mpsc::Sender<InboundMessage>) -> anyhow::Result<()>;

    /// Release resources. Safe to call even if `start` never completed.
    async fn stop(&self);

    /// Deliver one message. Never fails upward: internal errors are logged
    /// with recipient context and flattened to `false`.
    async fn send(&self, recipient: &str, text: &str) -> bool;

    /// Normalize a webhook payload into an inbound event.
    fn receive(&self, payload: InboundPayload) -> anyhow::Result<InboundEvent>;
}

/// The set of platform channels, keyed on kind. Built once from config and
/// passed explicitly to whoever needs to send.
pub struct ChannelRegistry {
    channels: HashMap<ChannelKind, Arc<dyn Channel>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        ChannelRegistry {
            channels: HashMap::new(),
        }
    }

    pub fn from_config(config: &ChannelsConfig) -> Self {
        let mut registry = ChannelRegistry::new();
        registry.register(Arc::new(TelegramChannel::new(config)));
        registry.register(Arc::new(DiscordChannel::new(config)));
        registry.register(Arc::new(WhatsappChannel::new(config)));
        registry
    }

    pub fn register(&mut self, channel: Arc<dyn Channel>) {
        self.channels.insert(channel.kind(), channel);
    }

    pub fn get(&self, kind: ChannelKind) -> Option<Arc<dyn Channel>> {
        self.channels.get(&kind).cloned()
    }

    pub fn kinds(&self) -> Vec<ChannelKind> {
        self.channels.keys().copied().collect()
    }

    /// Send on one channel; an unregistered kind is a logged failure, not
    /// an error.
    pub async fn send(&self, kind: ChannelKind, recipient: &str, text: &str) -> bool {
        match self.get(kind) {
            Some(channel) => channel.send(recipient, text).await,
            None => {
                tracing::error!(channel = %kind, "No channel registered for platform");
                false
            }
        }
    }

    pub async fn start_all(&self, inbound: mpsc::Sender<InboundMessage>) {
        let starts = self.channels.values().map(|channel| {
            let tx = inbound.clone();
            async move {
                if let Err(e) = channel.start(tx).await {
                    tracing::error!(channel = %channel.kind(), error = %e, "Channel failed to start");
                }
            }
        });
        futures::future::join_all(starts).await;
    }

    pub async fn stop_all(&self) {
        futures::future::join_all(self.channels.values().map(|channel| channel.stop())).await;
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
