use eduopp_channels::{ChannelRegistry, InboundMessage};
use eduopp_core::AppContext;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing;

use crate::commands;

/// Drain the inbound queue fed by channel poll loops and webhooks, produce
/// a reply per message, and send it back on the originating channel. One
/// bad message is logged and skipped, never fatal to the loop.
pub async fn run(
    ctx: AppContext,
    channels: Arc<ChannelRegistry>,
    mut inbound: mpsc::Receiver<InboundMessage>,
) {
    tracing::info!("Starting inbound message consumer");

    while let Some(message) = inbound.recv().await {
        tracing::debug!(channel = %message.channel, sender = %message.sender, "Inbound message");

        let reply = match commands::respond(&ctx, &message).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(
                    channel = %message.channel,
                    sender = %message.sender,
                    error = %e,
                    "Failed to process inbound message"
                );
                commands::ERROR_REPLY.to_string()
            }
        };

        if !channels.send(message.channel, &message.sender, &reply).await {
            tracing::warn!(
                channel = %message.channel,
                sender = %message.sender,
                "Failed to deliver reply"
            );
        }
    }

    tracing::info!("Inbound queue closed, consumer stopping");
}
