use anyhow::Result;
use eduopp_channels::ChannelRegistry;
use eduopp_core::{AppContext, Config};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing;
use tracing_subscriber;

const INBOUND_QUEUE_DEPTH: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting EduOpp Relay");

    let config = Config::from_env();
    let ctx = AppContext::connect(config).await?;

    tracing::info!("Application context initialized");

    // Channel sessions are process-wide: built once, started once, shared.
    let channels = Arc::new(ChannelRegistry::from_config(&ctx.config.channels));
    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_DEPTH);
    channels.start_all(inbound_tx).await;

    let consumer_ctx = ctx.clone();
    let consumer_channels = channels.clone();
    tokio::spawn(async move {
        eduopp_inbound::run(consumer_ctx, consumer_channels, inbound_rx).await;
    });

    // API server runs in the main task until shutdown.
    tokio::select! {
        result = eduopp_api::run(ctx, channels.clone()) => {
            if let Err(e) = result {
                tracing::error!("API server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    channels.stop_all().await;
    tracing::info!("EduOpp Relay stopped");

    Ok(())
}
