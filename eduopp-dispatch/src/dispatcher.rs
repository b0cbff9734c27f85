use eduopp_core::types::{ChannelKind, DeliveryStatus, NewDelivery, User};
use eduopp_core::{AppContext, Error, Result};
use eduopp_channels::ChannelRegistry;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing;

use crate::format::{format_opportunity_alert, format_welcome};

/// Outcome of one alert fan-out. `failed > 0` with `delivered > 0` is the
/// partial-success case: some channels took the message, some did not.
#[derive(Debug, Default, Clone, Serialize)]
pub struct DispatchReport {
    /// Sends actually attempted (excludes duplicates that were skipped).
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
    /// (user, channel) pairs suppressed because this opportunity was
    /// already delivered there.
    pub skipped: usize,
}

impl DispatchReport {
    pub fn all_delivered(&self) -> bool {
        self.failed == 0
    }
}

/// Fans an opportunity alert out to every active binding of every target
/// user. A failing or stuck channel never blocks delivery to the others:
/// each send is bounded by a timeout, retried a bounded number of times,
/// and its outcome recorded individually.
pub struct Dispatcher {
    ctx: AppContext,
    channels: Arc<ChannelRegistry>,
}

impl Dispatcher {
    pub fn new(ctx: AppContext, channels: Arc<ChannelRegistry>) -> Self {
        Self { ctx, channels }
    }

    /// Alert targets are the explicit user set when given, otherwise all
    /// users with an active subscription to the opportunity. Fails fast
    /// only when the opportunity itself cannot be resolved.
    pub async fn send_opportunity_alert(
        &self,
        opportunity_id: i64,
        user_ids: Option<Vec<i64>>,
    ) -> Result<DispatchReport> {
        let opp = self
            .ctx
            .store
            .opportunity(opportunity_id)
            .await?
            .ok_or(Error::NotFound("opportunity"))?;
        if !opp.status.is_active() {
            return Err(Error::NotFound("opportunity"));
        }

        let target_ids = match user_ids {
            Some(ids) => ids,
            None => self.ctx.store.subscriber_ids(opportunity_id).await?,
        };
        let targets: Vec<User> = self
            .ctx
            .store
            .users_by_ids(&target_ids)
            .await?
            .into_iter()
            .filter(|user| user.status.is_active())
            .collect();

        let message = format_opportunity_alert(&opp);
        let mut report = DispatchReport::default();

        for user in &targets {
            let bindings = match self.ctx.store.bindings_for_user(user.id).await {
                Ok(bindings) => bindings,
                Err(e) => {
                    // One user's broken binding lookup must not sink the
                    // rest of the fan-out.
                    tracing::error!(user_id = user.id, error = %e, "Failed to load bindings");
                    continue;
                }
            };

            for binding in bindings.iter().filter(|b| b.status.is_active()) {
                match self
                    .ctx
                    .store
                    .has_sent_delivery(user.id, opp.id, binding.channel)
                    .await
                {
                    Ok(true) => {
                        tracing::debug!(
                            user_id = user.id,
                            channel = %binding.channel,
                            opportunity_id = opp.id,
                            "Already delivered, skipping"
                        );
                        report.skipped += 1;
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        tracing::error!(user_id = user.id, error = %e, "Delivery lookup failed");
                    }
                }

                report.attempted += 1;
                let delivered = self
                    .send_with_retry(binding.channel, &binding.address, &message)
                    .await;
                if delivered {
                    report.delivered += 1;
                } else {
                    report.failed += 1;
                    tracing::error!(
                        user_id = user.id,
                        channel = %binding.channel,
                        address = %binding.address,
                        opportunity_id = opp.id,
                        "Failed to deliver opportunity alert"
                    );
                }

                let record = NewDelivery {
                    user_id: user.id,
                    opportunity_id: Some(opp.id),
                    channel: binding.channel,
                    message: message.clone(),
                    status: if delivered {
                        DeliveryStatus::Sent
                    } else {
                        DeliveryStatus::Failed
                    },
                };
                if let Err(e) = self.ctx.store.append_delivery(record).await {
                    tracing::error!(user_id = user.id, error = %e, "Failed to record delivery");
                }
            }
        }

        tracing::info!(
            opportunity_id = opp.id,
            users = targets.len(),
            delivered = report.delivered,
            failed = report.failed,
            skipped = report.skipped,
            "Opportunity alert dispatched"
        );
        Ok(report)
    }

    /// Welcome fan-out for a new user: same per-binding isolation rules as
    /// alerts, but a system message, so nothing is written to the delivery
    /// log.
    pub async fn send_welcome(&self, user_id: i64) -> Result<()> {
        let user = self
            .ctx
            .store
            .user(user_id)
            .await?
            .ok_or(Error::NotFound("user"))?;
        let message = format_welcome(&user);

        let bindings = self.ctx.store.bindings_for_user(user.id).await?;
        for binding in bindings.iter().filter(|b| b.status.is_active()) {
            if !self
                .send_with_retry(binding.channel, &binding.address, &message)
                .await
            {
                tracing::error!(
                    user_id = user.id,
                    channel = %binding.channel,
                    "Failed to deliver welcome message"
                );
            }
        }
        Ok(())
    }

    /// One bounded delivery attempt sequence: every try is capped by the
    /// configured timeout, failures back off exponentially.
    async fn send_with_retry(&self, kind: ChannelKind, recipient: &str, text: &str) -> bool {
        let cfg = &self.ctx.config.dispatch;
        let timeout = Duration::from_secs(cfg.send_timeout_secs);

        for attempt in 0..=cfg.send_retries {
            if attempt > 0 {
                let backoff =
                    Duration::from_millis(cfg.retry_backoff_ms << (attempt - 1).min(5));
                tokio::time::sleep(backoff).await;
            }
            match tokio::time::timeout(timeout, self.channels.send(kind, recipient, text)).await {
                Ok(true) => return true,
                Ok(false) => {
                    tracing::warn!(channel = %kind, recipient, attempt, "Send failed");
                }
                Err(_) => {
                    tracing::warn!(channel = %kind, recipient, attempt, "Send timed out");
                }
            }
        }
        false
    }
}
