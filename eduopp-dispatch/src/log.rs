use eduopp_core::types::DeliveryRecord;
use eduopp_core::{AppContext, Error, Result};

pub const DEFAULT_PAGE: i64 = 20;
pub const MAX_PAGE: i64 = 100;

/// Read side of the delivery log: what was sent to a user, and marking
/// entries read. The write side belongs to the dispatcher alone.
pub struct DeliveryLog {
    ctx: AppContext,
}

impl DeliveryLog {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    /// A user's delivery history, newest first.
    pub async fn for_user(
        &self,
        user_id: i64,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<DeliveryRecord>> {
        let limit = limit.unwrap_or(DEFAULT_PAGE);
        if limit < 1 {
            return Err(Error::validation("limit must be positive"));
        }
        let offset = offset.unwrap_or(0);
        if offset < 0 {
            return Err(Error::validation("offset must not be negative"));
        }
        Ok(self
            .ctx
            .store
            .deliveries_for_user(user_id, limit.min(MAX_PAGE), offset)
            .await?)
    }

    /// Flip the read flag on the given records. Records belonging to other
    /// users are ignored, not an error.
    pub async fn mark_read(&self, user_id: i64, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        Ok(self.ctx.store.mark_deliveries_read(user_id, ids).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eduopp_core::types::{ChannelKind, DeliveryStatus, NewDelivery};
    use eduopp_core::Config;

    async fn seed(ctx: &AppContext, user_id: i64, n: usize) -> Vec<i64> {
        let mut ids = Vec::new();
        for i in 0..n {
            let record = ctx
                .store
                .append_delivery(NewDelivery {
                    user_id,
                    opportunity_id: None,
                    channel: ChannelKind::Telegram,
                    message: format!("message {}", i),
                    status: DeliveryStatus::Sent,
                })
                .await
                .unwrap();
            ids.push(record.id);
        }
        ids
    }

    #[tokio::test]
    async fn pages_newest_first() {
        let ctx = AppContext::in_memory(Config::default());
        let log = DeliveryLog::new(ctx.clone());
        let ids = seed(&ctx, 1, 3).await;

        let page = log.for_user(1, Some(2), None).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, ids[2]);

        let rest = log.for_user(1, Some(2), Some(2)).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id, ids[0]);
    }

    #[tokio::test]
    async fn rejects_nonpositive_limit() {
        let ctx = AppContext::in_memory(Config::default());
        let log = DeliveryLog::new(ctx);
        assert!(matches!(
            log.for_user(1, Some(0), None).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn mark_read_counts_only_own_records() {
        let ctx = AppContext::in_memory(Config::default());
        let log = DeliveryLog::new(ctx.clone());
        let mine = seed(&ctx, 1, 1).await;
        let theirs = seed(&ctx, 2, 1).await;

        let updated = log.mark_read(1, &[mine[0], theirs[0]]).await.unwrap();
        assert_eq!(updated, 1);
    }
}
