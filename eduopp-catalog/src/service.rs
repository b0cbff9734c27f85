use eduopp_core::types::{
    EntityStatus, NewOpportunity, Opportunity, OpportunityUpdate, Subscription, User,
};
use eduopp_core::{AppContext, Error, Result};
use tracing;

use crate::filter::SearchFilter;

pub struct CatalogService {
    ctx: AppContext,
}

impl CatalogService {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    pub async fn create_opportunity(&self, input: NewOpportunity) -> Result<Opportunity> {
        if input.title.trim().is_empty() {
            return Err(Error::validation("title must not be empty"));
        }
        if input.description.trim().is_empty() {
            return Err(Error::validation("description must not be empty"));
        }
        if input.organization.trim().is_empty() {
            return Err(Error::validation("organization must not be empty"));
        }
        let opp = self.ctx.store.insert_opportunity(input).await?;
        tracing::info!(opportunity_id = opp.id, title = %opp.title, "Opportunity created");
        Ok(opp)
    }

    pub async fn get(&self, id: i64) -> Result<Opportunity> {
        self.ctx
            .store
            .opportunity(id)
            .await?
            .ok_or(Error::NotFound("opportunity"))
    }

    pub async fn update(&self, id: i64, update: OpportunityUpdate) -> Result<Opportunity> {
        if update.is_empty() {
            return self.get(id).await;
        }
        self.ctx
            .store
            .update_opportunity(id, update)
            .await?
            .ok_or(Error::NotFound("opportunity"))
    }

    /// Soft delete. The record stays behind for delivery and subscription
    /// history but disappears from search and matching.
    pub async fn delete(&self, id: i64) -> Result<()> {
        if !self
            .ctx
            .store
            .set_opportunity_status(id, EntityStatus::Deleted)
            .await?
        {
            return Err(Error::NotFound("opportunity"));
        }
        tracing::info!(opportunity_id = id, "Opportunity deactivated");
        Ok(())
    }

    /// Filtered catalog search over active opportunities, ordered by id
    /// ascending so offset/limit pagination stays stable under concurrent
    /// inserts.
    pub async fn search(&self, filter: &SearchFilter) -> Result<Vec<Opportunity>> {
        let mut results: Vec<Opportunity> = self
            .ctx
            .store
            .active_opportunities()
            .await?
            .into_iter()
            .filter(|opp| filter.matches(opp))
            .collect();
        results.sort_by_key(|opp| opp.id);
        Ok(results
            .into_iter()
            .skip(filter.offset())
            .take(filter.limit())
            .collect())
    }

    pub async fn by_creator(&self, creator_id: i64) -> Result<Vec<Opportunity>> {
        Ok(self.ctx.store.opportunities_by_creator(creator_id).await?)
    }

    /// Subscribe a user to an opportunity. Returns `None` when an active
    /// subscription already exists; an inactive row is toggled back to
    /// active rather than duplicated, so re-subscribing after an
    /// unsubscribe yields exactly one active link.
    pub async fn subscribe(&self, opportunity_id: i64, user_id: i64) -> Result<Option<Subscription>> {
        let opp = self.get(opportunity_id).await?;
        if !opp.status.is_active() {
            return Err(Error::NotFound("opportunity"));
        }
        if self.ctx.store.user(user_id).await?.is_none() {
            return Err(Error::NotFound("user"));
        }

        match self.ctx.store.subscription(user_id, opportunity_id).await? {
            Some(existing) if existing.status.is_active() => Ok(None),
            Some(existing) => {
                self.ctx
                    .store
                    .set_subscription_status(existing.id, EntityStatus::Active)
                    .await?;
                let sub = self
                    .ctx
                    .store
                    .subscription(user_id, opportunity_id)
                    .await?
                    .ok_or(Error::NotFound("subscription"))?;
                Ok(Some(sub))
            }
            None => {
                let sub = self
                    .ctx
                    .store
                    .insert_subscription(user_id, opportunity_id)
                    .await?;
                Ok(Some(sub))
            }
        }
    }

    /// Returns true only when an active subscription was deactivated.
    pub async fn unsubscribe(&self, opportunity_id: i64, user_id: i64) -> Result<bool> {
        match self.ctx.store.subscription(user_id, opportunity_id).await? {
            Some(sub) if sub.status.is_active() => {
                self.ctx
                    .store
                    .set_subscription_status(sub.id, EntityStatus::Deleted)
                    .await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub async fn user_subscriptions(&self, user_id: i64) -> Result<Vec<Subscription>> {
        Ok(self.ctx.store.subscriptions_for_user(user_id).await?)
    }

    pub async fn subscribers(&self, opportunity_id: i64) -> Result<Vec<User>> {
        let ids = self.ctx.store.subscriber_ids(opportunity_id).await?;
        Ok(self.ctx.store.users_by_ids(&ids).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eduopp_core::types::{
        ChannelKind, DeliveryStatus, NewDelivery, NewUser, OpportunityKind, UserType,
    };
    use eduopp_core::Config;

    fn ctx() -> AppContext {
        AppContext::in_memory(Config::default())
    }

    async fn seed_user(ctx: &AppContext) -> i64 {
        ctx.store
            .insert_user(NewUser {
                email: Some("student@example.com".to_string()),
                phone: None,
                first_name: "Sam".to_string(),
                last_name: None,
                user_type: UserType::Student,
                language: "en".to_string(),
            })
            .await
            .unwrap()
            .id
    }

    fn opportunity(title: &str) -> NewOpportunity {
        NewOpportunity {
            title: title.to_string(),
            description: "An opportunity".to_string(),
            kind: OpportunityKind::Scholarship,
            organization: "Org".to_string(),
            url: None,
            deadline: None,
            location: None,
            language: "en".to_string(),
            tags: vec![],
            requirements: vec![],
            benefits: vec![],
            created_by: 1,
        }
    }

    #[tokio::test]
    async fn create_rejects_blank_title() {
        let service = CatalogService::new(ctx());
        let result = service
            .create_opportunity(NewOpportunity {
                title: "  ".to_string(),
                ..opportunity("x")
            })
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn soft_deleted_opportunity_leaves_search_but_keeps_history() {
        let ctx = ctx();
        let service = CatalogService::new(ctx.clone());
        let user_id = seed_user(&ctx).await;
        let opp = service
            .create_opportunity(opportunity("AI Scholarship"))
            .await
            .unwrap();
        service.subscribe(opp.id, user_id).await.unwrap();
        ctx.store
            .append_delivery(NewDelivery {
                user_id,
                opportunity_id: Some(opp.id),
                channel: ChannelKind::Telegram,
                message: "alert".to_string(),
                status: DeliveryStatus::Sent,
            })
            .await
            .unwrap();

        service.delete(opp.id).await.unwrap();

        let found = service.search(&SearchFilter::default()).await.unwrap();
        assert!(found.is_empty());

        // History survives the soft delete.
        let deliveries = ctx.store.deliveries_for_user(user_id, 10, 0).await.unwrap();
        assert_eq!(deliveries.len(), 1);
        let sub = ctx.store.subscription(user_id, opp.id).await.unwrap();
        assert!(sub.is_some());
    }

    #[tokio::test]
    async fn subscribing_twice_is_a_noop_second_time() {
        let ctx = ctx();
        let service = CatalogService::new(ctx.clone());
        let user_id = seed_user(&ctx).await;
        let opp = service
            .create_opportunity(opportunity("Course"))
            .await
            .unwrap();

        assert!(service.subscribe(opp.id, user_id).await.unwrap().is_some());
        assert!(service.subscribe(opp.id, user_id).await.unwrap().is_none());

        let subs = service.user_subscriptions(user_id).await.unwrap();
        assert_eq!(subs.len(), 1);
    }

    #[tokio::test]
    async fn resubscribe_after_unsubscribe_restores_single_active_link() {
        let ctx = ctx();
        let service = CatalogService::new(ctx.clone());
        let user_id = seed_user(&ctx).await;
        let opp = service
            .create_opportunity(opportunity("Course"))
            .await
            .unwrap();

        service.subscribe(opp.id, user_id).await.unwrap();
        assert!(service.unsubscribe(opp.id, user_id).await.unwrap());
        assert!(!service.unsubscribe(opp.id, user_id).await.unwrap());

        let restored = service.subscribe(opp.id, user_id).await.unwrap();
        assert!(restored.is_some());
        let subs = service.user_subscriptions(user_id).await.unwrap();
        assert_eq!(subs.len(), 1);
        assert!(subs[0].status.is_active());
    }

    #[tokio::test]
    async fn search_pagination_is_stable_by_id() {
        let ctx = ctx();
        let service = CatalogService::new(ctx.clone());
        for i in 0..5 {
            service
                .create_opportunity(opportunity(&format!("Opportunity {}", i)))
                .await
                .unwrap();
        }

        let page = service
            .search(&SearchFilter {
                limit: Some(2),
                offset: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert!(page[0].id < page[1].id);
        assert_eq!(page[0].title, "Opportunity 2");
    }

    #[tokio::test]
    async fn subscribe_to_missing_opportunity_is_not_found() {
        let service = CatalogService::new(ctx());
        let result = service.subscribe(99, 1).await;
        assert!(matches!(result, Err(Error::NotFound("opportunity"))));
    }
}
