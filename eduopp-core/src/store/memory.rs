use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::types::{
    Cadence, ChannelKind, DeliveryRecord, EntityStatus, NewBinding, NewDelivery, NewOpportunity,
    NewUser, Opportunity, OpportunityUpdate, PlatformBinding, Preferences, PreferencesUpdate,
    Subscription, User, UserUpdate,
};

use super::Store;

/// In-memory store used by tests and local development. Mirrors the
/// relational semantics of [`super::PgStore`]: sequence ids, soft deletes,
/// append-only delivery log.
#[derive(Default)]
pub struct MemStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    bindings: Vec<PlatformBinding>,
    preferences: Vec<Preferences>,
    opportunities: Vec<Opportunity>,
    subscriptions: Vec<Subscription>,
    deliveries: Vec<DeliveryRecord>,
    next_id: i64,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[async_trait]
impl Store for MemStore {
    async fn insert_user(&self, user: NewUser) -> Result<User> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let row = User {
            id: inner.next_id(),
            email: user.email,
            phone: user.phone,
            first_name: user.first_name,
            last_name: user.last_name,
            user_type: user.user_type,
            language: user.language,
            status: EntityStatus::Active,
            created_at: now,
            updated_at: now,
        };
        inner.users.push(row.clone());
        Ok(row)
    }

    async fn user(&self, id: i64) -> Result<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner.users.iter().find(|u| u.id == id).cloned())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .iter()
            .find(|u| u.email.as_deref() == Some(email))
            .cloned())
    }

    async fn users_by_ids(&self, ids: &[i64]) -> Result<Vec<User>> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .iter()
            .filter(|u| ids.contains(&u.id))
            .cloned()
            .collect())
    }

    async fn update_user(&self, id: i64, update: UserUpdate) -> Result<Option<User>> {
        let mut inner = self.inner.write().await;
        let Some(user) = inner.users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(email) = update.email {
            user.email = Some(email);
        }
        if let Some(phone) = update.phone {
            user.phone = Some(phone);
        }
        if let Some(first_name) = update.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = update.last_name {
            user.last_name = Some(last_name);
        }
        if let Some(language) = update.language {
            user.language = language;
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn set_user_status(&self, id: i64, status: EntityStatus) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let Some(user) = inner.users.iter_mut().find(|u| u.id == id) else {
            return Ok(false);
        };
        user.status = status;
        user.updated_at = Utc::now();
        Ok(true)
    }

    async fn insert_binding(&self, binding: NewBinding) -> Result<PlatformBinding> {
        let mut inner = self.inner.write().await;
        let row = PlatformBinding {
            id: inner.next_id(),
            user_id: binding.user_id,
            channel: binding.channel,
            address: binding.address,
            username: binding.username,
            status: EntityStatus::Active,
            created_at: Utc::now(),
        };
        inner.bindings.push(row.clone());
        Ok(row)
    }

    async fn bindings_for_user(&self, user_id: i64) -> Result<Vec<PlatformBinding>> {
        let inner = self.inner.read().await;
        Ok(inner
            .bindings
            .iter()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn active_binding(
        &self,
        channel: ChannelKind,
        address: &str,
    ) -> Result<Option<PlatformBinding>> {
        let inner = self.inner.read().await;
        Ok(inner
            .bindings
            .iter()
            .find(|b| b.channel == channel && b.address == address && b.status.is_active())
            .cloned())
    }

    async fn set_binding_status(&self, id: i64, status: EntityStatus) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let Some(binding) = inner.bindings.iter_mut().find(|b| b.id == id) else {
            return Ok(false);
        };
        binding.status = status;
        Ok(true)
    }

    async fn preferences(&self, user_id: i64) -> Result<Option<Preferences>> {
        let inner = self.inner.read().await;
        Ok(inner
            .preferences
            .iter()
            .find(|p| p.user_id == user_id)
            .cloned())
    }

    async fn upsert_preferences(
        &self,
        user_id: i64,
        update: PreferencesUpdate,
    ) -> Result<Preferences> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        if let Some(prefs) = inner.preferences.iter_mut().find(|p| p.user_id == user_id) {
            if let Some(interests) = update.interests {
                prefs.interests = interests;
            }
            if let Some(level) = update.education_level {
                prefs.education_level = Some(level);
            }
            if let Some(field) = update.field_of_study {
                prefs.field_of_study = Some(field);
            }
            if let Some(location) = update.location {
                prefs.location = Some(location);
            }
            if let Some(cadence) = update.cadence {
                prefs.cadence = cadence;
            }
            prefs.updated_at = now;
            return Ok(prefs.clone());
        }
        let prefs = Preferences {
            user_id,
            interests: update.interests.unwrap_or_default(),
            education_level: update.education_level,
            field_of_study: update.field_of_study,
            location: update.location,
            cadence: update.cadence.unwrap_or(Cadence::Daily),
            created_at: now,
            updated_at: now,
        };
        inner.preferences.push(prefs.clone());
        Ok(prefs)
    }

    async fn insert_opportunity(&self, opp: NewOpportunity) -> Result<Opportunity> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let row = Opportunity {
            id: inner.next_id(),
            title: opp.title,
            description: opp.description,
            kind: opp.kind,
            organization: opp.organization,
            url: opp.url,
            deadline: opp.deadline,
            location: opp.location,
            language: opp.language,
            tags: opp.tags,
            requirements: opp.requirements,
            benefits: opp.benefits,
            status: EntityStatus::Active,
            created_by: opp.created_by,
            created_at: now,
            updated_at: now,
        };
        inner.opportunities.push(row.clone());
        Ok(row)
    }

    async fn opportunity(&self, id: i64) -> Result<Option<Opportunity>> {
        let inner = self.inner.read().await;
        Ok(inner.opportunities.iter().find(|o| o.id == id).cloned())
    }

    async fn active_opportunities(&self) -> Result<Vec<Opportunity>> {
        let inner = self.inner.read().await;
        Ok(inner
            .opportunities
            .iter()
            .filter(|o| o.status.is_active())
            .cloned()
            .collect())
    }

    async fn update_opportunity(
        &self,
        id: i64,
        update: OpportunityUpdate,
    ) -> Result<Option<Opportunity>> {
        let mut inner = self.inner.write().await;
        let Some(opp) = inner.opportunities.iter_mut().find(|o| o.id == id) else {
            return Ok(None);
        };
        if let Some(title) = update.title {
            opp.title = title;
        }
        if let Some(description) = update.description {
            opp.description = description;
        }
        if let Some(kind) = update.kind {
            opp.kind = kind;
        }
        if let Some(organization) = update.organization {
            opp.organization = organization;
        }
        if let Some(url) = update.url {
            opp.url = Some(url);
        }
        if let Some(deadline) = update.deadline {
            opp.deadline = Some(deadline);
        }
        if let Some(location) = update.location {
            opp.location = Some(location);
        }
        if let Some(language) = update.language {
            opp.language = language;
        }
        if let Some(tags) = update.tags {
            opp.tags = tags;
        }
        if let Some(requirements) = update.requirements {
            opp.requirements = requirements;
        }
        if let Some(benefits) = update.benefits {
            opp.benefits = benefits;
        }
        opp.updated_at = Utc::now();
        Ok(Some(opp.clone()))
    }

    async fn set_opportunity_status(&self, id: i64, status: EntityStatus) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let Some(opp) = inner.opportunities.iter_mut().find(|o| o.id == id) else {
            return Ok(false);
        };
        opp.status = status;
        opp.updated_at = Utc::now();
        Ok(true)
    }

    async fn opportunities_by_creator(&self, creator_id: i64) -> Result<Vec<Opportunity>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<Opportunity> = inner
            .opportunities
            .iter()
            .filter(|o| o.created_by == creator_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn subscription(
        &self,
        user_id: i64,
        opportunity_id: i64,
    ) -> Result<Option<Subscription>> {
        let inner = self.inner.read().await;
        Ok(inner
            .subscriptions
            .iter()
            .find(|s| s.user_id == user_id && s.opportunity_id == opportunity_id)
            .cloned())
    }

    async fn insert_subscription(&self, user_id: i64, opportunity_id: i64) -> Result<Subscription> {
        let mut inner = self.inner.write().await;
        let row = Subscription {
            id: inner.next_id(),
            user_id,
            opportunity_id,
            status: EntityStatus::Active,
            created_at: Utc::now(),
        };
        inner.subscriptions.push(row.clone());
        Ok(row)
    }

    async fn set_subscription_status(&self, id: i64, status: EntityStatus) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let Some(sub) = inner.subscriptions.iter_mut().find(|s| s.id == id) else {
            return Ok(false);
        };
        sub.status = status;
        Ok(true)
    }

    async fn subscriptions_for_user(&self, user_id: i64) -> Result<Vec<Subscription>> {
        let inner = self.inner.read().await;
        Ok(inner
            .subscriptions
            .iter()
            .filter(|s| s.user_id == user_id && s.status.is_active())
            .cloned()
            .collect())
    }

    async fn subscriber_ids(&self, opportunity_id: i64) -> Result<Vec<i64>> {
        let inner = self.inner.read().await;
        Ok(inner
            .subscriptions
            .iter()
            .filter(|s| s.opportunity_id == opportunity_id && s.status.is_active())
            .map(|s| s.user_id)
            .collect())
    }

    async fn append_delivery(&self, delivery: NewDelivery) -> Result<DeliveryRecord> {
        let mut inner = self.inner.write().await;
        let row = DeliveryRecord {
            id: inner.next_id(),
            user_id: delivery.user_id,
            opportunity_id: delivery.opportunity_id,
            channel: delivery.channel,
            message: delivery.message,
            status: delivery.status,
            read: false,
            sent_at: Utc::now(),
        };
        inner.deliveries.push(row.clone());
        Ok(row)
    }

    async fn deliveries_for_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DeliveryRecord>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<DeliveryRecord> = inner
            .deliveries
            .iter()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.sent_at.cmp(&a.sent_at).then(b.id.cmp(&a.id)));
        Ok(rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn has_sent_delivery(
        &self,
        user_id: i64,
        opportunity_id: i64,
        channel: ChannelKind,
    ) -> Result<bool> {
        let inner = self.inner.read().await;
        Ok(inner.deliveries.iter().any(|d| {
            d.user_id == user_id
                && d.opportunity_id == Some(opportunity_id)
                && d.channel == channel
                && d.status == crate::types::DeliveryStatus::Sent
        }))
    }

    async fn mark_deliveries_read(&self, user_id: i64, ids: &[i64]) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let mut updated = 0;
        for delivery in inner
            .deliveries
            .iter_mut()
            .filter(|d| d.user_id == user_id && ids.contains(&d.id) && !d.read)
        {
            delivery.read = true;
            updated += 1;
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeliveryStatus, UserType};

    fn new_user(name: &str) -> NewUser {
        NewUser {
            email: Some(format!("{}@example.com", name)),
            phone: None,
            first_name: name.to_string(),
            last_name: None,
            user_type: UserType::Student,
            language: "en".to_string(),
        }
    }

    #[tokio::test]
    async fn soft_delete_hides_user_from_nothing_but_keeps_row() {
        let store = MemStore::new();
        let user = store.insert_user(new_user("ana")).await.unwrap();
        assert!(store
            .set_user_status(user.id, EntityStatus::Deleted)
            .await
            .unwrap());

        // The row is retained for referential history.
        let row = store.user(user.id).await.unwrap().unwrap();
        assert_eq!(row.status, EntityStatus::Deleted);
    }

    #[tokio::test]
    async fn preference_upsert_is_lazy_then_last_write_wins() {
        let store = MemStore::new();
        let prefs = store
            .upsert_preferences(
                1,
                PreferencesUpdate {
                    interests: Some(vec!["AI".to_string()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(prefs.cadence, Cadence::Daily);

        let prefs = store
            .upsert_preferences(
                1,
                PreferencesUpdate {
                    location: Some("Boston".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        // Untouched fields survive the second write.
        assert_eq!(prefs.interests, vec!["AI".to_string()]);
        assert_eq!(prefs.location.as_deref(), Some("Boston"));
    }

    #[tokio::test]
    async fn sent_delivery_is_visible_to_idempotence_check() {
        let store = MemStore::new();
        store
            .append_delivery(NewDelivery {
                user_id: 1,
                opportunity_id: Some(7),
                channel: ChannelKind::Telegram,
                message: "hi".to_string(),
                status: DeliveryStatus::Failed,
            })
            .await
            .unwrap();
        // A failed attempt must not suppress a later retry.
        assert!(!store
            .has_sent_delivery(1, 7, ChannelKind::Telegram)
            .await
            .unwrap());

        store
            .append_delivery(NewDelivery {
                user_id: 1,
                opportunity_id: Some(7),
                channel: ChannelKind::Telegram,
                message: "hi".to_string(),
                status: DeliveryStatus::Sent,
            })
            .await
            .unwrap();
        assert!(store
            .has_sent_delivery(1, 7, ChannelKind::Telegram)
            .await
            .unwrap());
        assert!(!store
            .has_sent_delivery(1, 7, ChannelKind::Discord)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn mark_read_only_touches_own_unread_rows() {
        let store = MemStore::new();
        let d1 = store
            .append_delivery(NewDelivery {
                user_id: 1,
                opportunity_id: None,
                channel: ChannelKind::Discord,
                message: "a".to_string(),
                status: DeliveryStatus::Sent,
            })
            .await
            .unwrap();
        let d2 = store
            .append_delivery(NewDelivery {
                user_id: 2,
                opportunity_id: None,
                channel: ChannelKind::Discord,
                message: "b".to_string(),
                status: DeliveryStatus::Sent,
            })
            .await
            .unwrap();

        let updated = store
            .mark_deliveries_read(1, &[d1.id, d2.id])
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let rows = store.deliveries_for_user(2, 10, 0).await.unwrap();
        assert!(!rows[0].read);
    }
}
