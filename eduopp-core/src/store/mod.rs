use anyhow::Result;
use async_trait::async_trait;

use crate::types::{
    ChannelKind, DeliveryRecord, EntityStatus, NewBinding, NewDelivery, NewOpportunity, NewUser,
    Opportunity, OpportunityUpdate, PlatformBinding, Preferences, PreferencesUpdate, Subscription,
    User, UserUpdate,
};

pub mod memory;
pub mod postgres;

pub use memory::MemStore;
pub use postgres::PgStore;

/// The single relational boundary. Services hold an `Arc<dyn Store>` and
/// re-read current state on every operation; no implementation may cache
/// across calls.
#[async_trait]
pub trait Store: Send + Sync {
    // Users
    async fn insert_user(&self, user: NewUser) -> Result<User>;
    async fn user(&self, id: i64) -> Result<Option<User>>;
    async fn user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn users_by_ids(&self, ids: &[i64]) -> Result<Vec<User>>;
    /// Field-level update; `None` fields are left untouched. Returns the
    /// updated row, or `None` if the user does not exist.
    async fn update_user(&self, id: i64, update: UserUpdate) -> Result<Option<User>>;
    async fn set_user_status(&self, id: i64, status: EntityStatus) -> Result<bool>;

    // Platform bindings
    async fn insert_binding(&self, binding: NewBinding) -> Result<PlatformBinding>;
    async fn bindings_for_user(&self, user_id: i64) -> Result<Vec<PlatformBinding>>;
    async fn active_binding(
        &self,
        channel: ChannelKind,
        address: &str,
    ) -> Result<Option<PlatformBinding>>;
    async fn set_binding_status(&self, id: i64, status: EntityStatus) -> Result<bool>;

    // Preferences
    async fn preferences(&self, user_id: i64) -> Result<Option<Preferences>>;
    /// Creates the row lazily on first call, then applies last-write-wins
    /// field updates.
    async fn upsert_preferences(
        &self,
        user_id: i64,
        update: PreferencesUpdate,
    ) -> Result<Preferences>;

    // Opportunities
    async fn insert_opportunity(&self, opp: NewOpportunity) -> Result<Opportunity>;
    async fn opportunity(&self, id: i64) -> Result<Option<Opportunity>>;
    /// All active opportunities in insertion (id) order.
    async fn active_opportunities(&self) -> Result<Vec<Opportunity>>;
    async fn update_opportunity(
        &self,
        id: i64,
        update: OpportunityUpdate,
    ) -> Result<Option<Opportunity>>;
    async fn set_opportunity_status(&self, id: i64, status: EntityStatus) -> Result<bool>;
    async fn opportunities_by_creator(&self, creator_id: i64) -> Result<Vec<Opportunity>>;

    // Subscriptions
    /// The (user, opportunity) row regardless of status; at most one exists.
    async fn subscription(&self, user_id: i64, opportunity_id: i64)
        -> Result<Option<Subscription>>;
    async fn insert_subscription(&self, user_id: i64, opportunity_id: i64) -> Result<Subscription>;
    async fn set_subscription_status(&self, id: i64, status: EntityStatus) -> Result<bool>;
    /// Active subscriptions only.
    async fn subscriptions_for_user(&self, user_id: i64) -> Result<Vec<Subscription>>;
    /// User ids with an active subscription to the opportunity.
    async fn subscriber_ids(&self, opportunity_id: i64) -> Result<Vec<i64>>;

    // Delivery log
    async fn append_delivery(&self, delivery: NewDelivery) -> Result<DeliveryRecord>;
    /// Newest first.
    async fn deliveries_for_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DeliveryRecord>>;
    /// Whether a successful delivery for (user, opportunity, channel) was
    /// already logged. Failed attempts do not count.
    async fn has_sent_delivery(
        &self,
        user_id: i64,
        opportunity_id: i64,
        channel: ChannelKind,
    ) -> Result<bool>;
    async fn mark_deliveries_read(&self, user_id: i64, ids: &[i64]) -> Result<u64>;
}
