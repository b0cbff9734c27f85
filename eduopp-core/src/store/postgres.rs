use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use std::sync::Arc;

use crate::db::{DbConnection, DbPool};
use crate::schema::{deliveries, opportunities, platform_bindings, subscriptions, user_preferences, users};
use crate::types::{
    ChannelKind, DeliveryRecord, EntityStatus, NewBinding, NewDelivery, NewOpportunity, NewUser,
    Opportunity, OpportunityUpdate, PlatformBinding, Preferences, PreferencesUpdate, Subscription,
    User, UserUpdate,
};

use super::Store;

pub struct PgStore {
    pool: Arc<DbPool>,
}

impl PgStore {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> Result<DbConnection> {
        Ok(self.pool.get().await?)
    }
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct UserRow {
    id: i64,
    email: Option<String>,
    phone: Option<String>,
    first_name: String,
    last_name: Option<String>,
    user_type: String,
    language: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: row.id,
            email: row.email,
            phone: row.phone,
            first_name: row.first_name,
            last_name: row.last_name,
            user_type: row.user_type.parse()?,
            language: row.language,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(AsChangeset)]
#[diesel(table_name = crate::schema::users)]
struct UserChanges {
    email: Option<String>,
    phone: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    language: Option<String>,
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = crate::schema::platform_bindings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct BindingRow {
    id: i64,
    user_id: i64,
    channel: String,
    address: String,
    username: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<BindingRow> for PlatformBinding {
    type Error = anyhow::Error;

    fn try_from(row: BindingRow) -> Result<Self> {
        Ok(PlatformBinding {
            id: row.id,
            user_id: row.user_id,
            channel: row.channel.parse()?,
            address: row.address,
            username: row.username,
            status: row.status.parse()?,
            created_at: row.created_at,
        })
    }
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = crate::schema::user_preferences)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct PreferencesRow {
    user_id: i64,
    interests: serde_json::Value,
    education_level: Option<String>,
    field_of_study: Option<String>,
    location: Option<String>,
    cadence: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PreferencesRow> for Preferences {
    type Error = anyhow::Error;

    fn try_from(row: PreferencesRow) -> Result<Self> {
        Ok(Preferences {
            user_id: row.user_id,
            interests: serde_json::from_value(row.interests)?,
            education_level: row.education_level,
            field_of_study: row.field_of_study,
            location: row.location,
            cadence: row.cadence.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = crate::schema::opportunities)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct OpportunityRow {
    id: i64,
    title: String,
    description: String,
    kind: String,
    organization: String,
    url: Option<String>,
    deadline: Option<DateTime<Utc>>,
    location: Option<String>,
    language: String,
    tags: serde_json::Value,
    requirements: serde_json::Value,
    benefits: serde_json::Value,
    status: String,
    created_by: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OpportunityRow> for Opportunity {
    type Error = anyhow::Error;

    fn try_from(row: OpportunityRow) -> Result<Self> {
        Ok(Opportunity {
            id: row.id,
            title: row.title,
            description: row.description,
            kind: row.kind.parse()?,
            organization: row.organization,
            url: row.url,
            deadline: row.deadline,
            location: row.location,
            language: row.language,
            tags: serde_json::from_value(row.tags)?,
            requirements: serde_json::from_value(row.requirements)?,
            benefits: serde_json::from_value(row.benefits)?,
            status: row.status.parse()?,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(AsChangeset)]
#[diesel(table_name = crate::schema::opportunities)]
struct OpportunityChanges {
    title: Option<String>,
    description: Option<String>,
    kind: Option<String>,
    organization: Option<String>,
    url: Option<String>,
    deadline: Option<DateTime<Utc>>,
    location: Option<String>,
    language: Option<String>,
    tags: Option<serde_json::Value>,
    requirements: Option<serde_json::Value>,
    benefits: Option<serde_json::Value>,
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = crate::schema::subscriptions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct SubscriptionRow {
    id: i64,
    user_id: i64,
    opportunity_id: i64,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = anyhow::Error;

    fn try_from(row: SubscriptionRow) -> Result<Self> {
        Ok(Subscription {
            id: row.id,
            user_id: row.user_id,
            opportunity_id: row.opportunity_id,
            status: row.status.parse()?,
            created_at: row.created_at,
        })
    }
}

#[derive(Queryable, Selectable)]
#[diesel(table_name = crate::schema::deliveries)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct DeliveryRow {
    id: i64,
    user_id: i64,
    opportunity_id: Option<i64>,
    channel: String,
    message: String,
    status: String,
    read: bool,
    sent_at: DateTime<Utc>,
}

impl TryFrom<DeliveryRow> for DeliveryRecord {
    type Error = anyhow::Error;

    fn try_from(row: DeliveryRow) -> Result<Self> {
        Ok(DeliveryRecord {
            id: row.id,
            user_id: row.user_id,
            opportunity_id: row.opportunity_id,
            channel: row.channel.parse()?,
            message: row.message,
            status: row.status.parse()?,
            read: row.read,
            sent_at: row.sent_at,
        })
    }
}

fn rows_into<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = anyhow::Error>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[async_trait]
impl Store for PgStore {
    async fn insert_user(&self, user: NewUser) -> Result<User> {
        let mut conn = self.conn().await?;
        let now = Utc::now();
        let row: UserRow = diesel::insert_into(users::table)
            .values((
                users::email.eq(user.email.as_deref()),
                users::phone.eq(user.phone.as_deref()),
                users::first_name.eq(&user.first_name),
                users::last_name.eq(user.last_name.as_deref()),
                users::user_type.eq(user.user_type.as_str()),
                users::language.eq(&user.language),
                users::status.eq(EntityStatus::Active.as_str()),
                users::created_at.eq(now),
                users::updated_at.eq(now),
            ))
            .returning(UserRow::as_returning())
            .get_result(&mut conn)
            .await?;
        row.try_into()
    }

    async fn user(&self, id: i64) -> Result<Option<User>> {
        let mut conn = self.conn().await?;
        let row: Option<UserRow> = users::table
            .filter(users::id.eq(id))
            .select(UserRow::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        row.map(User::try_from).transpose()
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let mut conn = self.conn().await?;
        let row: Option<UserRow> = users::table
            .filter(users::email.eq(email))
            .select(UserRow::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        row.map(User::try_from).transpose()
    }

    async fn users_by_ids(&self, ids: &[i64]) -> Result<Vec<User>> {
        let mut conn = self.conn().await?;
        let rows: Vec<UserRow> = users::table
            .filter(users::id.eq_any(ids))
            .select(UserRow::as_select())
            .load(&mut conn)
            .await?;
        rows_into(rows)
    }

    async fn update_user(&self, id: i64, update: UserUpdate) -> Result<Option<User>> {
        if update.is_empty() {
            return self.user(id).await;
        }
        let mut conn = self.conn().await?;
        let changes = UserChanges {
            email: update.email,
            phone: update.phone,
            first_name: update.first_name,
            last_name: update.last_name,
            language: update.language,
        };
        let row: Option<UserRow> = diesel::update(users::table.filter(users::id.eq(id)))
            .set((&changes, users::updated_at.eq(Utc::now())))
            .returning(UserRow::as_returning())
            .get_result(&mut conn)
            .await
            .optional()?;
        row.map(User::try_from).transpose()
    }

    async fn set_user_status(&self, id: i64, status: EntityStatus) -> Result<bool> {
        let mut conn = self.conn().await?;
        let affected = diesel::update(users::table.filter(users::id.eq(id)))
            .set((
                users::status.eq(status.as_str()),
                users::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .await?;
        Ok(affected > 0)
    }

    async fn insert_binding(&self, binding: NewBinding) -> Result<PlatformBinding> {
        let mut conn = self.conn().await?;
        let row: BindingRow = diesel::insert_into(platform_bindings::table)
            .values((
                platform_bindings::user_id.eq(binding.user_id),
                platform_bindings::channel.eq(binding.channel.as_str()),
                platform_bindings::address.eq(&binding.address),
                platform_bindings::username.eq(binding.username.as_deref()),
                platform_bindings::status.eq(EntityStatus::Active.as_str()),
                platform_bindings::created_at.eq(Utc::now()),
            ))
            .returning(BindingRow::as_returning())
            .get_result(&mut conn)
            .await?;
        row.try_into()
    }

    async fn bindings_for_user(&self, user_id: i64) -> Result<Vec<PlatformBinding>> {
        let mut conn = self.conn().await?;
        let rows: Vec<BindingRow> = platform_bindings::table
            .filter(platform_bindings::user_id.eq(user_id))
            .order(platform_bindings::id.asc())
            .select(BindingRow::as_select())
            .load(&mut conn)
            .await?;
        rows_into(rows)
    }

    async fn active_binding(
        &self,
        channel: ChannelKind,
        address: &str,
    ) -> Result<Option<PlatformBinding>> {
        let mut conn = self.conn().await?;
        let row: Option<BindingRow> = platform_bindings::table
            .filter(platform_bindings::channel.eq(channel.as_str()))
            .filter(platform_bindings::address.eq(address))
            .filter(platform_bindings::status.eq(EntityStatus::Active.as_str()))
            .select(BindingRow::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        row.map(PlatformBinding::try_from).transpose()
    }

    async fn set_binding_status(&self, id: i64, status: EntityStatus) -> Result<bool> {
        let mut conn = self.conn().await?;
        let affected =
            diesel::update(platform_bindings::table.filter(platform_bindings::id.eq(id)))
                .set(platform_bindings::status.eq(status.as_str()))
                .execute(&mut conn)
                .await?;
        Ok(affected > 0)
    }

    async fn preferences(&self, user_id: i64) -> Result<Option<Preferences>> {
        let mut conn = self.conn().await?;
        let row: Option<PreferencesRow> = user_preferences::table
            .filter(user_preferences::user_id.eq(user_id))
            .select(PreferencesRow::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        row.map(Preferences::try_from).transpose()
    }

    async fn upsert_preferences(
        &self,
        user_id: i64,
        update: PreferencesUpdate,
    ) -> Result<Preferences> {
        // Read-modify-write is sufficient under the single-writer-per-user
        // assumption; concurrent updates are last-write-wins.
        let existing = self.preferences(user_id).await?;
        let mut conn = self.conn().await?;
        let now = Utc::now();

        let row: PreferencesRow = match existing {
            Some(current) => {
                let interests = update.interests.unwrap_or(current.interests);
                diesel::update(
                    user_preferences::table.filter(user_preferences::user_id.eq(user_id)),
                )
                .set((
                    user_preferences::interests.eq(serde_json::to_value(&interests)?),
                    user_preferences::education_level
                        .eq(update.education_level.or(current.education_level)),
                    user_preferences::field_of_study
                        .eq(update.field_of_study.or(current.field_of_study)),
                    user_preferences::location.eq(update.location.or(current.location)),
                    user_preferences::cadence
                        .eq(update.cadence.unwrap_or(current.cadence).as_str()),
                    user_preferences::updated_at.eq(now),
                ))
                .returning(PreferencesRow::as_returning())
                .get_result(&mut conn)
                .await?
            }
            None => {
                let interests = update.interests.unwrap_or_default();
                diesel::insert_into(user_preferences::table)
                    .values((
                        user_preferences::user_id.eq(user_id),
                        user_preferences::interests.eq(serde_json::to_value(&interests)?),
                        user_preferences::education_level.eq(update.education_level.as_deref()),
                        user_preferences::field_of_study.eq(update.field_of_study.as_deref()),
                        user_preferences::location.eq(update.location.as_deref()),
                        user_preferences::cadence
                            .eq(update.cadence.unwrap_or(crate::types::Cadence::Daily).as_str()),
                        user_preferences::created_at.eq(now),
                        user_preferences::updated_at.eq(now),
                    ))
                    .returning(PreferencesRow::as_returning())
                    .get_result(&mut conn)
                    .await?
            }
        };
        row.try_into()
    }

    async fn insert_opportunity(&self, opp: NewOpportunity) -> Result<Opportunity> {
        let mut conn = self.conn().await?;
        let now = Utc::now();
        let row: OpportunityRow = diesel::insert_into(opportunities::table)
            .values((
                opportunities::title.eq(&opp.title),
                opportunities::description.eq(&opp.description),
                opportunities::kind.eq(opp.kind.as_str()),
                opportunities::organization.eq(&opp.organization),
                opportunities::url.eq(opp.url.as_deref()),
                opportunities::deadline.eq(opp.deadline),
                opportunities::location.eq(opp.location.as_deref()),
                opportunities::language.eq(&opp.language),
                opportunities::tags.eq(serde_json::to_value(&opp.tags)?),
                opportunities::requirements.eq(serde_json::to_value(&opp.requirements)?),
                opportunities::benefits.eq(serde_json::to_value(&opp.benefits)?),
                opportunities::status.eq(EntityStatus::Active.as_str()),
                opportunities::created_by.eq(opp.created_by),
                opportunities::created_at.eq(now),
                opportunities::updated_at.eq(now),
            ))
            .returning(OpportunityRow::as_returning())
            .get_result(&mut conn)
            .await?;
        row.try_into()
    }

    async fn opportunity(&self, id: i64) -> Result<Option<Opportunity>> {
        let mut conn = self.conn().await?;
        let row: Option<OpportunityRow> = opportunities::table
            .filter(opportunities::id.eq(id))
            .select(OpportunityRow::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        row.map(Opportunity::try_from).transpose()
    }

    async fn active_opportunities(&self) -> Result<Vec<Opportunity>> {
        let mut conn = self.conn().await?;
        let rows: Vec<OpportunityRow> = opportunities::table
            .filter(opportunities::status.eq(EntityStatus::Active.as_str()))
            .order(opportunities::id.asc())
            .select(OpportunityRow::as_select())
            .load(&mut conn)
            .await?;
        rows_into(rows)
    }

    async fn update_opportunity(
        &self,
        id: i64,
        update: OpportunityUpdate,
    ) -> Result<Option<Opportunity>> {
        if update.is_empty() {
            return self.opportunity(id).await;
        }
        let mut conn = self.conn().await?;
        let changes = OpportunityChanges {
            title: update.title,
            description: update.description,
            kind: update.kind.map(|k| k.as_str().to_string()),
            organization: update.organization,
            url: update.url,
            deadline: update.deadline,
            location: update.location,
            language: update.language,
            tags: update.tags.map(|t| serde_json::to_value(t)).transpose()?,
            requirements: update
                .requirements
                .map(|r| serde_json::to_value(r))
                .transpose()?,
            benefits: update
                .benefits
                .map(|b| serde_json::to_value(b))
                .transpose()?,
        };
        let row: Option<OpportunityRow> =
            diesel::update(opportunities::table.filter(opportunities::id.eq(id)))
                .set((&changes, opportunities::updated_at.eq(Utc::now())))
                .returning(OpportunityRow::as_returning())
                .get_result(&mut conn)
                .await
                .optional()?;
        row.map(Opportunity::try_from).transpose()
    }

    async fn set_opportunity_status(&self, id: i64, status: EntityStatus) -> Result<bool> {
        let mut conn = self.conn().await?;
        let affected = diesel::update(opportunities::table.filter(opportunities::id.eq(id)))
            .set((
                opportunities::status.eq(status.as_str()),
                opportunities::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .await?;
        Ok(affected > 0)
    }

    async fn opportunities_by_creator(&self, creator_id: i64) -> Result<Vec<Opportunity>> {
        let mut conn = self.conn().await?;
        let rows: Vec<OpportunityRow> = opportunities::table
            .filter(opportunities::created_by.eq(creator_id))
            .order((opportunities::created_at.desc(), opportunities::id.desc()))
            .select(OpportunityRow::as_select())
            .load(&mut conn)
            .await?;
        rows_into(rows)
    }

    async fn subscription(
        &self,
        user_id: i64,
        opportunity_id: i64,
    ) -> Result<Option<Subscription>> {
        let mut conn = self.conn().await?;
        let row: Option<SubscriptionRow> = subscriptions::table
            .filter(subscriptions::user_id.eq(user_id))
            .filter(subscriptions::opportunity_id.eq(opportunity_id))
            .select(SubscriptionRow::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        row.map(Subscription::try_from).transpose()
    }

    async fn insert_subscription(&self, user_id: i64, opportunity_id: i64) -> Result<Subscription> {
        let mut conn = self.conn().await?;
        let row: SubscriptionRow = diesel::insert_into(subscriptions::table)
            .values((
                subscriptions::user_id.eq(user_id),
                subscriptions::opportunity_id.eq(opportunity_id),
                subscriptions::status.eq(EntityStatus::Active.as_str()),
                subscriptions::created_at.eq(Utc::now()),
            ))
            .returning(SubscriptionRow::as_returning())
            .get_result(&mut conn)
            .await?;
        row.try_into()
    }

    async fn set_subscription_status(&self, id: i64, status: EntityStatus) -> Result<bool> {
        let mut conn = self.conn().await?;
        let affected = diesel::update(subscriptions::table.filter(subscriptions::id.eq(id)))
            .set(subscriptions::status.eq(status.as_str()))
            .execute(&mut conn)
            .await?;
        Ok(affected > 0)
    }

    async fn subscriptions_for_user(&self, user_id: i64) -> Result<Vec<Subscription>> {
        let mut conn = self.conn().await?;
        let rows: Vec<SubscriptionRow> = subscriptions::table
            .filter(subscriptions::user_id.eq(user_id))
            .filter(subscriptions::status.eq(EntityStatus::Active.as_str()))
            .order(subscriptions::id.asc())
            .select(SubscriptionRow::as_select())
            .load(&mut conn)
            .await?;
        rows_into(rows)
    }

    async fn subscriber_ids(&self, opportunity_id: i64) -> Result<Vec<i64>> {
        let mut conn = self.conn().await?;
        let ids: Vec<i64> = subscriptions::table
            .filter(subscriptions::opportunity_id.eq(opportunity_id))
            .filter(subscriptions::status.eq(EntityStatus::Active.as_str()))
            .select(subscriptions::user_id)
            .load(&mut conn)
            .await?;
        Ok(ids)
    }

    async fn append_delivery(&self, delivery: NewDelivery) -> Result<DeliveryRecord> {
        let mut conn = self.conn().await?;
        let row: DeliveryRow = diesel::insert_into(deliveries::table)
            .values((
                deliveries::user_id.eq(delivery.user_id),
                deliveries::opportunity_id.eq(delivery.opportunity_id),
                deliveries::channel.eq(delivery.channel.as_str()),
                deliveries::message.eq(&delivery.message),
                deliveries::status.eq(delivery.status.as_str()),
                deliveries::read.eq(false),
                deliveries::sent_at.eq(Utc::now()),
            ))
            .returning(DeliveryRow::as_returning())
            .get_result(&mut conn)
            .await?;
        row.try_into()
    }

    async fn deliveries_for_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DeliveryRecord>> {
        let mut conn = self.conn().await?;
        let rows: Vec<DeliveryRow> = deliveries::table
            .filter(deliveries::user_id.eq(user_id))
            .order((deliveries::sent_at.desc(), deliveries::id.desc()))
            .limit(limit)
            .offset(offset)
            .select(DeliveryRow::as_select())
            .load(&mut conn)
            .await?;
        rows_into(rows)
    }

    async fn has_sent_delivery(
        &self,
        user_id: i64,
        opportunity_id: i64,
        channel: ChannelKind,
    ) -> Result<bool> {
        let mut conn = self.conn().await?;
        let found: bool = diesel::select(diesel::dsl::exists(
            deliveries::table
                .filter(deliveries::user_id.eq(user_id))
                .filter(deliveries::opportunity_id.eq(opportunity_id))
                .filter(deliveries::channel.eq(channel.as_str()))
                .filter(deliveries::status.eq(crate::types::DeliveryStatus::Sent.as_str())),
        ))
        .get_result(&mut conn)
        .await?;
        Ok(found)
    }

    async fn mark_deliveries_read(&self, user_id: i64, ids: &[i64]) -> Result<u64> {
        let mut conn = self.conn().await?;
        let affected = diesel::update(
            deliveries::table
                .filter(deliveries::user_id.eq(user_id))
                .filter(deliveries::id.eq_any(ids))
                .filter(deliveries::read.eq(false)),
        )
        .set(deliveries::read.eq(true))
        .execute(&mut conn)
        .await?;
        Ok(affected as u64)
    }
}
