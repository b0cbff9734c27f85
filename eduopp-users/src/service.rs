use eduopp_core::types::{
    ChannelKind, EntityStatus, NewBinding, NewUser, PlatformBinding, Preferences,
    PreferencesUpdate, User, UserUpdate,
};
use eduopp_core::{AppContext, Error, Result};
use tracing;

pub struct UserService {
    ctx: AppContext,
}

impl UserService {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    pub async fn create_user(&self, input: NewUser) -> Result<User> {
        if input.first_name.trim().is_empty() {
            return Err(Error::validation("first_name must not be empty"));
        }
        if let Some(email) = input.email.as_deref() {
            if self.ctx.store.user_by_email(email).await?.is_some() {
                return Err(Error::validation("email already registered"));
            }
        }
        let user = self.ctx.store.insert_user(input).await?;
        tracing::info!(user_id = user.id, "User created");
        Ok(user)
    }

    pub async fn get(&self, id: i64) -> Result<User> {
        self.ctx
            .store
            .user(id)
            .await?
            .ok_or(Error::NotFound("user"))
    }

    pub async fn update(&self, id: i64, update: UserUpdate) -> Result<User> {
        if update.is_empty() {
            return self.get(id).await;
        }
        self.ctx
            .store
            .update_user(id, update)
            .await?
            .ok_or(Error::NotFound("user"))
    }

    /// Soft delete; bindings, subscriptions and delivery history stay
    /// behind for audit.
    pub async fn delete(&self, id: i64) -> Result<()> {
        if !self
            .ctx
            .store
            .set_user_status(id, EntityStatus::Deleted)
            .await?
        {
            return Err(Error::NotFound("user"));
        }
        tracing::info!(user_id = id, "User deactivated");
        Ok(())
    }

    /// Attach a platform account. A (channel, address) pair may back at
    /// most one active binding across all users; a second claim is
    /// rejected before insert.
    pub async fn add_binding(&self, binding: NewBinding) -> Result<PlatformBinding> {
        if binding.address.trim().is_empty() {
            return Err(Error::validation("address must not be empty"));
        }
        self.get(binding.user_id).await?;
        if let Some(existing) = self
            .ctx
            .store
            .active_binding(binding.channel, &binding.address)
            .await?
        {
            return Err(Error::validation(format!(
                "{} address already bound to user {}",
                binding.channel, existing.user_id
            )));
        }
        let row = self.ctx.store.insert_binding(binding).await?;
        tracing::info!(user_id = row.user_id, channel = %row.channel, "Platform binding added");
        Ok(row)
    }

    pub async fn bindings(&self, user_id: i64) -> Result<Vec<PlatformBinding>> {
        Ok(self.ctx.store.bindings_for_user(user_id).await?)
    }

    pub async fn remove_binding(&self, user_id: i64, binding_id: i64) -> Result<()> {
        let bindings = self.ctx.store.bindings_for_user(user_id).await?;
        if !bindings.iter().any(|b| b.id == binding_id) {
            return Err(Error::NotFound("binding"));
        }
        self.ctx
            .store
            .set_binding_status(binding_id, EntityStatus::Deleted)
            .await?;
        Ok(())
    }

    /// The user behind a platform address, if any.
    pub async fn find_by_binding(
        &self,
        channel: ChannelKind,
        address: &str,
    ) -> Result<Option<User>> {
        let Some(binding) = self.ctx.store.active_binding(channel, address).await? else {
            return Ok(None);
        };
        Ok(self
            .ctx
            .store
            .user(binding.user_id)
            .await?
            .filter(|user| user.status.is_active()))
    }

    /// Created lazily on the first call, last-write-wins afterwards.
    pub async fn set_preferences(
        &self,
        user_id: i64,
        update: PreferencesUpdate,
    ) -> Result<Preferences> {
        self.get(user_id).await?;
        Ok(self.ctx.store.upsert_preferences(user_id, update).await?)
    }

    pub async fn preferences(&self, user_id: i64) -> Result<Option<Preferences>> {
        self.get(user_id).await?;
        Ok(self.ctx.store.preferences(user_id).await?)
    }
}
