use std::sync::Arc;

use crate::config::Config;
use crate::db::create_pool;
use crate::store::{MemStore, PgStore, Store};

/// Explicitly constructed application context, passed into every service and
/// handler. There are no process-wide globals; whoever builds the context
/// decides which store backs it.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
}

impl AppContext {
    /// Connect to Postgres and build the production context.
    pub async fn connect(config: Config) -> anyhow::Result<Self> {
        let pool = create_pool(&config.database).await?;
        Ok(AppContext {
            config: Arc::new(config),
            store: Arc::new(PgStore::new(pool)),
        })
    }

    pub fn with_store(config: Config, store: Arc<dyn Store>) -> Self {
        AppContext {
            config: Arc::new(config),
            store,
        }
    }

    /// Context over the in-memory store; used by tests and local development.
    pub fn in_memory(config: Config) -> Self {
        Self::with_store(config, Arc::new(MemStore::new()))
    }
}
