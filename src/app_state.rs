use std::sync::Arc;
use tracing::info;

use crate::{
    config::Config,
    data_seeder::seed_demo_data,
    error::{AppError, AppResult},
    infrastructure::{MemoryStore, SocialStore, SqliteStore, TracedStore},
    services::SocialService,
};

#[derive(Clone)]
pub struct AppState {
    pub social: SocialService,
    pub config: Config,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        // Initialize store
        let store = open_store(&config.database.url).await?;

        // Initialize the social engine on top of it
        let social = SocialService::new(store, &config.engine);

        if config.engine.seed_demo_data {
            seed_demo_data(&social).await?;
        }

        Ok(Self { social, config })
    }
}

/// `memory` selects the in-process store, `sqlite:...` a SQLite database.
/// Either way the store is wrapped for tracing and operation stats.
pub async fn open_store(url: &str) -> AppResult<Arc<dyn SocialStore>> {
    if url == "memory" {
        info!("Using in-memory social store");
        return Ok(Arc::new(TracedStore::new(MemoryStore::new())));
    }
    if url.starts_with("sqlite:") {
        let store = SqliteStore::connect(url).await?;
        return Ok(Arc::new(TracedStore::new(store)));
    }
    Err(AppError::Configuration(format!(
        "Unsupported DATABASE_URL {}: expected `memory` or `sqlite:...`",
        url
    )))
}
