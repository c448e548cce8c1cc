//! Wiring shared by the commands: config, stores, provider, service.

use disha_coach::{ChatService, Stores};
use disha_config::AppConfig;
use disha_providers::DemoProvider;
use disha_store::{InMemoryStore, SqliteStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

pub fn default_config_path() -> PathBuf {
    AppConfig::config_dir().join("config.toml")
}

pub fn load_config(path: &Path) -> CliResult<AppConfig> {
    AppConfig::load_with_env(path).map_err(|e| format!("Failed to load config: {e}").into())
}

/// Open the configured database, or a throwaway in-memory store.
pub async fn open_stores(config: &AppConfig, ephemeral: bool) -> CliResult<Stores> {
    if ephemeral {
        info!("Using ephemeral in-memory storage");
        return Ok(Stores::shared(InMemoryStore::new()));
    }
    let store = SqliteStore::connect(&config.database.url)
        .await
        .map_err(|e| format!("Failed to open database {}: {e}", config.database.url))?;
    Ok(Stores::shared(store))
}

/// Build the chat service, seeding protocols when configured to.
pub async fn build_service(config: AppConfig, ephemeral: bool) -> CliResult<Arc<ChatService>> {
    let stores = open_stores(&config, ephemeral).await?;
    let provider = disha_providers::build_from_config(&config)?;
    let seed = config.protocols.seed_on_start;
    let service = ChatService::new(stores, provider, config);
    if seed {
        service.seed_protocols().await?;
    }
    Ok(Arc::new(service))
}

/// A service for commands that only read storage. No LLM is called, so no
/// API key is needed.
pub async fn read_only_service(config: AppConfig) -> CliResult<ChatService> {
    let stores = open_stores(&config, false).await?;
    Ok(ChatService::new(stores, Arc::new(DemoProvider::new()), config))
}
