//! Wiring of the store, registry and engine from a [`Config`].

use anyhow::Context;
use std::sync::Arc;
use wabridge_bridge::{BridgeEngine, HttpMessagingManager, SessionRegistry};
use wabridge_core::{paths, Config};
use wabridge_store::SqliteMappingStore;

/// Open the configured mapping store, creating the base directory for the default file.
pub async fn open_store(config: &Config) -> anyhow::Result<SqliteMappingStore> {
    if config.storage.database_url.is_none() {
        paths::ensure_dirs()?;
    }
    let url = config.database_url()?;
    SqliteMappingStore::open(&url)
        .await
        .with_context(|| format!("Failed to open mapping store at {}", url))
}

/// Build an engine with every configured session registered.
pub async fn build_engine(config: &Config) -> anyhow::Result<Arc<BridgeEngine>> {
    config.validate()?;

    let store = open_store(config).await?;

    let registry = SessionRegistry::chatwoot();
    let count = registry.load_from_config(config).await?;
    tracing::info!(sessions = count, "Loaded session bindings");

    let messaging = HttpMessagingManager::from_config(&config.messaging)?;

    let engine = BridgeEngine::new(config, Arc::new(registry), Arc::new(store), Arc::new(messaging))?;
    Ok(Arc::new(engine))
}
