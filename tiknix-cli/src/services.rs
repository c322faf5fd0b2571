//! Cache services assembled from configuration.

use std::sync::Arc;

use tiknix_core::{SiteId, TiknixConfig};
use tiknix_permissions::{
    HandlerCatalog, PermissionCache, PermissionCacheConfig, SqlPermissionStore, VersionFile,
};
use tiknix_storage::{
    open_shared_store, CachedAdapter, QueryCache, QueryCacheConfig, SharedStore, SqliteDriver,
};
use tracing::info;

use crate::error::CliResult;

/// Everything one process needs, built once and shared.
#[derive(Debug)]
pub struct CacheServices {
    pub config: TiknixConfig,
    pub site: SiteId,
    pub shared: Arc<dyn SharedStore>,
    pub driver: SqliteDriver,
    pub query_cache: Arc<QueryCache>,
    pub permissions: PermissionCache,
}

impl CacheServices {
    pub async fn from_config(config: TiknixConfig) -> CliResult<Self> {
        let shared = open_shared_store(&config.shared_tier);
        Self::with_shared_store(config, shared).await
    }

    /// Build on an already opened shared tier.
    pub async fn with_shared_store(
        config: TiknixConfig,
        shared: Arc<dyn SharedStore>,
    ) -> CliResult<Self> {
        let site = config.site_id();
        let driver = SqliteDriver::open(&config.database.path)?;

        let store = SqlPermissionStore::new(driver.clone());
        store.ensure_schema().await?;

        let query_cache = Arc::new(QueryCache::new(
            shared.clone(),
            &site,
            QueryCacheConfig::from(&config.query_cache),
        ));
        // The CLI routes nothing, so build mode never finds a handler.
        let permissions = PermissionCache::new(
            Arc::new(store),
            shared.clone(),
            &site,
            VersionFile::new(&config.permission_cache.version_file),
            Arc::new(HandlerCatalog::new()),
        )
        .with_config(PermissionCacheConfig::from(&config.permission_cache));

        info!(
            site = %site,
            backend = shared.name(),
            database = %config.database.path.display(),
            "Cache services ready"
        );

        Ok(Self {
            config,
            site,
            shared,
            driver,
            query_cache,
            permissions,
        })
    }

    /// Cached adapter over the configured database.
    pub fn adapter(&self) -> CachedAdapter<SqliteDriver> {
        CachedAdapter::new(self.driver.clone(), self.query_cache.clone())
    }
}
