//! Permission cache.
//!
//! Every `authcontrol` row is held in a per-process map keyed by
//! `control::method` (lowercased). The map is loaded once, from the shared
//! tier if another process already published it, else from the database,
//! and then published under a key that embeds the durable cache version.
//! `clear()` bumps that version, which orphans every published copy at once.
//!
//! ```ignore
//! let cache = PermissionCache::new(store, shared, &site_id, version_file, catalog)
//!     .with_config(PermissionCacheConfig::default());
//!
//! cache.begin_request();
//! if !cache.check("reports", "generate", user_level).await {
//!     // deny
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use serde::Serialize;
use tiknix_core::{
    permission_key, system_clock, wildcard_key, AccessLevel, Clock, PermissionCacheSettings,
    PermissionError, PermissionRow, SiteId, TiknixResult, WILDCARD_METHOD,
};
use tiknix_storage::stats::hit_rate_percent;
use tiknix_storage::{Namespace, ScopedKey, SharedStore};
use tracing::{debug, error, info, warn};

use crate::catalog::HandlerLookup;
use crate::store::PermissionStore;
use crate::version::VersionFile;

/// Loaded permissions: lowercased `control::method` to required level.
pub type PermissionMap = BTreeMap<String, AccessLevel>;

const SHARED_HITS_STAT: &str = "stats_shared_hits";
const DB_LOADS_STAT: &str = "stats_db_loads";

#[derive(Debug, Clone, PartialEq)]
pub struct PermissionCacheConfig {
    /// Lifetime of the shared-tier copy and of the stats counters.
    pub ttl: Duration,
    /// Auto-create rows for routable handlers that have none.
    pub build_mode: bool,
    /// Emit a debug line for every lookup.
    pub debug_access_log: bool,
}

impl Default for PermissionCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            build_mode: false,
            debug_access_log: false,
        }
    }
}

impl From<&PermissionCacheSettings> for PermissionCacheConfig {
    fn from(settings: &PermissionCacheSettings) -> Self {
        Self {
            ttl: settings.ttl(),
            build_mode: settings.build_mode,
            debug_access_log: settings.debug_access_log,
        }
    }
}

/// Snapshot reported by [`PermissionCache::stats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PermissionStats {
    pub shared_available: bool,
    pub cache_loaded: bool,
    /// Whether the current version's map is present in the shared tier.
    pub in_shared: bool,
    pub count: usize,
    /// Serialized size of the loaded map in bytes.
    pub memory: usize,
    /// Loads served from the shared tier.
    pub hits: u64,
    /// Loads that went to the database.
    pub misses: u64,
    pub hit_rate: f64,
    pub cache_version: i64,
}

#[derive(Debug, Default)]
struct CacheState {
    map: Option<PermissionMap>,
    version: i64,
    counted_this_request: HashSet<String>,
}

/// Outcome of a build-mode auto-create attempt.
enum AutoCreate {
    Created,
    Unroutable,
    Failed,
}

#[derive(Debug)]
pub struct PermissionCache {
    store: Arc<dyn PermissionStore>,
    shared: Arc<dyn SharedStore>,
    namespace: Namespace,
    version_file: VersionFile,
    handlers: Arc<dyn HandlerLookup>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    build_mode: AtomicBool,
    debug_access_log: bool,
    state: RwLock<CacheState>,
}

impl PermissionCache {
    pub fn new(
        store: Arc<dyn PermissionStore>,
        shared: Arc<dyn SharedStore>,
        site: &SiteId,
        version_file: VersionFile,
        handlers: Arc<dyn HandlerLookup>,
    ) -> Self {
        let version = version_file.read();
        let defaults = PermissionCacheConfig::default();
        Self {
            store,
            shared,
            namespace: Namespace::permissions(site),
            version_file,
            handlers,
            clock: system_clock(),
            ttl: defaults.ttl,
            build_mode: AtomicBool::new(defaults.build_mode),
            debug_access_log: defaults.debug_access_log,
            state: RwLock::new(CacheState {
                version,
                ..Default::default()
            }),
        }
    }

    pub fn with_config(mut self, config: PermissionCacheConfig) -> Self {
        self.ttl = config.ttl;
        self.build_mode = AtomicBool::new(config.build_mode);
        self.debug_access_log = config.debug_access_log;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn is_build_mode(&self) -> bool {
        self.build_mode.load(Ordering::Relaxed)
    }

    pub fn set_build_mode(&self, enabled: bool) {
        self.build_mode.store(enabled, Ordering::Relaxed);
    }

    /// Version the in-process state was last synced to.
    pub fn cache_version(&self) -> i64 {
        self.read_state().version
    }

    fn read_state(&self) -> RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn map_key(&self, version: i64) -> ScopedKey {
        self.namespace.named(&format!("permissions_v{}", version))
    }

    fn log_access(&self, kind: &str, key: &str) {
        if self.debug_access_log {
            debug!(kind, key, "Permission lookup");
        }
    }

    // ========================================================================
    // REQUEST LIFECYCLE
    // ========================================================================

    /// Start of a request: forget which rows were counted and pick up a
    /// version bump made by another process.
    pub fn begin_request(&self) {
        let current = self.version_file.read();
        let mut state = self.write_state();
        state.counted_this_request.clear();
        if state.version != current {
            debug!(
                from = state.version,
                to = current,
                "Permission cache version changed, dropping local map"
            );
            state.version = current;
            state.map = None;
        }
    }

    /// Load the map if this process does not hold it yet.
    async fn ensure_loaded(&self) {
        let version = {
            let state = self.read_state();
            if state.map.is_some() {
                return;
            }
            state.version
        };
        let key = self.map_key(version);

        if let Some(map) = self.fetch_shared(&key).await {
            debug!(count = map.len(), "Loaded permissions from shared tier");
            self.bump_stat(SHARED_HITS_STAT).await;
            self.install(version, map);
            return;
        }

        let started = std::time::Instant::now();
        match self.store.load_all().await {
            Ok(rows) => {
                let map: PermissionMap = rows.iter().map(|row| (row.key(), row.level)).collect();
                info!(
                    count = map.len(),
                    time_ms = started.elapsed().as_millis() as u64,
                    "Loaded permissions from database"
                );
                self.bump_stat(DB_LOADS_STAT).await;
                self.publish(&key, &map).await;
                self.install(version, map);
            }
            Err(e) => {
                // An empty map stops every check from retrying the load. It is
                // not published, so other processes still load for themselves.
                error!(error = %e, "Failed to load permissions");
                self.install(version, PermissionMap::new());
            }
        }
    }

    /// Store a loaded map unless a newer version arrived meanwhile.
    fn install(&self, version: i64, map: PermissionMap) {
        let mut state = self.write_state();
        if state.version == version && state.map.is_none() {
            state.map = Some(map);
        }
    }

    async fn fetch_shared(&self, key: &ScopedKey) -> Option<PermissionMap> {
        if !self.shared.is_available() {
            return None;
        }
        match self.shared.get(key.as_str()).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(map) => Some(map),
                Err(e) => {
                    warn!(key = %key, error = %e, "Undecodable permission map in shared tier");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                debug!(key = %key, error = %e, "Shared tier read failed");
                None
            }
        }
    }

    async fn publish(&self, key: &ScopedKey, map: &PermissionMap) {
        if !self.shared.is_available() {
            return;
        }
        let bytes = match serde_json::to_vec(map) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Failed to serialize permission map");
                return;
            }
        };
        match self.shared.set(key.as_str(), &bytes, Some(self.ttl)).await {
            Ok(()) => debug!(key = %key, "Published permissions to shared tier"),
            Err(e) => warn!(key = %key, error = %e, "Failed to publish permissions"),
        }
    }

    async fn publish_current(&self) {
        let (version, map) = {
            let state = self.read_state();
            match &state.map {
                Some(map) => (state.version, map.clone()),
                None => return,
            }
        };
        self.publish(&self.map_key(version), &map).await;
    }

    async fn bump_stat(&self, name: &str) {
        if !self.shared.is_available() {
            return;
        }
        let key = self.namespace.named(name);
        if let Err(e) = self.shared.increment(key.as_str(), 1, Some(self.ttl)).await {
            debug!(stat = name, error = %e, "Failed to update permission stats");
        }
    }

    async fn read_stat(&self, name: &str) -> u64 {
        let key = self.namespace.named(name);
        match self.shared.get(key.as_str()).await {
            Ok(Some(bytes)) => std::str::from_utf8(&bytes)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(0),
            _ => 0,
        }
    }

    // ========================================================================
    // CHECKS
    // ========================================================================

    /// Whether a caller at `level` may invoke `control::method`.
    ///
    /// An exact row wins over the controller's wildcard row. With neither,
    /// build mode may create the row; otherwise only public-level callers
    /// pass.
    pub async fn check(&self, control: &str, method: &str, level: AccessLevel) -> bool {
        self.ensure_loaded().await;

        let key = permission_key(control, method);
        let wildcard = wildcard_key(control);
        let (exact, controller_wide) = {
            let state = self.read_state();
            let map = state.map.as_ref();
            (
                map.and_then(|m| m.get(&key).copied()),
                map.and_then(|m| m.get(&wildcard).copied()),
            )
        };

        if let Some(required) = exact {
            self.log_access("hit", &key);
            let granted = level.satisfies(required);
            if granted {
                self.count_valid(control, method).await;
            }
            return granted;
        }

        if let Some(required) = controller_wide {
            self.log_access("wildcard", &wildcard);
            let granted = level.satisfies(required);
            if granted {
                self.count_valid(control, WILDCARD_METHOD).await;
            }
            return granted;
        }

        if self.is_build_mode() {
            self.log_access("build", &key);
            match self.auto_create(control, method).await {
                AutoCreate::Created => return true,
                AutoCreate::Failed => return false,
                AutoCreate::Unroutable => {}
            }
        }

        self.log_access("default", &key);
        let granted = level.satisfies(AccessLevel::PUBLIC);
        if self.debug_access_log {
            info!(key = %key, level = level.value(), granted, "No permission row, default rule applied");
        } else {
            debug!(key = %key, level = level.value(), granted, "No permission row, default rule applied");
        }
        granted
    }

    /// Bump `validcount` once per request per row. Failures are ignored.
    async fn count_valid(&self, control: &str, method: &str) {
        let key = permission_key(control, method);
        let first_time = self.write_state().counted_this_request.insert(key.clone());
        if !first_time {
            return;
        }
        if let Err(e) = self.store.increment_valid_count(control, method).await {
            debug!(key = %key, error = %e, "Failed to increment validcount");
        }
    }

    async fn auto_create(&self, control: &str, method: &str) -> AutoCreate {
        if let Err(e) = self.handlers.ensure_routable(control, method) {
            debug!(error = %e, "Not auto-creating permission");
            return AutoCreate::Unroutable;
        }

        info!(control, method, "Auto-creating permission");
        let mut row = PermissionRow::new(control, method, AccessLevel::ADMIN).with_description(
            format!("Auto-generated permission for {}::{}", control, method),
        );
        row.created_at = Some(self.clock.now());

        if let Err(e) = self.store.insert(&row).await {
            let e = PermissionError::CreateFailed {
                control: control.to_string(),
                method: method.to_string(),
                reason: e.to_string(),
            };
            error!(error = %e, "Auto-create failed, denying access");
            return AutoCreate::Failed;
        }

        let version = {
            let mut state = self.write_state();
            if let Some(map) = state.map.as_mut() {
                map.insert(row.key(), row.level);
            }
            state.version
        };
        // Other processes reload and see the new row.
        if self.shared.is_available() {
            let key = self.map_key(version);
            if let Err(e) = self.shared.delete(key.as_str()).await {
                debug!(key = %key, error = %e, "Failed to drop shared permission map");
            }
        }
        AutoCreate::Created
    }

    // ========================================================================
    // ADMINISTRATION
    // ========================================================================

    /// Drop the local map, reset stats and bump the durable version.
    ///
    /// The local map is dropped even if the version file cannot be written;
    /// in that case other processes keep their copies until TTL.
    pub async fn clear(&self) -> Result<i64, PermissionError> {
        {
            let mut state = self.write_state();
            state.map = None;
        }

        if self.shared.is_available() {
            for stat in [SHARED_HITS_STAT, DB_LOADS_STAT] {
                let key = self.namespace.named(stat);
                if let Err(e) = self.shared.delete(key.as_str()).await {
                    debug!(stat, error = %e, "Failed to reset permission stats");
                }
            }
        }

        let version = self.version_file.bump()?;
        {
            let mut state = self.write_state();
            state.version = version;
            state.map = None;
        }
        info!(version, "Permission cache cleared");
        Ok(version)
    }

    /// Clear, then load again. Returns the fresh map.
    pub async fn reload(&self) -> Result<PermissionMap, PermissionError> {
        self.clear().await?;
        Ok(self.get_all().await)
    }

    /// Clear and load, for deploys and startup. Returns the resulting stats.
    pub async fn warmup(&self) -> Result<PermissionStats, PermissionError> {
        self.clear().await?;
        self.ensure_loaded().await;
        let stats = self.stats().await;
        info!(
            count = stats.count,
            in_shared = stats.in_shared,
            version = stats.cache_version,
            "Permission cache warmed up"
        );
        Ok(stats)
    }

    pub async fn stats(&self) -> PermissionStats {
        let (loaded, count, memory, version) = {
            let state = self.read_state();
            let memory = state
                .map
                .as_ref()
                .and_then(|m| serde_json::to_vec(m).ok())
                .map_or(0, |bytes| bytes.len());
            (
                state.map.is_some(),
                state.map.as_ref().map_or(0, |m| m.len()),
                memory,
                state.version,
            )
        };

        let shared_available = self.shared.is_available();
        let (hits, misses, in_shared) = if shared_available {
            let in_shared = matches!(
                self.shared.get(self.map_key(version).as_str()).await,
                Ok(Some(_))
            );
            (
                self.read_stat(SHARED_HITS_STAT).await,
                self.read_stat(DB_LOADS_STAT).await,
                in_shared,
            )
        } else {
            (0, 0, false)
        };

        PermissionStats {
            shared_available,
            cache_loaded: loaded,
            in_shared,
            count,
            memory,
            hits,
            misses,
            hit_rate: hit_rate_percent(hits, misses),
            cache_version: version,
        }
    }

    /// Every loaded permission.
    pub async fn get_all(&self) -> PermissionMap {
        self.ensure_loaded().await;
        self.read_state().map.clone().unwrap_or_default()
    }

    /// Set a level in the cache only (and its shared copy). The database is
    /// not touched; see [`save_permission`](Self::save_permission).
    pub async fn set(&self, control: &str, method: &str, level: AccessLevel) {
        self.ensure_loaded().await;
        let key = permission_key(control, method);
        {
            let mut state = self.write_state();
            state
                .map
                .get_or_insert_with(PermissionMap::new)
                .insert(key.clone(), level);
        }
        self.publish_current().await;
        debug!(key = %key, level = level.value(), "Permission set in cache");
    }

    /// Remove a key from the cache only (and its shared copy).
    pub async fn remove(&self, control: &str, method: &str) {
        self.ensure_loaded().await;
        let key = permission_key(control, method);
        {
            let mut state = self.write_state();
            if let Some(map) = state.map.as_mut() {
                map.remove(&key);
            }
        }
        self.publish_current().await;
        debug!(key = %key, "Permission removed from cache");
    }

    /// Persist a row, then clear so every process reloads.
    pub async fn save_permission(&self, row: &PermissionRow) -> TiknixResult<()> {
        self.store.upsert(row).await?;
        self.clear().await?;
        Ok(())
    }

    /// Delete a row, then clear. Returns whether a row was deleted.
    pub async fn delete_permission(&self, control: &str, method: &str) -> TiknixResult<bool> {
        let deleted = self.store.delete(control, method).await?;
        self.clear().await?;
        Ok(deleted > 0)
    }
}
