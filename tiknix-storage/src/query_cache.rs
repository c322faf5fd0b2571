//! Read-through query cache with table-version invalidation.
//!
//! Entries are keyed by accessor kind, normalized SQL and bindings, and
//! carry the version token of every table the statement references. A read
//! is only served from cache when every one of those tokens is still current
//! and the entry's TTL has not passed; otherwise the entry is dropped and the
//! statement runs against the database.
//!
//! # Example
//!
//! ```ignore
//! let cache = QueryCache::new(store, &site_id, QueryCacheConfig::default());
//!
//! let rows: Vec<Row> = cache
//!     .cached_read("SELECT * FROM widgets WHERE id = ?", &[7.into()], None, || {
//!         driver.fetch_all("SELECT * FROM widgets WHERE id = ?", &[7.into()])
//!     })
//!     .await?;
//!
//! // After a write, every entry tagged with `widgets` misses on next read.
//! cache.invalidate_from_statement("UPDATE widgets SET name = 'x'").await;
//! ```

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tiknix_core::{
    system_clock, Binding, Clock, QueryCacheSettings, QueryError, Row, SiteId, TiknixResult,
};
use tracing::{debug, info, warn};

use crate::driver::Driver;
use crate::kv::{Namespace, ScopedKey, SharedStore};
use crate::record::{CacheRead, CacheRecord};
use crate::sql::{extract_tables, is_read_query, is_valid_identifier, normalize, query_hash};
use crate::stats::{hit_rate_percent, round2, QueryCacheStats};
use crate::table_version::{TableVersionRegistry, TABLE_VERSION_TTL};

/// Configuration for the query cache.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryCacheConfig {
    pub enabled: bool,
    /// TTL used when a read does not pass one.
    pub default_ttl: Duration,
    /// Lifetime of table version tokens.
    pub table_version_ttl: Duration,
}

impl Default for QueryCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl: Duration::from_secs(60),
            table_version_ttl: TABLE_VERSION_TTL,
        }
    }
}

impl QueryCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_table_version_ttl(mut self, ttl: Duration) -> Self {
        self.table_version_ttl = ttl;
        self
    }
}

impl From<&QueryCacheSettings> for QueryCacheConfig {
    fn from(settings: &QueryCacheSettings) -> Self {
        Self::default()
            .with_enabled(settings.enabled)
            .with_default_ttl(settings.default_ttl())
    }
}

/// Accessor a read was issued through.
///
/// The same SQL fetched as a full row set and as a single cell are
/// different results, so each accessor gets its own key space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Rows,
    Cell,
    Column,
    Row,
    Assoc,
    Find,
    Count,
}

impl QueryKind {
    pub fn key_prefix(self) -> &'static str {
        match self {
            QueryKind::Rows => "",
            QueryKind::Cell => "cell_",
            QueryKind::Column => "col_",
            QueryKind::Row => "row_",
            QueryKind::Assoc => "assoc_",
            QueryKind::Find => "find_",
            QueryKind::Count => "count_",
        }
    }
}

/// Read-through cache for SELECT-class statements.
#[derive(Debug)]
pub struct QueryCache {
    store: Arc<dyn SharedStore>,
    namespace: Namespace,
    versions: TableVersionRegistry,
    clock: Arc<dyn Clock>,
    enabled: AtomicBool,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryCache {
    pub fn new(store: Arc<dyn SharedStore>, site: &SiteId, config: QueryCacheConfig) -> Self {
        Self::with_clock(store, site, config, system_clock())
    }

    pub fn with_clock(
        store: Arc<dyn SharedStore>,
        site: &SiteId,
        config: QueryCacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let namespace = Namespace::query_cache(site);
        let versions = TableVersionRegistry::new(store.clone(), namespace.clone(), clock.clone())
            .with_ttl(config.table_version_ttl);
        Self {
            store,
            namespace,
            versions,
            clock,
            enabled: AtomicBool::new(config.enabled),
            default_ttl: config.default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn versions(&self) -> &TableVersionRegistry {
        &self.versions
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
        info!("Query cache enabled");
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
        info!("Query cache disabled");
    }

    /// Shared-tier key a read would be stored under.
    pub fn key_for(&self, kind: QueryKind, sql: &str, bindings: &[Binding]) -> ScopedKey {
        self.namespace
            .query_key(&query_hash(kind.key_prefix(), &normalize(sql), bindings))
    }

    /// Cached row-set read; returns just the value.
    pub async fn cached_read<T, F, Fut>(
        &self,
        sql: &str,
        bindings: &[Binding],
        ttl: Option<Duration>,
        fetch: F,
    ) -> TiknixResult<T>
    where
        T: Serialize + DeserializeOwned + Default + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = TiknixResult<T>> + Send,
    {
        self.read_through(QueryKind::Rows, sql, bindings, ttl, fetch)
            .await
            .map(CacheRead::into_value)
    }

    /// Cached read with tables extracted from the statement.
    pub async fn read_through<T, F, Fut>(
        &self,
        kind: QueryKind,
        sql: &str,
        bindings: &[Binding],
        ttl: Option<Duration>,
        fetch: F,
    ) -> TiknixResult<CacheRead<T>>
    where
        T: Serialize + DeserializeOwned + Default + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = TiknixResult<T>> + Send,
    {
        self.read_inner(kind, sql, bindings, None, ttl, fetch).await
    }

    /// Cached read tagged with an explicit table set instead of extraction.
    pub async fn read_through_tables<T, F, Fut>(
        &self,
        kind: QueryKind,
        sql: &str,
        bindings: &[Binding],
        tables: BTreeSet<String>,
        ttl: Option<Duration>,
        fetch: F,
    ) -> TiknixResult<CacheRead<T>>
    where
        T: Serialize + DeserializeOwned + Default + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = TiknixResult<T>> + Send,
    {
        self.read_inner(kind, sql, bindings, Some(tables), ttl, fetch)
            .await
    }

    async fn read_inner<T, F, Fut>(
        &self,
        kind: QueryKind,
        sql: &str,
        bindings: &[Binding],
        tables: Option<BTreeSet<String>>,
        ttl: Option<Duration>,
        fetch: F,
    ) -> TiknixResult<CacheRead<T>>
    where
        T: Serialize + DeserializeOwned + Default + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = TiknixResult<T>> + Send,
    {
        if sql.trim().is_empty() {
            debug!("Blank statement, returning empty result");
            return Ok(CacheRead::bypassed(T::default(), self.clock.now()));
        }

        // Writes can arrive through a read accessor (`INSERT ... RETURNING`,
        // `WITH ... UPDATE`). They run uncached and invalidate like `exec`.
        if !is_read_query(sql) {
            let value = fetch().await?;
            self.invalidate_from_statement(sql).await;
            return Ok(CacheRead::bypassed(value, self.clock.now()));
        }

        if !self.is_enabled() || !self.store.is_available() {
            let value = fetch().await?;
            return Ok(CacheRead::bypassed(value, self.clock.now()));
        }

        let normalized = normalize(sql);
        let key = self
            .namespace
            .query_key(&query_hash(kind.key_prefix(), &normalized, bindings));
        let tables = tables.unwrap_or_else(|| extract_tables(sql));

        if let Some(record) = self.lookup::<T>(&key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Query cache hit");
            return Ok(CacheRead::from_cache(record));
        }

        // Versions are captured before the fetch: a write landing while the
        // query runs leaves the stored entry already stale.
        let versions = self.versions.snapshot(&tables).await;
        let value = fetch().await?;
        self.misses.fetch_add(1, Ordering::Relaxed);

        let ttl = ttl
            .filter(|t| !t.is_zero())
            .unwrap_or(self.default_ttl);
        let cached_at = self.clock.now();
        let record = CacheRecord {
            value: &value,
            tables,
            versions,
            cached_at,
            ttl_secs: ttl.as_secs().max(1),
            sql: normalized,
        };
        self.store_record(&key, &record, ttl).await;
        debug!(key = %key, tables = ?record.tables, "Query cache miss, stored");
        let versions = record.versions;

        Ok(CacheRead::from_storage(value, cached_at, versions))
    }

    /// Fetch and validate a stored record. Invalid records are deleted.
    async fn lookup<T: DeserializeOwned>(&self, key: &ScopedKey) -> Option<CacheRecord<T>> {
        let bytes = match self.store.get(key.as_str()).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key, error = %e, "Query cache read failed");
                return None;
            }
        };

        let record: CacheRecord<T> = match serde_json::from_slice(&bytes) {
            Ok(record) => record,
            Err(e) => {
                debug!(key = %key, error = %e, "Undecodable cache entry, dropping");
                self.evict(key).await;
                return None;
            }
        };

        if record.is_expired_at(self.clock.now()) {
            debug!(key = %key, "Cache entry past TTL, dropping");
            self.evict(key).await;
            return None;
        }

        let complete = record
            .tables
            .iter()
            .all(|table| record.versions.contains_key(table));
        if !complete || !self.versions.is_current(&record.versions).await {
            debug!(key = %key, "Cache entry has stale table versions, dropping");
            self.evict(key).await;
            return None;
        }

        Some(record)
    }

    async fn store_record<T: Serialize>(
        &self,
        key: &ScopedKey,
        record: &CacheRecord<&T>,
        ttl: Duration,
    ) {
        let bytes = match serde_json::to_vec(record) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to serialize query result");
                return;
            }
        };
        if let Err(e) = self.store.set(key.as_str(), &bytes, Some(ttl)).await {
            warn!(key = %key, error = %e, "Failed to store query result");
        }
    }

    async fn evict(&self, key: &ScopedKey) {
        if let Err(e) = self.store.delete(key.as_str()).await {
            debug!(key = %key, error = %e, "Failed to delete cache entry");
        }
    }

    /// Stale every entry that references `table`.
    pub async fn invalidate(&self, table: &str) -> bool {
        self.versions
            .bump_version(&table.trim().to_lowercase())
            .await
            .is_some()
    }

    /// Invalidate every table a write statement references. Returns them.
    pub async fn invalidate_from_statement(&self, sql: &str) -> Vec<String> {
        let tables: Vec<String> = extract_tables(sql).into_iter().collect();
        for table in &tables {
            self.invalidate(table).await;
        }
        if !tables.is_empty() {
            debug!(tables = ?tables, "Invalidated tables after write");
        }
        tables
    }

    /// Remove every cached query for this site and reset counters.
    ///
    /// Table version tokens are left alone.
    pub async fn clear_all(&self) -> u64 {
        self.reset_counters();
        if !self.store.is_available() {
            return 0;
        }
        match self.store.delete_prefix(&self.namespace.query_prefix()).await {
            Ok(deleted) => {
                info!(deleted, namespace = %self.namespace, "Cleared query cache");
                deleted
            }
            Err(e) => {
                warn!(error = %e, "Failed to clear query cache");
                0
            }
        }
    }

    pub fn reset_counters(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub async fn stats(&self) -> QueryCacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);

        let (cached_queries, size_bytes) = if self.store.is_available() {
            match self
                .store
                .entries_with_prefix(&self.namespace.query_prefix())
                .await
            {
                Ok(entries) => (
                    entries.len() as u64,
                    entries.iter().map(|e| e.size_bytes as u64).sum(),
                ),
                Err(e) => {
                    debug!(error = %e, "Could not scan query cache entries");
                    (0, 0)
                }
            }
        } else {
            (0, 0)
        };

        QueryCacheStats {
            enabled: self.is_enabled(),
            backend: self.store.name().to_string(),
            hits,
            misses,
            hit_rate: hit_rate_percent(hits, misses),
            cached_queries,
            size_bytes,
            cache_size_kb: round2(size_bytes as f64 / 1024.0),
        }
    }

    /// Cached `SELECT * FROM table [WHERE ...]`, tagged with `table`.
    ///
    /// `clause` is appended after `WHERE` unless it already starts with
    /// `ORDER BY` or `LIMIT`.
    pub async fn find_cached<D: Driver + ?Sized>(
        &self,
        driver: &D,
        table: &str,
        clause: &str,
        bindings: &[Binding],
        ttl: Option<Duration>,
    ) -> TiknixResult<Vec<Row>> {
        let sql = select_sql("*", table, clause)?;
        let sql_ref = sql.as_str();
        let tables = BTreeSet::from([table.to_lowercase()]);
        self.read_through_tables(QueryKind::Find, &sql, bindings, tables, ttl, move || {
            driver.fetch_all(sql_ref, bindings)
        })
        .await
        .map(CacheRead::into_value)
    }

    /// Cached `SELECT COUNT(*) FROM table [WHERE ...]`, tagged with `table`.
    pub async fn count_cached<D: Driver + ?Sized>(
        &self,
        driver: &D,
        table: &str,
        clause: &str,
        bindings: &[Binding],
        ttl: Option<Duration>,
    ) -> TiknixResult<i64> {
        let sql = select_sql("COUNT(*) AS count", table, clause)?;
        let sql_ref = sql.as_str();
        let tables = BTreeSet::from([table.to_lowercase()]);
        self.read_through_tables(QueryKind::Count, &sql, bindings, tables, ttl, move || async move {
            let rows = driver.fetch_all(sql_ref, bindings).await?;
            Ok(rows
                .first()
                .and_then(|row| row.first())
                .and_then(|v| v.as_i64())
                .unwrap_or(0))
        })
        .await
        .map(CacheRead::into_value)
    }
}

fn select_sql(projection: &str, table: &str, clause: &str) -> Result<String, QueryError> {
    if !is_valid_identifier(table) {
        return Err(QueryError::Rejected {
            reason: format!("invalid table name '{}'", table),
        });
    }
    let clause = clause.trim();
    let lowered = clause.to_ascii_lowercase();
    Ok(if clause.is_empty() {
        format!("SELECT {} FROM {}", projection, table)
    } else if lowered.starts_with("order by") || lowered.starts_with("limit") {
        format!("SELECT {} FROM {} {}", projection, table, clause)
    } else {
        format!("SELECT {} FROM {} WHERE {}", projection, table, clause)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::{DisabledStore, MemoryStore};
    use std::sync::atomic::AtomicUsize;
    use tiknix_core::{ManualClock, TiknixError};

    struct Fixture {
        cache: QueryCache,
        clock: ManualClock,
        store: MemoryStore,
    }

    fn fixture() -> Fixture {
        let clock = ManualClock::starting_now();
        let clock_arc: Arc<dyn Clock> = Arc::new(clock.clone());
        let store = MemoryStore::with_clock(clock_arc.clone());
        let cache = QueryCache::with_clock(
            Arc::new(store.clone()),
            &SiteId::derive("/srv/test", None),
            QueryCacheConfig::default(),
            clock_arc,
        );
        Fixture {
            cache,
            clock,
            store,
        }
    }

    async fn read(cache: &QueryCache, sql: &str, calls: &AtomicUsize, value: i64) -> CacheRead<i64> {
        cache
            .read_through(QueryKind::Cell, sql, &[], None, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(value)
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let f = fixture();
        let calls = AtomicUsize::new(0);

        let first = read(&f.cache, "SELECT COUNT(*) FROM widgets", &calls, 3).await;
        let second = read(&f.cache, "select count(*)   from WIDGETS", &calls, 99).await;

        assert!(first.was_cache_miss());
        assert!(second.was_cache_hit());
        assert_eq!(second.into_value(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bump_forces_miss() {
        let f = fixture();
        let calls = AtomicUsize::new(0);

        read(&f.cache, "SELECT * FROM widgets", &calls, 1).await;
        assert!(f.cache.invalidate("widgets").await);

        let after = read(&f.cache, "SELECT * FROM widgets", &calls, 2).await;
        assert!(after.was_cache_miss());
        assert_eq!(after.into_value(), 2);
    }

    #[tokio::test]
    async fn test_ttl_bound() {
        let f = fixture();
        let calls = AtomicUsize::new(0);

        f.cache
            .read_through(QueryKind::Rows, "SELECT 1 FROM t", &[], Some(Duration::from_secs(5)), || async {
                Ok(1i64)
            })
            .await
            .unwrap();

        f.clock.advance(Duration::from_secs(4));
        assert!(read_rows(&f.cache, &calls).await.was_cache_hit());

        f.clock.advance(Duration::from_secs(2));
        assert!(read_rows(&f.cache, &calls).await.was_cache_miss());
    }

    async fn read_rows(cache: &QueryCache, calls: &AtomicUsize) -> CacheRead<i64> {
        cache
            .read_through(QueryKind::Rows, "SELECT 1 FROM t", &[], Some(Duration::from_secs(5)), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(1i64)
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_record_ttl_checked_even_if_store_keeps_entry() {
        let f = fixture();
        let calls = AtomicUsize::new(0);
        read(&f.cache, "SELECT * FROM widgets", &calls, 1).await;

        // Re-store the raw entry without a store-level TTL.
        let key = f.cache.key_for(QueryKind::Cell, "SELECT * FROM widgets", &[]);
        let bytes = f.store.get(key.as_str()).await.unwrap().unwrap();
        f.store.set(key.as_str(), &bytes, None).await.unwrap();

        f.clock.advance(Duration::from_secs(61));
        assert!(read(&f.cache, "SELECT * FROM widgets", &calls, 2).await.was_cache_miss());
    }

    #[tokio::test]
    async fn test_accessor_kinds_do_not_collide() {
        let f = fixture();
        let sql = "SELECT id FROM widgets";

        f.cache
            .read_through(QueryKind::Cell, sql, &[], None, || async { Ok(1i64) })
            .await
            .unwrap();
        let col = f
            .cache
            .read_through(QueryKind::Column, sql, &[], None, || async { Ok(vec![1i64, 2]) })
            .await
            .unwrap();

        assert!(col.was_cache_miss());
        assert_eq!(col.into_value(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_writes_and_disabled_bypass() {
        let f = fixture();
        let calls = AtomicUsize::new(0);

        let before = f.cache.versions().get_version("widgets").await;
        let write = read(&f.cache, "DELETE FROM widgets", &calls, 0).await;
        assert_eq!(write.source(), crate::record::ReadSource::Bypass);
        assert_ne!(f.cache.versions().get_version("widgets").await, before);

        f.cache.disable();
        read(&f.cache, "SELECT * FROM widgets", &calls, 1).await;
        read(&f.cache, "SELECT * FROM widgets", &calls, 1).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        f.cache.enable();
        assert!(f.cache.is_enabled());
    }

    #[tokio::test]
    async fn test_blank_sql_returns_default_without_fetching() {
        let f = fixture();
        let calls = AtomicUsize::new(0);

        let value = read(&f.cache, "   ", &calls, 5).await;
        assert_eq!(value.into_value(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_errors_propagate_and_are_not_cached() {
        let f = fixture();

        let err = f
            .cache
            .read_through::<i64, _, _>(QueryKind::Rows, "SELECT * FROM broken", &[], None, || async {
                Err(QueryError::failed("SELECT * FROM broken", "no such table").into())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TiknixError::Query(_)));

        let stats = f.cache.stats().await;
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.cached_queries, 0);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_dropped() {
        let f = fixture();
        let calls = AtomicUsize::new(0);
        let key = f.cache.key_for(QueryKind::Cell, "SELECT * FROM widgets", &[]);
        f.store.set(key.as_str(), b"not json", None).await.unwrap();

        let value = read(&f.cache, "SELECT * FROM widgets", &calls, 4).await;
        assert!(value.was_cache_miss());
        assert_eq!(value.into_value(), 4);
    }

    #[tokio::test]
    async fn test_unavailable_store_executes_directly() {
        let cache = QueryCache::new(
            Arc::new(DisabledStore),
            &SiteId::derive("/srv/test", None),
            QueryCacheConfig::default(),
        );
        let calls = AtomicUsize::new(0);

        read(&cache, "SELECT * FROM widgets", &calls, 1).await;
        read(&cache, "SELECT * FROM widgets", &calls, 1).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!cache.invalidate("widgets").await);
        assert_eq!(cache.clear_all().await, 0);
    }

    #[tokio::test]
    async fn test_clear_all_keeps_versions_and_resets_counters() {
        let f = fixture();
        let calls = AtomicUsize::new(0);

        read(&f.cache, "SELECT * FROM widgets", &calls, 1).await;
        read(&f.cache, "SELECT * FROM widgets", &calls, 1).await;
        let version = f.cache.versions().get_version("widgets").await;

        let deleted = f.cache.clear_all().await;
        assert_eq!(deleted, 1);

        let stats = f.cache.stats().await;
        assert_eq!((stats.hits, stats.misses, stats.cached_queries), (0, 0, 0));
        assert_eq!(f.cache.versions().get_version("widgets").await, version);
    }

    #[tokio::test]
    async fn test_stats() {
        let f = fixture();
        let calls = AtomicUsize::new(0);

        read(&f.cache, "SELECT * FROM a", &calls, 1).await;
        read(&f.cache, "SELECT * FROM a", &calls, 1).await;
        read(&f.cache, "SELECT * FROM a", &calls, 1).await;
        read(&f.cache, "SELECT * FROM b", &calls, 1).await;

        let stats = f.cache.stats().await;
        assert!(stats.enabled);
        assert_eq!(stats.backend, "memory");
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.hit_rate, 50.0);
        assert_eq!(stats.cached_queries, 2);
        assert!(stats.size_bytes > 0);
    }

    #[test]
    fn test_select_sql() {
        assert_eq!(select_sql("*", "widgets", "").unwrap(), "SELECT * FROM widgets");
        assert_eq!(
            select_sql("*", "widgets", "id = ?").unwrap(),
            "SELECT * FROM widgets WHERE id = ?"
        );
        assert_eq!(
            select_sql("*", "widgets", " ORDER BY id").unwrap(),
            "SELECT * FROM widgets ORDER BY id"
        );
        assert!(select_sql("*", "widgets; drop", "").is_err());
    }
}
