//! Cached database adapter.
//!
//! `CachedAdapter` wraps a [`Driver`] and exposes the same read accessors
//! the data layer already uses. Reads go through the query cache with an
//! accessor-specific key; `exec` runs the write and then invalidates every
//! table it touched. Callers do not change to get caching.
//!
//! ```ignore
//! let adapter = CachedAdapter::new(driver, Arc::new(query_cache));
//!
//! let name = adapter.get_cell("SELECT name FROM widgets WHERE id = ?", &[1.into()]).await?;
//! adapter.exec("UPDATE widgets SET name = ? WHERE id = ?", &["cog".into(), 1.into()]).await?;
//! // The next get_cell misses and reads the new name.
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tiknix_core::{Binding, Row, TiknixResult};
use tracing::debug;

use crate::driver::Driver;
use crate::query_cache::{QueryCache, QueryKind};
use crate::record::CacheRead;
use crate::stats::QueryCacheStats;

/// Key/value map produced by [`CachedAdapter::get_assoc`].
pub type AssocMap = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone)]
pub struct CachedAdapter<D> {
    inner: D,
    cache: Arc<QueryCache>,
}

impl<D: Driver> CachedAdapter<D> {
    pub fn new(inner: D, cache: Arc<QueryCache>) -> Self {
        Self { inner, cache }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    async fn read<T, M>(
        &self,
        kind: QueryKind,
        sql: &str,
        bindings: &[Binding],
        ttl: Option<Duration>,
        shape: M,
    ) -> TiknixResult<CacheRead<T>>
    where
        T: serde::Serialize + serde::de::DeserializeOwned + Default + Send,
        M: FnOnce(Vec<Row>) -> T + Send,
    {
        let inner = &self.inner;
        self.cache
            .read_through(kind, sql, bindings, ttl, move || async move {
                let rows = inner.fetch_all(sql, bindings).await?;
                Ok(shape(rows))
            })
            .await
    }

    /// All rows.
    pub async fn get_all(&self, sql: &str, bindings: &[Binding]) -> TiknixResult<Vec<Row>> {
        self.get_all_with_ttl(sql, bindings, None).await
    }

    pub async fn get_all_with_ttl(
        &self,
        sql: &str,
        bindings: &[Binding],
        ttl: Option<Duration>,
    ) -> TiknixResult<Vec<Row>> {
        self.read(QueryKind::Rows, sql, bindings, ttl, |rows| rows)
            .await
            .map(CacheRead::into_value)
    }

    /// First column of the first row.
    pub async fn get_cell(
        &self,
        sql: &str,
        bindings: &[Binding],
    ) -> TiknixResult<Option<serde_json::Value>> {
        self.read(QueryKind::Cell, sql, bindings, None, |rows| {
            rows.into_iter()
                .next()
                .and_then(|row| row.values.into_iter().next())
        })
        .await
        .map(CacheRead::into_value)
    }

    /// First column of every row.
    pub async fn get_col(
        &self,
        sql: &str,
        bindings: &[Binding],
    ) -> TiknixResult<Vec<serde_json::Value>> {
        self.read(QueryKind::Column, sql, bindings, None, |rows| {
            rows.into_iter()
                .filter_map(|row| row.values.into_iter().next())
                .collect()
        })
        .await
        .map(CacheRead::into_value)
    }

    /// First row.
    pub async fn get_row(&self, sql: &str, bindings: &[Binding]) -> TiknixResult<Option<Row>> {
        self.read(QueryKind::Row, sql, bindings, None, |rows| rows.into_iter().next())
            .await
            .map(CacheRead::into_value)
    }

    /// First column as key. With exactly two columns the second is the
    /// value; with one, the key maps to itself; with more, the remaining
    /// columns become an object.
    pub async fn get_assoc(&self, sql: &str, bindings: &[Binding]) -> TiknixResult<AssocMap> {
        self.read(QueryKind::Assoc, sql, bindings, None, assoc_from_rows)
            .await
            .map(CacheRead::into_value)
    }

    /// Run a write, then invalidate the tables it references.
    ///
    /// A failed write invalidates nothing. Invalidation happens even while
    /// reads are not being cached, so re-enabling never serves entries that
    /// predate writes made in the meantime.
    pub async fn exec(&self, sql: &str, bindings: &[Binding]) -> TiknixResult<u64> {
        let affected = self.inner.execute(sql, bindings).await?;
        let tables = self.cache.invalidate_from_statement(sql).await;
        debug!(affected, tables = ?tables, "Executed write through cached adapter");
        Ok(affected)
    }

    pub async fn clear_all_cache(&self) -> u64 {
        self.cache.clear_all().await
    }

    pub async fn get_cache_stats(&self) -> QueryCacheStats {
        self.cache.stats().await
    }

    pub fn enable_cache(&self) {
        self.cache.enable();
    }

    pub fn disable_cache(&self) {
        self.cache.disable();
    }

    pub async fn invalidate_table(&self, table: &str) -> bool {
        self.cache.invalidate(table).await
    }
}

fn assoc_key(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn assoc_from_rows(rows: Vec<Row>) -> AssocMap {
    let mut map = AssocMap::new();
    for row in rows {
        let Some(first) = row.values.first() else {
            continue;
        };
        let key = assoc_key(first);
        let value = match row.values.len() {
            1 => first.clone(),
            2 => row.values[1].clone(),
            _ => {
                let rest = row
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.values.iter().cloned())
                    .skip(1)
                    .collect::<serde_json::Map<_, _>>();
                serde_json::Value::Object(rest)
            }
        };
        map.insert(key, value);
    }
    map
}

/// The adapter is itself a driver: `fetch_all` is cached, `execute`
/// invalidates.
#[async_trait]
impl<D: Driver> Driver for CachedAdapter<D> {
    async fn fetch_all(&self, sql: &str, bindings: &[Binding]) -> TiknixResult<Vec<Row>> {
        self.get_all(sql, bindings).await
    }

    async fn execute(&self, sql: &str, bindings: &[Binding]) -> TiknixResult<u64> {
        self.exec(sql, bindings).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::SqliteDriver;
    use crate::kv::MemoryStore;
    use crate::query_cache::QueryCacheConfig;
    use serde_json::json;
    use tiknix_core::SiteId;

    fn adapter() -> CachedAdapter<SqliteDriver> {
        let driver = SqliteDriver::open_in_memory().unwrap();
        driver
            .execute_batch(
                "CREATE TABLE widgets (id INTEGER PRIMARY KEY, name TEXT, color TEXT);
                 INSERT INTO widgets (name, color) VALUES ('gear', 'red'), ('cog', 'blue');",
            )
            .unwrap();
        let cache = QueryCache::new(
            Arc::new(MemoryStore::new()),
            &SiteId::derive("/srv/adapter", None),
            QueryCacheConfig::default(),
        );
        CachedAdapter::new(driver, Arc::new(cache))
    }

    #[tokio::test]
    async fn test_accessors() {
        let a = adapter();

        let rows = a.get_all("SELECT * FROM widgets ORDER BY id", &[]).await.unwrap();
        assert_eq!(rows.len(), 2);

        let cell = a
            .get_cell("SELECT name FROM widgets WHERE id = ?", &[Binding::from(2)])
            .await
            .unwrap();
        assert_eq!(cell, Some(json!("cog")));

        let col = a.get_col("SELECT name FROM widgets ORDER BY id", &[]).await.unwrap();
        assert_eq!(col, vec![json!("gear"), json!("cog")]);

        let row = a.get_row("SELECT * FROM widgets WHERE id = 1", &[]).await.unwrap();
        assert_eq!(row.and_then(|r| r.get_str("color").map(String::from)), Some("red".into()));

        let missing = a.get_row("SELECT * FROM widgets WHERE id = 99", &[]).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_get_assoc_shapes() {
        let a = adapter();

        let pairs = a.get_assoc("SELECT name, color FROM widgets", &[]).await.unwrap();
        assert_eq!(pairs.get("gear"), Some(&json!("red")));

        let single = a.get_assoc("SELECT name FROM widgets", &[]).await.unwrap();
        assert_eq!(single.get("cog"), Some(&json!("cog")));

        let wide = a.get_assoc("SELECT id, name, color FROM widgets", &[]).await.unwrap();
        assert_eq!(wide.get("1"), Some(&json!({"name": "gear", "color": "red"})));
    }

    #[tokio::test]
    async fn test_exec_invalidates_reads() {
        let a = adapter();
        let sql = "SELECT name FROM widgets WHERE id = 1";

        assert_eq!(a.get_cell(sql, &[]).await.unwrap(), Some(json!("gear")));
        assert_eq!(a.get_cell(sql, &[]).await.unwrap(), Some(json!("gear")));
        assert_eq!(a.get_cache_stats().await.hits, 1);

        let affected = a
            .exec("UPDATE widgets SET name = ? WHERE id = 1", &[Binding::from("sprocket")])
            .await
            .unwrap();
        assert_eq!(affected, 1);

        assert_eq!(a.get_cell(sql, &[]).await.unwrap(), Some(json!("sprocket")));
        assert_eq!(a.get_cache_stats().await.misses, 2);
    }

    #[tokio::test]
    async fn test_exec_with_comments_invalidates_reads() {
        let a = adapter();
        let sql = "SELECT name FROM widgets WHERE id = 1";
        assert_eq!(a.get_cell(sql, &[]).await.unwrap(), Some(json!("gear")));

        let affected = a
            .exec("UPDATE -- note\n widgets SET name = 'sprocket' WHERE id = 1", &[])
            .await
            .unwrap();
        assert_eq!(affected, 1);
        assert_eq!(a.get_cell(sql, &[]).await.unwrap(), Some(json!("sprocket")));

        a.exec("UPDATE /* hot path */ widgets SET name = 'pinion' WHERE id = 1", &[])
            .await
            .unwrap();
        assert_eq!(a.get_cell(sql, &[]).await.unwrap(), Some(json!("pinion")));
    }

    #[tokio::test]
    async fn test_write_through_read_accessor_invalidates() {
        let a = adapter();
        let count = "SELECT COUNT(*) FROM widgets";
        assert_eq!(a.get_cell(count, &[]).await.unwrap(), Some(json!(2)));

        let rows = a
            .get_all("INSERT INTO widgets (name) VALUES ('axle') RETURNING id", &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(a.get_cell(count, &[]).await.unwrap(), Some(json!(3)));

        let rows = a
            .fetch_all("DELETE FROM widgets WHERE name = 'axle' RETURNING id", &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(a.get_cell(count, &[]).await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_double_quoted_text_keeps_its_case() {
        let a = adapter();
        let lower = a
            .get_cell(r#"SELECT id FROM widgets WHERE name = "gear""#, &[])
            .await
            .unwrap();
        let upper = a
            .get_cell(r#"SELECT id FROM widgets WHERE name = "GEAR""#, &[])
            .await
            .unwrap();

        assert_eq!(lower, Some(json!(1)));
        assert_eq!(upper, None);
        assert_eq!(a.get_cache_stats().await.hits, 0);
    }

    #[tokio::test]
    async fn test_failed_write_does_not_invalidate() {
        let a = adapter();
        let before = a.cache().versions().get_version("widgets").await;

        let result = a.exec("UPDATE widgets SET missing_col = 1", &[]).await;
        assert!(result.is_err());
        assert_eq!(a.cache().versions().get_version("widgets").await, before);
    }

    #[tokio::test]
    async fn test_exec_invalidates_while_disabled() {
        let a = adapter();
        let sql = "SELECT COUNT(*) FROM widgets";
        a.get_cell(sql, &[]).await.unwrap();

        a.disable_cache();
        a.exec("INSERT INTO widgets (name) VALUES ('new')", &[]).await.unwrap();
        a.enable_cache();

        assert_eq!(a.get_cell(sql, &[]).await.unwrap(), Some(json!(3)));
    }

    #[tokio::test]
    async fn test_admin_operations() {
        let a = adapter();
        a.get_all("SELECT * FROM widgets", &[]).await.unwrap();
        assert_eq!(a.get_cache_stats().await.cached_queries, 1);

        assert!(a.invalidate_table("widgets").await);
        assert_eq!(a.clear_all_cache().await, 1);
        assert_eq!(a.get_cache_stats().await.cached_queries, 0);
    }

    #[tokio::test]
    async fn test_adapter_as_driver() {
        let a = adapter();
        let driver: &dyn Driver = &a;

        driver.fetch_all("SELECT * FROM widgets", &[]).await.unwrap();
        driver.fetch_all("SELECT * FROM widgets", &[]).await.unwrap();
        assert_eq!(a.get_cache_stats().await.hits, 1);

        driver.execute("DELETE FROM widgets", &[]).await.unwrap();
        assert!(driver.fetch_all("SELECT * FROM widgets", &[]).await.unwrap().is_empty());
    }
}
