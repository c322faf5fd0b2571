//! End-to-end query cache behaviour against a real SQLite database and both
//! shared tier backends.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use tiknix_core::{Binding, Clock, ManualClock, Row, SiteId};
use tiknix_storage::{
    CachedAdapter, Driver, LmdbStore, MemoryStore, QueryCache, QueryCacheConfig, QueryKind,
    SharedStore, SqliteDriver,
};

const WIDGETS_SCHEMA: &str = "
    CREATE TABLE widgets (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
    CREATE TABLE gadgets (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
    INSERT INTO widgets (name) VALUES ('gear'), ('cog');
    INSERT INTO gadgets (name) VALUES ('lever');
";

fn seeded_driver() -> SqliteDriver {
    let driver = SqliteDriver::open_in_memory().unwrap();
    driver.execute_batch(WIDGETS_SCHEMA).unwrap();
    driver
}

fn site(path: &str) -> SiteId {
    SiteId::derive(path, None)
}

async fn read_widgets(cache: &QueryCache, driver: &SqliteDriver) -> tiknix_storage::CacheRead<Vec<Row>> {
    let sql = "SELECT * FROM widgets ORDER BY id";
    cache
        .read_through(QueryKind::Rows, sql, &[], None, move || driver.fetch_all(sql, &[]))
        .await
        .unwrap()
}

async fn widgets_round_trip(store: Arc<dyn SharedStore>) {
    let driver = seeded_driver();
    let cache = QueryCache::new(store, &site("/srv/e2e"), QueryCacheConfig::default());

    let first = read_widgets(&cache, &driver).await;
    assert!(first.was_cache_miss());
    assert_eq!(first.value().len(), 2);
    let stamp_before = first.versions().get("widgets").cloned().unwrap();

    let second = read_widgets(&cache, &driver).await;
    assert!(second.was_cache_hit());
    assert_eq!(second.value().len(), 2);

    let adapter = CachedAdapter::new(driver.clone(), Arc::new(cache));
    adapter
        .exec("INSERT INTO widgets (name) VALUES (?)", &[Binding::from("sprocket")])
        .await
        .unwrap();
    let cache = adapter.cache();

    let third = read_widgets(cache, &driver).await;
    assert!(third.was_cache_miss());
    assert_eq!(third.value().len(), 3);
    let stamp_after = third.versions().get("widgets").cloned().unwrap();
    assert_ne!(stamp_before, stamp_after);

    let fourth = read_widgets(cache, &driver).await;
    assert!(fourth.was_cache_hit());
    assert_eq!(fourth.versions().get("widgets"), Some(&stamp_after));
    assert_eq!(fourth.value()[2].get_str("name"), Some("sprocket"));
}

#[tokio::test]
async fn test_widgets_end_to_end_memory() {
    widgets_round_trip(Arc::new(MemoryStore::new())).await;
}

#[tokio::test]
async fn test_widgets_end_to_end_lmdb() {
    let dir = TempDir::new().unwrap();
    let store = LmdbStore::open(dir.path().join("shared"), 8).unwrap();
    widgets_round_trip(Arc::new(store)).await;
}

#[tokio::test]
async fn test_bump_is_isolated_per_table() {
    let driver = seeded_driver();
    let adapter = CachedAdapter::new(
        driver,
        Arc::new(QueryCache::new(
            Arc::new(MemoryStore::new()),
            &site("/srv/iso"),
            QueryCacheConfig::default(),
        )),
    );

    adapter.get_all("SELECT * FROM widgets", &[]).await.unwrap();
    adapter.get_all("SELECT * FROM gadgets", &[]).await.unwrap();

    adapter
        .exec("UPDATE widgets SET name = 'x' WHERE id = 1", &[])
        .await
        .unwrap();

    adapter.get_all("SELECT * FROM gadgets", &[]).await.unwrap();
    adapter.get_all("SELECT * FROM widgets", &[]).await.unwrap();

    let stats = adapter.get_cache_stats().await;
    assert_eq!(stats.hits, 1, "only the gadgets read should hit");
    assert_eq!(stats.misses, 3);
}

#[tokio::test]
async fn test_join_entry_invalidated_by_either_table() {
    let driver = seeded_driver();
    let adapter = CachedAdapter::new(
        driver,
        Arc::new(QueryCache::new(
            Arc::new(MemoryStore::new()),
            &site("/srv/join"),
            QueryCacheConfig::default(),
        )),
    );
    let sql = "SELECT w.name, g.name FROM widgets w JOIN gadgets g ON g.id = w.id";

    adapter.get_all(sql, &[]).await.unwrap();
    adapter.exec("DELETE FROM gadgets", &[]).await.unwrap();

    assert!(adapter.get_all(sql, &[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sites_sharing_a_store_are_isolated() {
    let store: Arc<dyn SharedStore> = Arc::new(MemoryStore::new());
    let driver = seeded_driver();

    let site_a = QueryCache::new(store.clone(), &site("/srv/a"), QueryCacheConfig::default());
    let site_b = QueryCache::new(
        store.clone(),
        &SiteId::derive("/srv/a", Some("other.example")),
        QueryCacheConfig::default(),
    );
    assert_ne!(site_a.namespace(), site_b.namespace());

    assert!(read_widgets(&site_a, &driver).await.was_cache_miss());
    assert!(read_widgets(&site_b, &driver).await.was_cache_miss());
    assert!(read_widgets(&site_b, &driver).await.was_cache_hit());

    // Invalidating and clearing one site leaves the other untouched.
    site_a.invalidate("widgets").await;
    site_a.clear_all().await;
    assert!(read_widgets(&site_b, &driver).await.was_cache_hit());
    assert_eq!(site_b.stats().await.cached_queries, 1);
}

#[tokio::test]
async fn test_expiry_with_manual_clock() {
    let clock = ManualClock::starting_now();
    let clock_arc: Arc<dyn Clock> = Arc::new(clock.clone());
    let cache = QueryCache::with_clock(
        Arc::new(MemoryStore::with_clock(clock_arc.clone())),
        &site("/srv/ttl"),
        QueryCacheConfig::default().with_default_ttl(Duration::from_secs(30)),
        clock_arc,
    );
    let driver = seeded_driver();

    assert!(read_widgets(&cache, &driver).await.was_cache_miss());
    clock.advance(Duration::from_secs(29));
    assert!(read_widgets(&cache, &driver).await.was_cache_hit());
    clock.advance(Duration::from_secs(2));
    assert!(read_widgets(&cache, &driver).await.was_cache_miss());
}

#[tokio::test]
async fn test_find_and_count_cached() {
    let driver = seeded_driver();
    let adapter = CachedAdapter::new(
        driver.clone(),
        Arc::new(QueryCache::new(
            Arc::new(MemoryStore::new()),
            &site("/srv/find"),
            QueryCacheConfig::default(),
        )),
    );
    let cache = adapter.cache();

    let rows = cache
        .find_cached(&driver, "widgets", "name = ?", &[Binding::from("cog")], None)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some(&json!("cog")));

    assert_eq!(cache.count_cached(&driver, "widgets", "", &[], None).await.unwrap(), 2);
    assert_eq!(cache.count_cached(&driver, "widgets", "", &[], None).await.unwrap(), 2);

    adapter
        .exec("INSERT INTO widgets (name) VALUES ('bolt')", &[])
        .await
        .unwrap();
    assert_eq!(cache.count_cached(&driver, "widgets", "", &[], None).await.unwrap(), 3);

    assert!(cache
        .find_cached(&driver, "widgets; DROP TABLE widgets", "", &[], None)
        .await
        .is_err());
}

#[tokio::test]
async fn test_lmdb_shared_between_handles() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shared");
    let store: Arc<dyn SharedStore> = Arc::new(LmdbStore::open(&path, 8).unwrap());
    let driver = seeded_driver();

    let writer = QueryCache::new(store.clone(), &site("/srv/lmdb"), QueryCacheConfig::default());
    let reader = QueryCache::new(store, &site("/srv/lmdb"), QueryCacheConfig::default());

    assert!(read_widgets(&writer, &driver).await.was_cache_miss());
    assert!(read_widgets(&reader, &driver).await.was_cache_hit());

    writer.invalidate("widgets").await;
    assert!(read_widgets(&reader, &driver).await.was_cache_miss());
}
