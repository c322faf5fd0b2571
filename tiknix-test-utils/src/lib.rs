//! tiknix Test Utilities
//!
//! Shared test infrastructure for the tiknix workspace:
//! - Drivers that count calls or fail on demand
//! - Seeded SQLite fixtures and assembled caches
//! - Proptest generators for access levels and handler names
//! - Assertions for tiknix result types

pub use tiknix_core::{
    AccessLevel, Binding, PermissionRow, QueryError, Row, SiteId, TiknixError, TiknixResult,
};
pub use tiknix_permissions::{
    HandlerCatalog, PermissionCache, PermissionStore, SqlPermissionStore, VersionFile, Visibility,
};
pub use tiknix_storage::{Driver, MemoryStore, SharedStore, SqliteDriver};

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

// ============================================================================
// MOCK DRIVERS
// ============================================================================

/// Wraps a driver and counts the statements that reach it.
///
/// Writes can be made to fail, which lets tests check that a failed write
/// never invalidates anything.
#[derive(Debug, Clone)]
pub struct CountingDriver<D> {
    inner: D,
    fetches: Arc<AtomicUsize>,
    executes: Arc<AtomicUsize>,
    fail_writes: Arc<AtomicBool>,
}

impl<D: Driver> CountingDriver<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            fetches: Arc::new(AtomicUsize::new(0)),
            executes: Arc::new(AtomicUsize::new(0)),
            fail_writes: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn executes(&self) -> usize {
        self.executes.load(Ordering::SeqCst)
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }
}

#[async_trait]
impl<D: Driver> Driver for CountingDriver<D> {
    async fn fetch_all(&self, sql: &str, bindings: &[Binding]) -> TiknixResult<Vec<Row>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch_all(sql, bindings).await
    }

    async fn execute(&self, sql: &str, bindings: &[Binding]) -> TiknixResult<u64> {
        self.executes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(QueryError::failed(sql, "injected write failure").into());
        }
        self.inner.execute(sql, bindings).await
    }
}

/// A driver whose every statement fails as if the database were down.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingDriver;

#[async_trait]
impl Driver for FailingDriver {
    async fn fetch_all(&self, _sql: &str, _bindings: &[Binding]) -> TiknixResult<Vec<Row>> {
        Err(QueryError::ConnectionUnavailable {
            reason: "database is down".to_string(),
        }
        .into())
    }

    async fn execute(&self, _sql: &str, _bindings: &[Binding]) -> TiknixResult<u64> {
        Err(QueryError::ConnectionUnavailable {
            reason: "database is down".to_string(),
        }
        .into())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for tiknix inputs.

    use super::*;
    use proptest::prelude::*;

    /// Any level, including ones that are not well-known names.
    pub fn arb_access_level() -> impl Strategy<Value = AccessLevel> {
        prop_oneof![
            Just(AccessLevel::ROOT),
            Just(AccessLevel::ADMIN),
            Just(AccessLevel::MEMBER),
            Just(AccessLevel::PUBLIC),
            (0i64..1000).prop_map(AccessLevel::new),
        ]
    }

    pub fn arb_handler_name() -> impl Strategy<Value = String> {
        "[A-Za-z][A-Za-z0-9_]{0,10}"
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Seeded databases and assembled caches.

    use super::*;
    use tempfile::TempDir;

    pub const WIDGETS_SCHEMA: &str = "
        CREATE TABLE widgets (id INTEGER PRIMARY KEY, name TEXT NOT NULL, price REAL);
        INSERT INTO widgets (name, price) VALUES ('gear', 2.5), ('cog', 1.25);
    ";

    pub fn site() -> SiteId {
        SiteId::derive("/srv/tiknix-test", None)
    }

    /// In-memory SQLite with a two-row `widgets` table.
    pub fn widgets_db() -> SqliteDriver {
        let driver = SqliteDriver::open_in_memory().expect("in-memory database should open");
        driver
            .execute_batch(WIDGETS_SCHEMA)
            .expect("widgets seed should apply");
        driver
    }

    /// In-memory SQLite with an `authcontrol` table holding `rows`.
    pub async fn authcontrol_db(rows: &[(&str, &str, AccessLevel)]) -> SqliteDriver {
        let driver = SqliteDriver::open_in_memory().expect("in-memory database should open");
        let store = SqlPermissionStore::new(driver.clone());
        store
            .ensure_schema()
            .await
            .expect("authcontrol schema should apply");
        for (control, method, level) in rows {
            store
                .insert(&PermissionRow::new(*control, *method, *level))
                .await
                .expect("seed row should insert");
        }
        driver
    }

    /// A permission cache over `driver` with its version file in `dir`.
    pub fn permission_cache<D>(
        driver: D,
        shared: Arc<dyn SharedStore>,
        dir: &TempDir,
        catalog: HandlerCatalog,
    ) -> PermissionCache
    where
        D: Driver + std::fmt::Debug + 'static,
    {
        PermissionCache::new(
            Arc::new(SqlPermissionStore::new(driver)),
            shared,
            &site(),
            version_file(dir),
            Arc::new(catalog),
        )
    }

    fn version_file(dir: &TempDir) -> VersionFile {
        VersionFile::new(dir.path().join("cache").join(".permission_cache_version"))
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for tiknix result types.

    use super::*;

    #[track_caller]
    pub fn assert_query_error<T: std::fmt::Debug>(result: &TiknixResult<T>) {
        match result {
            Err(TiknixError::Query(_)) => {}
            other => panic!("Expected Query error, got: {:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counting_driver_counts_and_fails_writes() {
        let driver = CountingDriver::new(fixtures::widgets_db());

        driver.fetch_all("SELECT * FROM widgets", &[]).await.unwrap();
        driver
            .execute("UPDATE widgets SET price = 3", &[])
            .await
            .unwrap();
        driver.set_fail_writes(true);
        let result = driver.execute("UPDATE widgets SET price = 4", &[]).await;

        assertions::assert_query_error(&result);
        assert_eq!((driver.fetches(), driver.executes()), (1, 2));
    }

    #[tokio::test]
    async fn test_failing_driver() {
        assertions::assert_query_error(&FailingDriver.fetch_all("SELECT 1", &[]).await);
        assertions::assert_query_error(&FailingDriver.execute("DELETE FROM t", &[]).await);
    }

    #[tokio::test]
    async fn test_authcontrol_fixture() {
        let driver = fixtures::authcontrol_db(&[("reports", "generate", AccessLevel::ADMIN)]).await;
        let rows = driver
            .fetch_all("SELECT control, level FROM authcontrol", &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_i64("level"), Some(50));
    }
}
