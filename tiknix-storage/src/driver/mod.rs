//! Backing relational store interface.

pub mod sqlite;

pub use sqlite::SqliteDriver;

use async_trait::async_trait;
use std::sync::Arc;
use tiknix_core::{Binding, Row, TiknixResult};

/// A connection to the relational store behind the caches.
///
/// Errors are returned as [`tiknix_core::QueryError`] (wrapped in
/// `TiknixError`) and must reach the caller unmasked.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Run a statement and return every row.
    async fn fetch_all(&self, sql: &str, bindings: &[Binding]) -> TiknixResult<Vec<Row>>;

    /// Run a statement and return the number of affected rows.
    async fn execute(&self, sql: &str, bindings: &[Binding]) -> TiknixResult<u64>;
}

#[async_trait]
impl<D: Driver + ?Sized> Driver for Arc<D> {
    async fn fetch_all(&self, sql: &str, bindings: &[Binding]) -> TiknixResult<Vec<Row>> {
        (**self).fetch_all(sql, bindings).await
    }

    async fn execute(&self, sql: &str, bindings: &[Binding]) -> TiknixResult<u64> {
        (**self).execute(sql, bindings).await
    }
}
