//! Shared store trait.
//!
//! A shared store is the process-external tier every worker on a host can
//! see. Implementations keep TTL bookkeeping themselves; an expired entry must
//! read as absent.

use async_trait::async_trait;
use std::time::Duration;
use tiknix_core::StorageError;

/// Result alias for shared store operations.
pub type StoreResult<T> = Result<T, StorageError>;

/// Key and encoded size of one live entry, as reported by prefix scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub key: String,
    pub size_bytes: usize,
}

/// Key/value store with per-entry TTL, shared between processes.
///
/// # Semantics
///
/// - `ttl` of `None` or zero means the entry never expires.
/// - `set` is last-write-wins. `add` stores only if the key is absent (or
///   expired) and reports whether it did.
/// - `increment` treats a missing key as zero and creates it.
/// - No operation needs compare-and-swap; callers tolerate lost races.
#[async_trait]
pub trait SharedStore: Send + Sync + std::fmt::Debug {
    /// Short backend name for logs and stats.
    fn name(&self) -> &'static str;

    /// False when the tier is configured off or could not be opened.
    fn is_available(&self) -> bool {
        true
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StoreResult<()>;

    async fn add(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StoreResult<bool>;

    /// Remove a key. Returns true if a live entry was removed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    async fn increment(&self, key: &str, delta: i64, ttl: Option<Duration>) -> StoreResult<i64>;

    /// Live entries whose key starts with `prefix`.
    async fn entries_with_prefix(&self, prefix: &str) -> StoreResult<Vec<EntryInfo>>;

    /// Remove every entry whose key starts with `prefix`. Returns the count.
    async fn delete_prefix(&self, prefix: &str) -> StoreResult<u64>;
}

/// A shared tier that is switched off.
///
/// Every operation fails with [`StorageError::Unavailable`]; callers check
/// [`SharedStore::is_available`] first and fall through to the database.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledStore;

impl DisabledStore {
    fn unavailable<T>() -> StoreResult<T> {
        Err(StorageError::Unavailable {
            backend: "disabled".to_string(),
        })
    }
}

#[async_trait]
impl SharedStore for DisabledStore {
    fn name(&self) -> &'static str {
        "disabled"
    }

    fn is_available(&self) -> bool {
        false
    }

    async fn get(&self, _key: &str) -> StoreResult<Option<Vec<u8>>> {
        Self::unavailable()
    }

    async fn set(&self, _key: &str, _value: &[u8], _ttl: Option<Duration>) -> StoreResult<()> {
        Self::unavailable()
    }

    async fn add(&self, _key: &str, _value: &[u8], _ttl: Option<Duration>) -> StoreResult<bool> {
        Self::unavailable()
    }

    async fn delete(&self, _key: &str) -> StoreResult<bool> {
        Self::unavailable()
    }

    async fn increment(&self, _key: &str, _delta: i64, _ttl: Option<Duration>) -> StoreResult<i64> {
        Self::unavailable()
    }

    async fn entries_with_prefix(&self, _prefix: &str) -> StoreResult<Vec<EntryInfo>> {
        Self::unavailable()
    }

    async fn delete_prefix(&self, _prefix: &str) -> StoreResult<u64> {
        Self::unavailable()
    }
}
