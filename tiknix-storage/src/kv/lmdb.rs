//! LMDB-backed shared store.
//!
//! Uses the heed crate (Rust bindings for LMDB). The environment is a
//! memory-mapped file, so every worker process on the host that opens the
//! same directory sees the same entries.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The store uses:
//! - Read transactions for `get` and prefix scans
//! - Write transactions for `set`, `add`, `increment` and deletes
//! - `add` and `increment` read and write inside one write transaction, so
//!   LMDB's single-writer lock makes them atomic across processes

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use tiknix_core::{system_clock, Clock, StorageError, TiknixError};
use tracing::debug;

use super::envelope::{self, Decoded};
use super::traits::{EntryInfo, SharedStore, StoreResult};

/// Error type for opening the LMDB environment.
#[derive(Debug, thiserror::Error)]
pub enum SharedStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SharedStoreError> for StorageError {
    fn from(e: SharedStoreError) -> Self {
        StorageError::TransactionFailed {
            reason: e.to_string(),
        }
    }
}

impl From<SharedStoreError> for TiknixError {
    fn from(e: SharedStoreError) -> Self {
        TiknixError::Storage(e.into())
    }
}

fn txn_err(e: heed::Error) -> StorageError {
    StorageError::TransactionFailed {
        reason: e.to_string(),
    }
}

/// Shared store in an LMDB environment.
///
/// # Example
///
/// ```ignore
/// use tiknix_storage::kv::{LmdbStore, SharedStore};
///
/// let store = LmdbStore::open("/var/cache/tiknix/shared", 64)?;
/// store.set("rdb_site_tv_widgets", b"1700000000_1a2b", None).await?;
/// ```
pub struct LmdbStore {
    env: Env,
    db: Database<Bytes, Bytes>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for LmdbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbStore")
            .field("path", &self.env.path())
            .finish()
    }
}

impl LmdbStore {
    /// Open (creating if needed) a store rooted at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - Database cannot be created
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, SharedStoreError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per store and the map is
        // never truncated behind LMDB's back.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| SharedStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| SharedStoreError::Transaction(e.to_string()))?;

        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| SharedStoreError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| SharedStoreError::Transaction(e.to_string()))?;

        Ok(Self {
            env,
            db,
            clock: system_clock(),
        })
    }

    /// Replace the time source used for TTL checks.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Read the raw (still enveloped) bytes under a key.
    fn read_raw(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let value = self
            .db
            .get(&rtxn, key.as_bytes())
            .map_err(txn_err)?
            .map(|bytes| bytes.to_vec());
        Ok(value)
    }

    /// Collect live entries (and expired keys) matching a prefix.
    fn scan_prefix(&self, prefix: &str) -> StoreResult<(Vec<EntryInfo>, Vec<Vec<u8>>)> {
        let now = self.clock.now();
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let iter = self.db.iter(&rtxn).map_err(txn_err)?;

        let prefix = prefix.as_bytes();
        let mut live = Vec::new();
        let mut expired = Vec::new();
        for result in iter {
            let Ok((key, value)) = result else {
                continue;
            };
            if !key.starts_with(prefix) {
                continue;
            }
            match envelope::decode(value, now) {
                Decoded::Live(_) => live.push(EntryInfo {
                    key: String::from_utf8_lossy(key).into_owned(),
                    size_bytes: value.len(),
                }),
                Decoded::Expired | Decoded::Corrupt => expired.push(key.to_vec()),
            }
        }
        Ok((live, expired))
    }

    fn delete_keys<K: AsRef<[u8]>>(&self, keys: &[K]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let mut deleted = 0u64;
        for key in keys {
            if self.db.delete(&mut wtxn, key.as_ref()).unwrap_or(false) {
                deleted += 1;
            }
        }
        wtxn.commit().map_err(txn_err)?;
        Ok(deleted)
    }
}

#[async_trait]
impl SharedStore for LmdbStore {
    fn name(&self) -> &'static str {
        "lmdb"
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let Some(bytes) = self.read_raw(key)? else {
            return Ok(None);
        };
        match envelope::decode(&bytes, self.clock.now()) {
            Decoded::Live(payload) => Ok(Some(payload.to_vec())),
            Decoded::Expired | Decoded::Corrupt => {
                if let Err(e) = self.delete_keys(&[key.as_bytes()]) {
                    debug!(key, error = %e, "Failed to purge expired entry");
                }
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StoreResult<()> {
        let bytes = envelope::encode(value, ttl, self.clock.now());
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.db
            .put(&mut wtxn, key.as_bytes(), &bytes)
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)
    }

    async fn add(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StoreResult<bool> {
        let now = self.clock.now();
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;

        let occupied = matches!(
            self.db
                .get(&wtxn, key.as_bytes())
                .map_err(txn_err)?
                .map(|bytes| envelope::decode(bytes, now)),
            Some(Decoded::Live(_))
        );
        if occupied {
            return Ok(false);
        }

        let bytes = envelope::encode(value, ttl, now);
        self.db
            .put(&mut wtxn, key.as_bytes(), &bytes)
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(true)
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let was_live = self.get(key).await?.is_some();
        self.delete_keys(&[key.as_bytes()])?;
        Ok(was_live)
    }

    async fn increment(&self, key: &str, delta: i64, ttl: Option<Duration>) -> StoreResult<i64> {
        let now = self.clock.now();
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;

        let current = match self.db.get(&wtxn, key.as_bytes()).map_err(txn_err)? {
            Some(bytes) => match envelope::decode(bytes, now) {
                Decoded::Live(payload) => Some(envelope::parse_counter(key, payload)?),
                Decoded::Expired | Decoded::Corrupt => None,
            },
            None => None,
        };

        let next = current.unwrap_or(0).saturating_add(delta);
        let bytes = envelope::encode(next.to_string().as_bytes(), ttl, now);
        self.db
            .put(&mut wtxn, key.as_bytes(), &bytes)
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(next)
    }

    async fn entries_with_prefix(&self, prefix: &str) -> StoreResult<Vec<EntryInfo>> {
        let (live, _) = self.scan_prefix(prefix)?;
        Ok(live)
    }

    async fn delete_prefix(&self, prefix: &str) -> StoreResult<u64> {
        let (live, expired) = self.scan_prefix(prefix)?;
        let keys: Vec<Vec<u8>> = live
            .into_iter()
            .map(|e| e.key.into_bytes())
            .chain(expired)
            .collect();
        self.delete_keys(&keys)
    }
}
