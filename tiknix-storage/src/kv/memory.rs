//! Process-local shared store.
//!
//! Same semantics as the LMDB store but held in a map, so it is only shared
//! by handles within one process. Used by tests and single-process tools.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tiknix_core::{system_clock, Clock};
use tokio::sync::RwLock;

use super::envelope::{self, Decoded};
use super::traits::{EntryInfo, SharedStore, StoreResult};

#[derive(Debug, Clone)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    /// Number of stored entries, expired ones included.
    pub async fn raw_len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let now = self.clock.now();
        {
            let entries = self.entries.read().await;
            match entries.get(key).map(|bytes| envelope::decode(bytes, now)) {
                None => return Ok(None),
                Some(Decoded::Live(payload)) => return Ok(Some(payload.to_vec())),
                Some(Decoded::Expired | Decoded::Corrupt) => {}
            }
        }

        // Re-check under the write lock; a writer may have replaced it.
        let mut entries = self.entries.write().await;
        let still_dead = entries
            .get(key)
            .is_some_and(|bytes| !matches!(envelope::decode(bytes, now), Decoded::Live(_)));
        if still_dead {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StoreResult<()> {
        let bytes = envelope::encode(value, ttl, self.clock.now());
        self.entries.write().await.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn add(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StoreResult<bool> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        if let Some(existing) = entries.get(key) {
            if matches!(envelope::decode(existing, now), Decoded::Live(_)) {
                return Ok(false);
            }
        }
        entries.insert(key.to_string(), envelope::encode(value, ttl, now));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let now = self.clock.now();
        let removed = self.entries.write().await.remove(key);
        Ok(matches!(
            removed.as_deref().map(|bytes| envelope::decode(bytes, now)),
            Some(Decoded::Live(_))
        ))
    }

    async fn increment(&self, key: &str, delta: i64, ttl: Option<Duration>) -> StoreResult<i64> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let current = match entries.get(key).map(|bytes| envelope::decode(bytes, now)) {
            Some(Decoded::Live(payload)) => envelope::parse_counter(key, payload)?,
            _ => 0,
        };
        let next = current.saturating_add(delta);
        entries.insert(
            key.to_string(),
            envelope::encode(next.to_string().as_bytes(), ttl, now),
        );
        Ok(next)
    }

    async fn entries_with_prefix(&self, prefix: &str) -> StoreResult<Vec<EntryInfo>> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        let mut live: Vec<EntryInfo> = entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .filter(|(_, bytes)| matches!(envelope::decode(bytes, now), Decoded::Live(_)))
            .map(|(key, bytes)| EntryInfo {
                key: key.clone(),
                size_bytes: bytes.len(),
            })
            .collect();
        live.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(live)
    }

    async fn delete_prefix(&self, prefix: &str) -> StoreResult<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }
}
