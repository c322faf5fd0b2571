//! Per-table version tokens.
//!
//! A table's token changes whenever a write touching that table goes
//! through the cache layer. Cached query results record the tokens they saw,
//! so a bump makes every dependent entry fail validation on its next read.
//! Nothing scans or deletes entries on a bump.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use tiknix_core::Clock;
use tracing::{debug, warn};

use crate::kv::{Namespace, SharedStore};

/// Lifetime of a table version token when nothing bumps it.
pub const TABLE_VERSION_TTL: Duration = Duration::from_secs(86_400);

/// Registry of table version tokens in the shared tier.
#[derive(Debug, Clone)]
pub struct TableVersionRegistry {
    store: Arc<dyn SharedStore>,
    namespace: Namespace,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl TableVersionRegistry {
    pub fn new(store: Arc<dyn SharedStore>, namespace: Namespace, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            namespace,
            clock,
            ttl: TABLE_VERSION_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// A fresh token: seconds since epoch plus a random salt.
    fn fresh_token(&self) -> String {
        format!("{}_{:08x}", self.clock.now().timestamp(), rand::random::<u32>())
    }

    /// Token returned when the shared tier cannot be used. Differs between
    /// calls, so nothing validated against it ever hits.
    fn degraded_token(&self) -> String {
        format!(
            "unshared_{}_{:08x}",
            self.clock.now().timestamp_micros(),
            rand::random::<u32>()
        )
    }

    /// Current token for `table`, creating one if none exists.
    ///
    /// Two processes racing on a missing table both try an add-if-absent;
    /// the loser re-reads and adopts the winner's token.
    pub async fn get_version(&self, table: &str) -> String {
        if !self.store.is_available() {
            return self.degraded_token();
        }
        let key = self.namespace.table_version_key(table);

        match self.store.get(key.as_str()).await {
            Ok(Some(bytes)) => {
                if let Ok(token) = String::from_utf8(bytes) {
                    return token;
                }
                warn!(table, "Table version token is not UTF-8, replacing it");
            }
            Ok(None) => {}
            Err(e) => {
                debug!(table, error = %e, "Table version read failed");
                return self.degraded_token();
            }
        }

        let token = self.fresh_token();
        match self
            .store
            .add(key.as_str(), token.as_bytes(), Some(self.ttl))
            .await
        {
            Ok(true) => token,
            Ok(false) => match self.store.get(key.as_str()).await {
                Ok(Some(bytes)) => String::from_utf8(bytes).unwrap_or(token),
                _ => token,
            },
            Err(e) => {
                debug!(table, error = %e, "Table version create failed");
                self.degraded_token()
            }
        }
    }

    /// Replace `table`'s token. Returns the new token, or `None` when the
    /// shared tier is unavailable and the bump was skipped.
    pub async fn bump_version(&self, table: &str) -> Option<String> {
        if !self.store.is_available() {
            debug!(table, "Shared tier unavailable, skipping version bump");
            return None;
        }
        let key = self.namespace.table_version_key(table);
        let token = self.fresh_token();

        match self
            .store
            .set(key.as_str(), token.as_bytes(), Some(self.ttl))
            .await
        {
            Ok(()) => {
                debug!(table, token = %token, "Bumped table version");
                Some(token)
            }
            Err(e) => {
                warn!(table, error = %e, "Failed to bump table version");
                None
            }
        }
    }

    /// Current tokens for a set of tables.
    pub async fn snapshot(&self, tables: &BTreeSet<String>) -> BTreeMap<String, String> {
        let mut versions = BTreeMap::new();
        for table in tables {
            versions.insert(table.clone(), self.get_version(table).await);
        }
        versions
    }

    /// True if every recorded token still matches the current one.
    pub async fn is_current(&self, recorded: &BTreeMap<String, String>) -> bool {
        for (table, token) in recorded {
            if self.get_version(table).await != *token {
                return false;
            }
        }
        true
    }
}
