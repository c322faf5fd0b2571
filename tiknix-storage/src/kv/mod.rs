//! Shared key/value tier with per-entry TTL.
//!
//! Everything above this module talks to a `dyn SharedStore`. Three backends
//! exist: LMDB (shared across processes), an in-process map, and a disabled
//! tier that makes every caller fall through to the database.

mod envelope;
pub mod lmdb;
pub mod memory;
pub mod namespace;
pub mod traits;

pub use lmdb::{LmdbStore, SharedStoreError};
pub use memory::MemoryStore;
pub use namespace::{Namespace, ScopedKey};
pub use traits::{DisabledStore, EntryInfo, SharedStore, StoreResult};

use std::sync::Arc;
use tiknix_core::{SharedTierBackend, SharedTierSettings};
use tracing::{info, warn};

/// Build the configured shared tier.
///
/// An LMDB environment that cannot be opened degrades to the disabled tier
/// instead of failing startup.
pub fn open_shared_store(settings: &SharedTierSettings) -> Arc<dyn SharedStore> {
    match settings.backend {
        SharedTierBackend::Lmdb => match LmdbStore::open(&settings.path, settings.max_size_mb) {
            Ok(store) => {
                info!(path = %settings.path.display(), "Opened LMDB shared tier");
                Arc::new(store)
            }
            Err(e) => {
                warn!(
                    path = %settings.path.display(),
                    error = %e,
                    "LMDB shared tier unavailable, running without it"
                );
                Arc::new(DisabledStore)
            }
        },
        SharedTierBackend::Memory => Arc::new(MemoryStore::new()),
        SharedTierBackend::Disabled => Arc::new(DisabledStore),
    }
}
