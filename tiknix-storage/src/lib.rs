//! tiknix Storage - Shared Cache Tier and Query Cache
//!
//! The shared key/value tier (LMDB or in-process), per-table version tokens,
//! the read-through query cache and the cached database adapter that puts
//! them in front of a relational driver.

pub mod adapter;
pub mod driver;
pub mod kv;
pub mod query_cache;
pub mod record;
pub mod sql;
pub mod stats;
pub mod table_version;

pub use adapter::{AssocMap, CachedAdapter};
pub use driver::{Driver, SqliteDriver};

// Shared tier
pub use kv::{
    open_shared_store, DisabledStore, EntryInfo, LmdbStore, MemoryStore, Namespace, ScopedKey,
    SharedStore, SharedStoreError, StoreResult,
};

pub use query_cache::{QueryCache, QueryCacheConfig, QueryKind};
pub use record::{CacheRead, CacheRecord, ReadSource};
pub use sql::{extract_tables, is_read_query, normalize, query_hash};
pub use stats::QueryCacheStats;
pub use table_version::{TableVersionRegistry, TABLE_VERSION_TTL};
