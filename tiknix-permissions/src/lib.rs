//! tiknix Permissions - Versioned Permission Cache
//!
//! Answers "may a caller at level N invoke control::method" from an
//! in-process map that is shared between processes through the shared tier
//! and invalidated everywhere by bumping a durable version file.

pub mod cache;
pub mod catalog;
pub mod store;
pub mod version;

pub use cache::{PermissionCache, PermissionCacheConfig, PermissionMap, PermissionStats};
pub use catalog::{HandlerCatalog, HandlerLookup, Visibility};
pub use store::{PermissionStore, SqlPermissionStore};
pub use version::VersionFile;
