//! Site-scoped key system for the shared tier.
//!
//! Several installs can share one shared-memory segment. Every key is built
//! from a [`Namespace`] that embeds the deployment's [`SiteId`], and
//! [`ScopedKey`] has no public constructor, so a key outside a namespace
//! cannot be produced by accident.
//!
//! # Layout
//!
//! | key                         | holds                       |
//! |-----------------------------|-----------------------------|
//! | `{kind}_{site}_q_{hash}`    | cached query result         |
//! | `{kind}_{site}_tv_{table}`  | table version token         |
//! | `{kind}_{site}_{name}`      | anything else (named entry) |

use std::fmt;
use tiknix_core::SiteId;

const QUERY_SEGMENT: &str = "q_";
const TABLE_VERSION_SEGMENT: &str = "tv_";

/// Key prefix for one subsystem of one deployment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    prefix: String,
}

impl Namespace {
    /// Build a namespace for `kind` (e.g. `rdb`) within a site.
    pub fn new(kind: &str, site: &SiteId) -> Self {
        Self {
            prefix: format!("{}_{}_", kind, site),
        }
    }

    /// Namespace used by the query cache and table-version registry.
    pub fn query_cache(site: &SiteId) -> Self {
        Self::new("rdb", site)
    }

    /// Namespace used by the permission cache.
    pub fn permissions(site: &SiteId) -> Self {
        Self::new("tiknix", site)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Prefix covering every cached query (but no table versions).
    pub fn query_prefix(&self) -> String {
        format!("{}{}", self.prefix, QUERY_SEGMENT)
    }

    /// Prefix covering every table version token.
    pub fn table_version_prefix(&self) -> String {
        format!("{}{}", self.prefix, TABLE_VERSION_SEGMENT)
    }

    pub fn query_key(&self, hash: &str) -> ScopedKey {
        ScopedKey(format!("{}{}", self.query_prefix(), hash))
    }

    pub fn table_version_key(&self, table: &str) -> ScopedKey {
        ScopedKey(format!("{}{}", self.table_version_prefix(), table))
    }

    pub fn named(&self, name: &str) -> ScopedKey {
        ScopedKey(format!("{}{}", self.prefix, name))
    }

    /// True if `key` belongs to this namespace.
    pub fn owns(&self, key: &str) -> bool {
        key.starts_with(&self.prefix)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefix)
    }
}

/// A fully-qualified shared-tier key. Only a [`Namespace`] can build one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopedKey(String);

impl ScopedKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ScopedKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(path: &str) -> SiteId {
        SiteId::derive(path, None)
    }

    #[test]
    fn test_query_and_version_keys_do_not_overlap() {
        let ns = Namespace::query_cache(&site("/srv/a"));
        let q = ns.query_key("abc");
        let tv = ns.table_version_key("widgets");

        assert!(q.as_str().starts_with(&ns.query_prefix()));
        assert!(!q.as_str().starts_with(&ns.table_version_prefix()));
        assert!(tv.as_str().starts_with(&ns.table_version_prefix()));
        assert!(!tv.as_str().starts_with(&ns.query_prefix()));
    }

    #[test]
    fn test_sites_do_not_share_prefixes() {
        let a = Namespace::query_cache(&site("/srv/a"));
        let b = Namespace::query_cache(&site("/srv/b"));

        assert_ne!(a.query_key("same"), b.query_key("same"));
        assert!(!b.owns(a.query_key("same").as_str()));
        assert!(a.owns(a.named("stats").as_str()));
    }

    #[test]
    fn test_prefix_shape() {
        let s = site("/srv/a");
        let ns = Namespace::permissions(&s);
        assert_eq!(ns.prefix(), format!("tiknix_{}_", s));
        assert_eq!(ns.named("stats").as_str(), format!("tiknix_{}_stats", s));
    }
}
