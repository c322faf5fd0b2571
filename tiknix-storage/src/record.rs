//! Stored cache records and the read wrapper handed back to callers.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a cached query result looks like in the shared tier.
///
/// `versions` maps every table in `tables` to the token observed before the
/// result was fetched. The record is only valid while all of them are still
/// current and `cached_at + ttl_secs` has not passed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord<T> {
    pub value: T,
    pub tables: BTreeSet<String>,
    pub versions: BTreeMap<String, String>,
    pub cached_at: DateTime<Utc>,
    pub ttl_secs: u64,
    /// Normalized statement, kept for debugging.
    pub sql: String,
}

impl<T> CacheRecord<T> {
    /// `None` for records without a TTL (or one too large to represent).
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        if self.ttl_secs == 0 {
            return None;
        }
        let ttl = chrono::Duration::try_seconds(i64::try_from(self.ttl_secs).ok()?)?;
        self.cached_at.checked_add_signed(ttl)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|deadline| now >= deadline)
    }
}

/// How a [`CacheRead`] was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    /// Served from a validated cache entry.
    Hit,
    /// Fetched from the database and stored.
    Miss,
    /// Fetched from the database without touching the cache (disabled,
    /// write statement, shared tier unavailable, blank SQL).
    Bypass,
}

/// Result of a cache read, carrying where it came from and which table
/// versions it was validated against.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    cached_at: DateTime<Utc>,
    versions: BTreeMap<String, String>,
    source: ReadSource,
}

impl<T> CacheRead<T> {
    pub fn from_cache(record: CacheRecord<T>) -> Self {
        Self {
            value: record.value,
            cached_at: record.cached_at,
            versions: record.versions,
            source: ReadSource::Hit,
        }
    }

    pub fn from_storage(
        value: T,
        cached_at: DateTime<Utc>,
        versions: BTreeMap<String, String>,
    ) -> Self {
        Self {
            value,
            cached_at,
            versions,
            source: ReadSource::Miss,
        }
    }

    pub fn bypassed(value: T, fetched_at: DateTime<Utc>) -> Self {
        Self {
            value,
            cached_at: fetched_at,
            versions: BTreeMap::new(),
            source: ReadSource::Bypass,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn source(&self) -> ReadSource {
        self.source
    }

    pub fn was_cache_hit(&self) -> bool {
        self.source == ReadSource::Hit
    }

    pub fn was_cache_miss(&self) -> bool {
        self.source == ReadSource::Miss
    }

    pub fn cached_at(&self) -> DateTime<Utc> {
        self.cached_at
    }

    /// Table tokens this value was validated (or stored) against.
    pub fn versions(&self) -> &BTreeMap<String, String> {
        &self.versions
    }

    /// Age of the value relative to `now`.
    pub fn staleness(&self, now: DateTime<Utc>) -> Duration {
        (now - self.cached_at).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            cached_at: self.cached_at,
            versions: self.versions,
            source: self.source,
        }
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ttl_secs: u64) -> CacheRecord<Vec<i64>> {
        CacheRecord {
            value: vec![1, 2, 3],
            tables: BTreeSet::from(["widgets".to_string()]),
            versions: BTreeMap::from([("widgets".to_string(), "100_ab".to_string())]),
            cached_at: Utc::now(),
            ttl_secs,
            sql: "select * from widgets".to_string(),
        }
    }

    #[test]
    fn test_record_expiry() {
        let r = record(60);
        assert!(!r.is_expired_at(r.cached_at + chrono::Duration::seconds(59)));
        assert!(r.is_expired_at(r.cached_at + chrono::Duration::seconds(60)));
    }

    #[test]
    fn test_zero_ttl_record_never_expires() {
        let r = record(0);
        assert!(!r.is_expired_at(r.cached_at + chrono::Duration::days(365)));
    }

    #[test]
    fn test_record_json_shape() {
        let json = serde_json::to_value(record(60)).unwrap();
        assert_eq!(json["tables"], serde_json::json!(["widgets"]));
        assert_eq!(json["versions"]["widgets"], "100_ab");
        assert_eq!(json["value"], serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn test_cache_read_from_cache() {
        let read = CacheRead::from_cache(record(60));
        assert!(read.was_cache_hit());
        assert!(!read.was_cache_miss());
        assert_eq!(read.versions().get("widgets").map(String::as_str), Some("100_ab"));
    }

    #[test]
    fn test_cache_read_bypass_and_map() {
        let read = CacheRead::bypassed(42i32, Utc::now());
        assert_eq!(read.source(), ReadSource::Bypass);
        assert!(!read.was_cache_hit() && !read.was_cache_miss());
        assert_eq!(read.map(|v| v.to_string()).into_value(), "42");
    }

    #[test]
    fn test_staleness() {
        let past = Utc::now() - chrono::Duration::seconds(5);
        let read = CacheRead::from_storage("v", past, BTreeMap::new());
        let staleness = read.staleness(Utc::now());
        assert!(staleness >= Duration::from_secs(4));
        assert!(staleness <= Duration::from_secs(10));
    }
}
