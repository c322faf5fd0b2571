//! tiknix Core - Shared Types
//!
//! Plain data types used by every other tiknix crate: access levels,
//! permission rows, statement bindings, result rows, deployment identity,
//! errors and configuration. No caching logic lives here.

pub mod clock;
pub mod config;
pub mod error;

pub use clock::{system_clock, Clock, ManualClock, SystemClock};
pub use config::{
    DatabaseSettings, PermissionCacheSettings, QueryCacheSettings, SharedTierBackend,
    SharedTierSettings, SiteSettings, TiknixConfig,
};
pub use error::{ConfigError, PermissionError, QueryError, StorageError, TiknixError, TiknixResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

// ============================================================================
// ACCESS LEVELS
// ============================================================================

/// Numeric privilege level. Lower numbers carry more privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessLevel(pub i64);

impl AccessLevel {
    pub const ROOT: AccessLevel = AccessLevel(1);
    pub const ADMIN: AccessLevel = AccessLevel(50);
    pub const MEMBER: AccessLevel = AccessLevel(100);
    pub const PUBLIC: AccessLevel = AccessLevel(101);

    pub const fn new(level: i64) -> Self {
        Self(level)
    }

    pub const fn value(self) -> i64 {
        self.0
    }

    /// True if a caller at `self` satisfies a `required` level.
    pub fn satisfies(self, required: AccessLevel) -> bool {
        self.0 <= required.0
    }

    /// Name of the closest well-known level, if it is one.
    pub fn name(self) -> Option<&'static str> {
        match self.0 {
            0 | 1 => Some("ROOT"),
            50 => Some("ADMIN"),
            100 => Some("MEMBER"),
            101 => Some("PUBLIC"),
            _ => None,
        }
    }
}

impl From<i64> for AccessLevel {
    fn from(level: i64) -> Self {
        Self(level)
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", self.0, name),
            None => write!(f, "{}", self.0),
        }
    }
}

// ============================================================================
// PERMISSIONS
// ============================================================================

/// Method name used for controller-wide permission rows.
pub const WILDCARD_METHOD: &str = "*";

/// Build the lookup key for a controller/method pair (case-insensitive).
pub fn permission_key(control: &str, method: &str) -> String {
    format!("{}::{}", control, method).to_lowercase()
}

/// Build the controller-wide wildcard key.
pub fn wildcard_key(control: &str) -> String {
    permission_key(control, WILDCARD_METHOD)
}

/// One row of the `authcontrol` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRow {
    pub control: String,
    pub method: String,
    pub level: AccessLevel,
    pub description: Option<String>,
    pub valid_count: i64,
    pub created_at: Option<Timestamp>,
}

impl PermissionRow {
    pub fn new(control: impl Into<String>, method: impl Into<String>, level: AccessLevel) -> Self {
        Self {
            control: control.into(),
            method: method.into(),
            level,
            description: None,
            valid_count: 0,
            created_at: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn key(&self) -> String {
        permission_key(&self.control, &self.method)
    }

    pub fn is_wildcard(&self) -> bool {
        self.method == WILDCARD_METHOD
    }
}

// ============================================================================
// STATEMENTS AND ROWS
// ============================================================================

/// A positional statement parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Binding {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<i64> for Binding {
    fn from(v: i64) -> Self {
        Binding::Integer(v)
    }
}

impl From<i32> for Binding {
    fn from(v: i32) -> Self {
        Binding::Integer(v as i64)
    }
}

impl From<f64> for Binding {
    fn from(v: f64) -> Self {
        Binding::Real(v)
    }
}

impl From<&str> for Binding {
    fn from(v: &str) -> Self {
        Binding::Text(v.to_string())
    }
}

impl From<String> for Binding {
    fn from(v: String) -> Self {
        Binding::Text(v)
    }
}

impl<T: Into<Binding>> From<Option<T>> for Binding {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Binding::Null)
    }
}

/// A result row with its column order preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub columns: Vec<String>,
    pub values: Vec<serde_json::Value>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<serde_json::Value>) -> Self {
        Self { columns, values }
    }

    /// Value of a named column.
    pub fn get(&self, column: &str) -> Option<&serde_json::Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|idx| self.values.get(idx))
    }

    /// Value of the first column.
    pub fn first(&self) -> Option<&serde_json::Value> {
        self.values.first()
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(|v| v.as_i64())
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(|v| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Render as a JSON object (column order is not preserved).
    pub fn to_object(&self) -> serde_json::Value {
        let map = self
            .columns
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }
}

// ============================================================================
// DEPLOYMENT IDENTITY
// ============================================================================

/// Host name used when no request host is known.
pub const CLI_HOST: &str = "cli";

/// Stable identifier for one deployment: install path plus request host.
///
/// Two installs sharing one shared-memory segment get different ids and so
/// never read each other's entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SiteId(String);

impl SiteId {
    pub fn derive(install_path: &str, host: Option<&str>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(install_path.as_bytes());
        hasher.update(b"_");
        hasher.update(host.unwrap_or(CLI_HOST).as_bytes());
        let digest = hasher.finalize();
        Self(hex::encode(&digest[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
