//! Configuration loading for tiknix cache tooling.
//!
//! Settings come from a TOML file named by `--config` or `TIKNIX_CONFIG`,
//! then individual `TIKNIX_*` environment variables override single fields.
//! Every section has defaults so an empty file is a valid configuration.

use crate::error::ConfigError;
use crate::SiteId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TiknixConfig {
    pub site: SiteSettings,
    pub shared_tier: SharedTierSettings,
    pub query_cache: QueryCacheSettings,
    pub permission_cache: PermissionCacheSettings,
    pub database: DatabaseSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SiteSettings {
    /// Install directory; part of the deployment identity.
    pub install_path: String,
    /// Request host; `None` means command-line use.
    pub host: Option<String>,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            install_path: ".".to_string(),
            host: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SharedTierBackend {
    /// Memory-mapped store shared by every process on the host.
    Lmdb,
    /// Process-local map; useful for tests and single-process tools.
    Memory,
    /// No shared tier. Every lookup falls through.
    Disabled,
}

impl std::str::FromStr for SharedTierBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lmdb" => Ok(Self::Lmdb),
            "memory" => Ok(Self::Memory),
            "disabled" | "none" | "off" => Ok(Self::Disabled),
            other => Err(ConfigError::InvalidValue {
                field: "shared_tier.backend",
                reason: format!("unknown backend '{}'", other),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SharedTierSettings {
    pub backend: SharedTierBackend,
    pub path: PathBuf,
    pub max_size_mb: usize,
}

impl Default for SharedTierSettings {
    fn default() -> Self {
        Self {
            backend: SharedTierBackend::Lmdb,
            path: PathBuf::from("cache/shared"),
            max_size_mb: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct QueryCacheSettings {
    pub enabled: bool,
    pub default_ttl_secs: u64,
}

impl Default for QueryCacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_secs: 60,
        }
    }
}

impl QueryCacheSettings {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PermissionCacheSettings {
    pub ttl_secs: u64,
    pub version_file: PathBuf,
    /// Auto-create missing permissions for public handlers.
    pub build_mode: bool,
    /// Log every default-rule decision at info instead of debug.
    pub debug_access_log: bool,
}

impl Default for PermissionCacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            version_file: PathBuf::from("cache/.permission_cache_version"),
            build_mode: false,
            debug_access_log: false,
        }
    }
}

impl PermissionCacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DatabaseSettings {
    pub path: PathBuf,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("database/tiknix.db"),
        }
    }
}

impl TiknixConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    /// Apply `TIKNIX_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TIKNIX_INSTALL_PATH") {
            self.site.install_path = v;
        }
        if let Some(v) = lookup("TIKNIX_HOST") {
            self.site.host = Some(v).filter(|h| !h.trim().is_empty());
        }
        if let Some(v) = lookup("TIKNIX_SHARED_BACKEND") {
            self.shared_tier.backend = v.parse()?;
        }
        if let Some(v) = lookup("TIKNIX_SHARED_PATH") {
            self.shared_tier.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("TIKNIX_QUERY_CACHE") {
            self.query_cache.enabled = parse_bool("query_cache.enabled", &v)?;
        }
        if let Some(v) = lookup("TIKNIX_QUERY_CACHE_TTL") {
            self.query_cache.default_ttl_secs = parse_u64("query_cache.default_ttl_secs", &v)?;
        }
        if let Some(v) = lookup("TIKNIX_PERMISSION_TTL") {
            self.permission_cache.ttl_secs = parse_u64("permission_cache.ttl_secs", &v)?;
        }
        if let Some(v) = lookup("TIKNIX_BUILD_MODE") {
            self.permission_cache.build_mode = parse_bool("permission_cache.build_mode", &v)?;
        }
        if let Some(v) = lookup("TIKNIX_DATABASE") {
            self.database.path = PathBuf::from(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.site.install_path.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "site.install_path",
                reason: "must not be empty".to_string(),
            });
        }
        if self.shared_tier.backend == SharedTierBackend::Lmdb {
            if self.shared_tier.path.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "shared_tier.path",
                    reason: "must not be empty for the lmdb backend".to_string(),
                });
            }
            if self.shared_tier.max_size_mb == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "shared_tier.max_size_mb",
                    reason: "must be > 0".to_string(),
                });
            }
        }
        if self.query_cache.default_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "query_cache.default_ttl_secs",
                reason: "must be > 0".to_string(),
            });
        }
        if self.permission_cache.ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "permission_cache.ttl_secs",
                reason: "must be > 0".to_string(),
            });
        }
        if self.permission_cache.version_file.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "permission_cache.version_file",
                reason: "must not be empty".to_string(),
            });
        }
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "database.path",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn site_id(&self) -> SiteId {
        SiteId::derive(&self.site.install_path, self.site.host.as_deref())
    }
}

fn parse_bool(field: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            field,
            reason: format!("expected a boolean, got '{}'", other),
        }),
    }
}

fn parse_u64(field: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field,
        reason: format!("expected a non-negative integer, got '{}'", value),
    })
}
