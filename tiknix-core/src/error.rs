//! Error types for tiknix operations

use thiserror::Error;

/// Shared cache tier and local bookkeeping errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Shared store unavailable: {backend}")]
    Unavailable { backend: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Serialization failed for {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Deserialization failed for {key}: {reason}")]
    Deserialization { key: String, reason: String },

    #[error("Value under {key} is not a counter")]
    NotACounter { key: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Backing relational store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Query failed: {reason} (sql: {sql})")]
    Failed { sql: String, reason: String },

    #[error("Statement rejected: {reason}")]
    Rejected { reason: String },

    #[error("Connection unavailable: {reason}")]
    ConnectionUnavailable { reason: String },
}

impl QueryError {
    /// Build a `Failed` error from a statement and a displayable cause.
    pub fn failed(sql: &str, reason: impl std::fmt::Display) -> Self {
        Self::Failed {
            sql: sql.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Permission subsystem errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PermissionError {
    #[error("Version file {path} could not be written: {reason}")]
    VersionFile { path: String, reason: String },

    #[error("Handler not found: {control}::{method}")]
    HandlerNotFound { control: String, method: String },

    #[error("Handler {control}::{method} is not public")]
    HandlerNotPublic { control: String, method: String },

    #[error("Failed to create permission {control}::{method}: {reason}")]
    CreateFailed {
        control: String,
        method: String,
        reason: String,
    },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },

    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Master error type for all tiknix errors.
#[derive(Debug, Clone, Error)]
pub enum TiknixError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Permission error: {0}")]
    Permission(#[from] PermissionError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl TiknixError {
    /// True when the error came from the backing relational store.
    pub fn is_query_error(&self) -> bool {
        matches!(self, Self::Query(_))
    }
}

/// Result type alias for tiknix operations.
pub type TiknixResult<T> = Result<T, TiknixError>;
