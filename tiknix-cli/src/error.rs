//! CLI error type.

use thiserror::Error;
use tiknix_core::{ConfigError, PermissionError, TiknixError};

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Tiknix(#[from] TiknixError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Permission cache error: {0}")]
    Permission(#[from] PermissionError),

    #[error("Failed to render output: {0}")]
    Output(#[from] serde_json::Error),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

pub type CliResult<T> = Result<T, CliError>;
