//! tiknix CLI - Cache Administration
//!
//! Command line surface for the permission and query caches: statistics,
//! clearing, warmup, permission checks and table invalidation.

pub mod commands;
pub mod error;
pub mod services;

pub use commands::{run, Command, OutputFormat};
pub use error::{CliError, CliResult};
pub use services::CacheServices;

use std::path::PathBuf;

use clap::Parser;
use tiknix_core::TiknixConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "tiknix-cache", version, about = "Manage tiknix permission and query caches")]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, env = "TIKNIX_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Print command output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn output_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }

    /// Config from `--config` (defaults when absent), then env overrides.
    pub fn load_config(&self) -> CliResult<TiknixConfig> {
        let mut config = match &self.config {
            Some(path) => TiknixConfig::from_path(path)?,
            None => TiknixConfig::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }
}

/// Install the global subscriber. Logs go to stderr; `RUST_LOG` overrides
/// the default filter.
pub fn init_tracing(json: bool) -> CliResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tiknix=info,tiknix_cli=info,warn"));
    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    result.map_err(|e| CliError::Logging(e.to_string()))
}
