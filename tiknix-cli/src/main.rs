//! tiknix-cache entry point.

use std::process::ExitCode;

use clap::Parser;
use tiknix_cli::{init_tracing, run, CacheServices, Cli, CliResult};

async fn execute(cli: Cli) -> CliResult<String> {
    let config = cli.load_config()?;
    let services = CacheServices::from_config(config).await?;
    run(&cli.command, &services, cli.output_format()).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(cli.log_json) {
        eprintln!("{}", e);
    }

    match execute(cli).await {
        Ok(output) => {
            print!("{}", output);
            if !output.ends_with('\n') {
                println!();
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
