use std::process::ExitCode;

use backbox_upgrade::cli::{self, Cli};
use backbox_upgrade::logging::{self, LogConfig};
use clap::Parser;
use tracing::debug;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Before logging so LOG_LEVEL may come from .env.
    let dotenv = dotenvy::dotenv().ok();

    logging::init(LogConfig {
        json: cli.json_logs,
        verbose: cli.verbose,
        level: std::env::var("LOG_LEVEL").ok(),
    });

    if let Some(path) = dotenv {
        debug!(path = %path.display(), "Loaded environment variables from .env");
    }

    ExitCode::from(cli::execute(&cli).await)
}
