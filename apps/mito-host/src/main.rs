mod app;
mod bridge;
mod cli;
mod error;
mod telemetry;

use clap::Parser;
use tracing::debug;

use crate::cli::Cli;
use crate::error::HostError;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("❌ {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), HostError> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let log_config = cli.logging.to_config();
    let _log_guard =
        telemetry::init(&log_config).map_err(|err| HostError::Logging(err.to_string()))?;
    debug!(
        target: "mito::host",
        log_level = ?log_config.level,
        log_file = ?log_config.file,
        log_filter = ?log_config.filter,
        "logging configured"
    );

    let output = app::execute(cli.backend.as_deref(), cli.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
