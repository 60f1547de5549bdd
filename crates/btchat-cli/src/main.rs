//! BtChat CLI entry point

use anyhow::Context;
use clap::Parser;
use tracing::info;

use btchat_cli::{cli::Cli, commands::CommandDispatcher, config::AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    setup_logging(cli.verbose);

    // Load configuration
    let config = load_configuration(&cli)?;

    CommandDispatcher::execute(cli, config)
        .await
        .context("Command execution failed")?;

    info!("BtChat CLI exited");
    Ok(())
}

/// Setup logging based on verbosity level. Logs go to stderr so the chat
/// transcript on stdout stays clean.
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Load configuration from file or use defaults
fn load_configuration(cli: &Cli) -> anyhow::Result<AppConfig> {
    if let Some(config_path) = &cli.config {
        info!("Loading configuration from: {}", config_path);
        AppConfig::load_from_file(config_path)
            .with_context(|| format!("Failed to load configuration from {}", config_path))
    } else {
        info!("Using default configuration");
        Ok(AppConfig::default())
    }
}
