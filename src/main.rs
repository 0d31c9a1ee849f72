//! Parlance - streaming conversation sessions for AI providers
//!
//! Main entry point for the Parlance CLI.

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use parlance::cli::{Cli, Commands};
use parlance::commands;
use parlance::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_tracing(cli.verbose);

    // Mirror a CLI storage path into the env var the store initializer
    // reads, so library callers stay unchanged.
    if let Some(db_path) = &cli.storage_path {
        std::env::set_var("PARLANCE_HISTORY_DB", db_path);
        tracing::info!("Using storage DB override: {}", db_path);
    }

    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let provider_override = match &cli.command {
        Commands::Chat { provider, .. } => provider.as_deref(),
        _ => None,
    };
    let config = Config::load(config_path, provider_override)?;
    config.validate()?;

    match cli.command {
        Commands::Chat { resume, .. } => {
            tracing::info!("Starting interactive chat");
            commands::chat::run_chat(config, resume).await?;
        }
        Commands::History { command } => {
            tracing::info!("Starting history command");
            commands::history::handle_history(&config, command).await?;
        }
    }

    Ok(())
}

/// Initialize tracing subscriber with environment filter
fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "parlance=debug" } else { "parlance=info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
