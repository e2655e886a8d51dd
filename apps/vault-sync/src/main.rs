mod cli;
mod commands;
mod engine_build;
mod error;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command};
use error::AppError;
use vault_sync_config::VaultSyncConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if matches!(cli.command, Command::Version) {
        commands::version();
        return Ok(());
    }

    let config_path = cli.config.to_string_lossy().into_owned();
    let config = VaultSyncConfig::from_file(&config_path).map_err(AppError::Config)?;
    init_tracing(&config);

    let ct = CancellationToken::new();
    spawn_signal_handler(ct.clone());

    match cli.command {
        Command::Sync => commands::sync(&config, &ct).await?,
        Command::PrintConfig { section } => commands::print_config(&config, section.as_deref())?,
        Command::DryRunPathMatch { paths_file } => commands::dry_run_path_match(&config, &paths_file)?,
        Command::Version => unreachable!("handled above"),
    }

    Ok(())
}

fn init_tracing(config: &VaultSyncConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.as_tracing_level()));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

fn spawn_signal_handler(ct: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("received interrupt, cancelling in-flight sync work");
            ct.cancel();
        }
    });
}
