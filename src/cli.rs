//! Command-line entry: load configuration, set up logging, dispatch

use anyhow::{Context, Result};
use std::process::ExitCode;
use tracing::info;

mod args;

pub use args::{Cli, Commands};

use crate::application::AppState;
use crate::commands::{dedup_table, get_sync_stats, ingest_webhook_file, parse_key_value, run_sync};
use crate::infrastructure::config::ConfigManager;
use crate::infrastructure::logging::init_logging_with_config;

pub async fn run(cli: Cli) -> Result<ExitCode> {
    let manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };
    let mut config = manager
        .load_config()
        .await
        .with_context(|| format!("Failed to load configuration from {}", manager.config_path().display()))?;
    if let Some(level) = &cli.log_level {
        config.logging.level.clone_from(level);
    }

    init_logging_with_config(&config.logging)?;
    info!("⚙️ Session Sync v{} starting", env!("CARGO_PKG_VERSION"));

    let state = AppState::initialize(config).await?;

    match cli.command {
        Commands::Sync { target } => {
            let summary = run_sync(&state, target).await?;
            print_json(&summary)?;
        }
        Commands::Dedup { table, key } => {
            let report = dedup_table(&state, &table, &key).await?;
            print_json(&report)?;
        }
        Commands::Webhook {
            file,
            secret,
            headers,
            query,
        } => {
            let headers = headers
                .iter()
                .map(|pair| parse_key_value(pair))
                .collect::<Result<Vec<_>>>()?;
            let query = query
                .iter()
                .map(|pair| parse_key_value(pair))
                .collect::<Result<Vec<_>>>()?;

            let response = ingest_webhook_file(&state, &file, secret.as_deref(), &headers, &query).await?;
            println!("{response}");
            if !response.is_ok() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Stats => {
            let stats = get_sync_stats(&state).await?;
            print_json(&stats)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
