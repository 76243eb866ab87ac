use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::SyncTarget;

#[derive(Debug, Parser)]
#[command(name = "session-sync")]
#[command(about = "Sync paginated session/registration APIs and webhook events into keyed tables", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Overrides the configured log level
    #[arg(long, value_parser = ["error", "warn", "info", "debug", "trace"], global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Fetch sessions (and registrations) and upsert them
    Sync {
        #[arg(value_enum, default_value = "all")]
        target: SyncTarget,
    },

    /// Remove rows repeating a key value, keeping the first
    Dedup {
        #[arg(long)]
        table: String,

        #[arg(long)]
        key: String,
    },

    /// Run one stored payload through the webhook handler
    Webhook {
        #[arg(long)]
        file: PathBuf,

        #[arg(long)]
        secret: Option<String>,

        /// Extra request header, `name=value` (repeatable)
        #[arg(long = "header")]
        headers: Vec<String>,

        /// Query parameter, `name=value` (repeatable)
        #[arg(long = "query")]
        query: Vec<String>,
    },

    /// Print cumulative sync statistics as JSON
    Stats,
}
