//! Operator commands behind the command-line surface
//!
//! Each command takes the shared `AppState` and returns a serializable
//! result the CLI prints.

pub mod db_cleanup;
pub mod stats_commands;
pub mod sync_commands;
pub mod webhook_commands;

// Re-export all commands
pub use db_cleanup::{dedup_table, DedupCleanupReport};
pub use stats_commands::get_sync_stats;
pub use sync_commands::{run_sync, run_sync_with, SyncSummary, SyncTarget};
pub use webhook_commands::{ingest_webhook_file, parse_key_value};
