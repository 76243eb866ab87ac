//! Session Sync - paginated REST reconciliation into keyed tables
//!
//! Pulls sessions and their registrations from a paginated JSON API,
//! flattens them into wide rows and upserts them into primary-key-indexed
//! tables; webhook events land in a table of their own.

// Module declarations
pub mod application;
pub mod cli;
pub mod commands;
pub mod domain;
pub mod infrastructure;

pub use cli::{run, Cli};
