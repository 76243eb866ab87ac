//! Application layer - sync orchestration and webhook ingestion
//!
//! Coordinates the domain algorithms with the infrastructure adapters for
//! the concrete workflows: session sync, attendee sync, dedup and webhooks.

pub mod combiner;
pub mod observer;
pub mod state;
pub mod sync_service;
pub mod upsert;
pub mod webhook;

// Re-export commonly used items
pub use combiner::{CombineOutcome, Combiner};
pub use observer::TracingObserver;
pub use state::AppState;
pub use sync_service::SyncService;
pub use upsert::UpsertEngine;
pub use webhook::{WebhookHandler, WebhookRequest, WebhookResponse};
