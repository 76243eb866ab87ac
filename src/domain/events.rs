//! Sync lifecycle notifications
//!
//! Observers hear about batch start, batch end and errors. Nothing they do
//! can change the outcome of a run.

use crate::domain::errors::SyncError;
use crate::domain::sync_stats::{SyncCategory, SyncReport};

pub trait SyncObserver: Send + Sync {
    fn on_batch_start(&self, _category: SyncCategory, _run_id: &str) {}

    fn on_batch_end(&self, _report: &SyncReport) {}

    fn on_error(&self, _category: SyncCategory, _run_id: &str, _error: &SyncError) {}
}
