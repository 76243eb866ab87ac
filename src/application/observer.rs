//! Default sync observer: lifecycle events become log lines

use tracing::{error, info};

use crate::domain::errors::SyncError;
use crate::domain::events::SyncObserver;
use crate::domain::sync_stats::{SyncCategory, SyncReport};

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SyncObserver for TracingObserver {
    fn on_batch_start(&self, category: SyncCategory, run_id: &str) {
        info!("🚀 Sync of {} started (run {})", category, run_id);
    }

    fn on_batch_end(&self, report: &SyncReport) {
        info!(
            "🏁 Sync of {} into '{}' finished in {}ms: {} fetched, {} created, {} updated, {} skipped, {} degraded{}",
            report.category,
            report.table,
            report.duration_ms(),
            report.items_fetched,
            report.summary.created,
            report.summary.updated,
            report.summary.skipped,
            report.degraded,
            if report.stopped_by_deadline { " (stopped by deadline)" } else { "" }
        );
    }

    fn on_error(&self, category: SyncCategory, run_id: &str, error: &SyncError) {
        error!("❌ Sync of {} failed (run {}): {}", category, run_id, error);
    }
}
