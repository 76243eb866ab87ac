//! Sync commands: sessions, attendees or both

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::application::{AppState, SyncService};
use crate::domain::sync_stats::{SyncReport, UpsertSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncTarget {
    Sessions,
    Attendees,
    All,
}

/// Summary across the reports of one command invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSummary {
    pub reports: Vec<SyncReport>,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub degraded: usize,
}

impl SyncSummary {
    pub fn from_reports(reports: Vec<SyncReport>) -> Self {
        let mut totals = UpsertSummary::default();
        for report in &reports {
            totals.absorb(report.summary);
        }
        let degraded = reports.iter().map(|r| r.degraded).sum();
        Self {
            reports,
            created: totals.created,
            updated: totals.updated,
            skipped: totals.skipped,
            degraded,
        }
    }
}

pub async fn run_sync(state: &AppState, target: SyncTarget) -> Result<SyncSummary> {
    let service = state.sync_service()?;
    run_sync_with(&service, target).await
}

pub async fn run_sync_with(service: &SyncService, target: SyncTarget) -> Result<SyncSummary> {
    info!("🔄 Starting {:?} sync", target);
    let reports = match target {
        SyncTarget::Sessions => vec![service.sync_sessions().await.context("Session sync failed")?],
        SyncTarget::Attendees => vec![service.sync_attendees().await.context("Attendee sync failed")?],
        SyncTarget::All => service.sync_all().await.context("Full sync failed")?,
    };
    Ok(SyncSummary::from_reports(reports))
}
