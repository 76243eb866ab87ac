//! End-to-end sync runs
//!
//! A run fetches every session page, turns the items into rows, upserts them
//! into the category's table and records cumulative statistics. Each run
//! gets a fresh run id carried by its tracing span and observer events.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::application::combiner::{Combiner, SESSION_PREFIX};
use crate::application::upsert::UpsertEngine;
use crate::domain::deadline::SyncDeadline;
use crate::domain::errors::{SyncError, SyncResult};
use crate::domain::events::SyncObserver;
use crate::domain::flat_row::FlatRow;
use crate::domain::flatten::flatten;
use crate::domain::repositories::{SyncStatsRepository, TableStore};
use crate::domain::sync_stats::{SyncCategory, SyncReport, UpsertSummary};
use crate::infrastructure::api_client::ApiClient;
use crate::infrastructure::config::{AppConfig, PaginationConfig, SyncConfig};
use crate::infrastructure::paginator::{PaginationOutcome, Paginator};

pub struct SyncService {
    paginator: Paginator,
    combiner: Combiner,
    upsert: UpsertEngine,
    stats: Arc<dyn SyncStatsRepository>,
    observer: Arc<dyn SyncObserver>,
    sessions_endpoint: String,
    pagination: PaginationConfig,
    sync: SyncConfig,
}

/// What the session fetch produced, shared by the categories of one run.
struct FetchedSessions {
    items: Vec<Value>,
    degraded: usize,
    stopped_by_deadline: bool,
}

impl SyncService {
    pub fn new(
        client: Arc<ApiClient>,
        store: Arc<dyn TableStore>,
        stats: Arc<dyn SyncStatsRepository>,
        observer: Arc<dyn SyncObserver>,
        config: &AppConfig,
    ) -> Self {
        Self {
            paginator: Paginator::new(client.clone()),
            combiner: Combiner::new(client, &config.sync),
            upsert: UpsertEngine::new(store),
            stats,
            observer,
            sessions_endpoint: config.api.sessions_endpoint.clone(),
            pagination: config.pagination.clone(),
            sync: config.sync.clone(),
        }
    }

    /// Sessions only, one row per session.
    pub async fn sync_sessions(&self) -> SyncResult<SyncReport> {
        let run_id = new_run_id();
        let span = info_span!("sync_run", run_id = %run_id, category = "sessions");
        self.observed(SyncCategory::Sessions, &run_id, async {
            let started_at = Utc::now();
            let deadline = self.deadline();
            let fetched = self.fetch_sessions(&deadline).await?;
            self.write_sessions(&run_id, &fetched, started_at).await
        })
        .instrument(span)
        .await
    }

    /// Sessions joined with their registrations.
    pub async fn sync_attendees(&self) -> SyncResult<SyncReport> {
        let run_id = new_run_id();
        let span = info_span!("sync_run", run_id = %run_id, category = "attendees");
        self.observed(SyncCategory::Attendees, &run_id, async {
            let started_at = Utc::now();
            let deadline = self.deadline();
            let fetched = self.fetch_sessions(&deadline).await?;
            self.write_attendees(&run_id, &fetched, &deadline, started_at).await
        })
        .instrument(span)
        .await
    }

    /// Both categories from a single session fetch.
    pub async fn sync_all(&self) -> SyncResult<Vec<SyncReport>> {
        let run_id = new_run_id();
        let span = info_span!("sync_run", run_id = %run_id, category = "all");
        async {
            let started_at = Utc::now();
            let deadline = self.deadline();
            let fetched = self.fetch_sessions(&deadline).await;

            let sessions = self
                .observed(SyncCategory::Sessions, &run_id, async {
                    let fetched = fetched.as_ref().map_err(Clone::clone)?;
                    self.write_sessions(&run_id, fetched, started_at).await
                })
                .await?;

            let attendees = self
                .observed(SyncCategory::Attendees, &run_id, async {
                    let fetched = fetched.as_ref().map_err(Clone::clone)?;
                    self.write_attendees(&run_id, fetched, &deadline, Utc::now()).await
                })
                .await?;

            Ok::<_, SyncError>(vec![sessions, attendees])
        }
        .instrument(span)
        .await
    }

    fn deadline(&self) -> SyncDeadline {
        SyncDeadline::start(self.sync.max_run_duration())
    }

    async fn observed<F>(&self, category: SyncCategory, run_id: &str, work: F) -> SyncResult<SyncReport>
    where
        F: Future<Output = SyncResult<SyncReport>>,
    {
        self.observer.on_batch_start(category, run_id);
        match work.await {
            Ok(report) => {
                self.observer.on_batch_end(&report);
                Ok(report)
            }
            Err(error) => {
                self.observer.on_error(category, run_id, &error);
                Err(error)
            }
        }
    }

    /// A page failure with nothing fetched fails the run; a later one only
    /// degrades it.
    async fn fetch_sessions(&self, deadline: &SyncDeadline) -> SyncResult<FetchedSessions> {
        let PaginationOutcome {
            items,
            error,
            stopped_by_deadline,
            ..
        } = self
            .paginator
            .fetch_all_with_fallback(&self.sessions_endpoint, &self.pagination, deadline)
            .await;

        match error {
            Some(error) if items.is_empty() => Err(error),
            Some(error) => {
                warn!("⚠️ Session list truncated at {} items: {}", items.len(), error);
                Ok(FetchedSessions {
                    items,
                    degraded: 1,
                    stopped_by_deadline,
                })
            }
            None => Ok(FetchedSessions {
                items,
                degraded: 0,
                stopped_by_deadline,
            }),
        }
    }

    async fn write_sessions(
        &self,
        run_id: &str,
        fetched: &FetchedSessions,
        started_at: DateTime<Utc>,
    ) -> SyncResult<SyncReport> {
        let rows: Vec<FlatRow> = fetched
            .items
            .iter()
            .map(|item| flatten(item, SESSION_PREFIX))
            .collect();

        let summary = self
            .upsert
            .batch_upsert(&rows, &self.sync.sessions_key, &self.sync.sessions_table)
            .await?;
        self.record_stats(SyncCategory::Sessions, &summary).await;

        Ok(SyncReport {
            run_id: run_id.to_string(),
            category: SyncCategory::Sessions,
            table: self.sync.sessions_table.clone(),
            items_fetched: fetched.items.len(),
            rows_written: summary.total_written(),
            summary,
            degraded: fetched.degraded,
            stopped_by_deadline: fetched.stopped_by_deadline,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn write_attendees(
        &self,
        run_id: &str,
        fetched: &FetchedSessions,
        deadline: &SyncDeadline,
        started_at: DateTime<Utc>,
    ) -> SyncResult<SyncReport> {
        let combined = self.combiner.combine(&fetched.items, deadline).await;

        let summary = self
            .upsert
            .batch_upsert(&combined.rows, &self.sync.attendees_key, &self.sync.attendees_table)
            .await?;
        self.record_stats(SyncCategory::Attendees, &summary).await;

        Ok(SyncReport {
            run_id: run_id.to_string(),
            category: SyncCategory::Attendees,
            table: self.sync.attendees_table.clone(),
            items_fetched: fetched.items.len(),
            rows_written: summary.total_written(),
            summary,
            degraded: fetched.degraded + combined.failed_sessions,
            stopped_by_deadline: fetched.stopped_by_deadline || combined.stopped_by_deadline,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// The table is already written; a stats failure only costs the counters.
    async fn record_stats(&self, category: SyncCategory, summary: &UpsertSummary) {
        match self.stats.record(category, summary, Utc::now()).await {
            Ok(stats) => info!(
                "📈 {} totals: {} created, {} updated",
                category, stats.total_created, stats.total_updated
            ),
            Err(error) => warn!("⚠️ Failed to record {} stats: {}", category, error),
        }
    }
}

fn new_run_id() -> String {
    Uuid::new_v4().to_string()
}

impl std::fmt::Debug for SyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncService")
            .field("sessions_endpoint", &self.sessions_endpoint)
            .field("sessions_table", &self.sync.sessions_table)
            .field("attendees_table", &self.sync.attendees_table)
            .finish_non_exhaustive()
    }
}
