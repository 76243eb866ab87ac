//! Collaborator interfaces consumed by the sync engine
//!
//! Storage, credentials and statistics persistence live behind these traits
//! so the algorithms can run against in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::SyncResult;
use crate::domain::flat_row::FlatValue;
use crate::domain::sync_stats::{CategoryStats, SyncCategory, UpsertSummary};
use crate::domain::table::Table;

/// Tabular storage backend: one header plus rows per named table.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Current contents, creating an empty table on first use.
    async fn get_or_create_table(&self, name: &str) -> SyncResult<Table>;

    async fn read_table(&self, name: &str) -> SyncResult<Option<Table>>;

    /// Replace header and rows in one step.
    async fn write_table(&self, table: &Table) -> SyncResult<()>;

    /// Append rows under the table's existing header.
    async fn append_rows(&self, name: &str, rows: &[Vec<FlatValue>]) -> SyncResult<()>;

    async fn list_tables(&self) -> SyncResult<Vec<String>>;
}

/// Source of API location and secret.
pub trait CredentialProvider: Send + Sync {
    fn api_base_url(&self) -> SyncResult<String>;

    /// Fails with a configuration error when no token is set.
    fn api_token(&self) -> SyncResult<String>;
}

/// Cumulative per-category counters, kept outside the core.
#[async_trait]
pub trait SyncStatsRepository: Send + Sync {
    async fn record(
        &self,
        category: SyncCategory,
        summary: &UpsertSummary,
        at: DateTime<Utc>,
    ) -> SyncResult<CategoryStats>;

    async fn get(&self, category: SyncCategory) -> SyncResult<CategoryStats>;

    async fn all(&self) -> SyncResult<Vec<CategoryStats>>;
}
