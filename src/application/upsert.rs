//! Keyed upsert and dedup against a `TableStore`
//!
//! Loads the table, applies the batch in memory and writes back the smallest
//! change the store supports: a plain append when only new rows arrived
//! under an unchanged header, a full rewrite otherwise.

use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::errors::{SyncError, SyncResult};
use crate::domain::flat_row::FlatRow;
use crate::domain::repositories::TableStore;
use crate::domain::sync_stats::UpsertSummary;

#[derive(Clone)]
pub struct UpsertEngine {
    store: Arc<dyn TableStore>,
}

impl UpsertEngine {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn TableStore> {
        &self.store
    }

    pub async fn upsert(&self, record: &FlatRow, key_field: &str, table_name: &str) -> SyncResult<UpsertSummary> {
        self.batch_upsert(std::slice::from_ref(record), key_field, table_name)
            .await
    }

    pub async fn batch_upsert(
        &self,
        records: &[FlatRow],
        key_field: &str,
        table_name: &str,
    ) -> SyncResult<UpsertSummary> {
        if records.is_empty() {
            debug!("Nothing to upsert into '{}'", table_name);
            return Ok(UpsertSummary::default());
        }

        let mut table = self.store.get_or_create_table(table_name).await?;
        let outcome = table.apply_upsert(records, key_field)?;

        if outcome.is_append_only() {
            let new_rows = &table.rows()[outcome.first_new_row..];
            self.store.append_rows(table_name, new_rows).await?;
        } else {
            self.store.write_table(&table).await?;
        }

        let summary = outcome.summary;
        info!(
            "📊 Upserted into '{}' by '{}': {} created, {} updated, {} skipped",
            table_name, key_field, summary.created, summary.updated, summary.skipped
        );
        Ok(summary)
    }

    /// Remove later rows that repeat a key value. Returns the removed count.
    pub async fn dedup(&self, table_name: &str, key_field: &str) -> SyncResult<usize> {
        let mut table = self
            .store
            .read_table(table_name)
            .await?
            .ok_or_else(|| SyncError::configuration(format!("table '{table_name}' does not exist")))?;

        let removed = table.dedup(key_field)?;
        if removed > 0 {
            self.store.write_table(&table).await?;
        }
        info!("🧹 Dedup of '{}' by '{}' removed {} rows", table_name, key_field, removed);
        Ok(removed)
    }
}
