use anyhow::{Context, Result};
use serde::Serialize;

use crate::application::AppState;

#[derive(Debug, Serialize)]
pub struct DedupCleanupReport {
    pub table: String,
    pub key_field: String,
    pub rows_removed: usize,
    pub remaining_duplicates: usize,
    pub remaining_rows: usize,
}

/// Repair a table whose key column picked up duplicates, keeping the first
/// row per key.
pub async fn dedup_table(state: &AppState, table: &str, key_field: &str) -> Result<DedupCleanupReport> {
    let rows_removed = state
        .upsert_engine()
        .dedup(table, key_field)
        .await
        .with_context(|| format!("Failed to dedup table '{table}' by '{key_field}'"))?;

    let after = state
        .store
        .read_table(table)
        .await?
        .with_context(|| format!("Table '{table}' disappeared during dedup"))?;

    Ok(DedupCleanupReport {
        table: table.to_string(),
        key_field: key_field.to_string(),
        rows_removed,
        remaining_duplicates: after.duplicate_count(key_field),
        remaining_rows: after.row_count(),
    })
}
