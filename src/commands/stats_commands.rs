use anyhow::Result;

use crate::application::AppState;
use crate::domain::sync_stats::CategoryStats;

/// Cumulative statistics for every category, untouched ones included.
pub async fn get_sync_stats(state: &AppState) -> Result<Vec<CategoryStats>> {
    Ok(state.stats.all().await?)
}
