//! Persistence for cumulative per-category sync statistics

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::errors::SyncResult;
use crate::domain::repositories::SyncStatsRepository;
use crate::domain::sync_stats::{CategoryStats, SyncCategory, UpsertSummary};

#[derive(Clone)]
pub struct SqliteSyncStatsRepository {
    pool: SqlitePool,
}

impl SqliteSyncStatsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_stats(category: SyncCategory, row: &SqliteRow) -> SyncResult<CategoryStats> {
        let total_created: i64 = row.try_get("total_created")?;
        let total_updated: i64 = row.try_get("total_updated")?;
        Ok(CategoryStats {
            category,
            total_created: total_created.max(0) as u64,
            total_updated: total_updated.max(0) as u64,
            last_event_at: row.try_get("last_event_at")?,
        })
    }
}

#[async_trait]
impl SyncStatsRepository for SqliteSyncStatsRepository {
    async fn record(
        &self,
        category: SyncCategory,
        summary: &UpsertSummary,
        at: DateTime<Utc>,
    ) -> SyncResult<CategoryStats> {
        sqlx::query(
            r#"
            INSERT INTO sync_stats (category, total_created, total_updated, last_event_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(category) DO UPDATE SET
                total_created = total_created + excluded.total_created,
                total_updated = total_updated + excluded.total_updated,
                last_event_at = excluded.last_event_at
            "#,
        )
        .bind(category.as_str())
        .bind(summary.created as i64)
        .bind(summary.updated as i64)
        .bind(at)
        .execute(&self.pool)
        .await?;

        self.get(category).await
    }

    async fn get(&self, category: SyncCategory) -> SyncResult<CategoryStats> {
        let row = sqlx::query(
            "SELECT total_created, total_updated, last_event_at FROM sync_stats WHERE category = ?",
        )
        .bind(category.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_stats(category, &row),
            None => Ok(CategoryStats::empty(category)),
        }
    }

    async fn all(&self) -> SyncResult<Vec<CategoryStats>> {
        let mut stats = Vec::with_capacity(SyncCategory::ALL.len());
        for category in SyncCategory::ALL {
            stats.push(self.get(category).await?);
        }
        Ok(stats)
    }
}

/// Process-local statistics, used by tests and dry runs.
#[derive(Clone, Default)]
pub struct InMemorySyncStatsRepository {
    stats: Arc<Mutex<HashMap<SyncCategory, CategoryStats>>>,
}

impl InMemorySyncStatsRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SyncStatsRepository for InMemorySyncStatsRepository {
    async fn record(
        &self,
        category: SyncCategory,
        summary: &UpsertSummary,
        at: DateTime<Utc>,
    ) -> SyncResult<CategoryStats> {
        let mut stats = self.stats.lock().await;
        let entry = stats
            .entry(category)
            .or_insert_with(|| CategoryStats::empty(category));
        entry.record(summary, at);
        Ok(entry.clone())
    }

    async fn get(&self, category: SyncCategory) -> SyncResult<CategoryStats> {
        Ok(self
            .stats
            .lock()
            .await
            .get(&category)
            .cloned()
            .unwrap_or_else(|| CategoryStats::empty(category)))
    }

    async fn all(&self) -> SyncResult<Vec<CategoryStats>> {
        let stats = self.stats.lock().await;
        Ok(SyncCategory::ALL
            .iter()
            .map(|category| {
                stats
                    .get(category)
                    .cloned()
                    .unwrap_or_else(|| CategoryStats::empty(*category))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database_connection::DatabaseConnection;
    use anyhow::Result;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn summary(created: usize, updated: usize) -> UpsertSummary {
        UpsertSummary {
            created,
            updated,
            skipped: 0,
        }
    }

    #[tokio::test]
    async fn test_sqlite_stats_accumulate() -> Result<()> {
        let dir = tempdir()?;
        let url = format!("sqlite:{}", dir.path().join("stats.db").display());
        let db = DatabaseConnection::open(&url).await?;
        let repo = SqliteSyncStatsRepository::new(db.pool().clone());

        let first = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2024, 3, 2, 9, 0, 0).unwrap();

        repo.record(SyncCategory::Sessions, &summary(3, 0), first).await?;
        let stats = repo.record(SyncCategory::Sessions, &summary(1, 2), second).await?;

        assert_eq!(stats.total_created, 4);
        assert_eq!(stats.total_updated, 2);
        assert_eq!(stats.last_event_at, Some(second));
        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_untouched_category_is_empty() -> Result<()> {
        let dir = tempdir()?;
        let url = format!("sqlite:{}", dir.path().join("stats.db").display());
        let db = DatabaseConnection::open(&url).await?;
        let repo = SqliteSyncStatsRepository::new(db.pool().clone());

        let all = repo.all().await?;
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|s| s.total_created == 0 && s.last_event_at.is_none()));
        Ok(())
    }

    #[tokio::test]
    async fn test_in_memory_stats_accumulate() -> Result<()> {
        let repo = InMemorySyncStatsRepository::new();
        let now = Utc::now();
        repo.record(SyncCategory::Webhook, &summary(1, 0), now).await?;
        repo.record(SyncCategory::Webhook, &summary(0, 1), now).await?;

        let stats = repo.get(SyncCategory::Webhook).await?;
        assert_eq!((stats.total_created, stats.total_updated), (1, 1));
        assert_eq!(repo.get(SyncCategory::Attendees).await?.total_created, 0);
        Ok(())
    }
}
