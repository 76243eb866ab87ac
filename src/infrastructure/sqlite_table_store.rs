//! SQLite-backed table storage
//!
//! Each logical table is one `sheet_tables` row holding the header as JSON
//! text, plus one `sheet_rows` row per body row holding its cells as a JSON
//! array. Full rewrites happen inside a single transaction.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::domain::errors::{SyncError, SyncResult};
use crate::domain::flat_row::FlatValue;
use crate::domain::repositories::TableStore;
use crate::domain::table::Table;

#[derive(Clone)]
pub struct SqliteTableStore {
    pool: SqlitePool,
}

impl SqliteTableStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_rows(&self, name: &str) -> SyncResult<Vec<Vec<FlatValue>>> {
        let rows = sqlx::query(
            "SELECT cells FROM sheet_rows WHERE table_name = ? ORDER BY position ASC",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> SyncResult<Vec<FlatValue>> {
                let cells: String = row.try_get("cells")?;
                Ok(serde_json::from_str(&cells)?)
            })
            .collect()
    }
}

#[async_trait]
impl TableStore for SqliteTableStore {
    async fn get_or_create_table(&self, name: &str) -> SyncResult<Table> {
        sqlx::query("INSERT OR IGNORE INTO sheet_tables (name, header) VALUES (?, '[]')")
            .bind(name)
            .execute(&self.pool)
            .await?;

        self.read_table(name)
            .await?
            .ok_or_else(|| SyncError::storage(format!("table '{name}' missing right after creation")))
    }

    async fn read_table(&self, name: &str) -> SyncResult<Option<Table>> {
        let header: Option<String> = sqlx::query_scalar("SELECT header FROM sheet_tables WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        let Some(header) = header else {
            return Ok(None);
        };
        let header: Vec<String> = serde_json::from_str(&header)?;
        let rows = self.load_rows(name).await?;
        Ok(Some(Table::with_contents(name, header, rows)))
    }

    async fn write_table(&self, table: &Table) -> SyncResult<()> {
        let header = serde_json::to_string(table.header())?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO sheet_tables (name, header) VALUES (?, ?)
            ON CONFLICT(name) DO UPDATE SET header = excluded.header, updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&table.name)
        .bind(&header)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM sheet_rows WHERE table_name = ?")
            .bind(&table.name)
            .execute(&mut *tx)
            .await?;

        for (position, cells) in table.rows().iter().enumerate() {
            sqlx::query("INSERT INTO sheet_rows (table_name, position, cells) VALUES (?, ?, ?)")
                .bind(&table.name)
                .bind(position as i64)
                .bind(serde_json::to_string(cells)?)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!("💾 Wrote table '{}' ({} rows)", table.name, table.row_count());
        Ok(())
    }

    async fn append_rows(&self, name: &str, rows: &[Vec<FlatValue>]) -> SyncResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;

        let exists: Option<String> = sqlx::query_scalar("SELECT name FROM sheet_tables WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(SyncError::storage(format!("cannot append to unknown table '{name}'")));
        }

        let next: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM sheet_rows WHERE table_name = ?",
        )
        .bind(name)
        .fetch_one(&mut *tx)
        .await?;

        for (offset, cells) in rows.iter().enumerate() {
            sqlx::query("INSERT INTO sheet_rows (table_name, position, cells) VALUES (?, ?, ?)")
                .bind(name)
                .bind(next + offset as i64)
                .bind(serde_json::to_string(cells)?)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("UPDATE sheet_tables SET updated_at = CURRENT_TIMESTAMP WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!("💾 Appended {} rows to '{}'", rows.len(), name);
        Ok(())
    }

    async fn list_tables(&self) -> SyncResult<Vec<String>> {
        let names = sqlx::query_scalar("SELECT name FROM sheet_tables ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }
}
