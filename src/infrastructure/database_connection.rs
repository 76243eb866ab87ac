// Database connection and pool management
// SQLite through sqlx; tables are created by `migrate`

use anyhow::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;

#[derive(Clone)]
pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        if !database_url.contains(":memory:") {
            let db_path = database_url
                .strip_prefix("sqlite://")
                .or_else(|| database_url.strip_prefix("sqlite:"))
                .unwrap_or(database_url);

            if let Some(parent) = Path::new(db_path).parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            if !Path::new(db_path).exists() {
                tokio::fs::File::create(db_path).await?;
            }
        }

        // a shared in-memory database only lives as long as one connection
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Connect and create the schema.
    pub async fn open(database_url: &str) -> Result<Self> {
        let db = Self::new(database_url).await?;
        db.migrate().await?;
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let create_tables_sql = r#"
            CREATE TABLE IF NOT EXISTS sheet_tables (
                name TEXT PRIMARY KEY,
                header TEXT NOT NULL DEFAULT '[]',
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
        "#;

        let create_rows_sql = r#"
            CREATE TABLE IF NOT EXISTS sheet_rows (
                table_name TEXT NOT NULL,
                position INTEGER NOT NULL,
                cells TEXT NOT NULL,
                PRIMARY KEY (table_name, position),
                FOREIGN KEY (table_name) REFERENCES sheet_tables (name) ON DELETE CASCADE
            )
        "#;

        let create_stats_sql = r#"
            CREATE TABLE IF NOT EXISTS sync_stats (
                category TEXT PRIMARY KEY,
                total_created INTEGER NOT NULL DEFAULT 0,
                total_updated INTEGER NOT NULL DEFAULT 0,
                last_event_at DATETIME
            )
        "#;

        sqlx::query(create_tables_sql).execute(&self.pool).await?;
        sqlx::query(create_rows_sql).execute(&self.pool).await?;
        sqlx::query(create_stats_sql).execute(&self.pool).await?;

        Ok(())
    }
}
