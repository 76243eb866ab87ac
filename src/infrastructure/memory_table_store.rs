//! In-memory table storage for tests and dry runs

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::errors::{SyncError, SyncResult};
use crate::domain::flat_row::FlatValue;
use crate::domain::repositories::TableStore;
use crate::domain::table::Table;

#[derive(Clone, Default)]
pub struct InMemoryTableStore {
    tables: Arc<RwLock<BTreeMap<String, Table>>>,
    writes: Arc<RwLock<usize>>,
}

impl InMemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a table directly, e.g. with duplicate rows from a bulk import.
    pub async fn insert_table(&self, table: Table) {
        self.tables.write().await.insert(table.name.clone(), table);
    }

    /// Number of full-table rewrites performed so far.
    pub async fn full_writes(&self) -> usize {
        *self.writes.read().await
    }
}

#[async_trait]
impl TableStore for InMemoryTableStore {
    async fn get_or_create_table(&self, name: &str) -> SyncResult<Table> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .entry(name.to_string())
            .or_insert_with(|| Table::new(name))
            .clone())
    }

    async fn read_table(&self, name: &str) -> SyncResult<Option<Table>> {
        Ok(self.tables.read().await.get(name).cloned())
    }

    async fn write_table(&self, table: &Table) -> SyncResult<()> {
        self.tables
            .write()
            .await
            .insert(table.name.clone(), table.clone());
        *self.writes.write().await += 1;
        Ok(())
    }

    async fn append_rows(&self, name: &str, rows: &[Vec<FlatValue>]) -> SyncResult<()> {
        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(name)
            .ok_or_else(|| SyncError::storage(format!("cannot append to unknown table '{name}'")))?;

        let mut all_rows = table.rows().to_vec();
        all_rows.extend(rows.iter().cloned());
        *table = Table::with_contents(name, table.header().to_vec(), all_rows);
        Ok(())
    }

    async fn list_tables(&self) -> SyncResult<Vec<String>> {
        Ok(self.tables.read().await.keys().cloned().collect())
    }
}
