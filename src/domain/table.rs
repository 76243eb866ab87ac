//! Keyed wide table and the upsert / dedup algorithms
//!
//! The header only grows: new fields are appended as trailing columns and
//! existing rows read empty there. Rows are addressed by the string value of
//! one primary-key column.

use crate::domain::errors::{SyncError, SyncResult};
use crate::domain::flat_row::{FlatRow, FlatValue};
use crate::domain::sync_stats::UpsertSummary;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    header: Vec<String>,
    rows: Vec<Vec<FlatValue>>,
}

/// What a batch upsert did to the table, beyond the counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub summary: UpsertSummary,
    pub added_columns: Vec<String>,
    /// Position of the first appended row (equals the previous row count).
    pub first_new_row: usize,
}

impl UpsertOutcome {
    /// Only new rows were appended under an unchanged header.
    pub fn is_append_only(&self) -> bool {
        self.added_columns.is_empty() && self.summary.updated == 0
    }
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            header: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Build from stored contents; short rows are padded, duplicate header
    /// names keep their first position.
    pub fn with_contents(name: impl Into<String>, header: Vec<String>, rows: Vec<Vec<FlatValue>>) -> Self {
        let mut seen = HashSet::new();
        let header: Vec<String> = header
            .into_iter()
            .filter(|column| seen.insert(column.clone()))
            .collect();
        let mut table = Self {
            name: name.into(),
            header,
            rows,
        };
        table.pad_rows();
        table
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[Vec<FlatValue>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.header.iter().position(|name| name == column)
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&FlatValue> {
        let col = self.column_index(column)?;
        self.rows.get(row).and_then(|cells| cells.get(col))
    }

    /// Row as a mapping; empty cells are included.
    pub fn row_as_flat(&self, row: usize) -> Option<FlatRow> {
        let cells = self.rows.get(row)?;
        Some(
            self.header
                .iter()
                .cloned()
                .zip(cells.iter().cloned())
                .collect(),
        )
    }

    /// Find the row holding `key` in `key_field` (first occurrence).
    pub fn find_row(&self, key_field: &str, key: &str) -> Option<FlatRow> {
        let col = self.column_index(key_field)?;
        let position = self
            .rows
            .iter()
            .position(|cells| cells.get(col).is_some_and(|cell| cell.as_key() == key))?;
        self.row_as_flat(position)
    }

    /// Append every previously-unseen field as a trailing column, in sorted
    /// order. Returns the added names.
    pub fn reconcile_header<'a, I>(&mut self, records: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a FlatRow>,
    {
        let added = self.missing_columns(records);
        if !added.is_empty() {
            debug!("🧱 Table '{}' gains {} column(s): {:?}", self.name, added.len(), added);
            self.header.extend(added.iter().cloned());
            self.pad_rows();
        }
        added
    }

    fn missing_columns<'a, I>(&self, records: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a FlatRow>,
    {
        let existing: HashSet<&str> = self.header.iter().map(String::as_str).collect();
        let incoming: BTreeSet<&String> = records.into_iter().flat_map(FlatRow::keys).collect();
        incoming
            .into_iter()
            .filter(|field| !existing.contains(field.as_str()))
            .cloned()
            .collect()
    }

    fn pad_rows(&mut self) {
        let width = self.header.len();
        for row in &mut self.rows {
            if row.len() < width {
                row.resize(width, FlatValue::Empty);
            }
        }
    }

    /// Key value → first row position holding it. Blank keys are not indexed.
    pub fn key_index(&self, key_col: usize) -> HashMap<String, usize> {
        let mut index = HashMap::with_capacity(self.rows.len());
        for (position, row) in self.rows.iter().enumerate() {
            if let Some(cell) = row.get(key_col).filter(|cell| !cell.is_blank()) {
                index.entry(cell.as_key()).or_insert(position);
            }
        }
        index
    }

    /// Insert-or-replace every record by `key_field`.
    ///
    /// Fails without touching the table when `key_field` is not a column
    /// after header reconciliation. Matches are full-row replaces; new keys
    /// are appended after the current last row in record order. Records
    /// without a key value are skipped.
    pub fn apply_upsert(&mut self, records: &[FlatRow], key_field: &str) -> SyncResult<UpsertOutcome> {
        let missing = self.missing_columns(records);
        let key_known =
            self.column_index(key_field).is_some() || missing.iter().any(|column| column == key_field);
        if !key_known {
            return Err(SyncError::configuration(format!(
                "key field '{key_field}' is not a column of table '{}'",
                self.name
            )));
        }

        let added_columns = self.reconcile_header(records);
        let key_col = self
            .column_index(key_field)
            .ok_or_else(|| SyncError::configuration(format!("key field '{key_field}' vanished")))?;

        let mut index = self.key_index(key_col);
        let first_new_row = self.rows.len();
        let mut summary = UpsertSummary::default();

        for record in records {
            let Some(key) = record.key_value(key_field) else {
                warn!("⚠️ Skipping record without '{}' in table '{}'", key_field, self.name);
                summary.skipped += 1;
                continue;
            };
            let cells: Vec<FlatValue> = self
                .header
                .iter()
                .map(|column| record.get(column).cloned().unwrap_or_default())
                .collect();

            match index.get(&key) {
                Some(&position) => {
                    self.rows[position] = cells;
                    if position < first_new_row {
                        summary.updated += 1;
                    }
                }
                None => {
                    self.rows.push(cells);
                    index.insert(key, self.rows.len() - 1);
                    summary.created += 1;
                }
            }
        }

        Ok(UpsertOutcome {
            summary,
            added_columns,
            first_new_row,
        })
    }

    /// Keep the first row per key value and drop later duplicates. Rows with
    /// a blank key are left alone. Returns the number removed.
    pub fn dedup(&mut self, key_field: &str) -> SyncResult<usize> {
        let key_col = self.column_index(key_field).ok_or_else(|| {
            SyncError::configuration(format!(
                "key field '{key_field}' is not a column of table '{}'",
                self.name
            ))
        })?;

        let before = self.rows.len();
        let mut seen = HashSet::new();
        self.rows.retain(|row| match row.get(key_col).filter(|cell| !cell.is_blank()) {
            Some(cell) => seen.insert(cell.as_key()),
            None => true,
        });
        Ok(before - self.rows.len())
    }

    /// Number of surplus rows sharing a key (0 when keys are unique).
    pub fn duplicate_count(&self, key_field: &str) -> usize {
        let Some(key_col) = self.column_index(key_field) else {
            return 0;
        };
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .filter_map(|row| row.get(key_col).filter(|cell| !cell.is_blank()))
            .filter(|cell| !seen.insert(cell.as_key()))
            .count()
    }

    /// Raw append that bypasses key checks (bulk imports).
    pub fn push_row(&mut self, record: &FlatRow) {
        self.reconcile_header(std::iter::once(record));
        let cells = self
            .header
            .iter()
            .map(|column| record.get(column).cloned().unwrap_or_default())
            .collect();
        self.rows.push(cells);
    }
}
