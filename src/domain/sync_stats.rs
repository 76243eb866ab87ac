//! Sync statistics and run reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical sync category; each has its own cumulative counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncCategory {
    Sessions,
    Attendees,
    Webhook,
}

impl SyncCategory {
    pub const ALL: [Self; 3] = [Self::Sessions, Self::Attendees, Self::Webhook];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sessions => "sessions",
            Self::Attendees => "attendees",
            Self::Webhook => "webhook",
        }
    }
}

impl fmt::Display for SyncCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-batch created/updated counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl UpsertSummary {
    pub const fn total_written(&self) -> usize {
        self.created + self.updated
    }

    pub fn absorb(&mut self, other: Self) {
        self.created += other.created;
        self.updated += other.updated;
        self.skipped += other.skipped;
    }
}

/// Cumulative counters for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub category: SyncCategory,
    pub total_created: u64,
    pub total_updated: u64,
    pub last_event_at: Option<DateTime<Utc>>,
}

impl CategoryStats {
    pub const fn empty(category: SyncCategory) -> Self {
        Self {
            category,
            total_created: 0,
            total_updated: 0,
            last_event_at: None,
        }
    }

    pub fn record(&mut self, summary: &UpsertSummary, at: DateTime<Utc>) {
        self.total_created += summary.created as u64;
        self.total_updated += summary.updated as u64;
        self.last_event_at = Some(at);
    }
}

/// Outcome of one sync run, handed to observers and printed by commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub run_id: String,
    pub category: SyncCategory,
    pub table: String,
    pub items_fetched: usize,
    pub rows_written: usize,
    pub summary: UpsertSummary,
    /// Absorbed per-item failures (truncated pages, error-tagged rows).
    pub degraded: usize,
    pub stopped_by_deadline: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_names_match_serde() {
        for category in SyncCategory::ALL {
            let json = serde_json::to_string(&category).unwrap();
            assert_eq!(json, format!("\"{}\"", category.as_str()));
        }
    }

    #[test]
    fn test_absorb_sums_counts() {
        let mut total = UpsertSummary {
            created: 2,
            updated: 1,
            skipped: 0,
        };
        total.absorb(UpsertSummary {
            created: 0,
            updated: 4,
            skipped: 1,
        });
        assert_eq!((total.created, total.updated, total.skipped), (2, 5, 1));
    }

    #[test]
    fn test_record_accumulates() {
        let mut stats = CategoryStats::empty(SyncCategory::Webhook);
        let now = Utc::now();
        stats.record(&UpsertSummary { created: 2, updated: 1, skipped: 0 }, now);
        stats.record(&UpsertSummary { created: 0, updated: 3, skipped: 1 }, now);
        assert_eq!(stats.total_created, 2);
        assert_eq!(stats.total_updated, 4);
        assert_eq!(stats.last_event_at, Some(now));
    }
}
