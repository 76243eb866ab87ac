//! Domain module - sync engine value objects and pure algorithms
//!
//! Flattening, response shape detection and the keyed table live here with
//! no I/O; collaborator traits describe what the infrastructure provides.

pub mod deadline;
pub mod errors;
pub mod events;
pub mod flat_row;
pub mod flatten;
pub mod repositories;
pub mod response_shape;
pub mod sync_stats;
pub mod table;

// Re-export commonly used items
pub use deadline::SyncDeadline;
pub use errors::{SyncError, SyncResult};
pub use events::SyncObserver;
pub use flat_row::{FlatRow, FlatValue};
pub use flatten::flatten;
pub use repositories::{CredentialProvider, SyncStatsRepository, TableStore};
pub use sync_stats::{CategoryStats, SyncCategory, SyncReport, UpsertSummary};
pub use table::{Table, UpsertOutcome};
