//! Infrastructure layer: HTTP, pagination, storage, configuration and logging
//!
//! Concrete adapters for the collaborator traits declared in `domain`.

pub mod api_client;
pub mod config;
pub mod credentials;
pub mod database_connection;
pub mod logging;
pub mod memory_table_store;
pub mod paginator;
pub mod sqlite_table_store;
pub mod sync_stats_repository;

// Re-export commonly used items
pub use api_client::{ApiClient, ApiRequest, ApiResponse, HttpMethod, HttpTransport, ReqwestTransport};
pub use config::{AppConfig, ConfigManager, PaginationConfig, RetryConfig};
pub use credentials::ConfigCredentialProvider;
pub use database_connection::DatabaseConnection;
pub use logging::init_logging_with_config;
pub use memory_table_store::InMemoryTableStore;
pub use paginator::{PaginationOutcome, Paginator};
pub use sqlite_table_store::SqliteTableStore;
pub use sync_stats_repository::{InMemorySyncStatsRepository, SqliteSyncStatsRepository};
