//! Application state: configuration plus the shared storage adapters
//!
//! The API client is only built when a sync runs, so the storage-only
//! commands (dedup, stats, webhook) work without an API token.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::application::observer::TracingObserver;
use crate::application::sync_service::SyncService;
use crate::application::upsert::UpsertEngine;
use crate::application::webhook::WebhookHandler;
use crate::domain::events::SyncObserver;
use crate::domain::repositories::{CredentialProvider, SyncStatsRepository, TableStore};
use crate::infrastructure::api_client::{ApiClient, HttpTransport, ReqwestTransport};
use crate::infrastructure::config::{AppConfig, ConfigManager};
use crate::infrastructure::credentials::ConfigCredentialProvider;
use crate::infrastructure::database_connection::DatabaseConnection;
use crate::infrastructure::memory_table_store::InMemoryTableStore;
use crate::infrastructure::sqlite_table_store::SqliteTableStore;
use crate::infrastructure::sync_stats_repository::{InMemorySyncStatsRepository, SqliteSyncStatsRepository};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn TableStore>,
    pub stats: Arc<dyn SyncStatsRepository>,
    pub observer: Arc<dyn SyncObserver>,
}

impl AppState {
    /// Open (and migrate) the configured SQLite database.
    pub async fn initialize(config: AppConfig) -> Result<Self> {
        let database_url = ConfigManager::resolve_database_url(&config)?;
        info!("🗄️ Opening database {}", database_url);
        let db = DatabaseConnection::open(&database_url)
            .await
            .with_context(|| format!("Failed to open database {database_url}"))?;

        Ok(Self {
            config: Arc::new(config),
            store: Arc::new(SqliteTableStore::new(db.pool().clone())),
            stats: Arc::new(SqliteSyncStatsRepository::new(db.pool().clone())),
            observer: Arc::new(TracingObserver),
        })
    }

    /// Process-local storage; nothing survives the process.
    pub fn in_memory(config: AppConfig) -> Self {
        Self {
            config: Arc::new(config),
            store: Arc::new(InMemoryTableStore::new()),
            stats: Arc::new(InMemorySyncStatsRepository::new()),
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn upsert_engine(&self) -> UpsertEngine {
        UpsertEngine::new(self.store.clone())
    }

    pub fn webhook_handler(&self) -> WebhookHandler {
        WebhookHandler::new(
            self.upsert_engine(),
            self.stats.clone(),
            self.config.webhook.clone(),
        )
    }

    /// Sync service over reqwest with credentials from config/environment.
    pub fn sync_service(&self) -> Result<SyncService> {
        let transport = ReqwestTransport::new(&self.config.api)?;
        let credentials = ConfigCredentialProvider::from_config(&self.config.api);
        self.sync_service_with(Arc::new(transport), &credentials)
    }

    pub fn sync_service_with(
        &self,
        transport: Arc<dyn HttpTransport>,
        credentials: &dyn CredentialProvider,
    ) -> Result<SyncService> {
        let client = ApiClient::new(
            transport,
            credentials,
            &self.config.api,
            self.config.retry.clone(),
        )
        .context("Failed to set up the API client")?;

        Ok(SyncService::new(
            Arc::new(client),
            self.store.clone(),
            self.stats.clone(),
            self.observer.clone(),
            &self.config,
        ))
    }
}
