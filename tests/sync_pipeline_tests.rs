//! End-to-end sync against a scripted API and on-disk SQLite storage
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tempfile::tempdir;
use tokio_test::assert_err;

use session_sync_lib::application::AppState;
use session_sync_lib::commands::{dedup_table, run_sync_with, SyncTarget};
use session_sync_lib::domain::{SyncCategory, SyncError, SyncResult};
use session_sync_lib::infrastructure::{
    ApiRequest, ApiResponse, AppConfig, ConfigCredentialProvider, HttpMethod, HttpTransport,
};

/// Serves a fixed session catalogue, two per page.
struct CatalogueApi {
    requests: Mutex<Vec<ApiRequest>>,
    reject_get: bool,
}

impl CatalogueApi {
    fn new(reject_get: bool) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            reject_get,
        }
    }

    fn sessions() -> Vec<Value> {
        vec![
            json!({"id": "s1", "info": {"title": "Welding"}, "_links": {"registrations": {"href": "/sessions/s1/registrations"}}}),
            json!({"id": "s2", "info": {"title": "Rigging"}, "links": [{"rel": "registrations", "href": "/sessions/s2/registrations"}]}),
            json!({"id": "s3", "info": {"title": "First aid", "tags": ["med", "core"]}}),
        ]
    }

    fn page(url: &str) -> usize {
        url::Url::parse(url)
            .ok()
            .and_then(|u| u.query_pairs().find(|(k, _)| k == "page").map(|(_, v)| v.into_owned()))
            .and_then(|p| p.parse().ok())
            .unwrap_or(1)
    }
}

#[async_trait]
impl HttpTransport for CatalogueApi {
    async fn send(&self, request: ApiRequest) -> SyncResult<ApiResponse> {
        self.requests.lock().unwrap().push(request.clone());

        if request.header("X-API-Key") != Some("it-token") {
            return Ok(ApiResponse::new(401, "missing key"));
        }

        let body = if request.url.contains("/s1/registrations") {
            json!({"_embedded": {"registrations": [
                {"id": "r1", "attendee": {"name": "Ada"}},
                {"id": "r2", "attendee": {"name": "Grace"}}
            ]}})
        } else if request.url.contains("/s2/registrations") {
            json!({"data": []})
        } else {
            if self.reject_get && request.method == HttpMethod::Get {
                return Ok(ApiResponse::new(405, "method not allowed"));
            }
            let page = Self::page(&request.url);
            let items: Vec<Value> = Self::sessions().into_iter().skip((page - 1) * 2).take(2).collect();
            json!({"results": items})
        };
        Ok(ApiResponse::new(200, body.to_string()))
    }
}

async fn state_in(dir: &std::path::Path) -> Result<AppState> {
    let mut config = AppConfig::default();
    config.storage.database_url = Some(format!("sqlite:{}", dir.join("sync.db").display()));
    config.pagination.page_size = 2;
    config.pagination.inter_page_delay_ms = 0;
    config.sync.session_pause_ms = 0;
    config.retry.base_delay_ms = 1;
    Ok(AppState::initialize(config).await?)
}

fn credentials() -> ConfigCredentialProvider {
    ConfigCredentialProvider::new("https://api.example.test/v1", Some("it-token".to_string()))
}

#[tokio::test]
async fn full_sync_is_idempotent() -> Result<()> {
    let dir = tempdir()?;
    let state = state_in(dir.path()).await?;
    let api = Arc::new(CatalogueApi::new(false));
    let service = state.sync_service_with(api.clone(), &credentials())?;

    let first = run_sync_with(&service, SyncTarget::All).await?;
    // 3 sessions + (2 joined rows for s1, 1 row each for s2 and s3)
    assert_eq!(first.created, 3 + 4);
    assert_eq!(first.updated, 0);

    let second = run_sync_with(&service, SyncTarget::All).await?;
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 7);

    let sessions = state.store.read_table("Sessions").await?.expect("sessions table");
    assert_eq!(sessions.row_count(), 3);
    assert_eq!(sessions.duplicate_count("session.id"), 0);
    let s3 = sessions.find_row("session.id", "s3").expect("s3 row");
    assert_eq!(s3.get("session.info.tags").map(ToString::to_string).as_deref(), Some("med, core"));

    let attendees = state.store.read_table("Attendees").await?.expect("attendees table");
    assert_eq!(attendees.row_count(), 4);
    for key in ["s1:r1", "s1:r2", "s2", "s3"] {
        assert!(attendees.find_row("row_key", key).is_some(), "missing {key}");
    }

    let stats = state.stats.get(SyncCategory::Attendees).await?;
    assert_eq!((stats.total_created, stats.total_updated), (4, 4));
    Ok(())
}

#[tokio::test]
async fn rejected_get_falls_back_to_post() -> Result<()> {
    let dir = tempdir()?;
    let state = state_in(dir.path()).await?;
    let api = Arc::new(CatalogueApi::new(true));
    let service = state.sync_service_with(api.clone(), &credentials())?;

    let summary = run_sync_with(&service, SyncTarget::Sessions).await?;
    assert_eq!(summary.created, 3);

    let requests = api.requests.lock().unwrap();
    assert_eq!(requests[0].method, HttpMethod::Get);
    assert!(requests[1..].iter().all(|r| r.method == HttpMethod::Post));
    Ok(())
}

#[tokio::test]
async fn wrong_token_fails_the_run() -> Result<()> {
    let dir = tempdir()?;
    let state = state_in(dir.path()).await?;
    let bad = ConfigCredentialProvider::new("https://api.example.test/v1", Some("nope".to_string()));
    let service = state.sync_service_with(Arc::new(CatalogueApi::new(false)), &bad)?;

    let err = assert_err!(service.sync_sessions().await);
    assert!(matches!(err, SyncError::TerminalHttp { status: 401, .. }));
    assert!(state.store.list_tables().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn dedup_repairs_bulk_appended_duplicates() -> Result<()> {
    let dir = tempdir()?;
    let state = state_in(dir.path()).await?;
    let service = state.sync_service_with(Arc::new(CatalogueApi::new(false)), &credentials())?;
    service.sync_sessions().await?;

    // a bulk write that bypasses the upsert
    let table = state.store.read_table("Sessions").await?.expect("sessions table");
    let copies = table.rows().to_vec();
    state.store.append_rows("Sessions", &copies).await?;

    let report = dedup_table(&state, "Sessions", "session.id").await?;
    assert_eq!(report.rows_removed, 3);
    assert_eq!(report.remaining_rows, 3);

    let again = dedup_table(&state, "Sessions", "session.id").await?;
    assert_eq!(again.rows_removed, 0);
    Ok(())
}
