//! Authenticated JSON API client with bounded retries
//!
//! Every request carries the API-key header plus JSON accept/content-type
//! headers; caller-supplied headers win on collision. 429 and 5xx responses
//! (and transport failures) are retried with exponential backoff
//! `base_delay * 2^attempt`; any other non-2xx status fails immediately.

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::errors::{SyncError, SyncResult};
use crate::domain::repositories::CredentialProvider;
use crate::infrastructure::config::{ApiConfig, RetryConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Post => f.write_str("POST"),
        }
    }
}

/// One outgoing request, fully resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Raw status + body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// The one network seam. Transport errors come back as `SyncError::Network`.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> SyncResult<ApiResponse>;
}

/// Production transport on top of reqwest.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &ApiConfig) -> SyncResult<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .gzip(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| SyncError::configuration(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> SyncResult<ApiResponse> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.to_string());
        }

        let response = builder.send().await.map_err(|e| SyncError::Network {
            message: format!("{} {} failed: {e}", request.method, request.url),
        })?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| SyncError::Network {
            message: format!("Failed to read response body from {}: {e}", request.url),
        })?;
        Ok(ApiResponse { status, body })
    }
}

/// Fetcher: one logical call with retries.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    default_headers: Vec<(String, String)>,
    retry: RetryConfig,
}

impl ApiClient {
    /// Resolve credentials up front; a missing token is a configuration error.
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        credentials: &dyn CredentialProvider,
        api: &ApiConfig,
        retry: RetryConfig,
    ) -> SyncResult<Self> {
        let base_url = credentials.api_base_url()?;
        let token = credentials.api_token()?;

        let mut default_headers = vec![
            (api.api_key_header.clone(), token),
            ("Accept".to_string(), "application/json".to_string()),
            ("Content-Type".to_string(), "application/json".to_string()),
        ];
        for (name, value) in &api.extra_headers {
            merge_header(&mut default_headers, name, value);
        }

        Ok(Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            default_headers,
            retry,
        })
    }

    /// Absolute URLs pass through; paths are joined onto the base URL.
    pub fn resolve_url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else if endpoint.starts_with('/') {
            format!("{}{endpoint}", self.base_url)
        } else {
            format!("{}/{endpoint}", self.base_url)
        }
    }

    /// Defaults merged with `overrides`; overrides win (case-insensitive).
    pub fn merged_headers(&self, overrides: &[(String, String)]) -> Vec<(String, String)> {
        let mut headers = self.default_headers.clone();
        for (name, value) in overrides {
            merge_header(&mut headers, name, value);
        }
        headers
    }

    /// Perform one call, retrying transient failures.
    pub async fn fetch(
        &self,
        method: HttpMethod,
        url: &str,
        headers: &[(String, String)],
        body: Option<&Value>,
    ) -> SyncResult<Value> {
        let url = self.resolve_url(url);
        let request = ApiRequest {
            method,
            url: url.clone(),
            headers: self.merged_headers(headers),
            body: body.cloned(),
        };

        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_error: Option<SyncError> = None;

        for attempt in 0..max_attempts {
            debug!("🌐 {} (attempt {}/{}): {}", method, attempt + 1, max_attempts, url);

            let error = match self.transport.send(request.clone()).await {
                Ok(response) if response.is_success() => return parse_body(&url, &response.body),
                Ok(response) => SyncError::from_status(response.status, response.body),
                Err(error) => error,
            };

            if !error.is_retryable() {
                warn!("❌ {} {} failed without retry: {}", method, url, error);
                return Err(error);
            }

            warn!("⚠️ Attempt {}/{} failed for {}: {}", attempt + 1, max_attempts, url, error);
            last_error = Some(error);

            if attempt + 1 < max_attempts {
                let delay = self.retry.backoff_for(attempt);
                info!("⏳ Backing off {:?} before retrying {}", delay, url);
                tokio::time::sleep(delay).await;
            }
        }

        Err(SyncError::ExhaustedRetries {
            attempts: max_attempts,
            last_error: Box::new(last_error.unwrap_or_else(|| SyncError::Network {
                message: format!("no attempt completed for {url}"),
            })),
        })
    }

    pub async fn get(&self, url: &str) -> SyncResult<Value> {
        self.fetch(HttpMethod::Get, url, &[], None).await
    }
}

fn merge_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    match headers.iter_mut().find(|(key, _)| key.eq_ignore_ascii_case(name)) {
        Some(entry) => entry.1 = value.to_string(),
        None => headers.push((name.to_string(), value.to_string())),
    }
}

fn parse_body(url: &str, body: &str) -> SyncResult<Value> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body)
        .map_err(|e| SyncError::malformed(format!("response from {url} is not valid JSON: {e}")))
}


#[cfg(test)]
mod tests {
    use super::test_support::{client_with, FakeTransport, StaticCredentials};
    use super::*;
    use serde_json::json;
    use tokio::time::Instant;

    fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay_ms: 100,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_503_then_succeeds_with_exponential_backoff() {
        let transport = Arc::new(FakeTransport::scripted(vec![
            Ok(ApiResponse::new(503, "busy")),
            Ok(ApiResponse::new(503, "busy")),
            Ok(ApiResponse::new(200, r#"{"ok": true}"#)),
        ]));
        let client = client_with(transport.clone(), fast_retry(3));

        let started = Instant::now();
        let body = client.get("/sessions").await.unwrap();

        assert_eq!(body, json!({"ok": true}));
        assert_eq!(transport.calls(), 3);
        // 100ms after attempt 0, 200ms after attempt 1
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(300), "waited {waited:?}");
        assert!(waited < Duration::from_millis(310), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_4xx_is_not_retried() {
        let transport = Arc::new(FakeTransport::scripted(vec![Ok(ApiResponse::new(
            404,
            "no such collection",
        ))]));
        let client = client_with(transport.clone(), fast_retry(5));

        let err = client.get("/missing").await.unwrap_err();
        assert_eq!(transport.calls(), 1);
        assert!(matches!(err, SyncError::TerminalHttp { status: 404, .. }));
        assert!(err.to_string().contains("no such collection"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_wraps_last_error() {
        let transport = Arc::new(FakeTransport::scripted(vec![
            Ok(ApiResponse::new(429, "slow")),
            Ok(ApiResponse::new(500, "boom")),
        ]));
        let client = client_with(transport.clone(), fast_retry(2));

        let started = Instant::now();
        let err = client.get("/sessions").await.unwrap_err();
        match err {
            SyncError::ExhaustedRetries { attempts, last_error } => {
                assert_eq!(attempts, 2);
                assert_eq!(last_error.status(), Some(500));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // no wait after the final attempt
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(100), "waited {waited:?}");
        assert!(waited < Duration::from_millis(110), "waited {waited:?}");
    }

    #[tokio::test]
    async fn test_malformed_json_is_hard_failure() {
        let transport = Arc::new(FakeTransport::scripted(vec![Ok(ApiResponse::new(200, "<html>"))]));
        let client = client_with(transport.clone(), fast_retry(3));

        let err = client.get("/sessions").await.unwrap_err();
        assert!(matches!(err, SyncError::MalformedResponse { .. }));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_errors_are_retried() {
        let transport = Arc::new(FakeTransport::scripted(vec![
            Err(SyncError::Network { message: "reset".into() }),
            Ok(ApiResponse::new(200, "[]")),
        ]));
        let client = client_with(transport.clone(), fast_retry(3));
        assert_eq!(client.get("/x").await.unwrap(), json!([]));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_default_headers_and_caller_overrides() {
        let transport = Arc::new(FakeTransport::scripted(vec![Ok(ApiResponse::new(200, "{}"))]));
        let client = client_with(transport.clone(), fast_retry(1));

        client
            .fetch(
                HttpMethod::Post,
                "https://other.host/search",
                &[("accept".to_string(), "text/plain".to_string())],
                Some(&json!({"q": 1})),
            )
            .await
            .unwrap();

        let request = &transport.recorded()[0];
        assert_eq!(request.url, "https://other.host/search");
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.header("X-API-Key"), Some("test-token"));
        assert_eq!(request.header("Accept"), Some("text/plain"));
        assert_eq!(request.header("Content-Type"), Some("application/json"));
        assert_eq!(request.body, Some(json!({"q": 1})));
    }

    #[test]
    fn test_missing_token_is_configuration_error() {
        let credentials = StaticCredentials {
            base_url: "https://api.test".into(),
            token: None,
        };
        let result = ApiClient::new(
            Arc::new(FakeTransport::scripted(vec![])),
            &credentials,
            &ApiConfig::default(),
            RetryConfig::default(),
        );
        assert!(matches!(result, Err(SyncError::Configuration { .. })));
    }

    #[test]
    fn test_resolve_url_joins_paths() {
        let client = client_with(Arc::new(FakeTransport::scripted(vec![])), RetryConfig::default());
        assert_eq!(client.resolve_url("/sessions"), "https://api.test/v1/sessions");
        assert_eq!(client.resolve_url("sessions"), "https://api.test/v1/sessions");
        assert_eq!(client.resolve_url("http://x.io/a"), "http://x.io/a");
    }
}
