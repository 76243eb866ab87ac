//! Paginated collection fetcher
//!
//! Drives `ApiClient` page by page until a page comes back empty or nothing
//! signals more data. A failing page ends the run early: items collected so
//! far are kept and the error is reported alongside them.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::deadline::SyncDeadline;
use crate::domain::errors::{SyncError, SyncResult};
use crate::domain::response_shape::{extract_items, has_more_flag, has_next_link};
use crate::infrastructure::api_client::{ApiClient, HttpMethod};
use crate::infrastructure::config::PaginationConfig;

/// Everything a pagination run produced.
#[derive(Debug, Clone, Default)]
pub struct PaginationOutcome {
    pub items: Vec<Value>,
    /// Successful page responses, including a trailing empty one
    pub pages_fetched: u32,
    /// Requests issued (a retried request counts once)
    pub requests: u32,
    pub method: HttpMethod,
    /// The page failure that ended the run early, if any
    pub error: Option<SyncError>,
    pub stopped_by_deadline: bool,
}

impl PaginationOutcome {
    pub const fn is_truncated(&self) -> bool {
        self.error.is_some() || self.stopped_by_deadline
    }
}

#[derive(Clone)]
pub struct Paginator {
    client: Arc<ApiClient>,
}

impl Paginator {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    /// All items across pages; failures only shorten the result.
    pub async fn fetch_all(&self, endpoint: &str, config: &PaginationConfig) -> Vec<Value> {
        self.fetch_all_detailed(endpoint, config, &SyncDeadline::unbounded())
            .await
            .items
    }

    /// Run with the configured method, then retry the whole run with POST
    /// when the first GET page was rejected outright.
    pub async fn fetch_all_with_fallback(
        &self,
        endpoint: &str,
        config: &PaginationConfig,
        deadline: &SyncDeadline,
    ) -> PaginationOutcome {
        let outcome = self.fetch_all_detailed(endpoint, config, deadline).await;

        let rejected = matches!(outcome.error, Some(SyncError::TerminalHttp { .. }));
        if !(config.post_fallback
            && config.method == HttpMethod::Get
            && outcome.items.is_empty()
            && rejected)
        {
            return outcome;
        }

        info!(
            "↩️ GET {} rejected ({}), falling back to POST",
            endpoint,
            outcome.error.as_ref().map(ToString::to_string).unwrap_or_default()
        );
        let post_config = PaginationConfig {
            method: HttpMethod::Post,
            ..config.clone()
        };
        let mut fallback = self.fetch_all_detailed(endpoint, &post_config, deadline).await;
        fallback.requests += outcome.requests;
        fallback
    }

    pub async fn fetch_all_detailed(
        &self,
        endpoint: &str,
        config: &PaginationConfig,
        deadline: &SyncDeadline,
    ) -> PaginationOutcome {
        let mut outcome = PaginationOutcome {
            method: config.method,
            ..PaginationOutcome::default()
        };
        let page_size = config.page_size as usize;
        let mut page = config.start_page;
        let base = self.client.resolve_url(endpoint);
        let post_body = config.body_template.clone().unwrap_or_else(|| json!({}));

        info!("📄 Paginating {} {} (page size {})", config.method, base, config.page_size);

        loop {
            if deadline.is_expired() {
                warn!("⏰ Deadline reached before page {} of {}, keeping {} items", page, base, outcome.items.len());
                outcome.stopped_by_deadline = true;
                break;
            }
            if config.max_pages.is_some_and(|max| outcome.pages_fetched >= max) {
                warn!("🛑 Page ceiling reached for {} after {} pages", base, outcome.pages_fetched);
                break;
            }
            if page != config.start_page {
                let delay = config.inter_page_delay();
                if deadline.remaining().is_some_and(|left| left <= delay) {
                    warn!("⏰ Deadline falls within the delay before page {} of {}, keeping {} items", page, base, outcome.items.len());
                    outcome.stopped_by_deadline = true;
                    break;
                }
                tokio::time::sleep(delay).await;
            }

            let url = match build_page_url(&base, config, page) {
                Ok(url) => url,
                Err(error) => {
                    outcome.error = Some(error);
                    break;
                }
            };

            outcome.requests += 1;
            let response = match config.method {
                HttpMethod::Get => self.client.fetch(HttpMethod::Get, &url, &[], None).await,
                HttpMethod::Post => {
                    self.client
                        .fetch(HttpMethod::Post, &url, &[], Some(&post_body))
                        .await
                }
            };

            let body = match response {
                Ok(body) => body,
                Err(error) => {
                    warn!(
                        "⚠️ Page {} of {} failed, stopping with {} items: {}",
                        page,
                        base,
                        outcome.items.len(),
                        error
                    );
                    outcome.error = Some(error);
                    break;
                }
            };
            outcome.pages_fetched += 1;

            let page_items = extract_items(&body);
            if page_items.is_empty() {
                debug!("Page {} of {} is empty, done", page, base);
                break;
            }

            let count = page_items.len();
            outcome.items.extend(page_items);
            debug!("Page {}: {} items (total {})", page, count, outcome.items.len());

            let more = has_next_link(&body) || has_more_flag(&body) || count == page_size;
            if !more {
                break;
            }

            page += 1;
        }

        info!(
            "✅ Pagination of {} finished: {} items over {} requests",
            base,
            outcome.items.len(),
            outcome.requests
        );
        outcome
    }
}

/// Endpoint URL with static params, then page and limit params.
pub fn build_page_url(base: &str, config: &PaginationConfig, page: u32) -> SyncResult<String> {
    let mut url = Url::parse(base)
        .map_err(|e| SyncError::configuration(format!("invalid endpoint URL '{base}': {e}")))?;
    {
        let mut query = url.query_pairs_mut();
        for (key, value) in &config.extra_params {
            if key != &config.page_param && key != &config.limit_param {
                query.append_pair(key, value);
            }
        }
        query.append_pair(&config.page_param, &page.to_string());
        query.append_pair(&config.limit_param, &config.page_size.to_string());
    }
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::api_client::test_support::{client_with, FakeTransport};
    use crate::infrastructure::api_client::{ApiRequest, ApiResponse};
    use crate::infrastructure::config::RetryConfig;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tokio::time::Instant;

    fn query_param(request: &ApiRequest, name: &str) -> Option<String> {
        Url::parse(&request.url)
            .ok()?
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    fn page_of(request: &ApiRequest) -> u32 {
        query_param(request, "page").and_then(|p| p.parse().ok()).unwrap_or(0)
    }

    fn items(page: u32, count: usize) -> Value {
        Value::Array(
            (0..count)
                .map(|i| json!({"id": format!("p{page}-{i}")}))
                .collect(),
        )
    }

    fn config(page_size: u32) -> PaginationConfig {
        PaginationConfig {
            page_size,
            inter_page_delay_ms: 50,
            ..PaginationConfig::default()
        }
    }

    fn paginator(transport: Arc<FakeTransport>) -> Paginator {
        let retry = RetryConfig {
            max_attempts: 1,
            base_delay_ms: 1,
        };
        Paginator::new(Arc::new(client_with(transport, retry)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_pages_then_empty_page_terminates() {
        let (k, limit) = (3_u32, 4_usize);
        let transport = Arc::new(FakeTransport::routed(move |request| {
            let page = page_of(request);
            let count = if page <= k { limit } else { 0 };
            Ok(ApiResponse::new(200, items(page, count).to_string()))
        }));

        let started = Instant::now();
        let all = paginator(transport.clone())
            .fetch_all("/sessions", &config(limit as u32))
            .await;

        assert_eq!(all.len(), k as usize * limit);
        assert_eq!(transport.calls(), k as usize + 1);
        // one pause after each full page, none after the empty one
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(150), "waited {waited:?}");
        assert!(waited < Duration::from_millis(200), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_page_stops_without_extra_request() {
        let transport = Arc::new(FakeTransport::routed(|request| {
            let count = if page_of(request) == 1 { 2 } else { 1 };
            Ok(ApiResponse::new(200, json!({"data": items(page_of(request), count)}).to_string()))
        }));

        let p = paginator(transport.clone());
        let outcome = p
            .fetch_all_detailed("/sessions", &config(2), &SyncDeadline::unbounded())
            .await;
        assert_eq!(outcome.items.len(), 3);
        assert_eq!(outcome.requests, 2);
        assert!(!outcome.is_truncated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_failure_keeps_earlier_pages() {
        let transport = Arc::new(FakeTransport::routed(|request| {
            let page = page_of(request);
            if page == 3 {
                Ok(ApiResponse::new(400, "bad page"))
            } else {
                Ok(ApiResponse::new(200, items(page, 2).to_string()))
            }
        }));

        let p = paginator(transport.clone());
        let outcome = p
            .fetch_all_detailed("/sessions", &config(2), &SyncDeadline::unbounded())
            .await;

        assert_eq!(outcome.items.len(), 4);
        assert_eq!(outcome.items[3], json!({"id": "p2-1"}));
        assert!(matches!(outcome.error, Some(SyncError::TerminalHttp { status: 400, .. })));
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_link_continues_past_short_page() {
        let transport = Arc::new(FakeTransport::routed(|request| {
            let body = match page_of(request) {
                1 => json!({"items": items(1, 1), "links": {"next": "/sessions?page=2"}}),
                2 => json!({"items": items(2, 1), "meta": {"hasMore": true}}),
                page => json!({"items": items(page, 1)}),
            };
            Ok(ApiResponse::new(200, body.to_string()))
        }));

        let all = paginator(transport.clone()).fetch_all("/sessions", &config(50)).await;
        assert_eq!(all.len(), 3);
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_post_sends_body_and_query_params() {
        let transport = Arc::new(FakeTransport::routed(|_| Ok(ApiResponse::new(200, "[]"))));
        let mut extra = BTreeMap::new();
        extra.insert("status".to_string(), "active".to_string());
        let config = PaginationConfig {
            method: HttpMethod::Post,
            body_template: Some(json!({"filter": {"upcoming": true}})),
            page_param: "pageNumber".into(),
            limit_param: "pageSize".into(),
            start_page: 0,
            extra_params: extra,
            ..config(25)
        };

        paginator(transport.clone()).fetch_all("/sessions/search", &config).await;

        let request = &transport.recorded()[0];
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.body, Some(json!({"filter": {"upcoming": true}})));
        assert_eq!(query_param(request, "pageNumber").as_deref(), Some("0"));
        assert_eq!(query_param(request, "pageSize").as_deref(), Some("25"));
        assert_eq!(query_param(request, "status").as_deref(), Some("active"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_get_falls_back_to_post() {
        let transport = Arc::new(FakeTransport::routed(|request| match request.method {
            HttpMethod::Get => Ok(ApiResponse::new(405, "use POST")),
            HttpMethod::Post if page_of(request) == 1 => {
                Ok(ApiResponse::new(200, json!({"results": items(1, 1)}).to_string()))
            }
            HttpMethod::Post => Ok(ApiResponse::new(200, "[]")),
        }));

        let outcome = paginator(transport.clone())
            .fetch_all_with_fallback("/sessions", &config(10), &SyncDeadline::unbounded())
            .await;

        assert_eq!(outcome.method, HttpMethod::Post);
        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.requests, 2);
        assert!(outcome.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_disabled_keeps_get_error() {
        let transport = Arc::new(FakeTransport::routed(|_| Ok(ApiResponse::new(404, "gone"))));
        let config = PaginationConfig {
            post_fallback: false,
            ..config(10)
        };
        let outcome = paginator(transport.clone())
            .fetch_all_with_fallback("/sessions", &config, &SyncDeadline::unbounded())
            .await;
        assert_eq!(outcome.method, HttpMethod::Get);
        assert!(outcome.error.is_some());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_stops_between_pages() {
        let transport = Arc::new(FakeTransport::routed(|request| {
            Ok(ApiResponse::new(200, items(page_of(request), 2).to_string()))
        }));
        let config = PaginationConfig {
            inter_page_delay_ms: 1000,
            ..config(2)
        };
        let started = Instant::now();
        let deadline = SyncDeadline::start(Some(Duration::from_millis(2500)));

        let outcome = paginator(transport.clone())
            .fetch_all_detailed("/sessions", &config, &deadline)
            .await;

        assert!(outcome.stopped_by_deadline);
        assert_eq!(outcome.items.len(), 6);
        assert_eq!(transport.calls(), 3);
        // two delays between three pages, none once the budget cannot fit another
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(2000) && elapsed < Duration::from_millis(2100), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_pages_ceiling() {
        let transport = Arc::new(FakeTransport::routed(|request| {
            Ok(ApiResponse::new(200, items(page_of(request), 2).to_string()))
        }));
        let config = PaginationConfig {
            max_pages: Some(2),
            inter_page_delay_ms: 1000,
            ..config(2)
        };
        let started = Instant::now();
        let all = paginator(transport.clone()).fetch_all("/sessions", &config).await;
        assert_eq!(all.len(), 4);
        assert_eq!(transport.calls(), 2);
        // one delay between the two pages, none after the ceiling
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1000) && elapsed < Duration::from_millis(1100), "{elapsed:?}");
    }

    #[test]
    fn test_build_page_url_keeps_existing_query() {
        let config = PaginationConfig::default();
        let url = build_page_url("https://api.test/v1/sessions?expand=info", &config, 3).unwrap();
        assert_eq!(url, "https://api.test/v1/sessions?expand=info&page=3&limit=100");
        assert!(build_page_url("not a url", &config, 1).is_err());
    }
}
