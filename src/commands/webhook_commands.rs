//! Feed a stored webhook payload through the handler

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::path::Path;

use crate::application::{AppState, WebhookRequest, WebhookResponse};

/// Split `name=value`; the value may itself contain `=`.
pub fn parse_key_value(pair: &str) -> Result<(String, String)> {
    let (name, value) = pair
        .split_once('=')
        .ok_or_else(|| anyhow!("expected name=value, got '{pair}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(anyhow!("empty name in '{pair}'"));
    }
    Ok((name.to_string(), value.to_string()))
}

pub async fn ingest_webhook_file(
    state: &AppState,
    path: &Path,
    secret: Option<&str>,
    headers: &[(String, String)],
    query: &[(String, String)],
) -> Result<WebhookResponse> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read webhook payload {}", path.display()))?;
    let body: Value = serde_json::from_str(&raw)
        .with_context(|| format!("Webhook payload {} is not valid JSON", path.display()))?;

    let mut request = WebhookRequest::new(body);
    for (name, value) in headers {
        request = request.with_header(name, value);
    }
    for (name, value) in query {
        request = request.with_query(name, value);
    }
    if let Some(secret) = secret {
        request = request.with_header(state.config.webhook.secret_header.clone(), secret);
    }

    Ok(state.webhook_handler().handle(request).await)
}
