//! Webhook event ingestion
//!
//! One request is one event: authenticate it against the shared secret,
//! unwrap the payload envelope, resolve a record id and upsert a single
//! flattened row keyed by that id. Replaying an event overwrites its row.

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::upsert::UpsertEngine;
use crate::domain::flat_row::{FlatRow, FlatValue};
use crate::domain::flatten::flatten;
use crate::domain::repositories::SyncStatsRepository;
use crate::domain::sync_stats::SyncCategory;
use crate::infrastructure::config::WebhookConfig;

pub const SECRET_QUERY_KEYS: [&str; 2] = ["secret", "token"];
pub const SECRET_BODY_KEY: &str = "secret";
pub const ENVELOPE_KEYS: [&str; 2] = ["object", "data"];
pub const ID_CANDIDATES: [&str; 7] = [
    "id",
    "attendeeId",
    "attendee_id",
    "uuid",
    "reference",
    "externalId",
    "external_id",
];
pub const EVENT_TYPE_KEYS: [&str; 3] = ["type", "event", "eventType"];
pub const UNKNOWN_EVENT_TYPE: &str = "unknown";
pub const MISSING_ID_MESSAGE: &str = "missing required ID field";

/// Incoming webhook call, already parsed.
#[derive(Debug, Clone, Default)]
pub struct WebhookRequest {
    pub headers: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub body: Value,
}

impl WebhookRequest {
    pub fn new(body: Value) -> Self {
        Self {
            body,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn provided_secret(&self, header_name: &str) -> Option<String> {
        let from_header = self.header(header_name).map(str::to_string);
        let from_query = || {
            SECRET_QUERY_KEYS
                .iter()
                .find_map(|key| self.query.get(*key).cloned())
        };
        let from_body = || {
            self.body
                .get(SECRET_BODY_KEY)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        from_header
            .or_else(from_query)
            .or_else(from_body)
            .filter(|secret| !secret.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookResponse {
    Ok,
    Unauthorized,
    Err(String),
}

impl WebhookResponse {
    /// Literal token returned to the caller.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Unauthorized => "Unauthorized",
            Self::Err(_) => "ERR",
        }
    }

    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for WebhookResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone)]
pub struct WebhookHandler {
    upsert: UpsertEngine,
    stats: Arc<dyn SyncStatsRepository>,
    config: WebhookConfig,
}

impl WebhookHandler {
    pub fn new(upsert: UpsertEngine, stats: Arc<dyn SyncStatsRepository>, config: WebhookConfig) -> Self {
        Self { upsert, stats, config }
    }

    pub async fn handle(&self, request: WebhookRequest) -> WebhookResponse {
        if !self.is_authorized(&request) {
            warn!("🔒 Rejected webhook call with missing or wrong secret");
            return WebhookResponse::Unauthorized;
        }

        let row = match build_row(&request.body) {
            Ok(row) => row,
            Err(message) => {
                warn!("⚠️ Webhook payload rejected: {}", message);
                return WebhookResponse::Err(message);
            }
        };

        let summary = match self
            .upsert
            .upsert(&row, &self.config.key_field, &self.config.table)
            .await
        {
            Ok(summary) => summary,
            Err(error) => {
                warn!("⚠️ Webhook upsert into '{}' failed: {}", self.config.table, error);
                return WebhookResponse::Err(error.to_string());
            }
        };

        // the row is stored; a stats failure only costs the counters
        if let Err(error) = self.stats.record(SyncCategory::Webhook, &summary, Utc::now()).await {
            warn!("⚠️ Failed to record webhook stats: {}", error);
        }

        info!(
            "📥 Webhook event {} stored in '{}' ({})",
            row.get("id").map(ToString::to_string).unwrap_or_default(),
            self.config.table,
            if summary.updated > 0 { "updated" } else { "created" }
        );
        WebhookResponse::Ok
    }

    /// No configured secret means every call is rejected.
    fn is_authorized(&self, request: &WebhookRequest) -> bool {
        let Some(expected) = self.config.secret.as_deref().filter(|s| !s.is_empty()) else {
            warn!("🔒 Webhook secret is not configured");
            return false;
        };
        request
            .provided_secret(&self.config.secret_header)
            .is_some_and(|provided| provided == expected)
    }
}

/// The event record: the `object`/`data` envelope when present, else the body.
pub fn unwrap_payload(body: &Value) -> &Value {
    ENVELOPE_KEYS
        .iter()
        .find_map(|key| body.get(*key).filter(|inner| inner.is_object()))
        .unwrap_or(body)
}

/// First non-blank candidate id on the payload, then any flattened `id` path.
pub fn resolve_id(payload: &Value, flat: &FlatRow) -> Option<String> {
    let direct = ID_CANDIDATES.iter().find_map(|key| {
        payload
            .get(*key)
            .filter(|value| !value.is_object() && !value.is_array())
            .map(FlatValue::from_json)
            .filter(|value| !value.is_blank())
            .map(|value| value.as_key())
    });
    direct.or_else(|| {
        flat.iter()
            .find(|(path, value)| {
                (path.as_str() == "id" || path.ends_with(".id")) && !value.is_blank()
            })
            .map(|(_, value)| value.as_key())
    })
}

fn event_type(body: &Value, payload: &Value) -> String {
    [body, payload]
        .iter()
        .find_map(|source| {
            EVENT_TYPE_KEYS
                .iter()
                .find_map(|key| source.get(*key).and_then(Value::as_str))
                .filter(|s| !s.trim().is_empty())
        })
        .unwrap_or(UNKNOWN_EVENT_TYPE)
        .to_string()
}

fn build_row(body: &Value) -> Result<FlatRow, String> {
    let payload = unwrap_payload(body);
    let mut flat = flatten(payload, "");
    flat.remove(SECRET_BODY_KEY);

    let id = resolve_id(payload, &flat).ok_or_else(|| MISSING_ID_MESSAGE.to_string())?;
    debug!("Webhook payload resolved to id {}", id);

    flat.insert("id", id);
    flat.insert("event_type", event_type(body, payload));
    flat.insert("received_at", Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));
    Ok(flat)
}
