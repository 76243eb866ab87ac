//! Session × registration join
//!
//! Every session yields one row per registration (session fields plus
//! registration fields, registration wins on collision), or a single
//! session-only row when it has no registrations. A failed registration
//! fetch never aborts the batch: the session row is kept and tagged with
//! `registration.error`.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::deadline::SyncDeadline;
use crate::domain::errors::SyncError;
use crate::domain::flat_row::FlatRow;
use crate::domain::flatten::flatten;
use crate::domain::response_shape::extract_items;
use crate::infrastructure::api_client::ApiClient;
use crate::infrastructure::config::SyncConfig;

pub const SESSION_PREFIX: &str = "session";
pub const REGISTRATION_PREFIX: &str = "registration";
pub const REGISTRATION_ERROR_FIELD: &str = "registration.error";
pub const ROW_KEY_FIELD: &str = "row_key";

const REGISTRATIONS_REL: &str = "registrations";

#[derive(Debug, Clone, Default)]
pub struct CombineOutcome {
    pub rows: Vec<FlatRow>,
    pub sessions_processed: usize,
    /// Sessions whose registration collection could not be fetched
    pub failed_sessions: usize,
    pub stopped_by_deadline: bool,
}

#[derive(Clone)]
pub struct Combiner {
    client: Arc<ApiClient>,
    sessions_per_pause: usize,
    session_pause: Duration,
}

impl Combiner {
    pub fn new(client: Arc<ApiClient>, config: &SyncConfig) -> Self {
        Self {
            client,
            sessions_per_pause: config.sessions_per_pause,
            session_pause: config.session_pause(),
        }
    }

    pub async fn combine_sessions_and_registrations(&self, sessions: &[Value]) -> Vec<FlatRow> {
        self.combine(sessions, &SyncDeadline::unbounded()).await.rows
    }

    pub async fn combine(&self, sessions: &[Value], deadline: &SyncDeadline) -> CombineOutcome {
        let mut outcome = CombineOutcome::default();
        info!("🔗 Combining {} sessions with their registrations", sessions.len());

        for (index, session) in sessions.iter().enumerate() {
            let pause_first = self.sessions_per_pause > 0 && index > 0 && index % self.sessions_per_pause == 0;
            let budget_spent = deadline.is_expired()
                || (pause_first && deadline.remaining().is_some_and(|left| left <= self.session_pause));
            if budget_spent {
                warn!(
                    "⏰ Deadline reached after {} of {} sessions",
                    outcome.sessions_processed,
                    sessions.len()
                );
                outcome.stopped_by_deadline = true;
                break;
            }
            if pause_first {
                debug!("⏳ Pausing {:?} after {} sessions", self.session_pause, index);
                tokio::time::sleep(self.session_pause).await;
            }

            let (rows, failed) = self.rows_for_session(session).await;
            outcome.rows.extend(rows);
            if failed {
                outcome.failed_sessions += 1;
            }
            outcome.sessions_processed += 1;
        }

        info!(
            "✅ Combined {} rows from {} sessions ({} registration failures)",
            outcome.rows.len(),
            outcome.sessions_processed,
            outcome.failed_sessions
        );
        outcome
    }

    /// Rows for one session and whether its registration fetch failed.
    async fn rows_for_session(&self, session: &Value) -> (Vec<FlatRow>, bool) {
        let session_row = flatten(session, SESSION_PREFIX);
        let session_key = session_row.key_value(&format!("{SESSION_PREFIX}.id"));

        let Some(link) = registration_link(session) else {
            return (vec![with_row_key(session_row, session_key.as_deref(), None)], false);
        };

        let body = match self.client.get(&self.client.resolve_url(&link)).await {
            Ok(body) => body,
            Err(error) => {
                let failure = SyncError::PartialBatch {
                    item: session_key.clone().unwrap_or_else(|| link.clone()),
                    message: error.to_string(),
                };
                warn!("⚠️ {}", failure);
                let mut row = session_row;
                row.insert(REGISTRATION_ERROR_FIELD, failure.to_string());
                return (vec![with_row_key(row, session_key.as_deref(), None)], true);
            }
        };

        let registrations = extract_items(&body);
        debug!("Session {:?}: {} registrations", session_key, registrations.len());
        if registrations.is_empty() {
            return (vec![with_row_key(session_row, session_key.as_deref(), None)], false);
        }

        let rows = registrations
            .iter()
            .enumerate()
            .map(|(position, registration)| {
                let registration_row = flatten(registration, REGISTRATION_PREFIX);
                let registration_key = registration_row
                    .key_value(&format!("{REGISTRATION_PREFIX}.id"))
                    .unwrap_or_else(|| format!("#{position}"));
                with_row_key(
                    session_row.merged(&registration_row),
                    session_key.as_deref(),
                    Some(&registration_key),
                )
            })
            .collect();
        (rows, false)
    }
}

/// `<session id>` or `<session id>:<registration id>`; rows without a
/// session id get no key and are skipped by the upsert.
fn with_row_key(mut row: FlatRow, session_key: Option<&str>, registration_key: Option<&str>) -> FlatRow {
    if let Some(session_key) = session_key {
        let key = match registration_key {
            Some(registration_key) => format!("{session_key}:{registration_key}"),
            None => session_key.to_string(),
        };
        row.insert(ROW_KEY_FIELD, key);
    }
    row
}

/// Locate the registrations collection in a session's hyperlink block.
pub fn registration_link(session: &Value) -> Option<String> {
    let non_blank = |value: &Value| {
        value
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    for links_key in ["_links", "links"] {
        let Some(links) = session.get(links_key) else {
            continue;
        };
        if let Some(entry) = links.get(REGISTRATIONS_REL) {
            if let Some(href) = entry.get("href").and_then(non_blank).or_else(|| non_blank(entry)) {
                return Some(href);
            }
        }
        if let Some(entries) = links.as_array() {
            let found = entries
                .iter()
                .find(|entry| entry.get("rel").and_then(Value::as_str) == Some(REGISTRATIONS_REL))
                .and_then(|entry| entry.get("href"))
                .and_then(non_blank);
            if found.is_some() {
                return found;
            }
        }
    }
    None
}
