//! Event recorder
//!
//! Writes one event row per interaction and keeps the matching session row
//! current. Recording is best effort: a failed write is logged and dropped,
//! never surfaced to the page that triggered it.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::session_id::SessionIdProvider;
use super::user_agent::classify_user_agent;
use crate::config::TrackingConfig;
use crate::db::AnalyticsStore;
use crate::error::Result;
use crate::types::{EventRecord, EventType, SessionUpsert};

/// What the client knows about itself at event time.
#[derive(Debug, Clone, Default)]
pub struct ClientContext {
    pub user_agent: String,
    /// Signed-in user, if any
    pub user_id: Option<String>,
    pub referrer: Option<String>,
    pub country: Option<String>,
    pub screen_resolution: Option<String>,
    /// Title of the current document, used when an event has none
    pub page_title: Option<String>,
}

impl ClientContext {
    pub fn from_config(config: &TrackingConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            user_id: None,
            referrer: config.referrer.clone(),
            country: config.country.clone(),
            screen_resolution: config.screen_resolution.clone(),
            page_title: None,
        }
    }
}

pub struct EventRecorder {
    store: Arc<dyn AnalyticsStore>,
    sessions: Arc<dyn SessionIdProvider>,
    context: ClientContext,
}

impl EventRecorder {
    pub fn new(
        store: Arc<dyn AnalyticsStore>,
        sessions: Arc<dyn SessionIdProvider>,
        context: ClientContext,
    ) -> Self {
        Self {
            store,
            sessions,
            context,
        }
    }

    pub fn context(&self) -> &ClientContext {
        &self.context
    }

    /// Record one event and touch its session.
    ///
    /// Returns whether both writes succeeded. Failures are logged, not
    /// returned.
    pub fn record_event(&self, event_type: EventType, page_path: &str, event_data: Option<Value>) -> bool {
        self.record(event_type, page_path, None, event_data)
    }

    /// Run [`record_event`](Self::record_event) on the blocking pool without
    /// waiting for it.
    pub fn spawn_record_event(
        self: &Arc<Self>,
        event_type: EventType,
        page_path: &str,
        event_data: Option<Value>,
    ) -> JoinHandle<bool> {
        let recorder = Arc::clone(self);
        let page_path = page_path.to_string();
        tokio::task::spawn_blocking(move || recorder.record_event(event_type, &page_path, event_data))
    }

    pub fn track_page_view(&self, page_path: &str, page_title: Option<&str>) -> bool {
        self.record(EventType::PageView, page_path, page_title, None)
    }

    /// Keys in `data` override `element`.
    pub fn track_click(&self, page_path: &str, element: &str, data: Option<Map<String, Value>>) -> bool {
        let mut payload = Map::new();
        payload.insert("element".to_string(), json!(element));
        payload.extend(data.unwrap_or_default());
        self.record(EventType::Click, page_path, None, Some(Value::Object(payload)))
    }

    pub fn track_search(&self, page_path: &str, query: &str, results: Option<u64>) -> bool {
        let payload = json!({ "query": query, "results": results });
        self.record(EventType::Search, page_path, None, Some(payload))
    }

    pub fn track_download(&self, page_path: &str, filename: &str, kind: Option<&str>) -> bool {
        let payload = json!({ "filename": filename, "type": kind });
        self.record(EventType::Download, page_path, None, Some(payload))
    }

    /// Keys in `data` override `form_name`.
    pub fn track_form_submit(
        &self,
        page_path: &str,
        form_name: &str,
        data: Option<Map<String, Value>>,
    ) -> bool {
        let mut payload = Map::new();
        payload.insert("form_name".to_string(), json!(form_name));
        payload.extend(data.unwrap_or_default());
        self.record(EventType::FormSubmit, page_path, None, Some(Value::Object(payload)))
    }

    fn record(
        &self,
        event_type: EventType,
        page_path: &str,
        page_title: Option<&str>,
        event_data: Option<Value>,
    ) -> bool {
        match self.try_record(event_type, page_path, page_title, event_data) {
            Ok(session_id) => {
                debug!(%event_type, page_path, session_id = %session_id, "Recorded event");
                true
            }
            Err(e) => {
                warn!(%event_type, page_path, error = %e, "Analytics tracking error");
                false
            }
        }
    }

    fn try_record(
        &self,
        event_type: EventType,
        page_path: &str,
        page_title: Option<&str>,
        event_data: Option<Value>,
    ) -> Result<String> {
        let session_id = self.sessions.session_id();
        let client = classify_user_agent(&self.context.user_agent);
        let now = Utc::now();

        let event = EventRecord {
            event_type,
            session_id: session_id.clone(),
            user_id: self.context.user_id.clone(),
            page_path: page_path.to_string(),
            page_title: page_title
                .map(str::to_string)
                .or_else(|| self.context.page_title.clone()),
            referrer: non_empty(&self.context.referrer),
            device_type: Some(client.device.as_str().to_string()),
            browser: Some(client.browser.to_string()),
            operating_system: Some(client.os.to_string()),
            screen_resolution: self.context.screen_resolution.clone(),
            country: self.context.country.clone(),
            created_at: now,
            event_data: as_object(event_data),
        };
        // The two writes are independent; a failed insert still refreshes
        // the session.
        let inserted = self.store.insert_event(&event);

        let is_page_view = event_type == EventType::PageView;
        let upserted = self.store.upsert_session(&SessionUpsert {
            session_id: session_id.clone(),
            user_id: event.user_id,
            device_type: event.device_type,
            browser: event.browser,
            operating_system: event.operating_system,
            referrer: event.referrer,
            landing_page: is_page_view.then(|| page_path.to_string()),
            ended_at: now,
            is_page_view,
        });

        if let (Err(_), Err(e)) = (&inserted, &upserted) {
            warn!(session_id = %session_id, error = %e, "Session upsert failed");
        }
        inserted.and(upserted)?;

        Ok(session_id)
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|v| !v.is_empty()).map(str::to_string)
}

/// Event payloads are always objects; bare values are wrapped.
fn as_object(data: Option<Value>) -> Value {
    match data {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(Value::Object(map)) => Value::Object(map),
        Some(other) => json!({ "value": other }),
    }
}
