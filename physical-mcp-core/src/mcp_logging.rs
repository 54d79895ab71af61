//! Structured `PMCP[...]` log lines plus the session-attach buffering that
//! lets the perception loop start emitting logs before any MCP client has
//! connected.

use std::collections::VecDeque;

use chrono::Utc;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;

use crate::events::EventBus;

const DEFAULT_MAX_PENDING: usize = 100;

pub fn new_event_id() -> String {
    format!("evt_{}", crate::rules::models::random_hex(10))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpLogPayload {
    pub event_type: String,
    pub event_id: String,
    pub camera_id: String,
    pub rule_id: String,
    pub level: String,
    pub message: String,
    pub data: String,
    pub logger: String,
    pub timestamp: String,
}

fn build_payload(
    level: &str,
    message: &str,
    event_type: &str,
    camera_id: &str,
    rule_id: &str,
    event_id: &str,
) -> McpLogPayload {
    let eid = if event_id.is_empty() {
        new_event_id()
    } else {
        event_id.to_string()
    };
    let mut parts = vec![format!("PMCP[{}]", event_type.to_uppercase()), format!("event_id={eid}")];
    if !camera_id.is_empty() {
        parts.push(format!("camera_id={camera_id}"));
    }
    if !rule_id.is_empty() {
        parts.push(format!("rule_id={rule_id}"));
    }
    let prefix = parts.join(" | ");
    let data = format!("{prefix} | {message}");

    McpLogPayload {
        event_type: event_type.to_string(),
        event_id: eid,
        camera_id: camera_id.to_string(),
        rule_id: rule_id.to_string(),
        level: level.to_string(),
        message: message.to_string(),
        data,
        logger: "physical-mcp".to_string(),
        timestamp: Utc::now().to_rfc3339(),
    }
}

fn emit_local(level: &str, data: &str) {
    match level {
        "error" | "critical" => error!("{data}"),
        "warning" => warn!("{data}"),
        "debug" => debug!("{data}"),
        _ => info!("{data}"),
    }
}

/// Carries the MCP session handle abstractly: the server crate provides the
/// real implementation once a client session is attached; tests and
/// pre-attach code use `None`.
pub trait McpSessionLog: Send + Sync {
    fn send_log(&self, level: &str, data: &str, logger: &str);
}

/// Buffers `PMCP[...]` log payloads until an MCP session attaches, and
/// bridges every emission onto the shared `EventBus` for other in-process
/// subscribers (MJPEG/SSE streams, metrics).
pub struct McpLogger {
    event_bus: Option<std::sync::Arc<EventBus>>,
    pending: Mutex<VecDeque<McpLogPayload>>,
    max_pending: usize,
    session: Mutex<Option<std::sync::Arc<dyn McpSessionLog>>>,
}

impl McpLogger {
    pub fn new(event_bus: Option<std::sync::Arc<EventBus>>) -> Self {
        McpLogger {
            event_bus,
            pending: Mutex::new(VecDeque::new()),
            max_pending: DEFAULT_MAX_PENDING,
            session: Mutex::new(None),
        }
    }

    pub async fn attach_session(&self, session: std::sync::Arc<dyn McpSessionLog>) {
        *self.session.lock().await = Some(session);
    }

    pub async fn detach_session(&self) {
        *self.session.lock().await = None;
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn send(
        &self,
        level: &str,
        message: &str,
        event_type: &str,
        camera_id: &str,
        rule_id: &str,
        event_id: &str,
    ) {
        let payload = build_payload(level, message, event_type, camera_id, rule_id, event_id);
        emit_local(level, &payload.data);

        if let Some(bus) = &self.event_bus {
            bus.publish("mcp_log", json!(payload)).await;
        }

        let session = self.session.lock().await.clone();
        match session {
            Some(session) => session.send_log(level, &payload.data, &payload.logger),
            None => {
                let mut pending = self.pending.lock().await;
                pending.push_back(payload);
                while pending.len() > self.max_pending {
                    pending.pop_front();
                }
            }
        }
    }

    /// Flushes buffered logs once a session is attached. Returns the
    /// number successfully delivered.
    pub async fn flush_pending(&self) -> usize {
        let session = self.session.lock().await.clone();
        let Some(session) = session else {
            return 0;
        };
        let mut pending = self.pending.lock().await;
        let flushed = pending.len();
        for payload in pending.drain(..) {
            session.send_log(&payload.level, &payload.data, &payload.logger);
        }
        flushed
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSession(Arc<AtomicUsize>);
    impl McpSessionLog for CountingSession {
        fn send_log(&self, _level: &str, _data: &str, _logger: &str) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn logs_buffer_until_session_attaches() {
        let logger = McpLogger::new(None);
        logger.send("info", "hello", "system", "", "", "").await;
        assert_eq!(logger.pending_count().await, 1);

        let counter = Arc::new(AtomicUsize::new(0));
        logger
            .attach_session(Arc::new(CountingSession(counter.clone())))
            .await;
        let flushed = logger.flush_pending().await;
        assert_eq!(flushed, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(logger.pending_count().await, 0);
    }

    #[tokio::test]
    async fn attached_session_receives_logs_directly() {
        let logger = McpLogger::new(None);
        let counter = Arc::new(AtomicUsize::new(0));
        logger
            .attach_session(Arc::new(CountingSession(counter.clone())))
            .await;
        logger.send("info", "hi", "system", "cam1", "", "").await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(logger.pending_count().await, 0);
    }

    #[tokio::test]
    async fn pending_buffer_is_bounded() {
        let logger = McpLogger {
            event_bus: None,
            pending: Mutex::new(VecDeque::new()),
            max_pending: 3,
            session: Mutex::new(None),
        };
        for i in 0..10 {
            logger
                .send("info", &format!("msg {i}"), "system", "", "", "")
                .await;
        }
        assert_eq!(logger.pending_count().await, 3);
    }

    #[test]
    fn new_event_id_has_expected_prefix() {
        let id = new_event_id();
        assert!(id.starts_with("evt_"));
        assert_eq!(id.len(), 14);
    }
}
