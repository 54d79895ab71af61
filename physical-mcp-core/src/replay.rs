//! Bounded in-memory log of alert-like events, exposed via the replay
//! endpoints so a client can ask "what happened while I was away."

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::mcp_logging::new_event_id;

const DEFAULT_MAX_EVENTS: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayEvent {
    pub event_id: String,
    pub event_type: String,
    #[serde(default)]
    pub camera_id: String,
    #[serde(default)]
    pub camera_name: String,
    #[serde(default)]
    pub rule_id: String,
    #[serde(default)]
    pub rule_name: String,
    #[serde(default)]
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

pub struct ReplayLog {
    max_events: usize,
    events: Mutex<VecDeque<ReplayEvent>>,
}

impl ReplayLog {
    pub fn new(max_events: usize) -> Self {
        ReplayLog {
            max_events,
            events: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn record(
        &self,
        event_type: impl Into<String>,
        camera_id: impl Into<String>,
        camera_name: impl Into<String>,
        rule_id: impl Into<String>,
        rule_name: impl Into<String>,
        message: impl Into<String>,
    ) -> String {
        let event_id = new_event_id();
        let event = ReplayEvent {
            event_id: event_id.clone(),
            event_type: event_type.into(),
            camera_id: camera_id.into(),
            camera_name: camera_name.into(),
            rule_id: rule_id.into(),
            rule_name: rule_name.into(),
            message: message.into(),
            timestamp: Utc::now(),
        };
        let mut events = self.events.lock().await;
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
        event_id
    }

    pub async fn timestamp_for(&self, event_id: &str) -> Option<DateTime<Utc>> {
        if event_id.is_empty() {
            return None;
        }
        let events = self.events.lock().await;
        events
            .iter()
            .rev()
            .find(|e| e.event_id == event_id)
            .map(|e| e.timestamp)
    }

    pub async fn since(&self, cutoff: DateTime<Utc>) -> Vec<ReplayEvent> {
        let events = self.events.lock().await;
        events
            .iter()
            .filter(|e| e.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    pub async fn all(&self) -> Vec<ReplayEvent> {
        self.events.lock().await.iter().cloned().collect()
    }
}

impl Default for ReplayLog {
    fn default() -> Self {
        ReplayLog::new(DEFAULT_MAX_EVENTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_then_lookup_timestamp() {
        let log = ReplayLog::default();
        let id = log
            .record("alert", "cam1", "Front", "r1", "Door rule", "triggered")
            .await;
        assert!(log.timestamp_for(&id).await.is_some());
    }

    #[tokio::test]
    async fn unknown_event_id_returns_none() {
        let log = ReplayLog::default();
        assert!(log.timestamp_for("evt_doesnotexist").await.is_none());
    }

    #[tokio::test]
    async fn bounded_to_max_events() {
        let log = ReplayLog::new(5);
        for i in 0..10 {
            log.record("alert", "cam1", "Front", "r1", "rule", format!("msg {i}"))
                .await;
        }
        assert_eq!(log.all().await.len(), 5);
    }

    #[tokio::test]
    async fn since_filters_by_cutoff() {
        let log = ReplayLog::default();
        log.record("alert", "cam1", "Front", "r1", "rule", "old").await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let cutoff = Utc::now();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        log.record("alert", "cam1", "Front", "r1", "rule", "new").await;

        let recent = log.since(cutoff).await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].message, "new");
    }
}
