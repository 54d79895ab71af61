//! Rolling per-camera scene summary.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

const MAX_CHANGE_LOG: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

/// Thread-safety note: this struct has no internal lock. Per the ownership
/// rules, `SceneState` is mutated only by its camera's perception loop (and
/// explicit user-triggered analyses on that same loop), so callers wrap it
/// the way their owning task needs — typically a plain `Mutex` held by the
/// per-camera state, never shared across cameras.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneState {
    pub summary: String,
    pub objects_present: Vec<String>,
    pub people_count: u32,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_change_description: String,
    pub update_count: u64,
    #[serde(skip)]
    change_log: VecDeque<ChangeLogEntry>,
}

impl SceneState {
    pub fn update(
        &mut self,
        summary: String,
        objects: Vec<String>,
        people_count: u32,
        change_desc: String,
    ) {
        self.summary = summary;
        self.objects_present = objects;
        self.people_count = people_count;
        self.last_updated = Some(Utc::now());
        self.last_change_description = change_desc.clone();
        self.update_count += 1;
        self.push_change_log(change_desc);
    }

    /// Record a change without a full analysis update.
    pub fn record_change(&mut self, description: String) {
        self.push_change_log(description);
    }

    fn push_change_log(&mut self, description: String) {
        if self.change_log.len() >= MAX_CHANGE_LOG {
            self.change_log.pop_front();
        }
        self.change_log.push_back(ChangeLogEntry {
            timestamp: Utc::now(),
            description,
        });
    }

    pub fn get_change_log(&self, minutes: i64) -> Vec<ChangeLogEntry> {
        let cutoff = Utc::now() - Duration::minutes(minutes);
        self.change_log
            .iter()
            .filter(|e| e.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    pub fn to_context_string(&self) -> String {
        format!(
            "Current scene: {}\nObjects: {}\nPeople visible: {}\nLast change: {}\nUpdated: {}\nTotal updates: {}",
            self.summary,
            if self.objects_present.is_empty() {
                "unknown".to_string()
            } else {
                self.objects_present.join(", ")
            },
            self.people_count,
            self.last_change_description,
            self.last_updated
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string()),
            self.update_count,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_bumps_count_and_appends_change_log() {
        let mut state = SceneState::default();
        state.update(
            "A person at the door".into(),
            vec!["person".into(), "door".into()],
            1,
            "person appeared".into(),
        );
        assert_eq!(state.update_count, 1);
        assert_eq!(state.people_count, 1);
        assert_eq!(state.get_change_log(5).len(), 1);
    }

    #[test]
    fn record_change_does_not_touch_summary() {
        let mut state = SceneState::default();
        state.update("baseline".into(), vec![], 0, "baseline set".into());
        state.record_change("something moved".into());
        assert_eq!(state.summary, "baseline");
        assert_eq!(state.get_change_log(5).len(), 2);
    }

    #[test]
    fn change_log_is_bounded_to_200_entries() {
        let mut state = SceneState::default();
        for i in 0..250 {
            state.record_change(format!("change {i}"));
        }
        assert_eq!(state.change_log.len(), MAX_CHANGE_LOG);
    }

    #[test]
    fn change_log_filters_by_time_window() {
        let mut state = SceneState::default();
        state.record_change("recent".into());
        assert_eq!(state.get_change_log(5).len(), 1);
        assert_eq!(state.get_change_log(0).len(), 0);
    }
}
