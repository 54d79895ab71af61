//! Bounded TTL queue for client-side reasoning mode.
//!
//! When no server-side vision provider is configured, the perception loop
//! queues `PendingAlert`s here and the MCP `check_camera_alerts` tool
//! drains them, returning frames for the client's own model to evaluate.

use std::collections::VecDeque;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::rules::PendingAlert;

const DEFAULT_MAX_SIZE: usize = 50;
const DEFAULT_TTL_SECONDS: i64 = 300;

pub struct AlertQueue {
    max_size: usize,
    ttl_seconds: i64,
    queue: Mutex<VecDeque<PendingAlert>>,
}

impl AlertQueue {
    pub fn new(max_size: usize, ttl_seconds: i64) -> Self {
        AlertQueue {
            max_size,
            ttl_seconds,
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn push(&self, alert: PendingAlert) {
        let mut queue = self.queue.lock().await;
        Self::prune_expired(&mut queue);
        if queue.len() >= self.max_size {
            queue.pop_front();
        }
        queue.push_back(alert);
    }

    /// Drains and returns all pending alerts, clearing the queue so a
    /// second poller can't double-process the same batch.
    pub async fn pop_all(&self) -> Vec<PendingAlert> {
        let mut queue = self.queue.lock().await;
        Self::prune_expired(&mut queue);
        queue.drain(..).collect()
    }

    pub async fn has_pending(&self) -> bool {
        let mut queue = self.queue.lock().await;
        Self::prune_expired(&mut queue);
        !queue.is_empty()
    }

    pub async fn size(&self) -> usize {
        let mut queue = self.queue.lock().await;
        Self::prune_expired(&mut queue);
        queue.len()
    }

    /// Removes pending alerts that reference `rule_id` (e.g. because the
    /// rule was deleted), returning how many were dropped.
    pub async fn flush_rule(&self, rule_id: &str) -> usize {
        let mut queue = self.queue.lock().await;
        let before = queue.len();
        queue.retain(|a| !a.active_rules.iter().any(|r| r.id == rule_id));
        before - queue.len()
    }

    fn prune_expired(queue: &mut VecDeque<PendingAlert>) {
        let now = Utc::now();
        while let Some(front) = queue.front() {
            if front.expires_at < now {
                queue.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for AlertQueue {
    fn default() -> Self {
        AlertQueue::new(DEFAULT_MAX_SIZE, DEFAULT_TTL_SECONDS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::ActiveRuleSummary;
    use chrono::Duration;

    fn alert(id: &str, ttl_secs: i64, rule_ids: &[&str]) -> PendingAlert {
        PendingAlert {
            id: id.to_string(),
            camera_id: "cam1".to_string(),
            camera_name: "Front".to_string(),
            timestamp: Utc::now(),
            change_level: "major".to_string(),
            change_description: "motion".to_string(),
            frame_base64: "AAAA".to_string(),
            scene_context: "ctx".to_string(),
            active_rules: rule_ids
                .iter()
                .map(|id| ActiveRuleSummary {
                    id: id.to_string(),
                    name: "rule".to_string(),
                    condition: "cond".to_string(),
                    priority: crate::rules::RulePriority::Medium,
                })
                .collect(),
            expires_at: Utc::now() + Duration::seconds(ttl_secs),
        }
    }

    #[tokio::test]
    async fn push_then_pop_all_drains_queue() {
        let q = AlertQueue::default();
        q.push(alert("a1", 300, &[])).await;
        q.push(alert("a2", 300, &[])).await;
        assert_eq!(q.size().await, 2);
        let drained = q.pop_all().await;
        assert_eq!(drained.len(), 2);
        assert_eq!(q.size().await, 0);
    }

    #[tokio::test]
    async fn bounded_size_evicts_oldest() {
        let q = AlertQueue::new(2, 300);
        q.push(alert("a1", 300, &[])).await;
        q.push(alert("a2", 300, &[])).await;
        q.push(alert("a3", 300, &[])).await;
        let drained = q.pop_all().await;
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].id, "a2");
        assert_eq!(drained[1].id, "a3");
    }

    #[tokio::test]
    async fn expired_alerts_are_pruned() {
        let q = AlertQueue::new(10, -1);
        q.push(alert("a1", -1, &[])).await;
        assert!(!q.has_pending().await);
        assert_eq!(q.size().await, 0);
    }

    #[tokio::test]
    async fn flush_rule_removes_matching_alerts_only() {
        let q = AlertQueue::new(10, 300);
        q.push(alert("a1", 300, &["r_1"])).await;
        q.push(alert("a2", 300, &["r_2"])).await;
        let removed = q.flush_rule("r_1").await;
        assert_eq!(removed, 1);
        let remaining = q.pop_all().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "a2");
    }

    #[tokio::test]
    async fn has_pending_false_on_empty_queue() {
        let q = AlertQueue::default();
        assert!(!q.has_pending().await);
    }
}
