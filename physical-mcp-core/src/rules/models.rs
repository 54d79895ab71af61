//! Record types for the rules engine: `WatchRule`, `NotificationTarget`,
//! `RuleEvaluation`, `AlertEvent`.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RulePriority {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for RulePriority {
    fn default() -> Self {
        RulePriority::Medium
    }
}

impl RulePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            RulePriority::Low => "low",
            RulePriority::Medium => "medium",
            RulePriority::High => "high",
            RulePriority::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Local,
    Desktop,
    Ntfy,
    Telegram,
    Discord,
    Slack,
    Webhook,
    Openclaw,
}

impl Default for NotificationType {
    fn default() -> Self {
        NotificationType::Local
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationTarget {
    #[serde(rename = "type")]
    pub kind: NotificationType,
    #[serde(default)]
    pub url: Option<String>,
    /// May be a comma-separated list for fanout.
    #[serde(default)]
    pub channel: Option<String>,
    /// May be a comma-separated list for fanout.
    #[serde(default)]
    pub target: Option<String>,
}

impl NotificationTarget {
    /// Split a comma-separated `channel`/`target` pair into individual
    /// (channel, target) delivery legs, preserving order.
    pub fn fanout_pairs(&self) -> Vec<(Option<String>, Option<String>)> {
        let channels: Vec<Option<String>> = match &self.channel {
            Some(c) if c.contains(',') => {
                c.split(',').map(|s| Some(s.trim().to_string())).collect()
            }
            Some(c) => vec![Some(c.clone())],
            None => vec![None],
        };
        let targets: Vec<Option<String>> = match &self.target {
            Some(t) if t.contains(',') => {
                t.split(',').map(|s| Some(s.trim().to_string())).collect()
            }
            Some(t) => vec![Some(t.clone())],
            None => vec![None],
        };
        let len = channels.len().max(targets.len());
        (0..len)
            .map(|i| {
                (
                    channels.get(i).cloned().flatten(),
                    targets.get(i).cloned().flatten(),
                )
            })
            .collect()
    }
}

fn new_rule_id() -> String {
    format!("r_{}", random_hex(8))
}

pub fn random_hex(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| std::char::from_digit(rng.gen_range(0..16), 16).unwrap())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchRule {
    #[serde(default = "new_rule_id")]
    pub id: String,
    pub name: String,
    pub condition: String,
    /// Empty string means "all cameras".
    #[serde(default)]
    pub camera_id: String,
    #[serde(default)]
    pub priority: RulePriority,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub notification: NotificationTarget,
    #[serde(default = "default_cooldown")]
    pub cooldown_seconds: u64,
    #[serde(default)]
    pub custom_message: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub owner_name: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_triggered: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

fn default_cooldown() -> u64 {
    60
}

impl WatchRule {
    pub fn new(name: impl Into<String>, condition: impl Into<String>) -> Self {
        WatchRule {
            id: new_rule_id(),
            name: name.into(),
            condition: condition.into(),
            camera_id: String::new(),
            priority: RulePriority::default(),
            enabled: true,
            notification: NotificationTarget::default(),
            cooldown_seconds: default_cooldown(),
            custom_message: None,
            owner_id: None,
            owner_name: None,
            created_at: Utc::now(),
            last_triggered: None,
        }
    }

    pub fn cooldown_elapsed(&self, now: DateTime<Utc>) -> bool {
        match self.last_triggered {
            None => true,
            Some(last) => {
                let elapsed = (now - last).num_milliseconds() as f64 / 1000.0;
                elapsed >= self.cooldown_seconds as f64
            }
        }
    }

    pub fn applies_to_camera(&self, camera_id: &str) -> bool {
        self.camera_id.is_empty() || self.camera_id == camera_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleEvaluation {
    pub rule_id: String,
    pub triggered: bool,
    pub confidence: f64,
    pub reasoning: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub rule: WatchRule,
    pub evaluation: RuleEvaluation,
    pub scene_summary: String,
    pub frame_base64: Option<String>,
}

/// A small, JSON-ready summary of a rule, embedded in `PendingAlert` so a
/// client polling `check_camera_alerts` doesn't need a second round trip
/// to look up rule details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveRuleSummary {
    pub id: String,
    pub name: String,
    pub condition: String,
    pub priority: RulePriority,
}

impl From<&WatchRule> for ActiveRuleSummary {
    fn from(rule: &WatchRule) -> Self {
        ActiveRuleSummary {
            id: rule.id.clone(),
            name: rule.name.clone(),
            condition: rule.condition.clone(),
            priority: rule.priority,
        }
    }
}

/// A scene-change event queued for client-side evaluation: when no
/// server-side vision provider is configured, the perception loop queues
/// these for the MCP client to poll and evaluate with its own model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAlert {
    pub id: String,
    #[serde(default)]
    pub camera_id: String,
    #[serde(default)]
    pub camera_name: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub change_level: String,
    pub change_description: String,
    pub frame_base64: String,
    pub scene_context: String,
    pub active_rules: Vec<ActiveRuleSummary>,
    pub expires_at: DateTime<Utc>,
}

impl PendingAlert {
    pub fn new_id() -> String {
        format!("pa_{}", random_hex(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rule_has_unique_prefixed_id() {
        let r1 = WatchRule::new("a", "b");
        let r2 = WatchRule::new("a", "b");
        assert!(r1.id.starts_with("r_"));
        assert_eq!(r1.id.len(), 10);
        assert_ne!(r1.id, r2.id);
    }

    #[test]
    fn applies_to_camera_empty_means_all() {
        let rule = WatchRule::new("a", "b");
        assert!(rule.applies_to_camera("cam1"));
        assert!(rule.applies_to_camera("cam2"));
    }

    #[test]
    fn applies_to_camera_matches_exact_id() {
        let mut rule = WatchRule::new("a", "b");
        rule.camera_id = "cam1".to_string();
        assert!(rule.applies_to_camera("cam1"));
        assert!(!rule.applies_to_camera("cam2"));
    }

    #[test]
    fn cooldown_elapsed_true_when_never_triggered() {
        let rule = WatchRule::new("a", "b");
        assert!(rule.cooldown_elapsed(Utc::now()));
    }

    #[test]
    fn fanout_pairs_splits_comma_separated_channel_and_target() {
        let target = NotificationTarget {
            kind: NotificationType::Telegram,
            url: None,
            channel: Some("chan1, chan2".to_string()),
            target: Some("id1,id2".to_string()),
        };
        let pairs = target.fanout_pairs();
        assert_eq!(
            pairs,
            vec![
                (Some("chan1".to_string()), Some("id1".to_string())),
                (Some("chan2".to_string()), Some("id2".to_string())),
            ]
        );
    }

    #[test]
    fn fanout_pairs_single_value_yields_one_pair() {
        let target = NotificationTarget {
            kind: NotificationType::Webhook,
            url: Some("https://example.com/hook".to_string()),
            channel: None,
            target: None,
        };
        assert_eq!(target.fanout_pairs(), vec![(None, None)]);
    }
}
