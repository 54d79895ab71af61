//! Slack incoming-webhook notification delivery using Block Kit. Slack
//! incoming webhooks don't support file uploads, so this is text-only.

use log::{info, warn};
use serde_json::{json, Value};

use crate::rules::AlertEvent;

fn priority_emoji(priority: &str) -> &'static str {
    match priority {
        "low" => ":information_source:",
        "medium" => ":warning:",
        "high" => ":rotating_light:",
        "critical" => ":red_circle:",
        _ => ":warning:",
    }
}

fn build_blocks(alert: &AlertEvent) -> Vec<Value> {
    let priority = alert.rule.priority.as_str();
    let emoji = priority_emoji(priority);

    let body = alert.rule.custom_message.clone().unwrap_or_else(|| {
        format!(
            "{}\n\n*Condition:* {}\n*Confidence:* {:.0}%",
            alert.evaluation.reasoning,
            alert.rule.condition,
            alert.evaluation.confidence * 100.0
        )
    });

    vec![
        json!({
            "type": "header",
            "text": {"type": "plain_text", "text": alert.rule.name, "emoji": true},
        }),
        json!({
            "type": "section",
            "text": {"type": "mrkdwn", "text": format!("{emoji} {body}")},
        }),
        json!({
            "type": "context",
            "elements": [{"type": "mrkdwn", "text": format!("physical-mcp | {priority} priority")}],
        }),
    ]
}

pub struct SlackWebhookNotifier {
    default_url: String,
    client: reqwest::Client,
}

impl SlackWebhookNotifier {
    pub fn new(default_url: impl Into<String>) -> Self {
        SlackWebhookNotifier {
            default_url: default_url.into(),
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(15))
                .build()
                .expect("static client config is valid"),
        }
    }

    pub async fn notify(&self, alert: &AlertEvent, webhook_url: Option<&str>) -> bool {
        let url = webhook_url.filter(|u| !u.is_empty()).unwrap_or(&self.default_url);
        if url.is_empty() {
            return false;
        }

        let blocks = build_blocks(alert);
        let fallback = alert.rule.custom_message.clone().unwrap_or_else(|| {
            format!(
                "[{}] {}: {}",
                alert.rule.priority.as_str().to_uppercase(),
                alert.rule.name,
                alert.evaluation.reasoning
            )
        });
        let payload = json!({"blocks": blocks, "text": fallback});

        match self.client.post(url).json(&payload).send().await {
            Ok(resp) if resp.status().as_u16() < 400 => {
                info!("Slack alert sent: {}", alert.rule.name);
                true
            }
            Ok(resp) => {
                warn!("Slack webhook failed: HTTP {}", resp.status());
                false
            }
            Err(e) => {
                warn!("Slack error: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{AlertEvent, RuleEvaluation, WatchRule};

    fn sample_alert() -> AlertEvent {
        let rule = WatchRule::new("Front door", "a person is at the door");
        AlertEvent {
            evaluation: RuleEvaluation {
                rule_id: rule.id.clone(),
                triggered: true,
                confidence: 0.9,
                reasoning: "a person is visible".to_string(),
                timestamp: chrono::Utc::now(),
            },
            rule,
            scene_summary: "a person standing at the door".to_string(),
            frame_base64: None,
        }
    }

    #[test]
    fn blocks_include_header_section_and_context() {
        let blocks = build_blocks(&sample_alert());
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0]["type"], "header");
    }

    #[tokio::test]
    async fn notify_without_url_returns_false() {
        let notifier = SlackWebhookNotifier::new("");
        assert!(!notifier.notify(&sample_alert(), None).await);
    }
}
