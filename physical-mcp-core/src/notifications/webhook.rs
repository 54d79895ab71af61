//! HTTP POST webhook notification delivery. Fire-and-forget, no retries —
//! if the endpoint is down the alert is logged and dropped.

use log::{info, warn};
use serde_json::json;

use crate::rules::AlertEvent;

pub struct WebhookNotifier {
    default_url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(default_url: impl Into<String>) -> Self {
        WebhookNotifier {
            default_url: default_url.into(),
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(5))
                .build()
                .expect("static client config is valid"),
        }
    }

    pub async fn notify(&self, alert: &AlertEvent, url: Option<&str>) -> bool {
        let target_url = url.filter(|u| !u.is_empty()).unwrap_or(&self.default_url);
        if target_url.is_empty() {
            return false;
        }

        let payload = json!({
            "event": "rule_triggered",
            "rule_id": alert.rule.id,
            "rule_name": alert.rule.name,
            "condition": alert.rule.condition,
            "priority": alert.rule.priority.as_str(),
            "reasoning": alert.evaluation.reasoning,
            "confidence": alert.evaluation.confidence,
            "timestamp": alert.evaluation.timestamp.to_rfc3339(),
            "scene_summary": alert.scene_summary,
            "custom_message": alert.rule.custom_message,
        });

        match self.client.post(target_url).json(&payload).send().await {
            Ok(resp) if resp.status().as_u16() < 400 => {
                info!("Webhook sent to {target_url}: {}", resp.status());
                true
            }
            Ok(resp) => {
                warn!("Webhook failed: {target_url} returned {}", resp.status());
                false
            }
            Err(e) => {
                warn!("Webhook error: {target_url}: {e}");
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

    #[tokio::test]
    async fn notify_without_any_url_configured_returns_false() {
        let notifier = WebhookNotifier::new("");
        let alert = sample_alert();
        assert!(!notifier.notify(&alert, None).await);
    }
}
