//! Discord webhook notification delivery with rich, priority-colored
//! embeds and optional camera frame attachment.

use base64::Engine;
use chrono::Utc;
use log::{info, warn};
use serde_json::{json, Value};

use crate::rules::AlertEvent;

fn priority_color(priority: &str) -> u32 {
    match priority {
        "low" => 0x3498DB,
        "medium" => 0xF1C40F,
        "high" => 0xE67E22,
        "critical" => 0xE74C3C,
        _ => 0xF1C40F,
    }
}

fn build_embed(alert: &AlertEvent, has_image: bool) -> Value {
    let priority = alert.rule.priority.as_str();
    let description = alert.rule.custom_message.clone().unwrap_or_else(|| {
        format!(
            "{}\n\n**Condition:** {}\n**Confidence:** {:.0}%",
            alert.evaluation.reasoning,
            alert.rule.condition,
            alert.evaluation.confidence * 100.0
        )
    });

    let mut embed = json!({
        "title": alert.rule.name,
        "description": description,
        "color": priority_color(priority),
        "timestamp": Utc::now().to_rfc3339(),
        "footer": {"text": format!("physical-mcp | {priority}")},
    });

    if has_image {
        embed["image"] = json!({"url": "attachment://camera.jpg"});
    }
    embed
}

pub struct DiscordWebhookNotifier {
    default_url: String,
    client: reqwest::Client,
}

impl DiscordWebhookNotifier {
    pub fn new(default_url: impl Into<String>) -> Self {
        DiscordWebhookNotifier {
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

        let embed = build_embed(alert, alert.frame_base64.is_some());

        let result = if let Some(b64) = &alert.frame_base64 {
            self.send_with_image(url, &embed, b64).await
        } else {
            self.send_plain(url, &embed).await
        };

        match result {
            Ok(()) => {
                info!("Discord alert sent: {}", alert.rule.name);
                true
            }
            Err(e) => {
                warn!("Discord error: {e}");
                false
            }
        }
    }

    async fn send_with_image(&self, url: &str, embed: &Value, frame_base64: &str) -> Result<(), String> {
        let image_bytes = base64::engine::general_purpose::STANDARD
            .decode(frame_base64)
            .map_err(|e| format!("bad frame base64: {e}"))?;

        let payload_json = serde_json::to_string(&json!({"embeds": [embed]})).map_err(|e| e.to_string())?;
        let part = reqwest::multipart::Part::bytes(image_bytes)
            .file_name("camera.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| e.to_string())?;
        let form = reqwest::multipart::Form::new()
            .part(
                "payload_json",
                reqwest::multipart::Part::text(payload_json).mime_str("application/json").map_err(|e| e.to_string())?,
            )
            .part("files[0]", part);

        let resp = self.client.post(url).multipart(form).send().await.map_err(|e| e.to_string())?;
        finish(resp).await
    }

    async fn send_plain(&self, url: &str, embed: &Value) -> Result<(), String> {
        let payload = json!({"embeds": [embed]});
        let resp = self.client.post(url).json(&payload).send().await.map_err(|e| e.to_string())?;
        finish(resp).await
    }
}

async fn finish(resp: reqwest::Response) -> Result<(), String> {
    let status = resp.status();
    if status.as_u16() < 400 {
        Ok(())
    } else {
        Err(format!("Discord webhook failed: HTTP {status}"))
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
    fn embed_omits_image_field_without_frame() {
        let embed = build_embed(&sample_alert(), false);
        assert!(embed.get("image").is_none());
    }

    #[test]
    fn embed_color_matches_priority() {
        assert_eq!(priority_color("critical"), 0xE74C3C);
    }

    #[tokio::test]
    async fn notify_without_url_returns_false() {
        let notifier = DiscordWebhookNotifier::new("");
        assert!(!notifier.notify(&sample_alert(), None).await);
    }
}
