//! Telegram Bot API notification delivery: alerts with camera frame
//! photos sent directly to a chat via the Bot API.

use base64::Engine;
use log::{info, warn};

use crate::rules::AlertEvent;

fn priority_emoji(priority: &str) -> &'static str {
    match priority {
        "low" => "\u{2139}\u{fe0f}",
        "medium" => "\u{26a0}\u{fe0f}",
        "high" => "\u{1f6a8}",
        "critical" => "\u{1f534}",
        _ => "\u{26a0}\u{fe0f}",
    }
}

fn format_message(alert: &AlertEvent) -> String {
    if let Some(custom) = &alert.rule.custom_message {
        return custom.clone();
    }
    format!(
        "{} *{}*\n\n{}\n\n_Condition:_ {}\n_Confidence:_ {:.0}%",
        priority_emoji(alert.rule.priority.as_str()),
        alert.rule.name,
        alert.evaluation.reasoning,
        alert.rule.condition,
        alert.evaluation.confidence * 100.0
    )
}

pub struct TelegramNotifier {
    bot_token: String,
    default_chat_id: String,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(bot_token: impl Into<String>, default_chat_id: impl Into<String>) -> Self {
        TelegramNotifier {
            bot_token: bot_token.into(),
            default_chat_id: default_chat_id.into(),
            api_base: "https://api.telegram.org".to_string(),
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(15))
                .build()
                .expect("static client config is valid"),
        }
    }

    pub async fn notify(&self, alert: &AlertEvent, chat_id: Option<&str>) -> bool {
        let target_chat = chat_id.filter(|c| !c.is_empty()).unwrap_or(&self.default_chat_id);
        if self.bot_token.is_empty() || target_chat.is_empty() {
            return false;
        }

        let message = format_message(alert);

        let result = if let Some(b64) = &alert.frame_base64 {
            self.send_photo(target_chat, &message, b64).await
        } else {
            self.send_message(target_chat, &message).await
        };

        match result {
            Ok(()) => {
                info!("Telegram alert sent: {}", alert.rule.name);
                true
            }
            Err(e) => {
                warn!("Telegram error: {e}");
                false
            }
        }
    }

    async fn send_photo(&self, chat_id: &str, caption: &str, frame_base64: &str) -> Result<(), String> {
        let image_bytes = base64::engine::general_purpose::STANDARD
            .decode(frame_base64)
            .map_err(|e| format!("bad frame base64: {e}"))?;

        let part = reqwest::multipart::Part::bytes(image_bytes)
            .file_name("camera.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| e.to_string())?;
        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .text("parse_mode", "Markdown")
            .part("photo", part);

        let url = format!("{}/bot{}/sendPhoto", self.api_base, self.bot_token);
        let resp = self.client.post(url).multipart(form).send().await.map_err(|e| e.to_string())?;
        finish(resp, "sendPhoto").await
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), String> {
        let payload = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let resp = self.client.post(url).json(&payload).send().await.map_err(|e| e.to_string())?;
        finish(resp, "sendMessage").await
    }
}

async fn finish(resp: reqwest::Response, op: &str) -> Result<(), String> {
    let status = resp.status();
    if status.as_u16() < 400 {
        Ok(())
    } else {
        let body = resp.text().await.unwrap_or_default();
        Err(format!("{op} failed: HTTP {status} — {body}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{AlertEvent, RuleEvaluation, WatchRule};

    fn sample_alert(custom_message: Option<&str>) -> AlertEvent {
        let mut rule = WatchRule::new("Front door", "a person is at the door");
        rule.custom_message = custom_message.map(str::to_string);
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
    fn custom_message_overrides_default_formatting() {
        let alert = sample_alert(Some("door opened"));
        assert_eq!(format_message(&alert), "door opened");
    }

    #[test]
    fn default_formatting_includes_confidence_and_condition() {
        let alert = sample_alert(None);
        let msg = format_message(&alert);
        assert!(msg.contains("90%"));
        assert!(msg.contains("a person is at the door"));
    }

    #[tokio::test]
    async fn notify_without_bot_token_returns_false() {
        let notifier = TelegramNotifier::new("", "12345");
        assert!(!notifier.notify(&sample_alert(None), None).await);
    }
}
