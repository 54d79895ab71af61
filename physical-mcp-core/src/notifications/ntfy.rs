//! ntfy.sh push notification delivery: free, zero-signup, with camera
//! frame images attached as binary bodies.

use base64::Engine;
use log::{info, warn};

use crate::rules::AlertEvent;

fn ntfy_priority(priority: &str) -> &'static str {
    match priority {
        "low" => "2",
        "medium" => "3",
        "high" => "4",
        "critical" => "5",
        _ => "3",
    }
}

fn ntfy_tags(priority: &str) -> &'static str {
    match priority {
        "low" => "camera",
        "medium" => "camera,eyes",
        "high" => "camera,warning",
        "critical" => "camera,rotating_light",
        _ => "camera",
    }
}

pub struct NtfyNotifier {
    default_topic: String,
    server_url: String,
    client: reqwest::Client,
}

impl NtfyNotifier {
    pub fn new(default_topic: impl Into<String>, server_url: impl Into<String>) -> Self {
        NtfyNotifier {
            default_topic: default_topic.into(),
            server_url: server_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(15))
                .build()
                .expect("static client config is valid"),
        }
    }

    async fn send(
        &self,
        url: &str,
        message: &str,
        title: &str,
        priority: &str,
        tags: &str,
        frame_base64: Option<&str>,
    ) -> bool {
        let mut request = if let Some(b64) = frame_base64 {
            let image_bytes = match base64::engine::general_purpose::STANDARD.decode(b64) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("ntfy error: bad frame base64: {e}");
                    return false;
                }
            };
            self.client
                .put(url)
                .header("Filename", "camera.jpg")
                .header("X-Message", message)
                .body(image_bytes)
        } else {
            self.client.post(url).body(message.as_bytes().to_vec())
        };

        request = request
            .header("Title", title)
            .header("Priority", priority)
            .header("Tags", tags);

        match request.send().await {
            Ok(resp) => {
                let ok = resp.status().as_u16() < 400;
                if ok {
                    info!("ntfy sent: {title}");
                } else {
                    warn!("ntfy failed: HTTP {}", resp.status());
                }
                ok
            }
            Err(e) => {
                warn!("ntfy error: {e}");
                false
            }
        }
    }

    pub async fn notify(&self, alert: &AlertEvent, topic: Option<&str>) -> bool {
        let target_topic = topic.filter(|t| !t.is_empty()).unwrap_or(&self.default_topic);
        if target_topic.is_empty() {
            return false;
        }

        let url = format!("{}/{target_topic}", self.server_url);
        let priority = alert.rule.priority.as_str();
        let message = format!(
            "{}\n\nCondition: {}\nConfidence: {:.0}%",
            alert.evaluation.reasoning,
            alert.rule.condition,
            alert.evaluation.confidence * 100.0
        );

        self.send(
            &url,
            &message,
            &alert.rule.name,
            ntfy_priority(priority),
            ntfy_tags(priority),
            alert.frame_base64.as_deref(),
        )
        .await
    }

    pub async fn notify_scene_change(
        &self,
        topic: &str,
        change_level: &str,
        rule_names: &[String],
        frame_base64: Option<&str>,
    ) -> bool {
        if topic.is_empty() {
            return false;
        }
        let url = format!("{}/{topic}", self.server_url);
        let title = format!("Scene Change: {}", title_case(change_level));
        let message = format!("Monitoring: {}\nEvaluating camera now...", rule_names.join(", "));
        self.send(&url, &message, &title, "2", "camera,mag", frame_base64).await
    }
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_maps_to_ntfy_numeric_scale() {
        assert_eq!(ntfy_priority("critical"), "5");
        assert_eq!(ntfy_priority("unknown"), "3");
    }

    #[test]
    fn title_case_capitalizes_first_letter() {
        assert_eq!(title_case("major"), "Major");
    }
}
