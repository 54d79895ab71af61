//! OpenClaw channel delivery — bridges alerts into OpenClaw's
//! multi-channel delivery system (Telegram, WhatsApp, Discord, Slack,
//! Signal, ...) via the `openclaw message send` CLI subprocess.
//!
//! Two-stage delivery: tries with the camera frame attached first, falls
//! back to text-only if media upload fails (e.g. a channel missing
//! file-upload scope).

use std::path::PathBuf;
use std::time::Duration;

use base64::Engine;
use log::{info, warn};
use tokio::process::Command;

use crate::rules::AlertEvent;

const RUN_TIMEOUT: Duration = Duration::from_secs(15);

fn media_dir() -> PathBuf {
    crate::config::home_dir().join(".openclaw").join("workspace")
}

pub struct OpenClawNotifier {
    default_channel: String,
    default_target: String,
    bin: String,
}

impl OpenClawNotifier {
    pub fn new(default_channel: impl Into<String>, default_target: impl Into<String>, bin_override: &str) -> Self {
        let bin = if !bin_override.is_empty() {
            bin_override.to_string()
        } else {
            which("openclaw").unwrap_or_else(|| "openclaw".to_string())
        };
        OpenClawNotifier {
            default_channel: default_channel.into(),
            default_target: default_target.into(),
            bin,
        }
    }

    pub async fn notify(&self, alert: &AlertEvent, channel: Option<&str>, target: Option<&str>) -> bool {
        let ch = channel.filter(|c| !c.is_empty()).unwrap_or(&self.default_channel);
        let dest = target.filter(|t| !t.is_empty()).unwrap_or(&self.default_target);

        if ch.is_empty() {
            warn!("OpenClaw notifier: no channel configured");
            return false;
        }
        if dest.is_empty() {
            warn!("OpenClaw notifier: no target configured");
            return false;
        }

        let message = format_message(alert);
        let base_args = vec![
            "message".to_string(),
            "send".to_string(),
            "--channel".to_string(),
            ch.to_string(),
            "--target".to_string(),
            dest.to_string(),
            "-m".to_string(),
            message,
        ];

        if let Some(media_path) = self.prepare_media(alert).await {
            let mut args = base_args.clone();
            args.push("--media".to_string());
            args.push(media_path.to_string_lossy().into_owned());
            if self.run_cmd(&args, ch, dest, &alert.rule.name).await {
                return true;
            }
            info!("Media attach failed, retrying text-only");
        }

        self.run_cmd(&base_args, ch, dest, &alert.rule.name).await
    }

    async fn prepare_media(&self, alert: &AlertEvent) -> Option<PathBuf> {
        let b64 = alert.frame_base64.as_ref()?;
        let bytes = base64::engine::general_purpose::STANDARD.decode(b64).ok()?;
        let dir = media_dir();
        tokio::fs::create_dir_all(&dir).await.ok()?;
        let dest = dir.join("camera-alert.jpg");
        tokio::fs::write(&dest, &bytes).await.ok()?;
        Some(dest)
    }

    async fn run_cmd(&self, args: &[String], ch: &str, dest: &str, rule_name: &str) -> bool {
        let result = tokio::time::timeout(RUN_TIMEOUT, Command::new(&self.bin).args(args).output()).await;

        match result {
            Ok(Ok(output)) if output.status.success() => {
                info!("OpenClaw alert sent to {ch}/{dest}: {rule_name}");
                true
            }
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!(
                    "OpenClaw send failed (rc={:?}): {}",
                    output.status.code(),
                    &stderr[..stderr.len().min(200)]
                );
                false
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("openclaw CLI not found at '{}'. Install OpenClaw or set openclaw_command in config.", self.bin);
                false
            }
            Ok(Err(e)) => {
                warn!("OpenClaw send error: {e}");
                false
            }
            Err(_) => {
                warn!("OpenClaw send timed out (15s)");
                false
            }
        }
    }
}

fn format_message(alert: &AlertEvent) -> String {
    if let Some(custom) = &alert.rule.custom_message {
        return custom.clone();
    }
    let mut parts = vec![
        format!("[{}] {}", alert.rule.name, alert.evaluation.reasoning),
        format!("Confidence: {:.0}%", alert.evaluation.confidence * 100.0),
    ];
    if !alert.scene_summary.is_empty() {
        let truncated: String = alert.scene_summary.chars().take(200).collect();
        parts.push(format!("Scene: {truncated}"));
    }
    parts.join("\n")
}

fn which(name: &str) -> Option<String> {
    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|dir| dir.join(name))
            .find(|p| p.exists())
            .map(|p| p.to_string_lossy().into_owned())
    })
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
            scene_summary: "a person standing at the door, holding a package".to_string(),
            frame_base64: None,
        }
    }

    #[test]
    fn format_message_uses_custom_message_when_set() {
        assert_eq!(format_message(&sample_alert(Some("door opened"))), "door opened");
    }

    #[test]
    fn format_message_default_includes_scene_summary() {
        let msg = format_message(&sample_alert(None));
        assert!(msg.contains("Scene: a person standing at the door"));
    }

    #[tokio::test]
    async fn notify_without_channel_returns_false() {
        let notifier = OpenClawNotifier::new("", "123", "openclaw");
        assert!(!notifier.notify(&sample_alert(None), None, None).await);
    }

    #[tokio::test]
    async fn notify_with_missing_binary_does_not_panic() {
        let notifier = OpenClawNotifier::new("telegram", "123", "/nonexistent/openclaw-binary-070");
        assert!(!notifier.notify(&sample_alert(None), None, None).await);
    }
}
