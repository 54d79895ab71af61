//! Routes triggered-rule alerts to the channel named by the rule's
//! `NotificationTarget`, fanning out across comma-separated
//! channel/target pairs where the target supports it.

use log::{info, warn};

use crate::config::NotificationsConfig;
use crate::rules::{AlertEvent, NotificationType};

use super::desktop::DesktopNotifier;
use super::discord::DiscordWebhookNotifier;
use super::ntfy::NtfyNotifier;
use super::openclaw::OpenClawNotifier;
use super::slack::SlackWebhookNotifier;
use super::telegram::TelegramNotifier;
use super::webhook::WebhookNotifier;

const DESKTOP_MIN_INTERVAL_SECS: f64 = 10.0;

pub struct NotificationDispatcher {
    config: NotificationsConfig,
    webhook: WebhookNotifier,
    desktop: Option<DesktopNotifier>,
    ntfy: NtfyNotifier,
    telegram: TelegramNotifier,
    discord: DiscordWebhookNotifier,
    slack: SlackWebhookNotifier,
    openclaw: OpenClawNotifier,
}

impl NotificationDispatcher {
    pub fn new(config: NotificationsConfig) -> Self {
        let desktop = config.desktop_enabled.then(|| DesktopNotifier::new(DESKTOP_MIN_INTERVAL_SECS));
        NotificationDispatcher {
            webhook: WebhookNotifier::new(config.webhook_url.clone()),
            ntfy: NtfyNotifier::new(config.ntfy_topic.clone(), config.ntfy_server_url.clone()),
            telegram: TelegramNotifier::new(config.telegram_bot_token.clone(), config.telegram_chat_id.clone()),
            discord: DiscordWebhookNotifier::new(config.discord_webhook_url.clone()),
            slack: SlackWebhookNotifier::new(config.slack_webhook_url.clone()),
            openclaw: OpenClawNotifier::new("", "", &config.openclaw_command),
            desktop,
            config,
        }
    }

    /// Dispatch an alert based on its rule's configured notification target.
    pub async fn dispatch(&self, alert: &AlertEvent) {
        let target = &alert.rule.notification;
        info!(
            "Dispatching notification: type={:?}, rule={}, desktop_enabled={}",
            target.kind,
            alert.rule.name,
            self.desktop.is_some()
        );

        match target.kind {
            NotificationType::Webhook => {
                let url = target.url.clone().filter(|u| !u.is_empty()).or_else(|| {
                    (!self.config.webhook_url.is_empty()).then(|| self.config.webhook_url.clone())
                });
                if let Some(url) = url {
                    self.webhook.notify(alert, Some(&url)).await;
                }
            }
            NotificationType::Desktop => {
                if let Some(desktop) = &self.desktop {
                    let title = format!("[{}] {}", alert.rule.priority.as_str().to_uppercase(), alert.rule.name);
                    desktop.notify(&title, &alert.evaluation.reasoning);
                } else {
                    warn!("Desktop notification requested but desktop_enabled=false");
                }
            }
            NotificationType::Ntfy => {
                let topic = target.channel.clone().filter(|c| !c.is_empty()).unwrap_or_else(|| self.config.ntfy_topic.clone());
                self.ntfy.notify(alert, Some(&topic)).await;
                if let Some(desktop) = &self.desktop {
                    desktop.notify(&alert.rule.name, &alert.evaluation.reasoning);
                }
            }
            NotificationType::Telegram => {
                for (_, chat) in target.fanout_pairs() {
                    self.telegram.notify(alert, chat.as_deref()).await;
                }
            }
            NotificationType::Discord => {
                let url = target.url.clone();
                self.discord.notify(alert, url.as_deref()).await;
            }
            NotificationType::Slack => {
                let url = target.url.clone();
                self.slack.notify(alert, url.as_deref()).await;
            }
            NotificationType::Openclaw => {
                for (channel, dest) in target.fanout_pairs() {
                    self.openclaw.notify(alert, channel.as_deref(), dest.as_deref()).await;
                }
            }
            NotificationType::Local => {
                // No-op: the MCP tool response IS the notification.
            }
        }
    }

    /// Lightweight pre-evaluation notification used by the perception loop
    /// before any rule has actually fired.
    pub async fn notify_scene_change(&self, change_level: &str, rule_names: &[String], frame_base64: Option<&str>) -> bool {
        if self.config.ntfy_topic.is_empty() {
            return false;
        }
        self.ntfy
            .notify_scene_change(&self.config.ntfy_topic, change_level, rule_names, frame_base64)
            .await
    }

    pub fn notify_desktop(&self, title: &str, body: &str) -> bool {
        match &self.desktop {
            Some(desktop) => desktop.notify(title, body),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotificationsConfig;
    use crate::rules::{AlertEvent, NotificationTarget, RuleEvaluation, WatchRule};

    fn sample_alert(kind: NotificationType) -> AlertEvent {
        let mut rule = WatchRule::new("Front door", "a person is at the door");
        rule.notification = NotificationTarget { kind, url: None, channel: None, target: None };
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
    async fn local_dispatch_is_a_noop() {
        let dispatcher = NotificationDispatcher::new(NotificationsConfig::default());
        dispatcher.dispatch(&sample_alert(NotificationType::Local)).await;
    }

    #[tokio::test]
    async fn desktop_dispatch_without_target_configured_respects_disabled_flag() {
        let mut config = NotificationsConfig::default();
        config.desktop_enabled = false;
        let dispatcher = NotificationDispatcher::new(config);
        dispatcher.dispatch(&sample_alert(NotificationType::Desktop)).await;
        assert!(!dispatcher.notify_desktop("t", "b"));
    }

    #[tokio::test]
    async fn scene_change_notification_without_topic_returns_false() {
        let dispatcher = NotificationDispatcher::new(NotificationsConfig::default());
        assert!(!dispatcher.notify_scene_change("major", &["rule1".to_string()], None).await);
    }
}
