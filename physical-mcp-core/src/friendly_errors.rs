//! Consumer-friendly error messages: maps technical failures onto
//! human-readable titles and actionable fix steps for CLI/status output.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FriendlyError {
    pub title: String,
    pub message: String,
    pub fix: String,
    pub docs_url: String,
}

impl FriendlyError {
    fn new(title: &str, message: impl Into<String>, fix: &str) -> Self {
        FriendlyError {
            title: title.to_string(),
            message: message.into(),
            fix: fix.to_string(),
            docs_url: String::new(),
        }
    }

    pub fn format(&self) -> String {
        let mut lines = vec![
            format!("warning: {}", self.title),
            format!("   {}", self.message),
            String::new(),
            "How to fix:".to_string(),
        ];
        for line in self.fix.split('\n') {
            lines.push(format!("   {line}"));
        }
        if !self.docs_url.is_empty() {
            lines.push(String::new());
            lines.push(format!("   More info: {}", self.docs_url));
        }
        lines.join("\n")
    }
}

pub fn friendly_camera_error(error: &str) -> FriendlyError {
    let msg = error.to_lowercase();

    if msg.contains("not authorized") || msg.contains("permission") || msg.contains("tcc") {
        return match std::env::consts::OS {
            "macos" => FriendlyError::new(
                "Camera permission needed",
                "macOS is blocking camera access for this app.",
                "Open System Settings > Privacy & Security > Camera, then enable access for \
                 your terminal app (Terminal, iTerm2, VS Code, etc.). You may need to restart \
                 the app.",
            ),
            "linux" => FriendlyError::new(
                "Camera permission needed",
                "Linux is blocking camera access.",
                "Make sure your user is in the 'video' group: sudo usermod -aG video $USER, \
                 then log out and back in.",
            ),
            _ => FriendlyError::new(
                "Camera permission denied",
                "The system is blocking camera access.",
                "Check your operating system's privacy settings for camera access.",
            ),
        };
    }

    if msg.contains("rtsp") || msg.contains("stream") {
        return FriendlyError::new(
            "Camera stream not responding",
            "Could not connect to the camera's video stream.",
            "Check that your camera is powered on and connected to WiFi. Verify the RTSP URL \
             is correct. Common formats:\n  rtsp://IP:554/ch0_0.h264\n  \
             rtsp://admin:password@IP:554/stream\nTry 'physical-mcp discover' to scan for \
             cameras.",
        );
    }

    if msg.contains("cannot open") || msg.contains("no camera") || msg.contains("device not found")
    {
        return FriendlyError::new(
            "Camera not found",
            "No camera was detected on this device.",
            "Make sure your camera is plugged in and recognized by your system. Try a \
             different USB port. For IP cameras, check that the camera is powered on and \
             connected to your WiFi network.",
        );
    }

    if msg.contains("timeout") || msg.contains("timed out") {
        return FriendlyError::new(
            "Camera timed out",
            "The camera took too long to respond.",
            "The camera may be busy or on a slow network. Try:\n1. Restart the camera (unplug, \
             wait 10 seconds, plug back in)\n2. Move the camera closer to your WiFi router\n3. \
             Check if other devices can reach the camera",
        );
    }

    FriendlyError::new(
        "Camera error",
        format!("Something went wrong with the camera: {error}"),
        "Try restarting physical-mcp and your camera. If the issue persists, run \
         'physical-mcp doctor' for diagnostics.",
    )
}

pub fn friendly_provider_error(error: &str) -> FriendlyError {
    let msg = error.to_lowercase();

    if msg.contains("auth") || msg.contains("api key") || msg.contains("401") || msg.contains("403")
    {
        return FriendlyError::new(
            "Vision provider key invalid",
            "Your AI vision provider API key was rejected.",
            "Check your API key in ~/.config/physical-mcp/config.yaml under the 'reasoning' \
             section. Keys may have expired or been revoked. Get a new key from your \
             provider's dashboard.",
        );
    }

    if msg.contains("rate") || msg.contains("429") || msg.contains("quota") || msg.contains("limit")
    {
        return FriendlyError::new(
            "AI provider rate limit",
            "Too many requests to the AI vision provider.",
            "The system will automatically retry with backoff. If this keeps happening:\n1. \
             Reduce the number of active cameras\n2. Increase cooldown_seconds on your rules\n3. \
             Upgrade your API plan or switch to a provider with higher limits",
        );
    }

    if msg.contains("no") && msg.contains("provider") || msg.contains("not configured") {
        return FriendlyError::new(
            "No AI vision provider set up",
            "physical-mcp needs an AI provider to analyze camera frames.",
            "Run 'physical-mcp setup' to configure a vision provider, or add one to \
             ~/.config/physical-mcp/config.yaml:\n\n  reasoning:\n    provider: google\n    \
             api_key: YOUR_API_KEY\n\nSupported providers: google (Gemini), openai (GPT-4), \
             anthropic (Claude).",
        );
    }

    FriendlyError::new(
        "AI vision error",
        format!("The AI vision provider returned an error: {error}"),
        "This is usually temporary. The system will retry automatically. If it persists, try \
         'physical-mcp doctor'.",
    )
}

pub fn friendly_config_error(error: &str) -> FriendlyError {
    let msg = error.to_lowercase();

    if msg.contains("yaml") || msg.contains("parse") || msg.contains("invalid") {
        return FriendlyError::new(
            "Configuration file error",
            "The configuration file has a formatting issue.",
            "Check ~/.config/physical-mcp/config.yaml for syntax errors. Common issues:\n- \
             Missing spaces after colons (use 'key: value' not 'key:value')\n- Incorrect \
             indentation (use 2 spaces, not tabs)\n- Missing quotes around special \
             characters\nRun 'physical-mcp doctor' to validate your config.",
        );
    }

    FriendlyError::new(
        "Configuration error",
        format!("There's a problem with your setup: {error}"),
        "Run 'physical-mcp setup' to reconfigure, or check ~/.config/physical-mcp/config.yaml",
    )
}

pub fn friendly_notification_error(error: &str, notification_type: &str) -> FriendlyError {
    let msg = error.to_lowercase();

    if notification_type == "telegram" || msg.contains("telegram") {
        if msg.contains("401") || msg.contains("unauthorized") {
            return FriendlyError::new(
                "Telegram bot token invalid",
                "Your Telegram bot token was rejected.",
                "1. Open Telegram and message @BotFather\n2. Use /mybots to check your bot\n3. \
                 If needed, use /revoke to get a new token\n4. Update TELEGRAM_BOT_TOKEN in \
                 your config",
            );
        }
        if msg.contains("chat not found") || msg.contains("chat_id") {
            return FriendlyError::new(
                "Telegram chat not found",
                "The Telegram chat ID is incorrect.",
                "1. Message your bot on Telegram first\n2. Visit: \
                 api.telegram.org/bot<TOKEN>/getUpdates\n3. Find your chat.id in the \
                 response\n4. Update TELEGRAM_CHAT_ID in your config",
            );
        }
    }

    if notification_type == "discord" || msg.contains("discord") {
        return FriendlyError::new(
            "Discord webhook error",
            "Could not send alert to Discord.",
            "Check your Discord webhook URL:\n1. In Discord, go to Channel Settings > \
             Integrations > Webhooks\n2. Copy the webhook URL\n3. Update DISCORD_WEBHOOK_URL \
             in your config",
        );
    }

    if notification_type == "ntfy" || msg.contains("ntfy") {
        return FriendlyError::new(
            "Push notification error",
            "Could not send push notification via ntfy.",
            "1. Install the ntfy app on your phone (ntfy.sh)\n2. Subscribe to your topic in \
             the app\n3. Make sure your topic matches NTFY_TOPIC in config",
        );
    }

    FriendlyError::new(
        "Notification error",
        format!("Could not send alert: {error}"),
        "Check your notification settings in the configuration file.",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_message_maps_to_rate_limit_error() {
        let err = friendly_provider_error("429 Too Many Requests");
        assert_eq!(err.title, "AI provider rate limit");
    }

    #[test]
    fn auth_message_maps_to_key_invalid() {
        let err = friendly_provider_error("401 unauthorized");
        assert_eq!(err.title, "Vision provider key invalid");
    }

    #[test]
    fn rtsp_message_maps_before_generic_cannot_open() {
        let err = friendly_camera_error("cannot open rtsp stream: connection refused");
        assert_eq!(err.title, "Camera stream not responding");
    }

    #[test]
    fn unknown_camera_error_falls_back_to_generic() {
        let err = friendly_camera_error("some unexpected failure");
        assert_eq!(err.title, "Camera error");
    }

    #[test]
    fn telegram_unauthorized_gives_specific_fix() {
        let err = friendly_notification_error("401 unauthorized", "telegram");
        assert_eq!(err.title, "Telegram bot token invalid");
    }

    #[test]
    fn format_includes_title_and_fix_lines() {
        let err = friendly_config_error("invalid yaml");
        let formatted = err.format();
        assert!(formatted.contains("Configuration file error"));
        assert!(formatted.contains("How to fix"));
    }
}
