//! Cross-platform desktop notifications via OS-native commands.
//!
//! macOS: `terminal-notifier` if installed, `osascript` fallback.
//! Linux: `notify-send` (libnotify). Other platforms: unsupported.
//! Fire-and-forget — spawned and never waited on.

use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::time::Instant;

use log::{debug, info, warn};

/// Rate-limited desktop notifier: at most one notification per
/// `min_interval` to prevent spam from rapid scene changes.
pub struct DesktopNotifier {
    min_interval: std::time::Duration,
    last_sent: Mutex<Option<Instant>>,
    has_terminal_notifier: bool,
}

impl DesktopNotifier {
    pub fn new(min_interval_secs: f64) -> Self {
        DesktopNotifier {
            min_interval: std::time::Duration::from_secs_f64(min_interval_secs),
            last_sent: Mutex::new(None),
            has_terminal_notifier: std::env::consts::OS == "macos" && which("terminal-notifier"),
        }
    }

    fn should_send(&self) -> bool {
        let mut last = self.last_sent.lock().unwrap();
        let now = Instant::now();
        if let Some(prev) = *last {
            if now.duration_since(prev) < self.min_interval {
                return false;
            }
        }
        *last = Some(now);
        true
    }

    /// Send a desktop notification. Returns true if dispatched, false if
    /// rate-limited or unsupported on this platform.
    pub fn notify(&self, title: &str, body: &str) -> bool {
        if !self.should_send() {
            debug!("Desktop notification rate-limited, skipping");
            return false;
        }

        info!("Desktop notification: {title}");
        let result = match std::env::consts::OS {
            "macos" => self.notify_macos(title, body),
            "linux" => notify_linux(title, body),
            other => {
                debug!("Desktop notifications unsupported on {other}");
                return false;
            }
        };

        if let Err(e) = result {
            warn!("Desktop notification error: {e}");
            return false;
        }
        true
    }

    fn notify_macos(&self, title: &str, body: &str) -> std::io::Result<()> {
        if self.has_terminal_notifier {
            Command::new("terminal-notifier")
                .args(["-title", title, "-message", body, "-sound", "default", "-group", "physical-mcp"])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()?;
        } else {
            let script = format!(
                "display notification \"{}\" with title \"{}\"",
                escape(body),
                escape(title)
            );
            Command::new("osascript")
                .args(["-e", &script])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()?;
        }
        Ok(())
    }
}

fn notify_linux(title: &str, body: &str) -> std::io::Result<()> {
    Command::new("notify-send")
        .args(["--app-name=Physical MCP", title, body])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    Ok(())
}

fn which(name: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(name).exists()))
        .unwrap_or(false)
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"").replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits_rapid_calls() {
        let notifier = DesktopNotifier::new(60.0);
        assert!(notifier.should_send());
        assert!(!notifier.should_send());
    }

    #[test]
    fn escape_handles_quotes_and_backslashes() {
        assert_eq!(escape(r#"a"b\c'd"#), r#"a\"b\\c\'d"#);
    }
}
