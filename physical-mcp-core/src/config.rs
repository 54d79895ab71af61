//! Configuration loading and validation: nested YAML with `${ENVVAR}`
//! interpolation, tolerant defaults, friendly error messages on parse
//! failure.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::friendly_errors::friendly_config_error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "default_camera_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default = "default_camera_type")]
    pub kind: String,
    #[serde(default)]
    pub device_index: u32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_camera_id() -> String {
    "usb:0".to_string()
}
fn default_camera_type() -> String {
    "usb".to_string()
}
fn default_width() -> u32 {
    1280
}
fn default_height() -> u32 {
    720
}
fn default_true() -> bool {
    true
}

impl Default for CameraConfig {
    fn default() -> Self {
        CameraConfig {
            id: default_camera_id(),
            name: String::new(),
            kind: default_camera_type(),
            device_index: 0,
            width: default_width(),
            height: default_height(),
            url: None,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeDetectionConfig {
    #[serde(default = "default_minor")]
    pub minor_threshold: u32,
    #[serde(default = "default_moderate")]
    pub moderate_threshold: u32,
    #[serde(default = "default_major")]
    pub major_threshold: u32,
}

fn default_minor() -> u32 {
    5
}
fn default_moderate() -> u32 {
    12
}
fn default_major() -> u32 {
    25
}

impl Default for ChangeDetectionConfig {
    fn default() -> Self {
        ChangeDetectionConfig {
            minor_threshold: default_minor(),
            moderate_threshold: default_moderate(),
            major_threshold: default_major(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    #[serde(default = "default_heartbeat")]
    pub heartbeat_interval: f64,
    #[serde(default = "default_debounce")]
    pub debounce_seconds: f64,
    #[serde(default = "default_cooldown")]
    pub cooldown_seconds: f64,
}

fn default_heartbeat() -> f64 {
    300.0
}
fn default_debounce() -> f64 {
    3.0
}
fn default_cooldown() -> f64 {
    10.0
}

impl Default for SamplingConfig {
    fn default() -> Self {
        SamplingConfig {
            heartbeat_interval: default_heartbeat(),
            debounce_seconds: default_debounce(),
            cooldown_seconds: default_cooldown(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerceptionConfig {
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_capture_fps")]
    pub capture_fps: u32,
    #[serde(default)]
    pub change_detection: ChangeDetectionConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
}

fn default_buffer_size() -> usize {
    300
}
fn default_capture_fps() -> u32 {
    2
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        PerceptionConfig {
            buffer_size: default_buffer_size(),
            capture_fps: default_capture_fps(),
            change_detection: ChangeDetectionConfig::default(),
            sampling: SamplingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReasoningConfig {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_image_quality")]
    pub image_quality: u8,
    #[serde(default = "default_max_thumbnail_dim")]
    pub max_thumbnail_dim: u32,
}

fn default_image_quality() -> u8 {
    60
}
fn default_max_thumbnail_dim() -> u32 {
    640
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostControlConfig {
    #[serde(default)]
    pub daily_budget_usd: f64,
    #[serde(default = "default_max_per_hour")]
    pub max_analyses_per_hour: u32,
}

fn default_max_per_hour() -> u32 {
    120
}

impl Default for CostControlConfig {
    fn default() -> Self {
        CostControlConfig {
            daily_budget_usd: 0.0,
            max_analyses_per_hour: default_max_per_hour(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_transport")]
    pub transport: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_transport() -> String {
    "streamable-http".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_server_port() -> u16 {
    8400
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            transport: default_transport(),
            host: default_host(),
            port: default_server_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_notification_type")]
    pub default_type: String,
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default = "default_true")]
    pub desktop_enabled: bool,
    #[serde(default)]
    pub ntfy_topic: String,
    #[serde(default = "default_ntfy_server")]
    pub ntfy_server_url: String,
    #[serde(default)]
    pub telegram_bot_token: String,
    #[serde(default)]
    pub telegram_chat_id: String,
    #[serde(default)]
    pub discord_webhook_url: String,
    #[serde(default)]
    pub slack_webhook_url: String,
    #[serde(default)]
    pub openclaw_command: String,
}

fn default_notification_type() -> String {
    "local".to_string()
}
fn default_ntfy_server() -> String {
    "https://ntfy.sh".to_string()
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        NotificationsConfig {
            default_type: default_notification_type(),
            webhook_url: String::new(),
            desktop_enabled: true,
            ntfy_topic: String::new(),
            ntfy_server_url: default_ntfy_server(),
            telegram_bot_token: String::new(),
            telegram_chat_id: String::new(),
            discord_webhook_url: String::new(),
            slack_webhook_url: String::new(),
            openclaw_command: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_vision_api_port")]
    pub port: u16,
}

fn default_vision_api_port() -> u16 {
    8090
}

impl Default for VisionApiConfig {
    fn default() -> Self {
        VisionApiConfig {
            enabled: true,
            host: default_host(),
            port: default_vision_api_port(),
        }
    }
}

fn default_rules_file() -> String {
    "~/.physical-mcp/rules.yaml".to_string()
}
fn default_memory_file() -> String {
    "~/.physical-mcp/memory.md".to_string()
}
fn default_cameras() -> Vec<CameraConfig> {
    vec![CameraConfig::default()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "default_cameras")]
    pub cameras: Vec<CameraConfig>,
    #[serde(default)]
    pub perception: PerceptionConfig,
    #[serde(default)]
    pub reasoning: ReasoningConfig,
    #[serde(default)]
    pub cost_control: CostControlConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub vision_api: VisionApiConfig,
    #[serde(default = "default_rules_file")]
    pub rules_file: String,
    #[serde(default = "default_memory_file")]
    pub memory_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig::default(),
            cameras: default_cameras(),
            perception: PerceptionConfig::default(),
            reasoning: ReasoningConfig::default(),
            cost_control: CostControlConfig::default(),
            notifications: NotificationsConfig::default(),
            vision_api: VisionApiConfig::default(),
            rules_file: default_rules_file(),
            memory_file: default_memory_file(),
        }
    }
}

fn interpolate_env_vars(text: &str) -> String {
    let re = Regex::new(r"\$\{(\w+)\}").expect("static pattern is valid");
    re.replace_all(text, |caps: &regex::Captures| {
        std::env::var(&caps[1]).unwrap_or_default()
    })
    .into_owned()
}

fn expand_user(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

/// Home directory, falling back to `/tmp` when `$HOME` is unset (e.g. some
/// container runtimes) rather than panicking.
pub fn home_dir() -> PathBuf {
    dirs_home().unwrap_or_else(|| PathBuf::from("/tmp"))
}

impl Config {
    pub fn default_path() -> PathBuf {
        expand_user("~/.physical-mcp/config.yaml")
    }

    pub fn resolved_rules_path(&self) -> PathBuf {
        expand_user(&self.rules_file)
    }

    pub fn resolved_memory_path(&self) -> PathBuf {
        expand_user(&self.memory_file)
    }

    /// Loads config from `path` (or the default path). A missing file is
    /// not an error — it returns defaults, matching first-run behavior.
    pub fn from_file(path: Option<&Path>) -> Result<Config, String> {
        let path = match path {
            Some(p) => expand_user(&p.to_string_lossy()),
            None => Self::default_path(),
        };

        let raw = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Config::default()),
            Err(e) => return Err(friendly_config_error(&e.to_string()).format()),
        };

        if raw.trim().is_empty() {
            return Ok(Config::default());
        }

        let interpolated = interpolate_env_vars(&raw);
        serde_yaml::from_str(&interpolated)
            .map_err(|e| friendly_config_error(&e.to_string()).format())
    }

    /// Serializes to YAML. The in-memory `api_key` (possibly an
    /// interpolated env value) is written back verbatim — operators are
    /// expected to keep `${VAR}` references in the file they hand-edit,
    /// not ones this process round-trips.
    pub fn to_yaml_string(&self) -> Result<String, String> {
        serde_yaml::to_string(self).map_err(|e| format!("could not serialize config: {e}"))
    }

    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf, String> {
        let path = match path {
            Some(p) => expand_user(&p.to_string_lossy()),
            None => Self::default_path(),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("could not create {}: {e}", parent.display()))?;
        }
        let text = self.to_yaml_string()?;
        std::fs::write(&path, text).map_err(|e| format!("could not write {}: {e}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_one_usb_camera() {
        let config = Config::default();
        assert_eq!(config.cameras.len(), 1);
        assert_eq!(config.cameras[0].id, "usb:0");
    }

    #[test]
    fn interpolate_env_vars_substitutes_known_var() {
        std::env::set_var("PHYSICAL_MCP_TEST_KEY", "secret123");
        let out = interpolate_env_vars("api_key: ${PHYSICAL_MCP_TEST_KEY}");
        assert_eq!(out, "api_key: secret123");
        std::env::remove_var("PHYSICAL_MCP_TEST_KEY");
    }

    #[test]
    fn interpolate_env_vars_missing_var_becomes_empty() {
        let out = interpolate_env_vars("api_key: ${PHYSICAL_MCP_DOES_NOT_EXIST}");
        assert_eq!(out, "api_key: ");
    }

    #[test]
    fn from_file_missing_path_returns_defaults() {
        let path = PathBuf::from("/tmp/physical-mcp-config-does-not-exist.yaml");
        let config = Config::from_file(Some(&path)).unwrap();
        assert_eq!(config.server.port, 8400);
    }

    #[test]
    fn from_file_malformed_yaml_returns_friendly_error() {
        let mut path = std::env::temp_dir();
        path.push(format!("physical-mcp-bad-config-{}.yaml", std::process::id()));
        std::fs::write(&path, "server:\n  port: [not, a, port").unwrap();
        let result = Config::from_file(Some(&path));
        assert!(result.is_err());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn save_then_load_round_trips() {
        let mut path = std::env::temp_dir();
        path.push(format!("physical-mcp-roundtrip-{}.yaml", std::process::id()));
        let mut config = Config::default();
        config.reasoning.provider = "google".to_string();
        config.save(Some(&path)).unwrap();
        let loaded = Config::from_file(Some(&path)).unwrap();
        assert_eq!(loaded.reasoning.provider, "google");
        let _ = std::fs::remove_file(&path);
    }
}
