//! Shared camera health record — used by both the HTTP API and MCP server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraStatus {
    Starting,
    Running,
    Degraded,
    Backoff,
    Disconnected,
    Unknown,
}

impl Default for CameraStatus {
    fn default() -> Self {
        CameraStatus::Unknown
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CameraHealth {
    pub camera_id: String,
    pub camera_name: String,
    pub consecutive_errors: u32,
    pub backoff_until: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: String,
    pub last_frame_at: Option<DateTime<Utc>>,
    pub status: CameraStatus,
}

impl CameraHealth {
    pub fn starting(camera_id: impl Into<String>, camera_name: impl Into<String>) -> Self {
        CameraHealth {
            camera_id: camera_id.into(),
            camera_name: camera_name.into(),
            status: CameraStatus::Starting,
            ..Default::default()
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_errors = 0;
        self.backoff_until = None;
        self.last_success_at = Some(Utc::now());
        self.last_frame_at = Some(Utc::now());
        self.status = CameraStatus::Running;
    }

    /// Exponential backoff capped at 45s: `now + min(5 * 2^(errors-1), 45s)`.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.consecutive_errors += 1;
        self.last_error = message.into();
        let secs = (5.0 * 2f64.powi(self.consecutive_errors as i32 - 1)).min(45.0);
        self.backoff_until = Some(Utc::now() + chrono::Duration::milliseconds((secs * 1000.0) as i64));
        self.status = if self.consecutive_errors >= 3 {
            CameraStatus::Backoff
        } else {
            CameraStatus::Degraded
        };
    }

    pub fn in_backoff(&self) -> bool {
        match self.backoff_until {
            Some(until) => Utc::now() < until,
            None => false,
        }
    }
}

/// Default fallback shape for a camera with no health data yet.
pub fn default_camera_health(camera_id: &str) -> CameraHealth {
    CameraHealth {
        camera_id: camera_id.to_string(),
        camera_name: camera_id.to_string(),
        status: CameraStatus::Unknown,
        ..Default::default()
    }
}

/// Fill a possibly-partial health record with safe defaults so REST/MCP
/// consumers can always rely on a fully-populated shape.
pub fn normalize_camera_health(camera_id: &str, health: Option<CameraHealth>) -> CameraHealth {
    match health {
        Some(mut h) => {
            if h.camera_id.is_empty() {
                h.camera_id = camera_id.to_string();
            }
            if h.camera_name.is_empty() {
                h.camera_name = h.camera_id.clone();
            }
            h
        }
        None => default_camera_health(camera_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_fills_missing_with_defaults() {
        let h = normalize_camera_health("cam1", None);
        assert_eq!(h.camera_id, "cam1");
        assert_eq!(h.camera_name, "cam1");
        assert_eq!(h.status, CameraStatus::Unknown);
    }

    #[test]
    fn record_error_computes_exponential_backoff() {
        let mut h = CameraHealth::starting("cam1", "Front Door");
        h.record_error("connection reset");
        assert_eq!(h.consecutive_errors, 1);
        assert!(h.in_backoff());

        for _ in 0..10 {
            h.record_error("still down");
        }
        // Capped at 45s regardless of how many consecutive errors.
        let remaining = (h.backoff_until.unwrap() - Utc::now()).num_milliseconds();
        assert!(remaining <= 45_000 && remaining > 0);
    }

    #[test]
    fn record_success_resets_backoff() {
        let mut h = CameraHealth::starting("cam1", "Front Door");
        h.record_error("oops");
        h.record_success();
        assert_eq!(h.consecutive_errors, 0);
        assert!(h.backoff_until.is_none());
        assert_eq!(h.status, CameraStatus::Running);
    }
}
