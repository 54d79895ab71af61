//! Shared daemon state: the single record every HTTP handler, MCP tool,
//! and perception loop reads from or publishes into.
//!
//! Hot-reloadable pieces sit behind `ArcSwap`/async `Mutex`, everything
//! else is a plain field. No component here owns another; the perception
//! loop and the MCP/HTTP layers only ever touch this record or publish
//! through the `EventBus` — nothing holds a reference back into a task.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use physical_mcp_core::alert_queue::AlertQueue;
use physical_mcp_core::camera::{CameraHealth, CameraSource, Frame, FrameBuffer};
use physical_mcp_core::camera::health::{default_camera_health, normalize_camera_health};
use physical_mcp_core::camera::source::{HttpMjpegSource, PushedCloudSource, SourceError};
use physical_mcp_core::config::{CameraConfig, Config};
use physical_mcp_core::events::EventBus;
use physical_mcp_core::mcp_logging::McpLogger;
use physical_mcp_core::memory::MemoryStore;
use physical_mcp_core::notifications::NotificationDispatcher;
use physical_mcp_core::perception::{ChangeDetector, FrameSampler, SceneState};
use physical_mcp_core::reasoning::FrameAnalyzer;
use physical_mcp_core::replay::ReplayLog;
use physical_mcp_core::rules::{RulesEngine, RulesStore};
use physical_mcp_core::stats::StatsTracker;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Enum-dispatch wrapper around the two concretely-implemented camera
/// backends, mirroring `AnyProvider` in `physical-mcp-core::reasoning::provider`
/// — `async fn` in the `CameraSource` trait blocks `dyn` object safety, so
/// call sites match on a tagged variant instead.
pub enum CameraHandle {
    HttpMjpeg(HttpMjpegSource),
    PushedCloud(PushedCloudSource),
}

impl CameraHandle {
    pub async fn open(&mut self) -> Result<(), SourceError> {
        match self {
            CameraHandle::HttpMjpeg(s) => s.open().await,
            CameraHandle::PushedCloud(s) => s.open().await,
        }
    }

    pub async fn close(&mut self) -> Result<(), SourceError> {
        match self {
            CameraHandle::HttpMjpeg(s) => s.close().await,
            CameraHandle::PushedCloud(s) => s.close().await,
        }
    }

    pub async fn grab_frame(&self) -> Result<Frame, SourceError> {
        match self {
            CameraHandle::HttpMjpeg(s) => s.grab_frame().await,
            CameraHandle::PushedCloud(s) => s.grab_frame().await,
        }
    }

    pub fn is_open(&self) -> bool {
        match self {
            CameraHandle::HttpMjpeg(s) => s.is_open(),
            CameraHandle::PushedCloud(s) => s.is_open(),
        }
    }

    pub fn source_id(&self) -> &str {
        match self {
            CameraHandle::HttpMjpeg(s) => s.source_id(),
            CameraHandle::PushedCloud(s) => s.source_id(),
        }
    }

    pub fn as_pushed_cloud(&self) -> Option<&PushedCloudSource> {
        match self {
            CameraHandle::PushedCloud(s) => Some(s),
            _ => None,
        }
    }
}

/// Everything the perception loop and the HTTP/MCP handlers need for one
/// open camera. Each field owns a single lock, per the shared-resource
/// policy; nobody holds two of these at once.
pub struct CameraRuntime {
    pub config: CameraConfig,
    pub handle: Mutex<CameraHandle>,
    pub buffer: FrameBuffer,
    pub scene: Mutex<SceneState>,
    pub health: Mutex<CameraHealth>,
    pub detector: Mutex<ChangeDetector>,
    pub sampler: Mutex<FrameSampler>,
}

impl CameraRuntime {
    pub async fn health_snapshot(&self) -> CameraHealth {
        let health = self.health.lock().await.clone();
        normalize_camera_health(&self.config.id, Some(health))
    }
}

/// A cloud-camera pairing request: created via `POST /cameras`, approved
/// via `POST /cameras/{id}/accept`, then redeemed once by the relay board
/// via `POST /push/register`. Claim codes expire after 15 minutes, per the
/// concurrency section's shared-resource policy.
#[derive(Clone)]
pub struct CloudClaim {
    pub camera_id: String,
    pub camera_name: String,
    pub claim_code: String,
    pub camera_token: Option<String>,
    pub accepted: bool,
    pub created_at: DateTime<Utc>,
}

pub const CLAIM_TTL_SECONDS: i64 = 15 * 60;

impl CloudClaim {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        (now - self.created_at).num_seconds() > CLAIM_TTL_SECONDS
    }
}

/// The daemon's single state record, created once at startup and shared
/// (behind `Arc`) with every HTTP handler, MCP tool, and perception loop.
pub struct DaemonState {
    pub config: Mutex<Config>,
    pub config_path: PathBuf,
    pub cameras: Mutex<HashMap<String, Arc<CameraRuntime>>>,
    pub rules: Mutex<RulesEngine>,
    pub rules_store: RulesStore,
    pub analyzer: Mutex<FrameAnalyzer>,
    pub provider_mode_warned: std::sync::atomic::AtomicBool,
    pub stats: StatsTracker,
    pub alert_queue: AlertQueue,
    pub events: Arc<EventBus>,
    pub replay: ReplayLog,
    pub mcp_logger: Arc<McpLogger>,
    pub memory: MemoryStore,
    pub notifier: NotificationDispatcher,
    pub loop_handles: Mutex<HashMap<String, JoinHandle<()>>>,
    pub cloud_claims: Mutex<HashMap<String, CloudClaim>>,
    pub auth_token: ArcSwapOption<String>,
    pub cached_alert_frame: Mutex<Option<(String, Vec<u8>)>>,
}

impl DaemonState {
    /// Reasoning mode as exposed to REST/MCP consumers: `"server"` when a
    /// vision provider is configured, `"client"` when alerts fall back to
    /// the `AlertQueue`/MCP-sampling path.
    pub async fn reasoning_mode(&self) -> &'static str {
        if self.analyzer.lock().await.has_provider() {
            "server"
        } else {
            "client"
        }
    }

    pub async fn camera_ids(&self) -> Vec<String> {
        self.cameras.lock().await.keys().cloned().collect()
    }

    pub async fn camera(&self, camera_id: &str) -> Option<Arc<CameraRuntime>> {
        self.cameras.lock().await.get(camera_id).cloned()
    }

    /// Resolves a possibly-empty `camera_id` argument (MCP tools and some
    /// REST endpoints treat `""` as "the first/only camera").
    pub async fn resolve_camera(&self, camera_id: &str) -> Option<(String, Arc<CameraRuntime>)> {
        let cameras = self.cameras.lock().await;
        if !camera_id.is_empty() {
            return cameras.get(camera_id).map(|c| (camera_id.to_string(), c.clone()));
        }
        cameras
            .keys()
            .next()
            .map(|id| (id.clone(), cameras[id].clone()))
    }

    pub async fn default_camera_health_view(&self, camera_id: &str) -> CameraHealth {
        match self.camera(camera_id).await {
            Some(cam) => cam.health_snapshot().await,
            None => default_camera_health(camera_id),
        }
    }
}
