//! Maps `CameraConfig` entries to concrete `CameraHandle`s and owns the
//! background task that actually pulls bytes off an HTTP-MJPEG stream.
//!
//! Only two backends are concretely implemented: `HttpMjpegSource` and
//! `PushedCloudSource`. USB/RTSP camera configs are accepted (so existing
//! config files don't fail to parse) but are reported as unsupported at
//! camera-open time with a friendly error, the same way any configured
//! backend without a driver behind it would fail open rather than parse.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use physical_mcp_core::camera::source::{reconnect_delay, HttpMjpegSource, PushedCloudSource};
use physical_mcp_core::camera::{CameraHealth, CameraSource, Frame, FrameBuffer};
use physical_mcp_core::config::{CameraConfig, ChangeDetectionConfig, SamplingConfig};
use physical_mcp_core::friendly_errors::friendly_camera_error;
use physical_mcp_core::perception::{ChangeDetector, ChangeThresholds, FrameSampler, SamplerConfig, SceneState};
use tokio::sync::Mutex;

use crate::state::CameraHandle;
use crate::state::CameraRuntime;

const MJPEG_POLL_INTERVAL: Duration = Duration::from_millis(200);
const MJPEG_OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds a `CameraRuntime` for one config entry, or `None` (with a
/// friendly warning logged) when the camera kind has no concrete backend
/// in this build.
pub fn build_camera_runtime(
    config: &CameraConfig,
    buffer_size: usize,
    thresholds: &ChangeDetectionConfig,
    sampling: &SamplingConfig,
) -> Option<CameraRuntime> {
    let handle = match config.kind.as_str() {
        "http_mjpeg" | "mjpeg" => {
            let url = match &config.url {
                Some(u) if !u.is_empty() => u.clone(),
                _ => {
                    warn!("camera {} is type http_mjpeg but has no url configured", config.id);
                    return None;
                }
            };
            CameraHandle::HttpMjpeg(HttpMjpegSource::new(url, 5))
        }
        "cloud" | "pushed_cloud" => CameraHandle::PushedCloud(PushedCloudSource::new(config.id.clone(), None)),
        other => {
            let friendly = friendly_camera_error(&format!(
                "camera type '{other}' has no driver in this build (only http_mjpeg and cloud cameras are supported)"
            ));
            warn!("{}", friendly.format());
            return None;
        }
    };

    Some(CameraRuntime {
        config: config.clone(),
        handle: Mutex::new(handle),
        buffer: FrameBuffer::new(buffer_size),
        scene: Mutex::new(SceneState::default()),
        health: Mutex::new(CameraHealth::starting(config.id.clone(), config.name.clone())),
        detector: Mutex::new(ChangeDetector::new(ChangeThresholds {
            minor: thresholds.minor_threshold,
            moderate: thresholds.moderate_threshold,
            major: thresholds.major_threshold,
        })),
        sampler: Mutex::new(FrameSampler::new(SamplerConfig {
            heartbeat_interval_secs: sampling.heartbeat_interval,
            debounce_secs: sampling.debounce_seconds,
            cooldown_secs: sampling.cooldown_seconds,
        })),
    })
}

/// Opens the camera's backend and, for HTTP-MJPEG sources, spawns the
/// dedicated stream-reading task the core crate's `ingest()` comment says
/// something external must drive. Pushed-cloud cameras need no background
/// task — frames arrive via the push-ingress HTTP endpoint.
pub async fn open_camera(runtime: &Arc<CameraRuntime>) -> Result<Option<tokio::task::JoinHandle<()>>, String> {
    let opened = {
        let mut handle = runtime.handle.lock().await;
        tokio::time::timeout(MJPEG_OPEN_TIMEOUT, handle.open())
            .await
            .map_err(|_| "camera open timed out".to_string())?
    };
    opened.map_err(|e| e.to_string())?;

    let task = {
        let handle = runtime.handle.lock().await;
        match &*handle {
            CameraHandle::HttpMjpeg(_) => Some(spawn_mjpeg_puller(runtime.clone())),
            CameraHandle::PushedCloud(_) => None,
        }
    };
    Ok(task)
}

/// Repeatedly pulls one JPEG frame out of an HTTP-MJPEG multipart stream
/// and stores it via `HttpMjpegSource::ingest`. Reconnects with linear
/// backoff on failure; never exits — cancellation (dropping the
/// `JoinHandle`) is the only way out.
fn spawn_mjpeg_puller(runtime: Arc<CameraRuntime>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let url = {
            let handle = runtime.handle.lock().await;
            match &*handle {
                CameraHandle::HttpMjpeg(s) => s.masked_url(),
                _ => return,
            }
        };
        let real_url = runtime.config.url.clone().unwrap_or_default();
        info!("camera {}: starting MJPEG puller for {}", runtime.config.id, url);

        let client = reqwest::Client::new();
        let mut attempt: u32 = 0;

        loop {
            match fetch_one_mjpeg_frame(&client, &real_url).await {
                Ok(bytes) => {
                    attempt = 0;
                    let seq = 0; // ingest() assigns the real sequence number.
                    match Frame::decode_jpeg(&bytes, runtime.config.id.clone(), seq) {
                        Ok(frame) => {
                            let handle = runtime.handle.lock().await;
                            if let CameraHandle::HttpMjpeg(s) = &*handle {
                                s.ingest(frame).await;
                            }
                        }
                        Err(e) => warn!("camera {}: decode failed: {e}", runtime.config.id),
                    }
                    tokio::time::sleep(MJPEG_POLL_INTERVAL).await;
                }
                Err(e) => {
                    attempt += 1;
                    warn!("camera {}: mjpeg fetch failed (attempt {attempt}): {e}", runtime.config.id);
                    let delay = reconnect_delay(Duration::from_secs(1), attempt.min(5));
                    tokio::time::sleep(delay).await;
                }
            }
        }
    })
}

/// Reads exactly one JPEG part from a `multipart/x-mixed-replace` MJPEG
/// response: find a `Content-Length` header, skip to it, read that many
/// bytes. Simple boundary scanning is sufficient here since most IP
/// cameras emit a well-formed boundary+headers+body+boundary cycle.
async fn fetch_one_mjpeg_frame(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, String> {
    use futures_util::StreamExt;

    let resp = client
        .get(url)
        .timeout(Duration::from_secs(10))
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if !resp.status().is_success() {
        return Err(format!("http status {}", resp.status()));
    }

    let mut stream = resp.bytes_stream();
    let mut acc: Vec<u8> = Vec::new();
    let marker_start = b"\xff\xd8";
    let marker_end = b"\xff\xd9";

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| e.to_string())?;
        acc.extend_from_slice(&chunk);
        if acc.len() > 8 * 1024 * 1024 {
            return Err("mjpeg frame exceeded 8MB without a terminator".to_string());
        }
        if let Some(start) = find_subslice(&acc, marker_start) {
            if let Some(end_rel) = find_subslice(&acc[start..], marker_end) {
                let end = start + end_rel + marker_end.len();
                return Ok(acc[start..end].to_vec());
            }
        }
    }
    Err("stream ended before a full JPEG frame was read".to_string())
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
