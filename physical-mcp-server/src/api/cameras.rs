//! `GET /cameras`, and the cloud-camera claim/accept/reject workflow:
//! `POST /cameras` -> `GET /cameras/pending` -> `POST /cameras/{id}/accept|reject`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use physical_mcp_core::camera::FrameBuffer;
use physical_mcp_core::camera::health::CameraHealth;
use physical_mcp_core::camera::source::PushedCloudSource;
use physical_mcp_core::config::CameraConfig;
use physical_mcp_core::perception::{ChangeDetector, FrameSampler, SceneState};
use physical_mcp_core::rules::models::random_hex;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;

use crate::state::{CameraHandle, CameraRuntime, CloudClaim};

use super::not_found_error;

pub async fn list_cameras(State(state): State<Arc<crate::state::DaemonState>>) -> impl IntoResponse {
    let cameras = state.cameras.lock().await;
    let mut list = Vec::new();
    for (id, cam) in cameras.iter() {
        let health = cam.health_snapshot().await;
        list.push(json!({
            "id": id,
            "name": cam.config.name,
            "type": cam.config.kind,
            "status": health.status,
        }));
    }
    Json(json!({ "cameras": list }))
}

#[derive(Debug, Deserialize)]
pub struct AddCameraRequest {
    #[serde(default)]
    name: String,
}

pub async fn add_cloud_camera(
    State(state): State<Arc<crate::state::DaemonState>>,
    Json(req): Json<AddCameraRequest>,
) -> impl IntoResponse {
    let camera_id = format!("cloud:{}", random_hex(8));
    let claim_code = random_hex(12);
    let name = if req.name.is_empty() {
        camera_id.clone()
    } else {
        req.name
    };

    let claim = CloudClaim {
        camera_id: camera_id.clone(),
        camera_name: name,
        claim_code: claim_code.clone(),
        camera_token: None,
        accepted: false,
        created_at: Utc::now(),
    };
    state.cloud_claims.lock().await.insert(camera_id.clone(), claim);

    Json(json!({ "camera_id": camera_id, "claim_code": claim_code }))
}

pub async fn list_pending(State(state): State<Arc<crate::state::DaemonState>>) -> impl IntoResponse {
    let claims = state.cloud_claims.lock().await;
    let now = Utc::now();
    let pending: Vec<_> = claims
        .values()
        .filter(|c| !c.accepted && !c.is_expired(now))
        .map(|c| {
            json!({
                "camera_id": c.camera_id,
                "camera_name": c.camera_name,
                "claim_code": c.claim_code,
                "created_at": c.created_at,
            })
        })
        .collect();
    Json(json!({ "pending": pending }))
}

pub async fn accept_camera(
    Path(camera_id): Path<String>,
    State(state): State<Arc<crate::state::DaemonState>>,
) -> Response {
    let mut claims = state.cloud_claims.lock().await;
    let Some(claim) = claims.get_mut(&camera_id) else {
        return not_found_error(format!("no pending claim for {camera_id}")).into_response();
    };
    if claim.is_expired(Utc::now()) {
        claims.remove(&camera_id);
        return not_found_error("claim code expired").into_response();
    }

    let token = random_hex(24);
    claim.accepted = true;
    claim.camera_token = Some(token.clone());
    let camera_name = claim.camera_name.clone();
    drop(claims);

    let buffer_size = state.config.lock().await.perception.buffer_size;
    let thresholds = state.config.lock().await.perception.change_detection.clone();
    let sampling = state.config.lock().await.perception.sampling.clone();

    let runtime = Arc::new(CameraRuntime {
        config: CameraConfig {
            id: camera_id.clone(),
            name: camera_name,
            kind: "cloud".to_string(),
            device_index: 0,
            width: 1280,
            height: 720,
            url: None,
            enabled: true,
        },
        handle: Mutex::new(CameraHandle::PushedCloud(PushedCloudSource::new(
            camera_id.clone(),
            Some(token.clone()),
        ))),
        buffer: FrameBuffer::new(buffer_size),
        scene: Mutex::new(SceneState::default()),
        health: Mutex::new(CameraHealth::starting(camera_id.clone(), camera_id.clone())),
        detector: Mutex::new(ChangeDetector::new(physical_mcp_core::perception::ChangeThresholds {
            minor: thresholds.minor_threshold,
            moderate: thresholds.moderate_threshold,
            major: thresholds.major_threshold,
        })),
        sampler: Mutex::new(FrameSampler::new(physical_mcp_core::perception::SamplerConfig {
            heartbeat_interval_secs: sampling.heartbeat_interval,
            debounce_secs: sampling.debounce_seconds,
            cooldown_secs: sampling.cooldown_seconds,
        })),
    });

    state.cameras.lock().await.insert(camera_id.clone(), runtime.clone());

    let handle = tokio::spawn(crate::perception_loop::run(state.clone(), camera_id.clone(), runtime));
    state.loop_handles.lock().await.insert(camera_id.clone(), handle);

    Json(json!({ "camera_id": camera_id, "camera_token": token })).into_response()
}

pub async fn reject_camera(
    Path(camera_id): Path<String>,
    State(state): State<Arc<crate::state::DaemonState>>,
) -> Response {
    let removed = state.cloud_claims.lock().await.remove(&camera_id);
    if removed.is_none() {
        return not_found_error(format!("no pending claim for {camera_id}")).into_response();
    }
    Json(json!({ "rejected": camera_id })).into_response()
}
