//! `GET /frame[/{id}]`, `/scene[/{id}]`, `/changes`, `/health[/{id}]`, `/alerts`.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;

use crate::state::DaemonState;

use super::{not_found_error, unavailable_error};

#[derive(Debug, Deserialize)]
pub struct FrameQuery {
    quality: Option<u8>,
}

pub async fn latest_frame_default(
    state: State<Arc<DaemonState>>,
    query: Query<FrameQuery>,
) -> Response {
    let Some((camera_id, _)) = state.resolve_camera("").await else {
        return not_found_error("no cameras configured").into_response();
    };
    frame_response(&state, &camera_id, query.quality.unwrap_or(80)).await
}

pub async fn latest_frame(
    Path(camera_id): Path<String>,
    state: State<Arc<DaemonState>>,
    query: Query<FrameQuery>,
) -> Response {
    frame_response(&state, &camera_id, query.quality.unwrap_or(80)).await
}

async fn frame_response(state: &Arc<DaemonState>, camera_id: &str, quality: u8) -> Response {
    let Some(camera) = state.camera(camera_id).await else {
        return not_found_error(format!("unknown camera: {camera_id}")).into_response();
    };
    let Some(frame) = camera.buffer.latest().await else {
        return unavailable_error("no frame captured yet").into_response();
    };
    match frame.to_jpeg_bytes(quality) {
        Ok(bytes) => ([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response(),
        Err(e) => super::internal_error(format!("encode failed: {e}")).into_response(),
    }
}

pub async fn all_scenes(State(state): State<Arc<DaemonState>>) -> impl IntoResponse {
    let cameras = state.cameras.lock().await;
    let mut out = serde_json::Map::new();
    for (id, cam) in cameras.iter() {
        let scene = cam.scene.lock().await.clone();
        out.insert(
            id.clone(),
            json!({ "camera_name": cam.config.name, "scene": scene }),
        );
    }
    Json(json!({ "cameras": out, "timestamp": chrono::Utc::now() }))
}

pub async fn camera_scene(
    Path(camera_id): Path<String>,
    State(state): State<Arc<DaemonState>>,
) -> Response {
    let Some(camera) = state.camera(&camera_id).await else {
        return not_found_error(format!("unknown camera: {camera_id}")).into_response();
    };
    Json(camera.scene.lock().await.clone()).into_response()
}

#[derive(Debug, Deserialize)]
pub struct ChangesQuery {
    #[serde(default = "default_minutes")]
    minutes: i64,
    camera_id: Option<String>,
}

fn default_minutes() -> i64 {
    10
}

pub async fn changes(
    State(state): State<Arc<DaemonState>>,
    Query(query): Query<ChangesQuery>,
) -> impl IntoResponse {
    let cameras = state.cameras.lock().await;
    let mut out = serde_json::Map::new();
    for (id, cam) in cameras.iter() {
        if let Some(filter) = &query.camera_id {
            if filter != id {
                continue;
            }
        }
        let log = cam.scene.lock().await.get_change_log(query.minutes);
        out.insert(id.clone(), json!(log));
    }
    Json(json!({ "changes": out }))
}

pub async fn all_health(State(state): State<Arc<DaemonState>>) -> impl IntoResponse {
    let cameras = state.cameras.lock().await;
    let mut out = serde_json::Map::new();
    for (id, cam) in cameras.iter() {
        out.insert(id.clone(), json!(cam.health_snapshot().await));
    }
    Json(json!({ "cameras": out }))
}

pub async fn camera_health(
    Path(camera_id): Path<String>,
    State(state): State<Arc<DaemonState>>,
) -> impl IntoResponse {
    Json(state.default_camera_health_view(&camera_id).await)
}

#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    50
}

pub async fn alerts(
    State(state): State<Arc<DaemonState>>,
    Query(query): Query<AlertsQuery>,
) -> impl IntoResponse {
    let mut events = state.replay.all().await;
    events.reverse();
    events.truncate(query.limit);
    Json(json!({ "alerts": events }))
}
