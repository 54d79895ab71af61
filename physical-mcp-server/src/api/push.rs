//! Push ingress for relay-board cameras: `POST /push/register` redeems a
//! claim code, `POST /push/frame/{camera_id}` accepts a raw JPEG body
//! authenticated by `X-Camera-Token`. Both routes sit outside the bearer
//! `auth_token` middleware — a relay board authenticates with its own
//! per-camera token instead.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::state::DaemonState;

use super::{bad_request_error, forbidden_error, not_found_error};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub claim_code: String,
}

pub async fn register(
    State(state): State<Arc<DaemonState>>,
    Json(req): Json<RegisterRequest>,
) -> Response {
    let claims = state.cloud_claims.lock().await;
    let now = Utc::now();
    let claim = claims
        .values()
        .find(|c| c.claim_code == req.claim_code && c.accepted && !c.is_expired(now));

    match claim {
        Some(claim) => {
            let camera_id = claim.camera_id.clone();
            let camera_token = claim.camera_token.clone().unwrap_or_default();
            let push_url = format!("/push/frame/{camera_id}");
            Json(json!({
                "camera_id": camera_id,
                "camera_token": camera_token,
                "push_url": push_url,
            }))
            .into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "code": "invalid_code", "message": "unknown or unaccepted claim code" })),
        )
            .into_response(),
    }
}

pub async fn push_frame(
    Path(camera_id): Path<String>,
    State(state): State<Arc<DaemonState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if body.is_empty() {
        return bad_request_error("empty_body", "request body was empty").into_response();
    }

    let Some(camera) = state.camera(&camera_id).await else {
        return not_found_error(format!("unknown camera: {camera_id}")).into_response();
    };

    let token = headers
        .get("X-Camera-Token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let handle = camera.handle.lock().await;
    let Some(source) = handle.as_pushed_cloud() else {
        return bad_request_error("not_cloud_camera", "camera does not accept pushed frames").into_response();
    };
    if !source.verify_token(token) {
        return forbidden_error("camera token mismatch").into_response();
    }

    match source.push_frame(&body).await {
        Ok(frame) => {
            drop(handle);
            camera.buffer.push(frame.clone()).await;
            camera.health.lock().await.record_success();
            Json(json!({ "sequence_number": frame.sequence_number })).into_response()
        }
        Err(e) => bad_request_error("invalid_frame", e.to_string()).into_response(),
    }
}
