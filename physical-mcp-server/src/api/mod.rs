//! HTTP API: axum router wiring plus the shared `ApiError` shape every
//! handler in this module returns (`{code, message}`, with
//! `internal_error`/`not_found_error` helpers for the common cases).

pub mod cameras;
pub mod events;
pub mod push;
pub mod rules;
pub mod scene;
pub mod stream;

use std::sync::Arc;

use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post, put};
use axum::Router;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::state::DaemonState;

#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
        (
            status,
            Json(ApiError {
                code: code.to_string(),
                message: message.into(),
            }),
        )
    }
}

pub fn not_found_error(message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    ApiError::new(StatusCode::NOT_FOUND, "not_found", message)
}

pub fn bad_request_error(code: &str, message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    ApiError::new(StatusCode::BAD_REQUEST, code, message)
}

pub fn forbidden_error(message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    ApiError::new(StatusCode::FORBIDDEN, "forbidden", message)
}

pub fn unavailable_error(message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "unavailable", message)
}

pub fn internal_error(message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
}

/// Bearer or `?auth_token=` query check. A configured token with no match
/// in either place is a 401; no token configured means the API is open.
pub async fn require_auth(
    State(state): State<Arc<DaemonState>>,
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let Some(expected) = state.auth_token.load_full() else {
        return next.run(request).await;
    };

    let header_ok = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| token == expected.as_str())
        .unwrap_or(false);

    let query_ok = request
        .uri()
        .query()
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .any(|(k, v)| k == "auth_token" && v == expected.as_str())
        })
        .unwrap_or(false);

    if header_ok || query_ok {
        next.run(request).await
    } else {
        (StatusCode::UNAUTHORIZED, Json(ApiError {
            code: "unauthorized".to_string(),
            message: "missing or invalid auth_token".to_string(),
        }))
            .into_response()
    }
}

async fn overview(State(state): State<Arc<DaemonState>>) -> impl IntoResponse {
    let camera_ids = state.camera_ids().await;
    Json(serde_json::json!({
        "service": "physical-mcp",
        "reasoning_mode": state.reasoning_mode().await,
        "cameras": camera_ids,
        "endpoints": [
            "/frame", "/scene", "/changes", "/health", "/cameras",
            "/rules", "/alerts", "/events", "/stream/{camera_id}",
        ],
    }))
}

pub fn router(state: Arc<DaemonState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    let authenticated = Router::new()
        .route("/", get(overview))
        .route("/frame", get(scene::latest_frame_default))
        .route("/frame/{camera_id}", get(scene::latest_frame))
        .route("/scene", get(scene::all_scenes))
        .route("/scene/{camera_id}", get(scene::camera_scene))
        .route("/changes", get(scene::changes))
        .route("/health", get(scene::all_health))
        .route("/health/{camera_id}", get(scene::camera_health))
        .route("/cameras", get(cameras::list_cameras).post(cameras::add_cloud_camera))
        .route("/cameras/pending", get(cameras::list_pending))
        .route("/cameras/{camera_id}/accept", post(cameras::accept_camera))
        .route("/cameras/{camera_id}/reject", post(cameras::reject_camera))
        .route(
            "/rules",
            get(rules::list_rules).post(rules::create_rule),
        )
        .route(
            "/rules/{rule_id}",
            put(rules::update_rule).delete(rules::delete_rule),
        )
        .route("/alerts", get(scene::alerts))
        .route("/events", get(events::sse_events))
        .route("/stream/{camera_id}", get(stream::mjpeg_stream))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), require_auth));

    let public = Router::new()
        .route("/push/register", post(push::register))
        .route("/push/frame/{camera_id}", post(push::push_frame));

    Router::new()
        .merge(authenticated)
        .merge(public)
        .layer(cors)
        .with_state(state)
}
