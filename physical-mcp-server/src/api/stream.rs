//! `GET /stream/{camera_id}`: `multipart/x-mixed-replace` MJPEG, fed from
//! the camera's `FrameBuffer` via `wait_for_frame` so idle cameras don't
//! spin a poll loop.

use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::state::DaemonState;

use super::not_found_error;

const BOUNDARY: &str = "frame";
const STREAM_QUALITY: u8 = 70;
const WAIT_TIMEOUT: Duration = Duration::from_secs(1);

pub async fn mjpeg_stream(
    Path(camera_id): Path<String>,
    State(state): State<Arc<DaemonState>>,
) -> Response {
    let Some(camera) = state.camera(&camera_id).await else {
        return not_found_error(format!("unknown camera: {camera_id}")).into_response();
    };

    let body = stream! {
        loop {
            let frame = camera.buffer.wait_for_frame(WAIT_TIMEOUT).await;
            let Some(frame) = frame else { continue };
            let Ok(jpeg) = frame.to_jpeg_bytes(STREAM_QUALITY) else { continue };

            let mut part = Vec::with_capacity(jpeg.len() + 128);
            part.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            part.extend_from_slice(b"Content-Type: image/jpeg\r\n");
            part.extend_from_slice(format!("Content-Length: {}\r\n\r\n", jpeg.len()).as_bytes());
            part.extend_from_slice(&jpeg);
            part.extend_from_slice(b"\r\n");

            yield Ok::<_, std::io::Error>(axum::body::Bytes::from(part));
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={BOUNDARY}"),
        )
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(body))
        .unwrap_or_else(|_| super::internal_error("failed to build stream response").into_response())
}
