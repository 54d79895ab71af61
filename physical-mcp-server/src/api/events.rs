//! `GET /events`: server-sent events bridged from the `EventBus`'s
//! `scene`/`change`/`alert` topics — a background task drains an mpsc
//! channel fed by bus subscriptions into an `async_stream`-built SSE body.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_core::Stream;
use tokio::sync::mpsc;

use crate::state::DaemonState;

const CHANNEL_CAPACITY: usize = 64;
const HEARTBEAT_SECS: u64 = 15;

pub async fn sse_events(
    State(state): State<Arc<DaemonState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, mut rx) = mpsc::channel::<(&'static str, serde_json::Value)>(CHANNEL_CAPACITY);

    for topic in ["scene_change", "alert"] {
        let tx = tx.clone();
        let event_name: &'static str = if topic == "scene_change" { "change" } else { "alert" };
        state
            .events
            .subscribe(topic, move |payload| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send((event_name, payload)).await;
                }
            })
            .await;
    }

    let stream = stream! {
        loop {
            match rx.recv().await {
                Some((name, payload)) => {
                    let data = serde_json::to_string(&payload).unwrap_or_else(|_| "{}".to_string());
                    yield Ok(Event::default().event(name).data(data));
                }
                None => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(HEARTBEAT_SECS))
            .text("heartbeat"),
    )
}
