//! In-process pub/sub used to fan structured events out to subscribers
//! (MJPEG/SSE streams, metrics, relays) without coupling publishers to them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::join_all;
use log::warn;
use serde_json::Value;
use tokio::sync::Mutex;

type Handler = Arc<dyn Fn(Value) -> futures_core::future::BoxFuture<'static, ()> + Send + Sync>;

/// Topic-keyed subscriber registry. Publish copies the handler list out
/// from under the lock before invoking anything, so a handler that itself
/// subscribes/unsubscribes (or panics) never deadlocks the bus.
#[derive(Default)]
pub struct EventBus {
    subs: Mutex<HashMap<String, HashMap<u64, Handler>>>,
    next_id: AtomicU64,
}

pub struct Subscription {
    pub topic: String,
    pub id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            subs: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub async fn subscribe<F, Fut>(&self, topic: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let topic = topic.into();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let boxed: Handler = Arc::new(move |payload| Box::pin(handler(payload)));
        let mut subs = self.subs.lock().await;
        subs.entry(topic.clone()).or_default().insert(id, boxed);
        Subscription { topic, id }
    }

    pub async fn unsubscribe(&self, subscription: &Subscription) {
        let mut subs = self.subs.lock().await;
        if let Some(handlers) = subs.get_mut(&subscription.topic) {
            handlers.remove(&subscription.id);
        }
    }

    /// Runs every subscriber for `topic` concurrently; a handler that
    /// panics or errors never prevents its siblings from running (handlers
    /// themselves are infallible here — fallible work should catch its own
    /// errors before this point).
    pub async fn publish(&self, topic: &str, payload: Value) {
        let handlers: Vec<Handler> = {
            let subs = self.subs.lock().await;
            match subs.get(topic) {
                Some(h) => h.values().cloned().collect(),
                None => return,
            }
        };
        if handlers.is_empty() {
            return;
        }
        join_all(handlers.iter().map(|h| h(payload.clone()))).await;
    }

    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.subs
            .lock()
            .await
            .get(topic)
            .map(|h| h.len())
            .unwrap_or(0)
    }
}

pub fn log_publish_failure(topic: &str, err: impl std::fmt::Display) {
    warn!("event bus publish to {topic} failed: {err}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc as StdArc;

    #[tokio::test]
    async fn publish_invokes_all_subscribers() {
        let bus = EventBus::new();
        let counter = StdArc::new(AtomicUsize::new(0));
        let c1 = counter.clone();
        let c2 = counter.clone();
        bus.subscribe("topic", move |_| {
            let c = c1.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;
        bus.subscribe("topic", move |_| {
            let c = c2.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;

        bus.publish("topic", serde_json::json!({"x": 1})).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn publish_to_unknown_topic_is_a_no_op() {
        let bus = EventBus::new();
        bus.publish("nobody-subscribed", serde_json::json!({})).await;
    }

    #[tokio::test]
    async fn unsubscribe_stops_future_delivery() {
        let bus = EventBus::new();
        let counter = StdArc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let sub = bus
            .subscribe("topic", move |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;
        bus.publish("topic", serde_json::json!({})).await;
        bus.unsubscribe(&sub).await;
        bus.publish("topic", serde_json::json!({})).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn subscriber_count_reflects_active_subscriptions() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count("topic").await, 0);
        let sub = bus.subscribe("topic", |_| async {}).await;
        assert_eq!(bus.subscriber_count("topic").await, 1);
        bus.unsubscribe(&sub).await;
        assert_eq!(bus.subscriber_count("topic").await, 0);
    }
}
