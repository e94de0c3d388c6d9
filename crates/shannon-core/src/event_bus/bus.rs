//! Tokio-backed [`EventBus`] implementation.
//!
//! Unlike a broadcast channel, each subscriber owns its own bounded `mpsc`
//! queue and a dedicated worker task that drains it sequentially. Publish
//! is non-blocking: a full queue drops the event for that subscriber only,
//! with a warning logged, per the spec's at-most-once delivery model.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use super::traits::{Event, EventBus, EventType, HandlerFn};

const DEFAULT_QUEUE_CAPACITY: usize = 256;

struct Subscriber {
    event_type: EventType,
    sender: mpsc::Sender<Event>,
    worker: JoinHandle<()>,
}

/// [`EventBus`] backed by one bounded `mpsc` channel + worker task per subscriber.
pub struct TokioEventBus {
    subscribers: Mutex<Vec<Subscriber>>,
    queue_capacity: usize,
    stopped: AtomicBool,
}

impl TokioEventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(queue_capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            queue_capacity,
            stopped: AtomicBool::new(false),
        }
    }
}

impl Default for TokioEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for TokioEventBus {
    fn publish(&self, event: Event) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        let subscribers = self.subscribers.lock();
        for (idx, sub) in subscribers.iter().enumerate() {
            if !sub.event_type.matches(&event) {
                continue;
            }
            if let Err(mpsc::error::TrySendError::Full(_)) = sub.sender.try_send(event.clone()) {
                warn!(
                    subscriber = idx,
                    capacity = self.queue_capacity,
                    event_type = ?event.event_type(),
                    "event bus subscriber queue full, dropping event"
                );
            }
        }
    }

    fn subscribe(&self, event_type: EventType, handler: HandlerFn) {
        let (tx, mut rx) = mpsc::channel::<Event>(self.queue_capacity);

        let worker = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                handler(event).await;
            }
        });

        self.subscribers.lock().push(Subscriber {
            event_type,
            sender: tx,
            worker,
        });
    }

    async fn stop(&self, deadline: Duration) {
        self.stopped.store(true, Ordering::Release);
        let subscribers = std::mem::take(&mut *self.subscribers.lock());
        // Dropping the senders closes each channel so workers finish once
        // their queue drains; give them a bounded window to do so.
        drop(subscribers.iter().map(|s| &s.sender).collect::<Vec<_>>());
        let handles: Vec<JoinHandle<()>> = subscribers.into_iter().map(|s| s.worker).collect();
        let joined = tokio::time::timeout(deadline, futures::future::join_all(handles)).await;
        if joined.is_err() {
            warn!("event bus shutdown deadline exceeded, aborting remaining workers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    fn counting_handler(counter: Arc<AtomicUsize>, notify: Arc<Notify>) -> HandlerFn {
        Arc::new(move |_event: Event| {
            let counter = counter.clone();
            let notify = notify.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                notify.notify_one();
            })
        })
    }

    #[tokio::test]
    async fn publish_then_receive() {
        let bus = TokioEventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let notify = Arc::new(Notify::new());
        bus.subscribe(EventType::All, counting_handler(counter.clone(), notify.clone()));

        bus.publish(Event::MessageOutgoing(super::super::traits::OutgoingMessage {
            platform: "discord".into(),
            channel: "ch1".into(),
            content: "hi".into(),
            reply_to: None,
        }));

        tokio::time::timeout(Duration::from_secs(1), notify.notified())
            .await
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn filtered_subscriber_ignores_other_types() {
        let bus = TokioEventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let notify = Arc::new(Notify::new());
        bus.subscribe(
            EventType::WebhookReceived,
            counting_handler(counter.clone(), notify.clone()),
        );

        bus.publish(Event::MessageOutgoing(super::super::traits::OutgoingMessage {
            platform: "discord".into(),
            channel: "ch1".into(),
            content: "hi".into(),
            reply_to: None,
        }));

        // Give the (non-matching) publish a moment; nothing should arrive.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn overflow_drops_without_panicking() {
        let bus = TokioEventBus::with_capacity(1);
        // Subscribe but never drain, forcing the second publish to overflow.
        let (_tx_keepalive, _rx) = mpsc::channel::<Event>(1);
        let counter = Arc::new(AtomicUsize::new(0));
        let notify = Arc::new(Notify::new());
        bus.subscribe(EventType::All, counting_handler(counter, notify));

        for _ in 0..5 {
            bus.publish(Event::SchedulerTrigger {
                job_id: "job-1".into(),
                payload: serde_json::json!({}),
            });
        }
        // No panic means overflow was handled gracefully.
    }
}
