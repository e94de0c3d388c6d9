//! Core types and the [`EventBus`] trait for the event bus subsystem.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ─── Message envelopes ────────────────────────────────────────────────────────

/// A message received from a chat transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub platform: String,
    pub channel: String,
    pub user_id: String,
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl IncomingMessage {
    pub fn new(
        platform: impl Into<String>,
        channel: impl Into<String>,
        user_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            platform: platform.into(),
            channel: channel.into(),
            user_id: user_id.into(),
            content: content.into(),
            timestamp: chrono::Utc::now(),
            attachments: Vec::new(),
        }
    }
}

/// A message the pipeline wants delivered back to a transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub platform: String,
    pub channel: String,
    pub content: String,
    #[serde(default)]
    pub reply_to: Option<String>,
}

/// A normalized inbound webhook, ready for prompt templating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub source: String,
    pub event_type: String,
    pub summary: String,
    pub payload: serde_json::Value,
    /// `"platform:channel"`.
    pub channel_target: String,
}

// ─── Event ────────────────────────────────────────────────────────────────────

/// The sum type carried on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    MessageIncoming(IncomingMessage),
    MessageOutgoing(OutgoingMessage),
    SchedulerTrigger {
        job_id: String,
        payload: serde_json::Value,
    },
    WebhookReceived {
        event: WebhookEvent,
        prompt_template: String,
    },
}

impl Event {
    pub fn event_type(&self) -> EventType {
        match self {
            Event::MessageIncoming(_) => EventType::MessageIncoming,
            Event::MessageOutgoing(_) => EventType::MessageOutgoing,
            Event::SchedulerTrigger { .. } => EventType::SchedulerTrigger,
            Event::WebhookReceived { .. } => EventType::WebhookReceived,
        }
    }
}

/// Selects which event variants a subscriber is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    MessageIncoming,
    MessageOutgoing,
    SchedulerTrigger,
    WebhookReceived,
    /// Matches every variant.
    All,
}

impl EventType {
    pub fn matches(&self, event: &Event) -> bool {
        matches!(self, EventType::All) || *self == event.event_type()
    }
}

// ─── EventBus trait ───────────────────────────────────────────────────────────

/// Per-subscriber queue depths and worker draining, matching the spec's
/// at-most-once, overflow-drops-with-warning delivery model.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an event to every subscriber whose filter matches. Delivery
    /// into each subscriber's queue is attempted without blocking the
    /// publisher; a full queue drops the event for that subscriber.
    fn publish(&self, event: Event);

    /// Register a handler for the given event type. The handler runs on a
    /// dedicated worker task that drains its queue sequentially, so
    /// publish order is preserved per subscriber.
    fn subscribe(&self, event_type: EventType, handler: HandlerFn);

    /// Stop accepting new events and wait (up to `deadline`) for all
    /// subscriber workers to drain their outstanding queues.
    async fn stop(&self, deadline: std::time::Duration);
}

/// A boxed async event handler.
pub type HandlerFn = std::sync::Arc<
    dyn Fn(Event) -> futures::future::BoxFuture<'static, ()> + Send + Sync,
>;

