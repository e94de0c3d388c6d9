pub mod bus;
pub mod traits;

pub use bus::TokioEventBus;
pub use traits::{Event, EventBus, EventType, IncomingMessage, OutgoingMessage, WebhookEvent};
