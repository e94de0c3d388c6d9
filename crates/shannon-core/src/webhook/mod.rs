pub mod extractors;
pub mod server;
pub mod signature;

pub use server::WebhookServer;
