pub mod loader;
pub mod schema;

pub use loader::{default_config_path, load_config, load_default_config};
pub use schema::{AppConfig, AuthConfig, ContextConfig, LlmConfig, SchedulerConfig, WebhookEndpointConfig, WebhooksConfig};
