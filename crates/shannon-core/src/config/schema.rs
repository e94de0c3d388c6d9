//! TOML configuration schema for Shannon.
//!
//! All fields have `#[serde(default)]` so a partially-filled `config.toml`
//! works correctly. Missing sections fall back to their `Default` impl.
//!
//! Example `~/.shannon/config.toml`:
//! ```toml
//! [llm]
//! provider = "anthropic"
//! model = "claude-3-5-sonnet-latest"
//!
//! [auth]
//! admin_users = ["discord:1"]
//! rate_limit_per_minute = 20
//!
//! [scheduler]
//! heartbeat_interval_secs = 1800
//!
//! [webhooks]
//! enabled = true
//! port = 8420
//!
//! [context]
//! max_messages = 200
//! summarize_threshold = 0.7
//! ```

use serde::{Deserialize, Serialize};

// ─── LlmConfig ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    /// `"anthropic"` or `"local"`.
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
    pub local_endpoint: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_owned(),
            model: "claude-3-5-sonnet-latest".to_owned(),
            api_key: None,
            local_endpoint: None,
            max_tokens: 4096,
            temperature: 0.7,
        }
    }
}

// ─── AuthConfig ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    pub admin_users: Vec<String>,
    pub operator_users: Vec<String>,
    pub trusted_users: Vec<String>,
    pub rate_limit_per_minute: usize,
    pub sudo_timeout_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_users: Vec::new(),
            operator_users: Vec::new(),
            trusted_users: Vec::new(),
            rate_limit_per_minute: 20,
            sudo_timeout_seconds: 300,
        }
    }
}

// ─── SchedulerConfig ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub heartbeat_interval_secs: u64,
    pub heartbeat_enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 30 * 60,
            heartbeat_enabled: true,
        }
    }
}

// ─── WebhookEndpointConfig ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct WebhookEndpointConfig {
    pub name: String,
    pub path: String,
    pub secret: String,
    /// `"platform:channel"`.
    pub channel: String,
    pub prompt_template: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WebhooksConfig {
    pub enabled: bool,
    pub bind: String,
    pub port: u16,
    pub endpoints: Vec<WebhookEndpointConfig>,
}

impl Default for WebhooksConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: "127.0.0.1".to_owned(),
            port: 8420,
            endpoints: Vec::new(),
        }
    }
}

// ─── ContextConfig ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContextConfig {
    pub max_messages: usize,
    /// Fraction (0.0-1.0) of the provider's context window that triggers
    /// automatic summarization.
    pub summarize_threshold: f32,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_messages: 200,
            summarize_threshold: 0.7,
        }
    }
}

// ─── AppConfig ────────────────────────────────────────────────────────────────

/// Top-level application configuration.
///
/// Loaded from `~/.shannon/config.toml`, falling back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub auth: AuthConfig,
    pub scheduler: SchedulerConfig,
    pub webhooks: WebhooksConfig,
    pub context: ContextConfig,
    /// Base directory for SQLite files (`context.db`, `memory.db`,
    /// `plans.db`, `jobs.db`) and log files. Defaults to the platform data
    /// directory (via `directories::ProjectDirs`) when unset.
    pub data_dir: Option<String>,
}
