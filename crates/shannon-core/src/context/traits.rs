//! Core types and the [`ContextStore`] trait for the per-channel conversation log.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        };
        write!(f, "{s}")
    }
}

/// One row of the insertion-ordered per-`(platform, channel)` log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextMessage {
    pub platform: String,
    pub channel: String,
    pub role: Role,
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub token_estimate: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContextStats {
    pub message_count: usize,
    pub char_total: usize,
    pub token_estimate_total: u64,
}

/// Persistent per-`(platform, channel)` conversation log with LLM-driven
/// summarization.
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Append a row, assigning timestamp and token estimate. Persisted
    /// immediately (single-row insert, no read-modify-write).
    async fn append(
        &self,
        platform: &str,
        channel: &str,
        role: Role,
        content: &str,
        token_estimate: u32,
    ) -> Result<()>;

    /// Ordered rows for `(platform, channel)`.
    async fn get_context(&self, platform: &str, channel: &str) -> Result<Vec<ContextMessage>>;

    /// Delete all rows for `(platform, channel)`.
    async fn clear(&self, platform: &str, channel: &str) -> Result<()>;

    /// Replace the oldest 50% of non-system rows with one system row
    /// containing `summary`. All-or-nothing: on any failure the log is
    /// left exactly as it was before the call.
    async fn summarize(&self, platform: &str, channel: &str, summary: &str) -> Result<()>;

    async fn stats(&self, platform: &str, channel: &str) -> Result<ContextStats>;
}
