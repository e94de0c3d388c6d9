//! Core types and the [`MemoryStore`] trait for the persistent key/value memory.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single persisted fact or preference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub key: String,
    pub value: String,
    pub category: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub source: String,
}

pub const DEFAULT_CATEGORY: &str = "general";

/// Persistent key/value store injected into every system prompt.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Upsert by key; updates `updated_at` (and `created_at` only on first insert).
    async fn set(
        &self,
        key: &str,
        value: &str,
        category: Option<&str>,
        source: Option<&str>,
    ) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<MemoryEntry>>;

    /// Returns `true` if a row existed and was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Substring match on key OR value, ordered by `updated_at` descending.
    async fn search(&self, query: &str) -> Result<Vec<MemoryEntry>>;

    async fn list_category(&self, category: &str) -> Result<Vec<MemoryEntry>>;

    /// Remove every entry, returning the count removed.
    async fn clear(&self) -> Result<usize>;

    /// Serialize the most-recently-updated entries as
    /// `"[category] key: value"` lines until a `max_tokens * 4` character
    /// budget is exhausted, appending a truncation sentinel if not
    /// everything fit.
    async fn export_context(&self, max_tokens: usize) -> Result<String> {
        let mut entries = self.most_recent(usize::MAX).await?;
        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        let budget = max_tokens.saturating_mul(4);
        let mut out = String::new();
        let mut included = 0usize;

        for entry in &entries {
            let line = format!("[{}] {}: {}\n", entry.category, entry.key, entry.value);
            if out.len() + line.len() > budget {
                break;
            }
            out.push_str(&line);
            included += 1;
        }

        let remaining = entries.len().saturating_sub(included);
        if remaining > 0 {
            out.push_str(&format!("... ({remaining} more memories truncated)\n"));
        }

        Ok(out)
    }

    /// All entries ordered by `updated_at` descending, capped at `limit`.
    /// Used by the default `export_context` implementation.
    async fn most_recent(&self, limit: usize) -> Result<Vec<MemoryEntry>>;
}
