//! Drives an LLM call to produce the summary text that
//! [`super::traits::ContextStore::summarize`] persists. Shared by the
//! pipeline's automatic trigger and the `/summarize` command so both paths
//! agree on the prompt.

use crate::error::Result;
use crate::llm::{LLMProvider, Message};

use super::traits::{ContextStore, Role};

const SUMMARY_MAX_TOKENS: u32 = 400;

/// Summarize the oldest half of `(platform, channel)`'s non-system history
/// and replace it via [`ContextStore::summarize`]. No-op (per the store's
/// own idempotence guarantee) if the context is already small.
pub async fn summarize_channel(
    store: &dyn ContextStore,
    provider: &dyn LLMProvider,
    platform: &str,
    channel: &str,
) -> Result<()> {
    let history = store.get_context(platform, channel).await?;
    let non_system: Vec<_> = history.iter().filter(|m| m.role != Role::System).collect();
    if non_system.len() < 2 {
        return Ok(());
    }

    let half = non_system.len() / 2;
    let transcript: String = non_system[..half]
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n");

    let prompt = vec![
        Message::system(
            "Summarize the following conversation excerpt concisely, preserving names, \
             decisions, and open questions. Reply with the summary only.",
        ),
        Message::user(transcript),
    ];

    let response = provider.complete(prompt, Vec::new(), SUMMARY_MAX_TOKENS, 0.3).await?;
    store.summarize(platform, channel, response.content.trim()).await
}
