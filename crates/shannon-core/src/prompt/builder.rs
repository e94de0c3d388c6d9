//! Assembles the system prompt handed to the LLM provider for a turn.

use crate::llm::ToolSchema;

const BASE_PROMPT: &str = "You are Shannon, an LLM-driven agent operating over chat \
platforms and webhooks. Use the available tools when they help accomplish the \
user's request; otherwise respond directly. Be concise.";

/// Deterministic for a given `(tools, memory_export)`: a fixed base prompt,
/// one line per available tool, and a `"Current Memory:"` block when the
/// memory export is non-empty.
pub fn build_system_prompt(tools: &[ToolSchema], memory_export: &str) -> String {
    let mut prompt = String::from(BASE_PROMPT);

    if !tools.is_empty() {
        prompt.push_str("\n\nAvailable tools:\n");
        for tool in tools {
            prompt.push_str(&format!("- {}: {}\n", tool.name, tool.description));
        }
    }

    if !memory_export.trim().is_empty() {
        prompt.push_str("\nCurrent Memory:\n");
        prompt.push_str(memory_export);
    }

    prompt
}
