//! Prompt-only tool-use protocol for backends without native tool calling.
//!
//! Tools are serialized into the system prompt with instructions to emit
//! `Thought: … / Action: tool_name / Action Input: {json}` cycles. The
//! executor's own loop (append tool result, call `complete` again) drives
//! re-prompting; this adapter's job is purely translation at each turn.

use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

use super::provider::{LLMProvider, RawBackend, StreamResponse};
use super::types::{LLMResponse, Message, MessageRole, StopReason, ToolCall, ToolSchema};
use crate::error::Result;
use std::sync::Arc;

pub struct ReactProvider {
    backend: Arc<dyn RawBackend>,
}

impl ReactProvider {
    pub fn new(backend: Arc<dyn RawBackend>) -> Self {
        Self { backend }
    }
}

fn action_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)Action:\s*([A-Za-z0-9_\-]+)\s*\nAction Input:\s*(\{.*?\})\s*(?:\n|$)")
            .expect("static ReAct action regex is valid")
    })
}

/// Render the tool catalog into the ReAct instruction block appended to
/// the system prompt.
fn react_instructions(tools: &[ToolSchema]) -> String {
    if tools.is_empty() {
        return String::new();
    }
    let mut out = String::from(
        "\nYou do not have native tool calling. To use a tool, respond with exactly this \
         cycle and nothing after it:\n\
         Thought: <your reasoning>\n\
         Action: <tool name>\n\
         Action Input: <JSON object of arguments>\n\n\
         Available tools:\n",
    );
    for tool in tools {
        out.push_str(&format!("- {}: {}\n", tool.name, tool.description));
    }
    out.push_str(
        "\nWhen you are done and need no more tools, respond normally without an Action line.\n",
    );
    out
}

/// Parse the first well-formed `Action`/`Action Input` cycle out of `content`.
/// Returns `None` if no valid cycle is present (ending the loop per spec).
pub fn parse_action(content: &str) -> Option<ToolCall> {
    let caps = action_regex().captures(content)?;
    let name = caps.get(1)?.as_str().to_string();
    let raw_args = caps.get(2)?.as_str();
    let arguments: serde_json::Value = serde_json::from_str(raw_args).ok()?;
    Some(ToolCall {
        id: Uuid::new_v4().to_string(),
        name,
        arguments,
    })
}

/// Truncate `content` at the end of the parsed Action Input line so a
/// hallucinated `Observation:` continuation from the model isn't kept.
fn truncate_after_action(content: &str) -> String {
    if let Some(idx) = content.find("Observation:") {
        content[..idx].trim_end().to_string()
    } else {
        content.trim_end().to_string()
    }
}

#[async_trait]
impl LLMProvider for ReactProvider {
    async fn complete(
        &self,
        mut messages: Vec<Message>,
        tools: Vec<ToolSchema>,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<LLMResponse> {
        let instructions = react_instructions(&tools);
        if !instructions.is_empty() {
            match messages.iter_mut().find(|m| m.role == MessageRole::System) {
                Some(system) => {
                    system.content.push_str(&instructions);
                }
                None => messages.insert(0, Message::system(instructions)),
            }
        }

        let raw = self
            .backend
            .raw_complete(messages, None, max_tokens, temperature)
            .await?;

        match parse_action(&raw.content) {
            Some(tool_call) => Ok(LLMResponse {
                content: truncate_after_action(&raw.content),
                tool_calls: vec![tool_call],
                stop_reason: StopReason::ToolUse,
                input_tokens: raw.input_tokens,
                output_tokens: raw.output_tokens,
            }),
            None => Ok(LLMResponse {
                content: raw.content,
                tool_calls: vec![],
                stop_reason: if raw.hit_max_tokens {
                    StopReason::MaxTokens
                } else {
                    StopReason::EndTurn
                },
                input_tokens: raw.input_tokens,
                output_tokens: raw.output_tokens,
            }),
        }
    }

    async fn stream(
        &self,
        _messages: Vec<Message>,
        _tools: Vec<ToolSchema>,
        _max_tokens: u32,
        _temperature: f32,
    ) -> Result<StreamResponse> {
        Err(crate::error::ShannonError::Internal(
            "streaming not implemented for the ReAct fallback".into(),
        ))
    }

    async fn count_tokens(&self, text: &str) -> Result<u32> {
        self.backend.raw_count_tokens(text).await
    }

    fn context_window(&self) -> u32 {
        self.backend.context_window()
    }
}
