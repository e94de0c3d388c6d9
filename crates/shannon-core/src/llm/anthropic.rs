//! [`RawBackend`] for Anthropic's Messages API.
//!
//! Grounded on the teacher's `ai/providers/openai_compatible.rs` request/
//! response plumbing (reqwest client, `ApiMessage`/`ApiRequest` shapes) and
//! on `AnthropicProvider` in the `Eonh1u-miniclaw` pack repo for the
//! Messages-API-specific wire format (`x-api-key`/`anthropic-version`
//! headers, `content` blocks, native `tool_use` blocks). Shannon's
//! `Message` type carries no tool-call content of its own — the executor
//! flattens tool results into plain text turns — so only the response side
//! needs to parse `tool_use` blocks; the request side stays a single text
//! block per turn.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::provider::{RawBackend, RawCompletion};
use super::types::{Message, MessageRole, ToolCall, ToolSchema};
use crate::error::{Result, ShannonError};

const API_BASE: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Context window by model family. Anthropic does not expose this via the
/// API; callers that need a different figure can override via
/// [`AnthropicBackend::with_context_window`].
fn default_context_window(model: &str) -> u32 {
    if model.contains("claude-3-5") || model.contains("claude-3.5") || model.contains("claude-4") {
        200_000
    } else {
        100_000
    }
}

pub struct AnthropicBackend {
    api_key: String,
    model: String,
    client: reqwest::Client,
    context_window: u32,
}

impl AnthropicBackend {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        let context_window = default_context_window(&model);
        Self {
            api_key: api_key.into(),
            model,
            client: reqwest::Client::new(),
            context_window,
        }
    }

    pub fn with_context_window(mut self, window: u32) -> Self {
        self.context_window = window;
        self
    }
}

#[derive(Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
}

#[derive(Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize)]
struct ApiUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[async_trait]
impl RawBackend for AnthropicBackend {
    async fn raw_complete(
        &self,
        messages: Vec<Message>,
        native_tools: Option<Vec<ToolSchema>>,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<RawCompletion> {
        let mut system = None;
        let mut api_messages = Vec::new();
        for msg in messages {
            match msg.role {
                MessageRole::System => {
                    system = Some(match system {
                        Some(existing) => format!("{existing}\n\n{}", msg.content),
                        None => msg.content,
                    });
                }
                MessageRole::User => api_messages.push(ApiMessage {
                    role: "user".to_string(),
                    content: msg.content,
                }),
                MessageRole::Assistant => api_messages.push(ApiMessage {
                    role: "assistant".to_string(),
                    content: msg.content,
                }),
            }
        }

        let tools = native_tools
            .unwrap_or_default()
            .into_iter()
            .map(|t| ApiTool {
                name: t.name,
                description: t.description,
                input_schema: t.parameters,
            })
            .collect();

        let request = ApiRequest {
            model: self.model.clone(),
            max_tokens,
            temperature,
            system,
            messages: api_messages,
            tools,
        };

        let response = self
            .client
            .post(format!("{API_BASE}/v1/messages"))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| ShannonError::ProviderError(format!("anthropic request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ShannonError::ProviderError(format!(
                "anthropic API error ({status}): {body}"
            )));
        }

        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| ShannonError::ProviderError(format!("failed to parse anthropic response: {e}")))?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for block in parsed.content {
            match block {
                ContentBlock::Text { text } => content.push_str(&text),
                ContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall {
                        id,
                        name,
                        arguments: input,
                    });
                }
                ContentBlock::Unknown => {}
            }
        }

        let (input_tokens, output_tokens) = parsed
            .usage
            .map(|u| (u.input_tokens, u.output_tokens))
            .unwrap_or((0, 0));

        Ok(RawCompletion {
            content,
            tool_calls,
            input_tokens,
            output_tokens,
            hit_max_tokens: parsed.stop_reason.as_deref() == Some("max_tokens"),
        })
    }

    async fn raw_count_tokens(&self, text: &str) -> Result<u32> {
        Ok((text.len() / 4).max(1) as u32)
    }

    fn context_window(&self) -> u32 {
        self.context_window
    }

    fn supports_native_tools(&self) -> bool {
        true
    }
}
