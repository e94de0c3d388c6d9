//! [`RawBackend`] for local/self-hosted OpenAI-compatible servers (e.g.
//! Ollama, llama.cpp's `server` mode).
//!
//! Directly grounded on the teacher's `ai/providers/openai_compatible.rs`:
//! same `ApiMessage`/`ChatCompletionRequest`/`ChatCompletionResponse`
//! shapes and the same "empty API key means no Authorization header"
//! convention for local providers. Declares no native tool support, since
//! we can't assume a given local server implements OpenAI function
//! calling — it always runs through the ReAct adapter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::provider::{RawBackend, RawCompletion};
use super::types::{Message, MessageRole, ToolSchema};
use crate::error::{Result, ShannonError};

pub struct OpenAiCompatibleBackend {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
    context_window: u32,
}

impl OpenAiCompatibleBackend {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key,
            client: reqwest::Client::new(),
            context_window: 8_192,
        }
    }

    pub fn with_context_window(mut self, window: u32) -> Self {
        self.context_window = window;
        self
    }
}

#[derive(Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ApiMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[async_trait]
impl RawBackend for OpenAiCompatibleBackend {
    async fn raw_complete(
        &self,
        messages: Vec<Message>,
        _native_tools: Option<Vec<ToolSchema>>,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<RawCompletion> {
        let api_messages = messages
            .into_iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    MessageRole::System => "system",
                    MessageRole::User => "user",
                    MessageRole::Assistant => "assistant",
                }
                .to_string(),
                content: m.content,
            })
            .collect();

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: api_messages,
            temperature,
            max_tokens,
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            if !key.is_empty() {
                builder = builder.header("Authorization", format!("Bearer {key}"));
            }
        }

        let response = builder
            .json(&request)
            .send()
            .await
            .map_err(|e| ShannonError::ProviderError(format!("local provider request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ShannonError::ProviderError(format!(
                "local provider error ({status}): {body}"
            )));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ShannonError::ProviderError(format!("failed to parse local provider response: {e}")))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ShannonError::ProviderError("local provider returned no choices".to_string()))?;

        let (input_tokens, output_tokens) = parsed
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or((0, 0));

        Ok(RawCompletion {
            content: choice.message.content,
            tool_calls: Vec::new(),
            input_tokens,
            output_tokens,
            hit_max_tokens: choice.finish_reason.as_deref() == Some("length"),
        })
    }

    async fn raw_count_tokens(&self, text: &str) -> Result<u32> {
        Ok((text.len() / 4).max(1) as u32)
    }

    fn context_window(&self) -> u32 {
        self.context_window
    }

    fn supports_native_tools(&self) -> bool {
        false
    }
}
