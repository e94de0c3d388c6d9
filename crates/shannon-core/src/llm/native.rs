//! Adapter for backends with vendor-native tool calling.

use async_trait::async_trait;
use std::sync::Arc;

use super::provider::{LLMProvider, RawBackend, StreamResponse};
use super::types::{LLMResponse, Message, StopReason, ToolSchema};
use crate::error::Result;

/// Passes tool schemas straight through to the backend and trusts its
/// native `tool_calls` / stop-reason signal.
pub struct NativeToolUseProvider {
    backend: Arc<dyn RawBackend>,
}

impl NativeToolUseProvider {
    pub fn new(backend: Arc<dyn RawBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl LLMProvider for NativeToolUseProvider {
    async fn complete(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolSchema>,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<LLMResponse> {
        let raw = self
            .backend
            .raw_complete(messages, Some(tools), max_tokens, temperature)
            .await?;

        let stop_reason = if !raw.tool_calls.is_empty() {
            StopReason::ToolUse
        } else if raw.hit_max_tokens {
            StopReason::MaxTokens
        } else {
            StopReason::EndTurn
        };

        Ok(LLMResponse {
            content: raw.content,
            tool_calls: raw.tool_calls,
            stop_reason,
            input_tokens: raw.input_tokens,
            output_tokens: raw.output_tokens,
        })
    }

    async fn stream(
        &self,
        _messages: Vec<Message>,
        _tools: Vec<ToolSchema>,
        _max_tokens: u32,
        _temperature: f32,
    ) -> Result<StreamResponse> {
        Err(crate::error::ShannonError::Internal(
            "streaming not implemented for this backend".into(),
        ))
    }

    async fn count_tokens(&self, text: &str) -> Result<u32> {
        self.backend.raw_count_tokens(text).await
    }

    fn context_window(&self) -> u32 {
        self.backend.context_window()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::RawCompletion;
    use crate::llm::types::ToolCall;

    struct StubBackend {
        tool_calls: Vec<ToolCall>,
    }

    #[async_trait]
    impl RawBackend for StubBackend {
        async fn raw_complete(
            &self,
            _messages: Vec<Message>,
            _native_tools: Option<Vec<ToolSchema>>,
            _max_tokens: u32,
            _temperature: f32,
        ) -> Result<RawCompletion> {
            Ok(RawCompletion {
                content: "ok".into(),
                tool_calls: self.tool_calls.clone(),
                input_tokens: 10,
                output_tokens: 5,
                hit_max_tokens: false,
            })
        }
        async fn raw_count_tokens(&self, text: &str) -> Result<u32> {
            Ok((text.len() / 4) as u32)
        }
        fn context_window(&self) -> u32 {
            128_000
        }
        fn supports_native_tools(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn tool_calls_present_yields_tool_use() {
        let backend = StubBackend {
            tool_calls: vec![ToolCall {
                id: "1".into(),
                name: "shell".into(),
                arguments: serde_json::json!({"command": "ls"}),
            }],
        };
        let provider = NativeToolUseProvider::new(Arc::new(backend));
        let resp = provider
            .complete(vec![Message::user("run ls")], vec![], 1024, 0.7)
            .await
            .unwrap();
        assert_eq!(resp.stop_reason, StopReason::ToolUse);
        assert_eq!(resp.tool_calls.len(), 1);
    }

    #[tokio::test]
    async fn no_tool_calls_yields_end_turn() {
        let backend = StubBackend { tool_calls: vec![] };
        let provider = NativeToolUseProvider::new(Arc::new(backend));
        let resp = provider
            .complete(vec![Message::user("hi")], vec![], 1024, 0.7)
            .await
            .unwrap();
        assert_eq!(resp.stop_reason, StopReason::EndTurn);
    }
}
