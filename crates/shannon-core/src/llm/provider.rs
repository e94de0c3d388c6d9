//! The [`LLMProvider`] trait consumed by the tool executor, plus the
//! [`RawBackend`] seam concrete vendor SDKs plug into.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use super::types::{LLMResponse, Message, StreamChunk, ToolCall, ToolSchema};
use crate::error::Result;

pub type StreamResponse = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// What the Tool Executor talks to. Implemented by [`super::native::NativeToolUseProvider`]
/// and [`super::react_fallback::ReactProvider`], both of which wrap a [`RawBackend`].
#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn complete(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolSchema>,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<LLMResponse>;

    async fn stream(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolSchema>,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<StreamResponse>;

    async fn count_tokens(&self, text: &str) -> Result<u32>;

    fn context_window(&self) -> u32;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// One raw completion turn against a vendor's wire format, with no
/// knowledge of the tool-use / ReAct distinction. Concrete vendor SDKs
/// (Anthropic, OpenAI-compatible, local) implement this trait; Shannon's
/// core only consumes it through the two adapters above.
#[async_trait]
pub trait RawBackend: Send + Sync {
    /// `native_tools`, when the backend supports structured tool calling,
    /// is passed through to the vendor API as-is; backends without native
    /// support should ignore it (the ReAct adapter never passes it).
    async fn raw_complete(
        &self,
        messages: Vec<Message>,
        native_tools: Option<Vec<ToolSchema>>,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<RawCompletion>;

    async fn raw_count_tokens(&self, text: &str) -> Result<u32>;

    fn context_window(&self) -> u32;

    fn supports_native_tools(&self) -> bool;
}

/// What a [`RawBackend`] returns: plain content, optionally with
/// vendor-native tool calls already parsed out.
#[derive(Debug, Clone)]
pub struct RawCompletion {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub hit_max_tokens: bool,
}
