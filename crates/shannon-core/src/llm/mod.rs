pub mod anthropic;
pub mod factory;
pub mod native;
pub mod openai_compatible;
pub mod provider;
pub mod react_fallback;
pub mod types;

pub use anthropic::AnthropicBackend;
pub use factory::build_provider;
pub use openai_compatible::OpenAiCompatibleBackend;
pub use provider::{LLMProvider, RawBackend, RawCompletion, StreamResponse};
pub use types::{LLMResponse, Message, MessageRole, StopReason, StreamChunk, ToolCall, ToolSchema};
