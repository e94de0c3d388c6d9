//! The bounded tool-use loop: `LLM -> tool calls -> tool results -> LLM ...`
//!
//! Grounded on the teacher's `agent/loop_.rs` algorithm: call the provider,
//! and if it asks for tools, validate each against the caller's permission
//! (redundant defense — the exposed schema was already filtered), execute,
//! append results, and loop until the model stops asking or the iteration
//! cap is hit.

use std::sync::Arc;

use tracing::warn;

use crate::auth::PermissionLevel;
use crate::llm::{LLMProvider, LLMResponse, Message, MessageRole, StopReason, ToolCall, ToolSchema};
use crate::tools::{Tool, ToolRegistry, ToolResult};
use crate::error::Result;

const MAX_ITERATIONS: usize = 10;

pub struct ToolExecutor {
    provider: Arc<dyn LLMProvider>,
    registry: Arc<ToolRegistry>,
}

/// What a completed tool-use loop produced.
pub struct ExecutorOutcome {
    pub final_content: String,
    /// Set when the iteration cap was hit before the model reached `end_turn`.
    pub exhausted: bool,
}

impl ToolExecutor {
    pub fn new(provider: Arc<dyn LLMProvider>, registry: Arc<ToolRegistry>) -> Self {
        Self { provider, registry }
    }

    /// Run the loop to completion for one user turn. `messages` is the
    /// already-assembled history (system prompt + context + new user
    /// turn); it is extended in place with assistant/tool-result turns as
    /// the loop proceeds, so the caller can persist the final sequence.
    pub async fn run(
        &self,
        messages: &mut Vec<Message>,
        level: PermissionLevel,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<ExecutorOutcome> {
        let tools = self.registry.schemas_for(level);

        for _ in 0..MAX_ITERATIONS {
            let response = self
                .provider
                .complete(messages.clone(), tools.clone(), max_tokens, temperature)
                .await?;

            if response.stop_reason != StopReason::ToolUse || response.tool_calls.is_empty() {
                return Ok(ExecutorOutcome {
                    final_content: response.content,
                    exhausted: false,
                });
            }

            messages.push(Message::assistant(response.content.clone()));
            self.execute_and_append(messages, &response, level).await;
        }

        warn!("tool executor exhausted {MAX_ITERATIONS} iterations without end_turn");
        let last = messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(ExecutorOutcome {
            final_content: format!("{last}\n\n[warning: tool-use loop exhausted its iteration budget]"),
            exhausted: true,
        })
    }

    async fn execute_and_append(
        &self,
        messages: &mut Vec<Message>,
        response: &LLMResponse,
        level: PermissionLevel,
    ) {
        // Independent tool calls execute concurrently.
        let futures = response
            .tool_calls
            .iter()
            .map(|call| self.execute_one(call, level));
        let results = futures::future::join_all(futures).await;

        for (call, result) in response.tool_calls.iter().zip(results) {
            let rendered = if result.success {
                format!("[tool:{}] {}", call.name, result.output)
            } else {
                format!(
                    "[tool:{}] failed: {}",
                    call.name,
                    result.error.unwrap_or_default()
                )
            };
            messages.push(Message {
                role: MessageRole::User,
                content: rendered,
            });
        }
    }

    async fn execute_one(&self, call: &ToolCall, level: PermissionLevel) -> ToolResult {
        let Some(tool) = self.registry.get(&call.name) else {
            return ToolResult::err(format!("unknown tool: {}", call.name));
        };

        if level < tool.required_permission() {
            return ToolResult::err(format!(
                "permission denied: {} requires {:?}",
                call.name,
                tool.required_permission()
            ));
        }

        tool.execute(call.arguments.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::{RawBackend, RawCompletion};
    use crate::llm::build_provider;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct ScriptedBackend {
        turns: parking_lot::Mutex<Vec<RawCompletion>>,
    }

    #[async_trait]
    impl RawBackend for ScriptedBackend {
        async fn raw_complete(
            &self,
            _messages: Vec<Message>,
            _native_tools: Option<Vec<ToolSchema>>,
            _max_tokens: u32,
            _temperature: f32,
        ) -> Result<RawCompletion> {
            let mut turns = self.turns.lock();
            if turns.is_empty() {
                panic!("scripted backend exhausted");
            }
            Ok(turns.remove(0))
        }
        async fn raw_count_tokens(&self, text: &str) -> Result<u32> {
            Ok((text.len() / 4) as u32)
        }
        fn context_window(&self) -> u32 {
            100_000
        }
        fn supports_native_tools(&self) -> bool {
            true
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object"})
        }
        fn required_permission(&self) -> PermissionLevel {
            PermissionLevel::Public
        }
        async fn execute(&self, args: Value) -> ToolResult {
            ToolResult::ok(args.to_string())
        }
    }

    struct OperatorOnlyTool;

    #[async_trait]
    impl Tool for OperatorOnlyTool {
        fn name(&self) -> &str {
            "shell"
        }
        fn description(&self) -> &str {
            "runs a shell command"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object"})
        }
        fn required_permission(&self) -> PermissionLevel {
            PermissionLevel::Operator
        }
        async fn execute(&self, _args: Value) -> ToolResult {
            ToolResult::ok("ran")
        }
    }

    #[tokio::test]
    async fn single_tool_round_trip_then_end_turn() {
        let backend = ScriptedBackend {
            turns: parking_lot::Mutex::new(vec![
                RawCompletion {
                    content: "calling echo".into(),
                    tool_calls: vec![ToolCall {
                        id: "1".into(),
                        name: "echo".into(),
                        arguments: json!({"x": 1}),
                    }],
                    input_tokens: 10,
                    output_tokens: 5,
                    hit_max_tokens: false,
                },
                RawCompletion {
                    content: "done".into(),
                    tool_calls: vec![],
                    input_tokens: 10,
                    output_tokens: 5,
                    hit_max_tokens: false,
                },
            ]),
        };
        let provider = build_provider(Arc::new(backend));
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        let executor = ToolExecutor::new(provider, Arc::new(registry));
        let mut messages = vec![Message::user("please echo")];
        let outcome = executor
            .run(&mut messages, PermissionLevel::Public, 1024, 0.7)
            .await
            .unwrap();

        assert_eq!(outcome.final_content, "done");
        assert!(!outcome.exhausted);
    }

    #[tokio::test]
    async fn insufficient_permission_rejected_even_if_model_requests_it() {
        let backend = ScriptedBackend {
            turns: parking_lot::Mutex::new(vec![
                RawCompletion {
                    content: "calling shell".into(),
                    tool_calls: vec![ToolCall {
                        id: "1".into(),
                        name: "shell".into(),
                        arguments: json!({"command": "ls"}),
                    }],
                    input_tokens: 10,
                    output_tokens: 5,
                    hit_max_tokens: false,
                },
                RawCompletion {
                    content: "could not run".into(),
                    tool_calls: vec![],
                    input_tokens: 10,
                    output_tokens: 5,
                    hit_max_tokens: false,
                },
            ]),
        };
        let provider = build_provider(Arc::new(backend));
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(OperatorOnlyTool));

        let executor = ToolExecutor::new(provider, Arc::new(registry));
        // Public caller: schemas_for already excludes `shell`, but even if
        // the model somehow emits the call, redundant enforcement denies it.
        let mut messages = vec![Message::user("run ls")];
        let outcome = executor
            .run(&mut messages, PermissionLevel::Public, 1024, 0.7)
            .await
            .unwrap();
        assert_eq!(outcome.final_content, "could not run");
        assert!(messages.iter().any(|m| m.content.contains("permission denied")));
    }

    #[tokio::test]
    async fn exhaustion_sets_warning_flag() {
        let mut turns = Vec::new();
        for _ in 0..(MAX_ITERATIONS + 2) {
            turns.push(RawCompletion {
                content: "still working".into(),
                tool_calls: vec![ToolCall {
                    id: "1".into(),
                    name: "echo".into(),
                    arguments: json!({}),
                }],
                input_tokens: 10,
                output_tokens: 5,
                hit_max_tokens: false,
            });
        }
        let backend = ScriptedBackend {
            turns: parking_lot::Mutex::new(turns),
        };
        let provider = build_provider(Arc::new(backend));
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        let executor = ToolExecutor::new(provider, Arc::new(registry));
        let mut messages = vec![Message::user("loop forever")];
        let outcome = executor
            .run(&mut messages, PermissionLevel::Public, 1024, 0.7)
            .await
            .unwrap();
        assert!(outcome.exhausted);
        assert!(outcome.final_content.contains("exhausted"));
    }
}
