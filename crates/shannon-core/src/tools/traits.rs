//! The [`Tool`] contract the core consumes; concrete bodies (shell,
//! browser, PTY, delegated CLI) live outside this crate and are reached
//! only through this trait.

use async_trait::async_trait;
use serde_json::Value;

use crate::auth::PermissionLevel;

/// Outcome of a tool execution. `ToolFailure` (the `success = false` case)
/// never propagates as an `Err` past the executor — it is fed back to the
/// LLM as an observation, per spec.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            success: false,
            output: String::new(),
            error: Some(error),
        }
    }
}

/// A capability the tool-use loop (or planner) can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    /// JSON-schema object describing accepted parameters.
    fn parameters(&self) -> Value;

    /// Minimum permission level a caller must hold to invoke this tool.
    fn required_permission(&self) -> PermissionLevel;

    async fn execute(&self, args: Value) -> ToolResult;

    /// Release any resources held between invocations (e.g. a PTY
    /// session). Default no-op for stateless tools.
    async fn cleanup(&self) {}
}
