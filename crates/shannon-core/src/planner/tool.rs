//! The `plan` tool: exposes [`super::engine::Planner`] to the tool-use loop
//! itself.
//!
//! Per spec §9, the planner cannot hold a reference to this tool (it would
//! be able to invoke itself recursively), so the composition root builds
//! the planner against a tool map that excludes `plan`, then wraps the
//! already-built planner in this tool and appends it to the registry the
//! executor actually uses.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::PermissionLevel;
use crate::tools::{Tool, ToolResult};

use super::engine::Planner;

/// Permission required to invoke `plan` directly as a tool, and the level
/// the planner runs its own step execution at — the tool has no way to
/// learn the calling user's actual effective permission (`Tool::execute`
/// takes only its JSON arguments), so it runs at its own required level
/// rather than the caller's.
const PLAN_TOOL_LEVEL: PermissionLevel = PermissionLevel::Trusted;

pub struct PlanTool {
    planner: Arc<Planner>,
}

impl PlanTool {
    pub fn new(planner: Arc<Planner>) -> Self {
        Self { planner }
    }
}

#[async_trait]
impl Tool for PlanTool {
    fn name(&self) -> &str {
        "plan"
    }

    fn description(&self) -> &str {
        "Decompose a goal into a multi-step plan, execute it step by step, and report the outcome."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "goal": {"type": "string", "description": "the objective to decompose and carry out"},
                "channel": {"type": "string", "description": "\"platform:channel\" progress messages are published to"}
            },
            "required": ["goal"]
        })
    }

    fn required_permission(&self) -> PermissionLevel {
        PLAN_TOOL_LEVEL
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let Some(goal) = args.get("goal").and_then(|v| v.as_str()) else {
            return ToolResult::err("missing required \"goal\" string argument");
        };
        let channel = args
            .get("channel")
            .and_then(|v| v.as_str())
            .unwrap_or("system:planner");

        let mut plan = match self.planner.create_plan(goal, channel, PLAN_TOOL_LEVEL, None).await {
            Ok(plan) => plan,
            Err(e) => return ToolResult::err(format!("failed to create plan: {e}")),
        };

        if let Err(e) = self.planner.execute(&mut plan, PLAN_TOOL_LEVEL).await {
            return ToolResult::err(format!("failed to execute plan: {e}"));
        }

        ToolResult::ok(format!(
            "plan {} ({} steps) finished with status {:?}",
            plan.id,
            plan.steps.len(),
            plan.status
        ))
    }
}
