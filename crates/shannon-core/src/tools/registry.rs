//! Central tool registry with permission-filtered exposure.

use std::collections::HashMap;
use std::sync::Arc;

use crate::auth::PermissionLevel;
use crate::llm::ToolSchema;

use super::traits::Tool;

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Exactly the subset whose `required_permission <= level`, converted
    /// to the schema shape the LLM provider abstraction expects.
    pub fn schemas_for(&self, level: PermissionLevel) -> Vec<ToolSchema> {
        self.tools
            .values()
            .filter(|t| t.required_permission() <= level)
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters(),
            })
            .collect()
    }

    /// Tools allowed for `level`, as live handles (used by the planner,
    /// which invokes tools directly rather than through an LLM response).
    pub fn tools_for(&self, level: PermissionLevel) -> Vec<Arc<dyn Tool>> {
        self.tools
            .values()
            .filter(|t| t.required_permission() <= level)
            .cloned()
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::traits::ToolResult;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct DummyTool {
        name: &'static str,
        level: PermissionLevel,
    }

    #[async_trait]
    impl Tool for DummyTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "a dummy tool"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object"})
        }
        fn required_permission(&self) -> PermissionLevel {
            self.level
        }
        async fn execute(&self, _args: Value) -> ToolResult {
            ToolResult::ok("done")
        }
    }

    #[test]
    fn schemas_for_filters_by_permission() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(DummyTool {
            name: "shell",
            level: PermissionLevel::Operator,
        }));
        reg.register(Arc::new(DummyTool {
            name: "help",
            level: PermissionLevel::Public,
        }));

        let public_schemas = reg.schemas_for(PermissionLevel::Public);
        assert_eq!(public_schemas.len(), 1);
        assert_eq!(public_schemas[0].name, "help");

        let operator_schemas = reg.schemas_for(PermissionLevel::Operator);
        assert_eq!(operator_schemas.len(), 2);
    }

    #[test]
    fn overwrite_same_name() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(DummyTool {
            name: "shell",
            level: PermissionLevel::Operator,
        }));
        reg.register(Arc::new(DummyTool {
            name: "shell",
            level: PermissionLevel::Admin,
        }));
        assert_eq!(reg.len(), 1);
    }
}
