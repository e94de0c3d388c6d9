//! Multi-step plan creation, execution, and failure adjudication.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::PermissionLevel;
use crate::event_bus::{Event, EventBus, OutgoingMessage};
use crate::llm::{LLMProvider, Message};
use crate::tools::ToolRegistry;
use crate::error::{Result, ShannonError};

use super::sqlite_store::SqlitePlanStore;
use super::traits::{FailureAction, Plan, PlanStatus, PlanStep, RawPlan, StepStatus};

const MAX_STEPS: usize = 8;
const MAX_TOOL_INVOCATIONS: usize = 15;
const PLAN_MAX_TOKENS: u32 = 1024;
const REASONING_MAX_TOKENS: u32 = 512;

const PLAN_SCHEMA_PROMPT: &str = r#"Respond with ONLY a JSON object of the shape:
{"steps": [{"description": "...", "tool": "name or null", "parameters": {"...": "..."} or null}]}
Use a tool name only from the list provided. Omit "tool" (or set it null) for steps that
require reasoning rather than a tool call. If "tool" is set, "parameters" must be a JSON object."#;

pub struct Planner {
    provider: Arc<dyn LLMProvider>,
    tools: Arc<ToolRegistry>,
    store: Arc<SqlitePlanStore>,
    bus: Arc<dyn EventBus>,
}

impl Planner {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        tools: Arc<ToolRegistry>,
        store: Arc<SqlitePlanStore>,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            provider,
            tools,
            store,
            bus,
        }
    }

    /// Decompose `goal` into a capped, validated step sequence and persist
    /// it with status `Planning`.
    pub async fn create_plan(
        &self,
        goal: &str,
        channel: &str,
        level: PermissionLevel,
        context: Option<&str>,
    ) -> Result<Plan> {
        let tool_names: Vec<String> = self
            .tools
            .tools_for(level)
            .iter()
            .map(|t| t.name().to_string())
            .collect();

        let mut prompt = format!(
            "Goal: {goal}\nAvailable tools: {}\n\n{PLAN_SCHEMA_PROMPT}",
            tool_names.join(", ")
        );
        if let Some(ctx) = context {
            prompt.push_str(&format!("\n\nRelevant context:\n{ctx}"));
        }

        let response = self
            .provider
            .complete(vec![Message::user(prompt)], Vec::new(), PLAN_MAX_TOKENS, 0.2)
            .await?;

        let raw: RawPlan = serde_json::from_str(response.content.trim())
            .map_err(|e| ShannonError::ValidationFailure(format!("plan response was not valid JSON: {e}")))?;

        let mut steps = Vec::new();
        for (i, raw_step) in raw.steps.into_iter().take(MAX_STEPS).enumerate() {
            if raw_step.tool.is_some() && raw_step.parameters.is_none() {
                return Err(ShannonError::ValidationFailure(format!(
                    "step {} sets a tool but no parameters object",
                    i + 1
                )));
            }
            steps.push(PlanStep {
                id: (i + 1) as u32,
                description: raw_step.description,
                tool: raw_step.tool,
                parameters: raw_step.parameters,
                status: StepStatus::Pending,
                result: None,
                error: None,
            });
        }

        let now = chrono::Utc::now();
        let plan = Plan {
            id: Uuid::new_v4().to_string()[..8].to_string(),
            goal: goal.to_string(),
            steps,
            status: PlanStatus::Planning,
            channel: channel.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.store.upsert(&plan).await?;
        Ok(plan)
    }

    /// Execute every pending step of `plan` in order, persisting after each
    /// state change and publishing a progress message on the plan's
    /// channel.
    pub async fn execute(&self, plan: &mut Plan, level: PermissionLevel) -> Result<()> {
        plan.status = PlanStatus::Executing;
        plan.updated_at = chrono::Utc::now();
        self.store.upsert(plan).await?;

        let mut tool_invocations = 0usize;

        for i in 0..plan.steps.len() {
            if tool_invocations >= MAX_TOOL_INVOCATIONS && plan.steps[i].tool.is_some() {
                plan.steps[i].status = StepStatus::Skipped;
                plan.steps[i].error = Some("Tool invocation cap reached".to_string());
                self.persist_and_announce(plan, i).await?;
                continue;
            }

            plan.steps[i].status = StepStatus::Running;
            self.store.upsert(plan).await?;

            let outcome = self.run_step(plan, i, level).await;
            if plan.steps[i].tool.is_some() {
                tool_invocations += 1;
            }

            match outcome {
                Ok(result) => {
                    plan.steps[i].status = StepStatus::Done;
                    plan.steps[i].result = Some(result);
                }
                Err(error) => {
                    let action = self.handle_failure(plan, i, &error).await;
                    match action {
                        FailureAction::Retry => {
                            let retry = self.run_step(plan, i, level).await;
                            if plan.steps[i].tool.is_some() {
                                tool_invocations += 1;
                            }
                            match retry {
                                Ok(result) => {
                                    plan.steps[i].status = StepStatus::Done;
                                    plan.steps[i].result = Some(result);
                                }
                                Err(e) => {
                                    plan.steps[i].status = StepStatus::Failed;
                                    plan.steps[i].error = Some(e);
                                }
                            }
                        }
                        FailureAction::Skip => {
                            plan.steps[i].status = StepStatus::Skipped;
                            plan.steps[i].error = Some(error);
                        }
                        FailureAction::Abort => {
                            plan.steps[i].status = StepStatus::Failed;
                            plan.steps[i].error = Some(error);
                            plan.status = PlanStatus::Failed;
                            self.persist_and_announce(plan, i).await?;
                            return Ok(());
                        }
                    }
                }
            }

            self.persist_and_announce(plan, i).await?;
        }

        plan.status = PlanStatus::Completed;
        plan.updated_at = chrono::Utc::now();
        self.store.upsert(plan).await?;
        Ok(())
    }

    async fn run_step(&self, plan: &Plan, index: usize, level: PermissionLevel) -> std::result::Result<String, String> {
        let step = &plan.steps[index];
        match &step.tool {
            Some(tool_name) => {
                let Some(tool) = self.tools.get(tool_name) else {
                    return Err(format!("unknown tool: {tool_name}"));
                };
                if level < tool.required_permission() {
                    return Err(format!("permission denied for tool {tool_name}"));
                }
                let args = step.parameters.clone().unwrap_or(serde_json::json!({}));
                let result = tool.execute(args).await;
                if result.success {
                    Ok(result.output)
                } else {
                    Err(result.error.unwrap_or_else(|| "tool failed".to_string()))
                }
            }
            None => {
                let prior = plan
                    .steps
                    .iter()
                    .take(index)
                    .filter_map(|s| s.result.as_deref().map(|r| format!("- {}: {r}", s.description)))
                    .collect::<Vec<_>>()
                    .join("\n");
                let prompt = format!(
                    "Goal: {}\nCurrent step: {}\nPrior step results:\n{prior}",
                    plan.goal, step.description
                );
                let response = self
                    .provider
                    .complete(vec![Message::user(prompt)], Vec::new(), REASONING_MAX_TOKENS, 0.5)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(response.content)
            }
        }
    }

    /// Ask the LLM how to handle a failed step. Parse failure defaults to
    /// `Skip`, per spec.
    async fn handle_failure(&self, plan: &Plan, index: usize, error: &str) -> FailureAction {
        let step = &plan.steps[index];
        let prompt = format!(
            "Plan goal: {}\nStep {} failed: {}\nError: {error}\n\n\
             Respond with ONLY JSON: {{\"action\": \"retry\"|\"skip\"|\"abort\"}}",
            plan.goal, step.id, step.description
        );
        let response = match self
            .provider
            .complete(vec![Message::user(prompt)], Vec::new(), 128, 0.0)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "handle_failure LLM call failed, defaulting to skip");
                return FailureAction::Skip;
            }
        };

        #[derive(serde::Deserialize)]
        struct Decision {
            action: FailureAction,
        }

        serde_json::from_str::<Decision>(response.content.trim())
            .map(|d| d.action)
            .unwrap_or(FailureAction::Skip)
    }

    async fn persist_and_announce(&self, plan: &mut Plan, step_index: usize) -> Result<()> {
        plan.updated_at = chrono::Utc::now();
        self.store.upsert(plan).await?;

        let step = &plan.steps[step_index];
        let (platform, channel) = plan.channel.split_once(':').unwrap_or(("", plan.channel.as_str()));
        let status_word = match step.status {
            StepStatus::Done => "done",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
            StepStatus::Running => "running",
            StepStatus::Pending => "pending",
        };
        info!(plan_id = %plan.id, step = step.id, status = status_word, "plan step finished");
        self.bus.publish(Event::MessageOutgoing(OutgoingMessage {
            platform: platform.to_string(),
            channel: channel.to_string(),
            content: format!(
                "[plan {}] step {}/{} {}: {}",
                plan.id,
                step.id,
                plan.steps.len(),
                status_word,
                step.description
            ),
            reply_to: None,
        }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::TokioEventBus;
    use crate::llm::provider::{RawBackend, RawCompletion};
    use crate::llm::build_provider;
    use crate::llm::ToolSchema;
    use crate::tools::{Tool, ToolResult};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct ScriptedBackend {
        turns: parking_lot::Mutex<Vec<RawCompletion>>,
    }

    impl ScriptedBackend {
        fn with(contents: Vec<&str>) -> Arc<dyn LLMProvider> {
            let turns = contents
                .into_iter()
                .map(|c| RawCompletion {
                    content: c.to_string(),
                    tool_calls: Vec::new(),
                    input_tokens: 10,
                    output_tokens: 5,
                    hit_max_tokens: false,
                })
                .collect();
            build_provider(Arc::new(ScriptedBackend {
                turns: parking_lot::Mutex::new(turns),
            }))
        }
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

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "fail"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object"})
        }
        fn required_permission(&self) -> PermissionLevel {
            PermissionLevel::Public
        }
        async fn execute(&self, _args: Value) -> ToolResult {
            ToolResult::err("boom")
        }
    }

    fn make_planner(provider: Arc<dyn LLMProvider>, registry: ToolRegistry) -> Planner {
        let store = Arc::new(SqlitePlanStore::open_in_memory().unwrap());
        let bus: Arc<dyn EventBus> = Arc::new(TokioEventBus::with_capacity(16));
        Planner::new(provider, Arc::new(registry), store, bus)
    }

    #[tokio::test]
    async fn create_plan_parses_and_caps_steps() {
        let many_steps: Vec<Value> = (0..12)
            .map(|i| json!({"description": format!("step {i}"), "tool": null, "parameters": null}))
            .collect();
        let body = json!({"steps": many_steps}).to_string();
        let provider = ScriptedBackend::with(vec![&body]);

        let planner = make_planner(provider, ToolRegistry::new());
        let plan = planner
            .create_plan("do a lot", "discord:dev", PermissionLevel::Admin, None)
            .await
            .unwrap();
        assert_eq!(plan.steps.len(), MAX_STEPS);
        assert_eq!(plan.status, PlanStatus::Planning);
    }

    #[tokio::test]
    async fn create_plan_rejects_tool_without_parameters() {
        let body = json!({"steps": [{"description": "run it", "tool": "echo", "parameters": null}]}).to_string();
        let provider = ScriptedBackend::with(vec![&body]);

        let planner = make_planner(provider, ToolRegistry::new());
        let err = planner
            .create_plan("goal", "discord:dev", PermissionLevel::Admin, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ShannonError::ValidationFailure(_)));
    }

    #[tokio::test]
    async fn execute_runs_tool_step_to_completion() {
        let body = json!({"steps": [{"description": "echo it", "tool": "echo", "parameters": {"x": 1}}]})
            .to_string();
        let provider = ScriptedBackend::with(vec![&body]);

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        let planner = make_planner(provider, registry);

        let mut plan = planner
            .create_plan("goal", "discord:dev", PermissionLevel::Admin, None)
            .await
            .unwrap();
        planner.execute(&mut plan, PermissionLevel::Admin).await.unwrap();

        assert_eq!(plan.status, PlanStatus::Completed);
        assert_eq!(plan.steps[0].status, StepStatus::Done);
    }

    #[tokio::test]
    async fn execute_aborts_plan_on_abort_decision() {
        let plan_body = json!({"steps": [{"description": "fail it", "tool": "fail", "parameters": {}}]})
            .to_string();
        let abort_decision = json!({"action": "abort"}).to_string();
        let provider = ScriptedBackend::with(vec![&plan_body, &abort_decision]);

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FailingTool));
        let planner = make_planner(provider, registry);

        let mut plan = planner
            .create_plan("goal", "discord:dev", PermissionLevel::Admin, None)
            .await
            .unwrap();
        planner.execute(&mut plan, PermissionLevel::Admin).await.unwrap();

        assert_eq!(plan.status, PlanStatus::Failed);
        assert_eq!(plan.steps[0].status, StepStatus::Failed);
    }

    #[tokio::test]
    async fn execute_skips_on_malformed_failure_decision() {
        let plan_body = json!({"steps": [{"description": "fail it", "tool": "fail", "parameters": {}}]})
            .to_string();
        let provider = ScriptedBackend::with(vec![&plan_body, "not json"]);

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(FailingTool));
        let planner = make_planner(provider, registry);

        let mut plan = planner
            .create_plan("goal", "discord:dev", PermissionLevel::Admin, None)
            .await
            .unwrap();
        planner.execute(&mut plan, PermissionLevel::Admin).await.unwrap();

        assert_eq!(plan.status, PlanStatus::Completed);
        assert_eq!(plan.steps[0].status, StepStatus::Skipped);
    }
}
