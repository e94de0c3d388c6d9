//! Composition root for the Shannon agent.
//!
//! Mirrors the teacher's `lib.rs`/`main.rs` split: every subsystem is built
//! here and wired together with `Arc::clone`, while `shannon-cli` only
//! parses arguments, sets up tracing, and drives start/shutdown.

pub mod auth;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod event_bus;
pub mod executor;
pub mod llm;
pub mod memory;
pub mod pause;
pub mod pipeline;
pub mod planner;
pub mod prompt;
pub mod scheduler;
pub mod tools;
pub mod webhook;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use directories::ProjectDirs;
use tracing::{info, warn};

use auth::{AuthManager, UserLists};
use commands::CommandHandler;
use config::{AppConfig, LlmConfig};
use context::{ContextStore, SqliteContextStore};
use error::{Result, ShannonError};
use event_bus::{Event, EventBus, EventType, IncomingMessage, TokioEventBus, WebhookEvent};
use executor::ToolExecutor;
use llm::{build_provider, AnthropicBackend, LLMProvider, OpenAiCompatibleBackend, RawBackend};
use memory::{MemoryStore, SqliteMemoryStore};
use pause::PauseManager;
use pipeline::MessageHandler;
use planner::{Planner, PlanTool, SqlitePlanStore};
use scheduler::{Scheduler, SqliteJobStore, TokioScheduler};
use tools::{Tool, ToolRegistry};
use webhook::WebhookServer;

/// Resolves the on-disk layout — SQLite files and log output — under a
/// single base directory.
///
/// Honors [`AppConfig::data_dir`] when set, otherwise falls back to the
/// platform data directory via `directories::ProjectDirs`, the same
/// qualifier/organization/application triple `config::default_config_path`
/// uses for the config file location.
pub struct DataDir(PathBuf);

impl DataDir {
    pub fn resolve(config: &AppConfig) -> Result<Self> {
        let base = match &config.data_dir {
            Some(dir) => PathBuf::from(dir),
            None => ProjectDirs::from("dev", "shannon-agent", "shannon")
                .map(|dirs| dirs.data_dir().to_path_buf())
                .ok_or_else(|| {
                    ShannonError::Internal("could not determine a platform data directory".to_string())
                })?,
        };
        Ok(Self(base))
    }

    pub fn ensure_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.0)?;
        std::fs::create_dir_all(self.log_dir())?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    pub fn context_db(&self) -> PathBuf {
        self.0.join("context.db")
    }

    pub fn memory_db(&self) -> PathBuf {
        self.0.join("memory.db")
    }

    pub fn plans_db(&self) -> PathBuf {
        self.0.join("plans.db")
    }

    pub fn jobs_db(&self) -> PathBuf {
        self.0.join("jobs.db")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.0.join("logs")
    }
}

/// The bare user id under which synthetic, webhook-derived turns are run.
/// Registered into `operator_users` by the composition root so it resolves
/// to [`auth::PermissionLevel::Operator`] on every platform, per spec
/// §4.12's "synthesize an `IncomingMessage` ... marked operator-level."
const WEBHOOK_SYNTHETIC_USER_ID: &str = "shannon-webhook";

/// Renders a webhook endpoint's `prompt_template` against the normalized
/// event, e.g. `"GitHub {event_type}: {summary}"`.
fn render_webhook_template(template: &str, event: &WebhookEvent) -> String {
    template
        .replace("{source}", &event.source)
        .replace("{event_type}", &event.event_type)
        .replace("{summary}", &event.summary)
        .replace("{channel_target}", &event.channel_target)
}

fn build_llm_provider(config: &LlmConfig) -> Result<Arc<dyn LLMProvider>> {
    let backend: Arc<dyn RawBackend> = match config.provider.as_str() {
        "anthropic" => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                ShannonError::ValidationFailure("llm.api_key is required for the \"anthropic\" provider".to_string())
            })?;
            Arc::new(AnthropicBackend::new(api_key, config.model.clone()))
        }
        "local" => {
            let endpoint = config.local_endpoint.clone().ok_or_else(|| {
                ShannonError::ValidationFailure(
                    "llm.local_endpoint is required for the \"local\" provider".to_string(),
                )
            })?;
            Arc::new(OpenAiCompatibleBackend::new(
                endpoint,
                config.model.clone(),
                config.api_key.clone(),
            ))
        }
        other => {
            return Err(ShannonError::ValidationFailure(format!(
                "unknown llm.provider {other:?} (expected \"anthropic\" or \"local\")"
            )))
        }
    };
    Ok(build_provider(backend))
}

/// Builds a fully-wired [`Shannon`] instance from a loaded [`AppConfig`]
/// and the caller's tool implementations.
///
/// Concrete [`Tool`] bodies (shell, browser, PTY, ...) live outside this
/// crate; callers supply them here. A tool named `plan` is rejected — that
/// name is reserved for the synthesized meta-tool that wraps the planner.
pub struct ShannonBuilder {
    config: AppConfig,
    tools: Vec<Arc<dyn Tool>>,
}

impl ShannonBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            tools: Vec::new(),
        }
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_tools(mut self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub async fn build(self) -> Result<Shannon> {
        if self.tools.iter().any(|t| t.name() == "plan") {
            return Err(ShannonError::ValidationFailure(
                "a tool named \"plan\" is reserved for the planner's own meta-tool".to_string(),
            ));
        }

        let data_dir = DataDir::resolve(&self.config)?;
        data_dir.ensure_exists()?;

        let bus: Arc<dyn EventBus> = Arc::new(TokioEventBus::new());

        let mut operator_users = self.config.auth.operator_users.clone();
        operator_users.push(WEBHOOK_SYNTHETIC_USER_ID.to_string());
        let user_lists = UserLists {
            admin_users: self.config.auth.admin_users.clone(),
            operator_users,
            trusted_users: self.config.auth.trusted_users.clone(),
        };
        let auth = Arc::new(AuthManager::new(
            user_lists,
            self.config.auth.rate_limit_per_minute,
            Duration::from_secs(self.config.auth.sudo_timeout_seconds),
        ));

        let context: Arc<dyn ContextStore> = Arc::new(SqliteContextStore::open(&data_dir.context_db())?);
        let memory: Arc<dyn MemoryStore> = Arc::new(SqliteMemoryStore::open(&data_dir.memory_db())?);

        let provider = build_llm_provider(&self.config.llm)?;

        let pause = PauseManager::new();
        let job_store = Arc::new(SqliteJobStore::open(&data_dir.jobs_db())?);
        let scheduler: Arc<dyn Scheduler> = TokioScheduler::new(
            job_store,
            bus.clone(),
            pause.clone(),
            Duration::from_secs(self.config.scheduler.heartbeat_interval_secs),
            self.config.scheduler.heartbeat_enabled,
        )
        .await?;

        // Break the planner <-> `plan`-tool cycle: build the planner against
        // a registry of caller-supplied tools only, then synthesize `plan`
        // around the already-built planner and register it into the
        // separate, final registry the executor and pipeline use. The
        // planner itself never sees `plan` and so cannot invoke itself.
        let mut planner_tools = ToolRegistry::new();
        for tool in &self.tools {
            planner_tools.register(tool.clone());
        }
        let plan_store = Arc::new(SqlitePlanStore::open(&data_dir.plans_db())?);
        let planner = Arc::new(Planner::new(
            provider.clone(),
            Arc::new(planner_tools),
            plan_store,
            bus.clone(),
        ));

        let mut full_tools = ToolRegistry::new();
        for tool in &self.tools {
            full_tools.register(tool.clone());
        }
        full_tools.register(Arc::new(PlanTool::new(planner.clone())));
        let tools = Arc::new(full_tools);

        let executor = Arc::new(ToolExecutor::new(provider.clone(), tools.clone()));
        let commands = Arc::new(CommandHandler::new(
            auth.clone(),
            context.clone(),
            memory.clone(),
            pause.clone(),
            scheduler.clone(),
            provider.clone(),
        ));
        let pipeline = Arc::new(MessageHandler::new(
            auth.clone(),
            context.clone(),
            memory.clone(),
            commands.clone(),
            executor.clone(),
            tools.clone(),
            provider.clone(),
            bus.clone(),
            self.config.llm.max_tokens,
            self.config.llm.temperature,
            self.config.context.summarize_threshold,
        ));

        // Per spec §4.12's trailing paragraph: a subscriber turns each
        // `WebhookReceived` event into a synthetic, operator-level pipeline
        // turn. The webhook server itself already queues events on the
        // pause manager instead of publishing them while paused, so this
        // handler never needs to consult pause state.
        let webhook_pipeline = pipeline.clone();
        bus.subscribe(
            EventType::WebhookReceived,
            Arc::new(move |event| {
                let pipeline = webhook_pipeline.clone();
                Box::pin(async move {
                    let Event::WebhookReceived { event, prompt_template } = event else {
                        return;
                    };
                    let Some((platform, channel)) = event.channel_target.split_once(':') else {
                        warn!(channel_target = %event.channel_target, "malformed webhook channel_target, dropping event");
                        return;
                    };
                    let content = render_webhook_template(&prompt_template, &event);
                    let msg = IncomingMessage::new(platform, channel, WEBHOOK_SYNTHETIC_USER_ID, content);
                    if let Err(e) = pipeline.handle(msg).await {
                        warn!(error = %e, "webhook-derived pipeline invocation failed");
                    }
                })
            }),
        );

        let webhook = if self.config.webhooks.enabled {
            let server = WebhookServer::start(
                &self.config.webhooks.bind,
                self.config.webhooks.port,
                self.config.webhooks.endpoints.clone(),
                bus.clone(),
                pause.clone(),
            )
            .await?;
            info!(addr = %server.local_addr(), "webhook server listening");
            Some(server)
        } else {
            None
        };

        Ok(Shannon {
            bus,
            auth,
            context,
            memory,
            provider,
            tools,
            executor,
            commands,
            pipeline,
            planner,
            scheduler,
            pause,
            webhook,
            data_dir,
        })
    }
}

/// A fully-wired Shannon agent. Subsystems are public so embedders (and
/// `shannon-cli`) can reach into them — e.g. to publish an inbound message
/// onto `bus`, or call `pipeline.handle` directly.
pub struct Shannon {
    pub bus: Arc<dyn EventBus>,
    pub auth: Arc<AuthManager>,
    pub context: Arc<dyn ContextStore>,
    pub memory: Arc<dyn MemoryStore>,
    pub provider: Arc<dyn LLMProvider>,
    pub tools: Arc<ToolRegistry>,
    pub executor: Arc<ToolExecutor>,
    pub commands: Arc<CommandHandler>,
    pub pipeline: Arc<MessageHandler>,
    pub planner: Arc<Planner>,
    pub scheduler: Arc<dyn Scheduler>,
    pub pause: Arc<PauseManager>,
    pub webhook: Option<WebhookServer>,
    pub data_dir: DataDir,
}

impl Shannon {
    /// Starts the scheduler's heartbeat loop. The webhook server (if
    /// enabled) is already running by the time `build()` returns; transport
    /// connections are the caller's responsibility (out of this crate's
    /// scope, per the `Tool` boundary).
    pub async fn start(&self) -> Result<()> {
        self.scheduler.start().await;
        Ok(())
    }

    /// Shuts down every subsystem in dependency order: stop the webhook
    /// server so no new events arrive, stop the scheduler so no new
    /// triggers fire, drain whatever is already queued on the bus, then
    /// close the stores and provider.
    pub async fn shutdown(&self) -> Result<()> {
        if let Some(webhook) = &self.webhook {
            webhook.stop().await;
        }
        self.scheduler.stop().await;
        self.bus.stop(Duration::from_secs(5)).await;
        self.provider.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolResult;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    fn test_config(data_dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.data_dir = Some(data_dir.to_string_lossy().into_owned());
        config.llm.provider = "local".to_string();
        config.llm.local_endpoint = Some("http://127.0.0.1:1".to_string());
        config
    }

    struct NoopTool;

    #[async_trait]
    impl Tool for NoopTool {
        fn name(&self) -> &str {
            "noop"
        }
        fn description(&self) -> &str {
            "does nothing"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object"})
        }
        fn required_permission(&self) -> auth::PermissionLevel {
            auth::PermissionLevel::Public
        }
        async fn execute(&self, _args: Value) -> ToolResult {
            ToolResult::ok("")
        }
    }

    struct ReservedPlanTool;

    #[async_trait]
    impl Tool for ReservedPlanTool {
        fn name(&self) -> &str {
            "plan"
        }
        fn description(&self) -> &str {
            "shadows the reserved name"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object"})
        }
        fn required_permission(&self) -> auth::PermissionLevel {
            auth::PermissionLevel::Public
        }
        async fn execute(&self, _args: Value) -> ToolResult {
            ToolResult::ok("")
        }
    }

    #[tokio::test]
    async fn builds_every_subsystem_and_registers_the_plan_tool() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let shannon = ShannonBuilder::new(config)
            .with_tool(Arc::new(NoopTool))
            .build()
            .await
            .unwrap();

        assert!(shannon.tools.get("noop").is_some());
        assert!(shannon.tools.get("plan").is_some());
        assert!(shannon.webhook.is_none());
    }

    #[tokio::test]
    async fn caller_supplied_plan_tool_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let result = ShannonBuilder::new(config).with_tool(Arc::new(ReservedPlanTool)).build().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn missing_api_key_for_anthropic_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.data_dir = Some(dir.path().to_string_lossy().into_owned());
        config.llm.provider = "anthropic".to_string();
        config.llm.api_key = None;
        let result = ShannonBuilder::new(config).build().await;
        assert!(result.is_err());
    }

    #[test]
    fn data_dir_honors_explicit_override() {
        let mut config = AppConfig::default();
        config.data_dir = Some("/tmp/shannon-test-dir".to_string());
        let data_dir = DataDir::resolve(&config).unwrap();
        assert_eq!(data_dir.path(), Path::new("/tmp/shannon-test-dir"));
        assert_eq!(data_dir.context_db(), Path::new("/tmp/shannon-test-dir/context.db"));
    }

    #[tokio::test]
    async fn webhook_post_drives_a_downstream_reply() {
        use crate::config::WebhookEndpointConfig;
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.webhooks.enabled = true;
        config.webhooks.bind = "127.0.0.1".to_string();
        config.webhooks.port = 0;
        config.webhooks.endpoints = vec![WebhookEndpointConfig {
            name: "github".to_string(),
            path: "/hooks/github".to_string(),
            secret: "gh".to_string(),
            channel: "discord:42".to_string(),
            prompt_template: "GitHub {event_type}: {summary}".to_string(),
        }];

        let shannon = ShannonBuilder::new(config).build().await.unwrap();
        let server_addr = shannon.webhook.as_ref().unwrap().local_addr();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        shannon.bus.subscribe(
            event_bus::EventType::MessageOutgoing,
            Arc::new(move |event| {
                let tx = tx.clone();
                Box::pin(async move {
                    if let Event::MessageOutgoing(msg) = event {
                        let _ = tx.send(msg);
                    }
                })
            }),
        );

        let body = br#"{"commits":[{}],"repository":{"full_name":"acme/widgets"},"pusher":{"name":"octocat"}}"#;
        let mut mac = Hmac::<Sha256>::new_from_slice(b"gh").unwrap();
        mac.update(body);
        let sig = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));

        let client = reqwest::Client::new();
        let resp = client
            .post(format!("http://{server_addr}/hooks/github"))
            .header("x-hub-signature-256", sig)
            .header("x-github-event", "push")
            .body(body.to_vec())
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let outgoing = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("expected a downstream reply produced from the webhook")
            .expect("outgoing channel closed without a reply");
        assert_eq!(outgoing.platform, "discord");
        assert_eq!(outgoing.channel, "42");
    }
}
