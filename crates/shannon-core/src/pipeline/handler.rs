//! `MessageHandler`: the per-inbound-message orchestration described in
//! spec §4.9 — rate limit, command dispatch, auth, context, tool-use loop,
//! persistence, reply.

use std::sync::Arc;

use tracing::warn;

use crate::auth::AuthManager;
use crate::commands::{CommandContext, CommandHandler};
use crate::context::{summarize_channel, ContextStore, Role};
use crate::error::Result;
use crate::event_bus::{Event, EventBus, IncomingMessage, OutgoingMessage};
use crate::executor::ToolExecutor;
use crate::llm::{LLMProvider, Message};
use crate::memory::MemoryStore;
use crate::prompt::build_system_prompt;
use crate::tools::ToolRegistry;

pub struct MessageHandler {
    auth: Arc<AuthManager>,
    context: Arc<dyn ContextStore>,
    memory: Arc<dyn MemoryStore>,
    commands: Arc<CommandHandler>,
    executor: Arc<ToolExecutor>,
    tools: Arc<ToolRegistry>,
    provider: Arc<dyn LLMProvider>,
    bus: Arc<dyn EventBus>,
    max_tokens: u32,
    temperature: f32,
    summarize_threshold: f32,
    /// Short-circuits step 7 with a stub reply, for tests that want to
    /// exercise the surrounding orchestration without an LLM call.
    dry_run: bool,
}

impl MessageHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        auth: Arc<AuthManager>,
        context: Arc<dyn ContextStore>,
        memory: Arc<dyn MemoryStore>,
        commands: Arc<CommandHandler>,
        executor: Arc<ToolExecutor>,
        tools: Arc<ToolRegistry>,
        provider: Arc<dyn LLMProvider>,
        bus: Arc<dyn EventBus>,
        max_tokens: u32,
        temperature: f32,
        summarize_threshold: f32,
    ) -> Self {
        Self {
            auth,
            context,
            memory,
            commands,
            executor,
            tools,
            provider,
            bus,
            max_tokens,
            temperature,
            summarize_threshold,
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub async fn handle(&self, msg: IncomingMessage) -> Result<()> {
        if !self.auth.check_rate_limit(&msg.platform, &msg.user_id) {
            self.reply(&msg, "rate limited").await;
            return Ok(());
        }

        let level = self.auth.effective_permission(&msg.platform, &msg.user_id);

        if msg.content.starts_with('/') {
            let ctx = CommandContext {
                platform: &msg.platform,
                channel: &msg.channel,
                user_id: &msg.user_id,
                level,
            };
            let reply = self.commands.handle(&ctx, &msg.content).await;
            self.reply(&msg, &reply).await;
            return Ok(());
        }

        self.maybe_summarize(&msg).await?;

        let tools = self.tools.schemas_for(level);
        let memory_export = self.memory.export_context(self.max_tokens as usize / 4).await?;
        let system_prompt = build_system_prompt(&tools, &memory_export);

        self.context
            .append(&msg.platform, &msg.channel, Role::User, &msg.content, estimate_tokens(&msg.content))
            .await?;

        let history = self.context.get_context(&msg.platform, &msg.channel).await?;
        let mut messages = vec![Message::system(system_prompt)];
        messages.extend(history.iter().map(|m| match m.role {
            Role::User => Message::user(m.content.clone()),
            Role::Assistant => Message::assistant(m.content.clone()),
            Role::System => Message::system(m.content.clone()),
        }));

        let reply_content = if self.dry_run {
            "[dry run] no LLM call was made".to_string()
        } else {
            match self.executor.run(&mut messages, level, self.max_tokens, self.temperature).await {
                Ok(outcome) => outcome.final_content,
                Err(e) => {
                    warn!(error = %e, "provider call failed, user turn retained for retry");
                    self.reply(&msg, "sorry, something went wrong talking to the model — please try again").await;
                    return Ok(());
                }
            }
        };

        self.context
            .append(
                &msg.platform,
                &msg.channel,
                Role::Assistant,
                &reply_content,
                estimate_tokens(&reply_content),
            )
            .await?;

        self.reply(&msg, &reply_content).await;
        Ok(())
    }

    async fn maybe_summarize(&self, msg: &IncomingMessage) -> Result<()> {
        let stats = self.context.stats(&msg.platform, &msg.channel).await?;
        let window = self.provider.context_window() as u64;
        let budget = (window as f32 * self.summarize_threshold) as u64;
        if stats.token_estimate_total > budget {
            summarize_channel(self.context.as_ref(), self.provider.as_ref(), &msg.platform, &msg.channel).await?;
        }
        Ok(())
    }

    async fn reply(&self, msg: &IncomingMessage, content: &str) {
        self.bus.publish(Event::MessageOutgoing(OutgoingMessage {
            platform: msg.platform.clone(),
            channel: msg.channel.clone(),
            content: content.to_string(),
            reply_to: None,
        }));
    }
}

/// Rough token estimate (chars / 4), matching the heuristic used elsewhere
/// in the crate (e.g. `MemoryStore::export_context`'s budget math).
fn estimate_tokens(text: &str) -> u32 {
    (text.len() / 4).max(1) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::UserLists;
    use crate::context::SqliteContextStore;
    use crate::llm::build_provider;
    use crate::llm::provider::{RawBackend, RawCompletion};
    use crate::llm::ToolSchema;
    use crate::memory::SqliteMemoryStore;
    use crate::pause::PauseManager;
    use crate::scheduler::{SqliteJobStore, TokioScheduler};
    use async_trait::async_trait;
    use std::time::Duration as StdDuration;

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

    fn scripted_provider(contents: Vec<&str>) -> Arc<dyn LLMProvider> {
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

    async fn make_handler_with_rate_limit(
        provider: Arc<dyn LLMProvider>,
        dry_run: bool,
        rate_limit_per_minute: usize,
    ) -> (MessageHandler, Arc<dyn EventBus>) {
        let auth = Arc::new(AuthManager::new(
            UserLists::default(),
            rate_limit_per_minute,
            StdDuration::from_secs(60),
        ));
        let context: Arc<dyn ContextStore> = Arc::new(SqliteContextStore::open_in_memory().unwrap());
        let memory: Arc<dyn MemoryStore> = Arc::new(SqliteMemoryStore::open_in_memory().unwrap());
        let bus: Arc<dyn EventBus> = Arc::new(crate::event_bus::TokioEventBus::with_capacity(16));
        let pause = PauseManager::new();
        let job_store = Arc::new(SqliteJobStore::open_in_memory().unwrap());
        let scheduler = TokioScheduler::new(job_store, bus.clone(), pause.clone(), StdDuration::from_secs(1800), false)
            .await
            .unwrap();
        let commands = Arc::new(CommandHandler::new(
            auth.clone(),
            context.clone(),
            memory.clone(),
            pause.clone(),
            scheduler.clone(),
            provider.clone(),
        ));
        let tools = Arc::new(ToolRegistry::new());
        let executor = Arc::new(ToolExecutor::new(provider.clone(), tools.clone()));

        let handler = MessageHandler::new(
            auth, context, memory, commands, executor, tools, provider, bus.clone(), 4096, 0.7, 0.7,
        )
        .with_dry_run(dry_run);
        (handler, bus)
    }

    async fn make_handler(provider: Arc<dyn LLMProvider>, dry_run: bool) -> (MessageHandler, Arc<dyn EventBus>) {
        make_handler_with_rate_limit(provider, dry_run, 100).await
    }

    fn subscribe_outgoing(bus: &Arc<dyn EventBus>) -> tokio::sync::mpsc::UnboundedReceiver<OutgoingMessage> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        bus.subscribe(
            crate::event_bus::EventType::MessageOutgoing,
            Arc::new(move |event| {
                let tx = tx.clone();
                Box::pin(async move {
                    if let Event::MessageOutgoing(msg) = event {
                        let _ = tx.send(msg);
                    }
                })
            }),
        );
        rx
    }

    #[tokio::test]
    async fn rate_limited_user_gets_short_reply_and_no_llm_call() {
        let provider = scripted_provider(vec!["hi"]);
        let (handler, bus) = make_handler_with_rate_limit(provider, false, 1).await;
        let mut rx = subscribe_outgoing(&bus);

        let msg = IncomingMessage::new("discord", "ch1", "u1", "hello");
        handler.handle(msg.clone()).await.unwrap();
        handler.handle(msg).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert!(!first.content.contains("rate limited"));
        let second = rx.recv().await.unwrap();
        assert!(second.content.contains("rate limited"));
    }

    #[tokio::test]
    async fn slash_command_short_circuits_llm() {
        let provider = scripted_provider(vec![]);
        let (handler, bus) = make_handler(provider, false).await;
        let mut rx = subscribe_outgoing(&bus);

        let msg = IncomingMessage::new("discord", "ch1", "u1", "/help");
        handler.handle(msg).await.unwrap();

        let reply = rx.recv().await.unwrap();
        assert!(reply.content.contains("Commands:"));
    }

    #[tokio::test]
    async fn dry_run_skips_llm_and_persists_turns() {
        let provider = scripted_provider(vec![]);
        let (handler, bus) = make_handler(provider, true).await;
        let mut rx = subscribe_outgoing(&bus);

        let msg = IncomingMessage::new("discord", "ch1", "u1", "hello there");
        handler.handle(msg).await.unwrap();

        let reply = rx.recv().await.unwrap();
        assert!(reply.content.contains("dry run"));

        let stats = handler.context.stats("discord", "ch1").await.unwrap();
        assert_eq!(stats.message_count, 2);
    }

    #[tokio::test]
    async fn normal_message_gets_llm_reply() {
        let provider = scripted_provider(vec!["hi there"]);
        let (handler, bus) = make_handler(provider, false).await;
        let mut rx = subscribe_outgoing(&bus);

        let msg = IncomingMessage::new("discord", "ch1", "u1", "hello");
        handler.handle(msg).await.unwrap();

        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.content, "hi there");
    }
}
