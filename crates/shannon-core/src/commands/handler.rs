//! Slash-command dispatch with per-command permission gates.
//!
//! Denials return a short explanation and never fall through to the LLM —
//! the pipeline treats any `CommandHandler::handle` call as terminal for
//! that message.

use std::sync::Arc;

use crate::auth::{AuthManager, PermissionLevel};
use crate::context::{summarize_channel, ContextStore};
use crate::llm::LLMProvider;
use crate::memory::MemoryStore;
use crate::pause::PauseManager;
use crate::scheduler::Scheduler;

/// Identifies the sender and target of a command invocation.
pub struct CommandContext<'a> {
    pub platform: &'a str,
    pub channel: &'a str,
    pub user_id: &'a str,
    pub level: PermissionLevel,
}

pub struct CommandHandler {
    auth: Arc<AuthManager>,
    context: Arc<dyn ContextStore>,
    memory: Arc<dyn MemoryStore>,
    pause: Arc<PauseManager>,
    scheduler: Arc<dyn Scheduler>,
    provider: Arc<dyn LLMProvider>,
}

impl CommandHandler {
    pub fn new(
        auth: Arc<AuthManager>,
        context: Arc<dyn ContextStore>,
        memory: Arc<dyn MemoryStore>,
        pause: Arc<PauseManager>,
        scheduler: Arc<dyn Scheduler>,
        provider: Arc<dyn LLMProvider>,
    ) -> Self {
        Self {
            auth,
            context,
            memory,
            pause,
            scheduler,
            provider,
        }
    }

    /// `raw` is the full message content, including the leading `/`.
    pub async fn handle(&self, ctx: &CommandContext<'_>, raw: &str) -> String {
        let trimmed = raw.trim_start_matches('/');
        let mut parts = trimmed.splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or("").to_ascii_lowercase();
        let rest = parts.next().unwrap_or("").trim();

        match name.as_str() {
            "help" => self.help(),
            "context" => self.cmd_context(ctx).await,
            "summarize" => self.cmd_summarize(ctx).await,
            "forget" => self.cmd_forget(ctx).await,
            "jobs" => self.cmd_jobs(ctx).await,
            "sudo" => self.cmd_sudo(ctx, rest).await,
            "memory" => self.cmd_memory(ctx, rest).await,
            "pause" => self.cmd_pause(ctx, rest).await,
            "resume" => self.cmd_resume(ctx).await,
            "status" => self.cmd_status(ctx).await,
            other => format!("unknown command: /{other}. Try /help."),
        }
    }

    fn denied(required: PermissionLevel) -> String {
        format!("this command requires {required} permission")
    }

    fn help(&self) -> String {
        "Commands: /help /context /summarize /forget /jobs /sudo /memory /pause /resume /status"
            .to_string()
    }

    async fn cmd_context(&self, ctx: &CommandContext<'_>) -> String {
        match self.context.stats(ctx.platform, ctx.channel).await {
            Ok(stats) => format!(
                "{} messages, ~{} chars, ~{} tokens",
                stats.message_count, stats.char_total, stats.token_estimate_total
            ),
            Err(e) => format!("failed to read context: {e}"),
        }
    }

    async fn cmd_summarize(&self, ctx: &CommandContext<'_>) -> String {
        match summarize_channel(
            self.context.as_ref(),
            self.provider.as_ref(),
            ctx.platform,
            ctx.channel,
        )
        .await
        {
            Ok(()) => "context summarized".to_string(),
            Err(e) => format!("summarization failed: {e}"),
        }
    }

    async fn cmd_forget(&self, ctx: &CommandContext<'_>) -> String {
        if ctx.level < PermissionLevel::Operator {
            return Self::denied(PermissionLevel::Operator);
        }
        match self.context.clear(ctx.platform, ctx.channel).await {
            Ok(()) => "channel context cleared".to_string(),
            Err(e) => format!("failed to clear context: {e}"),
        }
    }

    async fn cmd_jobs(&self, ctx: &CommandContext<'_>) -> String {
        if ctx.level < PermissionLevel::Trusted {
            return Self::denied(PermissionLevel::Trusted);
        }
        match self.scheduler.list_jobs().await {
            Ok(jobs) if jobs.is_empty() => "no scheduled jobs".to_string(),
            Ok(jobs) => jobs
                .iter()
                .map(|j| format!("- {} ({})", j.name, if j.enabled { "enabled" } else { "disabled" }))
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => format!("failed to list jobs: {e}"),
        }
    }

    async fn cmd_sudo(&self, ctx: &CommandContext<'_>, rest: &str) -> String {
        let mut args = rest.split_whitespace();
        match args.next() {
            Some("approve") => {
                let Some(id) = args.next() else {
                    return "usage: /sudo approve <id>".to_string();
                };
                match self.auth.approve_sudo(ctx.level, &id.to_string()) {
                    Ok(()) => format!("sudo request {id} approved"),
                    Err(e) => e.to_string(),
                }
            }
            Some("deny") => {
                let Some(id) = args.next() else {
                    return "usage: /sudo deny <id>".to_string();
                };
                match self.auth.deny_sudo(ctx.level, &id.to_string()) {
                    Ok(()) => format!("sudo request {id} denied"),
                    Err(e) => e.to_string(),
                }
            }
            Some(level_str) => match level_str.parse::<PermissionLevel>() {
                Ok(target) => {
                    let id = self.auth.request_sudo(ctx.platform, ctx.user_id, target);
                    format!("sudo escalation to {target} requested: {id}")
                }
                Err(_) => format!("unknown permission level: {level_str}"),
            },
            None => "usage: /sudo <level> | /sudo approve <id> | /sudo deny <id>".to_string(),
        }
    }

    async fn cmd_memory(&self, ctx: &CommandContext<'_>, rest: &str) -> String {
        let _ = ctx;
        let mut args = rest.split_whitespace();
        match args.next() {
            Some("search") => {
                let query = args.collect::<Vec<_>>().join(" ");
                match self.memory.search(&query).await {
                    Ok(hits) if hits.is_empty() => "no matching memories".to_string(),
                    Ok(hits) => hits
                        .iter()
                        .map(|e| format!("[{}] {}: {}", e.category, e.key, e.value))
                        .collect::<Vec<_>>()
                        .join("\n"),
                    Err(e) => format!("search failed: {e}"),
                }
            }
            Some("clear") => {
                if ctx.level < PermissionLevel::Admin {
                    return Self::denied(PermissionLevel::Admin);
                }
                match self.memory.clear().await {
                    Ok(n) => format!("cleared {n} memories"),
                    Err(e) => format!("clear failed: {e}"),
                }
            }
            _ => match self.memory.most_recent(20).await {
                Ok(entries) if entries.is_empty() => "no memories stored".to_string(),
                Ok(entries) => entries
                    .iter()
                    .map(|e| format!("[{}] {}: {}", e.category, e.key, e.value))
                    .collect::<Vec<_>>()
                    .join("\n"),
                Err(e) => format!("failed to list memories: {e}"),
            },
        }
    }

    async fn cmd_pause(&self, ctx: &CommandContext<'_>, rest: &str) -> String {
        if ctx.level < PermissionLevel::Operator {
            return Self::denied(PermissionLevel::Operator);
        }
        let duration = if rest.is_empty() { None } else { Some(rest) };
        self.pause.pause(duration);
        match duration {
            Some(d) => format!("paused for {d}"),
            None => "paused indefinitely".to_string(),
        }
    }

    async fn cmd_resume(&self, ctx: &CommandContext<'_>) -> String {
        if ctx.level < PermissionLevel::Operator {
            return Self::denied(PermissionLevel::Operator);
        }
        let missed = self.pause.resume();
        format!("resumed; {missed} event(s) were queued during the pause")
    }

    async fn cmd_status(&self, _ctx: &CommandContext<'_>) -> String {
        if self.pause.is_paused() {
            format!("paused; {} event(s) queued", self.pause.queue_len())
        } else {
            "active".to_string()
        }
    }
}
