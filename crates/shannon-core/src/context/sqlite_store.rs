//! SQLite-backed implementation of [`ContextStore`].
//!
//! # Schema
//! A single `context_messages` table keyed by `(platform, channel)`, with a
//! monotonically increasing `seq` column that defines insertion order
//! independent of (possibly colliding) timestamps.
//!
//! # Concurrency
//! A `rusqlite::Connection` guarded by a `Mutex` gives `Send + Sync` while
//! respecting SQLite's single-writer constraint, mirroring the teacher's
//! `memory/sqlite_store.rs`. WAL mode is enabled so readers don't block
//! behind an in-flight writer. `summarize` additionally takes a per-channel
//! advisory lock so two concurrent summarizations of the same channel
//! serialize rather than race; the loser simply proceeds with whichever
//! summary landed, per spec.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use rusqlite::{params, Connection};
use tokio::sync::Mutex as AsyncMutex;

use super::traits::{ContextMessage, ContextStats, ContextStore, Role};
use crate::error::{Result, ShannonError};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS context_messages (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    platform TEXT NOT NULL,
    channel TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    token_estimate INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_context_channel ON context_messages (platform, channel, seq);
"#;

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
    }
}

fn str_to_role(s: &str) -> Role {
    match s {
        "assistant" => Role::Assistant,
        "system" => Role::System,
        _ => Role::User,
    }
}

pub struct SqliteContextStore {
    conn: Arc<AsyncMutex<Connection>>,
    summarize_locks: DashMap<u64, Arc<AsyncMutex<()>>>,
}

impl SqliteContextStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(AsyncMutex::new(conn)),
            summarize_locks: DashMap::new(),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(AsyncMutex::new(conn)),
            summarize_locks: DashMap::new(),
        })
    }

    fn channel_lock(&self, platform: &str, channel: &str) -> Arc<AsyncMutex<()>> {
        let mut hasher = DefaultHasher::new();
        platform.hash(&mut hasher);
        channel.hash(&mut hasher);
        let key = hasher.finish();
        self.summarize_locks
            .entry(key)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

#[async_trait]
impl ContextStore for SqliteContextStore {
    async fn append(
        &self,
        platform: &str,
        channel: &str,
        role: Role,
        content: &str,
        token_estimate: u32,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO context_messages (platform, channel, role, content, timestamp, token_estimate)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                platform,
                channel,
                role_to_str(role),
                content,
                chrono::Utc::now().to_rfc3339(),
                token_estimate,
            ],
        )?;
        Ok(())
    }

    async fn get_context(&self, platform: &str, channel: &str) -> Result<Vec<ContextMessage>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT role, content, timestamp, token_estimate FROM context_messages
             WHERE platform = ?1 AND channel = ?2 ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map(params![platform, channel], |row| {
            let role: String = row.get(0)?;
            let content: String = row.get(1)?;
            let timestamp: String = row.get(2)?;
            let token_estimate: u32 = row.get(3)?;
            Ok((role, content, timestamp, token_estimate))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (role, content, timestamp, token_estimate) = row?;
            out.push(ContextMessage {
                platform: platform.to_string(),
                channel: channel.to_string(),
                role: str_to_role(&role),
                content,
                timestamp: chrono::DateTime::parse_from_rfc3339(&timestamp)
                    .map(|dt| dt.with_timezone(&chrono::Utc))
                    .unwrap_or_else(|_| chrono::Utc::now()),
                token_estimate,
            });
        }
        Ok(out)
    }

    async fn clear(&self, platform: &str, channel: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM context_messages WHERE platform = ?1 AND channel = ?2",
            params![platform, channel],
        )?;
        Ok(())
    }

    async fn summarize(&self, platform: &str, channel: &str, summary: &str) -> Result<()> {
        let channel_lock = self.channel_lock(platform, channel);
        let _guard = channel_lock.lock().await;

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let non_system_seqs: Vec<i64> = {
            let mut stmt = tx.prepare(
                "SELECT seq FROM context_messages
                 WHERE platform = ?1 AND channel = ?2 AND role != 'system'
                 ORDER BY seq ASC",
            )?;
            let rows = stmt.query_map(params![platform, channel], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<Vec<i64>>>()?
        };

        // Idempotent no-op on an already-small context.
        if non_system_seqs.len() < 2 {
            return Ok(());
        }

        let half = non_system_seqs.len() / 2;
        let to_replace = &non_system_seqs[..half];
        let first_seq = *to_replace
            .first()
            .ok_or_else(|| ShannonError::Internal("empty summarization batch".into()))?;
        let last_seq = *to_replace
            .last()
            .ok_or_else(|| ShannonError::Internal("empty summarization batch".into()))?;

        tx.execute(
            "DELETE FROM context_messages WHERE platform = ?1 AND channel = ?2 AND seq BETWEEN ?3 AND ?4 AND role != 'system'",
            params![platform, channel, first_seq, last_seq],
        )?;

        // Insert the synthetic summary row with a seq lower than the
        // remaining suffix by relying on AUTOINCREMENT ordering: SQLite's
        // rowid always increases, so inserting now places the summary
        // after whatever remains, which would violate ordering. Instead we
        // give it an explicit seq one below the first remaining row.
        let next_seq: i64 = tx.query_row(
            "SELECT COALESCE(MIN(seq), ?3) FROM context_messages WHERE platform = ?1 AND channel = ?2",
            params![platform, channel, last_seq + 1],
            |row| row.get(0),
        )?;
        let summary_seq = next_seq - 1;

        tx.execute(
            "INSERT INTO context_messages (seq, platform, channel, role, content, timestamp, token_estimate)
             VALUES (?1, ?2, ?3, 'system', ?4, ?5, ?6)",
            params![
                summary_seq,
                platform,
                channel,
                summary,
                chrono::Utc::now().to_rfc3339(),
                (summary.len() / 4) as u32,
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    async fn stats(&self, platform: &str, channel: &str) -> Result<ContextStats> {
        let conn = self.conn.lock().await;
        let (count, chars, tokens): (i64, i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(LENGTH(content)), 0), COALESCE(SUM(token_estimate), 0)
             FROM context_messages WHERE platform = ?1 AND channel = ?2",
            params![platform, channel],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(ContextStats {
            message_count: count as usize,
            char_total: chars as usize,
            token_estimate_total: tokens as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded_store(n: usize) -> SqliteContextStore {
        let store = SqliteContextStore::open_in_memory().unwrap();
        for i in 0..n {
            store
                .append("discord", "ch1", Role::User, &format!("msg {i}"), 10)
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn append_then_get_preserves_order() {
        let store = seeded_store(5).await;
        let rows = store.get_context("discord", "ch1").await.unwrap();
        let contents: Vec<&str> = rows.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["msg 0", "msg 1", "msg 2", "msg 3", "msg 4"]);
    }

    #[tokio::test]
    async fn clear_removes_all_rows() {
        let store = seeded_store(3).await;
        store.clear("discord", "ch1").await.unwrap();
        assert!(store.get_context("discord", "ch1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn summarize_replaces_oldest_half_preserving_suffix() {
        let store = seeded_store(50).await;
        let before = store.get_context("discord", "ch1").await.unwrap();

        store
            .summarize("discord", "ch1", "the user discussed 25 topics")
            .await
            .unwrap();

        let after = store.get_context("discord", "ch1").await.unwrap();
        assert!(after.len() <= before.len());

        let summary_rows: Vec<_> = after.iter().filter(|m| m.role == Role::System).collect();
        assert_eq!(summary_rows.len(), 1);
        assert_eq!(summary_rows[0].content, "the user discussed 25 topics");

        let before_suffix = &before[25..];
        let after_non_system: Vec<&ContextMessage> =
            after.iter().filter(|m| m.role != Role::System).collect();
        assert_eq!(after_non_system.len(), before_suffix.len());
        for (a, b) in after_non_system.iter().zip(before_suffix.iter()) {
            assert_eq!(a.content, b.content);
        }
    }

    #[tokio::test]
    async fn summarize_on_small_context_is_noop() {
        let store = seeded_store(1).await;
        store.summarize("discord", "ch1", "summary").await.unwrap();
        let rows = store.get_context("discord", "ch1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].role, Role::User);
    }

    #[tokio::test]
    async fn stats_reports_counts() {
        let store = seeded_store(4).await;
        let stats = store.stats("discord", "ch1").await.unwrap();
        assert_eq!(stats.message_count, 4);
        assert!(stats.char_total > 0);
    }
}
