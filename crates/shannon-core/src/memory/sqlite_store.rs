//! SQLite-backed implementation of [`MemoryStore`].
//!
//! Mirrors the teacher's `memory/sqlite_store.rs` connection-handling
//! pattern (a `rusqlite::Connection` behind an async `Mutex`), trading its
//! FTS5 + embedding hybrid search for the spec's plain substring match —
//! memory here is small, structured key/value, not a document store.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{params, Connection};
use tokio::sync::Mutex;

use super::traits::{MemoryEntry, MemoryStore, DEFAULT_CATEGORY};
use crate::error::Result;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS memories (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL,
    category TEXT NOT NULL DEFAULT 'general',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    source TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_memories_category ON memories (category);
CREATE INDEX IF NOT EXISTS idx_memories_updated_at ON memories (updated_at DESC);
"#;

pub struct SqliteMemoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMemoryStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_entry(
        key: String,
        value: String,
        category: String,
        created_at: String,
        updated_at: String,
        source: String,
    ) -> MemoryEntry {
        let parse = |s: &str| {
            chrono::DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .unwrap_or_else(|_| chrono::Utc::now())
        };
        MemoryEntry {
            key,
            value,
            category,
            created_at: parse(&created_at),
            updated_at: parse(&updated_at),
            source,
        }
    }
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn set(
        &self,
        key: &str,
        value: &str,
        category: Option<&str>,
        source: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        let now = chrono::Utc::now().to_rfc3339();
        let category = category.unwrap_or(DEFAULT_CATEGORY);
        let source = source.unwrap_or("");

        conn.execute(
            "INSERT INTO memories (key, value, category, created_at, updated_at, source)
             VALUES (?1, ?2, ?3, ?4, ?4, ?5)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                category = excluded.category,
                updated_at = excluded.updated_at,
                source = excluded.source",
            params![key, value, category, now, source],
        )?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<MemoryEntry>> {
        let conn = self.conn.lock().await;
        let result = conn.query_row(
            "SELECT key, value, category, created_at, updated_at, source FROM memories WHERE key = ?1",
            params![key],
            |row| {
                Ok(Self::row_to_entry(
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            },
        );
        match result {
            Ok(entry) => Ok(Some(entry)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let affected = conn.execute("DELETE FROM memories WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    }

    async fn search(&self, query: &str) -> Result<Vec<MemoryEntry>> {
        let conn = self.conn.lock().await;
        let pattern = format!("%{query}%");
        let mut stmt = conn.prepare(
            "SELECT key, value, category, created_at, updated_at, source FROM memories
             WHERE key LIKE ?1 OR value LIKE ?1
             ORDER BY updated_at DESC",
        )?;
        let rows = stmt.query_map(params![pattern], |row| {
            Ok(Self::row_to_entry(
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
            ))
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Into::into)
    }

    async fn list_category(&self, category: &str) -> Result<Vec<MemoryEntry>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT key, value, category, created_at, updated_at, source FROM memories
             WHERE category = ?1 ORDER BY updated_at DESC",
        )?;
        let rows = stmt.query_map(params![category], |row| {
            Ok(Self::row_to_entry(
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
            ))
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Into::into)
    }

    async fn clear(&self) -> Result<usize> {
        let conn = self.conn.lock().await;
        let affected = conn.execute("DELETE FROM memories", [])?;
        Ok(affected)
    }

    async fn most_recent(&self, limit: usize) -> Result<Vec<MemoryEntry>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT key, value, category, created_at, updated_at, source FROM memories
             ORDER BY updated_at DESC LIMIT ?1",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![limit], |row| {
            Ok(Self::row_to_entry(
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
            ))
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = SqliteMemoryStore::open_in_memory().unwrap();
        store.set("user:name", "Ada", None, None).await.unwrap();
        let entry = store.get("user:name").await.unwrap().unwrap();
        assert_eq!(entry.value, "Ada");
        assert_eq!(entry.category, "general");
    }

    #[tokio::test]
    async fn delete_then_get_returns_none() {
        let store = SqliteMemoryStore::open_in_memory().unwrap();
        store.set("k", "v", None, None).await.unwrap();
        assert!(store.delete("k").await.unwrap());
        assert!(store.get("k").await.unwrap().is_none());
        assert!(!store.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn set_is_upsert_preserving_created_at() {
        let store = SqliteMemoryStore::open_in_memory().unwrap();
        store.set("k", "v1", Some("core"), None).await.unwrap();
        let first = store.get("k").await.unwrap().unwrap();
        store.set("k", "v2", Some("core"), None).await.unwrap();
        let second = store.get("k").await.unwrap().unwrap();
        assert_eq!(second.value, "v2");
        assert_eq!(first.created_at, second.created_at);
    }

    #[tokio::test]
    async fn search_matches_key_or_value() {
        let store = SqliteMemoryStore::open_in_memory().unwrap();
        store.set("project:goal", "ship shannon", None, None).await.unwrap();
        store.set("user:name", "Ada", None, None).await.unwrap();
        let hits = store.search("goal").await.unwrap();
        assert_eq!(hits.len(), 1);
        let hits = store.search("ship").await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn export_context_truncates_with_sentinel() {
        let store = SqliteMemoryStore::open_in_memory().unwrap();
        for i in 0..5 {
            store
                .set(&format!("k{i}"), &"x".repeat(50), None, None)
                .await
                .unwrap();
        }
        // Budget of 1 token = 4 chars, far too small for any line.
        let exported = store.export_context(1).await.unwrap();
        assert!(exported.contains("more memories truncated"));
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let store = SqliteMemoryStore::open_in_memory().unwrap();
        store.set("a", "1", None, None).await.unwrap();
        store.set("b", "2", None, None).await.unwrap();
        assert_eq!(store.clear().await.unwrap(), 2);
        assert!(store.most_recent(10).await.unwrap().is_empty());
    }
}
