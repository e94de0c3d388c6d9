//! SQLite-backed persistence for scheduled jobs.
//!
//! Mirrors `memory/sqlite_store.rs`'s connection-handling pattern (a
//! `rusqlite::Connection` behind an async `Mutex`) rather than the teacher's
//! Diesel-backed `scheduler/tokio_scheduler.rs` store, to keep persistence
//! consistent across the crate.

use std::path::Path;
use std::sync::Arc;

use rusqlite::{params, Connection};
use tokio::sync::Mutex;

use super::traits::{Schedule, ScheduledJob};
use crate::error::Result;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS scheduled_jobs (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    schedule_json TEXT NOT NULL,
    command_json TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    next_run TEXT
);
"#;

pub struct SqliteJobStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJobStore {
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

    pub async fn upsert(&self, job: &ScheduledJob) -> Result<()> {
        let conn = self.conn.lock().await;
        let schedule_json = serde_json::to_string(&job.schedule)?;
        let command_json = serde_json::to_string(&job.command)?;
        let next_run = job.next_run.map(|t| t.to_rfc3339());
        conn.execute(
            "INSERT INTO scheduled_jobs (id, name, schedule_json, command_json, enabled, next_run)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                schedule_json = excluded.schedule_json,
                command_json = excluded.command_json,
                enabled = excluded.enabled,
                next_run = excluded.next_run",
            params![job.id, job.name, schedule_json, command_json, job.enabled as i64, next_run],
        )?;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let affected = conn.execute("DELETE FROM scheduled_jobs WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    pub async fn load_all(&self) -> Result<Vec<ScheduledJob>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, name, schedule_json, command_json, enabled, next_run FROM scheduled_jobs",
        )?;
        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let schedule_json: String = row.get(2)?;
            let command_json: String = row.get(3)?;
            let enabled: i64 = row.get(4)?;
            let next_run: Option<String> = row.get(5)?;
            Ok((id, name, schedule_json, command_json, enabled, next_run))
        })?;

        let mut jobs = Vec::new();
        for row in rows {
            let (id, name, schedule_json, command_json, enabled, next_run) = row?;
            let schedule: Schedule = serde_json::from_str(&schedule_json)?;
            let command: serde_json::Value = serde_json::from_str(&command_json)?;
            let next_run = next_run.and_then(|s| {
                chrono::DateTime::parse_from_rfc3339(&s)
                    .ok()
                    .map(|dt| dt.with_timezone(&chrono::Utc))
            });
            jobs.push(ScheduledJob {
                id,
                name,
                schedule,
                command,
                enabled: enabled != 0,
                next_run,
            });
        }
        Ok(jobs)
    }
}
