//! SQLite-backed persistence for [`Plan`] rows.
//!
//! Same `Connection`-behind-`tokio::sync::Mutex` shape as
//! `memory/sqlite_store.rs`; steps are serialized as a JSON blob inside the
//! row rather than normalized into their own table, per spec §4.11
//! ("steps serialized inside the row").

use std::path::Path;
use std::sync::Arc;

use rusqlite::{params, Connection};
use tokio::sync::Mutex;

use super::traits::{Plan, PlanStatus};
use crate::error::Result;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS plans (
    id TEXT PRIMARY KEY NOT NULL,
    goal TEXT NOT NULL,
    steps_json TEXT NOT NULL,
    status TEXT NOT NULL,
    channel TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

pub struct SqlitePlanStore {
    conn: Arc<Mutex<Connection>>,
}

fn status_str(status: PlanStatus) -> &'static str {
    match status {
        PlanStatus::Planning => "planning",
        PlanStatus::Executing => "executing",
        PlanStatus::Completed => "completed",
        PlanStatus::Failed => "failed",
    }
}

impl SqlitePlanStore {
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

    pub async fn upsert(&self, plan: &Plan) -> Result<()> {
        let conn = self.conn.lock().await;
        let steps_json = serde_json::to_string(&plan.steps)?;
        conn.execute(
            "INSERT INTO plans (id, goal, steps_json, status, channel, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                steps_json = excluded.steps_json,
                status = excluded.status,
                updated_at = excluded.updated_at",
            params![
                plan.id,
                plan.goal,
                steps_json,
                status_str(plan.status),
                plan.channel,
                plan.created_at.to_rfc3339(),
                plan.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Plan>> {
        let conn = self.conn.lock().await;
        let result = conn.query_row(
            "SELECT id, goal, steps_json, status, channel, created_at, updated_at
             FROM plans WHERE id = ?1",
            params![id],
            Self::row_to_plan,
        );
        match result {
            Ok(plan) => Ok(Some(plan?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[allow(clippy::type_complexity)]
    fn row_to_plan(row: &rusqlite::Row) -> rusqlite::Result<Result<Plan>> {
        let id: String = row.get(0)?;
        let goal: String = row.get(1)?;
        let steps_json: String = row.get(2)?;
        let status: String = row.get(3)?;
        let channel: String = row.get(4)?;
        let created_at: String = row.get(5)?;
        let updated_at: String = row.get(6)?;

        Ok((|| -> Result<Plan> {
            let steps = serde_json::from_str(&steps_json)?;
            let status = match status.as_str() {
                "planning" => PlanStatus::Planning,
                "executing" => PlanStatus::Executing,
                "completed" => PlanStatus::Completed,
                _ => PlanStatus::Failed,
            };
            let parse = |s: &str| {
                chrono::DateTime::parse_from_rfc3339(s)
                    .map(|dt| dt.with_timezone(&chrono::Utc))
                    .unwrap_or_else(|_| chrono::Utc::now())
            };
            Ok(Plan {
                id,
                goal,
                steps,
                status,
                channel,
                created_at: parse(&created_at),
                updated_at: parse(&updated_at),
            })
        })())
    }
}
