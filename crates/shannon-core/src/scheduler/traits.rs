//! Core types and the [`Scheduler`] trait: heartbeat + cron dispatch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type JobId = String;

/// When a job runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Schedule {
    Interval { secs: u64 },
    /// A 5- or 6-field cron expression.
    Cron { expr: String },
}

/// A cron job's command descriptor: an arbitrary payload the tool-use loop
/// (or a direct handler) interprets, persisted alongside the schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: JobId,
    pub name: String,
    pub schedule: Schedule,
    pub command: serde_json::Value,
    pub enabled: bool,
    pub next_run: Option<DateTime<Utc>>,
}

/// Heartbeat + cron dispatcher. Both check the pause manager before firing;
/// while paused, ticks/firings are skipped (logged, not queued).
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Start the background tick task. Idempotent.
    async fn start(&self);

    /// Stop the background tick task.
    async fn stop(&self);

    /// Add (or replace) a job, assigning an id if none was given. Persisted
    /// immediately.
    async fn add_job(&self, job: ScheduledJob) -> crate::error::Result<JobId>;

    /// Remove a job by id; returns `true` if it existed.
    async fn remove_job(&self, id: &JobId) -> crate::error::Result<bool>;

    async fn list_jobs(&self) -> crate::error::Result<Vec<ScheduledJob>>;
}

/// Compute the next fire time for a schedule, from `now`. `None` for an
/// unparseable cron expression.
pub fn compute_next_run(schedule: &Schedule, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match schedule {
        Schedule::Interval { secs } => Some(now + chrono::Duration::seconds(*secs as i64)),
        Schedule::Cron { expr } => {
            use std::str::FromStr;
            let full_expr = if expr.split_whitespace().count() == 5 {
                format!("0 {expr}")
            } else {
                expr.clone()
            };
            cron::Schedule::from_str(&full_expr).ok()?.after(&now).next()
        }
    }
}
