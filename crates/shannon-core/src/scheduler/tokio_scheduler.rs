//! Tokio-backed scheduler: a heartbeat timer plus a cron-like dispatcher,
//! both pause-aware.
//!
//! Grounded on the teacher's `scheduler/tokio_scheduler.rs` tick loop
//! (a background task woken on an interval, scanning for due jobs and
//! rescheduling), adapted to check the pause manager before firing and to
//! persist through [`super::sqlite_job_store::SqliteJobStore`] instead of
//! Diesel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::event_bus::{Event, EventBus};
use crate::pause::PauseManager;

use super::sqlite_job_store::SqliteJobStore;
use super::traits::{compute_next_run, JobId, ScheduledJob, Scheduler};

const TICK_INTERVAL: Duration = Duration::from_secs(1);

pub struct TokioScheduler {
    jobs: Arc<RwLock<HashMap<JobId, ScheduledJob>>>,
    store: Arc<SqliteJobStore>,
    bus: Arc<dyn EventBus>,
    pause: Arc<PauseManager>,
    heartbeat_interval: Duration,
    heartbeat_enabled: bool,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl TokioScheduler {
    pub async fn new(
        store: Arc<SqliteJobStore>,
        bus: Arc<dyn EventBus>,
        pause: Arc<PauseManager>,
        heartbeat_interval: Duration,
        heartbeat_enabled: bool,
    ) -> crate::error::Result<Arc<Self>> {
        let loaded = store.load_all().await?;
        let jobs = loaded.into_iter().map(|j| (j.id.clone(), j)).collect();
        let (stop_tx, stop_rx) = watch::channel(false);
        Ok(Arc::new(Self {
            jobs: Arc::new(RwLock::new(jobs)),
            store,
            bus,
            pause,
            heartbeat_interval,
            heartbeat_enabled,
            stop_tx,
            stop_rx,
        }))
    }
}

#[async_trait]
impl Scheduler for TokioScheduler {
    async fn start(&self) {
        if self.heartbeat_enabled {
            let bus = self.bus.clone();
            let pause = self.pause.clone();
            let interval = self.heartbeat_interval;
            let mut stop_rx = self.stop_rx.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if pause.is_paused() {
                                debug!("heartbeat skipped: paused");
                                continue;
                            }
                            bus.publish(Event::SchedulerTrigger {
                                job_id: "__heartbeat__".to_string(),
                                payload: serde_json::json!({"kind": "heartbeat"}),
                            });
                        }
                        Ok(()) = stop_rx.changed() => {
                            if *stop_rx.borrow() {
                                break;
                            }
                        }
                    }
                }
            });
        }

        let jobs = self.jobs.clone();
        let store = self.store.clone();
        let bus = self.bus.clone();
        let pause = self.pause.clone();
        let mut stop_rx = self.stop_rx.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TICK_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let now = Utc::now();
                        let due: Vec<ScheduledJob> = {
                            let guard = jobs.read().await;
                            guard
                                .values()
                                .filter(|j| j.enabled)
                                .filter(|j| j.next_run.is_some_and(|t| t <= now))
                                .cloned()
                                .collect()
                        };

                        for job in due {
                            if pause.is_paused() {
                                debug!(job_id = %job.id, "cron firing skipped: paused");
                                continue;
                            }
                            bus.publish(Event::SchedulerTrigger {
                                job_id: job.id.clone(),
                                payload: job.command.clone(),
                            });

                            let next_run = compute_next_run(&job.schedule, now);
                            let mut guard = jobs.write().await;
                            if let Some(stored) = guard.get_mut(&job.id) {
                                stored.next_run = next_run;
                                if let Err(e) = store.upsert(stored).await {
                                    tracing::warn!(job_id = %job.id, error = %e, "failed to persist rescheduled job");
                                }
                            }
                        }
                    }
                    Ok(()) = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        info!("scheduler started");
    }

    async fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    async fn add_job(&self, mut job: ScheduledJob) -> crate::error::Result<JobId> {
        if job.id.is_empty() {
            job.id = Uuid::new_v4().to_string();
        }
        job.next_run = compute_next_run(&job.schedule, Utc::now());
        self.store.upsert(&job).await?;
        let id = job.id.clone();
        self.jobs.write().await.insert(id.clone(), job);
        Ok(id)
    }

    async fn remove_job(&self, id: &JobId) -> crate::error::Result<bool> {
        self.store.delete(id).await?;
        Ok(self.jobs.write().await.remove(id).is_some())
    }

    async fn list_jobs(&self) -> crate::error::Result<Vec<ScheduledJob>> {
        let mut jobs: Vec<ScheduledJob> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(jobs)
    }
}
