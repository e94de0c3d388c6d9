pub mod sqlite_job_store;
pub mod tokio_scheduler;
pub mod traits;

pub use sqlite_job_store::SqliteJobStore;
pub use tokio_scheduler::TokioScheduler;
pub use traits::{JobId, Schedule, ScheduledJob, Scheduler};
