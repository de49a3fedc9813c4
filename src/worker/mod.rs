//! Background execution of queued report refreshes.
//!
//! The worker sleeps until the next entry is due (capped by the poll
//! interval), claims due entries, runs them through the [`JobExecutor`] on a
//! blocking thread and records every run.
//!
//! [`JobExecutor`]: crate::refresh::JobExecutor

mod refresh_worker;

pub use refresh_worker::{RefreshWorker, WorkerSettings};
