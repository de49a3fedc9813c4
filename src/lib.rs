//! Deferred report cache refresh scheduler.
//!
//! This library exposes the internal modules for the binary and for testing.

pub mod app;
pub mod config;
pub mod metrics;
pub mod refresh;
pub mod refresh_store;
pub mod reports;
pub mod sqlite_persistence;
pub mod worker;

// Re-export commonly used types for convenience
pub use app::RefreshApp;
pub use refresh::{DeferredScheduler, JobExecutor, ModeResolver, WorkUnit};
pub use refresh_store::{RefreshStore, SqliteRefreshStore};
