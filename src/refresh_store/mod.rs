mod models;
mod schema;
mod sqlite_refresh_store;

pub use models::*;
pub use schema::REFRESH_VERSIONED_SCHEMAS;
pub use sqlite_refresh_store::SqliteRefreshStore;

use crate::refresh::{RefreshQueue, SettingsStore, SiteMetrics};
use anyhow::Result;
use chrono::{DateTime, Utc};

/// Row names in `site_counters`.
pub const SUBSCRIPTIONS_COUNTER: &str = "subscriptions";
pub const ORDERS_COUNTER: &str = "orders";

/// Everything the worker and CLI need from the refresh database, on top of
/// the collaborator interfaces the refresh engine consumes.
pub trait RefreshStore: RefreshQueue + SettingsStore + SiteMetrics {
    // Queue processing
    /// Move up to `limit` pending entries due at `now` to running, oldest
    /// first. An entry whose twin is already running stays pending.
    fn claim_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<QueuedRefresh>>;
    /// Remove a claimed entry once it has been executed.
    fn complete_entry(&self, id: i64) -> Result<()>;
    /// Return entries left running by an interrupted worker to pending.
    fn reset_stale_running(&self) -> Result<StaleRecovery>;
    fn list_queue(&self) -> Result<Vec<QueuedRefresh>>;
    fn pending_count(&self) -> Result<usize>;
    fn next_due_at(&self) -> Result<Option<DateTime<Utc>>>;

    // Run history
    fn record_run_start(&self, hook: &str, args: &str) -> Result<i64>;
    fn record_run_finish(
        &self,
        run_id: i64,
        status: RunStatus,
        error_message: Option<String>,
    ) -> Result<()>;
    fn get_run_history(&self, limit: usize) -> Result<Vec<RefreshRun>>;
    fn prune_run_history(&self, before: DateTime<Utc>) -> Result<usize>;

    // Site counters
    fn set_site_counts(&self, subscriptions: u64, orders: u64) -> Result<()>;

    // Report cache markers
    fn mark_report_refreshed(&self, entry: &ReportCacheEntry) -> Result<()>;
    fn list_report_cache(&self) -> Result<Vec<ReportCacheEntry>>;
}
