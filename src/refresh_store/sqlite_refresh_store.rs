use super::models::{
    QueueStatus, QueuedRefresh, RefreshRun, ReportCacheEntry, RunStatus, StaleRecovery,
};
use super::schema::REFRESH_VERSIONED_SCHEMAS;
use super::{RefreshStore, ORDERS_COUNTER, SUBSCRIPTIONS_COUNTER};
use crate::refresh::{RefreshArgs, RefreshQueue, SettingsStore, SiteMetrics};
use crate::sqlite_persistence::open_versioned;
use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct SqliteRefreshStore {
    conn: Arc<Mutex<Connection>>,
    /// Settings written with `persist = false`, shadowing the table.
    transient_settings: Mutex<HashMap<String, String>>,
}

impl SqliteRefreshStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned(db_path.as_ref(), REFRESH_VERSIONED_SCHEMAS, "refresh")?;
        // Worker and CLI may hold the file concurrently
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            transient_settings: Mutex::new(HashMap::new()),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Refresh database connection lock poisoned"))
    }

    fn transient(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.transient_settings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fixed-width RFC 3339, so stored timestamps compare as strings.
    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    }

    fn from_unix(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap_or_default()
    }

    fn row_to_queued(row: &rusqlite::Row) -> rusqlite::Result<QueuedRefresh> {
        let status_str: String = row.get("status")?;
        let created_at_str: String = row.get("created_at")?;

        Ok(QueuedRefresh {
            id: row.get("id")?,
            hook: row.get("hook")?,
            args: row.get("args")?,
            run_at: Self::from_unix(row.get("run_at")?),
            status: QueueStatus::parse(&status_str).unwrap_or(QueueStatus::Pending),
            created_at: Self::parse_datetime(&created_at_str).unwrap_or_else(Utc::now),
        })
    }

    fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<RefreshRun> {
        let status_str: String = row.get("status")?;
        let started_at_str: String = row.get("started_at")?;
        let finished_at_str: Option<String> = row.get("finished_at")?;

        Ok(RefreshRun {
            id: row.get("id")?,
            hook: row.get("hook")?,
            args: row.get("args")?,
            started_at: Self::parse_datetime(&started_at_str).unwrap_or_else(Utc::now),
            finished_at: finished_at_str.and_then(|s| Self::parse_datetime(&s)),
            status: RunStatus::parse(&status_str).unwrap_or(RunStatus::Failed),
            error_message: row.get("error_message")?,
        })
    }

    fn row_to_cache_entry(row: &rusqlite::Row) -> rusqlite::Result<ReportCacheEntry> {
        let parse_date = |s: Option<String>| {
            s.and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok())
        };
        let refreshed_at_str: String = row.get("refreshed_at")?;

        Ok(ReportCacheEntry {
            report: row.get("report")?,
            range: row.get("report_range")?,
            period_start: parse_date(row.get("period_start")?),
            period_end: parse_date(row.get("period_end")?),
            refreshed_at: Self::parse_datetime(&refreshed_at_str).unwrap_or_else(Utc::now),
        })
    }

    fn read_counter(&self, name: &str) -> Result<u64> {
        let conn = self.lock()?;
        let value: Option<i64> = conn
            .query_row(
                "SELECT value FROM site_counters WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.and_then(|v| u64::try_from(v).ok()).unwrap_or(0))
    }
}

impl RefreshQueue for SqliteRefreshStore {
    fn schedule(&self, hook: &str, args: &RefreshArgs, at: DateTime<Utc>) -> Result<bool> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO refresh_queue (hook, args, run_at, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                hook,
                args.to_json(),
                at.timestamp(),
                QueueStatus::Pending.as_str(),
                Self::format_datetime(&Utc::now())
            ],
        )?;
        Ok(inserted == 1)
    }

    fn is_scheduled(&self, hook: &str, args: &RefreshArgs) -> Result<Option<DateTime<Utc>>> {
        let conn = self.lock()?;
        let run_at: Option<i64> = conn
            .query_row(
                "SELECT run_at FROM refresh_queue WHERE hook = ?1 AND args = ?2 AND status = ?3",
                params![hook, args.to_json(), QueueStatus::Pending.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(run_at.map(Self::from_unix))
    }

    fn cancel(&self, hook: &str, args: &RefreshArgs, at: DateTime<Utc>) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM refresh_queue
             WHERE hook = ?1 AND args = ?2 AND status = ?3 AND run_at = ?4",
            params![
                hook,
                args.to_json(),
                QueueStatus::Pending.as_str(),
                at.timestamp()
            ],
        )?;
        Ok(deleted > 0)
    }
}

impl SettingsStore for SqliteRefreshStore {
    fn get_setting(&self, key: &str) -> Result<Option<String>> {
        if let Some(value) = self.transient().get(key) {
            return Ok(Some(value.clone()));
        }

        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_setting(&self, key: &str, value: &str, persist: bool) -> Result<()> {
        if !persist {
            self.transient().insert(key.to_string(), value.to_string());
            return Ok(());
        }

        self.transient().remove(key);
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    fn delete_setting(&self, key: &str) -> Result<()> {
        self.transient().remove(key);
        let conn = self.lock()?;
        conn.execute("DELETE FROM settings WHERE key = ?1", params![key])?;
        Ok(())
    }
}

impl SiteMetrics for SqliteRefreshStore {
    fn count_subscriptions(&self) -> Result<u64> {
        self.read_counter(SUBSCRIPTIONS_COUNTER)
    }

    fn count_orders(&self) -> Result<u64> {
        self.read_counter(ORDERS_COUNTER)
    }
}

impl RefreshStore for SqliteRefreshStore {
    fn claim_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<QueuedRefresh>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let due = {
            let mut stmt = tx.prepare(
                "SELECT q.id, q.hook, q.args, q.run_at, q.status, q.created_at
                 FROM refresh_queue q
                 WHERE q.status = ?1 AND q.run_at <= ?2
                   AND NOT EXISTS (
                     SELECT 1 FROM refresh_queue r
                     WHERE r.hook = q.hook AND r.args = q.args AND r.status = ?3
                   )
                 ORDER BY q.run_at, q.id
                 LIMIT ?4",
            )?;
            let rows = stmt
                .query_map(
                    params![
                        QueueStatus::Pending.as_str(),
                        now.timestamp(),
                        QueueStatus::Running.as_str(),
                        limit as i64
                    ],
                    Self::row_to_queued,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        let claimed_at = Self::format_datetime(&now);
        for entry in &due {
            tx.execute(
                "UPDATE refresh_queue SET status = ?1, claimed_at = ?2 WHERE id = ?3",
                params![QueueStatus::Running.as_str(), claimed_at, entry.id],
            )?;
        }
        tx.commit()?;

        if !due.is_empty() {
            debug!("Claimed {} due refresh(es)", due.len());
        }
        Ok(due
            .into_iter()
            .map(|entry| QueuedRefresh {
                status: QueueStatus::Running,
                ..entry
            })
            .collect())
    }

    fn complete_entry(&self, id: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM refresh_queue WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn reset_stale_running(&self) -> Result<StaleRecovery> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        // A newer pending twin already covers the interrupted refresh
        let superseded = tx.execute(
            "DELETE FROM refresh_queue
             WHERE status = ?1 AND EXISTS (
               SELECT 1 FROM refresh_queue p
               WHERE p.hook = refresh_queue.hook AND p.args = refresh_queue.args
                 AND p.status = ?2
             )",
            params![QueueStatus::Running.as_str(), QueueStatus::Pending.as_str()],
        )?;
        let requeued = tx.execute(
            "UPDATE refresh_queue SET status = ?1, claimed_at = NULL WHERE status = ?2",
            params![QueueStatus::Pending.as_str(), QueueStatus::Running.as_str()],
        )?;
        tx.execute(
            "UPDATE refresh_runs SET status = ?1, finished_at = ?2, error_message = ?3
             WHERE status = ?4",
            params![
                RunStatus::Failed.as_str(),
                Self::format_datetime(&Utc::now()),
                "Refresh was interrupted (worker restart)",
                RunStatus::Running.as_str()
            ],
        )?;
        tx.commit()?;

        let recovery = StaleRecovery {
            requeued,
            superseded,
        };
        if recovery.total() > 0 {
            info!(
                "Recovered interrupted refreshes: {} requeued, {} superseded",
                requeued, superseded
            );
        }
        Ok(recovery)
    }

    fn list_queue(&self) -> Result<Vec<QueuedRefresh>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, hook, args, run_at, status, created_at
             FROM refresh_queue ORDER BY run_at, id",
        )?;
        let entries = stmt
            .query_map([], Self::row_to_queued)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn pending_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM refresh_queue WHERE status = ?1",
            params![QueueStatus::Pending.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn next_due_at(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.lock()?;
        let next: Option<i64> = conn.query_row(
            "SELECT MIN(run_at) FROM refresh_queue WHERE status = ?1",
            params![QueueStatus::Pending.as_str()],
            |row| row.get(0),
        )?;
        Ok(next.map(Self::from_unix))
    }

    fn record_run_start(&self, hook: &str, args: &str) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO refresh_runs (hook, args, started_at, status) VALUES (?1, ?2, ?3, ?4)",
            params![
                hook,
                args,
                Self::format_datetime(&Utc::now()),
                RunStatus::Running.as_str()
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn record_run_finish(
        &self,
        run_id: i64,
        status: RunStatus,
        error_message: Option<String>,
    ) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE refresh_runs SET finished_at = ?1, status = ?2, error_message = ?3 WHERE id = ?4",
            params![
                Self::format_datetime(&Utc::now()),
                status.as_str(),
                error_message,
                run_id
            ],
        )?;
        Ok(())
    }

    fn get_run_history(&self, limit: usize) -> Result<Vec<RefreshRun>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, hook, args, started_at, finished_at, status, error_message
             FROM refresh_runs ORDER BY started_at DESC, id DESC LIMIT ?1",
        )?;
        let runs = stmt
            .query_map(params![limit as i64], Self::row_to_run)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(runs)
    }

    fn prune_run_history(&self, before: DateTime<Utc>) -> Result<usize> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM refresh_runs WHERE status != ?1 AND started_at < ?2",
            params![RunStatus::Running.as_str(), Self::format_datetime(&before)],
        )?;
        Ok(deleted)
    }

    fn set_site_counts(&self, subscriptions: u64, orders: u64) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for (name, value) in [(SUBSCRIPTIONS_COUNTER, subscriptions), (ORDERS_COUNTER, orders)] {
            tx.execute(
                "INSERT INTO site_counters (name, value) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
                params![name, i64::try_from(value).unwrap_or(i64::MAX)],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn mark_report_refreshed(&self, entry: &ReportCacheEntry) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO report_cache (report, report_range, period_start, period_end, refreshed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(report, report_range) DO UPDATE SET
               period_start = excluded.period_start,
               period_end = excluded.period_end,
               refreshed_at = excluded.refreshed_at",
            params![
                entry.report,
                entry.range,
                entry.period_start.map(|d| d.format(DATE_FORMAT).to_string()),
                entry.period_end.map(|d| d.format(DATE_FORMAT).to_string()),
                Self::format_datetime(&entry.refreshed_at)
            ],
        )?;
        Ok(())
    }

    fn list_report_cache(&self) -> Result<Vec<ReportCacheEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT report, report_range, period_start, period_end, refreshed_at
             FROM report_cache ORDER BY report, report_range",
        )?;
        let entries = stmt
            .query_map([], Self::row_to_cache_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::{RefreshJobId, REFRESH_HOOK};
    use crate::refresh_store::WHOLE_REPORT_RANGE;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    struct TestStore {
        store: SqliteRefreshStore,
        _temp_dir: TempDir, // Keep temp dir alive
    }

    fn create_test_store() -> TestStore {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("refresh.db");
        let store = SqliteRefreshStore::new(&db_path).unwrap();
        TestStore {
            store,
            _temp_dir: temp_dir,
        }
    }

    fn args(job_id: RefreshJobId) -> RefreshArgs {
        RefreshArgs::for_job(job_id)
    }

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_710_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_schedule_is_idempotent() {
        let test = create_test_store();
        let store = &test.store;
        let a = args(RefreshJobId::SubscriptionsByProduct);

        assert!(store.schedule(REFRESH_HOOK, &a, t(300)).unwrap());
        assert!(!store.schedule(REFRESH_HOOK, &a, t(900)).unwrap());
        assert_eq!(store.is_scheduled(REFRESH_HOOK, &a).unwrap(), Some(t(300)));
        assert_eq!(store.pending_count().unwrap(), 1);
    }

    #[test]
    fn test_cancel_requires_matching_time() {
        let test = create_test_store();
        let store = &test.store;
        let a = args(RefreshJobId::SubscriptionsByCustomer);

        store.schedule(REFRESH_HOOK, &a, t(300)).unwrap();
        assert!(!store.cancel(REFRESH_HOOK, &a, t(301)).unwrap());
        assert!(store.cancel(REFRESH_HOOK, &a, t(300)).unwrap());
        assert_eq!(store.is_scheduled(REFRESH_HOOK, &a).unwrap(), None);
    }

    #[test]
    fn test_claim_due_in_run_order() {
        let test = create_test_store();
        let store = &test.store;

        store
            .schedule(REFRESH_HOOK, &args(RefreshJobId::SubscriptionsByCustomer), t(25 * 60))
            .unwrap();
        store
            .schedule(REFRESH_HOOK, &args(RefreshJobId::SubscriptionEventsByDate), t(5 * 60))
            .unwrap();
        store
            .schedule(REFRESH_HOOK, &args(RefreshJobId::SubscriptionsByProduct), t(60 * 60))
            .unwrap();

        let claimed = store.claim_due(t(30 * 60), 10).unwrap();
        assert_eq!(claimed.len(), 2);
        assert_eq!(claimed[0].args, args(RefreshJobId::SubscriptionEventsByDate).to_json());
        assert_eq!(claimed[1].args, args(RefreshJobId::SubscriptionsByCustomer).to_json());
        assert!(claimed.iter().all(|c| c.status == QueueStatus::Running));

        // Claimed entries are no longer pending
        assert_eq!(store.pending_count().unwrap(), 1);
        assert!(store.claim_due(t(30 * 60), 10).unwrap().is_empty());
        assert_eq!(store.next_due_at().unwrap(), Some(t(60 * 60)));
    }

    #[test]
    fn test_claim_respects_limit() {
        let test = create_test_store();
        let store = &test.store;
        for job_id in RefreshJobId::ALL {
            store.schedule(REFRESH_HOOK, &args(job_id), t(0)).unwrap();
        }

        assert_eq!(store.claim_due(t(10), 3).unwrap().len(), 3);
        assert_eq!(store.claim_due(t(10), 3).unwrap().len(), 1);
    }

    #[test]
    fn test_reschedule_while_running() {
        let test = create_test_store();
        let store = &test.store;
        let a = args(RefreshJobId::UpcomingRecurringRevenue);

        store.schedule(REFRESH_HOOK, &a, t(0)).unwrap();
        let claimed = store.claim_due(t(0), 10).unwrap();
        assert_eq!(claimed.len(), 1);

        // Data changed while the refresh runs
        assert!(store.schedule(REFRESH_HOOK, &a, t(5)).unwrap());
        // The twin waits until the running entry is done
        assert!(store.claim_due(t(10), 10).unwrap().is_empty());

        store.complete_entry(claimed[0].id).unwrap();
        assert_eq!(store.claim_due(t(10), 10).unwrap().len(), 1);
    }

    #[test]
    fn test_reset_stale_running() {
        let test = create_test_store();
        let store = &test.store;
        let product = args(RefreshJobId::SubscriptionsByProduct);
        let customer = args(RefreshJobId::SubscriptionsByCustomer);

        store.schedule(REFRESH_HOOK, &product, t(0)).unwrap();
        store.schedule(REFRESH_HOOK, &customer, t(0)).unwrap();
        store.claim_due(t(0), 10).unwrap();
        store.schedule(REFRESH_HOOK, &customer, t(60)).unwrap();
        let run_id = store.record_run_start(REFRESH_HOOK, &product.to_json()).unwrap();

        assert_eq!(
            store.reset_stale_running().unwrap(),
            StaleRecovery {
                requeued: 1,
                superseded: 1,
            }
        );

        let queue = store.list_queue().unwrap();
        assert_eq!(queue.len(), 2);
        assert!(queue.iter().all(|e| e.status == QueueStatus::Pending));
        assert_eq!(store.is_scheduled(REFRESH_HOOK, &customer).unwrap(), Some(t(60)));

        let history = store.get_run_history(10).unwrap();
        assert_eq!(history[0].id, run_id);
        assert_eq!(history[0].status, RunStatus::Failed);
        assert!(history[0].finished_at.is_some());
    }

    #[test]
    fn test_run_history_and_pruning() {
        let test = create_test_store();
        let store = &test.store;

        let run_id = store.record_run_start(REFRESH_HOOK, "{}").unwrap();
        store
            .record_run_finish(run_id, RunStatus::Rejected, Some("Unknown report".into()))
            .unwrap();
        let history = store.get_run_history(10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, RunStatus::Rejected);
        assert_eq!(history[0].error_message.as_deref(), Some("Unknown report"));

        assert_eq!(store.prune_run_history(Utc::now() - Duration::days(1)).unwrap(), 0);
        assert_eq!(store.prune_run_history(Utc::now() + Duration::days(1)).unwrap(), 1);
        assert!(store.get_run_history(10).unwrap().is_empty());
    }

    #[test]
    fn test_settings_roundtrip() {
        let test = create_test_store();
        let store = &test.store;

        assert_eq!(store.get_setting("large_site").unwrap(), None);
        store.set_setting("large_site", "true", true).unwrap();
        assert_eq!(store.get_setting("large_site").unwrap(), Some("true".into()));
        store.set_setting("large_site", "false", true).unwrap();
        assert_eq!(store.get_setting("large_site").unwrap(), Some("false".into()));
        store.delete_setting("large_site").unwrap();
        assert_eq!(store.get_setting("large_site").unwrap(), None);
    }

    #[test]
    fn test_transient_settings_are_not_written() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("refresh.db");

        {
            let store = SqliteRefreshStore::new(&db_path).unwrap();
            store.set_setting("kept", "1", true).unwrap();
            store.set_setting("dropped", "1", false).unwrap();
            assert_eq!(store.get_setting("dropped").unwrap(), Some("1".into()));
        }

        let store = SqliteRefreshStore::new(&db_path).unwrap();
        assert_eq!(store.get_setting("kept").unwrap(), Some("1".into()));
        assert_eq!(store.get_setting("dropped").unwrap(), None);
    }

    #[test]
    fn test_site_counts_default_to_zero() {
        let test = create_test_store();
        let store = &test.store;

        assert_eq!(store.count_subscriptions().unwrap(), 0);
        assert_eq!(store.count_orders().unwrap(), 0);

        store.set_site_counts(3001, 12).unwrap();
        store.set_site_counts(3002, 13).unwrap();
        assert_eq!(store.count_subscriptions().unwrap(), 3002);
        assert_eq!(store.count_orders().unwrap(), 13);
    }

    #[test]
    fn test_report_cache_upsert() {
        let test = create_test_store();
        let store = &test.store;

        let mut entry = ReportCacheEntry {
            report: "subscriptions_by_product".into(),
            range: WHOLE_REPORT_RANGE.into(),
            period_start: None,
            period_end: None,
            refreshed_at: t(0),
        };
        store.mark_report_refreshed(&entry).unwrap();
        entry.refreshed_at = t(60);
        entry.period_end = NaiveDate::from_ymd_opt(2024, 3, 9);
        store.mark_report_refreshed(&entry).unwrap();

        assert_eq!(store.list_report_cache().unwrap(), vec![entry]);
    }

    #[test]
    fn test_reopen_migrates_v1_database() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("refresh.db");
        {
            let conn = Connection::open(&db_path).unwrap();
            REFRESH_VERSIONED_SCHEMAS[0].create(&conn).unwrap();
        }

        let store = SqliteRefreshStore::new(&db_path).unwrap();
        store.set_site_counts(1, 2).unwrap();
        assert_eq!(store.count_orders().unwrap(), 2);
    }
}
