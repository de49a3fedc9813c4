use super::collaborators::{RefreshArgs, RefreshQueue, REFRESH_HOOK};
use super::job_map::{RefreshJobEntry, RefreshJobId};
use super::mode::{ModeResolver, SchedulingMode};
use crate::metrics;
use anyhow::Result;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, TimeZone, Timelike, Utc};
use std::sync::Arc;
use tracing::{debug, error, info};

/// How far apart jobs scheduled together are placed, per mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaggerPolicy {
    /// Local hour of day large sites refresh at.
    pub large_site_hour: u32,
    pub large_site_stagger: Duration,
    pub normal_stagger: Duration,
    /// Offset of the site's local time from UTC.
    pub site_offset: FixedOffset,
}

impl Default for StaggerPolicy {
    fn default() -> Self {
        Self {
            large_site_hour: 4,
            large_site_stagger: Duration::minutes(15),
            normal_stagger: Duration::minutes(5),
            site_offset: Utc.fix(),
        }
    }
}

impl StaggerPolicy {
    /// Instant the stagger offsets are added to.
    ///
    /// Normal mode starts from `now`. Large-site mode starts from the next
    /// occurrence of `large_site_hour` in local time strictly after `now`: at
    /// or past that hour, the window moves to the following day.
    pub fn base_time(&self, mode: SchedulingMode, now: DateTime<Utc>) -> DateTime<Utc> {
        match mode {
            SchedulingMode::Normal => now,
            SchedulingMode::LargeSite => self
                .next_local_window(now)
                .unwrap_or_else(|| now + Duration::days(1)),
        }
    }

    pub fn stagger(&self, mode: SchedulingMode) -> Duration {
        match mode {
            SchedulingMode::Normal => self.normal_stagger,
            SchedulingMode::LargeSite => self.large_site_stagger,
        }
    }

    /// `base + stagger * (priority + 1)`; index 0 still lands one step after
    /// the base. Saturates at the latest representable time.
    pub fn target_time(
        &self,
        mode: SchedulingMode,
        now: DateTime<Utc>,
        priority: u32,
    ) -> DateTime<Utc> {
        let steps = i64::from(priority) + 1;
        self.stagger(mode)
            .num_milliseconds()
            .checked_mul(steps)
            .and_then(Duration::try_milliseconds)
            .and_then(|offset| self.base_time(mode, now).checked_add_signed(offset))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn next_local_window(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = now.with_timezone(&self.site_offset);
        let today: NaiveDate = local.date_naive();
        let day = if local.hour() >= self.large_site_hour {
            today.succ_opt()?
        } else {
            today
        };
        let window = day.and_hms_opt(self.large_site_hour, 0, 0)?;
        self.site_offset
            .from_local_datetime(&window)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// What happened to one job during [`DeferredScheduler::schedule_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Newly queued.
    Scheduled,
    /// A pending entry was cancelled and queued again at the new time.
    Replaced { previous: DateTime<Utc> },
    /// A pending entry already covers this job.
    Skipped { pending: Option<DateTime<Utc>> },
    /// A queue call failed; the job was left as it was.
    Failed,
}

impl ScheduleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleOutcome::Scheduled => "scheduled",
            ScheduleOutcome::Replaced { .. } => "replaced",
            ScheduleOutcome::Skipped { .. } => "skipped",
            ScheduleOutcome::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledRefresh {
    pub job_id: RefreshJobId,
    pub run_at: DateTime<Utc>,
    pub outcome: ScheduleOutcome,
}

/// Summary of one `schedule_all` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleReport {
    /// `None` when there was nothing to schedule and the mode was never
    /// resolved.
    pub mode: Option<SchedulingMode>,
    pub refreshes: Vec<ScheduledRefresh>,
}

impl ScheduleReport {
    fn count(&self, label: &str) -> usize {
        self.refreshes
            .iter()
            .filter(|r| r.outcome.as_str() == label)
            .count()
    }

    pub fn scheduled(&self) -> usize {
        self.count("scheduled")
    }

    pub fn replaced(&self) -> usize {
        self.count("replaced")
    }

    pub fn skipped(&self) -> usize {
        self.count("skipped")
    }

    pub fn failed(&self) -> usize {
        self.count("failed")
    }
}

/// Turns a drained set of invalidated reports into queued refreshes.
pub struct DeferredScheduler {
    queue: Arc<dyn RefreshQueue>,
    mode_resolver: Arc<ModeResolver>,
    policy: StaggerPolicy,
}

impl DeferredScheduler {
    pub fn new(
        queue: Arc<dyn RefreshQueue>,
        mode_resolver: Arc<ModeResolver>,
        policy: StaggerPolicy,
    ) -> Self {
        Self {
            queue,
            mode_resolver,
            policy,
        }
    }

    pub fn policy(&self) -> &StaggerPolicy {
        &self.policy
    }

    pub fn mode_resolver(&self) -> &Arc<ModeResolver> {
        &self.mode_resolver
    }

    pub fn schedule_all(&self, entries: &[RefreshJobEntry]) -> ScheduleReport {
        self.schedule_all_at(entries, Utc::now())
    }

    /// Queue every entry relative to `now`.
    ///
    /// Never fails: a queue error on one entry is logged and recorded as
    /// [`ScheduleOutcome::Failed`], and the remaining entries are still
    /// attempted.
    pub fn schedule_all_at(&self, entries: &[RefreshJobEntry], now: DateTime<Utc>) -> ScheduleReport {
        if entries.is_empty() {
            return ScheduleReport::default();
        }

        let mode = self.mode_resolver.mode();
        let mut report = ScheduleReport {
            mode: Some(mode),
            refreshes: Vec::with_capacity(entries.len()),
        };

        for entry in entries {
            let run_at = self.policy.target_time(mode, now, entry.priority);
            let outcome = match self.schedule_one(mode, entry.job_id, run_at) {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Failed to schedule refresh of {}: {:#}", entry.job_id, e);
                    ScheduleOutcome::Failed
                }
            };
            debug!(
                "Refresh of {} at {}: {}",
                entry.job_id,
                run_at,
                outcome.as_str()
            );
            metrics::record_schedule_outcome(mode.as_str(), outcome.as_str());
            report.refreshes.push(ScheduledRefresh {
                job_id: entry.job_id,
                run_at,
                outcome,
            });
        }

        info!(
            "Scheduled report refreshes ({} mode): {} new, {} replaced, {} skipped, {} failed",
            mode,
            report.scheduled(),
            report.replaced(),
            report.skipped(),
            report.failed()
        );
        report
    }

    fn schedule_one(
        &self,
        mode: SchedulingMode,
        job_id: RefreshJobId,
        run_at: DateTime<Utc>,
    ) -> Result<ScheduleOutcome> {
        let args = RefreshArgs::for_job(job_id);
        let pending = self.queue.is_scheduled(REFRESH_HOOK, &args)?;

        match (mode, pending) {
            (SchedulingMode::Normal, Some(pending_at)) => Ok(ScheduleOutcome::Skipped {
                pending: Some(pending_at),
            }),
            (SchedulingMode::LargeSite, Some(previous)) => {
                self.queue.cancel(REFRESH_HOOK, &args, previous)?;
                if self.queue.schedule(REFRESH_HOOK, &args, run_at)? {
                    Ok(ScheduleOutcome::Replaced { previous })
                } else {
                    Ok(ScheduleOutcome::Skipped { pending: None })
                }
            }
            (_, None) => {
                // Another work unit may have queued it since the lookup
                if self.queue.schedule(REFRESH_HOOK, &args, run_at)? {
                    Ok(ScheduleOutcome::Scheduled)
                } else {
                    Ok(ScheduleOutcome::Skipped { pending: None })
                }
            }
        }
    }
}
