//! Runs a queued refresh once it is due.
//!
//! Each job identifier is registered with one of two computation shapes:
//! a stateless report that recomputes everything in one call, or a ranged
//! report that is instantiated afresh and recomputed once per
//! [`ReportRange`].

use super::collaborators::{RefreshArgs, REFRESH_HOOK};
use super::job_map::RefreshJobId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Time windows every ranged report is recomputed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportRange {
    Year,
    LastMonth,
    Month,
    Last7Days,
}

impl ReportRange {
    pub const ALL: [ReportRange; 4] = [
        ReportRange::Year,
        ReportRange::LastMonth,
        ReportRange::Month,
        ReportRange::Last7Days,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportRange::Year => "year",
            ReportRange::LastMonth => "last_month",
            ReportRange::Month => "month",
            ReportRange::Last7Days => "last_7_days",
        }
    }
}

impl fmt::Display for ReportRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by report computations.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Report data unavailable: {0}")]
    DataUnavailable(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Report computed in a single call.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait StatelessReport: Send + Sync {
    fn compute(&self, force_bypass_cache: bool) -> Result<(), ReportError>;
}

/// One instance of a report that is computed per time range.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait RangedReport: Send {
    fn compute(&mut self, range: ReportRange, force_bypass_cache: bool)
        -> Result<(), ReportError>;
}

/// Builds a fresh [`RangedReport`] for every range.
pub trait RangedReportFactory: Send + Sync {
    fn create(&self) -> Box<dyn RangedReport>;
}

impl<F> RangedReportFactory for F
where
    F: Fn() -> Box<dyn RangedReport> + Send + Sync,
{
    fn create(&self) -> Box<dyn RangedReport> {
        self()
    }
}

#[derive(Clone)]
pub enum ReportComputation {
    Stateless(Arc<dyn StatelessReport>),
    Ranged(Arc<dyn RangedReportFactory>),
}

/// Static lookup from job identifier to its computation.
#[derive(Clone, Default)]
pub struct ReportRegistry {
    reports: HashMap<RefreshJobId, ReportComputation>,
}

impl ReportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stateless(mut self, job_id: RefreshJobId, report: Arc<dyn StatelessReport>) -> Self {
        self.reports
            .insert(job_id, ReportComputation::Stateless(report));
        self
    }

    pub fn with_ranged(mut self, job_id: RefreshJobId, factory: Arc<dyn RangedReportFactory>) -> Self {
        self.reports.insert(job_id, ReportComputation::Ranged(factory));
        self
    }

    pub fn get(&self, job_id: RefreshJobId) -> Option<&ReportComputation> {
        self.reports.get(&job_id)
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}

/// Why a queued refresh was not run at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectionReason {
    #[error("Unexpected hook {0:?}")]
    UnknownHook(String),

    #[error("Malformed refresh arguments {0:?}")]
    MalformedArgs(String),

    #[error("Unknown report {0:?}")]
    UnknownReport(String),

    #[error("No computation registered for {0}")]
    Unregistered(RefreshJobId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Refreshed {
        job_id: RefreshJobId,
    },
    /// At least one computation failed. Ranged reports still attempt every
    /// range.
    Failed {
        job_id: RefreshJobId,
        errors: Vec<String>,
    },
    Rejected(RejectionReason),
}

impl ExecutionOutcome {
    pub fn status_label(&self) -> &'static str {
        match self {
            ExecutionOutcome::Refreshed { .. } => "completed",
            ExecutionOutcome::Failed { .. } => "failed",
            ExecutionOutcome::Rejected(_) => "rejected",
        }
    }
}

pub struct JobExecutor {
    registry: ReportRegistry,
}

impl JobExecutor {
    pub fn new(registry: ReportRegistry) -> Self {
        Self { registry }
    }

    /// Run the refresh stored as `hook(args_json)`.
    ///
    /// Entries that do not name a registered report are rejected and logged;
    /// they are typically left over from a deployment with a different event
    /// map.
    pub fn execute(&self, hook: &str, args_json: &str) -> ExecutionOutcome {
        let job_id = match self.resolve(hook, args_json) {
            Ok(job_id) => job_id,
            Err(reason) => {
                warn!("Rejecting queued refresh: {}", reason);
                return ExecutionOutcome::Rejected(reason);
            }
        };

        let computation = match self.registry.get(job_id) {
            Some(computation) => computation,
            None => {
                let reason = RejectionReason::Unregistered(job_id);
                warn!("Rejecting queued refresh: {}", reason);
                return ExecutionOutcome::Rejected(reason);
            }
        };

        let errors = match computation {
            ReportComputation::Stateless(report) => match report.compute(true) {
                Ok(()) => Vec::new(),
                Err(e) => vec![e.to_string()],
            },
            ReportComputation::Ranged(factory) => Self::run_ranges(job_id, factory.as_ref()),
        };

        if errors.is_empty() {
            info!("Refreshed report cache for {}", job_id);
            ExecutionOutcome::Refreshed { job_id }
        } else {
            warn!(
                "Refresh of {} finished with {} error(s): {}",
                job_id,
                errors.len(),
                errors.join("; ")
            );
            ExecutionOutcome::Failed { job_id, errors }
        }
    }

    fn resolve(&self, hook: &str, args_json: &str) -> Result<RefreshJobId, RejectionReason> {
        if hook != REFRESH_HOOK {
            return Err(RejectionReason::UnknownHook(hook.to_string()));
        }
        let args = RefreshArgs::from_json(args_json)
            .ok_or_else(|| RejectionReason::MalformedArgs(args_json.to_string()))?;
        args.job_id()
            .ok_or(RejectionReason::UnknownReport(args.report))
    }

    fn run_ranges(job_id: RefreshJobId, factory: &dyn RangedReportFactory) -> Vec<String> {
        ReportRange::ALL
            .iter()
            .filter_map(|range| {
                debug!("Recomputing {} for range {}", job_id, range);
                let mut report = factory.create();
                report
                    .compute(*range, true)
                    .err()
                    .map(|e| format!("{}: {}", range, e))
            })
            .collect()
    }
}
