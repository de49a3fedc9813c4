//! Event-driven report cache refresh engine.
//!
//! Domain events recorded during a [`WorkUnit`] are reduced to a
//! duplicate-free set of report refreshes, which the [`DeferredScheduler`]
//! queues with a staggered run time. The [`JobExecutor`] later runs each
//! queued refresh.

mod accumulator;
mod collaborators;
mod executor;
mod job_map;
mod mode;
mod scheduler;
mod work_unit;

#[cfg(test)]
pub(crate) mod testing;

pub use accumulator::InvalidationAccumulator;
pub use collaborators::{RefreshArgs, RefreshQueue, SettingsStore, SiteMetrics, REFRESH_HOOK};
#[cfg(any(test, feature = "mock"))]
pub use collaborators::{MockRefreshQueue, MockSettingsStore, MockSiteMetrics};
pub use executor::{
    ExecutionOutcome, JobExecutor, RangedReport, RangedReportFactory, RejectionReason,
    ReportComputation, ReportError, ReportRange, ReportRegistry, StatelessReport,
};
#[cfg(any(test, feature = "mock"))]
pub use executor::{MockRangedReport, MockStatelessReport};
pub use job_map::{EventJobMap, RefreshJobEntry, RefreshJobId, FULL_REFRESH_EVENT};
pub use mode::{LargeSiteThresholds, ModeOverride, ModeResolver, SchedulingMode, LARGE_SITE_FLAG};
pub use scheduler::{
    DeferredScheduler, ScheduleOutcome, ScheduleReport, ScheduledRefresh, StaggerPolicy,
};
pub use work_unit::WorkUnit;
