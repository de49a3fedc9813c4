//! Report computations bound to the refresh database.
//!
//! Recomputing a report here means invalidating its cached dataset and
//! stamping a fresh marker in `report_cache`, with the concrete period each
//! range resolves to.

use crate::refresh::{
    RangedReport, RangedReportFactory, RefreshJobId, ReportError, ReportRange, ReportRegistry,
    StatelessReport,
};
use crate::refresh_store::{RefreshStore, ReportCacheEntry, WHOLE_REPORT_RANGE};
use chrono::{Datelike, Duration, NaiveDate, Utc};
use std::sync::Arc;
use tracing::debug;

/// First and last day covered by `range` when evaluated on `today`.
pub fn range_bounds(range: ReportRange, today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let month_start = today.with_day(1).unwrap_or(today);
    match range {
        ReportRange::Year => (today.with_ordinal(1).unwrap_or(today), today),
        ReportRange::Month => (month_start, today),
        ReportRange::LastMonth => {
            let last_month_end = month_start - Duration::days(1);
            (last_month_end.with_day(1).unwrap_or(last_month_end), last_month_end)
        }
        ReportRange::Last7Days => (today - Duration::days(6), today),
    }
}

/// Report recomputed as a whole.
pub struct StoreStatelessReport {
    job_id: RefreshJobId,
    store: Arc<dyn RefreshStore>,
}

impl StoreStatelessReport {
    pub fn new(job_id: RefreshJobId, store: Arc<dyn RefreshStore>) -> Self {
        Self { job_id, store }
    }
}

impl StatelessReport for StoreStatelessReport {
    fn compute(&self, force_bypass_cache: bool) -> Result<(), ReportError> {
        debug!(
            "Computing {} (bypass cache: {})",
            self.job_id, force_bypass_cache
        );
        self.store.mark_report_refreshed(&ReportCacheEntry {
            report: self.job_id.as_str().to_string(),
            range: WHOLE_REPORT_RANGE.to_string(),
            period_start: None,
            period_end: None,
            refreshed_at: Utc::now(),
        })?;
        Ok(())
    }
}

/// One instance of a ranged report. The period is fixed by the first
/// `compute` call, so an instance must not be reused across ranges.
pub struct StoreRangedReport {
    job_id: RefreshJobId,
    store: Arc<dyn RefreshStore>,
    today: NaiveDate,
    period: Option<(ReportRange, NaiveDate, NaiveDate)>,
}

impl RangedReport for StoreRangedReport {
    fn compute(&mut self, range: ReportRange, force_bypass_cache: bool) -> Result<(), ReportError> {
        let (_, start, end) = match self.period {
            Some((bound_range, start, end)) if bound_range == range => (bound_range, start, end),
            Some((bound_range, _, _)) => {
                return Err(ReportError::Other(anyhow::anyhow!(
                    "{} instance already bound to range {}",
                    self.job_id,
                    bound_range
                )))
            }
            None => {
                let (start, end) = range_bounds(range, self.today);
                self.period = Some((range, start, end));
                (range, start, end)
            }
        };

        debug!(
            "Computing {} for {} ({} to {}, bypass cache: {})",
            self.job_id, range, start, end, force_bypass_cache
        );
        self.store.mark_report_refreshed(&ReportCacheEntry {
            report: self.job_id.as_str().to_string(),
            range: range.as_str().to_string(),
            period_start: Some(start),
            period_end: Some(end),
            refreshed_at: Utc::now(),
        })?;
        Ok(())
    }
}

pub struct StoreRangedReportFactory {
    job_id: RefreshJobId,
    store: Arc<dyn RefreshStore>,
}

impl StoreRangedReportFactory {
    pub fn new(job_id: RefreshJobId, store: Arc<dyn RefreshStore>) -> Self {
        Self { job_id, store }
    }
}

impl RangedReportFactory for StoreRangedReportFactory {
    fn create(&self) -> Box<dyn RangedReport> {
        Box::new(StoreRangedReport {
            job_id: self.job_id,
            store: Arc::clone(&self.store),
            today: Utc::now().date_naive(),
            period: None,
        })
    }
}

/// Registry wiring every known report to its computation shape.
pub fn standard_registry(store: Arc<dyn RefreshStore>) -> ReportRegistry {
    let ranged = |job_id| -> Arc<dyn RangedReportFactory> {
        Arc::new(StoreRangedReportFactory::new(job_id, Arc::clone(&store)))
    };
    let stateless = |job_id| -> Arc<dyn StatelessReport> {
        Arc::new(StoreStatelessReport::new(job_id, Arc::clone(&store)))
    };

    ReportRegistry::new()
        .with_ranged(
            RefreshJobId::SubscriptionEventsByDate,
            ranged(RefreshJobId::SubscriptionEventsByDate),
        )
        .with_ranged(
            RefreshJobId::UpcomingRecurringRevenue,
            ranged(RefreshJobId::UpcomingRecurringRevenue),
        )
        .with_stateless(
            RefreshJobId::SubscriptionsByProduct,
            stateless(RefreshJobId::SubscriptionsByProduct),
        )
        .with_stateless(
            RefreshJobId::SubscriptionsByCustomer,
            stateless(RefreshJobId::SubscriptionsByCustomer),
        )
}
