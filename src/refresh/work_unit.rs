use super::accumulator::InvalidationAccumulator;
use super::job_map::EventJobMap;
use super::scheduler::{DeferredScheduler, ScheduleReport};
use crate::metrics;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// One bounded span of execution collecting invalidation events.
///
/// Created at the start of the unit, fed every event delivered during it,
/// and consumed by [`WorkUnit::finish`], which queues the refreshes. Units
/// never share state; concurrent units only meet in the refresh queue.
pub struct WorkUnit {
    map: EventJobMap,
    accumulator: InvalidationAccumulator,
    scheduler: Arc<DeferredScheduler>,
}

impl WorkUnit {
    pub fn new(scheduler: Arc<DeferredScheduler>) -> Self {
        Self::with_map(scheduler, EventJobMap::standard())
    }

    pub fn with_map(scheduler: Arc<DeferredScheduler>, map: EventJobMap) -> Self {
        Self {
            map,
            accumulator: InvalidationAccumulator::new(map),
            scheduler,
        }
    }

    /// Record a domain event by name. Takes `&self` so the unit can be
    /// shared between threads delivering events.
    pub fn record(&self, event_name: &str) -> usize {
        let added = self.accumulator.record(event_name);
        // Unknown names share one label so arbitrary input cannot add series
        let label = self
            .map
            .known_event(event_name)
            .unwrap_or(metrics::UNKNOWN_EVENT_LABEL);
        metrics::record_event(label, added > 0);
        added
    }

    pub fn pending_len(&self) -> usize {
        self.accumulator.len()
    }

    pub fn finish(self) -> ScheduleReport {
        self.finish_at(Utc::now())
    }

    pub fn finish_at(self, now: DateTime<Utc>) -> ScheduleReport {
        let entries = self.accumulator.drain();
        self.scheduler.schedule_all_at(&entries, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::job_map::RefreshJobId;
    use crate::refresh::scheduler::{ScheduleOutcome, StaggerPolicy};
    use crate::refresh::testing::{resolver_with_mode, InMemoryQueue};
    use chrono::{Duration, NaiveDate, TimeZone};

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.from_utc_datetime(
            &NaiveDate::from_ymd_opt(y, m, d)
                .unwrap()
                .and_hms_opt(h, min, 0)
                .unwrap(),
        )
    }

    fn unit(queue: &Arc<InMemoryQueue>, large_site: bool) -> WorkUnit {
        let scheduler = DeferredScheduler::new(
            queue.clone(),
            resolver_with_mode(large_site),
            StaggerPolicy::default(),
        );
        WorkUnit::new(Arc::new(scheduler))
    }

    #[test]
    fn test_single_event_normal_mode() {
        let queue = Arc::new(InMemoryQueue::default());
        let now = at(2024, 3, 10, 12, 0);

        let unit = unit(&queue, false);
        unit.record("payment_complete");
        let report = unit.finish_at(now);

        assert_eq!(report.scheduled(), 2);
        assert_eq!(
            queue.pending_at(RefreshJobId::SubscriptionEventsByDate),
            Some(now + Duration::minutes(5))
        );
        assert_eq!(
            queue.pending_at(RefreshJobId::SubscriptionsByCustomer),
            Some(now + Duration::minutes(25))
        );
    }

    #[test]
    fn test_overlapping_events_schedule_once() {
        let queue = Arc::new(InMemoryQueue::default());

        let unit = unit(&queue, false);
        unit.record("payment_complete");
        unit.record("switch_completed");
        assert_eq!(unit.pending_len(), 2);
        let report = unit.finish_at(at(2024, 3, 10, 12, 0));

        assert_eq!(report.refreshes.len(), 2);
        assert_eq!(queue.len(), 2);
        let schedule_calls = queue
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with("schedule:"))
            .count();
        assert_eq!(schedule_calls, 2);
    }

    #[test]
    fn test_large_site_defers_to_next_window() {
        let queue = Arc::new(InMemoryQueue::default());

        let unit = unit(&queue, true);
        unit.record("status_active");
        let report = unit.finish_at(at(2024, 3, 10, 5, 0));

        assert_eq!(report.refreshes[0].outcome, ScheduleOutcome::Scheduled);
        assert_eq!(
            queue.pending_at(RefreshJobId::UpcomingRecurringRevenue),
            Some(at(2024, 3, 11, 4, 30))
        );
    }

    #[test]
    fn test_unknown_event_touches_nothing() {
        let queue = Arc::new(InMemoryQueue::default());

        let unit = unit(&queue, false);
        assert_eq!(unit.record("unrelated_event"), 0);
        let report = unit.finish_at(at(2024, 3, 10, 12, 0));

        assert!(report.refreshes.is_empty());
        assert_eq!(report.mode, None);
        assert_eq!(queue.call_count(), 0);
    }

    #[test]
    fn test_unknown_events_share_one_metric_label() {
        metrics::init_metrics();
        let queue = Arc::new(InMemoryQueue::default());

        let unit = unit(&queue, false);
        for i in 0..50 {
            unit.record(&format!("imported_event_{}", i));
        }
        unit.record("payment_complete");

        let family = metrics::REGISTRY
            .gather()
            .into_iter()
            .find(|m| m.get_name() == "report_refresh_events_recorded_total")
            .unwrap();
        let events: Vec<String> = family
            .get_metric()
            .iter()
            .flat_map(|m| m.get_label().iter())
            .filter(|l| l.get_name() == "event")
            .map(|l| l.get_value().to_string())
            .collect();
        assert!(events.iter().all(|e| !e.starts_with("imported_event_")));
        assert!(events.contains(&metrics::UNKNOWN_EVENT_LABEL.to_string()));
        assert!(events.contains(&"payment_complete".to_string()));
    }

    #[test]
    fn test_second_unit_skips_pending_refresh() {
        let queue = Arc::new(InMemoryQueue::default());
        let now = at(2024, 3, 10, 12, 0);

        let first = unit(&queue, false);
        first.record("new_order_item");
        first.finish_at(now);

        let second = unit(&queue, false);
        second.record("update_order_item");
        let report = second.finish_at(now + Duration::minutes(1));

        assert_eq!(report.skipped(), 1);
        assert_eq!(
            queue.pending_at(RefreshJobId::SubscriptionsByProduct),
            Some(now + Duration::minutes(20))
        );
    }

    #[test]
    fn test_events_from_several_threads() {
        let queue = Arc::new(InMemoryQueue::default());
        let unit = Arc::new(unit(&queue, false));

        let handles: Vec<_> = ["payment_complete", "status_changed", "new_order_item"]
            .into_iter()
            .map(|event| {
                let unit = Arc::clone(&unit);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        unit.record(event);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let unit = Arc::try_unwrap(unit).ok().unwrap();
        let report = unit.finish_at(at(2024, 3, 10, 12, 0));
        assert_eq!(report.scheduled(), 3);
    }
}
