use super::job_map::{EventJobMap, RefreshJobEntry, RefreshJobId};
use std::collections::BTreeSet;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Collects the report caches invalidated during one work unit.
///
/// Only job identifiers are kept; their priority index is looked up again in
/// the [`EventJobMap`] when the set is drained. Mutation goes through a mutex
/// so events delivered from several threads still produce a duplicate-free
/// set.
pub struct InvalidationAccumulator {
    map: EventJobMap,
    pending: Mutex<BTreeSet<RefreshJobId>>,
}

impl InvalidationAccumulator {
    pub fn new(map: EventJobMap) -> Self {
        Self {
            map,
            pending: Mutex::new(BTreeSet::new()),
        }
    }

    /// Record that `event_name` fired. Returns how many job identifiers were
    /// not already pending.
    pub fn record(&self, event_name: &str) -> usize {
        let jobs = self.map.jobs_for(event_name);
        if jobs.is_empty() {
            return 0;
        }

        let mut pending = self.lock_pending();
        let added = jobs
            .iter()
            .filter(|entry| pending.insert(entry.job_id))
            .count();
        debug!(
            "Event {} invalidated {} report(s), {} new",
            event_name,
            jobs.len(),
            added
        );
        added
    }

    /// Number of distinct jobs currently accumulated.
    pub fn len(&self) -> usize {
        self.lock_pending().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_pending().is_empty()
    }

    /// Take every accumulated job, ordered by priority index, leaving the
    /// accumulator empty.
    pub fn drain(&self) -> Vec<RefreshJobEntry> {
        let taken = std::mem::take(&mut *self.lock_pending());
        let mut entries: Vec<RefreshJobEntry> = taken
            .into_iter()
            .filter_map(|job_id| match self.map.priority_of(job_id) {
                Some(priority) => Some(RefreshJobEntry::new(job_id, priority)),
                None => {
                    warn!("Dropping {} with no priority in the event map", job_id);
                    None
                }
            })
            .collect();
        entries.sort_by_key(|entry| (entry.priority, entry.job_id));
        entries
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, BTreeSet<RefreshJobId>> {
        // The set stays consistent even if a holder panicked mid-insert
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for InvalidationAccumulator {
    fn default() -> Self {
        Self::new(EventJobMap::standard())
    }
}
