//! Static table of which report caches each domain event invalidates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a refreshable report cache.
///
/// The string form returned by [`RefreshJobId::as_str`] is persisted in the
/// refresh queue, so existing variants must never be renamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshJobId {
    /// Subscription signups, renewals, switches and cancellations by date.
    SubscriptionEventsByDate,
    /// Recurring revenue expected from upcoming renewals.
    UpcomingRecurringRevenue,
    /// Subscription totals grouped by product.
    SubscriptionsByProduct,
    /// Subscription totals grouped by customer.
    SubscriptionsByCustomer,
}

impl RefreshJobId {
    pub const ALL: [RefreshJobId; 4] = [
        RefreshJobId::SubscriptionEventsByDate,
        RefreshJobId::UpcomingRecurringRevenue,
        RefreshJobId::SubscriptionsByProduct,
        RefreshJobId::SubscriptionsByCustomer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshJobId::SubscriptionEventsByDate => "subscription_events_by_date",
            RefreshJobId::UpcomingRecurringRevenue => "upcoming_recurring_revenue",
            RefreshJobId::SubscriptionsByProduct => "subscriptions_by_product",
            RefreshJobId::SubscriptionsByCustomer => "subscriptions_by_customer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "subscription_events_by_date" => Some(RefreshJobId::SubscriptionEventsByDate),
            "upcoming_recurring_revenue" => Some(RefreshJobId::UpcomingRecurringRevenue),
            "subscriptions_by_product" => Some(RefreshJobId::SubscriptionsByProduct),
            "subscriptions_by_customer" => Some(RefreshJobId::SubscriptionsByCustomer),
            _ => None,
        }
    }
}

impl fmt::Display for RefreshJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job identifier together with the priority index used to stagger it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RefreshJobEntry {
    pub job_id: RefreshJobId,
    pub priority: u32,
}

impl RefreshJobEntry {
    pub const fn new(job_id: RefreshJobId, priority: u32) -> Self {
        Self { job_id, priority }
    }
}

const EVENTS_BY_DATE: RefreshJobEntry =
    RefreshJobEntry::new(RefreshJobId::SubscriptionEventsByDate, 0);
const UPCOMING_REVENUE: RefreshJobEntry =
    RefreshJobEntry::new(RefreshJobId::UpcomingRecurringRevenue, 1);
// Index 2 belonged to the retention rate report, which is no longer cached.
const BY_PRODUCT: RefreshJobEntry = RefreshJobEntry::new(RefreshJobId::SubscriptionsByProduct, 3);
const BY_CUSTOMER: RefreshJobEntry =
    RefreshJobEntry::new(RefreshJobId::SubscriptionsByCustomer, 4);

/// Synthetic event requesting a refresh of every cached report.
pub const FULL_REFRESH_EVENT: &str = "schedule_cache_updates";

const STANDARD_TABLE: &[(&str, &[RefreshJobEntry])] = &[
    (
        FULL_REFRESH_EVENT,
        &[EVENTS_BY_DATE, UPCOMING_REVENUE, BY_PRODUCT, BY_CUSTOMER],
    ),
    // Covers initial, renewal and switch payments.
    ("payment_complete", &[EVENTS_BY_DATE, BY_CUSTOMER]),
    ("switch_completed", &[EVENTS_BY_DATE]),
    ("status_changed", &[EVENTS_BY_DATE, BY_CUSTOMER]),
    ("status_active", &[UPCOMING_REVENUE]),
    ("new_order_item", &[BY_PRODUCT]),
    ("update_order_item", &[BY_PRODUCT]),
];

/// Read-only mapping from event name to the report caches it invalidates.
#[derive(Debug, Clone, Copy)]
pub struct EventJobMap {
    table: &'static [(&'static str, &'static [RefreshJobEntry])],
}

impl Default for EventJobMap {
    fn default() -> Self {
        Self::standard()
    }
}

impl EventJobMap {
    pub const fn new(table: &'static [(&'static str, &'static [RefreshJobEntry])]) -> Self {
        Self { table }
    }

    /// The built-in subscription report table.
    pub const fn standard() -> Self {
        Self::new(STANDARD_TABLE)
    }

    /// Jobs invalidated by `event_name`, in table order. Unknown events map
    /// to an empty slice.
    pub fn jobs_for(&self, event_name: &str) -> &'static [RefreshJobEntry] {
        self.table
            .iter()
            .find(|(name, _)| *name == event_name)
            .map(|(_, entries)| *entries)
            .unwrap_or(&[])
    }

    /// The table's own copy of `event_name`, if the table reacts to it.
    pub fn known_event(&self, event_name: &str) -> Option<&'static str> {
        self.table
            .iter()
            .map(|(name, _)| *name)
            .find(|name| *name == event_name)
    }

    /// Every event name the table reacts to, for subscribing to an event bus.
    pub fn event_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.table.iter().map(|(name, _)| *name)
    }

    /// Priority index of `job_id`, taken from the first table row that
    /// mentions it.
    pub fn priority_of(&self, job_id: RefreshJobId) -> Option<u32> {
        self.table
            .iter()
            .flat_map(|(_, entries)| entries.iter())
            .find(|entry| entry.job_id == job_id)
            .map(|entry| entry.priority)
    }
}
