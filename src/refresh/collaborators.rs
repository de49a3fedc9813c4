//! Interfaces of the systems the refresh engine talks to.
//!
//! The engine only depends on these traits. `refresh_store` provides SQLite
//! backed implementations used by the binary.

use super::job_map::RefreshJobId;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Hook name every report refresh is queued under.
pub const REFRESH_HOOK: &str = "report_update_cache";

/// Arguments stored with a queued refresh.
///
/// The report is kept as a plain string rather than a [`RefreshJobId`]:
/// entries written by an older deployment may name reports that no longer
/// exist, and the executor has to be able to see and reject them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshArgs {
    pub report: String,
}

impl RefreshArgs {
    pub fn for_job(job_id: RefreshJobId) -> Self {
        Self {
            report: job_id.as_str().to_string(),
        }
    }

    /// Canonical JSON form, used as part of the queue's uniqueness key.
    pub fn to_json(&self) -> String {
        serde_json::json!({ "report": self.report }).to_string()
    }

    pub fn from_json(s: &str) -> Option<Self> {
        serde_json::from_str(s).ok()
    }

    pub fn job_id(&self) -> Option<RefreshJobId> {
        RefreshJobId::parse(&self.report)
    }
}

/// Persistent queue of deferred refreshes.
///
/// Implementations must make `schedule` an atomic check-then-insert on
/// `(hook, args)` so two work units racing on the same report cannot both
/// enqueue it.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait RefreshQueue: Send + Sync {
    /// Queue `hook(args)` to run at `at`. Returns `false` when an entry with
    /// the same hook and arguments is already pending.
    fn schedule(&self, hook: &str, args: &RefreshArgs, at: DateTime<Utc>) -> Result<bool>;

    /// Run time of the pending entry for `hook(args)`, if any.
    fn is_scheduled(&self, hook: &str, args: &RefreshArgs) -> Result<Option<DateTime<Utc>>>;

    /// Remove the pending entry for `hook(args)` queued at `at`. Returns
    /// whether an entry was removed.
    fn cancel(&self, hook: &str, args: &RefreshArgs, at: DateTime<Utc>) -> Result<bool>;
}

/// Small key/value settings store.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait SettingsStore: Send + Sync {
    fn get_setting(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`. When `persist` is false the value only lives
    /// as long as the current process.
    fn set_setting(&self, key: &str, value: &str, persist: bool) -> Result<()>;

    fn delete_setting(&self, key: &str) -> Result<()>;
}

/// Size of the site, used to pick the scheduling mode.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait SiteMetrics: Send + Sync {
    fn count_subscriptions(&self) -> Result<u64>;
    fn count_orders(&self) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_args_json() {
        let args = RefreshArgs::for_job(RefreshJobId::SubscriptionsByProduct);
        assert_eq!(args.to_json(), r#"{"report":"subscriptions_by_product"}"#);
        assert_eq!(RefreshArgs::from_json(&args.to_json()), Some(args.clone()));
        assert_eq!(args.job_id(), Some(RefreshJobId::SubscriptionsByProduct));
    }

    #[test]
    fn test_refresh_args_unknown_report() {
        let args = RefreshArgs::from_json(r#"{"report":"retention_rate"}"#).unwrap();
        assert_eq!(args.job_id(), None);
        assert!(RefreshArgs::from_json("not json").is_none());
        assert!(RefreshArgs::from_json(r#"{"class":"x"}"#).is_none());
    }
}
