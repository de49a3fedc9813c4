//! Large-site detection.
//!
//! Sites above a subscription or order threshold defer every report refresh
//! to a nightly window instead of refreshing minutes after each change.

use super::collaborators::{SettingsStore, SiteMetrics};
use crate::metrics;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Settings key holding the persisted large-site flag.
pub const LARGE_SITE_FLAG: &str = "large_site";

/// Operator hook applied to every large-site decision before it is used.
pub type ModeOverride = Arc<dyn Fn(bool) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingMode {
    Normal,
    LargeSite,
}

impl SchedulingMode {
    pub fn from_large_site(is_large_site: bool) -> Self {
        if is_large_site {
            SchedulingMode::LargeSite
        } else {
            SchedulingMode::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulingMode::Normal => "normal",
            SchedulingMode::LargeSite => "large_site",
        }
    }
}

impl fmt::Display for SchedulingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A site is large when either count is strictly greater than its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LargeSiteThresholds {
    pub subscriptions: u64,
    pub orders: u64,
}

impl Default for LargeSiteThresholds {
    fn default() -> Self {
        Self {
            subscriptions: 3000,
            orders: 25000,
        }
    }
}

impl LargeSiteThresholds {
    pub fn is_exceeded(&self, subscriptions: u64, orders: u64) -> bool {
        subscriptions > self.subscriptions || orders > self.orders
    }
}

/// Decides, at most once per process, whether the site is large.
///
/// A positive answer is persisted through the [`SettingsStore`] and reused by
/// later processes until [`ModeResolver::clear`] removes it. A negative answer
/// is only memoized in memory, so a growing site is re-checked on the next
/// start. Concurrent first calls may both compute the answer; they read the
/// same inputs and write the same value.
pub struct ModeResolver {
    settings: Arc<dyn SettingsStore>,
    site_metrics: Arc<dyn SiteMetrics>,
    thresholds: LargeSiteThresholds,
    override_hook: Option<ModeOverride>,
    memo: RwLock<Option<bool>>,
}

impl ModeResolver {
    pub fn new(settings: Arc<dyn SettingsStore>, site_metrics: Arc<dyn SiteMetrics>) -> Self {
        Self {
            settings,
            site_metrics,
            thresholds: LargeSiteThresholds::default(),
            override_hook: None,
            memo: RwLock::new(None),
        }
    }

    pub fn with_thresholds(mut self, thresholds: LargeSiteThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_override(mut self, hook: ModeOverride) -> Self {
        self.override_hook = Some(hook);
        self
    }

    /// Force the mode regardless of the computed answer.
    pub fn with_forced_mode(self, is_large_site: bool) -> Self {
        self.with_override(Arc::new(move |_| is_large_site))
    }

    pub fn is_large_site(&self) -> bool {
        if let Some(memoized) = self.read_memo() {
            return memoized;
        }

        let is_large = match self.persisted_flag() {
            Some(flag) => self.apply_override(flag),
            None => {
                let computed = self.compute_from_counts();
                if computed {
                    if let Err(e) = self.settings.set_setting(LARGE_SITE_FLAG, "true", true) {
                        warn!("Failed to persist large site flag: {}", e);
                    }
                }
                self.apply_override(computed)
            }
        };

        self.write_memo(Some(is_large));
        metrics::set_large_site(is_large);
        is_large
    }

    pub fn mode(&self) -> SchedulingMode {
        SchedulingMode::from_large_site(self.is_large_site())
    }

    /// Forget the memoized answer and delete the persisted flag, so the next
    /// call recomputes from the current counts.
    pub fn clear(&self) -> anyhow::Result<()> {
        self.write_memo(None);
        self.settings.delete_setting(LARGE_SITE_FLAG)
    }

    fn persisted_flag(&self) -> Option<bool> {
        match self.settings.get_setting(LARGE_SITE_FLAG) {
            Ok(Some(value)) => match value.as_str() {
                "true" => Some(true),
                "false" => Some(false),
                other => {
                    warn!("Ignoring unparseable large site flag {:?}", other);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Settings store unavailable, recomputing site size: {}", e);
                None
            }
        }
    }

    fn compute_from_counts(&self) -> bool {
        let subscriptions = self.site_metrics.count_subscriptions().unwrap_or_else(|e| {
            warn!("Failed to count subscriptions: {}", e);
            0
        });
        let orders = self.site_metrics.count_orders().unwrap_or_else(|e| {
            warn!("Failed to count orders: {}", e);
            0
        });
        let is_large = self.thresholds.is_exceeded(subscriptions, orders);
        info!(
            "Site size: {} subscriptions, {} orders (large site: {})",
            subscriptions, orders, is_large
        );
        is_large
    }

    fn apply_override(&self, is_large: bool) -> bool {
        match &self.override_hook {
            Some(hook) => hook(is_large),
            None => is_large,
        }
    }

    fn read_memo(&self) -> Option<bool> {
        *self.memo.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write_memo(&self, value: Option<bool>) {
        *self.memo.write().unwrap_or_else(|p| p.into_inner()) = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::collaborators::{MockSettingsStore, MockSiteMetrics};
    use mockall::predicate::eq;

    fn metrics_returning(subscriptions: u64, orders: u64) -> MockSiteMetrics {
        let mut metrics = MockSiteMetrics::new();
        metrics
            .expect_count_subscriptions()
            .returning(move || Ok(subscriptions));
        metrics.expect_count_orders().returning(move || Ok(orders));
        metrics
    }

    #[test]
    fn test_thresholds_are_strict() {
        let t = LargeSiteThresholds::default();
        assert!(!t.is_exceeded(3000, 25000));
        assert!(t.is_exceeded(3001, 0));
        assert!(t.is_exceeded(0, 25001));
    }

    #[test]
    fn test_small_site_is_not_persisted() {
        let mut settings = MockSettingsStore::new();
        settings.expect_get_setting().returning(|_| Ok(None));
        settings.expect_set_setting().never();

        let resolver = ModeResolver::new(Arc::new(settings), Arc::new(metrics_returning(10, 20)));
        assert!(!resolver.is_large_site());
        assert_eq!(resolver.mode(), SchedulingMode::Normal);
    }

    #[test]
    fn test_large_site_is_persisted_and_memoized() {
        let mut settings = MockSettingsStore::new();
        settings
            .expect_get_setting()
            .with(eq(LARGE_SITE_FLAG))
            .times(1)
            .returning(|_| Ok(None));
        settings
            .expect_set_setting()
            .with(eq(LARGE_SITE_FLAG), eq("true"), eq(true))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let mut site = MockSiteMetrics::new();
        site.expect_count_subscriptions().times(1).returning(|| Ok(5000));
        site.expect_count_orders().times(1).returning(|| Ok(0));

        let resolver = ModeResolver::new(Arc::new(settings), Arc::new(site));
        assert!(resolver.is_large_site());
        // Counts and settings are not queried again
        assert!(resolver.is_large_site());
        assert!(resolver.is_large_site());
    }

    #[test]
    fn test_persisted_flag_skips_counting() {
        let mut settings = MockSettingsStore::new();
        settings
            .expect_get_setting()
            .returning(|_| Ok(Some("true".to_string())));

        let mut site = MockSiteMetrics::new();
        site.expect_count_subscriptions().never();
        site.expect_count_orders().never();

        let resolver = ModeResolver::new(Arc::new(settings), Arc::new(site));
        assert!(resolver.is_large_site());
    }

    #[test]
    fn test_settings_failure_falls_back_to_counts() {
        let mut settings = MockSettingsStore::new();
        settings
            .expect_get_setting()
            .returning(|_| Err(anyhow::anyhow!("database is locked")));
        settings.expect_set_setting().returning(|_, _, _| Ok(()));

        let resolver =
            ModeResolver::new(Arc::new(settings), Arc::new(metrics_returning(0, 30000)));
        assert!(resolver.is_large_site());
    }

    #[test]
    fn test_metric_failure_counts_as_zero() {
        let mut settings = MockSettingsStore::new();
        settings.expect_get_setting().returning(|_| Ok(None));

        let mut site = MockSiteMetrics::new();
        site.expect_count_subscriptions()
            .returning(|| Err(anyhow::anyhow!("boom")));
        site.expect_count_orders().returning(|| Ok(100));

        let resolver = ModeResolver::new(Arc::new(settings), Arc::new(site));
        assert!(!resolver.is_large_site());
    }

    #[test]
    fn test_override_applies_to_persisted_flag() {
        let mut settings = MockSettingsStore::new();
        settings
            .expect_get_setting()
            .returning(|_| Ok(Some("true".to_string())));

        let resolver = ModeResolver::new(Arc::new(settings), Arc::new(MockSiteMetrics::new()))
            .with_forced_mode(false);
        assert!(!resolver.is_large_site());
    }

    #[test]
    fn test_override_applies_to_computed_value() {
        let mut settings = MockSettingsStore::new();
        settings.expect_get_setting().returning(|_| Ok(None));

        let resolver = ModeResolver::new(Arc::new(settings), Arc::new(metrics_returning(1, 1)))
            .with_override(Arc::new(|computed| !computed));
        assert!(resolver.is_large_site());
    }

    #[test]
    fn test_clear_forces_recomputation() {
        let mut settings = MockSettingsStore::new();
        let mut seq = mockall::Sequence::new();
        settings
            .expect_get_setting()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some("true".to_string())));
        settings
            .expect_delete_setting()
            .with(eq(LARGE_SITE_FLAG))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        settings
            .expect_get_setting()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(None));

        let resolver =
            ModeResolver::new(Arc::new(settings), Arc::new(metrics_returning(10, 10)));
        assert!(resolver.is_large_site());
        resolver.clear().unwrap();
        assert!(!resolver.is_large_site());
    }

    #[test]
    fn test_custom_thresholds() {
        let mut settings = MockSettingsStore::new();
        settings.expect_get_setting().returning(|_| Ok(None));
        settings.expect_set_setting().returning(|_, _, _| Ok(()));

        let resolver =
            ModeResolver::new(Arc::new(settings), Arc::new(metrics_returning(11, 0)))
                .with_thresholds(LargeSiteThresholds {
                    subscriptions: 10,
                    orders: 10,
                });
        assert!(resolver.is_large_site());
    }
}
