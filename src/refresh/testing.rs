//! Test doubles shared by the refresh engine's unit tests.

use super::collaborators::{
    MockSettingsStore, MockSiteMetrics, RefreshArgs, RefreshQueue, REFRESH_HOOK,
};
use super::job_map::RefreshJobId;
use super::mode::{ModeResolver, LARGE_SITE_FLAG};
use anyhow::Result;
use chrono::{DateTime, Utc};
use mockall::predicate::eq;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Queue keeping one entry per `(hook, args)`, with a log of every call.
#[derive(Default)]
pub struct InMemoryQueue {
    entries: Mutex<HashMap<(String, String), DateTime<Utc>>>,
    pub calls: Mutex<Vec<String>>,
}

impl InMemoryQueue {
    pub fn pending_at(&self, job_id: RefreshJobId) -> Option<DateTime<Utc>> {
        let key = (
            REFRESH_HOOK.to_string(),
            RefreshArgs::for_job(job_id).to_json(),
        );
        self.entries.lock().unwrap().get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn log(&self, call: &str, args: &RefreshArgs) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{}:{}", call, args.report));
    }
}

impl RefreshQueue for InMemoryQueue {
    fn schedule(&self, hook: &str, args: &RefreshArgs, at: DateTime<Utc>) -> Result<bool> {
        self.log("schedule", args);
        let mut entries = self.entries.lock().unwrap();
        let key = (hook.to_string(), args.to_json());
        if entries.contains_key(&key) {
            return Ok(false);
        }
        entries.insert(key, at);
        Ok(true)
    }

    fn is_scheduled(&self, hook: &str, args: &RefreshArgs) -> Result<Option<DateTime<Utc>>> {
        self.log("is_scheduled", args);
        let key = (hook.to_string(), args.to_json());
        Ok(self.entries.lock().unwrap().get(&key).copied())
    }

    fn cancel(&self, hook: &str, args: &RefreshArgs, at: DateTime<Utc>) -> Result<bool> {
        self.log("cancel", args);
        let mut entries = self.entries.lock().unwrap();
        let key = (hook.to_string(), args.to_json());
        if entries.get(&key) == Some(&at) {
            entries.remove(&key);
            return Ok(true);
        }
        Ok(false)
    }
}

/// Resolver whose persisted flag already holds `large_site`.
pub fn resolver_with_mode(large_site: bool) -> Arc<ModeResolver> {
    let mut settings = MockSettingsStore::new();
    settings
        .expect_get_setting()
        .with(eq(LARGE_SITE_FLAG))
        .returning(move |_| Ok(Some(large_site.to_string())));
    let mut site_metrics = MockSiteMetrics::new();
    site_metrics.expect_count_subscriptions().never();
    site_metrics.expect_count_orders().never();
    Arc::new(ModeResolver::new(
        Arc::new(settings),
        Arc::new(site_metrics),
    ))
}
