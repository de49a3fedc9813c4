//! Wiring of the refresh engine on top of the SQLite store.

use crate::config::{AppConfig, SchedulingSettings};
use crate::refresh::{DeferredScheduler, JobExecutor, ModeResolver, WorkUnit};
use crate::refresh_store::{RefreshStore, SqliteRefreshStore};
use crate::reports::standard_registry;
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

pub struct RefreshApp {
    pub store: Arc<SqliteRefreshStore>,
    pub scheduler: Arc<DeferredScheduler>,
    pub executor: Arc<JobExecutor>,
}

impl RefreshApp {
    pub fn open(config: &AppConfig) -> Result<Self> {
        info!("Opening refresh store at {:?}", config.refresh_db_path());
        let store = Arc::new(SqliteRefreshStore::new(config.refresh_db_path())?);
        Ok(Self::with_store(store, &config.scheduling))
    }

    pub fn with_store(store: Arc<SqliteRefreshStore>, scheduling: &SchedulingSettings) -> Self {
        let mut resolver = ModeResolver::new(store.clone(), store.clone())
            .with_thresholds(scheduling.thresholds);
        if let Some(forced) = scheduling.force_large_site {
            info!("Scheduling mode forced (large site: {})", forced);
            resolver = resolver.with_forced_mode(forced);
        }

        let scheduler = Arc::new(DeferredScheduler::new(
            store.clone(),
            Arc::new(resolver),
            scheduling.policy,
        ));
        let executor = Arc::new(JobExecutor::new(standard_registry(
            store.clone() as Arc<dyn RefreshStore>
        )));

        Self {
            store,
            scheduler,
            executor,
        }
    }

    /// Start a work unit bound to this app's scheduler.
    pub fn work_unit(&self) -> WorkUnit {
        WorkUnit::new(Arc::clone(&self.scheduler))
    }
}
