mod file_config;

pub use file_config::{FileConfig, SchedulingConfig, WorkerConfig};

use crate::refresh::{LargeSiteThresholds, StaggerPolicy};
use crate::worker::WorkerSettings;
use anyhow::{bail, Result};
use chrono::{Duration, FixedOffset};
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub metrics_port: u16,
    pub site_utc_offset_minutes: i32,
    pub force_large_site: Option<bool>,
    pub large_site_subscription_threshold: u64,
    pub large_site_order_threshold: u64,
    pub large_site_hour: u32,
    pub large_site_stagger_minutes: u32,
    pub normal_stagger_minutes: u32,
    pub worker_poll_interval_secs: u64,
    pub history_retention_days: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        let thresholds = LargeSiteThresholds::default();
        Self {
            db_dir: None,
            metrics_port: 9091,
            site_utc_offset_minutes: 0,
            force_large_site: None,
            large_site_subscription_threshold: thresholds.subscriptions,
            large_site_order_threshold: thresholds.orders,
            large_site_hour: 4,
            large_site_stagger_minutes: 15,
            normal_stagger_minutes: 5,
            worker_poll_interval_secs: 60,
            history_retention_days: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub metrics_port: u16,
    pub scheduling: SchedulingSettings,
    pub worker: WorkerSettings,
}

#[derive(Debug, Clone)]
pub struct SchedulingSettings {
    /// `Some` bypasses site size detection.
    pub force_large_site: Option<bool>,
    pub thresholds: LargeSiteThresholds,
    pub policy: StaggerPolicy,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let sched = file.scheduling.unwrap_or_default();
        let offset_minutes = sched
            .site_utc_offset_minutes
            .unwrap_or(cli.site_utc_offset_minutes);
        let site_offset = match FixedOffset::east_opt(offset_minutes * 60) {
            Some(offset) => offset,
            None => bail!("site_utc_offset_minutes out of range: {}", offset_minutes),
        };

        let large_site_hour = sched.large_site_hour.unwrap_or(cli.large_site_hour);
        if large_site_hour > 23 {
            bail!("large_site_hour must be between 0 and 23, got {}", large_site_hour);
        }

        let large_site_stagger = sched
            .large_site_stagger_minutes
            .unwrap_or(cli.large_site_stagger_minutes);
        let normal_stagger = sched
            .normal_stagger_minutes
            .unwrap_or(cli.normal_stagger_minutes);
        if large_site_stagger == 0 || normal_stagger == 0 {
            bail!("Stagger intervals must be at least one minute");
        }

        let scheduling = SchedulingSettings {
            force_large_site: sched.force_large_site.or(cli.force_large_site),
            thresholds: LargeSiteThresholds {
                subscriptions: sched
                    .large_site_subscription_threshold
                    .unwrap_or(cli.large_site_subscription_threshold),
                orders: sched
                    .large_site_order_threshold
                    .unwrap_or(cli.large_site_order_threshold),
            },
            policy: StaggerPolicy {
                large_site_hour,
                large_site_stagger: Duration::minutes(large_site_stagger as i64),
                normal_stagger: Duration::minutes(normal_stagger as i64),
                site_offset,
            },
        };

        let worker_file = file.worker.unwrap_or_default();
        let poll_interval_secs = worker_file
            .poll_interval_secs
            .unwrap_or(cli.worker_poll_interval_secs);
        if poll_interval_secs == 0 {
            bail!("Worker poll interval must be at least one second");
        }
        let defaults = WorkerSettings::default();
        let worker = WorkerSettings {
            poll_interval: std::time::Duration::from_secs(poll_interval_secs),
            batch_size: worker_file.batch_size.unwrap_or(defaults.batch_size).max(1),
            history_retention: Duration::days(
                worker_file
                    .history_retention_days
                    .unwrap_or(cli.history_retention_days) as i64,
            ),
        };

        Ok(Self {
            db_dir,
            metrics_port,
            scheduling,
            worker,
        })
    }

    pub fn refresh_db_path(&self) -> PathBuf {
        self.db_dir.join("refresh.db")
    }
}
