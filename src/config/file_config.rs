use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub metrics_port: Option<u16>,

    // Feature configs
    pub scheduling: Option<SchedulingConfig>,
    pub worker: Option<WorkerConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Offset of the site's local time from UTC, in minutes.
    pub site_utc_offset_minutes: Option<i32>,
    /// Skip site size detection and always use the given mode.
    pub force_large_site: Option<bool>,
    pub large_site_subscription_threshold: Option<u64>,
    pub large_site_order_threshold: Option<u64>,
    pub large_site_hour: Option<u32>,
    pub large_site_stagger_minutes: Option<u32>,
    pub normal_stagger_minutes: Option<u32>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct WorkerConfig {
    pub poll_interval_secs: Option<u64>,
    pub batch_size: Option<usize>,
    pub history_retention_days: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
