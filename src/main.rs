use anyhow::Result;
use axum::{routing::get, Router};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use report_refresh_scheduler::config;
use report_refresh_scheduler::metrics;
use report_refresh_scheduler::refresh::{EventJobMap, ScheduleReport};
use report_refresh_scheduler::refresh_store::RefreshStore;
use report_refresh_scheduler::worker::RefreshWorker;
use report_refresh_scheduler::RefreshApp;

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(path))
}

fn parse_dir(s: &str) -> Result<PathBuf, String> {
    let path = parse_path(s)?;
    if !path.exists() {
        return Err(format!("Directory does not exist: {}", s));
    }
    if !path.is_dir() {
        return Err(format!("Path is not a directory: {}", s));
    }
    Ok(path)
}

#[derive(Parser, Debug)]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), "-", env!("GIT_HASH")))]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, global = true, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory containing refresh.db. Can also be specified in config file.
    #[clap(long, global = true, value_parser = parse_dir)]
    pub db_dir: Option<PathBuf>,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, global = true, default_value_t = 9091)]
    pub metrics_port: u16,

    /// Offset of the site's local time from UTC, in minutes.
    #[clap(long, global = true, default_value_t = 0, allow_hyphen_values = true)]
    pub site_utc_offset_minutes: i32,

    /// Skip site size detection and force large-site (true) or normal (false) scheduling.
    #[clap(long, global = true)]
    pub force_large_site: Option<bool>,

    /// Subscriptions above which the site is considered large.
    #[clap(long, global = true, default_value_t = 3000)]
    pub large_site_subscription_threshold: u64,

    /// Orders above which the site is considered large.
    #[clap(long, global = true, default_value_t = 25000)]
    pub large_site_order_threshold: u64,

    /// Local hour of day large sites refresh at.
    #[clap(long, global = true, default_value_t = 4)]
    pub large_site_hour: u32,

    #[clap(long, global = true, default_value_t = 15)]
    pub large_site_stagger_minutes: u32,

    #[clap(long, global = true, default_value_t = 5)]
    pub normal_stagger_minutes: u32,

    /// Longest time the worker sleeps between queue checks.
    #[clap(long, global = true, default_value_t = 60)]
    pub worker_poll_interval_secs: u64,

    /// Number of days of refresh run history to keep.
    #[clap(long, global = true, default_value_t = 30)]
    pub history_retention_days: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Records the given events as one work unit and schedules the
    /// invalidated report refreshes.
    Emit {
        #[arg(required = true)]
        events: Vec<String>,
    },

    /// Runs queued refreshes as they become due until Ctrl+C.
    Worker,

    /// Shows the scheduling mode, the queue and recent runs.
    Status {
        #[arg(long, default_value_t = 10)]
        history: usize,
    },

    /// Updates the site size counters used to detect large sites.
    SetCounts {
        #[arg(long)]
        subscriptions: u64,
        #[arg(long)]
        orders: u64,
    },

    /// Forgets the persisted large-site decision.
    ClearLargeSite,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            db_dir: args.db_dir.clone(),
            metrics_port: args.metrics_port,
            site_utc_offset_minutes: args.site_utc_offset_minutes,
            force_large_site: args.force_large_site,
            large_site_subscription_threshold: args.large_site_subscription_threshold,
            large_site_order_threshold: args.large_site_order_threshold,
            large_site_hour: args.large_site_hour,
            large_site_stagger_minutes: args.large_site_stagger_minutes,
            normal_stagger_minutes: args.normal_stagger_minutes,
            worker_poll_interval_secs: args.worker_poll_interval_secs,
            history_retention_days: args.history_retention_days,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;
    let app = RefreshApp::open(&app_config)?;

    match cli_args.command {
        Command::Emit { events } => emit(&app, &events),
        Command::Worker => run_worker(app, &app_config).await,
        Command::Status { history } => print_status(&app, history),
        Command::SetCounts {
            subscriptions,
            orders,
        } => {
            app.store.set_site_counts(subscriptions, orders)?;
            println!(
                "Site counters updated: {} subscriptions, {} orders",
                subscriptions, orders
            );
            Ok(())
        }
        Command::ClearLargeSite => {
            app.scheduler.mode_resolver().clear()?;
            println!("Large site flag cleared, mode will be recomputed on next use");
            Ok(())
        }
    }
}

fn emit(app: &RefreshApp, events: &[String]) -> Result<()> {
    let map = EventJobMap::standard();
    let unit = app.work_unit();
    for event in events {
        if map.jobs_for(event).is_empty() {
            warn!("Ignoring unrecognized event {:?}", event);
        }
        unit.record(event);
    }

    print_schedule_report(&unit.finish());
    Ok(())
}

fn print_schedule_report(report: &ScheduleReport) {
    let Some(mode) = report.mode else {
        println!("No report refreshes needed");
        return;
    };

    println!("Mode: {}", mode);
    for refresh in &report.refreshes {
        println!(
            "  {:<28} {:<10} {}",
            refresh.job_id.as_str(),
            refresh.outcome.as_str(),
            refresh.run_at.to_rfc3339()
        );
    }
}

fn print_status(app: &RefreshApp, history: usize) -> Result<()> {
    println!("Mode: {}", app.scheduler.mode_resolver().mode());

    let queue = app.store.list_queue()?;
    println!("Queue ({} entries):", queue.len());
    for entry in &queue {
        println!(
            "  #{:<5} {:<8} {} {}",
            entry.id,
            entry.status.as_str(),
            entry.run_at.to_rfc3339(),
            entry.args
        );
    }

    let runs = app.store.get_run_history(history)?;
    println!("Recent runs:");
    for run in &runs {
        println!(
            "  {} {:<9} {}{}",
            run.started_at.to_rfc3339(),
            run.status.as_str(),
            run.args,
            run.error_message
                .as_ref()
                .map(|e| format!(" ({})", e))
                .unwrap_or_default()
        );
    }

    let cache = app.store.list_report_cache()?;
    println!("Report cache:");
    for entry in &cache {
        println!(
            "  {:<28} {:<11} {}",
            entry.report,
            entry.range,
            entry.refreshed_at.to_rfc3339()
        );
    }
    Ok(())
}

async fn run_worker(app: RefreshApp, app_config: &config::AppConfig) -> Result<()> {
    info!("Initializing metrics...");
    metrics::init_metrics();

    let shutdown_token = CancellationToken::new();

    let metrics_app = Router::new().route("/metrics", get(metrics::metrics_handler));
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", app_config.metrics_port)).await?;
    info!("Metrics available at port {}!", app_config.metrics_port);
    let metrics_shutdown = shutdown_token.clone();
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, metrics_app)
            .with_graceful_shutdown(metrics_shutdown.cancelled_owned())
            .await
        {
            error!("Metrics server failed: {}", e);
        }
    });

    let worker = RefreshWorker::new(
        app.store.clone() as Arc<dyn RefreshStore>,
        app.executor.clone(),
        app_config.worker.clone(),
        shutdown_token.clone(),
    );

    tokio::select! {
        _ = worker.run() => {
            info!("Worker stopped");
            Ok(())
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown");
            shutdown_token.cancel();
            // Give the worker a moment to finish the current refresh
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        }
    }
}
