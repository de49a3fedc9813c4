use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all refresh scheduler metrics
const PREFIX: &str = "report_refresh";

/// `event` label used for names the event map does not know.
pub const UNKNOWN_EVENT_LABEL: &str = "unknown";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Event intake
    pub static ref EVENTS_RECORDED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_events_recorded_total"), "Domain events recorded by work units"),
        &["event", "invalidated"]
    ).expect("Failed to create events_recorded_total metric");

    // Scheduling
    pub static ref SCHEDULE_OUTCOMES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_schedule_outcomes_total"), "Refresh scheduling attempts by outcome"),
        &["mode", "outcome"]
    ).expect("Failed to create schedule_outcomes_total metric");

    pub static ref LARGE_SITE: Gauge = Gauge::new(
        format!("{PREFIX}_large_site"),
        "1 when the site is scheduled in large-site mode"
    ).expect("Failed to create large_site metric");

    // Execution
    pub static ref JOB_EXECUTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_job_executions_total"), "Executed refreshes by report and status"),
        &["report", "status"]
    ).expect("Failed to create job_executions_total metric");

    pub static ref JOB_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_job_duration_seconds"),
            "Refresh execution duration in seconds"
        )
        .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0, 600.0]),
        &["report"]
    ).expect("Failed to create job_duration_seconds metric");

    // Queue
    pub static ref QUEUE_PENDING: IntGauge = IntGauge::new(
        format!("{PREFIX}_queue_pending"),
        "Refreshes waiting in the queue"
    ).expect("Failed to create queue_pending metric");

    pub static ref QUEUE_STALE_RESETS: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_queue_stale_resets"), "Entries found running at worker startup"),
        &["action"]
    ).expect("Failed to create queue_stale_resets metric");
}

/// Register every metric with [`REGISTRY`]. Safe to call more than once.
pub fn init_metrics() {
    // Ignore errors if already registered (tests call this repeatedly)
    let _ = REGISTRY.register(Box::new(EVENTS_RECORDED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(SCHEDULE_OUTCOMES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(LARGE_SITE.clone()));
    let _ = REGISTRY.register(Box::new(JOB_EXECUTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(JOB_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(QUEUE_PENDING.clone()));
    let _ = REGISTRY.register(Box::new(QUEUE_STALE_RESETS.clone()));

    tracing::info!("Metrics system initialized successfully");
}

pub fn record_event(event: &str, invalidated: bool) {
    EVENTS_RECORDED_TOTAL
        .with_label_values(&[event, if invalidated { "true" } else { "false" }])
        .inc();
}

pub fn record_schedule_outcome(mode: &str, outcome: &str) {
    SCHEDULE_OUTCOMES_TOTAL
        .with_label_values(&[mode, outcome])
        .inc();
}

pub fn set_large_site(is_large_site: bool) {
    LARGE_SITE.set(if is_large_site { 1.0 } else { 0.0 });
}

/// Record a finished refresh execution
pub fn record_job_execution(report: &str, status: &str, duration: Duration) {
    JOB_EXECUTIONS_TOTAL
        .with_label_values(&[report, status])
        .inc();

    JOB_DURATION_SECONDS
        .with_label_values(&[report])
        .observe(duration.as_secs_f64());
}

pub fn set_queue_pending(count: usize) {
    QUEUE_PENDING.set(count as i64);
}

pub fn set_stale_resets(requeued: usize, superseded: usize) {
    QUEUE_STALE_RESETS
        .with_label_values(&["requeued"])
        .set(requeued as f64);
    QUEUE_STALE_RESETS
        .with_label_values(&["superseded"])
        .set(superseded as f64);
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find(name: &str) -> Option<prometheus::proto::MetricFamily> {
        REGISTRY
            .gather()
            .into_iter()
            .find(|m| m.get_name() == name)
    }

    #[test]
    fn test_metrics_initialization() {
        init_metrics();
        init_metrics();

        let metric_families = REGISTRY.gather();
        assert!(!metric_families.is_empty(), "Metrics should be registered");
    }

    #[test]
    fn test_record_schedule_outcome() {
        init_metrics();

        record_schedule_outcome("normal", "scheduled");
        record_schedule_outcome("large_site", "replaced");

        assert!(find("report_refresh_schedule_outcomes_total").is_some());
    }

    #[test]
    fn test_record_job_execution() {
        init_metrics();

        record_job_execution(
            "subscriptions_by_product",
            "completed",
            Duration::from_millis(120),
        );

        assert!(find("report_refresh_job_executions_total").is_some());
        assert!(find("report_refresh_job_duration_seconds").is_some());
    }

    #[test]
    fn test_large_site_gauge() {
        init_metrics();

        set_large_site(true);
        assert!(find("report_refresh_large_site").is_some());
    }

    #[test]
    fn test_stale_resets_are_labelled_by_action() {
        init_metrics();

        set_stale_resets(2, 1);

        let family = find("report_refresh_queue_stale_resets").unwrap();
        let actions: Vec<_> = family
            .get_metric()
            .iter()
            .flat_map(|m| m.get_label().iter().map(|l| l.get_value().to_string()))
            .collect();
        assert!(actions.contains(&"requeued".to_string()));
        assert!(actions.contains(&"superseded".to_string()));
    }

    #[tokio::test]
    async fn test_metrics_handler_encodes_registry() {
        init_metrics();
        record_event("payment_complete", true);
        set_queue_pending(3);

        let response = metrics_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
