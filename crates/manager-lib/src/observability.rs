//! Observability for the scaling daemon
//!
//! Provides:
//! - Prometheus metrics (sweep count and latency, scale actions, query misses)
//! - Structured event logging with tracing

use crate::autoscaler::{Direction, OrchestrationMode};
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info};

/// Sweep duration buckets in seconds; a sweep shells out once per service
const SWEEP_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

static GLOBAL_METRICS: OnceLock<ScalerMetricsInner> = OnceLock::new();

struct ScalerMetricsInner {
    sweeps_total: IntCounter,
    sweep_duration_seconds: Histogram,
    scale_actions_total: IntCounterVec,
    metric_query_misses_total: IntCounter,
    scale_failures_total: IntCounter,
    scalable_services: IntGauge,
}

impl ScalerMetricsInner {
    fn new() -> Self {
        Self {
            sweeps_total: register_int_counter!(
                "tsm_autoscaler_sweeps_total",
                "Number of completed autoscaler sweeps"
            )
            .expect("Failed to register sweeps_total"),

            sweep_duration_seconds: register_histogram!(
                "tsm_autoscaler_sweep_duration_seconds",
                "Time spent in one autoscaler sweep",
                SWEEP_BUCKETS.to_vec()
            )
            .expect("Failed to register sweep_duration_seconds"),

            scale_actions_total: register_int_counter_vec!(
                "tsm_autoscaler_scale_actions_total",
                "Scale actions by direction and mode",
                &["direction", "mode"]
            )
            .expect("Failed to register scale_actions_total"),

            metric_query_misses_total: register_int_counter!(
                "tsm_autoscaler_metric_query_misses_total",
                "Services skipped because no metric was available"
            )
            .expect("Failed to register metric_query_misses_total"),

            scale_failures_total: register_int_counter!(
                "tsm_autoscaler_scale_failures_total",
                "Scale commands that failed"
            )
            .expect("Failed to register scale_failures_total"),

            scalable_services: register_int_gauge!(
                "tsm_autoscaler_scalable_services",
                "Services with scaling enabled in the latest sweep"
            )
            .expect("Failed to register scalable_services"),
        }
    }
}

/// Handle to the process-wide scaler metrics
#[derive(Clone)]
pub struct ScalerMetrics {
    _private: (),
}

impl Default for ScalerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ScalerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ScalerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ScalerMetricsInner {
        GLOBAL_METRICS.get_or_init(ScalerMetricsInner::new)
    }

    pub fn observe_sweep(&self, duration_secs: f64, scalable: usize) {
        let inner = self.inner();
        inner.sweeps_total.inc();
        inner.sweep_duration_seconds.observe(duration_secs);
        inner.scalable_services.set(scalable as i64);
    }

    /// Count a scale action; `executed` is false for dry runs
    pub fn inc_scale_action(&self, direction: Direction, executed: bool) {
        let mode = if executed { "executed" } else { "dry_run" };
        let direction = direction.to_string();
        self.inner()
            .scale_actions_total
            .with_label_values(&[direction.as_str(), mode])
            .inc();
    }

    pub fn inc_metric_miss(&self) {
        self.inner().metric_query_misses_total.inc();
    }

    pub fn inc_scale_failure(&self) {
        self.inner().scale_failures_total.inc();
    }
}

/// Structured logger for scaling events
#[derive(Clone)]
pub struct StructuredLogger {
    host: String,
}

impl StructuredLogger {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    pub fn log_startup(&self, version: &str, mode: OrchestrationMode, dry_run: bool) {
        info!(
            event = "scaler_started",
            host = %self.host,
            version = %version,
            mode = %mode,
            dry_run = dry_run,
            "Service scaler started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "scaler_shutdown",
            host = %self.host,
            reason = %reason,
            "Service scaler shutting down"
        );
    }

    pub fn log_scale_action(
        &self,
        service: &str,
        from: u32,
        to: u32,
        direction: Direction,
        metric: f64,
        mode: OrchestrationMode,
    ) {
        info!(
            event = "scale_action",
            host = %self.host,
            service = %service,
            from = from,
            to = to,
            direction = %direction,
            metric = metric,
            mode = %mode,
            "Scaling {} to {} replicas",
            service,
            to
        );
    }

    pub fn log_dry_run(
        &self,
        service: &str,
        from: u32,
        to: u32,
        direction: Direction,
        metric: f64,
    ) {
        info!(
            event = "scale_dry_run",
            host = %self.host,
            service = %service,
            from = from,
            to = to,
            direction = %direction,
            metric = metric,
            "[Dry Run] Would scale {} to {} replicas",
            service,
            to
        );
    }

    pub fn log_scale_failure(&self, service: &str, to: u32, error: &str) {
        error!(
            event = "scale_failed",
            host = %self.host,
            service = %service,
            to = to,
            error = %error,
            "Failed to scale service"
        );
    }

    pub fn log_sweep(&self, summary: &crate::autoscaler::SweepSummary, elapsed_ms: u128) {
        info!(
            event = "sweep_complete",
            host = %self.host,
            scalable = summary.scalable,
            scaled = summary.scaled,
            dry_run = summary.dry_run,
            unchanged = summary.unchanged,
            skipped = summary.skipped,
            failed = summary.failed,
            elapsed_ms = elapsed_ms as u64,
            "Autoscaler sweep complete"
        );
    }
}
