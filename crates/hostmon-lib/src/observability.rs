//! Observability infrastructure for host monitoring
//!
//! Provides:
//! - Prometheus metrics (analysis latency and outcomes, model failures,
//!   report dispatch, alerts, cycle duration)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

use crate::models::{AnalysisOutcome, HealthRecord, Severity};

/// Histogram buckets for model call latency (in seconds)
const ANALYSIS_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Histogram buckets for whole monitoring cycles (in seconds)
const CYCLE_BUCKETS: &[f64] = &[1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<HostmonMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct HostmonMetricsInner {
    analysis_latency_seconds: Histogram,
    analyses_total: IntCounterVec,
    model_failures_total: IntCounterVec,
    reports_dispatched_total: IntCounter,
    delivery_failures_total: IntCounter,
    alerts_sent_total: IntCounterVec,
    alert_failures_total: IntCounter,
    hosts_monitored: IntGauge,
    cycle_duration_seconds: Histogram,
}

impl HostmonMetricsInner {
    fn new() -> Self {
        Self {
            analysis_latency_seconds: register_histogram!(
                "hostmon_analysis_latency_seconds",
                "Time spent producing a health record for one host",
                ANALYSIS_BUCKETS.to_vec()
            )
            .expect("Failed to register analysis_latency_seconds"),

            analyses_total: register_int_counter_vec!(
                "hostmon_analyses_total",
                "Health records produced, by analysis outcome",
                &["outcome"]
            )
            .expect("Failed to register analyses_total"),

            model_failures_total: register_int_counter_vec!(
                "hostmon_model_failures_total",
                "Failed model calls, by backend and failure kind",
                &["backend", "kind"]
            )
            .expect("Failed to register model_failures_total"),

            reports_dispatched_total: register_int_counter!(
                "hostmon_reports_dispatched_total",
                "Host reports handed to delivery successfully"
            )
            .expect("Failed to register reports_dispatched_total"),

            delivery_failures_total: register_int_counter!(
                "hostmon_delivery_failures_total",
                "Host reports whose delivery failed"
            )
            .expect("Failed to register delivery_failures_total"),

            alerts_sent_total: register_int_counter_vec!(
                "hostmon_alerts_sent_total",
                "Immediate alerts sent, by severity",
                &["severity"]
            )
            .expect("Failed to register alerts_sent_total"),

            alert_failures_total: register_int_counter!(
                "hostmon_alert_failures_total",
                "Immediate alerts whose delivery failed"
            )
            .expect("Failed to register alert_failures_total"),

            hosts_monitored: register_int_gauge!(
                "hostmon_hosts_monitored",
                "Number of hosts in the last monitoring cycle"
            )
            .expect("Failed to register hosts_monitored"),

            cycle_duration_seconds: register_histogram!(
                "hostmon_cycle_duration_seconds",
                "Wall time of a full monitoring cycle",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_duration_seconds"),
        }
    }
}

/// Metrics handle for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct HostmonMetrics {
    _private: (),
}

impl Default for HostmonMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl HostmonMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(HostmonMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &HostmonMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_analysis_latency(&self, duration_secs: f64) {
        self.inner().analysis_latency_seconds.observe(duration_secs);
    }

    pub fn inc_analyses(&self, outcome: AnalysisOutcome) {
        self.inner()
            .analyses_total
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    pub fn inc_model_failures(&self, backend: &str, kind: &str) {
        self.inner()
            .model_failures_total
            .with_label_values(&[backend, kind])
            .inc();
    }

    pub fn inc_reports_dispatched(&self) {
        self.inner().reports_dispatched_total.inc();
    }

    pub fn inc_delivery_failures(&self) {
        self.inner().delivery_failures_total.inc();
    }

    pub fn inc_alerts_sent(&self, severity: Severity) {
        self.inner()
            .alerts_sent_total
            .with_label_values(&[&severity.to_string()])
            .inc();
    }

    pub fn inc_alert_failures(&self) {
        self.inner().alert_failures_total.inc();
    }

    pub fn set_hosts_monitored(&self, count: i64) {
        self.inner().hosts_monitored.set(count);
    }

    pub fn observe_cycle_duration(&self, duration_secs: f64) {
        self.inner().cycle_duration_seconds.observe(duration_secs);
    }

    /// Render all registered metrics in the Prometheus text format
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&prometheus::gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Structured logger for monitoring events
///
/// Provides consistent JSON-formatted logging for analyses, report
/// dispatch and other significant events.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log a finished analysis, at warn level when it was degraded
    pub fn log_analysis(&self, host_id: &str, record: &HealthRecord) {
        if record.is_parsed() {
            info!(
                event = "analysis_completed",
                instance = %self.instance,
                host_id = %host_id,
                health_score = record.health_score,
                severity = %record.severity,
                anomalies = record.anomalies.len(),
                "Host analysis completed"
            );
        } else {
            warn!(
                event = "analysis_degraded",
                instance = %self.instance,
                host_id = %host_id,
                outcome = %record.outcome.as_str(),
                health_score = record.health_score,
                severity = %record.severity,
                "Host analysis degraded"
            );
        }
    }

    pub fn log_report_dispatched(&self, host_id: &str, frequency: &str) {
        info!(
            event = "report_dispatched",
            instance = %self.instance,
            host_id = %host_id,
            frequency = %frequency,
            "Host report sent"
        );
    }

    pub fn log_report_not_due(&self, host_id: &str) {
        info!(
            event = "report_not_due",
            instance = %self.instance,
            host_id = %host_id,
            "Skipping report - not due yet"
        );
    }

    pub fn log_delivery_failed(&self, host_id: &str, error: &str) {
        warn!(
            event = "report_delivery_failed",
            instance = %self.instance,
            host_id = %host_id,
            error = %error,
            "Host report delivery failed, will retry next cycle"
        );
    }

    pub fn log_alert_sent(&self, host_id: &str, severity: Severity, channel: &str) {
        warn!(
            event = "alert_sent",
            instance = %self.instance,
            host_id = %host_id,
            severity = %severity,
            channel = %channel,
            "Host alert sent"
        );
    }

    pub fn log_alert_suppressed(&self, host_id: &str) {
        info!(
            event = "alert_suppressed",
            instance = %self.instance,
            host_id = %host_id,
            "Skipping alert - already sent within dedup window"
        );
    }

    pub fn log_alert_failed(&self, host_id: &str, error: &str) {
        error!(
            event = "alert_failed",
            instance = %self.instance,
            host_id = %host_id,
            error = %error,
            "Host alert delivery failed"
        );
    }

    pub fn log_schedule_error(&self, host_id: &str, error: &str) {
        error!(
            event = "schedule_config_error",
            instance = %self.instance,
            host_id = %host_id,
            error = %error,
            "Cannot decide report schedule for host"
        );
    }

    pub fn log_cycle_completed(
        &self,
        hosts: usize,
        reports_sent: usize,
        degraded: usize,
        elapsed_secs: f64,
    ) {
        info!(
            event = "cycle_completed",
            instance = %self.instance,
            hosts = hosts,
            reports_sent = reports_sent,
            degraded = degraded,
            elapsed_secs = elapsed_secs,
            "Monitoring cycle completed"
        );
    }

    pub fn log_startup(&self, version: &str, hosts: usize) {
        info!(
            event = "daemon_started",
            instance = %self.instance,
            version = %version,
            hosts = hosts,
            "Host monitor started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "daemon_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Host monitor shutting down"
        );
    }
}
