//! Monitoring cycle
//!
//! Runs one analysis pass over every host, alerts right away on WARN and
//! CRITICAL records, then hands the health records to the report scheduler.
//! Hosts are processed concurrently up to a fixed limit and share one
//! deadline per cycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{interval, Instant};
use tracing::{debug, error, info, warn};

use super::LogSource;
use crate::alert::{AlertDecision, Alerter};
use crate::analysis::Analyzer;
use crate::models::{HealthRecord, HostContext, HostScheduleState};
use crate::observability::{HostmonMetrics, StructuredLogger};
use crate::schedule::{FrequencyResolver, HostStateTable, ReportDecision, ReportScheduler};

/// Default time between monitoring cycles
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Default upper bound for a whole cycle
pub const DEFAULT_CYCLE_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Default number of hosts processed at once
pub const DEFAULT_MAX_CONCURRENT_HOSTS: usize = 5;

/// Upper bound for hosts processed at once
pub const MAX_CONCURRENT_HOSTS: usize = 256;

/// Configuration for the monitoring cycle
#[derive(Debug, Clone)]
pub struct CycleConfig {
    /// Time between cycles
    pub interval: Duration,
    /// Deadline for one cycle, measured from its start
    pub cycle_timeout: Duration,
    /// Hosts processed concurrently
    pub max_concurrent_hosts: usize,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_MONITOR_INTERVAL,
            cycle_timeout: DEFAULT_CYCLE_TIMEOUT,
            max_concurrent_hosts: DEFAULT_MAX_CONCURRENT_HOSTS,
        }
    }
}

/// Counts from one monitoring cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub hosts: usize,
    pub analyzed: usize,
    pub degraded: usize,
    pub reports_sent: usize,
    pub delivery_failures: usize,
    pub alerts_sent: usize,
    pub alert_failures: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl CycleSummary {
    fn record(&mut self, outcome: HostOutcome) {
        match outcome {
            HostOutcome::Skipped => self.skipped += 1,
            HostOutcome::Analyzed {
                degraded,
                alert,
                decision,
            } => {
                self.analyzed += 1;
                if degraded {
                    self.degraded += 1;
                }
                match alert {
                    Some(AlertDecision::Sent(_)) => self.alerts_sent += 1,
                    Some(AlertDecision::Failed(_)) => self.alert_failures += 1,
                    _ => {}
                }
                match decision {
                    Ok(ReportDecision::Delivered) => self.reports_sent += 1,
                    Ok(ReportDecision::DeliveryFailed(_)) => self.delivery_failures += 1,
                    Ok(ReportDecision::NotDue) => {}
                    Err(()) => self.errors += 1,
                }
            }
        }
    }
}

/// What happened to one host in a cycle
enum HostOutcome {
    Skipped,
    Analyzed {
        degraded: bool,
        /// `None` when no alerter is configured or the record is not actionable
        alert: Option<AlertDecision>,
        /// `Err` marks a scheduling config defect, already logged
        decision: Result<ReportDecision, ()>,
    },
}

/// Periodic monitoring over a fixed set of hosts
pub struct MonitoringCycle {
    hosts: Vec<HostContext>,
    worker: HostWorker,
    config: CycleConfig,
    metrics: HostmonMetrics,
    summary_tx: mpsc::Sender<CycleSummary>,
}

/// Per-host processing, cloned into each host task
#[derive(Clone)]
struct HostWorker {
    states: Arc<HostStateTable>,
    analyzer: Arc<Analyzer>,
    scheduler: Arc<ReportScheduler>,
    logs: Arc<dyn LogSource>,
    alerter: Option<Arc<Alerter>>,
    baselines: Arc<DashMap<String, String>>,
    logger: StructuredLogger,
}

impl MonitoringCycle {
    /// Create a new monitoring cycle.
    ///
    /// The returned receiver gets a summary after every cycle run by
    /// [`MonitoringCycle::run`]. Summaries are dropped if it falls behind.
    pub fn new(
        hosts: Vec<HostContext>,
        states: Arc<HostStateTable>,
        analyzer: Arc<Analyzer>,
        scheduler: Arc<ReportScheduler>,
        logs: Arc<dyn LogSource>,
        config: CycleConfig,
    ) -> (Self, mpsc::Receiver<CycleSummary>) {
        let (summary_tx, summary_rx) = mpsc::channel(16);

        let cycle = Self {
            hosts,
            worker: HostWorker {
                states,
                analyzer,
                scheduler,
                logs,
                alerter: None,
                baselines: Arc::new(DashMap::new()),
                logger: StructuredLogger::new("hostmon"),
            },
            config,
            metrics: HostmonMetrics::new(),
            summary_tx,
        };

        (cycle, summary_rx)
    }

    /// Use a different instance name in structured logs
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.worker.logger = StructuredLogger::new(instance);
        self
    }

    /// Send immediate alerts for WARN and CRITICAL records
    pub fn with_alerter(mut self, alerter: Arc<Alerter>) -> Self {
        self.worker.alerter = Some(alerter);
        self
    }

    pub fn hosts(&self) -> &[HostContext] {
        &self.hosts
    }

    /// Run cycles every `interval` until shutdown
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            hosts = self.hosts.len(),
            "Starting monitoring loop"
        );

        let mut ticker = interval(self.config.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let summary = self.run_cycle().await;
                    if let Err(e) = self.summary_tx.try_send(summary) {
                        debug!(error = %e, "Cycle summary not delivered");
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down monitoring loop");
                    break;
                }
            }
        }
    }

    /// Run one cycle over all hosts
    pub async fn run_cycle(&self) -> CycleSummary {
        let start = Instant::now();
        let deadline = start + self.config.cycle_timeout;
        let permits = self
            .config
            .max_concurrent_hosts
            .clamp(1, MAX_CONCURRENT_HOSTS);
        let semaphore = Arc::new(Semaphore::new(permits));

        let mut summary = CycleSummary {
            hosts: self.hosts.len(),
            ..Default::default()
        };

        let mut tasks = JoinSet::new();
        for host in &self.hosts {
            let worker = self.worker.clone();
            let host = host.clone();
            let semaphore = semaphore.clone();

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return HostOutcome::Skipped;
                };
                worker.process(host, deadline).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => summary.record(outcome),
                Err(e) => {
                    error!(error = %e, "Host task failed");
                    summary.errors += 1;
                }
            }
        }

        let elapsed = start.elapsed().as_secs_f64();
        self.metrics.set_hosts_monitored(summary.hosts as i64);
        self.metrics.observe_cycle_duration(elapsed);
        self.worker.logger.log_cycle_completed(
            summary.hosts,
            summary.reports_sent,
            summary.degraded,
            elapsed,
        );

        summary
    }
}

impl HostWorker {
    async fn process(&self, mut host: HostContext, deadline: Instant) -> HostOutcome {
        let handle = match self.states.get(&host.host_id) {
            Some(handle) => handle,
            None => {
                let mut state = HostScheduleState::new(host.host_id.clone());
                state.site = host.site.clone();
                self.states.register(state).await;
                match self.states.get(&host.host_id) {
                    Some(handle) => handle,
                    None => return HostOutcome::Skipped,
                }
            }
        };

        let excerpt = match tokio::time::timeout_at(deadline, self.logs.fetch(&host)).await {
            Ok(Ok(excerpt)) => excerpt,
            Ok(Err(e)) => {
                warn!(host_id = %host.host_id, error = %e, "Log retrieval failed, skipping host");
                return HostOutcome::Skipped;
            }
            Err(_) => {
                warn!(host_id = %host.host_id, "Cycle deadline reached during log retrieval, skipping host");
                return HostOutcome::Skipped;
            }
        };

        debug!(
            host_id = %host.host_id,
            files = excerpt.file_count(),
            lines = excerpt.line_count(),
            truncated = excerpt.is_truncated(),
            "Retrieved logs"
        );

        host.baseline_hash = self.baselines.get(&host.host_id).map(|r| r.value().clone());

        // No schedule lock is held while the models run
        let record = self
            .analyzer
            .analyze_logs_until(&host, &excerpt, deadline)
            .await;
        self.baselines
            .insert(host.host_id.clone(), excerpt.content_hash());
        self.logger.log_analysis(&host.host_id, &record);

        let alert = match &self.alerter {
            Some(alerter) if record.severity.is_actionable() => {
                Some(self.alert(alerter, &host, &record).await)
            }
            _ => None,
        };

        let mut state = handle.lock().await;
        let decision = match self
            .scheduler
            .dispatch_if_due(&mut state, Utc::now(), &record)
            .await
        {
            Ok(decision) => {
                match &decision {
                    ReportDecision::NotDue => self.logger.log_report_not_due(&host.host_id),
                    ReportDecision::Delivered => {
                        let frequency =
                            FrequencyResolver::resolve(&state, self.scheduler.frequencies())
                                .map(|f| f.to_string())
                                .unwrap_or_default();
                        self.logger.log_report_dispatched(&host.host_id, &frequency);
                    }
                    ReportDecision::DeliveryFailed(e) => {
                        self.logger.log_delivery_failed(&host.host_id, &e.to_string())
                    }
                }
                Ok(decision)
            }
            Err(e) => {
                self.logger.log_schedule_error(&host.host_id, &e.to_string());
                Err(())
            }
        };

        HostOutcome::Analyzed {
            degraded: !record.is_parsed(),
            alert,
            decision,
        }
    }

    /// Alert on a record regardless of whether a report is due
    async fn alert(
        &self,
        alerter: &Alerter,
        host: &HostContext,
        record: &HealthRecord,
    ) -> AlertDecision {
        let decision = alerter.notify(host, record).await;
        match &decision {
            AlertDecision::Sent(severity) => {
                self.logger
                    .log_alert_sent(&host.host_id, *severity, alerter.channel_name())
            }
            AlertDecision::Suppressed => self.logger.log_alert_suppressed(&host.host_id),
            AlertDecision::Failed(e) => {
                self.logger.log_alert_failed(&host.host_id, &e.to_string())
            }
            AlertDecision::NotActionable => {}
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;

    #[test]
    fn test_summary_counts() {
        let mut summary = CycleSummary::default();
        summary.record(HostOutcome::Skipped);
        summary.record(HostOutcome::Analyzed {
            degraded: true,
            alert: None,
            decision: Ok(ReportDecision::Delivered),
        });
        summary.record(HostOutcome::Analyzed {
            degraded: false,
            alert: Some(AlertDecision::Sent(Severity::Critical)),
            decision: Ok(ReportDecision::NotDue),
        });
        summary.record(HostOutcome::Analyzed {
            degraded: false,
            alert: Some(AlertDecision::Suppressed),
            decision: Err(()),
        });

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.analyzed, 3);
        assert_eq!(summary.degraded, 1);
        assert_eq!(summary.reports_sent, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.alerts_sent, 1);
        assert_eq!(summary.alert_failures, 0);
    }

    #[test]
    fn test_default_config() {
        let config = CycleConfig::default();
        assert_eq!(config.max_concurrent_hosts, 5);
        assert!(config.cycle_timeout < config.interval);
        assert!(config.max_concurrent_hosts <= MAX_CONCURRENT_HOSTS);
    }
}
