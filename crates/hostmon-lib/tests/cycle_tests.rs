//! Integration tests for the monitoring cycle

use async_trait::async_trait;
use hostmon_lib::analysis::{ChatCompletionClient, OllamaClient, AI_UNAVAILABLE_MARKER};
use hostmon_lib::{
    AlertChannel, Alerter, Analyzer, AnalyzerConfig, CycleConfig, DeliveryError, Frequency,
    FrequencyConfig, HostAlert, HostContext, HostReport, HostScheduleState, HostStateTable,
    LogExcerpt, LogFile, LogSource, ModelClient, ModelError, MonitoringCycle, ReportDelivery,
    ReportScheduler, Severity,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

const HEALTHY: &str = r#"{"health_score":95,"severity":"INFO","anomalies":[],"summary":"ok"}"#;
const FAILING_DISK: &str = r#"{"health_score":20,"severity":"CRITICAL","anomalies":["EXT4-fs error on sda1"],"summary":"Filesystem errors"}"#;

/// Model client that always answers the same way
struct ScriptedModel {
    reply: Result<String, ModelError>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    fn ok(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: Err(ModelError::Unavailable("connection refused".to_string())),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn analyze(&self, _host: &HostContext, _log_excerpt: &str) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone()
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Model client that parks inside `analyze` until the test opens the gate
struct GatedModel {
    entered: Notify,
    gate: Semaphore,
}

impl GatedModel {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            entered: Notify::new(),
            gate: Semaphore::new(0),
        })
    }
}

#[async_trait]
impl ModelClient for GatedModel {
    async fn analyze(&self, _host: &HostContext, _log_excerpt: &str) -> Result<String, ModelError> {
        self.entered.notify_one();
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| ModelError::Unavailable(e.to_string()))?;
        permit.forget();
        Ok(HEALTHY.to_string())
    }

    fn name(&self) -> &str {
        "gated"
    }
}

/// Log source backed by fixed text per host; hosts without an entry fail
struct StaticLogs {
    logs: HashMap<String, String>,
}

impl StaticLogs {
    fn new(entries: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            logs: entries
                .iter()
                .map(|(host, text)| (host.to_string(), text.to_string()))
                .collect(),
        })
    }
}

#[async_trait]
impl LogSource for StaticLogs {
    async fn fetch(&self, host: &HostContext) -> anyhow::Result<LogExcerpt> {
        match self.logs.get(&host.host_id) {
            Some(text) => Ok(LogExcerpt::from_files([LogFile::new(
                "/var/log/syslog",
                text.clone(),
            )])),
            None => anyhow::bail!("ssh: connection timed out"),
        }
    }
}

/// Delivery channel that keeps every report it accepts
#[derive(Default)]
struct RecordingDelivery {
    fail: AtomicBool,
    reports: Mutex<Vec<HostReport>>,
}

impl RecordingDelivery {
    fn delivered(&self) -> Vec<HostReport> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReportDelivery for RecordingDelivery {
    async fn deliver(&self, report: &HostReport) -> Result<(), DeliveryError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DeliveryError::Transport("smtp relay down".to_string()));
        }
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Alert channel that keeps every alert it accepts
#[derive(Default)]
struct RecordingAlerts {
    fail: AtomicBool,
    alerts: Mutex<Vec<HostAlert>>,
}

impl RecordingAlerts {
    fn sent(&self) -> Vec<HostAlert> {
        self.alerts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertChannel for RecordingAlerts {
    async fn send(&self, alert: &HostAlert) -> Result<(), DeliveryError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DeliveryError::Rejected {
                status: 429,
                body: "rate limited".to_string(),
            });
        }
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

struct Harness {
    cycle: MonitoringCycle,
    states: Arc<HostStateTable>,
    delivery: Arc<RecordingDelivery>,
}

fn hosts() -> Vec<HostContext> {
    vec![
        HostContext::new("web-01", "10.0.0.5").with_site("s01"),
        HostContext::new("db-01", "10.0.0.9").with_site("s01"),
        HostContext::new("edge-01", "10.1.0.2"),
    ]
}

fn harness(
    primary: Arc<dyn ModelClient>,
    fallback: Arc<dyn ModelClient>,
    logs: Arc<dyn LogSource>,
    frequencies: FrequencyConfig,
) -> Harness {
    let states = Arc::new(HostStateTable::new());
    let delivery = Arc::new(RecordingDelivery::default());
    let analyzer = Arc::new(Analyzer::new(primary, fallback, AnalyzerConfig::default()));
    let scheduler = Arc::new(ReportScheduler::new(Arc::new(frequencies), delivery.clone()));

    let (cycle, _summaries) = MonitoringCycle::new(
        hosts(),
        states.clone(),
        analyzer,
        scheduler,
        logs,
        CycleConfig {
            max_concurrent_hosts: 2,
            ..Default::default()
        },
    );

    Harness {
        cycle,
        states,
        delivery,
    }
}

fn all_logs() -> Arc<StaticLogs> {
    StaticLogs::new(&[
        ("web-01", "nginx: started"),
        ("db-01", "postgres: checkpoint complete"),
        ("edge-01", "sshd: Accepted publickey"),
    ])
}

#[tokio::test]
async fn test_first_cycle_reports_every_host_then_nothing_due() {
    let h = harness(
        ScriptedModel::ok(HEALTHY),
        ScriptedModel::failing(),
        all_logs(),
        FrequencyConfig::new(Frequency::Daily),
    );

    let first = h.cycle.run_cycle().await;
    assert_eq!(first.hosts, 3);
    assert_eq!(first.analyzed, 3);
    assert_eq!(first.reports_sent, 3);
    assert_eq!(first.degraded, 0);

    let second = h.cycle.run_cycle().await;
    assert_eq!(second.analyzed, 3);
    assert_eq!(second.reports_sent, 0);
    assert_eq!(h.delivery.delivered().len(), 3);

    for state in h.states.snapshot().await {
        assert!(state.last_report_sent.is_some());
    }
}

#[tokio::test]
async fn test_total_model_outage_still_reports() {
    let primary = ScriptedModel::failing();
    let fallback = ScriptedModel::failing();
    let h = harness(
        primary.clone(),
        fallback.clone(),
        all_logs(),
        FrequencyConfig::new(Frequency::Hourly),
    );

    let summary = h.cycle.run_cycle().await;

    assert_eq!(summary.degraded, 3);
    assert_eq!(summary.reports_sent, 3);
    assert_eq!(primary.calls.load(Ordering::SeqCst), 3);
    assert_eq!(fallback.calls.load(Ordering::SeqCst), 3);

    for report in h.delivery.delivered() {
        assert_eq!(report.record.health_score, 80);
        assert_eq!(report.record.severity, Severity::Info);
        assert!(report.record.anomalies.is_empty());
        assert!(report.record.summary.contains(AI_UNAVAILABLE_MARKER));
    }
}

#[tokio::test]
async fn test_log_failure_skips_only_that_host() {
    let logs = StaticLogs::new(&[("web-01", "nginx: started"), ("edge-01", "sshd: ok")]);
    let h = harness(
        ScriptedModel::ok(HEALTHY),
        ScriptedModel::failing(),
        logs,
        FrequencyConfig::new(Frequency::Daily),
    );

    let summary = h.cycle.run_cycle().await;

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.analyzed, 2);
    assert_eq!(summary.reports_sent, 2);

    let db = h.states.get("db-01").unwrap().lock().await.clone();
    assert!(db.last_report_sent.is_none());
}

#[tokio::test]
async fn test_delivery_failure_retries_next_cycle() {
    let h = harness(
        ScriptedModel::ok(HEALTHY),
        ScriptedModel::failing(),
        all_logs(),
        FrequencyConfig::new(Frequency::Weekly),
    );

    h.delivery.fail.store(true, Ordering::SeqCst);
    let failed = h.cycle.run_cycle().await;
    assert_eq!(failed.delivery_failures, 3);
    assert_eq!(failed.reports_sent, 0);
    for state in h.states.snapshot().await {
        assert!(state.last_report_sent.is_none());
    }

    h.delivery.fail.store(false, Ordering::SeqCst);
    let retried = h.cycle.run_cycle().await;
    assert_eq!(retried.reports_sent, 3);
    assert_eq!(retried.delivery_failures, 0);
}

#[tokio::test]
async fn test_config_error_isolated_to_host() {
    // No global default: only the s01 hosts resolve
    let frequencies = FrequencyConfig::default().with_site("s01", Frequency::Daily);
    let h = harness(
        ScriptedModel::ok(HEALTHY),
        ScriptedModel::failing(),
        all_logs(),
        frequencies,
    );

    let summary = h.cycle.run_cycle().await;

    assert_eq!(summary.errors, 1);
    assert_eq!(summary.reports_sent, 2);
    let edge = h.states.get("edge-01").unwrap().lock().await.clone();
    assert!(edge.last_report_sent.is_none());
}

#[tokio::test]
async fn test_existing_state_is_respected() {
    let h = harness(
        ScriptedModel::ok(HEALTHY),
        ScriptedModel::failing(),
        all_logs(),
        FrequencyConfig::new(Frequency::Daily),
    );
    let recent = chrono::Utc::now() - chrono::Duration::hours(2);
    h.states
        .register(
            HostScheduleState::new("web-01")
                .with_site("s01")
                .with_last_report_sent(recent),
        )
        .await;

    let summary = h.cycle.run_cycle().await;

    assert_eq!(summary.reports_sent, 2);
    let web = h.states.get("web-01").unwrap().lock().await.clone();
    assert_eq!(web.last_report_sent, Some(recent));
}

#[tokio::test]
async fn test_http_backends_primary_down_fallback_answers() {
    let mut cloud = mockito::Server::new_async().await;
    let cloud_mock = cloud
        .mock("POST", "/v1/chat/completions")
        .with_status(503)
        .with_body("upstream overloaded")
        .expect(1)
        .create_async()
        .await;

    let mut local = mockito::Server::new_async().await;
    let local_mock = local
        .mock("POST", "/api/generate")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            serde_json::json!({
                "model": "llama3",
                "response": "```json\n{\"health_score\": 72, \"severity\": \"warning\", \"anomalies\": [\"disk 91% full\"], \"summary\": \"Disk pressure\"}\n```",
                "done": true
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let primary = ChatCompletionClient::new(
        &format!("{}/v1", cloud.url()),
        Some("test-key".to_string()),
        "grok-beta",
        Duration::from_secs(5),
    )
    .unwrap();
    let fallback = OllamaClient::new(&local.url(), "llama3", Duration::from_secs(5)).unwrap();

    let states = Arc::new(HostStateTable::new());
    let delivery = Arc::new(RecordingDelivery::default());
    let analyzer = Arc::new(Analyzer::new(
        Arc::new(primary),
        Arc::new(fallback),
        AnalyzerConfig::default(),
    ));
    let scheduler = Arc::new(ReportScheduler::new(
        Arc::new(FrequencyConfig::new(Frequency::Daily)),
        delivery.clone(),
    ));
    let (cycle, _summaries) = MonitoringCycle::new(
        vec![HostContext::new("web-01", "10.0.0.5")],
        states,
        analyzer,
        scheduler,
        StaticLogs::new(&[("web-01", "kernel: EXT4-fs warning")]),
        CycleConfig::default(),
    );

    let summary = cycle.run_cycle().await;

    assert_eq!(summary.reports_sent, 1);
    assert_eq!(summary.degraded, 0);
    let report = &delivery.delivered()[0];
    assert_eq!(report.record.health_score, 72);
    assert_eq!(report.record.severity, Severity::Warn);
    assert_eq!(report.record.anomalies, vec!["disk 91% full".to_string()]);
    assert_eq!(report.frequency, Some(Frequency::Daily));

    cloud_mock.assert_async().await;
    local_mock.assert_async().await;
}

#[tokio::test]
async fn test_schedule_state_unlocked_while_model_runs() {
    let model = GatedModel::new();
    let states = Arc::new(HostStateTable::new());
    states
        .register(HostScheduleState::new("web-01").with_site("s01"))
        .await;
    let delivery = Arc::new(RecordingDelivery::default());
    let analyzer = Arc::new(Analyzer::new(
        model.clone(),
        ScriptedModel::failing(),
        AnalyzerConfig::default(),
    ));
    let scheduler = Arc::new(ReportScheduler::new(
        Arc::new(FrequencyConfig::new(Frequency::Daily)),
        delivery.clone(),
    ));
    let (cycle, _summaries) = MonitoringCycle::new(
        vec![HostContext::new("web-01", "10.0.0.5").with_site("s01")],
        states.clone(),
        analyzer,
        scheduler,
        StaticLogs::new(&[("web-01", "nginx: started")]),
        CycleConfig::default(),
    );
    let cycle = Arc::new(cycle);

    let running = tokio::spawn({
        let cycle = cycle.clone();
        async move { cycle.run_cycle().await }
    });

    tokio::time::timeout(Duration::from_secs(5), model.entered.notified())
        .await
        .expect("model was never called");

    {
        let handle = states.get("web-01").unwrap();
        let guard = handle.try_lock();
        assert!(guard.is_ok(), "schedule state locked during analysis");
    }
    assert!(delivery.delivered().is_empty());

    model.gate.add_permits(1);
    let summary = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("cycle did not finish")
        .unwrap();

    assert_eq!(summary.reports_sent, 1);
    assert_eq!(delivery.delivered().len(), 1);
    let web = states.get("web-01").unwrap().lock().await.clone();
    assert!(web.last_report_sent.is_some());
}

#[tokio::test]
async fn test_critical_record_alerts_even_when_report_not_due() {
    let h = harness(
        ScriptedModel::ok(FAILING_DISK),
        ScriptedModel::failing(),
        all_logs(),
        FrequencyConfig::new(Frequency::Weekly),
    );
    let alerts = Arc::new(RecordingAlerts::default());
    let cycle = h.cycle.with_alerter(Arc::new(Alerter::new(alerts.clone())));

    let recent = chrono::Utc::now() - chrono::Duration::hours(1);
    for host in hosts() {
        let mut state = HostScheduleState::new(host.host_id).with_last_report_sent(recent);
        state.site = host.site;
        h.states.register(state).await;
    }

    let first = cycle.run_cycle().await;

    assert_eq!(first.reports_sent, 0);
    assert_eq!(first.alerts_sent, 3);
    assert!(h.delivery.delivered().is_empty());

    let sent = alerts.sent();
    assert_eq!(sent.len(), 3);
    assert!(sent.iter().all(|a| a.severity == Severity::Critical));
    assert!(sent.iter().all(|a| a.health_score == 20 && a.anomaly_count == 1));

    // Repeats within the dedup window are suppressed
    let second = cycle.run_cycle().await;
    assert_eq!(second.alerts_sent, 0);
    assert_eq!(alerts.sent().len(), 3);
}

#[tokio::test]
async fn test_alert_failure_does_not_block_report() {
    let h = harness(
        ScriptedModel::ok(FAILING_DISK),
        ScriptedModel::failing(),
        all_logs(),
        FrequencyConfig::new(Frequency::Daily),
    );
    let alerts = Arc::new(RecordingAlerts::default());
    alerts.fail.store(true, Ordering::SeqCst);
    let cycle = h.cycle.with_alerter(Arc::new(Alerter::new(alerts.clone())));

    let summary = cycle.run_cycle().await;

    assert_eq!(summary.alert_failures, 3);
    assert_eq!(summary.alerts_sent, 0);
    assert_eq!(summary.reports_sent, 3);

    // Failed alerts are not deduplicated
    alerts.fail.store(false, Ordering::SeqCst);
    let retried = cycle.run_cycle().await;
    assert_eq!(retried.alerts_sent, 3);
}

#[tokio::test]
async fn test_healthy_record_sends_no_alert() {
    let h = harness(
        ScriptedModel::ok(HEALTHY),
        ScriptedModel::failing(),
        all_logs(),
        FrequencyConfig::new(Frequency::Daily),
    );
    let alerts = Arc::new(RecordingAlerts::default());
    let cycle = h.cycle.with_alerter(Arc::new(Alerter::new(alerts.clone())));

    let summary = cycle.run_cycle().await;

    assert_eq!(summary.alerts_sent, 0);
    assert_eq!(summary.alert_failures, 0);
    assert!(alerts.sent().is_empty());
}
