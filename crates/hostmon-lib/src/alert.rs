//! Immediate alerts for WARN and CRITICAL health records
//!
//! Handles:
//! - Building an abbreviated alert from a health record
//! - Sending it right away, whether or not the host's report is due
//! - Deduplication of alerts per host and severity within a window

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{HealthRecord, HostContext, Severity};
use crate::observability::HostmonMetrics;
use crate::schedule::{DeliveryError, WebhookDelivery};

/// Default deduplication window (15 minutes)
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Longest summary carried in an alert, in characters
const MAX_ALERT_SUMMARY_CHARS: usize = 200;

/// Delivery priority of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertPriority {
    High,
    Emergency,
}

/// Abbreviated notice about one host in trouble
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostAlert {
    pub host_id: String,
    pub hostname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    pub severity: Severity,
    pub priority: AlertPriority,
    pub title: String,
    pub health_score: u8,
    pub anomaly_count: usize,
    pub summary: String,
    pub generated_at: DateTime<Utc>,
}

impl HostAlert {
    /// Build an alert for a WARN or CRITICAL record; other severities give `None`
    pub fn from_record(
        host: &HostContext,
        record: &HealthRecord,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        if !record.severity.is_actionable() {
            return None;
        }
        let priority = match record.severity {
            Severity::Critical => AlertPriority::Emergency,
            _ => AlertPriority::High,
        };

        Some(Self {
            host_id: host.host_id.clone(),
            hostname: host.hostname.clone(),
            site: host.site.clone(),
            severity: record.severity,
            priority,
            title: format!("{}: {}", record.severity, host.host_id),
            health_score: record.health_score,
            anomaly_count: record.anomalies.len(),
            summary: abbreviate(&record.summary),
            generated_at: now,
        })
    }
}

fn abbreviate(summary: &str) -> String {
    if summary.chars().count() <= MAX_ALERT_SUMMARY_CHARS {
        return summary.to_string();
    }
    let mut short: String = summary.chars().take(MAX_ALERT_SUMMARY_CHARS - 3).collect();
    short.push_str("...");
    short
}

/// Trait for alert channels
#[async_trait]
pub trait AlertChannel: Send + Sync {
    /// Send one alert
    async fn send(&self, alert: &HostAlert) -> Result<(), DeliveryError>;

    /// Channel name used in logs
    fn name(&self) -> &str;
}

#[async_trait]
impl AlertChannel for WebhookDelivery {
    async fn send(&self, alert: &HostAlert) -> Result<(), DeliveryError> {
        debug!(host_id = %alert.host_id, severity = %alert.severity, "Posting host alert");
        self.post_json(alert).await
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

/// What happened to a record handed to the alerter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertDecision {
    /// INFO or UNKNOWN severity
    NotActionable,
    /// Same host and severity alerted within the dedup window
    Suppressed,
    Sent(Severity),
    Failed(DeliveryError),
}

/// Alert emitter with deduplication
pub struct Alerter {
    channel: Arc<dyn AlertChannel>,
    dedup_window: Duration,
    /// (host id, severity) -> last successful send
    recent: DashMap<(String, Severity), Instant>,
    metrics: HostmonMetrics,
}

impl Alerter {
    /// Create a new alerter with the default 15-minute deduplication window
    pub fn new(channel: Arc<dyn AlertChannel>) -> Self {
        Self {
            channel,
            dedup_window: DEFAULT_DEDUP_WINDOW,
            recent: DashMap::new(),
            metrics: HostmonMetrics::new(),
        }
    }

    /// Set custom deduplication window
    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }

    pub fn channel_name(&self) -> &str {
        self.channel.name()
    }

    /// Alert on an actionable record unless a matching alert went out recently.
    ///
    /// Failed sends are not remembered, so the next cycle tries again.
    pub async fn notify(&self, host: &HostContext, record: &HealthRecord) -> AlertDecision {
        let Some(alert) = HostAlert::from_record(host, record, Utc::now()) else {
            return AlertDecision::NotActionable;
        };

        let key = (alert.host_id.clone(), alert.severity);
        if self.should_suppress(&key) {
            return AlertDecision::Suppressed;
        }

        match self.channel.send(&alert).await {
            Ok(()) => {
                self.recent.insert(key, Instant::now());
                self.recent
                    .retain(|_, sent| sent.elapsed() < self.dedup_window);
                self.metrics.inc_alerts_sent(alert.severity);
                AlertDecision::Sent(alert.severity)
            }
            Err(e) => {
                self.metrics.inc_alert_failures();
                AlertDecision::Failed(e)
            }
        }
    }

    fn should_suppress(&self, key: &(String, Severity)) -> bool {
        self.recent
            .get(key)
            .map(|sent| sent.elapsed() < self.dedup_window)
            .unwrap_or(false)
    }
}
