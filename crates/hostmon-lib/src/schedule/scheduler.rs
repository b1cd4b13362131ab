//! Report scheduling
//!
//! Decides per host whether a report is due and dispatches it. A host's
//! state is implicit in its data:
//! - never reported (`last_report_sent` is `None`): always due
//! - reported and current: less than one interval since the last send
//! - reported and due: at least one interval since the last send

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::{ConfigError, DeliveryError, FrequencyConfig, FrequencyResolver, HostReport, ReportDelivery};
use crate::models::{HealthRecord, HostScheduleState};
use crate::observability::HostmonMetrics;

/// Result of a combined due check and dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportDecision {
    /// Report not due yet; nothing was sent
    NotDue,
    /// Report delivered and the timestamp advanced
    Delivered,
    /// Delivery failed; the timestamp was left unchanged
    DeliveryFailed(DeliveryError),
}

/// Per-host report scheduler
pub struct ReportScheduler {
    frequencies: Arc<FrequencyConfig>,
    delivery: Arc<dyn ReportDelivery>,
    metrics: HostmonMetrics,
}

impl ReportScheduler {
    /// Create a new report scheduler
    pub fn new(frequencies: Arc<FrequencyConfig>, delivery: Arc<dyn ReportDelivery>) -> Self {
        Self {
            frequencies,
            delivery,
            metrics: HostmonMetrics::new(),
        }
    }

    /// Frequency config in use
    pub fn frequencies(&self) -> &FrequencyConfig {
        &self.frequencies
    }

    /// Check whether a host's report is due at `now`.
    ///
    /// Reads only; repeated calls without a dispatch give the same answer.
    /// The boundary is inclusive: exactly one interval after the last send
    /// is due.
    pub fn is_due(&self, host: &HostScheduleState, now: DateTime<Utc>) -> Result<bool, ConfigError> {
        let frequency = FrequencyResolver::resolve(host, &self.frequencies)?;

        let due = match host.last_report_sent {
            None => true,
            Some(last) => now.signed_duration_since(last) >= frequency.interval(),
        };

        debug!(
            host_id = %host.host_id,
            frequency = %frequency,
            last_sent = ?host.last_report_sent,
            due = due,
            "Checked report schedule"
        );
        Ok(due)
    }

    /// Deliver a report and, on success, record `now` as the last send.
    ///
    /// On failure `last_report_sent` is left untouched so the report stays
    /// due for the next check.
    pub async fn dispatch(
        &self,
        host: &mut HostScheduleState,
        now: DateTime<Utc>,
        record: &HealthRecord,
    ) -> Result<(), DeliveryError> {
        let report = HostReport {
            host_id: host.host_id.clone(),
            site: host.site.clone(),
            generated_at: now,
            frequency: FrequencyResolver::resolve(host, &self.frequencies).ok(),
            record: record.clone(),
        };

        match self.delivery.deliver(&report).await {
            Ok(()) => {
                host.last_report_sent = Some(now);
                self.metrics.inc_reports_dispatched();
                info!(host_id = %host.host_id, channel = %self.delivery.name(), "Host report delivered");
                Ok(())
            }
            Err(e) => {
                self.metrics.inc_delivery_failures();
                warn!(
                    host_id = %host.host_id,
                    channel = %self.delivery.name(),
                    error = %e,
                    "Host report delivery failed"
                );
                Err(e)
            }
        }
    }

    /// Dispatch a report only if it is due.
    ///
    /// Delivery failure is an expected outcome here and is returned as a
    /// decision; only configuration defects are errors.
    pub async fn dispatch_if_due(
        &self,
        host: &mut HostScheduleState,
        now: DateTime<Utc>,
        record: &HealthRecord,
    ) -> Result<ReportDecision, ConfigError> {
        if !self.is_due(host, now)? {
            return Ok(ReportDecision::NotDue);
        }

        Ok(match self.dispatch(host, now, record).await {
            Ok(()) => ReportDecision::Delivered,
            Err(e) => ReportDecision::DeliveryFailed(e),
        })
    }
}
