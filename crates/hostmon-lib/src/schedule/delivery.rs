//! Report delivery
//!
//! Hands due host reports to an outside channel. The scheduler only cares
//! whether delivery succeeded.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::Frequency;
use crate::models::HealthRecord;

/// A host report ready for delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostReport {
    pub host_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<Frequency>,
    pub record: HealthRecord,
}

/// Delivery failure for a report or alert. Reports stay due and are retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("delivery failed: {0}")]
    Transport(String),

    #[error("delivery rejected ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Trait for report delivery channels
#[async_trait]
pub trait ReportDelivery: Send + Sync {
    /// Deliver one report
    async fn deliver(&self, report: &HostReport) -> Result<(), DeliveryError>;

    /// Channel name used in logs
    fn name(&self) -> &str;
}

/// Delivers reports as JSON to an HTTP webhook
pub struct WebhookDelivery {
    client: Client,
    url: Url,
}

impl WebhookDelivery {
    /// Create a new webhook delivery channel
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let url = Url::parse(url).context("Invalid webhook URL")?;

        Ok(Self { client, url })
    }

    /// POST a JSON body, mapping transport errors and non-2xx replies
    pub(crate) async fn post_json<T: Serialize + ?Sized>(
        &self,
        body: &T,
    ) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl ReportDelivery for WebhookDelivery {
    async fn deliver(&self, report: &HostReport) -> Result<(), DeliveryError> {
        debug!(host_id = %report.host_id, url = %self.url, "Posting host report");
        self.post_json(report).await
    }

    fn name(&self) -> &str {
        "webhook"
    }
}
