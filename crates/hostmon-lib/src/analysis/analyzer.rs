//! Analysis orchestration
//!
//! Calls the primary model, falls back to the secondary model on failure,
//! and degrades to a fixed assessment when both fail. Callers always get a
//! `HealthRecord`.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::{ModelClient, ModelError, ResponseParser};
use crate::models::{AnalysisOutcome, HealthRecord, HostContext, Severity};
use crate::monitor::LogExcerpt;
use crate::observability::HostmonMetrics;

/// Marker carried in the summary of the fixed fallback assessment
pub const AI_UNAVAILABLE_MARKER: &str = "AI analysis unavailable";

/// Score assumed when no model could analyze the host
const FALLBACK_HEALTH_SCORE: u8 = 80;

/// Default timeout for the primary model. Kept short so the fallback
/// still fits in the same monitoring cycle.
pub const DEFAULT_PRIMARY_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for the fallback model
pub const DEFAULT_FALLBACK_TIMEOUT: Duration = Duration::from_secs(120);

/// Configuration for the analyzer
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Upper bound for a primary model call
    pub primary_timeout: Duration,
    /// Upper bound for a fallback model call
    pub fallback_timeout: Duration,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            primary_timeout: DEFAULT_PRIMARY_TIMEOUT,
            fallback_timeout: DEFAULT_FALLBACK_TIMEOUT,
        }
    }
}

/// Log analyzer with primary and fallback model backends
pub struct Analyzer {
    primary: Arc<dyn ModelClient>,
    fallback: Arc<dyn ModelClient>,
    config: AnalyzerConfig,
    metrics: HostmonMetrics,
}

impl Analyzer {
    /// Create a new analyzer
    pub fn new(
        primary: Arc<dyn ModelClient>,
        fallback: Arc<dyn ModelClient>,
        config: AnalyzerConfig,
    ) -> Self {
        Self {
            primary,
            fallback,
            config,
            metrics: HostmonMetrics::new(),
        }
    }

    /// Analyze a host's log excerpt. Never fails.
    pub async fn analyze_logs(&self, host: &HostContext, log_excerpt: &LogExcerpt) -> HealthRecord {
        self.analyze(host, log_excerpt, None).await
    }

    /// Analyze a host's log excerpt within the owning cycle's deadline.
    ///
    /// Model calls are cut short at the deadline, and once it has passed the
    /// fallback model is not attempted.
    pub async fn analyze_logs_until(
        &self,
        host: &HostContext,
        log_excerpt: &LogExcerpt,
        deadline: Instant,
    ) -> HealthRecord {
        self.analyze(host, log_excerpt, Some(deadline)).await
    }

    async fn analyze(
        &self,
        host: &HostContext,
        log_excerpt: &LogExcerpt,
        deadline: Option<Instant>,
    ) -> HealthRecord {
        let start = Instant::now();

        let record = match self
            .call(&*self.primary, self.config.primary_timeout, deadline, host, log_excerpt.text())
            .await
        {
            Ok(text) => {
                info!(host_id = %host.host_id, backend = %self.primary.name(), "AI analysis completed");
                ResponseParser::parse(&text)
            }
            Err(e) => {
                warn!(
                    host_id = %host.host_id,
                    backend = %self.primary.name(),
                    error = %e,
                    "Primary model failed, trying fallback"
                );
                self.analyze_with_fallback(host, log_excerpt, deadline).await
            }
        };

        self.metrics.observe_analysis_latency(start.elapsed().as_secs_f64());
        self.metrics.inc_analyses(record.outcome);
        record
    }

    async fn analyze_with_fallback(
        &self,
        host: &HostContext,
        log_excerpt: &LogExcerpt,
        deadline: Option<Instant>,
    ) -> HealthRecord {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            warn!(host_id = %host.host_id, "Cycle deadline reached, skipping fallback model");
            return fallback_analysis(host, log_excerpt);
        }

        match self
            .call(&*self.fallback, self.config.fallback_timeout, deadline, host, log_excerpt.text())
            .await
        {
            Ok(text) => {
                info!(host_id = %host.host_id, backend = %self.fallback.name(), "AI analysis completed");
                ResponseParser::parse(&text)
            }
            Err(e) => {
                error!(
                    host_id = %host.host_id,
                    backend = %self.fallback.name(),
                    error = %e,
                    "All models unavailable, using fallback analysis"
                );
                fallback_analysis(host, log_excerpt)
            }
        }
    }

    /// One bounded call to a model client
    async fn call(
        &self,
        client: &dyn ModelClient,
        timeout: Duration,
        deadline: Option<Instant>,
        host: &HostContext,
        log_excerpt: &str,
    ) -> Result<String, ModelError> {
        let timeout = match deadline {
            Some(d) => timeout.min(d.saturating_duration_since(Instant::now())),
            None => timeout,
        };

        debug!(backend = %client.name(), timeout_ms = timeout.as_millis() as u64, "Calling model");
        let result = match tokio::time::timeout(timeout, client.analyze(host, log_excerpt)).await {
            Ok(result) => result,
            Err(_) => Err(ModelError::Unavailable(format!(
                "{}: timed out after {}ms",
                client.name(),
                timeout.as_millis()
            ))),
        };

        if let Err(ref e) = result {
            self.metrics.inc_model_failures(client.name(), e.kind());
        }
        result
    }
}

/// Fixed assessment used when no model could analyze the host.
///
/// Assumes the host is healthy and flags that observability is degraded,
/// so an analysis backend outage alone never raises alerts.
pub fn fallback_analysis(host: &HostContext, log_excerpt: &LogExcerpt) -> HealthRecord {
    HealthRecord {
        health_score: FALLBACK_HEALTH_SCORE,
        severity: Severity::Info,
        anomalies: Vec::new(),
        summary: format!(
            "Logs retrieved successfully from {}. Analyzed {} log files with {} total lines. \
             {} - manual review recommended.",
            host.host_id,
            log_excerpt.file_count(),
            log_excerpt.line_count(),
            AI_UNAVAILABLE_MARKER
        ),
        recommendations: Some(
            "Check logs manually for any issues. AI analysis failed.".to_string(),
        ),
        outcome: AnalysisOutcome::Unavailable,
    }
}
