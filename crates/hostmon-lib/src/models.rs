//! Core data models for host monitoring

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schedule::Frequency;

/// Score used when a model gave no usable score
pub const NEUTRAL_HEALTH_SCORE: u8 = 50;

/// Upper bound of the health score scale
pub const MAX_HEALTH_SCORE: u8 = 100;

/// Severity of a host assessment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warn,
    Critical,
    Unknown,
}

impl Severity {
    /// Map a free-form severity label onto the fixed set.
    ///
    /// Matching ignores case and surrounding whitespace; anything that is not
    /// a recognized label becomes `Unknown`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "info" => Severity::Info,
            "warn" | "warning" => Severity::Warn,
            "critical" => Severity::Critical,
            _ => Severity::Unknown,
        }
    }

    /// Returns true for severities that warrant operator attention
    pub fn is_actionable(&self) -> bool {
        matches!(self, Severity::Warn | Severity::Critical)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warn => write!(f, "WARN"),
            Severity::Critical => write!(f, "CRITICAL"),
            Severity::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// How a health record came to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisOutcome {
    /// A model answered and its answer decoded
    Parsed,
    /// A model answered but the answer could not be decoded
    ParseDegraded,
    /// No model answered; the fixed fallback assessment was used
    Unavailable,
}

impl AnalysisOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisOutcome::Parsed => "parsed",
            AnalysisOutcome::ParseDegraded => "parse_degraded",
            AnalysisOutcome::Unavailable => "unavailable",
        }
    }
}

/// Structured assessment of a host's state
///
/// Every field is always populated. Producers fill gaps with defaults
/// rather than leaving them out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub health_score: u8,
    pub severity: Severity,
    pub anomalies: Vec<String>,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<String>,
    pub outcome: AnalysisOutcome,
}

impl HealthRecord {
    /// Returns true if the record came from a model answer that decoded
    pub fn is_parsed(&self) -> bool {
        self.outcome == AnalysisOutcome::Parsed
    }
}

/// Host identity and metadata handed to the analyzer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostContext {
    pub host_id: String,
    pub hostname: String,
    pub site: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Content hash of the previous run's logs, if any
    pub baseline_hash: Option<String>,
}

impl HostContext {
    pub fn new(host_id: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            host_id: host_id.into(),
            hostname: hostname.into(),
            ..Default::default()
        }
    }

    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.site = Some(site.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// Per-host report schedule state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostScheduleState {
    pub host_id: String,
    pub site: Option<String>,
    pub frequency_override: Option<Frequency>,
    pub last_report_sent: Option<DateTime<Utc>>,
}

impl HostScheduleState {
    pub fn new(host_id: impl Into<String>) -> Self {
        Self {
            host_id: host_id.into(),
            site: None,
            frequency_override: None,
            last_report_sent: None,
        }
    }

    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.site = Some(site.into());
        self
    }

    pub fn with_frequency(mut self, frequency: Frequency) -> Self {
        self.frequency_override = Some(frequency);
        self
    }

    pub fn with_last_report_sent(mut self, sent: DateTime<Utc>) -> Self {
        self.last_report_sent = Some(sent);
        self
    }
}
