//! Report scheduling
//!
//! This module provides:
//! - Report frequencies and the host → site → global override chain
//! - The report scheduler (due checks and dispatch)
//! - Report delivery backends
//! - The per-host schedule state table

mod delivery;
mod frequency;
mod scheduler;
mod state;

pub use delivery::{DeliveryError, HostReport, ReportDelivery, WebhookDelivery};
pub use frequency::{Frequency, FrequencyConfig, FrequencyResolver, FrequencyScope};
pub use scheduler::{ReportDecision, ReportScheduler};
pub use state::{HostStateHandle, HostStateTable};

/// Scheduling configuration defect
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// No frequency resolves for a host because the global default is absent
    #[error("no report frequency resolvable for host '{host_id}': global default is not configured")]
    MissingGlobalFrequency { host_id: String },

    /// A frequency name outside the known set
    #[error("unknown report frequency '{0}' (expected hourly, daily, weekly or monthly)")]
    UnknownFrequency(String),

    /// A scope key that is not `global`, `site:<id>` or `host:<id>`
    #[error("invalid frequency scope '{0}' (expected global, site:<id> or host:<id>)")]
    InvalidScope(String),
}
