//! Host monitoring library
//!
//! This crate provides the core functionality for:
//! - Log analysis through a primary and a fallback language model
//! - Parsing model output into structured health records
//! - Report frequency resolution and per-host report scheduling
//! - Immediate alerts for WARN and CRITICAL health records
//! - The monitoring cycle that ties analysis and scheduling together
//! - Metrics and structured logging

pub mod alert;
pub mod analysis;
pub mod models;
pub mod monitor;
pub mod observability;
pub mod schedule;

pub use alert::{AlertChannel, AlertDecision, Alerter, HostAlert};
pub use analysis::{Analyzer, AnalyzerConfig, ModelClient, ModelError, ResponseParser};
pub use models::*;
pub use monitor::{CycleConfig, CycleSummary, LogExcerpt, LogFile, LogSource, MonitoringCycle};
pub use observability::{HostmonMetrics, StructuredLogger};
pub use schedule::{
    ConfigError, DeliveryError, Frequency, FrequencyConfig, FrequencyResolver, HostReport,
    HostStateTable, ReportDecision, ReportDelivery, ReportScheduler,
};
