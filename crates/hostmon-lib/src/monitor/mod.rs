//! Monitoring cycle
//!
//! This module provides:
//! - The `LogSource` trait for retrieving host logs
//! - Bounded log excerpts
//! - The periodic cycle that analyzes every host and dispatches due reports

mod cycle;
mod excerpt;

pub use cycle::{
    CycleConfig, CycleSummary, MonitoringCycle, DEFAULT_CYCLE_TIMEOUT,
    DEFAULT_MAX_CONCURRENT_HOSTS, DEFAULT_MONITOR_INTERVAL, MAX_CONCURRENT_HOSTS,
};
pub use excerpt::{LogExcerpt, LogFile, MAX_EXCERPT_CHARS, MAX_EXCERPT_FILES};

use crate::models::HostContext;
use anyhow::Result;
use async_trait::async_trait;

/// Trait for retrieving a host's logs
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Fetch the current log excerpt for a host
    async fn fetch(&self, host: &HostContext) -> Result<LogExcerpt>;
}
