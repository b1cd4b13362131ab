//! Log analysis through language models
//!
//! This module provides:
//! - The `ModelClient` capability trait and its cloud and local backends
//! - Prompt construction for host log analysis
//! - Parsing of free-form model output into `HealthRecord`s
//! - The `Analyzer`, which never fails and degrades to a fixed assessment

mod analyzer;
mod clients;
mod parser;
mod prompt;

pub use analyzer::{
    fallback_analysis, Analyzer, AnalyzerConfig, AI_UNAVAILABLE_MARKER,
    DEFAULT_FALLBACK_TIMEOUT, DEFAULT_PRIMARY_TIMEOUT,
};
pub use clients::{ChatCompletionClient, OllamaClient};
pub use parser::{ResponseParser, UNPARSEABLE_MARKER};
pub use prompt::build_analysis_prompt;

use crate::models::HostContext;
use async_trait::async_trait;

/// Failure of a single model call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// Network failure, timeout, non-success status or malformed envelope
    #[error("model unavailable: {0}")]
    Unavailable(String),

    /// Credentials missing or rejected by the backend
    #[error("model authentication failed: {0}")]
    Auth(String),
}

impl ModelError {
    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ModelError::Unavailable(_) => "unavailable",
            ModelError::Auth(_) => "auth",
        }
    }
}

/// Trait for language model backends
///
/// Each call issues exactly one request and keeps no state between calls.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Analyze a host's log excerpt and return the model's raw text
    async fn analyze(&self, host: &HostContext, log_excerpt: &str) -> Result<String, ModelError>;

    /// Backend name used in logs and metrics
    fn name(&self) -> &str;
}
