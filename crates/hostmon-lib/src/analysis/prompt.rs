//! Prompt construction for host log analysis

use crate::models::HostContext;

/// System message sent to chat-style backends
pub(crate) const SYSTEM_PROMPT: &str =
    "You are a system administrator analyzing logs from a monitored host. \
     Respond only with the requested JSON object.";

/// Build the analysis prompt for a host's log excerpt
pub fn build_analysis_prompt(host: &HostContext, log_excerpt: &str) -> String {
    let tags = if host.tags.is_empty() {
        "none".to_string()
    } else {
        host.tags.join(", ")
    };

    let baseline = match &host.baseline_hash {
        Some(hash) => format!("Baseline Comparison: Previous log hash was {}", hash),
        None => "First monitoring run - no baseline available".to_string(),
    };

    format!(
        r#"You are a system administrator analyzing logs from a monitored host.

Host Information:
- Name: {name}
- Hostname: {hostname}
- Site: {site}
- Tags: {tags}

Analysis Request:
1. Review the log files below for anomalies, security issues, and system health problems
2. Detect: failed login attempts, permission errors, service crashes, unusual patterns
3. Provide a health score (0-100) where 90-100 = healthy, 70-89 = minor issues, <70 = critical
4. Categorize severity as: INFO, WARN, or CRITICAL

{baseline}

Log Files:
{logs}

Respond in JSON format:
{{
    "health_score": <0-100>,
    "severity": "<INFO|WARN|CRITICAL>",
    "anomalies": [
        {{"type": "failed_login", "description": "...", "severity": "WARN"}}
    ],
    "summary": "Brief overview of findings",
    "recommendations": "Suggested actions"
}}
"#,
        name = host.host_id,
        hostname = host.hostname,
        site = host.site.as_deref().unwrap_or("unassigned"),
        tags = tags,
        baseline = baseline,
        logs = log_excerpt,
    )
}
