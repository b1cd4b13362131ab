//! Schedule state persistence
//!
//! Keeps every host's `last_report_sent` in a JSON file so report
//! schedules survive restarts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use hostmon_lib::HostScheduleState;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    saved_at: DateTime<Utc>,
    hosts: Vec<HostScheduleState>,
}

/// JSON file store for host schedule state
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load persisted states. A missing file means no history yet.
    pub fn load(&self) -> Result<Vec<HostScheduleState>> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "No schedule state file, starting fresh");
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read state file {}", self.path.display()))?;
        let file: StateFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file {}", self.path.display()))?;

        debug!(path = %self.path.display(), hosts = file.hosts.len(), "Loaded schedule state");
        Ok(file.hosts)
    }

    /// Save states, replacing the file atomically
    pub fn save(&self, hosts: &[HostScheduleState]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context("Failed to create state directory")?;
        }

        let file = StateFile {
            saved_at: Utc::now(),
            hosts: hosts.to_vec(),
        };
        let content = serde_json::to_string_pretty(&file).context("Failed to serialize state")?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content).context("Failed to write state file")?;
        std::fs::rename(&tmp, &self.path).context("Failed to replace state file")?;

        debug!(path = %self.path.display(), hosts = hosts.len(), "Saved schedule state");
        Ok(())
    }
}

/// Combine configured hosts with persisted history.
///
/// Configuration decides which hosts exist and their site and override;
/// the persisted state supplies `last_report_sent`.
pub fn merge(
    configured: Vec<HostScheduleState>,
    persisted: Vec<HostScheduleState>,
) -> Vec<HostScheduleState> {
    let mut history: HashMap<String, DateTime<Utc>> = persisted
        .into_iter()
        .filter_map(|s| s.last_report_sent.map(|sent| (s.host_id, sent)))
        .collect();

    configured
        .into_iter()
        .map(|mut state| {
            state.last_report_sent = history.remove(&state.host_id);
            state
        })
        .collect()
}
