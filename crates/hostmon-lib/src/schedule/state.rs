//! Per-host schedule state registry
//!
//! Each host's state sits behind its own async mutex, so decisions for one
//! host are serialized while other hosts proceed independently.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::models::HostScheduleState;

/// Shared handle to one host's schedule state
pub type HostStateHandle = Arc<Mutex<HostScheduleState>>;

/// Registry of schedule state, keyed by host id
#[derive(Default)]
pub struct HostStateTable {
    hosts: DashMap<String, HostStateHandle>,
}

impl HostStateTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            hosts: DashMap::new(),
        }
    }

    /// Create a table from previously persisted states
    pub fn from_states(states: impl IntoIterator<Item = HostScheduleState>) -> Self {
        let table = Self::new();
        for state in states {
            table
                .hosts
                .insert(state.host_id.clone(), Arc::new(Mutex::new(state)));
        }
        table
    }

    /// Register a host or refresh an existing one.
    ///
    /// Site and frequency override come from the caller; an existing
    /// `last_report_sent` is kept.
    pub async fn register(&self, state: HostScheduleState) {
        let existing = self.hosts.get(&state.host_id).map(|r| r.value().clone());

        match existing {
            Some(handle) => {
                let mut current = handle.lock().await;
                current.site = state.site;
                current.frequency_override = state.frequency_override;
                debug!(host_id = %current.host_id, "Refreshed host schedule state");
            }
            None => {
                debug!(host_id = %state.host_id, "Registering host schedule state");
                self.hosts
                    .insert(state.host_id.clone(), Arc::new(Mutex::new(state)));
            }
        }
    }

    /// Handle to a host's state
    pub fn get(&self, host_id: &str) -> Option<HostStateHandle> {
        self.hosts.get(host_id).map(|r| r.value().clone())
    }

    /// Copy of every host's current state, sorted by host id
    pub async fn snapshot(&self) -> Vec<HostScheduleState> {
        let handles: Vec<HostStateHandle> = self.hosts.iter().map(|r| r.value().clone()).collect();

        let mut states = Vec::with_capacity(handles.len());
        for handle in handles {
            states.push(handle.lock().await.clone());
        }
        states.sort_by(|a, b| a.host_id.cmp(&b.host_id));
        states
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}
