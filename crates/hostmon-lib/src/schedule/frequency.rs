//! Report frequencies and their override chain

use std::collections::HashMap;
use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ConfigError;
use crate::models::HostScheduleState;

/// How often a host report is sent
///
/// Intervals are fixed durations. `Monthly` is exactly 30 days, not a
/// calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    /// Minimum time between two reports
    pub fn interval(&self) -> Duration {
        match self {
            Frequency::Hourly => Duration::hours(1),
            Frequency::Daily => Duration::hours(24),
            Frequency::Weekly => Duration::days(7),
            Frequency::Monthly => Duration::days(30),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Hourly => "hourly",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
        }
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hourly" => Ok(Frequency::Hourly),
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            _ => Err(ConfigError::UnknownFrequency(s.to_string())),
        }
    }
}

/// Level at which a frequency is configured
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FrequencyScope {
    Global,
    Site(String),
    Host(String),
}

impl FromStr for FrequencyScope {
    type Err = ConfigError;

    /// Parse `global`, `site:<id>` or `host:<id>`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "global" {
            return Ok(FrequencyScope::Global);
        }
        match s.split_once(':') {
            Some(("site", id)) if !id.is_empty() => Ok(FrequencyScope::Site(id.to_string())),
            Some(("host", id)) if !id.is_empty() => Ok(FrequencyScope::Host(id.to_string())),
            _ => Err(ConfigError::InvalidScope(s.to_string())),
        }
    }
}

impl std::fmt::Display for FrequencyScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrequencyScope::Global => write!(f, "global"),
            FrequencyScope::Site(id) => write!(f, "site:{}", id),
            FrequencyScope::Host(id) => write!(f, "host:{}", id),
        }
    }
}

/// Report frequencies by scope
///
/// Loaded once at startup and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrequencyConfig {
    global: Option<Frequency>,
    sites: HashMap<String, Frequency>,
    hosts: HashMap<String, Frequency>,
}

impl FrequencyConfig {
    /// Create a config with a global default
    pub fn new(global: Frequency) -> Self {
        Self {
            global: Some(global),
            ..Default::default()
        }
    }

    /// Build a config from `(scope, frequency)` string pairs
    pub fn from_scopes<I, S, F>(entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (S, F)>,
        S: AsRef<str>,
        F: AsRef<str>,
    {
        let mut config = Self::default();
        for (scope, frequency) in entries {
            let scope: FrequencyScope = scope.as_ref().parse()?;
            let frequency: Frequency = frequency.as_ref().parse()?;
            config.insert(scope, frequency);
        }
        Ok(config)
    }

    pub fn with_site(mut self, site: impl Into<String>, frequency: Frequency) -> Self {
        self.sites.insert(site.into(), frequency);
        self
    }

    pub fn with_host(mut self, host_id: impl Into<String>, frequency: Frequency) -> Self {
        self.hosts.insert(host_id.into(), frequency);
        self
    }

    /// Set the frequency for a scope
    pub fn insert(&mut self, scope: FrequencyScope, frequency: Frequency) {
        match scope {
            FrequencyScope::Global => self.global = Some(frequency),
            FrequencyScope::Site(id) => {
                self.sites.insert(id, frequency);
            }
            FrequencyScope::Host(id) => {
                self.hosts.insert(id, frequency);
            }
        }
    }

    /// Look up the frequency configured for a scope
    pub fn get(&self, scope: &FrequencyScope) -> Option<Frequency> {
        match scope {
            FrequencyScope::Global => self.global,
            FrequencyScope::Site(id) => self.sites.get(id).copied(),
            FrequencyScope::Host(id) => self.hosts.get(id).copied(),
        }
    }

    pub fn global(&self) -> Option<Frequency> {
        self.global
    }

    /// Fail unless a global default is configured
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.global {
            Some(_) => Ok(()),
            None => Err(ConfigError::MissingGlobalFrequency {
                host_id: "*".to_string(),
            }),
        }
    }
}

/// Resolves a host's effective report frequency
pub struct FrequencyResolver;

impl FrequencyResolver {
    /// Effective frequency for a host.
    ///
    /// Precedence, highest first: the host's own override, a `host:<id>`
    /// entry, the host's site, the global default.
    pub fn resolve(
        host: &HostScheduleState,
        config: &FrequencyConfig,
    ) -> Result<Frequency, ConfigError> {
        let (frequency, scope) = Self::resolve_with_scope(host, config)?;
        debug!(host_id = %host.host_id, frequency = %frequency, scope = %scope, "Resolved report frequency");
        Ok(frequency)
    }

    /// Effective frequency together with the scope it came from
    pub fn resolve_with_scope(
        host: &HostScheduleState,
        config: &FrequencyConfig,
    ) -> Result<(Frequency, FrequencyScope), ConfigError> {
        if let Some(frequency) = host.frequency_override {
            return Ok((frequency, FrequencyScope::Host(host.host_id.clone())));
        }

        let host_scope = FrequencyScope::Host(host.host_id.clone());
        if let Some(frequency) = config.get(&host_scope) {
            return Ok((frequency, host_scope));
        }

        if let Some(site) = &host.site {
            let site_scope = FrequencyScope::Site(site.clone());
            if let Some(frequency) = config.get(&site_scope) {
                return Ok((frequency, site_scope));
            }
        }

        config
            .global
            .map(|frequency| (frequency, FrequencyScope::Global))
            .ok_or_else(|| ConfigError::MissingGlobalFrequency {
                host_id: host.host_id.clone(),
            })
    }
}
