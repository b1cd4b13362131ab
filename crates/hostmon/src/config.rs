//! Daemon configuration
//!
//! Loaded from an optional TOML file (`HOSTMON_CONFIG`, default
//! `hostmon.toml`) with `HOSTMON__<SECTION>__<KEY>` environment variables
//! layered on top.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use ::config::{Config, Environment, File, FileFormat};
use anyhow::{bail, Context, Result};
use hostmon_lib::alert::DEFAULT_DEDUP_WINDOW;
use hostmon_lib::monitor::{
    DEFAULT_CYCLE_TIMEOUT, DEFAULT_MAX_CONCURRENT_HOSTS, DEFAULT_MONITOR_INTERVAL,
    MAX_CONCURRENT_HOSTS,
};
use hostmon_lib::{
    AnalyzerConfig, ConfigError, CycleConfig, Frequency, FrequencyConfig, HostContext,
    HostScheduleState,
};
use serde::Deserialize;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "HOSTMON_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "hostmon.toml";

/// Top-level daemon configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HostmonConfig {
    pub global: GlobalSettings,

    #[serde(default)]
    pub sites: HashMap<String, SiteSettings>,

    #[serde(default)]
    pub hosts: Vec<HostSettings>,

    #[serde(default)]
    pub ai: AiSettings,

    pub delivery: DeliverySettings,

    #[serde(default)]
    pub alerts: AlertSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlobalSettings {
    /// Default report frequency; the only mandatory frequency
    pub report_frequency: String,

    /// Instance name used in structured logs
    #[serde(default = "default_instance")]
    pub instance: String,

    #[serde(default = "default_monitor_interval")]
    pub monitor_interval_secs: u64,

    #[serde(default = "default_cycle_timeout")]
    pub cycle_timeout_secs: u64,

    #[serde(default = "default_max_concurrent_hosts")]
    pub max_concurrent_hosts: usize,

    /// JSON file holding per-host schedule state between runs
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// Prometheus textfile written after each cycle
    #[serde(default)]
    pub metrics_textfile: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteSettings {
    #[serde(default)]
    pub report_frequency: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostSettings {
    pub id: String,
    pub hostname: String,

    #[serde(default)]
    pub site: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Log files to analyze, in order
    #[serde(default)]
    pub logs: Vec<PathBuf>,

    /// Per-host frequency override
    #[serde(default)]
    pub report_frequency: Option<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Which model backend fills a role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Chat,
    Ollama,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AiSettings {
    #[serde(default = "default_primary_backend")]
    pub primary: BackendKind,

    #[serde(default = "default_fallback_backend")]
    pub fallback: BackendKind,

    #[serde(default)]
    pub chat: ChatSettings,

    #[serde(default)]
    pub ollama: OllamaSettings,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            primary: default_primary_backend(),
            fallback: default_fallback_backend(),
            chat: ChatSettings::default(),
            ollama: OllamaSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatSettings {
    #[serde(default = "default_chat_url")]
    pub api_url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_chat_model")]
    pub model: String,

    #[serde(default = "default_chat_timeout")]
    pub timeout_secs: u64,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            api_url: default_chat_url(),
            api_key: None,
            model: default_chat_model(),
            timeout_secs: default_chat_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OllamaSettings {
    #[serde(default = "default_ollama_host")]
    pub host: String,

    #[serde(default = "default_ollama_model")]
    pub model: String,

    #[serde(default = "default_ollama_timeout")]
    pub timeout_secs: u64,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            host: default_ollama_host(),
            model: default_ollama_model(),
            timeout_secs: default_ollama_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeliverySettings {
    pub webhook_url: String,

    #[serde(default = "default_delivery_timeout")]
    pub timeout_secs: u64,
}

/// Immediate WARN and CRITICAL alerts
#[derive(Debug, Clone, Deserialize)]
pub struct AlertSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Alert webhook; reports webhook when unset
    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default = "default_alert_dedup")]
    pub dedup_window_secs: u64,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            webhook_url: None,
            dedup_window_secs: default_alert_dedup(),
        }
    }
}

fn default_instance() -> String {
    "hostmon".to_string()
}

fn default_monitor_interval() -> u64 {
    DEFAULT_MONITOR_INTERVAL.as_secs()
}

fn default_cycle_timeout() -> u64 {
    DEFAULT_CYCLE_TIMEOUT.as_secs()
}

fn default_max_concurrent_hosts() -> usize {
    DEFAULT_MAX_CONCURRENT_HOSTS
}

fn default_state_file() -> PathBuf {
    PathBuf::from("hostmon-state.json")
}

fn default_enabled() -> bool {
    true
}

fn default_primary_backend() -> BackendKind {
    BackendKind::Chat
}

fn default_fallback_backend() -> BackendKind {
    BackendKind::Ollama
}

fn default_chat_url() -> String {
    "https://api.x.ai/v1".to_string()
}

fn default_chat_model() -> String {
    "grok-beta".to_string()
}

fn default_chat_timeout() -> u64 {
    30
}

fn default_ollama_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3".to_string()
}

fn default_ollama_timeout() -> u64 {
    120
}

fn default_delivery_timeout() -> u64 {
    10
}

fn default_alert_dedup() -> u64 {
    DEFAULT_DEDUP_WINDOW.as_secs()
}

impl HostmonConfig {
    /// Load configuration from the file named by `HOSTMON_CONFIG` and the
    /// environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&path))
    }

    /// Load configuration from a specific file and the environment.
    ///
    /// A missing file is allowed as long as the environment supplies the
    /// mandatory settings.
    pub fn load_from(path: &Path) -> Result<Self> {
        let settings = Config::builder()
            .add_source(
                File::from(path)
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix("HOSTMON")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        let config: HostmonConfig = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints and every frequency name
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_CONCURRENT_HOSTS).contains(&self.global.max_concurrent_hosts) {
            bail!(
                "global.max_concurrent_hosts must be between 1 and {}",
                MAX_CONCURRENT_HOSTS
            );
        }
        if self.global.monitor_interval_secs == 0 {
            bail!("global.monitor_interval_secs must be at least 1");
        }
        if self.global.cycle_timeout_secs == 0 {
            bail!("global.cycle_timeout_secs must be at least 1");
        }

        let mut seen = HashSet::new();
        for host in &self.hosts {
            if host.id.trim().is_empty() {
                bail!("host with hostname '{}' has an empty id", host.hostname);
            }
            if !seen.insert(host.id.as_str()) {
                bail!("duplicate host id '{}'", host.id);
            }
        }

        self.frequency_config()?;
        self.schedule_states()?;
        Ok(())
    }

    /// Global and per-site report frequencies
    pub fn frequency_config(&self) -> Result<FrequencyConfig, ConfigError> {
        let global: Frequency = self.global.report_frequency.parse()?;
        let mut config = FrequencyConfig::new(global);

        for (site, settings) in &self.sites {
            if let Some(name) = &settings.report_frequency {
                config = config.with_site(site.clone(), name.parse()?);
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn enabled_hosts(&self) -> impl Iterator<Item = &HostSettings> {
        self.hosts.iter().filter(|h| h.enabled)
    }

    /// Identity of every enabled host
    pub fn host_contexts(&self) -> Vec<HostContext> {
        self.enabled_hosts()
            .map(|h| HostContext {
                host_id: h.id.clone(),
                hostname: h.hostname.clone(),
                site: h.site.clone(),
                tags: h.tags.clone(),
                baseline_hash: None,
            })
            .collect()
    }

    /// Schedule state for every enabled host, without send history
    pub fn schedule_states(&self) -> Result<Vec<HostScheduleState>, ConfigError> {
        self.enabled_hosts()
            .map(|h| {
                let mut state = HostScheduleState::new(h.id.clone());
                state.site = h.site.clone();
                if let Some(name) = &h.report_frequency {
                    state.frequency_override = Some(name.parse()?);
                }
                Ok(state)
            })
            .collect()
    }

    /// Log paths per enabled host
    pub fn log_paths(&self) -> HashMap<String, Vec<PathBuf>> {
        self.enabled_hosts()
            .map(|h| (h.id.clone(), h.logs.clone()))
            .collect()
    }

    pub fn cycle_config(&self) -> CycleConfig {
        CycleConfig {
            interval: Duration::from_secs(self.global.monitor_interval_secs),
            cycle_timeout: Duration::from_secs(self.global.cycle_timeout_secs),
            max_concurrent_hosts: self.global.max_concurrent_hosts,
        }
    }

    /// Where alerts go, or `None` when alerting is off
    pub fn alert_webhook_url(&self) -> Option<&str> {
        if !self.alerts.enabled {
            return None;
        }
        Some(
            self.alerts
                .webhook_url
                .as_deref()
                .unwrap_or(&self.delivery.webhook_url),
        )
    }

    /// Per-role timeouts, taken from whichever backend fills each role
    pub fn analyzer_config(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            primary_timeout: self.ai.timeout_for(self.ai.primary),
            fallback_timeout: self.ai.timeout_for(self.ai.fallback),
        }
    }
}

impl AiSettings {
    pub fn timeout_for(&self, kind: BackendKind) -> Duration {
        match kind {
            BackendKind::Chat => Duration::from_secs(self.chat.timeout_secs),
            BackendKind::Ollama => Duration::from_secs(self.ollama.timeout_secs),
        }
    }
}
