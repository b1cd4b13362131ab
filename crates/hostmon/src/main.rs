//! Host monitor daemon
//!
//! Periodically analyzes each configured host's logs with a language model,
//! alerts at once on WARN and CRITICAL findings, and sends host reports on
//! each host's configured schedule.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use hostmon_lib::analysis::{ChatCompletionClient, OllamaClient};
use hostmon_lib::schedule::WebhookDelivery;
use hostmon_lib::{
    Alerter, Analyzer, HostStateTable, HostmonMetrics, ModelClient, MonitoringCycle,
    ReportScheduler, StructuredLogger,
};
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod logs;
mod state;

use crate::config::{AiSettings, BackendKind, HostmonConfig};
use crate::logs::FileLogSource;
use crate::state::StateStore;

const HOSTMON_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting hostmon");

    let config = HostmonConfig::load()?;
    let logger = StructuredLogger::new(&config.global.instance);

    let frequencies = Arc::new(config.frequency_config()?);

    let primary = build_model_client(config.ai.primary, &config.ai)?;
    let fallback = build_model_client(config.ai.fallback, &config.ai)?;
    info!(primary = %primary.name(), fallback = %fallback.name(), "Model backends configured");
    let analyzer = Arc::new(Analyzer::new(primary, fallback, config.analyzer_config()));

    let delivery = Arc::new(WebhookDelivery::new(
        &config.delivery.webhook_url,
        Duration::from_secs(config.delivery.timeout_secs),
    )?);
    let scheduler = Arc::new(ReportScheduler::new(frequencies, delivery));

    let store = StateStore::new(&config.global.state_file);
    let states = state::merge(config.schedule_states()?, store.load()?);
    let table = Arc::new(HostStateTable::from_states(states));

    let logs = Arc::new(FileLogSource::new(config.log_paths()));
    let hosts = config.host_contexts();
    let host_count = hosts.len();

    let (cycle, mut summaries) = MonitoringCycle::new(
        hosts,
        table.clone(),
        analyzer,
        scheduler,
        logs,
        config.cycle_config(),
    );
    let mut cycle = cycle.with_instance(&config.global.instance);
    if let Some(url) = config.alert_webhook_url() {
        let channel = Arc::new(WebhookDelivery::new(
            url,
            Duration::from_secs(config.delivery.timeout_secs),
        )?);
        let alerter = Alerter::new(channel)
            .with_dedup_window(Duration::from_secs(config.alerts.dedup_window_secs));
        info!(url = %url, "Immediate alerts enabled");
        cycle = cycle.with_alerter(Arc::new(alerter));
    }
    let cycle = Arc::new(cycle);

    let metrics = HostmonMetrics::new();
    logger.log_startup(HOSTMON_VERSION, host_count);

    let (shutdown_tx, _) = broadcast::channel(1);
    let cycle_handle = tokio::spawn(cycle.run(shutdown_tx.subscribe()));

    loop {
        tokio::select! {
            Some(summary) = summaries.recv() => {
                info!(
                    analyzed = summary.analyzed,
                    skipped = summary.skipped,
                    delivery_failures = summary.delivery_failures,
                    alerts_sent = summary.alerts_sent,
                    errors = summary.errors,
                    "Cycle summary"
                );
                persist(&store, &table).await;
                if let Some(path) = &config.global.metrics_textfile {
                    if let Err(e) = write_metrics(&metrics, path) {
                        error!(error = %e, "Failed to write metrics textfile");
                    }
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for shutdown signal")?;
                break;
            }
        }
    }

    logger.log_shutdown("SIGINT received");
    let _ = shutdown_tx.send(());
    cycle_handle.await.context("Monitoring loop panicked")?;
    persist(&store, &table).await;

    info!("Shutdown complete");
    Ok(())
}

fn build_model_client(kind: BackendKind, ai: &AiSettings) -> Result<Arc<dyn ModelClient>> {
    let client: Arc<dyn ModelClient> = match kind {
        BackendKind::Chat => Arc::new(ChatCompletionClient::new(
            &ai.chat.api_url,
            ai.chat.api_key.clone(),
            ai.chat.model.clone(),
            ai.timeout_for(kind),
        )?),
        BackendKind::Ollama => Arc::new(OllamaClient::new(
            &ai.ollama.host,
            ai.ollama.model.clone(),
            ai.timeout_for(kind),
        )?),
    };
    Ok(client)
}

/// Save schedule state, logging instead of failing the daemon
async fn persist(store: &StateStore, table: &HostStateTable) {
    let snapshot = table.snapshot().await;
    if let Err(e) = store.save(&snapshot) {
        error!(path = %store.path().display(), error = %e, "Failed to save schedule state");
    }
}

/// Write the Prometheus exposition to a textfile, replacing it atomically
fn write_metrics(metrics: &HostmonMetrics, path: &Path) -> Result<()> {
    let text = metrics.render()?;
    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, text).context("Failed to write metrics")?;
    std::fs::rename(&tmp, path).context("Failed to replace metrics textfile")?;
    Ok(())
}
