//! Headless device agent: opens the local store, starts the sync runtime and
//! turns periodic `GET /doctypes` probes into connectivity readings.

use std::sync::Arc;
use std::time::Duration;

use floorsync_core::model::DocumentType;
use floorsync_storage::SqliteStorage;
use floorsync_sync::{ConnectivityMonitor, DocumentApi, HttpDocumentApi, SyncConfig, SyncRuntime};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,floorsync=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(err) = run().await {
        tracing::error!(error = %err, "agent failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = SyncConfig::from_env()?;
    let base_url = config.require_api_base_url()?.to_string();

    tracing::info!(path = %config.database_path.display(), "opening local store");
    let storage = SqliteStorage::open(&config.database_path)?;
    let api: Arc<dyn DocumentApi> =
        Arc::new(HttpDocumentApi::new(base_url.as_str(), config.request_timeout)?);

    let probe_interval = config.probe_interval;
    let runtime = SyncRuntime::start(config, storage, Arc::clone(&api))?;
    {
        let stats = runtime.engine().lock().queue_stats()?;
        tracing::info!(
            pending = stats.pending,
            stuck = stats.stuck,
            api = %base_url,
            "agent started"
        );
    }

    let (stop_probe, stop_rx) = watch::channel(false);
    let probe = tokio::spawn(probe_loop(
        api,
        Arc::clone(runtime.monitor()),
        runtime.orchestrator().clone(),
        probe_interval,
        stop_rx,
    ));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    let _ = stop_probe.send(true);
    if let Err(err) = probe.await {
        tracing::warn!(error = %err, "probe task ended abnormally");
    }
    runtime.shutdown().await;
    Ok(())
}

/// Each probe is one reading. The first successful probe after an outage also
/// pulls fresh assignments for every handled document type.
async fn probe_loop(
    api: Arc<dyn DocumentApi>,
    monitor: Arc<ConnectivityMonitor>,
    orchestrator: Arc<floorsync_sync::SyncOrchestrator>,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = ticker.tick() => {
                let reachable = match api.document_types().await {
                    Ok(_) => true,
                    Err(err) => {
                        tracing::debug!(error = %err, "probe failed");
                        false
                    }
                };
                if monitor.set_online(reachable) && reachable {
                    for doc_type in DocumentType::ALL {
                        if let Err(err) = orchestrator.refresh(doc_type).await {
                            tracing::warn!(%doc_type, error = %err, "refresh failed");
                        }
                    }
                }
            }
        }
    }
}
