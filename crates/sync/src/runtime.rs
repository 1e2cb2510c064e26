use std::sync::Arc;

use floorsync_engine::Engine;
use floorsync_storage::SqliteStorage;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::autosave::{AutoSaveScheduler, EditBuffer};
use crate::config::SyncConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::error::SyncError;
use crate::orchestrator::SyncOrchestrator;
use crate::remote::DocumentApi;
use crate::scheduler::SyncScheduler;
use crate::{engine_handle, EngineHandle};

/// Every service of a running device, constructed once and handed out by
/// reference. Must be started inside a tokio runtime.
pub struct SyncRuntime {
    config: SyncConfig,
    engine: EngineHandle,
    orchestrator: Arc<SyncOrchestrator>,
    monitor: Arc<ConnectivityMonitor>,
    edits: Arc<EditBuffer>,
    autosave: Arc<AutoSaveScheduler>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncRuntime {
    /// Starts offline; feed readings into [`SyncRuntime::monitor`].
    pub fn start(
        config: SyncConfig,
        storage: SqliteStorage,
        api: Arc<dyn DocumentApi>,
    ) -> Result<Self, SyncError> {
        let engine = engine_handle(Engine::new(storage, config.queue_policy())?);
        let orchestrator = Arc::new(SyncOrchestrator::new(Arc::clone(&engine), api));
        let monitor = Arc::new(ConnectivityMonitor::new(false));
        let edits = Arc::new(EditBuffer::new(Arc::clone(&engine)));
        let autosave = Arc::new(AutoSaveScheduler::new(edits.clone()));
        let (shutdown, shutdown_rx) = watch::channel(false);

        let tasks = vec![
            monitor.spawn_drain_trigger(Arc::clone(&orchestrator), shutdown_rx.clone()),
            SyncScheduler::new(
                Arc::clone(&orchestrator),
                Arc::clone(&monitor),
                config.sync_interval,
            )
            .spawn(shutdown_rx.clone()),
            autosave.spawn_periodic(config.autosave_interval, shutdown_rx),
        ];

        info!(
            sync_interval = ?config.sync_interval,
            autosave_interval = ?config.autosave_interval,
            max_retries = config.max_retries,
            "sync runtime started"
        );
        Ok(Self {
            config,
            engine,
            orchestrator,
            monitor,
            edits,
            autosave,
            shutdown,
            tasks,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    pub fn edits(&self) -> &Arc<EditBuffer> {
        &self.edits
    }

    pub fn autosave(&self) -> &Arc<AutoSaveScheduler> {
        &self.autosave
    }

    /// Stop the timers and the drain trigger, then flush outstanding edits.
    /// A drain already in progress runs to completion first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "background task ended abnormally");
            }
        }
        self.autosave.teardown().await;
        info!("sync runtime stopped");
    }
}

impl std::fmt::Debug for SyncRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncRuntime")
            .field("config", &self.config)
            .field("online", &self.monitor.is_online())
            .finish_non_exhaustive()
    }
}
