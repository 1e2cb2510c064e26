use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use crate::connectivity::ConnectivityMonitor;
use crate::orchestrator::SyncOrchestrator;

/// Periodic drains while online. A drain that overlaps a connectivity-triggered
/// one is skipped by the orchestrator's own guard.
#[derive(Debug)]
pub struct SyncScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    monitor: Arc<ConnectivityMonitor>,
    period: Duration,
}

impl SyncScheduler {
    pub fn new(
        orchestrator: Arc<SyncOrchestrator>,
        monitor: Arc<ConnectivityMonitor>,
        period: Duration,
    ) -> Self {
        Self {
            orchestrator,
            monitor,
            period,
        }
    }

    /// First tick fires one full period after spawning.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + self.period, self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {
                        if self.monitor.is_online() {
                            self.orchestrator.sync_now().await;
                        } else {
                            debug!("offline, periodic sync skipped");
                        }
                    }
                }
            }
            debug!("sync scheduler stopped");
        })
    }
}
