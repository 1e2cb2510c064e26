use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::orchestrator::SyncOrchestrator;

const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    Online,
    Offline,
}

/// Current reachability plus a stream of transitions. Readings that do not
/// change the state publish nothing.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    online: AtomicBool,
    events: broadcast::Sender<ConnectivityEvent>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            online: AtomicBool::new(initially_online),
            events,
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Feed a platform reading. Returns whether it was a transition.
    pub fn set_online(&self, online: bool) -> bool {
        if self.online.swap(online, Ordering::AcqRel) == online {
            return false;
        }
        let event = if online {
            ConnectivityEvent::Online
        } else {
            ConnectivityEvent::Offline
        };
        info!(?event, "connectivity changed");
        // No subscribers is fine.
        let _ = self.events.send(event);
        true
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.events.subscribe()
    }

    /// Drain the queue on every transition to online until `shutdown` fires.
    /// The subscription is dropped when the task ends.
    pub fn spawn_drain_trigger(
        self: &Arc<Self>,
        orchestrator: Arc<SyncOrchestrator>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        let mut events = self.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    event = events.recv() => match event {
                        Ok(ConnectivityEvent::Online) => {
                            orchestrator.sync_now().await;
                        }
                        Ok(ConnectivityEvent::Offline) => {}
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "connectivity events lagged");
                            if monitor.is_online() {
                                orchestrator.sync_now().await;
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!("drain trigger stopped");
        })
    }
}
