//! The async side of a device: delivering the sync queue to the remote
//! Document API, tracking connectivity, and the periodic timers that drive
//! drains and auto-save flushes.
//!
//! All components share one [`EngineHandle`]. The engine lock is taken for
//! short synchronous sections only and is never held across an `.await`.

pub mod autosave;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod orchestrator;
pub mod remote;
pub mod runtime;
pub mod scheduler;

pub use autosave::{AutoSaveScheduler, EditBuffer, Flush, FlushReason};
pub use config::{ConfigError, SyncConfig};
pub use connectivity::{ConnectivityEvent, ConnectivityMonitor};
pub use error::{RemoteError, SyncError};
pub use orchestrator::{DrainProgress, DrainReport, RefreshReport, SyncOrchestrator};
pub use remote::{
    DocumentApi, HttpDocumentApi, ItemUpdate, RemoteDocument, RemoteDocumentSummary,
    RemoteDocumentType, RemoteLine,
};
pub use runtime::SyncRuntime;
pub use scheduler::SyncScheduler;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use floorsync_engine::Engine;
use parking_lot::Mutex;

pub type EngineHandle = Arc<Mutex<Engine>>;

pub fn engine_handle(engine: Engine) -> EngineHandle {
    Arc::new(Mutex::new(engine))
}

/// Holds an in-flight flag for its lifetime. A second acquire while the flag
/// is set fails instead of waiting.
pub(crate) struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    pub(crate) fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
