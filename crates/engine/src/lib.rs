pub mod error;
pub mod queue;
pub mod workflow;

pub use error::EngineError;
pub use queue::{QueuePolicy, QueueStats};
pub use workflow::{Completion, FetchMarker, IngestOutcome, LineEdit, LineUpdate};

use floorsync_core::hlc::{Hlc, HlcClock};
use floorsync_storage::{SqliteStorage, Storage};

/// The local, synchronous side of a device: the store, the clock that stamps
/// every write, and the queue policy. Async components share it behind a
/// mutex and never hold the lock across a remote call.
pub struct Engine {
    clock: HlcClock,
    storage: SqliteStorage,
    policy: QueuePolicy,
}

impl Engine {
    /// Open an engine over an initialized store. The clock resumes after the
    /// newest persisted timestamp.
    pub fn new(storage: SqliteStorage, policy: QueuePolicy) -> Result<Self, EngineError> {
        let clock = match storage.latest_timestamp()? {
            Some(last) => HlcClock::starting_after(last),
            None => HlcClock::new(),
        };
        Ok(Self {
            clock,
            storage,
            policy,
        })
    }

    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut SqliteStorage {
        &mut self.storage
    }

    pub fn policy(&self) -> QueuePolicy {
        self.policy
    }

    pub(crate) fn tick(&mut self) -> Result<Hlc, EngineError> {
        Ok(self.clock.tick()?)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("last_timestamp", &self.clock.last())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
