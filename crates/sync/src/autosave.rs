//! Auto-save: edits typed into an editing context sit in an [`EditBuffer`]
//! until a flush writes them through the engine, which queues one sync item
//! per flushed line. Flushes run on an interval, before navigation, and at
//! teardown, never two at once.

use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use floorsync_core::{ids::LineId, model::DocumentType};
use floorsync_engine::{EngineError, LineEdit};
use parking_lot::Mutex;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

use crate::error::SyncError;
use crate::{EngineHandle, InFlight};

/// Something auto-save can persist. Returns how many entries were written.
#[async_trait]
pub trait Flush: Send + Sync {
    async fn flush(&self) -> Result<usize, SyncError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    Interval,
    Navigation,
    Teardown,
}

impl fmt::Display for FlushReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Interval => "interval",
            Self::Navigation => "navigation",
            Self::Teardown => "teardown",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingEdit {
    doc_type: DocumentType,
    line_id: LineId,
    edit: LineEdit,
}

fn push_or_merge(pending: &mut Vec<PendingEdit>, next: PendingEdit) {
    match pending
        .iter_mut()
        .find(|p| p.doc_type == next.doc_type && p.line_id == next.line_id)
    {
        Some(existing) => existing.edit.merge(next.edit),
        None => pending.push(next),
    }
}

/// In-memory edits not yet written to the local store, coalesced per line.
#[derive(Debug)]
pub struct EditBuffer {
    engine: EngineHandle,
    pending: Mutex<Vec<PendingEdit>>,
}

impl EditBuffer {
    pub fn new(engine: EngineHandle) -> Self {
        Self {
            engine,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Later edits to the same line win field by field.
    pub fn record(&self, doc_type: DocumentType, line_id: LineId, edit: LineEdit) {
        if edit.is_empty() {
            return;
        }
        push_or_merge(
            &mut self.pending.lock(),
            PendingEdit {
                doc_type,
                line_id,
                edit,
            },
        );
    }

    pub fn set_quantity(&self, doc_type: DocumentType, line_id: LineId, quantity_fact: u32) {
        self.record(doc_type, line_id, LineEdit::quantity(quantity_fact));
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    pub fn pending_edit(&self, doc_type: DocumentType, line_id: &LineId) -> Option<LineEdit> {
        self.pending
            .lock()
            .iter()
            .find(|p| p.doc_type == doc_type && &p.line_id == line_id)
            .map(|p| p.edit.clone())
    }

    /// Put edits back in front of anything recorded since they were taken.
    fn restore(&self, older: impl IntoIterator<Item = PendingEdit>) {
        let mut pending = self.pending.lock();
        let newer = std::mem::take(&mut *pending);
        let mut combined: Vec<PendingEdit> = older.into_iter().collect();
        for edit in newer {
            push_or_merge(&mut combined, edit);
        }
        *pending = combined;
    }
}

#[async_trait]
impl Flush for EditBuffer {
    /// Edits for lines that vanished or belong to completed documents are
    /// dropped with a warning. A storage fault stops the flush and keeps the
    /// unwritten edits for the next one.
    async fn flush(&self) -> Result<usize, SyncError> {
        let edits = std::mem::take(&mut *self.pending.lock());
        let mut written = 0;
        let mut remaining = edits.into_iter();
        while let Some(pending) = remaining.next() {
            let result = self.engine.lock().apply_line_edit(
                pending.doc_type,
                &pending.line_id,
                pending.edit.clone(),
            );
            match result {
                Ok(_) => written += 1,
                Err(err @ (EngineError::LineNotFound(_) | EngineError::DocumentCompleted(_))) => {
                    warn!(line = %pending.line_id, error = %err, "dropping buffered edit");
                }
                Err(err) => {
                    self.restore(std::iter::once(pending).chain(remaining));
                    return Err(err.into());
                }
            }
        }
        Ok(written)
    }
}

/// The claimed flush slot. Releasing it wakes a waiting teardown.
struct FlushSlot<'a> {
    in_flight: Option<InFlight<'a>>,
    idle: &'a Notify,
}

impl Drop for FlushSlot<'_> {
    fn drop(&mut self) {
        self.in_flight.take();
        self.idle.notify_waiters();
    }
}

pub struct AutoSaveScheduler {
    target: Arc<dyn Flush>,
    flushing: AtomicBool,
    idle: Notify,
}

impl AutoSaveScheduler {
    pub fn new(target: Arc<dyn Flush>) -> Self {
        Self {
            target,
            flushing: AtomicBool::new(false),
            idle: Notify::new(),
        }
    }

    /// Run one flush unless one is already in flight, in which case the
    /// request is dropped. Failures are logged and left to the next tick.
    pub async fn request_flush(&self, reason: FlushReason) -> Option<usize> {
        let Some(_slot) = self.claim() else {
            debug!(%reason, "flush already in flight, request dropped");
            return None;
        };
        self.run(reason).await
    }

    fn claim(&self) -> Option<FlushSlot<'_>> {
        InFlight::acquire(&self.flushing).map(|in_flight| FlushSlot {
            in_flight: Some(in_flight),
            idle: &self.idle,
        })
    }

    async fn run(&self, reason: FlushReason) -> Option<usize> {
        match self.target.flush().await {
            Ok(written) => {
                if written > 0 {
                    debug!(%reason, written, "auto-save flushed");
                }
                Some(written)
            }
            Err(err) => {
                error!(%reason, error = %err, "auto-save flush failed");
                None
            }
        }
    }

    pub async fn before_navigation(&self) -> Option<usize> {
        self.request_flush(FlushReason::Navigation).await
    }

    /// Final flush. Waits out a flush already in flight instead of dropping
    /// the request, so edits made after its snapshot are still written.
    pub async fn teardown(&self) -> Option<usize> {
        loop {
            let idle = self.idle.notified();
            if let Some(_slot) = self.claim() {
                return self.run(FlushReason::Teardown).await;
            }
            debug!("waiting for in-flight flush before teardown");
            idle.await;
        }
    }

    pub fn spawn_periodic(
        self: &Arc<Self>,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {
                        scheduler.request_flush(FlushReason::Interval).await;
                    }
                }
            }
            debug!("auto-save timer stopped");
        })
    }
}

impl fmt::Debug for AutoSaveScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoSaveScheduler").finish_non_exhaustive()
    }
}
