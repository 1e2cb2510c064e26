use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use floorsync_core::{model::DocumentType, ActionPayload, SyncQueueItem};
use floorsync_engine::{EngineError, IngestOutcome};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::{RemoteError, SyncError};
use crate::remote::{DocumentApi, ItemUpdate, RemoteDocumentType};
use crate::{EngineHandle, InFlight};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainProgress {
    pub completed: usize,
    pub total: usize,
}

impl DrainProgress {
    /// `completed / total`; an empty drain counts as finished.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub failed: usize,
}

impl DrainReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub created: usize,
    pub updated: usize,
    /// Left alone because local edits or a local completion are pending.
    pub kept: usize,
    /// Could not be fetched; retried on the next refresh.
    pub failed: usize,
}

/// Delivers the sync queue to the remote API, one drain at a time.
pub struct SyncOrchestrator {
    engine: EngineHandle,
    api: Arc<dyn DocumentApi>,
    draining: AtomicBool,
    progress: watch::Sender<DrainProgress>,
}

impl SyncOrchestrator {
    pub fn new(engine: EngineHandle, api: Arc<dyn DocumentApi>) -> Self {
        let (progress, _) = watch::channel(DrainProgress::default());
        Self {
            engine,
            api,
            draining: AtomicBool::new(false),
            progress,
        }
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(std::sync::atomic::Ordering::Acquire)
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<DrainProgress> {
        self.progress.subscribe()
    }

    /// Deliver a snapshot of the queue in FIFO order. A failed item is
    /// recorded and the drain moves on. Returns `None` if another drain is
    /// already running.
    pub async fn drain(&self) -> Result<Option<DrainReport>, SyncError> {
        let Some(_in_flight) = InFlight::acquire(&self.draining) else {
            debug!("drain already in flight, skipping");
            return Ok(None);
        };

        let items = self.engine.lock().dequeue_all()?;
        let total = items.len();
        self.progress.send_replace(DrainProgress {
            completed: 0,
            total,
        });
        if total == 0 {
            return Ok(Some(DrainReport::default()));
        }
        info!(items = total, "sync drain started");

        let mut report = DrainReport::default();
        for (done, item) in items.iter().enumerate() {
            match self.dispatch(item).await {
                Ok(()) => {
                    self.engine.lock().mark_delivered(item.id)?;
                    report.delivered += 1;
                }
                Err(err) => {
                    warn!(
                        id = %item.id,
                        doc = %item.document_id,
                        action = item.payload.action_name(),
                        error = %err,
                        "sync item delivery failed"
                    );
                    let message = err.to_string();
                    let recorded = self.engine.lock().record_failure(item.id, &message);
                    match recorded {
                        Ok(_) => {}
                        Err(EngineError::QueueItemNotFound(_)) => {
                            warn!(id = %item.id, "sync item removed during drain");
                        }
                        Err(err) => return Err(err.into()),
                    }
                    report.failed += 1;
                }
            }
            self.progress.send_replace(DrainProgress {
                completed: done + 1,
                total,
            });
        }

        info!(
            delivered = report.delivered,
            failed = report.failed,
            "sync drain finished"
        );
        Ok(Some(report))
    }

    /// Drain if anything is deliverable. Errors are logged; the next trigger
    /// tries again.
    pub async fn sync_now(&self) -> Option<DrainReport> {
        let deliverable = self.engine.lock().has_deliverable();
        match deliverable {
            Ok(false) => return None,
            Ok(true) => {}
            Err(err) => {
                error!(error = %err, "could not inspect sync queue");
                return None;
            }
        }
        match self.drain().await {
            Ok(report) => report,
            Err(err) => {
                error!(error = %err, "sync drain aborted");
                None
            }
        }
    }

    async fn dispatch(&self, item: &SyncQueueItem) -> Result<(), RemoteError> {
        match &item.payload {
            ActionPayload::UpdateLine {
                line_id,
                quantity_fact,
                cell_id,
                reason_code,
            } => {
                let update = ItemUpdate {
                    current_quantity: *quantity_fact,
                    cell_id: cell_id.clone(),
                    reason_code: reason_code.clone(),
                };
                self.api.update_item_quantity(line_id, &update).await
            }
            ActionPayload::CompleteDocument { .. } => {
                self.api
                    .finish_document(item.document_type, &item.document_id)
                    .await
            }
        }
    }

    pub async fn fetch_document_types(&self) -> Result<Vec<RemoteDocumentType>, SyncError> {
        Ok(self.api.document_types().await?)
    }

    /// Pull every document of one type from the server into the local store.
    pub async fn refresh(&self, doc_type: DocumentType) -> Result<RefreshReport, SyncError> {
        let summaries = self.api.list_documents(doc_type).await?;
        let mut report = RefreshReport::default();
        for summary in summaries {
            let marker = self.engine.lock().fetch_marker(doc_type, &summary.id)?;
            let remote = match self.api.get_document(doc_type, &summary.id).await {
                Ok(remote) => remote,
                Err(err) => {
                    warn!(doc = %summary.id, %doc_type, error = %err, "document fetch failed");
                    report.failed += 1;
                    continue;
                }
            };
            let priority = remote.priority();
            let lines = remote.lines.into_iter().map(Into::into).collect();
            let outcome = self.engine.lock().ingest_remote_document(
                doc_type,
                summary.id,
                priority,
                lines,
                marker,
            )?;
            match outcome {
                IngestOutcome::Created => report.created += 1,
                IngestOutcome::Updated => report.updated += 1,
                IngestOutcome::KeptLocalChanges | IngestOutcome::KeptCompleted => {
                    report.kept += 1
                }
            }
        }
        info!(
            %doc_type,
            created = report.created,
            updated = report.updated,
            kept = report.kept,
            failed = report.failed,
            "documents refreshed"
        );
        Ok(report)
    }
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("draining", &self.is_draining())
            .finish_non_exhaustive()
    }
}
