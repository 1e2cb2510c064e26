use floorsync_core::{ids::*, ActionPayload, DocumentType, SyncQueueItem};
use floorsync_storage::{QueueItemState, Storage};
use tracing::{debug, warn};

use crate::{Engine, EngineError};

pub const DEFAULT_MAX_RETRIES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePolicy {
    /// Items at or past this many failed deliveries are skipped by drains.
    pub max_retries: u32,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

/// What a client surfaces about the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// All unsynced items, stuck ones included.
    pub pending: usize,
    pub stuck: usize,
    pub oldest_error: Option<String>,
}

impl QueueStats {
    pub fn deliverable(&self) -> usize {
        self.pending - self.stuck
    }
}

impl Engine {
    /// Persist a new mutation for later delivery. Never touches the network.
    pub fn enqueue(
        &mut self,
        document_type: DocumentType,
        document_id: DocumentId,
        payload: ActionPayload,
    ) -> Result<SyncQueueItem, EngineError> {
        let now = self.tick()?;
        let item = SyncQueueItem::new(document_type, document_id, payload, now);
        self.storage.insert_queue_item(&item)?;
        debug!(
            id = %item.id,
            doc = %item.document_id,
            action = item.payload.action_name(),
            "enqueued sync action"
        );
        Ok(item)
    }

    /// Unsynced, non-stuck items in FIFO order.
    pub fn dequeue_all(&self) -> Result<Vec<SyncQueueItem>, EngineError> {
        let max_retries = self.policy.max_retries;
        let (ready, stuck): (Vec<_>, Vec<_>) = self
            .storage
            .unsynced_queue_items()?
            .into_iter()
            .partition(|item| !item.is_stuck(max_retries));
        for item in &stuck {
            warn!(
                id = %item.id,
                retries = item.retries,
                last_error = item.last_error.as_deref().unwrap_or(""),
                "skipping stuck sync item"
            );
        }
        Ok(ready)
    }

    /// Every unsynced item, including the ones drains skip.
    pub fn pending_items(&self) -> Result<Vec<SyncQueueItem>, EngineError> {
        Ok(self.storage.unsynced_queue_items()?)
    }

    /// Idempotent. Returns whether the item was newly marked.
    pub fn mark_delivered(&mut self, id: QueueItemId) -> Result<bool, EngineError> {
        let Some(item) = self.storage.get_queue_item(id)? else {
            return Ok(false);
        };
        if item.synced {
            return Ok(false);
        }
        self.storage.set_queue_item_state(
            id,
            &QueueItemState {
                retries: item.retries,
                last_error: item.last_error,
                synced: true,
            },
        )?;
        Ok(true)
    }

    pub fn record_failure(
        &mut self,
        id: QueueItemId,
        error: &str,
    ) -> Result<SyncQueueItem, EngineError> {
        let mut item = self
            .storage
            .get_queue_item(id)?
            .ok_or_else(|| EngineError::QueueItemNotFound(id.to_string()))?;
        if item.synced {
            return Ok(item);
        }
        item.retries += 1;
        item.last_error = Some(error.to_string());
        self.storage.set_queue_item_state(
            id,
            &QueueItemState {
                retries: item.retries,
                last_error: item.last_error.clone(),
                synced: false,
            },
        )?;
        if item.is_stuck(self.policy.max_retries) {
            warn!(id = %id, retries = item.retries, error, "sync item reached retry ceiling");
        }
        Ok(item)
    }

    pub fn queue_stats(&self) -> Result<QueueStats, EngineError> {
        let items = self.storage.unsynced_queue_items()?;
        let max_retries = self.policy.max_retries;
        Ok(QueueStats {
            pending: items.len(),
            stuck: items.iter().filter(|i| i.is_stuck(max_retries)).count(),
            oldest_error: items.iter().find_map(|i| i.last_error.clone()),
        })
    }

    pub fn has_deliverable(&self) -> Result<bool, EngineError> {
        Ok(self.queue_stats()?.deliverable() > 0)
    }

    /// Manual resolution of a stuck item: clear its failure history so the
    /// next drain tries it again.
    pub fn requeue(&mut self, id: QueueItemId) -> Result<(), EngineError> {
        let item = self
            .storage
            .get_queue_item(id)?
            .ok_or_else(|| EngineError::QueueItemNotFound(id.to_string()))?;
        self.storage.set_queue_item_state(
            id,
            &QueueItemState {
                retries: 0,
                last_error: None,
                synced: item.synced,
            },
        )?;
        Ok(())
    }

    /// Manually clear an item without delivering it.
    pub fn discard(&mut self, id: QueueItemId) -> Result<bool, EngineError> {
        let removed = self.storage.delete_queue_item(id)?;
        if removed {
            warn!(id = %id, "discarded undelivered sync item");
        }
        Ok(removed)
    }

    pub fn prune_delivered(&mut self) -> Result<u64, EngineError> {
        Ok(self.storage.delete_synced_queue_items()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use floorsync_storage::SqliteStorage;

    fn engine(max_retries: u32) -> Engine {
        let storage = SqliteStorage::open_in_memory().unwrap();
        Engine::new(storage, QueuePolicy { max_retries }).unwrap()
    }

    fn complete(engine: &mut Engine, doc: &str) -> SyncQueueItem {
        engine
            .enqueue(
                DocumentType::Picking,
                DocumentId::from(doc),
                ActionPayload::CompleteDocument {
                    completed_lines: 1,
                    total_lines: 1,
                },
            )
            .unwrap()
    }

    #[test]
    fn dequeue_is_fifo() {
        let mut engine = engine(3);
        let ids: Vec<_> = (0..5).map(|i| complete(&mut engine, &format!("D{i}")).id).collect();
        let drained: Vec<_> = engine.dequeue_all().unwrap().into_iter().map(|i| i.id).collect();
        assert_eq!(drained, ids);
    }

    #[test]
    fn mark_delivered_is_idempotent() {
        let mut engine = engine(3);
        let item = complete(&mut engine, "D1");
        assert!(engine.mark_delivered(item.id).unwrap());
        assert!(!engine.mark_delivered(item.id).unwrap());
        assert!(!engine.mark_delivered(QueueItemId::new()).unwrap());
        assert!(engine.dequeue_all().unwrap().is_empty());
        assert_eq!(engine.prune_delivered().unwrap(), 1);
    }

    #[test]
    fn failures_accumulate_until_stuck() {
        let mut engine = engine(2);
        let item = complete(&mut engine, "D1");

        let failed = engine.record_failure(item.id, "connection refused").unwrap();
        assert_eq!(failed.retries, 1);
        assert_eq!(engine.dequeue_all().unwrap().len(), 1);

        engine.record_failure(item.id, "connection reset").unwrap();
        assert!(engine.dequeue_all().unwrap().is_empty());

        let stats = engine.queue_stats().unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.stuck, 1);
        assert_eq!(stats.deliverable(), 0);
        assert_eq!(stats.oldest_error.as_deref(), Some("connection reset"));

        engine.requeue(item.id).unwrap();
        assert_eq!(engine.dequeue_all().unwrap()[0].retries, 0);
    }

    #[test]
    fn record_failure_on_unknown_item() {
        let mut engine = engine(2);
        let err = engine.record_failure(QueueItemId::new(), "boom").unwrap_err();
        assert!(matches!(err, EngineError::QueueItemNotFound(_)));
    }

    #[test]
    fn discard_removes_item() {
        let mut engine = engine(2);
        let item = complete(&mut engine, "D1");
        assert!(engine.discard(item.id).unwrap());
        assert!(!engine.discard(item.id).unwrap());
        assert_eq!(engine.queue_stats().unwrap(), QueueStats::default());
    }
}
