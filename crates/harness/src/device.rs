use std::path::Path;
use std::sync::Arc;

use floorsync_core::{
    ids::*,
    model::{Document, DocumentType, NewLine, Priority},
};
use floorsync_engine::{Engine, EngineError, QueuePolicy};
use floorsync_storage::SqliteStorage;
use floorsync_sync::{engine_handle, DocumentApi, EngineHandle, SyncOrchestrator};
use parking_lot::MutexGuard;

/// Line `id` with a plan quantity and nothing scanned yet.
pub fn line(id: &str, plan: u32) -> NewLine {
    NewLine {
        id: LineId::from(id),
        product_id: ProductId::from(format!("P-{id}")),
        product_name: format!("Product {id}"),
        barcode: format!("46{:011}", plan),
        quantity_plan: plan,
        quantity_fact: 0,
        cell_id: None,
    }
}

/// One handheld: an engine over its own store.
pub struct TestDevice {
    pub handle: EngineHandle,
}

impl TestDevice {
    pub fn new() -> Result<Self, EngineError> {
        Self::with_policy(QueuePolicy::default())
    }

    pub fn with_max_retries(max_retries: u32) -> Result<Self, EngineError> {
        Self::with_policy(QueuePolicy { max_retries })
    }

    fn with_policy(policy: QueuePolicy) -> Result<Self, EngineError> {
        let storage = SqliteStorage::open_in_memory()?;
        Ok(Self {
            handle: engine_handle(Engine::new(storage, policy)?),
        })
    }

    /// File-backed device; reopening the same path resumes its state.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let storage = SqliteStorage::open(path)?;
        Ok(Self {
            handle: engine_handle(Engine::new(storage, QueuePolicy::default())?),
        })
    }

    pub fn engine(&self) -> MutexGuard<'_, Engine> {
        self.handle.lock()
    }

    /// Accept a document whose lines are `{id}-L1..` with the given plans.
    pub fn accept(
        &self,
        doc_type: DocumentType,
        id: &str,
        priority: Option<Priority>,
        plans: &[u32],
    ) -> Result<Document, EngineError> {
        let lines = plans
            .iter()
            .enumerate()
            .map(|(i, plan)| line(&format!("{id}-L{}", i + 1), *plan))
            .collect();
        self.engine()
            .create_document(doc_type, DocumentId::from(id), priority, lines)
    }

    pub fn orchestrator(&self, api: Arc<dyn DocumentApi>) -> SyncOrchestrator {
        SyncOrchestrator::new(Arc::clone(&self.handle), api)
    }
}
