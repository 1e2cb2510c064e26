use floorsync_core::CoreError;
use floorsync_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("document not found: {doc_type}/{id}")]
    DocumentNotFound { doc_type: String, id: String },

    #[error("document already exists: {doc_type}/{id}")]
    DocumentExists { doc_type: String, id: String },

    #[error("document is completed and read-only: {0}")]
    DocumentCompleted(String),

    #[error("line not found: {0}")]
    LineNotFound(String),

    #[error("invalid quantity for line {line_id}: {reason}")]
    InvalidQuantity { line_id: String, reason: String },

    #[error("queue item not found: {0}")]
    QueueItemNotFound(String),
}
