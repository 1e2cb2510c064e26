use floorsync_core::{
    hlc::Hlc,
    ids::*,
    model::{Document, DocumentType, Line},
    SyncQueueItem,
};

use crate::error::StorageError;

/// The mutable delivery state of a queue item. Everything else on the item is
/// fixed at enqueue time, so this is the only partial update the store offers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItemState {
    pub retries: u32,
    pub last_error: Option<String>,
    pub synced: bool,
}

/// Writes applied in one transaction: documents, then lines, then queue items.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub documents: Vec<Document>,
    pub lines: Vec<(DocumentType, Line)>,
    pub queue_items: Vec<SyncQueueItem>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document(mut self, doc: Document) -> Self {
        self.documents.push(doc);
        self
    }

    pub fn line(mut self, doc_type: DocumentType, line: Line) -> Self {
        self.lines.push((doc_type, line));
        self
    }

    pub fn lines(mut self, doc_type: DocumentType, lines: impl IntoIterator<Item = Line>) -> Self {
        self.lines.extend(lines.into_iter().map(|l| (doc_type, l)));
        self
    }

    pub fn queue_item(mut self, item: SyncQueueItem) -> Self {
        self.queue_items.push(item);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.lines.is_empty() && self.queue_items.is_empty()
    }
}

/// Keyed local storage. Every `put_*` is a full-entity upsert; the one partial
/// update is [`Storage::set_queue_item_state`].
pub trait Storage {
    fn get_document(
        &self,
        doc_type: DocumentType,
        id: &DocumentId,
    ) -> Result<Option<Document>, StorageError>;

    fn put_document(&mut self, doc: &Document) -> Result<(), StorageError>;

    fn list_documents(&self, doc_type: DocumentType) -> Result<Vec<Document>, StorageError>;

    fn query_documents(
        &self,
        doc_type: DocumentType,
        predicate: &dyn Fn(&Document) -> bool,
    ) -> Result<Vec<Document>, StorageError>;

    /// Removes the document and, by cascade, its lines.
    fn delete_document(
        &mut self,
        doc_type: DocumentType,
        id: &DocumentId,
    ) -> Result<bool, StorageError>;

    fn get_line(&self, doc_type: DocumentType, id: &LineId) -> Result<Option<Line>, StorageError>;

    /// Fails with `ConstraintViolation` if the parent document does not exist.
    fn put_line(&mut self, doc_type: DocumentType, line: &Line) -> Result<(), StorageError>;

    /// Lines in insertion order.
    fn lines_for_document(
        &self,
        doc_type: DocumentType,
        document_id: &DocumentId,
    ) -> Result<Vec<Line>, StorageError>;

    fn query_lines(
        &self,
        doc_type: DocumentType,
        predicate: &dyn Fn(&Line) -> bool,
    ) -> Result<Vec<Line>, StorageError>;

    fn delete_line(&mut self, doc_type: DocumentType, id: &LineId) -> Result<bool, StorageError>;

    fn apply_batch(&mut self, batch: &WriteBatch) -> Result<(), StorageError>;

    fn insert_queue_item(&mut self, item: &SyncQueueItem) -> Result<(), StorageError>;

    fn get_queue_item(&self, id: QueueItemId) -> Result<Option<SyncQueueItem>, StorageError>;

    /// Unsynced items in enqueue order.
    fn unsynced_queue_items(&self) -> Result<Vec<SyncQueueItem>, StorageError>;

    fn set_queue_item_state(
        &mut self,
        id: QueueItemId,
        state: &QueueItemState,
    ) -> Result<bool, StorageError>;

    fn delete_queue_item(&mut self, id: QueueItemId) -> Result<bool, StorageError>;

    fn delete_synced_queue_items(&mut self) -> Result<u64, StorageError>;

    fn count_unsynced_for_document(
        &self,
        doc_type: DocumentType,
        document_id: &DocumentId,
    ) -> Result<u64, StorageError>;

    /// Highest timestamp written anywhere, used to seed the clock on open.
    fn latest_timestamp(&self) -> Result<Option<Hlc>, StorageError>;
}
