use floorsync_core::{
    hlc::Hlc,
    ids::*,
    model::{Document, DocumentType, Line, NewLine, Priority},
    ordering,
    status::{self, CompletionCheck},
    ActionPayload, DocumentStatus, SyncQueueItem,
};
use floorsync_storage::{Storage, WriteBatch};
use tracing::{debug, info};

use crate::{Engine, EngineError};

/// A change to one line's operator-controlled fields. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineEdit {
    pub quantity_fact: Option<u32>,
    pub cell_id: Option<CellId>,
    pub reason_code: Option<String>,
}

impl LineEdit {
    pub fn quantity(fact: u32) -> Self {
        Self {
            quantity_fact: Some(fact),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.quantity_fact.is_none() && self.cell_id.is_none() && self.reason_code.is_none()
    }

    /// Later values win field by field.
    pub fn merge(&mut self, newer: LineEdit) {
        if newer.quantity_fact.is_some() {
            self.quantity_fact = newer.quantity_fact;
        }
        if newer.cell_id.is_some() {
            self.cell_id = newer.cell_id;
        }
        if newer.reason_code.is_some() {
            self.reason_code = newer.reason_code;
        }
    }
}

#[derive(Debug, Clone)]
pub struct LineUpdate {
    pub line: Line,
    pub document: Document,
    pub queue_item: SyncQueueItem,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub document: Document,
    pub check: CompletionCheck,
    pub queue_item: SyncQueueItem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Created,
    Updated,
    /// Local edits are still queued; the local copy stays authoritative.
    KeptLocalChanges,
    KeptCompleted,
}

/// Local state of a document taken just before its server copy is requested.
/// A copy fetched while local edits were unsent, or while the document moved,
/// may predate those edits and is not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchMarker {
    updated_at: Option<Hlc>,
    had_unsynced: bool,
}

fn not_found(doc_type: DocumentType, id: &DocumentId) -> EngineError {
    EngineError::DocumentNotFound {
        doc_type: doc_type.to_string(),
        id: id.to_string(),
    }
}

impl Engine {
    pub fn document(&self, doc_type: DocumentType, id: &DocumentId) -> Result<Document, EngineError> {
        self.storage
            .get_document(doc_type, id)?
            .ok_or_else(|| not_found(doc_type, id))
    }

    /// Documents of one type in work-list order.
    pub fn documents(&self, doc_type: DocumentType) -> Result<Vec<Document>, EngineError> {
        let mut docs = self.storage.list_documents(doc_type)?;
        ordering::sort_documents(&mut docs);
        Ok(docs)
    }

    /// Lines of a document in work-list order.
    pub fn lines(&self, doc_type: DocumentType, id: &DocumentId) -> Result<Vec<Line>, EngineError> {
        let mut lines = self.storage.lines_for_document(doc_type, id)?;
        ordering::sort_lines(doc_type, &mut lines);
        Ok(lines)
    }

    pub fn progress(&self, doc_type: DocumentType, id: &DocumentId) -> Result<f64, EngineError> {
        Ok(status::document_progress(&self.document(doc_type, id)?))
    }

    /// Store a newly accepted assignment. Nothing is queued: the document
    /// originates from the server.
    pub fn create_document(
        &mut self,
        doc_type: DocumentType,
        id: DocumentId,
        priority: Option<Priority>,
        lines: Vec<NewLine>,
    ) -> Result<Document, EngineError> {
        if self.storage.get_document(doc_type, &id)?.is_some() {
            return Err(EngineError::DocumentExists {
                doc_type: doc_type.to_string(),
                id: id.to_string(),
            });
        }
        let now = self.tick()?;
        let mut doc = Document::new(id, doc_type, priority, now);
        let lines: Vec<Line> = lines
            .into_iter()
            .map(|l| l.into_line(doc_type, doc.id.clone(), now))
            .collect();
        doc.recompute(&lines, now);
        self.storage
            .apply_batch(&WriteBatch::new().document(doc.clone()).lines(doc_type, lines))?;
        debug!(doc = %doc.id, %doc_type, lines = doc.total_lines, "created document");
        Ok(doc)
    }

    pub fn fetch_marker(
        &self,
        doc_type: DocumentType,
        id: &DocumentId,
    ) -> Result<FetchMarker, EngineError> {
        Ok(FetchMarker {
            updated_at: self.storage.get_document(doc_type, id)?.map(|d| d.updated_at),
            had_unsynced: self.storage.count_unsynced_for_document(doc_type, id)? > 0,
        })
    }

    /// Merge a server copy into the store. `marker` is the document's local
    /// state from before the copy was requested. Documents with queued local
    /// edits, edits since the marker, or a local completion are left
    /// untouched; plan quantities of known lines never change.
    pub fn ingest_remote_document(
        &mut self,
        doc_type: DocumentType,
        id: DocumentId,
        priority: Option<Priority>,
        remote_lines: Vec<NewLine>,
        marker: FetchMarker,
    ) -> Result<IngestOutcome, EngineError> {
        let Some(mut doc) = self.storage.get_document(doc_type, &id)? else {
            self.create_document(doc_type, id, priority, remote_lines)?;
            return Ok(IngestOutcome::Created);
        };
        if doc.is_completed() {
            return Ok(IngestOutcome::KeptCompleted);
        }
        if marker.had_unsynced
            || marker.updated_at != Some(doc.updated_at)
            || self.storage.count_unsynced_for_document(doc_type, &id)? > 0
        {
            debug!(doc = %id, %doc_type, "server copy may predate local edits, kept local");
            return Ok(IngestOutcome::KeptLocalChanges);
        }

        let now = self.tick()?;
        let mut lines = self.storage.lines_for_document(doc_type, &id)?;
        for remote in remote_lines {
            match lines.iter_mut().find(|l| l.id == remote.id) {
                Some(local) => {
                    local.product_name = remote.product_name;
                    local.barcode = remote.barcode;
                    local.quantity_fact = remote.quantity_fact;
                    if remote.cell_id.is_some() {
                        local.cell_id = remote.cell_id;
                    }
                    local.updated_at = now;
                    local.refresh_status(doc_type);
                }
                None => lines.push(remote.into_line(doc_type, id.clone(), now)),
            }
        }
        doc.priority = priority;
        doc.recompute(&lines, now);
        self.storage
            .apply_batch(&WriteBatch::new().document(doc).lines(doc_type, lines))?;
        Ok(IngestOutcome::Updated)
    }

    /// A scan adds `count` units to the line's fact quantity.
    pub fn record_scan(
        &mut self,
        doc_type: DocumentType,
        line_id: &LineId,
        count: u32,
    ) -> Result<LineUpdate, EngineError> {
        let line = self.require_line(doc_type, line_id)?;
        let fact = line
            .quantity_fact
            .checked_add(count)
            .ok_or_else(|| EngineError::InvalidQuantity {
                line_id: line_id.to_string(),
                reason: "quantity overflow".into(),
            })?;
        self.apply_line_edit(doc_type, line_id, LineEdit::quantity(fact))
    }

    /// Manual entry replaces the fact quantity outright.
    pub fn set_line_quantity(
        &mut self,
        doc_type: DocumentType,
        line_id: &LineId,
        quantity_fact: u32,
    ) -> Result<LineUpdate, EngineError> {
        self.apply_line_edit(doc_type, line_id, LineEdit::quantity(quantity_fact))
    }

    pub fn assign_cell(
        &mut self,
        doc_type: DocumentType,
        line_id: &LineId,
        cell_id: CellId,
    ) -> Result<LineUpdate, EngineError> {
        self.apply_line_edit(
            doc_type,
            line_id,
            LineEdit {
                cell_id: Some(cell_id),
                ..LineEdit::default()
            },
        )
    }

    pub fn set_reason_code(
        &mut self,
        doc_type: DocumentType,
        line_id: &LineId,
        reason_code: impl Into<String>,
    ) -> Result<LineUpdate, EngineError> {
        self.apply_line_edit(
            doc_type,
            line_id,
            LineEdit {
                reason_code: Some(reason_code.into()),
                ..LineEdit::default()
            },
        )
    }

    /// Apply an edit, re-derive line and document state, and queue exactly
    /// one `update_line` action, all in one transaction.
    pub fn apply_line_edit(
        &mut self,
        doc_type: DocumentType,
        line_id: &LineId,
        edit: LineEdit,
    ) -> Result<LineUpdate, EngineError> {
        let mut line = self.require_line(doc_type, line_id)?;
        let mut doc = self.document(doc_type, &line.document_id)?;
        if doc.is_completed() {
            return Err(EngineError::DocumentCompleted(doc.id.to_string()));
        }

        let now = self.tick()?;
        if let Some(fact) = edit.quantity_fact {
            line.quantity_fact = fact;
        }
        if let Some(cell_id) = edit.cell_id {
            line.cell_id = Some(cell_id);
        }
        if let Some(reason) = edit.reason_code {
            line.reason_code = Some(reason);
        }
        line.updated_at = now;
        line.refresh_status(doc_type);

        let mut lines = self.storage.lines_for_document(doc_type, &doc.id)?;
        for existing in lines.iter_mut().filter(|l| l.id == line.id) {
            *existing = line.clone();
        }
        doc.recompute(&lines, now);

        let queue_item = SyncQueueItem::new(
            doc_type,
            doc.id.clone(),
            ActionPayload::update_line(&line),
            now,
        );
        self.storage.apply_batch(
            &WriteBatch::new()
                .document(doc.clone())
                .line(doc_type, line.clone())
                .queue_item(queue_item.clone()),
        )?;
        debug!(
            line = %line.id,
            fact = line.quantity_fact,
            status = line.status.as_str(),
            "line updated"
        );
        Ok(LineUpdate {
            line,
            document: doc,
            queue_item,
        })
    }

    /// Preview of what completing the document would sign off on.
    pub fn completion_check(
        &self,
        doc_type: DocumentType,
        id: &DocumentId,
    ) -> Result<CompletionCheck, EngineError> {
        self.document(doc_type, id)?;
        let lines = self.storage.lines_for_document(doc_type, id)?;
        Ok(status::can_complete(doc_type, &lines))
    }

    /// Explicit completion. Always allowed; discrepancies come back as warnings.
    pub fn complete_document(
        &mut self,
        doc_type: DocumentType,
        id: &DocumentId,
    ) -> Result<Completion, EngineError> {
        let mut doc = self.document(doc_type, id)?;
        if doc.is_completed() {
            return Err(EngineError::DocumentCompleted(doc.id.to_string()));
        }
        let lines = self.storage.lines_for_document(doc_type, id)?;
        let check = status::can_complete(doc_type, &lines);

        let now = self.tick()?;
        doc.recompute(&lines, now);
        doc.status = DocumentStatus::Completed;

        let queue_item = SyncQueueItem::new(
            doc_type,
            doc.id.clone(),
            ActionPayload::CompleteDocument {
                completed_lines: doc.completed_lines,
                total_lines: doc.total_lines,
            },
            now,
        );
        self.storage.apply_batch(
            &WriteBatch::new()
                .document(doc.clone())
                .queue_item(queue_item.clone()),
        )?;
        info!(
            doc = %doc.id,
            %doc_type,
            warnings = check.warnings.len(),
            "document completed"
        );
        Ok(Completion {
            document: doc,
            check,
            queue_item,
        })
    }

    fn require_line(&self, doc_type: DocumentType, line_id: &LineId) -> Result<Line, EngineError> {
        self.storage
            .get_line(doc_type, line_id)?
            .ok_or_else(|| EngineError::LineNotFound(line_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use floorsync_core::LineStatus;
    use floorsync_storage::SqliteStorage;

    use crate::QueuePolicy;

    fn engine() -> Engine {
        Engine::new(SqliteStorage::open_in_memory().unwrap(), QueuePolicy::default()).unwrap()
    }

    fn new_line(id: &str, plan: u32) -> NewLine {
        NewLine {
            id: LineId::from(id),
            product_id: ProductId::from(format!("P-{id}")),
            product_name: format!("Product {id}"),
            barcode: format!("2000000{id}"),
            quantity_plan: plan,
            quantity_fact: 0,
            cell_id: None,
        }
    }

    #[test]
    fn edit_merge_prefers_newer_fields() {
        let mut edit = LineEdit::quantity(3);
        edit.merge(LineEdit {
            cell_id: Some(CellId::from("B-2")),
            ..LineEdit::default()
        });
        edit.merge(LineEdit::quantity(5));
        assert_eq!(edit.quantity_fact, Some(5));
        assert_eq!(edit.cell_id, Some(CellId::from("B-2")));
        assert!(!edit.is_empty());
        assert!(LineEdit::default().is_empty());
    }

    #[test]
    fn scans_accumulate() {
        let mut engine = engine();
        let doc = engine
            .create_document(DocumentType::Inventory, DocumentId::from("INV-1"), None, vec![new_line("L1", 4)])
            .unwrap();
        engine.record_scan(DocumentType::Inventory, &LineId::from("L1"), 1).unwrap();
        let update = engine.record_scan(DocumentType::Inventory, &LineId::from("L1"), 2).unwrap();
        assert_eq!(update.line.quantity_fact, 3);
        assert_eq!(update.line.status, LineStatus::Partial);
        assert_eq!(update.document.id, doc.id);
        assert_eq!(engine.pending_items().unwrap().len(), 2);
    }

    #[test]
    fn duplicate_document_is_rejected() {
        let mut engine = engine();
        engine
            .create_document(DocumentType::Picking, DocumentId::from("PK-1"), None, vec![])
            .unwrap();
        let err = engine
            .create_document(DocumentType::Picking, DocumentId::from("PK-1"), None, vec![])
            .unwrap_err();
        assert!(matches!(err, EngineError::DocumentExists { .. }));
    }

    #[test]
    fn over_shipment_counts_as_not_completed() {
        let mut engine = engine();
        let id = DocumentId::from("SH-1");
        engine
            .create_document(DocumentType::Shipment, id.clone(), None, vec![new_line("L1", 2)])
            .unwrap();
        let update = engine
            .set_line_quantity(DocumentType::Shipment, &LineId::from("L1"), 3)
            .unwrap();
        assert_eq!(update.line.status, LineStatus::Error);
        assert_eq!(update.document.completed_lines, 0);
        assert_eq!(engine.progress(DocumentType::Shipment, &id).unwrap(), 0.0);
    }

    fn remote_fact(id: &str, plan: u32, fact: u32) -> NewLine {
        NewLine {
            quantity_fact: fact,
            ..new_line(id, plan)
        }
    }

    #[test]
    fn copy_fetched_before_delivery_is_not_applied() {
        let mut engine = engine();
        let id = DocumentId::from("RC-1");
        engine
            .create_document(DocumentType::Receiving, id.clone(), None, vec![new_line("L1", 10)])
            .unwrap();
        let scan = engine.record_scan(DocumentType::Receiving, &LineId::from("L1"), 6).unwrap();

        let marker = engine.fetch_marker(DocumentType::Receiving, &id).unwrap();
        assert!(engine.mark_delivered(scan.queue_item.id).unwrap());
        let outcome = engine
            .ingest_remote_document(DocumentType::Receiving, id.clone(), None, vec![remote_fact("L1", 10, 0)], marker)
            .unwrap();
        assert_eq!(outcome, IngestOutcome::KeptLocalChanges);
        assert_eq!(engine.lines(DocumentType::Receiving, &id).unwrap()[0].quantity_fact, 6);

        // A copy requested after delivery is trusted.
        let marker = engine.fetch_marker(DocumentType::Receiving, &id).unwrap();
        let outcome = engine
            .ingest_remote_document(DocumentType::Receiving, id.clone(), None, vec![remote_fact("L1", 10, 6)], marker)
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Updated);
    }

    #[test]
    fn edit_after_marker_keeps_local_copy() {
        let mut engine = engine();
        let id = DocumentId::from("PK-1");
        engine
            .create_document(DocumentType::Picking, id.clone(), None, vec![new_line("L1", 3)])
            .unwrap();

        let marker = engine.fetch_marker(DocumentType::Picking, &id).unwrap();
        let scan = engine.record_scan(DocumentType::Picking, &LineId::from("L1"), 2).unwrap();
        engine.mark_delivered(scan.queue_item.id).unwrap();
        let outcome = engine
            .ingest_remote_document(DocumentType::Picking, id.clone(), None, vec![remote_fact("L1", 3, 0)], marker)
            .unwrap();
        assert_eq!(outcome, IngestOutcome::KeptLocalChanges);
        assert_eq!(engine.lines(DocumentType::Picking, &id).unwrap()[0].quantity_fact, 2);
    }
}
