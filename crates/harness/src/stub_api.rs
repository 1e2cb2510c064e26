use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use floorsync_core::{ids::*, model::DocumentType};
use floorsync_sync::{
    DocumentApi, ItemUpdate, RemoteDocument, RemoteDocumentSummary, RemoteDocumentType,
    RemoteError,
};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    DocumentTypes,
    ListDocuments(DocumentType),
    GetDocument(DocumentType, DocumentId),
    UpdateItem(LineId, ItemUpdate),
    Finish(DocumentType, DocumentId),
}

#[derive(Debug, Default)]
struct StubState {
    calls: Vec<ApiCall>,
    offline: bool,
    rejected_lines: HashSet<LineId>,
    unfetchable: HashSet<(DocumentType, String)>,
    documents: BTreeMap<(DocumentType, String), RemoteDocument>,
}

/// In-process Document API. Records every call, serves canned documents,
/// and fails on demand.
#[derive(Debug, Default)]
pub struct StubApi {
    state: Mutex<StubState>,
    gate: Option<Semaphore>,
    read_gate: Option<Semaphore>,
}

impl StubApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Write calls block until [`StubApi::release`] hands out permits.
    pub fn gated() -> Arc<Self> {
        Arc::new(Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        })
    }

    /// `get_document` blocks until [`StubApi::release_reads`] hands out
    /// permits. The call is logged before it blocks.
    pub fn gated_reads() -> Arc<Self> {
        Arc::new(Self {
            read_gate: Some(Semaphore::new(0)),
            ..Self::default()
        })
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn release_reads(&self, permits: usize) {
        if let Some(gate) = &self.read_gate {
            gate.add_permits(permits);
        }
    }

    /// Every call fails with a transport error while set.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Updates for this line come back as 422.
    pub fn reject_line(&self, line_id: impl Into<LineId>) {
        self.state.lock().rejected_lines.insert(line_id.into());
    }

    /// The document stays in listings but fetching it fails with 500.
    pub fn break_document(&self, doc_type: DocumentType, id: &str) {
        self.state.lock().unfetchable.insert((doc_type, id.to_string()));
    }

    pub fn serve(&self, doc_type: DocumentType, doc: RemoteDocument) {
        self.state
            .lock()
            .documents
            .insert((doc_type, doc.id.to_string()), doc);
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.state.lock().calls.clone()
    }

    /// Only the calls that carry a queued mutation.
    pub fn writes(&self) -> Vec<ApiCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, ApiCall::UpdateItem(..) | ApiCall::Finish(..)))
            .collect()
    }

    fn record(&self, call: ApiCall) -> Result<(), RemoteError> {
        let mut state = self.state.lock();
        state.calls.push(call);
        if state.offline {
            return Err(RemoteError::Transport("connection refused".into()));
        }
        Ok(())
    }

    async fn pass_gate(gate: &Option<Semaphore>) {
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
    }
}

#[async_trait]
impl DocumentApi for StubApi {
    async fn document_types(&self) -> Result<Vec<RemoteDocumentType>, RemoteError> {
        self.record(ApiCall::DocumentTypes)?;
        Ok(DocumentType::ALL
            .iter()
            .map(|t| RemoteDocumentType {
                code: t.as_str().to_string(),
                title: t.to_string(),
            })
            .collect())
    }

    async fn list_documents(
        &self,
        doc_type: DocumentType,
    ) -> Result<Vec<RemoteDocumentSummary>, RemoteError> {
        self.record(ApiCall::ListDocuments(doc_type))?;
        Ok(self
            .state
            .lock()
            .documents
            .iter()
            .filter(|((t, _), _)| *t == doc_type)
            .map(|(_, doc)| RemoteDocumentSummary {
                id: doc.id.clone(),
                status: None,
                priority: doc.priority.clone(),
            })
            .collect())
    }

    async fn get_document(
        &self,
        doc_type: DocumentType,
        id: &DocumentId,
    ) -> Result<RemoteDocument, RemoteError> {
        self.record(ApiCall::GetDocument(doc_type, id.clone()))?;
        Self::pass_gate(&self.read_gate).await;
        let state = self.state.lock();
        let key = (doc_type, id.to_string());
        if state.unfetchable.contains(&key) {
            return Err(RemoteError::Rejected {
                status: 500,
                body: "internal server error".into(),
            });
        }
        state
            .documents
            .get(&key)
            .cloned()
            .ok_or_else(|| RemoteError::Rejected {
                status: 404,
                body: format!("no document {id}"),
            })
    }

    async fn update_item_quantity(
        &self,
        line_id: &LineId,
        update: &ItemUpdate,
    ) -> Result<(), RemoteError> {
        Self::pass_gate(&self.gate).await;
        self.record(ApiCall::UpdateItem(line_id.clone(), update.clone()))?;
        if self.state.lock().rejected_lines.contains(line_id) {
            return Err(RemoteError::Rejected {
                status: 422,
                body: "quantity exceeds tolerance".into(),
            });
        }
        Ok(())
    }

    async fn finish_document(
        &self,
        doc_type: DocumentType,
        id: &DocumentId,
    ) -> Result<(), RemoteError> {
        Self::pass_gate(&self.gate).await;
        self.record(ApiCall::Finish(doc_type, id.clone()))
    }
}
