use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::hlc::Hlc;
use crate::ids::{CellId, DocumentId, LineId, QueueItemId};
use crate::model::{DocumentType, Line};

/// One remote operation. Paired with a [`DocumentType`] on the queue item, the
/// variant fully determines which remote call a drain dispatches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data")]
pub enum ActionPayload {
    /// Full snapshot of the line's mutable state, so re-delivery is harmless.
    #[serde(rename = "update_line", rename_all = "camelCase")]
    UpdateLine {
        line_id: LineId,
        quantity_fact: u32,
        cell_id: Option<CellId>,
        reason_code: Option<String>,
    },
    #[serde(rename = "complete_doc", rename_all = "camelCase")]
    CompleteDocument {
        completed_lines: u32,
        total_lines: u32,
    },
}

impl ActionPayload {
    pub fn update_line(line: &Line) -> Self {
        Self::UpdateLine {
            line_id: line.id.clone(),
            quantity_fact: line.quantity_fact,
            cell_id: line.cell_id.clone(),
            reason_code: line.reason_code.clone(),
        }
    }

    pub fn action_name(&self) -> &'static str {
        match self {
            Self::UpdateLine { .. } => "update_line",
            Self::CompleteDocument { .. } => "complete_doc",
        }
    }

    pub fn line_id(&self) -> Option<&LineId> {
        match self {
            Self::UpdateLine { line_id, .. } => Some(line_id),
            Self::CompleteDocument { .. } => None,
        }
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, CoreError> {
        rmp_serde::to_vec_named(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, CoreError> {
        rmp_serde::from_slice(bytes).map_err(|e| CoreError::Serialization(e.to_string()))
    }
}

/// An outstanding mutation awaiting delivery. Immutable after creation except
/// for `retries`, `last_error` and `synced`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueItem {
    pub id: QueueItemId,
    #[serde(rename = "type")]
    pub document_type: DocumentType,
    pub document_id: DocumentId,
    #[serde(flatten)]
    pub payload: ActionPayload,
    #[serde(rename = "timestamp")]
    pub enqueued_at: Hlc,
    pub retries: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_error: Option<String>,
    #[serde(skip)]
    pub synced: bool,
}

impl SyncQueueItem {
    pub fn new(
        document_type: DocumentType,
        document_id: DocumentId,
        payload: ActionPayload,
        enqueued_at: Hlc,
    ) -> Self {
        Self {
            id: QueueItemId::new(),
            document_type,
            document_id,
            payload,
            enqueued_at,
            retries: 0,
            last_error: None,
            synced: false,
        }
    }

    /// Stuck items stay in the queue but are skipped by drains.
    pub fn is_stuck(&self, max_retries: u32) -> bool {
        self.retries >= max_retries
    }
}
