use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::hlc::Hlc;
use crate::ids::{CellId, DocumentId, LineId, ProductId};
use crate::status;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Receiving,
    Placement,
    Picking,
    Shipment,
    Return,
    Inventory,
}

impl DocumentType {
    pub const ALL: [DocumentType; 6] = [
        Self::Receiving,
        Self::Placement,
        Self::Picking,
        Self::Shipment,
        Self::Return,
        Self::Inventory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Receiving => "receiving",
            Self::Placement => "placement",
            Self::Picking => "picking",
            Self::Shipment => "shipment",
            Self::Return => "return",
            Self::Inventory => "inventory",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoreError::UnknownDocumentType(s.to_string()))
    }

    /// Lines of this type must name a cell before they can count as completed.
    pub fn requires_cell(&self) -> bool {
        matches!(self, Self::Placement | Self::Picking)
    }

    /// Lines of this type must carry a reason code (returns and write-offs).
    pub fn requires_reason(&self) -> bool {
        matches!(self, Self::Return)
    }

    /// Over-quantity is an error state rather than a completed one.
    pub fn flags_over_quantity(&self) -> bool {
        matches!(self, Self::Shipment)
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    New,
    InProgress,
    Completed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "new" => Ok(Self::New),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            other => Err(CoreError::UnknownVariant {
                kind: "document status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Urgent,
    High,
    Normal,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Urgent => "urgent",
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "urgent" => Ok(Self::Urgent),
            "high" => Ok(Self::High),
            "normal" => Ok(Self::Normal),
            "low" => Ok(Self::Low),
            other => Err(CoreError::UnknownVariant {
                kind: "priority",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineStatus {
    Pending,
    Partial,
    Completed,
    Error,
}

impl LineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Partial => "partial",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "pending" => Ok(Self::Pending),
            "partial" => Ok(Self::Partial),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            other => Err(CoreError::UnknownVariant {
                kind: "line status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: DocumentId,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub status: DocumentStatus,
    pub total_lines: u32,
    pub completed_lines: u32,
    pub priority: Option<Priority>,
    pub created_at: Hlc,
    pub updated_at: Hlc,
}

impl Document {
    pub fn new(id: DocumentId, doc_type: DocumentType, priority: Option<Priority>, now: Hlc) -> Self {
        Self {
            id,
            doc_type,
            status: DocumentStatus::New,
            total_lines: 0,
            completed_lines: 0,
            priority,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == DocumentStatus::Completed
    }

    /// Recount line totals and bump `updated_at`. A `new` document moves to
    /// `in_progress` once any line has a recorded quantity; completion is
    /// never inferred.
    pub fn recompute(&mut self, lines: &[Line], now: Hlc) {
        self.total_lines = lines.len() as u32;
        self.completed_lines = lines
            .iter()
            .filter(|l| l.status == LineStatus::Completed)
            .count() as u32;
        if self.status == DocumentStatus::New && lines.iter().any(|l| l.quantity_fact > 0) {
            self.status = DocumentStatus::InProgress;
        }
        self.touch(now);
    }

    pub fn touch(&mut self, now: Hlc) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Line {
    pub id: LineId,
    pub document_id: DocumentId,
    pub product_id: ProductId,
    pub product_name: String,
    pub barcode: String,
    pub quantity_plan: u32,
    pub quantity_fact: u32,
    pub cell_id: Option<CellId>,
    pub reason_code: Option<String>,
    pub status: LineStatus,
    pub updated_at: Hlc,
}

impl Line {
    /// Re-derive `status` from quantities. Callers never assign it directly.
    pub fn refresh_status(&mut self, doc_type: DocumentType) {
        self.status = status::derive_line_status(doc_type, self);
    }

    pub fn is_over_plan(&self) -> bool {
        self.quantity_fact > self.quantity_plan
    }
}

/// Line content as supplied when a document is accepted or pulled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLine {
    pub id: LineId,
    pub product_id: ProductId,
    pub product_name: String,
    pub barcode: String,
    pub quantity_plan: u32,
    pub quantity_fact: u32,
    pub cell_id: Option<CellId>,
}

impl NewLine {
    pub fn into_line(self, doc_type: DocumentType, document_id: DocumentId, now: Hlc) -> Line {
        let mut line = Line {
            id: self.id,
            document_id,
            product_id: self.product_id,
            product_name: self.product_name,
            barcode: self.barcode,
            quantity_plan: self.quantity_plan,
            quantity_fact: self.quantity_fact,
            cell_id: self.cell_id,
            reason_code: None,
            status: LineStatus::Pending,
            updated_at: now,
        };
        line.refresh_status(doc_type);
        line
    }
}
