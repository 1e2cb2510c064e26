//! Pure derivations from plan-vs-fact quantities. Every function here is
//! total over its input domain.

use std::fmt;

use crate::model::{Document, DocumentType, Line, LineStatus};

/// Classify a line by quantities alone. Over-quantity is `completed` except
/// for document types that treat it as an error (over-shipment).
pub fn line_status(doc_type: DocumentType, fact: u32, plan: u32) -> LineStatus {
    if fact == 0 {
        LineStatus::Pending
    } else if fact > plan && doc_type.flags_over_quantity() {
        LineStatus::Error
    } else if fact >= plan {
        LineStatus::Completed
    } else {
        LineStatus::Partial
    }
}

/// Full derivation for a stored line: quantities plus the cell requirement
/// of placement and picking flows.
pub fn derive_line_status(doc_type: DocumentType, line: &Line) -> LineStatus {
    match line_status(doc_type, line.quantity_fact, line.quantity_plan) {
        LineStatus::Completed if doc_type.requires_cell() && line.cell_id.is_none() => {
            LineStatus::Partial
        }
        status => status,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Discrepancy {
    Shortage,
    Surplus,
    Exact,
}

pub fn discrepancy_type(fact: u32, plan: u32) -> Discrepancy {
    match fact.cmp(&plan) {
        std::cmp::Ordering::Less => Discrepancy::Shortage,
        std::cmp::Ordering::Greater => Discrepancy::Surplus,
        std::cmp::Ordering::Equal => Discrepancy::Exact,
    }
}

/// Completed lines as a percentage in `[0, 100]`; zero for an empty document.
pub fn document_progress(doc: &Document) -> f64 {
    if doc.total_lines == 0 {
        return 0.0;
    }
    let pct = f64::from(doc.completed_lines) / f64::from(doc.total_lines) * 100.0;
    pct.clamp(0.0, 100.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionWarning {
    NotStarted(usize),
    Partial(usize),
    OverPlan(usize),
    UnderPlan(usize),
    MissingCell(usize),
    MissingReason(usize),
}

impl fmt::Display for CompletionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted(n) => write!(f, "{n} line(s) not started"),
            Self::Partial(n) => write!(f, "{n} line(s) partially processed"),
            Self::OverPlan(n) => write!(f, "{n} line(s) above plan"),
            Self::UnderPlan(n) => write!(f, "{n} line(s) below plan"),
            Self::MissingCell(n) => write!(f, "{n} line(s) without a cell"),
            Self::MissingReason(n) => write!(f, "{n} line(s) without a reason code"),
        }
    }
}

/// Operators may always force-complete; `warnings` tells them what they are
/// signing off on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionCheck {
    pub allowed: bool,
    pub warnings: Vec<CompletionWarning>,
}

impl CompletionCheck {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn messages(&self) -> Vec<String> {
        self.warnings.iter().map(ToString::to_string).collect()
    }
}

pub fn can_complete(doc_type: DocumentType, lines: &[Line]) -> CompletionCheck {
    let count = |pred: &dyn Fn(&Line) -> bool| lines.iter().filter(|l| pred(l)).count();

    let candidates = [
        CompletionWarning::NotStarted(count(&|l| l.quantity_fact == 0)),
        CompletionWarning::Partial(count(&|l| l.status == LineStatus::Partial)),
        CompletionWarning::OverPlan(count(&|l| {
            discrepancy_type(l.quantity_fact, l.quantity_plan) == Discrepancy::Surplus
        })),
        CompletionWarning::UnderPlan(count(&|l| {
            discrepancy_type(l.quantity_fact, l.quantity_plan) == Discrepancy::Shortage
        })),
        CompletionWarning::MissingCell(if doc_type.requires_cell() {
            count(&|l| l.quantity_fact > 0 && l.cell_id.is_none())
        } else {
            0
        }),
        CompletionWarning::MissingReason(if doc_type.requires_reason() {
            count(&|l| l.reason_code.as_deref().is_none_or(str::is_empty))
        } else {
            0
        }),
    ];

    let warnings = candidates
        .into_iter()
        .filter(|w| match *w {
            CompletionWarning::NotStarted(n)
            | CompletionWarning::Partial(n)
            | CompletionWarning::OverPlan(n)
            | CompletionWarning::UnderPlan(n)
            | CompletionWarning::MissingCell(n)
            | CompletionWarning::MissingReason(n) => n > 0,
        })
        .collect();

    CompletionCheck {
        allowed: true,
        warnings,
    }
}
