//! Display order for work lists: a coarse status bucket first, then a
//! priority tier inside the buckets that use one. Every comparison goes
//! through a key, so the pairwise comparator and `sort_by_key` always agree.

use std::cmp::Ordering;

use crate::model::{Document, DocumentType, Line, LineStatus, Priority};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatusBucket {
    Active = 0,
    Upcoming = 1,
    Priority = 2,
    Completed = 3,
}

impl StatusBucket {
    /// Fixed lookup over status labels; anything unrecognized is treated as
    /// carrying its own urgency.
    pub fn classify(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "in_progress" => Self::Active,
            "pending" | "draft" | "new" | "planned" | "waiting" => Self::Upcoming,
            "completed" | "synced" | "done" => Self::Completed,
            _ => Self::Priority,
        }
    }

    fn uses_priority(&self) -> bool {
        matches!(self, Self::Priority | Self::Completed)
    }
}

/// Priority rank in half steps: urgent 0, high 2, normal 4, absent 5, low 6.
/// An absent priority sits strictly between normal and low.
pub fn priority_rank(priority: Option<Priority>) -> u8 {
    match priority {
        Some(Priority::Urgent) => 0,
        Some(Priority::High) => 2,
        Some(Priority::Normal) => 4,
        None => 5,
        Some(Priority::Low) => 6,
    }
}

/// Anything that can be placed on a work list.
pub trait Rankable {
    fn status_label(&self) -> &str;
    fn priority(&self) -> Option<Priority>;
}

impl Rankable for Document {
    fn status_label(&self) -> &str {
        self.status.as_str()
    }

    fn priority(&self) -> Option<Priority> {
        self.priority
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderKey {
    pub bucket: StatusBucket,
    pub tier: u8,
}

pub fn sort_key<T: Rankable + ?Sized>(item: &T) -> OrderKey {
    let bucket = StatusBucket::classify(item.status_label());
    let tier = if bucket.uses_priority() {
        priority_rank(item.priority())
    } else {
        0
    };
    OrderKey { bucket, tier }
}

pub fn compare<T: Rankable + ?Sized>(a: &T, b: &T) -> Ordering {
    sort_key(a).cmp(&sort_key(b))
}

/// Stable: items with equal keys keep their input order.
pub fn sort_documents<T: Rankable>(items: &mut [T]) {
    items.sort_by_key(|item| sort_key(item));
}

/// Line categories used by the per-document-type ranking tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineCategory {
    InProgress,
    Completed,
    NotStarted,
    OverPlan,
}

impl LineCategory {
    pub fn of(line: &Line) -> Self {
        if line.quantity_fact == 0 {
            Self::NotStarted
        } else if line.is_over_plan() {
            Self::OverPlan
        } else if line.status == LineStatus::Completed {
            Self::Completed
        } else {
            Self::InProgress
        }
    }
}

/// Ranking table, best first.
pub fn line_ranking(doc_type: DocumentType) -> [LineCategory; 4] {
    use LineCategory::*;
    match doc_type {
        // over-shipment is an active error and outranks untouched lines
        DocumentType::Shipment => [InProgress, Completed, OverPlan, NotStarted],
        DocumentType::Receiving
        | DocumentType::Placement
        | DocumentType::Picking
        | DocumentType::Return
        | DocumentType::Inventory => [InProgress, Completed, NotStarted, OverPlan],
    }
}

pub fn line_sort_key(doc_type: DocumentType, line: &Line) -> u8 {
    let category = LineCategory::of(line);
    line_ranking(doc_type)
        .iter()
        .position(|c| *c == category)
        .map_or(u8::MAX, |p| p as u8)
}

pub fn compare_lines(doc_type: DocumentType, a: &Line, b: &Line) -> Ordering {
    line_sort_key(doc_type, a).cmp(&line_sort_key(doc_type, b))
}

pub fn sort_lines(doc_type: DocumentType, lines: &mut [Line]) {
    lines.sort_by_key(|line| line_sort_key(doc_type, line));
}
