use floorsync_core::DocumentType;
use rusqlite::Connection;

use crate::error::StorageError;

pub const SCHEMA_VERSION: i32 = 1;

pub const SYNC_QUEUE_TABLE: &str = "sync_queue";

/// Table names for one document type. Every type gets a mirrored pair.
#[derive(Debug, Clone, Copy)]
pub struct TypeTables {
    pub documents: &'static str,
    pub lines: &'static str,
}

pub fn tables(doc_type: DocumentType) -> TypeTables {
    match doc_type {
        DocumentType::Receiving => TypeTables {
            documents: "receiving_documents",
            lines: "receiving_lines",
        },
        DocumentType::Placement => TypeTables {
            documents: "placement_documents",
            lines: "placement_lines",
        },
        DocumentType::Picking => TypeTables {
            documents: "picking_documents",
            lines: "picking_lines",
        },
        DocumentType::Shipment => TypeTables {
            documents: "shipment_documents",
            lines: "shipment_lines",
        },
        DocumentType::Return => TypeTables {
            documents: "return_documents",
            lines: "return_lines",
        },
        DocumentType::Inventory => TypeTables {
            documents: "inventory_documents",
            lines: "inventory_lines",
        },
    }
}

pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = FULL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
    ",
    )?;
    conn.execute_batch(BASE_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, unixepoch())",
        [SCHEMA_VERSION],
    )?;
    for doc_type in DocumentType::ALL {
        conn.execute_batch(&type_tables_sql(tables(doc_type)))?;
    }
    Ok(())
}

const BASE_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS sync_queue (
    rowid INTEGER PRIMARY KEY,
    id BLOB NOT NULL UNIQUE CHECK (length(id) = 16),
    document_type TEXT NOT NULL,
    document_id TEXT NOT NULL,
    action TEXT NOT NULL,
    payload BLOB NOT NULL,
    enqueued_at BLOB NOT NULL CHECK (length(enqueued_at) = 12),
    retries INTEGER NOT NULL DEFAULT 0 CHECK (retries >= 0),
    last_error TEXT,
    synced INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_sync_queue_synced ON sync_queue (synced, enqueued_at, id);
CREATE INDEX IF NOT EXISTS idx_sync_queue_document ON sync_queue (document_type, document_id) WHERE synced = 0;
";

fn type_tables_sql(t: TypeTables) -> String {
    format!(
        "
CREATE TABLE IF NOT EXISTS {docs} (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL CHECK (status IN ('new', 'in_progress', 'completed')),
    total_lines INTEGER NOT NULL CHECK (total_lines >= 0),
    completed_lines INTEGER NOT NULL CHECK (completed_lines >= 0),
    priority TEXT CHECK (priority IS NULL OR priority IN ('urgent', 'high', 'normal', 'low')),
    created_at BLOB NOT NULL CHECK (length(created_at) = 12),
    updated_at BLOB NOT NULL CHECK (length(updated_at) = 12)
);

CREATE TABLE IF NOT EXISTS {lines} (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES {docs} (id) ON DELETE CASCADE,
    product_id TEXT NOT NULL,
    product_name TEXT NOT NULL,
    barcode TEXT NOT NULL,
    quantity_plan INTEGER NOT NULL CHECK (quantity_plan >= 0),
    quantity_fact INTEGER NOT NULL CHECK (quantity_fact >= 0),
    cell_id TEXT,
    reason_code TEXT,
    status TEXT NOT NULL CHECK (status IN ('pending', 'partial', 'completed', 'error')),
    updated_at BLOB NOT NULL CHECK (length(updated_at) = 12)
);
CREATE INDEX IF NOT EXISTS idx_{lines}_document ON {lines} (document_id);
",
        docs = t.documents,
        lines = t.lines,
    )
}
