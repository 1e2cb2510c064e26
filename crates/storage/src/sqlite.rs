use std::path::Path;

use rusqlite::{Connection, OptionalExtension, Row};

use floorsync_core::{
    hlc::Hlc,
    ids::*,
    model::{Document, DocumentStatus, DocumentType, Line, LineStatus, Priority},
    ActionPayload, SyncQueueItem,
};

use crate::error::StorageError;
use crate::schema::{tables, SYNC_QUEUE_TABLE};
use crate::traits::{QueueItemState, Storage, WriteBatch};

const DOCUMENT_COLUMNS: &str =
    "id, status, total_lines, completed_lines, priority, created_at, updated_at";
const LINE_COLUMNS: &str = "id, document_id, product_id, product_name, barcode, quantity_plan, quantity_fact, cell_id, reason_code, status, updated_at";
const QUEUE_COLUMNS: &str =
    "id, document_type, document_id, payload, enqueued_at, retries, last_error, synced";

/// Convert Vec<u8> to fixed-size array with proper error handling.
fn to_array<const N: usize>(v: Vec<u8>, label: &str) -> Result<[u8; N], StorageError> {
    v.try_into()
        .map_err(|_| StorageError::Serialization(format!("invalid {label} length")))
}

/// Map SQLite constraint failures to `ConstraintViolation` with some context;
/// everything else stays a raw SQLite error.
fn constraint_context(err: rusqlite::Error, context: impl FnOnce() -> String) -> StorageError {
    match err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
            StorageError::ConstraintViolation(context())
        }
        other => StorageError::Sqlite(other),
    }
}

fn collect_rows<T, P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    read: impl Fn(&Row<'_>) -> Result<T, StorageError>,
) -> Result<Vec<T>, StorageError> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(read(row)?);
    }
    Ok(out)
}

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn read_document(row: &Row<'_>, doc_type: DocumentType) -> Result<Document, StorageError> {
    let id: String = row.get(0)?;
    let status: String = row.get(1)?;
    let priority: Option<String> = row.get(4)?;
    let created_at: Vec<u8> = row.get(5)?;
    let updated_at: Vec<u8> = row.get(6)?;

    Ok(Document {
        id: DocumentId::from(id),
        doc_type,
        status: DocumentStatus::parse(&status)?,
        total_lines: row.get(2)?,
        completed_lines: row.get(3)?,
        priority: priority.as_deref().map(Priority::parse).transpose()?,
        created_at: Hlc::from_slice(&created_at)?,
        updated_at: Hlc::from_slice(&updated_at)?,
    })
}

fn read_line(row: &Row<'_>) -> Result<Line, StorageError> {
    let id: String = row.get(0)?;
    let document_id: String = row.get(1)?;
    let product_id: String = row.get(2)?;
    let cell_id: Option<String> = row.get(7)?;
    let status: String = row.get(9)?;
    let updated_at: Vec<u8> = row.get(10)?;

    Ok(Line {
        id: LineId::from(id),
        document_id: DocumentId::from(document_id),
        product_id: ProductId::from(product_id),
        product_name: row.get(3)?,
        barcode: row.get(4)?,
        quantity_plan: row.get(5)?,
        quantity_fact: row.get(6)?,
        cell_id: cell_id.map(CellId::from),
        reason_code: row.get(8)?,
        status: LineStatus::parse(&status)?,
        updated_at: Hlc::from_slice(&updated_at)?,
    })
}

fn read_queue_item(row: &Row<'_>) -> Result<SyncQueueItem, StorageError> {
    let id_bytes: Vec<u8> = row.get(0)?;
    let document_type: String = row.get(1)?;
    let document_id: String = row.get(2)?;
    let payload_bytes: Vec<u8> = row.get(3)?;
    let enqueued_at: Vec<u8> = row.get(4)?;

    Ok(SyncQueueItem {
        id: QueueItemId::from_bytes(to_array::<16>(id_bytes, "queue item id")?),
        document_type: DocumentType::parse(&document_type)?,
        document_id: DocumentId::from(document_id),
        payload: ActionPayload::from_msgpack(&payload_bytes)?,
        enqueued_at: Hlc::from_slice(&enqueued_at)?,
        retries: row.get(5)?,
        last_error: row.get(6)?,
        synced: row.get(7)?,
    })
}

// Upserts go through ON CONFLICT DO UPDATE rather than INSERT OR REPLACE:
// REPLACE deletes the old row first, which would cascade to the lines.
fn write_document(conn: &Connection, doc: &Document) -> Result<(), StorageError> {
    let t = tables(doc.doc_type);
    let sql = format!(
        "INSERT INTO {docs} ({DOCUMENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
            status = excluded.status,
            total_lines = excluded.total_lines,
            completed_lines = excluded.completed_lines,
            priority = excluded.priority,
            updated_at = excluded.updated_at",
        docs = t.documents,
    );
    conn.execute(
        &sql,
        rusqlite::params![
            doc.id.as_str(),
            doc.status.as_str(),
            doc.total_lines,
            doc.completed_lines,
            doc.priority.map(|p| p.as_str()),
            &doc.created_at.to_bytes()[..],
            &doc.updated_at.to_bytes()[..],
        ],
    )
    .map_err(|e| constraint_context(e, || format!("document {} rejected", doc.id)))?;
    Ok(())
}

// Plan quantity, product and parent are fixed once the line exists.
fn write_line(conn: &Connection, doc_type: DocumentType, line: &Line) -> Result<(), StorageError> {
    let t = tables(doc_type);
    let sql = format!(
        "INSERT INTO {lines} ({LINE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(id) DO UPDATE SET
            product_name = excluded.product_name,
            barcode = excluded.barcode,
            quantity_fact = excluded.quantity_fact,
            cell_id = excluded.cell_id,
            reason_code = excluded.reason_code,
            status = excluded.status,
            updated_at = excluded.updated_at",
        lines = t.lines,
    );
    conn.execute(
        &sql,
        rusqlite::params![
            line.id.as_str(),
            line.document_id.as_str(),
            line.product_id.as_str(),
            line.product_name,
            line.barcode,
            line.quantity_plan,
            line.quantity_fact,
            line.cell_id.as_ref().map(|c| c.as_str()),
            line.reason_code,
            line.status.as_str(),
            &line.updated_at.to_bytes()[..],
        ],
    )
    .map_err(|e| {
        constraint_context(e, || {
            format!(
                "line {} rejected (document {} must exist in {})",
                line.id, line.document_id, t.documents
            )
        })
    })?;
    Ok(())
}

fn write_queue_item(conn: &Connection, item: &SyncQueueItem) -> Result<(), StorageError> {
    let payload = item.payload.to_msgpack()?;
    conn.execute(
        "INSERT INTO sync_queue (id, document_type, document_id, action, payload, enqueued_at, retries, last_error, synced)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            item.id.as_bytes().as_slice(),
            item.document_type.as_str(),
            item.document_id.as_str(),
            item.payload.action_name(),
            payload,
            &item.enqueued_at.to_bytes()[..],
            item.retries,
            item.last_error,
            item.synced,
        ],
    )
    .map_err(|e| constraint_context(e, || format!("queue item {} rejected", item.id)))?;
    Ok(())
}

impl Storage for SqliteStorage {
    fn get_document(
        &self,
        doc_type: DocumentType,
        id: &DocumentId,
    ) -> Result<Option<Document>, StorageError> {
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM {docs} WHERE id = ?1",
            docs = tables(doc_type).documents
        );
        let mut docs = collect_rows(&self.conn, &sql, [id.as_str()], |row| {
            read_document(row, doc_type)
        })?;
        Ok(docs.pop())
    }

    fn put_document(&mut self, doc: &Document) -> Result<(), StorageError> {
        write_document(&self.conn, doc)
    }

    fn list_documents(&self, doc_type: DocumentType) -> Result<Vec<Document>, StorageError> {
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM {docs} ORDER BY created_at, id",
            docs = tables(doc_type).documents
        );
        collect_rows(&self.conn, &sql, [], |row| read_document(row, doc_type))
    }

    fn query_documents(
        &self,
        doc_type: DocumentType,
        predicate: &dyn Fn(&Document) -> bool,
    ) -> Result<Vec<Document>, StorageError> {
        let mut docs = self.list_documents(doc_type)?;
        docs.retain(|d| predicate(d));
        Ok(docs)
    }

    fn delete_document(
        &mut self,
        doc_type: DocumentType,
        id: &DocumentId,
    ) -> Result<bool, StorageError> {
        let sql = format!("DELETE FROM {docs} WHERE id = ?1", docs = tables(doc_type).documents);
        let changed = self.conn.execute(&sql, [id.as_str()])?;
        Ok(changed > 0)
    }

    fn get_line(&self, doc_type: DocumentType, id: &LineId) -> Result<Option<Line>, StorageError> {
        let sql = format!(
            "SELECT {LINE_COLUMNS} FROM {lines} WHERE id = ?1",
            lines = tables(doc_type).lines
        );
        let mut lines = collect_rows(&self.conn, &sql, [id.as_str()], read_line)?;
        Ok(lines.pop())
    }

    fn put_line(&mut self, doc_type: DocumentType, line: &Line) -> Result<(), StorageError> {
        write_line(&self.conn, doc_type, line)
    }

    fn lines_for_document(
        &self,
        doc_type: DocumentType,
        document_id: &DocumentId,
    ) -> Result<Vec<Line>, StorageError> {
        let sql = format!(
            "SELECT {LINE_COLUMNS} FROM {lines} WHERE document_id = ?1 ORDER BY rowid",
            lines = tables(doc_type).lines
        );
        collect_rows(&self.conn, &sql, [document_id.as_str()], read_line)
    }

    fn query_lines(
        &self,
        doc_type: DocumentType,
        predicate: &dyn Fn(&Line) -> bool,
    ) -> Result<Vec<Line>, StorageError> {
        let sql = format!(
            "SELECT {LINE_COLUMNS} FROM {lines} ORDER BY rowid",
            lines = tables(doc_type).lines
        );
        let mut lines = collect_rows(&self.conn, &sql, [], read_line)?;
        lines.retain(|l| predicate(l));
        Ok(lines)
    }

    fn delete_line(&mut self, doc_type: DocumentType, id: &LineId) -> Result<bool, StorageError> {
        let sql = format!("DELETE FROM {lines} WHERE id = ?1", lines = tables(doc_type).lines);
        let changed = self.conn.execute(&sql, [id.as_str()])?;
        Ok(changed > 0)
    }

    fn apply_batch(&mut self, batch: &WriteBatch) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        for doc in &batch.documents {
            write_document(&tx, doc)?;
        }
        for (doc_type, line) in &batch.lines {
            write_line(&tx, *doc_type, line)?;
        }
        for item in &batch.queue_items {
            write_queue_item(&tx, item)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn insert_queue_item(&mut self, item: &SyncQueueItem) -> Result<(), StorageError> {
        write_queue_item(&self.conn, item)
    }

    fn get_queue_item(&self, id: QueueItemId) -> Result<Option<SyncQueueItem>, StorageError> {
        let sql = format!("SELECT {QUEUE_COLUMNS} FROM {SYNC_QUEUE_TABLE} WHERE id = ?1");
        let mut items = collect_rows(
            &self.conn,
            &sql,
            [id.as_bytes().as_slice()],
            read_queue_item,
        )?;
        Ok(items.pop())
    }

    fn unsynced_queue_items(&self) -> Result<Vec<SyncQueueItem>, StorageError> {
        let sql = format!(
            "SELECT {QUEUE_COLUMNS} FROM {SYNC_QUEUE_TABLE} WHERE synced = 0 ORDER BY enqueued_at, id"
        );
        collect_rows(&self.conn, &sql, [], read_queue_item)
    }

    fn set_queue_item_state(
        &mut self,
        id: QueueItemId,
        state: &QueueItemState,
    ) -> Result<bool, StorageError> {
        let changed = self.conn.execute(
            "UPDATE sync_queue SET retries = ?1, last_error = ?2, synced = ?3 WHERE id = ?4",
            rusqlite::params![
                state.retries,
                state.last_error,
                state.synced,
                id.as_bytes().as_slice(),
            ],
        )?;
        Ok(changed > 0)
    }

    fn delete_queue_item(&mut self, id: QueueItemId) -> Result<bool, StorageError> {
        let changed = self
            .conn
            .execute("DELETE FROM sync_queue WHERE id = ?1", [id.as_bytes().as_slice()])?;
        Ok(changed > 0)
    }

    fn delete_synced_queue_items(&mut self) -> Result<u64, StorageError> {
        let changed = self.conn.execute("DELETE FROM sync_queue WHERE synced = 1", [])?;
        Ok(changed as u64)
    }

    fn count_unsynced_for_document(
        &self,
        doc_type: DocumentType,
        document_id: &DocumentId,
    ) -> Result<u64, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sync_queue WHERE synced = 0 AND document_type = ?1 AND document_id = ?2",
            rusqlite::params![doc_type.as_str(), document_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn latest_timestamp(&self) -> Result<Option<Hlc>, StorageError> {
        let mut parts = vec![format!("SELECT max(enqueued_at) AS ts FROM {SYNC_QUEUE_TABLE}")];
        for doc_type in DocumentType::ALL {
            let t = tables(doc_type);
            parts.push(format!("SELECT max(updated_at) AS ts FROM {}", t.documents));
            parts.push(format!("SELECT max(updated_at) AS ts FROM {}", t.lines));
        }
        let sql = format!("SELECT max(ts) FROM ({})", parts.join(" UNION ALL "));
        let bytes: Option<Vec<u8>> = self
            .conn
            .query_row(&sql, [], |row| row.get(0))
            .optional()?
            .flatten();
        bytes.map(|b| Hlc::from_slice(&b).map_err(StorageError::from)).transpose()
    }
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage").finish_non_exhaustive()
    }
}
