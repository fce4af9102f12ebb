//! Document rows of the durable index.

use super::DocumentIndex;
use crate::Error;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension};

/// A row of the `documents` table.
///
/// On upsert, `None` fields keep whatever the stored row already has.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub doc_id: String,
    pub doc_hash: Option<String>,
    pub name: Option<String>,
    pub path: Option<String>,
    pub file_type: Option<String>,
    /// RFC 3339 timestamp of the last remote modification.
    pub modified_at: Option<String>,
    pub page_count: Option<u32>,
    /// Set by the index on every upsert; ignored on input.
    pub indexed_at: Option<String>,
}

impl DocumentRecord {
    pub fn new(doc_id: impl Into<String>) -> Self {
        Self { doc_id: doc_id.into(), ..Default::default() }
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.doc_hash = Some(hash.into());
        self
    }
}

/// Delete the full-text rows projected from a document's pages.
pub(crate) fn delete_document_fts(conn: &rusqlite::Connection, doc_id: &str) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM pages_fts WHERE rowid IN (SELECT rowid FROM pages WHERE doc_id = ?1)", params![doc_id])
}

/// Delete a document's pages together with their full-text rows.
pub(crate) fn delete_document_pages(conn: &rusqlite::Connection, doc_id: &str) -> rusqlite::Result<usize> {
    delete_document_fts(conn, doc_id)?;
    conn.execute("DELETE FROM pages WHERE doc_id = ?1", params![doc_id])
}

impl DocumentIndex {
    /// Insert or update a document row.
    ///
    /// Fields left as `None` are coalesced with the stored values, so a partial
    /// update never nulls out what an earlier write recorded.
    pub async fn upsert_document(&self, record: DocumentRecord) -> Result<(), Error> {
        let indexed_at = Utc::now().to_rfc3339();
        self.writer
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO documents
                        (doc_id, doc_hash, name, path, file_type, modified_at, page_count, indexed_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ON CONFLICT(doc_id) DO UPDATE SET
                        doc_hash = COALESCE(excluded.doc_hash, documents.doc_hash),
                        name = COALESCE(excluded.name, documents.name),
                        path = COALESCE(excluded.path, documents.path),
                        file_type = COALESCE(excluded.file_type, documents.file_type),
                        modified_at = COALESCE(excluded.modified_at, documents.modified_at),
                        page_count = COALESCE(excluded.page_count, documents.page_count),
                        indexed_at = excluded.indexed_at",
                    params![
                        record.doc_id,
                        record.doc_hash,
                        record.name,
                        record.path,
                        record.file_type,
                        record.modified_at,
                        record.page_count,
                        indexed_at
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Whether a document must be (re)indexed for `current_hash`.
    ///
    /// Unknown documents, and documents without a recorded hash, need indexing.
    /// On a hash mismatch the document's pages and their full-text rows are
    /// deleted in the same transaction before `true` is returned, so stale
    /// content is never served after the remote copy changed.
    pub async fn needs_reindex(&self, doc_id: &str, current_hash: &str) -> Result<bool, Error> {
        let doc_id = doc_id.to_string();
        let current_hash = current_hash.to_string();
        self.writer
            .call(move |conn| -> Result<bool, Error> {
                let tx = conn.transaction()?;
                let stored: Option<Option<String>> = tx
                    .query_row("SELECT doc_hash FROM documents WHERE doc_id = ?1", params![doc_id], |row| row.get(0))
                    .optional()?;

                let stale = match stored {
                    None | Some(None) => return Ok(true),
                    Some(Some(hash)) => hash != current_hash,
                };

                if stale {
                    let removed = delete_document_pages(&tx, &doc_id)?;
                    tx.commit()?;
                    tracing::debug!(doc_id = %doc_id, removed, "document hash changed, pages invalidated");
                }
                Ok(stale)
            })
            .await
            .map_err(Error::from)
    }

    /// Fetch a document row.
    pub async fn get_document(&self, doc_id: &str) -> Result<Option<DocumentRecord>, Error> {
        let doc_id = doc_id.to_string();
        self.reader
            .call(move |conn| -> Result<Option<DocumentRecord>, Error> {
                let record = conn
                    .query_row(
                        "SELECT doc_id, doc_hash, name, path, file_type, modified_at, page_count, indexed_at
                        FROM documents WHERE doc_id = ?1",
                        params![doc_id],
                        |row| {
                            Ok(DocumentRecord {
                                doc_id: row.get(0)?,
                                doc_hash: row.get(1)?,
                                name: row.get(2)?,
                                path: row.get(3)?,
                                file_type: row.get(4)?,
                                modified_at: row.get(5)?,
                                page_count: row.get(6)?,
                                indexed_at: row.get(7)?,
                            })
                        },
                    )
                    .optional()?;
                Ok(record)
            })
            .await
            .map_err(Error::from)
    }

    /// Stored content hash of a document, if any.
    pub async fn get_document_hash(&self, doc_id: &str) -> Result<Option<String>, Error> {
        Ok(self.get_document(doc_id).await?.and_then(|record| record.doc_hash))
    }

    /// Number of documents that have at least one indexed page.
    pub async fn indexed_document_count(&self) -> Result<u64, Error> {
        self.reader
            .call(|conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(DISTINCT doc_id) FROM pages", [], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Remove a document, its pages and their full-text rows.
    ///
    /// Returns whether a document row existed.
    pub async fn remove_document(&self, doc_id: &str) -> Result<bool, Error> {
        let doc_id = doc_id.to_string();
        self.writer
            .call(move |conn| -> Result<bool, Error> {
                let tx = conn.transaction()?;
                delete_document_pages(&tx, &doc_id)?;
                let removed = tx.execute("DELETE FROM documents WHERE doc_id = ?1", params![doc_id])?;
                tx.commit()?;
                Ok(removed > 0)
            })
            .await
            .map_err(Error::from)
    }
}
