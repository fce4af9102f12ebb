//! Page rows and their full-text projection.
//!
//! Every write goes through [`write_page`], which replaces the page row and
//! its `pages_fts` entry together. Callers run it inside a transaction so the
//! projection can never hold a duplicate or orphaned entry for a key.

use super::DocumentIndex;
use crate::Error;
use crate::models::{ContentType, ExtractionResult};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension};

/// Default character budget for [`DocumentIndex::get_preview`].
pub const DEFAULT_PREVIEW_CHARS: usize = 200;

/// Page number under which document-level extraction results are stored.
pub const DOCUMENT_PAGE: u32 = 0;

const PRIORITY_ORDER: &str =
    "CASE content_type WHEN 'typed_text' THEN 0 WHEN 'highlight' THEN 1 ELSE 2 END";

/// A row of the `pages` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedPage {
    pub doc_id: String,
    pub page_number: u32,
    pub content_type: ContentType,
    pub content: String,
    pub ocr_backend: Option<String>,
    pub indexed_at: Option<String>,
}

/// Replace one page row and its full-text entry.
///
/// Inserts a stub document row first when the document is unknown, so page
/// writes never violate the foreign key.
pub(crate) fn write_page(
    conn: &rusqlite::Connection, doc_id: &str, page_number: u32, content: &str, content_type: ContentType,
    backend: Option<&str>, indexed_at: &str,
) -> rusqlite::Result<()> {
    conn.execute("INSERT OR IGNORE INTO documents (doc_id) VALUES (?1)", params![doc_id])?;

    let existing: Option<i64> = conn
        .query_row(
            "SELECT rowid FROM pages WHERE doc_id = ?1 AND page_number = ?2 AND content_type = ?3",
            params![doc_id, page_number, content_type.as_str()],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(rowid) = existing {
        conn.execute("DELETE FROM pages_fts WHERE rowid = ?1", params![rowid])?;
        conn.execute("DELETE FROM pages WHERE rowid = ?1", params![rowid])?;
    }

    conn.execute(
        "INSERT INTO pages (doc_id, page_number, content_type, content, ocr_backend, indexed_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![doc_id, page_number, content_type.as_str(), content, backend, indexed_at],
    )?;
    let rowid = conn.last_insert_rowid();
    conn.execute("INSERT INTO pages_fts (rowid, doc_id, content) VALUES (?1, ?2, ?3)", params![rowid, doc_id, content])?;

    Ok(())
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

impl DocumentIndex {
    /// Insert or replace a single page row and its full-text entry atomically.
    pub async fn upsert_page(
        &self, doc_id: &str, page_number: u32, content: &str, content_type: ContentType, backend: Option<&str>,
    ) -> Result<(), Error> {
        let doc_id = doc_id.to_string();
        let content = content.to_string();
        let backend = backend.map(str::to_string);
        let indexed_at = Utc::now().to_rfc3339();

        self.writer
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                write_page(&tx, &doc_id, page_number, &content, content_type, backend.as_deref(), &indexed_at)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Store every content category of an extraction result in one transaction.
    ///
    /// Categories are written as document-level rows ([`DOCUMENT_PAGE`]). A
    /// known page count is recorded on the document row.
    pub async fn store_extraction_result(&self, doc_id: &str, result: &ExtractionResult) -> Result<(), Error> {
        let doc_id = doc_id.to_string();
        let categories = result.categories();
        let page_count = result.pages;
        let indexed_at = Utc::now().to_rfc3339();

        self.writer
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                for (content_type, content, backend) in &categories {
                    write_page(&tx, &doc_id, DOCUMENT_PAGE, content, *content_type, backend.as_deref(), &indexed_at)?;
                }
                if page_count.is_some() {
                    tx.execute(
                        "INSERT INTO documents (doc_id, page_count) VALUES (?1, ?2)
                        ON CONFLICT(doc_id) DO UPDATE SET page_count = excluded.page_count",
                        params![doc_id, page_count],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Best row for a page, in preview priority order.
    pub async fn get_page(&self, doc_id: &str, page_number: u32) -> Result<Option<IndexedPage>, Error> {
        let doc_id = doc_id.to_string();
        self.reader
            .call(move |conn| -> Result<Option<IndexedPage>, Error> {
                let row = conn
                    .query_row(
                        &format!(
                            "SELECT doc_id, page_number, content_type, COALESCE(content, ''), ocr_backend, indexed_at
                            FROM pages WHERE doc_id = ?1 AND page_number = ?2
                            ORDER BY {PRIORITY_ORDER} LIMIT 1"
                        ),
                        params![doc_id, page_number],
                        |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, u32>(1)?,
                                row.get::<_, String>(2)?,
                                row.get::<_, String>(3)?,
                                row.get::<_, Option<String>>(4)?,
                                row.get::<_, Option<String>>(5)?,
                            ))
                        },
                    )
                    .optional()?;

                row.map(|(doc_id, page_number, content_type, content, ocr_backend, indexed_at)| {
                    Ok(IndexedPage {
                        doc_id,
                        page_number,
                        content_type: content_type.parse()?,
                        content,
                        ocr_backend,
                        indexed_at,
                    })
                })
                .transpose()
            })
            .await
            .map_err(Error::from)
    }

    /// OCR text of a page.
    ///
    /// With a backend, rows produced by that backend or with no recorded
    /// backend match, the former preferred.
    pub async fn get_page_ocr(
        &self, doc_id: &str, page_number: u32, backend: Option<&str>,
    ) -> Result<Option<String>, Error> {
        let doc_id = doc_id.to_string();
        let backend = backend.map(str::to_string);
        self.reader
            .call(move |conn| -> Result<Option<String>, Error> {
                let content = conn
                    .query_row(
                        "SELECT content FROM pages
                        WHERE doc_id = ?1 AND page_number = ?2 AND content_type = 'ocr'
                        AND (?3 IS NULL OR ocr_backend = ?3 OR ocr_backend IS NULL)
                        ORDER BY ocr_backend IS NULL LIMIT 1",
                        params![doc_id, page_number, backend],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(content)
            })
            .await
            .map_err(Error::from)
    }

    /// First available content of a document, truncated to `max_chars`.
    ///
    /// Typed text wins over highlights, which win over OCR.
    pub async fn get_preview(&self, doc_id: &str, max_chars: Option<usize>) -> Result<Option<String>, Error> {
        let doc_id = doc_id.to_string();
        let max_chars = max_chars.unwrap_or(DEFAULT_PREVIEW_CHARS);
        self.reader
            .call(move |conn| -> Result<Option<String>, Error> {
                let content: Option<String> = conn
                    .query_row(
                        &format!(
                            "SELECT content FROM pages
                            WHERE doc_id = ?1 AND content IS NOT NULL AND content != ''
                            ORDER BY {PRIORITY_ORDER}, page_number LIMIT 1"
                        ),
                        params![doc_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(content.map(|text| truncate_chars(&text, max_chars)))
            })
            .await
            .map_err(Error::from)
    }

    /// All page content of a document in page order, truncated to `max_chars`.
    pub async fn get_content_snippet(&self, doc_id: &str, max_chars: usize) -> Result<Option<String>, Error> {
        let doc_id = doc_id.to_string();
        self.reader
            .call(move |conn| -> Result<Option<String>, Error> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT content FROM pages
                    WHERE doc_id = ?1 AND content IS NOT NULL AND content != ''
                    ORDER BY page_number, {PRIORITY_ORDER}"
                ))?;
                let parts = stmt
                    .query_map(params![doc_id], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;

                if parts.is_empty() {
                    return Ok(None);
                }
                Ok(Some(truncate_chars(&parts.join("\n\n"), max_chars)))
            })
            .await
            .map_err(Error::from)
    }
}
