//! Full-text search and index maintenance.

use super::DocumentIndex;
use super::schema::purge_content;
use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// Candidates fetched per requested result before de-duplication.
const OVERFETCH_FACTOR: usize = 5;

/// One document matching a search query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct SearchHit {
    pub doc_id: String,
    pub name: Option<String>,
    pub path: Option<String>,
    pub file_type: Option<String>,
    pub modified_at: Option<String>,
    /// Matched excerpt with terms wrapped in `>>>` / `<<<`.
    pub snippet: String,
    /// BM25 score of the best matching page; lower is more relevant.
    pub rank: f64,
}

/// Introspection counters for the durable index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub documents: u64,
    pub pages: u64,
    pub indexed_documents: u64,
    pub size_bytes: u64,
    pub location: String,
}

fn query_candidates(conn: &rusqlite::Connection, query: &str, limit: i64) -> rusqlite::Result<Vec<SearchHit>> {
    let mut stmt = conn.prepare(
        "SELECT p.doc_id, d.name, d.path, d.file_type, d.modified_at,
                snippet(pages_fts, 1, '>>>', '<<<', '...', 40), bm25(pages_fts)
        FROM pages_fts
        JOIN pages p ON p.rowid = pages_fts.rowid
        LEFT JOIN documents d ON d.doc_id = p.doc_id
        WHERE pages_fts MATCH ?1
        ORDER BY bm25(pages_fts)
        LIMIT ?2",
    )?;

    let rows = stmt.query_map(params![query, limit], |row| {
        Ok(SearchHit {
            doc_id: row.get(0)?,
            name: row.get(1)?,
            path: row.get(2)?,
            file_type: row.get(3)?,
            modified_at: row.get(4)?,
            snippet: row.get(5)?,
            rank: row.get(6)?,
        })
    })?;
    rows.collect()
}

/// Keep the first (best ranked) hit per document, up to `limit`.
fn dedup_by_document(candidates: Vec<SearchHit>, limit: usize) -> Vec<SearchHit> {
    let mut seen = HashSet::new();
    candidates.into_iter().filter(|hit| seen.insert(hit.doc_id.clone())).take(limit).collect()
}

impl DocumentIndex {
    /// Full-text search over page content.
    ///
    /// Returns at most `limit` hits, one per document, best first. Queries that
    /// FTS5 rejects as malformed produce an empty result instead of an error.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, Error> {
        let query = query.trim().to_string();
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let fetch_limit = i64::try_from(limit.saturating_mul(OVERFETCH_FACTOR)).unwrap_or(i64::MAX);
        self.reader
            .call(move |conn| -> Result<Vec<SearchHit>, Error> {
                match query_candidates(conn, &query, fetch_limit) {
                    Ok(candidates) => Ok(dedup_by_document(candidates, limit)),
                    Err(rusqlite::Error::SqliteFailure(err, msg)) => {
                        tracing::debug!(query = %query, code = ?err.code, msg = ?msg, "search query rejected");
                        Ok(Vec::new())
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Row counts and on-disk size of the index.
    pub async fn get_stats(&self) -> Result<IndexStats, Error> {
        let location = self.location();
        self.reader
            .call(move |conn| -> Result<IndexStats, Error> {
                let (documents, pages, indexed_documents): (i64, i64, i64) = conn.query_row(
                    "SELECT (SELECT COUNT(*) FROM documents),
                            (SELECT COUNT(*) FROM pages),
                            (SELECT COUNT(DISTINCT doc_id) FROM pages)",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )?;
                let size_bytes: i64 = conn.query_row(
                    "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
                    [],
                    |row| row.get(0),
                )?;

                Ok(IndexStats {
                    documents: documents as u64,
                    pages: pages as u64,
                    indexed_documents: indexed_documents as u64,
                    size_bytes: size_bytes as u64,
                    location,
                })
            })
            .await
            .map_err(Error::from)
    }

    /// Regenerate the full-text projection from the page rows.
    ///
    /// Page and document rows are left untouched. Returns the number of
    /// projected rows.
    pub async fn rebuild(&self) -> Result<u64, Error> {
        let projected = self
            .writer
            .call(|conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM pages_fts", [])?;
                let projected = tx.execute(
                    "INSERT INTO pages_fts (rowid, doc_id, content)
                    SELECT rowid, doc_id, COALESCE(content, '') FROM pages",
                    [],
                )?;
                tx.commit()?;
                Ok(projected as u64)
            })
            .await
            .map_err(Error::from)?;

        tracing::info!(projected, "full-text projection rebuilt");
        Ok(projected)
    }

    /// Delete every document, page and full-text row.
    pub async fn clear(&self) -> Result<(), Error> {
        self.writer
            .call(|conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                purge_content(&tx)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        tracing::info!(location = %self.location(), "document index cleared");
        Ok(())
    }
}
