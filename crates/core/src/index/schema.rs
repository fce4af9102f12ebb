//! Index schema setup and versioning.
//!
//! The schema is created idempotently with CREATE IF NOT EXISTS. A version
//! marker in `_meta` is compared to [`SCHEMA_VERSION`]; on any mismatch all
//! content is purged and the marker rewritten, so an index is never left with
//! an ambiguous schema.

use crate::Error;
use tokio_rusqlite::rusqlite::OptionalExtension;
use tokio_rusqlite::{Connection, params};

/// Schema version the code expects.
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA_SQL: &str = include_str!("../../migrations/001_index.sql");

/// What schema setup did to the opened index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaOutcome {
    /// Fresh index, marker written.
    Created,
    /// Stored version matched.
    Current,
    /// Stored version differed; content purged.
    Upgraded { from: i64 },
}

/// Delete every document, page and full-text row.
pub(crate) fn purge_content(conn: &tokio_rusqlite::rusqlite::Connection) -> Result<(), Error> {
    conn.execute("DELETE FROM pages_fts", [])?;
    conn.execute("DELETE FROM pages", [])?;
    conn.execute("DELETE FROM documents", [])?;
    Ok(())
}

/// Create the schema and reconcile the stored version marker.
///
/// # Errors
///
/// Returns an error if the schema SQL fails to execute or the marker cannot
/// be read or written.
pub async fn run(conn: &Connection) -> Result<SchemaOutcome, Error> {
    let outcome = conn
        .call(|conn| -> Result<SchemaOutcome, Error> {
            conn.execute_batch(SCHEMA_SQL).map_err(|e| Error::SchemaFailed(e.to_string()))?;

            let tx = conn.transaction()?;
            let stored: Option<String> = tx
                .query_row("SELECT value FROM _meta WHERE key = 'schema_version'", [], |row| row.get(0))
                .optional()?;

            let outcome = match stored.as_deref().map(str::parse::<i64>) {
                Some(Ok(version)) if version == SCHEMA_VERSION => SchemaOutcome::Current,
                None => SchemaOutcome::Created,
                Some(Ok(version)) => SchemaOutcome::Upgraded { from: version },
                Some(Err(_)) => SchemaOutcome::Upgraded { from: 0 },
            };

            if outcome != SchemaOutcome::Current {
                purge_content(&tx)?;
                tx.execute(
                    "INSERT OR REPLACE INTO _meta (key, value) VALUES ('schema_version', ?1)",
                    params![SCHEMA_VERSION.to_string()],
                )?;
            }
            tx.commit()?;

            Ok(outcome)
        })
        .await
        .map_err(Error::from)?;

    if let SchemaOutcome::Upgraded { from } = outcome {
        tracing::info!(from, to = SCHEMA_VERSION, "index schema version changed, content purged");
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn stored_version(conn: &Connection) -> String {
        conn.call(|conn| conn.query_row("SELECT value FROM _meta WHERE key = 'schema_version'", [], |row| row.get(0)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_schema_idempotent() {
        let conn = Connection::open_in_memory().await.unwrap();
        assert_eq!(run(&conn).await.unwrap(), SchemaOutcome::Created);
        assert_eq!(run(&conn).await.unwrap(), SchemaOutcome::Current);

        let has_fts: bool = conn
            .call(|conn| {
                conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE name='pages_fts')",
                    [],
                    |row| row.get(0),
                )
            })
            .await
            .unwrap();

        assert!(has_fts);
        assert_eq!(stored_version(&conn).await, SCHEMA_VERSION.to_string());
    }

    #[tokio::test]
    async fn test_version_mismatch_purges_content() {
        let conn = Connection::open_in_memory().await.unwrap();
        run(&conn).await.unwrap();

        conn.call(|conn| {
            conn.execute_batch(
                "INSERT INTO documents (doc_id, doc_hash) VALUES ('doc-1', 'h1');
                 INSERT INTO pages (doc_id, page_number, content_type, content) VALUES ('doc-1', 0, 'ocr', 'x');
                 INSERT INTO pages_fts (rowid, doc_id, content) VALUES (1, 'doc-1', 'x');
                 UPDATE _meta SET value = '0' WHERE key = 'schema_version';",
            )
        })
        .await
        .unwrap();

        assert_eq!(run(&conn).await.unwrap(), SchemaOutcome::Upgraded { from: 0 });

        let counts: (i64, i64, i64) = conn
            .call(|conn| {
                conn.query_row(
                    "SELECT (SELECT COUNT(*) FROM documents), (SELECT COUNT(*) FROM pages),
                            (SELECT COUNT(*) FROM pages_fts)",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
            })
            .await
            .unwrap();
        assert_eq!(counts, (0, 0, 0));
        assert_eq!(stored_version(&conn).await, SCHEMA_VERSION.to_string());
    }
}
