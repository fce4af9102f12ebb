//! Database connection management with pragma configuration.
//!
//! This module handles opening the SQLite index, applying required pragmas
//! for performance and concurrency (WAL mode), and running schema setup.
//!
//! Each `tokio_rusqlite::Connection` owns its SQLite handle on a dedicated
//! thread; callers ship closures to it, so a handle is never shared across
//! threads. File-backed indexes open a second, read-only connection so
//! searches are not queued behind writes.

use super::schema;
use crate::Error;
use std::path::{Path, PathBuf};
use tokio_rusqlite::Connection;

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;
     PRAGMA foreign_keys=ON;
     PRAGMA busy_timeout=1500;";

/// Location string reported for in-memory indexes.
pub const IN_MEMORY: &str = ":memory:";

/// Durable document index handle.
///
/// Cheap to clone: clones share the same background connections.
#[derive(Clone, Debug)]
pub struct DocumentIndex {
    pub(crate) writer: Connection,
    pub(crate) reader: Connection,
    pub(crate) path: Option<PathBuf>,
}

async fn apply_pragmas(conn: &Connection, read_only: bool) -> Result<(), Error> {
    conn.call(move |conn| {
        conn.execute_batch(PRAGMAS)?;
        if read_only {
            conn.execute_batch("PRAGMA query_only=ON;")?;
        }
        Ok(())
    })
    .await
    .map_err(Error::Database)
}

impl DocumentIndex {
    /// Open an index at the specified path.
    ///
    /// Creates the file and its parent directory if they don't exist, applies
    /// performance pragmas, and runs schema setup (including the destructive
    /// version upgrade).
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        if path.as_os_str() == IN_MEMORY {
            return Self::open_in_memory().await;
        }

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::SchemaFailed(format!("cannot create {}: {e}", parent.display())))?;
        }

        let writer = Connection::open(&path).await.map_err(|e| Error::Database(e.into()))?;
        apply_pragmas(&writer, false).await?;
        schema::run(&writer).await?;

        let reader = Connection::open(&path).await.map_err(|e| Error::Database(e.into()))?;
        apply_pragmas(&reader, true).await?;

        tracing::info!(path = %path.display(), "document index opened");

        Ok(Self { writer, reader, path: Some(path) })
    }

    /// Open an in-memory index for testing.
    ///
    /// Creates a temporary in-memory SQLite database with the same
    /// pragma configuration as file-based databases. Reads and writes share
    /// one connection since a second one would see a different database.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let writer = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Database(e.into()))?;
        apply_pragmas(&writer, false).await?;
        schema::run(&writer).await?;

        Ok(Self { reader: writer.clone(), writer, path: None })
    }

    /// Path of the index file, or `:memory:`.
    pub fn location(&self) -> String {
        self.path.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| IN_MEMORY.to_string())
    }

    /// Close both connections, flushing the WAL.
    pub async fn close(self) -> Result<(), Error> {
        let Self { writer, reader, path } = self;
        if path.is_some() {
            reader.close().await.map_err(Error::Database)?;
        }
        writer.close().await.map_err(Error::Database)
    }
}
