//! Durable document index backed by SQLite with FTS5.
//!
//! Stores document rows, per-page extracted content, and a full-text
//! projection over that content. Survives restarts; a schema version change
//! purges content instead of migrating it.

pub mod connection;
pub mod documents;
pub mod pages;
pub mod schema;
pub mod search;
pub mod store;

pub use connection::{DocumentIndex, IN_MEMORY};
pub use documents::DocumentRecord;
pub use pages::{DEFAULT_PREVIEW_CHARS, DOCUMENT_PAGE, IndexedPage};
pub use schema::{SCHEMA_VERSION, SchemaOutcome};
pub use search::{IndexStats, SearchHit};
pub use store::PageStore;
