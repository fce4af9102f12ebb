//! Volatile caches.
//!
//! [`CollectionCache`] holds the collection listing; [`ContentCache`] holds
//! extraction and OCR results and writes them through to the durable index.

pub mod bounded;
pub mod collection;
pub mod content;

pub use bounded::BoundedMap;
pub use collection::CollectionCache;
pub use content::{ContentCache, ContentCacheConfig};
