//! Volatile extraction and page OCR cache in front of the durable index.
//!
//! Reads check the in-memory maps first and fall back to the [`PageStore`];
//! a durable hit is promoted into memory. Writes go to both tiers. Failures of
//! the durable tier are logged and swallowed: the caller already holds a
//! valid value and the index is only a second copy.

use super::bounded::BoundedMap;
use parking_lot::Mutex;
use rmsync_core::{ContentType, ExtractionResult, PageStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct ExtractionEntry {
    result: ExtractionResult,
    has_ocr: bool,
    stored_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PageKey {
    doc_id: String,
    page: u32,
    backend: String,
}

#[derive(Debug, Clone)]
struct PageEntry {
    text: String,
    stored_at: Instant,
}

/// Size caps and freshness window of a [`ContentCache`].
#[derive(Debug, Clone, Copy)]
pub struct ContentCacheConfig {
    pub ttl: Duration,
    pub max_extractions: usize,
    pub max_pages: usize,
}

impl Default for ContentCacheConfig {
    fn default() -> Self {
        Self { ttl: Duration::from_secs(300), max_extractions: 50, max_pages: 200 }
    }
}

/// Write-through cache of extraction results and per-page OCR text.
pub struct ContentCache {
    extractions: Mutex<BoundedMap<String, ExtractionEntry>>,
    pages: Mutex<BoundedMap<PageKey, PageEntry>>,
    ttl: Duration,
    store: Option<Arc<dyn PageStore>>,
}

impl ContentCache {
    pub fn new(config: ContentCacheConfig, store: Option<Arc<dyn PageStore>>) -> Self {
        Self {
            extractions: Mutex::new(BoundedMap::new(config.max_extractions)),
            pages: Mutex::new(BoundedMap::new(config.max_pages)),
            ttl: config.ttl,
            store,
        }
    }

    fn is_fresh(&self, stored_at: Instant) -> bool {
        stored_at.elapsed() < self.ttl
    }

    /// Cached extraction result for a document.
    ///
    /// A result without OCR never satisfies a request that needs OCR. With a
    /// `backend`, only results produced by that backend match.
    pub fn get_ocr_result(&self, doc_id: &str, needs_ocr: bool, backend: Option<&str>) -> Option<ExtractionResult> {
        let mut extractions = self.extractions.lock();
        if !self.is_fresh(extractions.get(doc_id)?.stored_at) {
            extractions.remove(doc_id);
            return None;
        }

        let entry = extractions.get(doc_id)?;
        if needs_ocr && !entry.has_ocr {
            return None;
        }
        if let Some(backend) = backend
            && entry.result.ocr_backend.as_deref() != Some(backend)
        {
            return None;
        }
        Some(entry.result.clone())
    }

    /// Cache a document's extraction result and write it through.
    pub async fn cache_ocr_result(&self, doc_id: &str, result: ExtractionResult, has_ocr: bool) {
        let entry = ExtractionEntry { result: result.clone(), has_ocr, stored_at: Instant::now() };
        self.extractions.lock().insert(doc_id.to_string(), entry);

        if let Some(store) = &self.store
            && let Err(e) = store.save_extraction(doc_id, &result).await
        {
            tracing::warn!(doc_id, error = %e, "durable write of extraction result failed");
        }
    }

    /// OCR text of one page, from memory or the durable index.
    pub async fn get_page(&self, doc_id: &str, page: u32, backend: &str) -> Option<String> {
        let key = PageKey { doc_id: doc_id.to_string(), page, backend: backend.to_string() };

        {
            let mut pages = self.pages.lock();
            match pages.get(&key) {
                Some(entry) if self.is_fresh(entry.stored_at) => return Some(entry.text.clone()),
                Some(_) => {
                    pages.remove(&key);
                }
                None => {}
            }
        }

        let store = self.store.as_ref()?;
        match store.load_page_ocr(doc_id, page, Some(backend)).await {
            Ok(Some(text)) => {
                tracing::debug!(doc_id, page, "page OCR promoted from durable index");
                self.pages.lock().insert(key, PageEntry { text: text.clone(), stored_at: Instant::now() });
                Some(text)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(doc_id, page, error = %e, "durable read of page OCR failed");
                None
            }
        }
    }

    /// Cache one page's OCR text and write it through.
    pub async fn cache_page(&self, doc_id: &str, page: u32, backend: &str, text: &str) {
        let key = PageKey { doc_id: doc_id.to_string(), page, backend: backend.to_string() };
        self.pages.lock().insert(key, PageEntry { text: text.to_string(), stored_at: Instant::now() });

        if let Some(store) = &self.store
            && let Err(e) = store.save_page(doc_id, page, text, ContentType::Ocr, Some(backend)).await
        {
            tracing::warn!(doc_id, page, error = %e, "durable write of page OCR failed");
        }
    }

    /// Drop the in-memory entries of one document, or of all documents.
    pub fn clear(&self, doc_id: Option<&str>) {
        match doc_id {
            Some(doc_id) => {
                self.extractions.lock().remove(doc_id);
                self.pages.lock().retain(|key, _| key.doc_id != doc_id);
            }
            None => {
                self.extractions.lock().clear();
                self.pages.lock().clear();
            }
        }
    }

    pub fn extraction_count(&self) -> usize {
        self.extractions.lock().len()
    }

    pub fn page_count(&self) -> usize {
        self.pages.lock().len()
    }
}
