//! Durable tier seam used by the volatile content cache.

use super::DocumentIndex;
use crate::Error;
use crate::models::{ContentType, ExtractionResult};
use async_trait::async_trait;

/// Durable page storage behind the write-through content cache.
#[async_trait]
pub trait PageStore: Send + Sync {
    /// OCR text for a page produced by `backend` (or by an unrecorded backend).
    async fn load_page_ocr(&self, doc_id: &str, page: u32, backend: Option<&str>) -> Result<Option<String>, Error>;

    async fn save_page(
        &self, doc_id: &str, page: u32, content: &str, content_type: ContentType, backend: Option<&str>,
    ) -> Result<(), Error>;

    async fn save_extraction(&self, doc_id: &str, result: &ExtractionResult) -> Result<(), Error>;
}

#[async_trait]
impl PageStore for DocumentIndex {
    async fn load_page_ocr(&self, doc_id: &str, page: u32, backend: Option<&str>) -> Result<Option<String>, Error> {
        self.get_page_ocr(doc_id, page, backend).await
    }

    async fn save_page(
        &self, doc_id: &str, page: u32, content: &str, content_type: ContentType, backend: Option<&str>,
    ) -> Result<(), Error> {
        self.upsert_page(doc_id, page, content, content_type, backend).await
    }

    async fn save_extraction(&self, doc_id: &str, result: &ExtractionResult) -> Result<(), Error> {
        self.store_extraction_result(doc_id, result).await
    }
}
