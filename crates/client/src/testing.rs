//! Fakes shared by the unit tests of this crate.

use crate::sync::{HttpTransport, Method, RawResponse, RemoteSource, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rmsync_core::{DocType, Document, Error, RemoteIndexEntry};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A request seen by [`ScriptedTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenRequest {
    pub method: Method,
    pub url: String,
    pub bearer: Option<String>,
}

/// Transport answering from per-URL response queues.
///
/// The last queued response for a URL is repeated; unknown URLs get a 404.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<RawResponse>>>,
    seen: Mutex<Vec<SeenRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, url: &str, status: u16, body: impl Into<Bytes>) {
        self.routes.lock().entry(url.to_string()).or_default().push_back(RawResponse::new(status, body));
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().clone()
    }

    pub fn count(&self, url: &str) -> usize {
        self.seen.lock().iter().filter(|r| r.url == url).count()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, method: Method, url: &str, bearer: Option<&str>) -> Result<RawResponse, TransportError> {
        self.seen.lock().push(SeenRequest { method, url: url.to_string(), bearer: bearer.map(str::to_string) });
        tokio::task::yield_now().await;

        let mut routes = self.routes.lock();
        let response = match routes.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        Ok(response.unwrap_or_else(|| RawResponse::new(404, "")))
    }
}

pub fn document(id: &str, name: &str, parent: &str, doc_type: DocType) -> Document {
    Document {
        id: id.to_string(),
        hash: format!("hash-{id}"),
        name: name.to_string(),
        doc_type,
        parent_id: parent.to_string(),
        deleted: false,
        pinned: false,
        last_modified: None,
        size_bytes: 0,
        component_files: Vec::new(),
        synced: true,
    }
}

/// In-memory collection with call counters.
pub struct FakeSource {
    pub root_hash: Mutex<String>,
    pub documents: Mutex<Vec<Document>>,
    pub root_hash_fails: Mutex<bool>,
    /// Number of calls to `fetch_documents` that fail before succeeding.
    pub batch_failures: AtomicUsize,
    pub root_hash_calls: AtomicUsize,
    pub root_index_calls: AtomicUsize,
    pub document_calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(root_hash: &str, documents: Vec<Document>) -> Arc<Self> {
        Arc::new(Self {
            root_hash: Mutex::new(root_hash.to_string()),
            documents: Mutex::new(documents),
            root_hash_fails: Mutex::new(false),
            batch_failures: AtomicUsize::new(0),
            root_hash_calls: AtomicUsize::new(0),
            root_index_calls: AtomicUsize::new(0),
            document_calls: AtomicUsize::new(0),
        })
    }

    pub fn set_root_hash(&self, hash: &str) {
        *self.root_hash.lock() = hash.to_string();
    }

    pub fn root_hash_calls(&self) -> usize {
        self.root_hash_calls.load(Ordering::SeqCst)
    }

    pub fn root_index_calls(&self) -> usize {
        self.root_index_calls.load(Ordering::SeqCst)
    }

    pub fn document_calls(&self) -> usize {
        self.document_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteSource for FakeSource {
    async fn fetch_root_hash(&self) -> Result<String, Error> {
        self.root_hash_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if *self.root_hash_fails.lock() {
            return Err(Error::Network("root hash lookup failed".into()));
        }
        Ok(self.root_hash.lock().clone())
    }

    async fn fetch_root_index(&self, _root_hash: &str) -> Result<Vec<RemoteIndexEntry>, Error> {
        self.root_index_calls.fetch_add(1, Ordering::SeqCst);
        let entries = self
            .documents
            .lock()
            .iter()
            .map(|d| RemoteIndexEntry {
                hash: d.hash.clone(),
                kind: "80000000".into(),
                id: d.id.clone(),
                subfile_count: 0,
                size_bytes: d.size_bytes,
            })
            .collect();
        Ok(entries)
    }

    async fn fetch_documents(&self, entries: &[RemoteIndexEntry]) -> Result<Vec<Document>, Error> {
        self.document_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self
            .batch_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::Network("batch failed".into()));
        }
        let documents = self.documents.lock();
        Ok(entries.iter().filter_map(|e| documents.iter().find(|d| d.id == e.id).cloned()).collect())
    }

    async fn fetch_blob(&self, hash: &str) -> Result<Bytes, Error> {
        Ok(Bytes::from(format!("blob {hash}")))
    }

    async fn download_document(&self, doc: &Document) -> Result<Vec<u8>, Error> {
        Ok(doc.id.as_bytes().to_vec())
    }
}
