//! Remote sync protocol client.
//!
//! ### Protocol
//!
//! - **Root**: `GET {sync_host}/sync/v4/root` returns `{"hash": "..."}`, the
//!   content hash of the whole collection. Cheap; used to detect changes.
//! - **Files**: `GET {sync_host}/sync/v3/files/{hash}` returns raw blob bytes.
//!   The root hash names the root index file; each root entry names a
//!   per-document index whose components include a `.metadata` JSON blob.
//! - **Auth**: `POST {auth_host}/token/json/2/user/new` with the device token
//!   as bearer returns a user token as plain text.
//!
//! ### Failure handling
//!
//! - An empty root body almost always means an expired credential and is
//!   reported as a protocol error carrying a re-registration hint.
//! - Per-document fetches run on a bounded worker pool; one document failing
//!   is logged and skipped, never aborting the batch.

pub mod auth;
pub mod credentials;
pub mod index_file;
pub mod metadata;
pub mod transport;

pub use auth::Authenticator;
pub use credentials::Credentials;
pub use index_file::parse_index;
pub use metadata::RawMetadata;
pub use transport::{HttpTransport, Method, RawResponse, ReqwestTransport, TransportError};

use crate::archive::build_archive;
use async_trait::async_trait;
use bytes::Bytes;
use rmsync_core::{AppConfig, Document, Error, RemoteIndexEntry, RootSnapshot};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use url::Url;

/// Source of the remote collection.
///
/// The caches and the background loader depend on this trait rather than on
/// [`RemoteSyncClient`] directly.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Current root hash of the collection.
    async fn fetch_root_hash(&self) -> Result<String, Error>;

    /// Entries of the root index named by `root_hash`.
    async fn fetch_root_index(&self, root_hash: &str) -> Result<Vec<RemoteIndexEntry>, Error>;

    /// Metadata for the given root entries, without deleted items.
    ///
    /// Entries that fail individually are skipped.
    async fn fetch_documents(&self, entries: &[RemoteIndexEntry]) -> Result<Vec<Document>, Error>;

    /// Raw bytes of a content-addressed blob.
    async fn fetch_blob(&self, hash: &str) -> Result<Bytes, Error>;

    /// All components of a document packed as a zip archive.
    async fn download_document(&self, doc: &Document) -> Result<Vec<u8>, Error>;

    /// Snapshot of the whole collection.
    ///
    /// Probes the root hash first unless `known_root_hash` is given.
    async fn fetch_collection(&self, known_root_hash: Option<&str>) -> Result<(RootSnapshot, Vec<Document>), Error> {
        let root_hash = match known_root_hash {
            Some(hash) => hash.to_string(),
            None => self.fetch_root_hash().await?,
        };
        let entries = self.fetch_root_index(&root_hash).await?;
        let documents = self.fetch_documents(&entries).await?;
        Ok((RootSnapshot { root_hash, entries }, documents))
    }
}

/// Endpoint URLs of the auth and sync services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEndpoints {
    pub root: String,
    pub files: String,
    pub renew_token: String,
}

fn base_url(field: &str, host: &str) -> Result<String, Error> {
    let url = Url::parse(host).map_err(|e| Error::InvalidInput(format!("invalid {field} '{host}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::InvalidInput(format!("invalid {field} '{host}': unsupported scheme")));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

impl SyncEndpoints {
    pub fn new(auth_host: &str, sync_host: &str) -> Result<Self, Error> {
        let auth = base_url("auth_host", auth_host)?;
        let sync = base_url("sync_host", sync_host)?;
        Ok(Self {
            root: format!("{sync}/sync/v4/root"),
            files: format!("{sync}/sync/v3/files"),
            renew_token: format!("{auth}/token/json/2/user/new"),
        })
    }

    pub fn file(&self, hash: &str) -> String {
        format!("{}/{hash}", self.files)
    }
}

struct ClientInner {
    auth: Authenticator,
    endpoints: SyncEndpoints,
    parallel_workers: usize,
}

/// Client for the remote sync protocol.
///
/// Cheap to clone: clones share the transport and the user token.
#[derive(Clone)]
pub struct RemoteSyncClient {
    inner: Arc<ClientInner>,
}

impl RemoteSyncClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>, credentials: Credentials, endpoints: SyncEndpoints, parallel_workers: usize,
    ) -> Self {
        let auth = Authenticator::new(
            transport,
            endpoints.renew_token.clone(),
            credentials.device_token,
            credentials.user_token,
        );
        Self { inner: Arc::new(ClientInner { auth, endpoints, parallel_workers: parallel_workers.max(1) }) }
    }

    /// Build a client over a [`ReqwestTransport`] configured from `config`.
    pub fn from_config(config: &AppConfig, credentials: Credentials) -> Result<Self, Error> {
        let transport = ReqwestTransport::new(config.timeout(), config.max_retries)?;
        let endpoints = SyncEndpoints::new(&config.auth_host, &config.sync_host)?;
        Ok(Self::new(Arc::new(transport), credentials, endpoints, config.parallel_workers))
    }

    pub fn endpoints(&self) -> &SyncEndpoints {
        &self.inner.endpoints
    }

    /// Parse the index blob named by `hash`.
    async fn fetch_index(&self, hash: &str) -> Result<Vec<RemoteIndexEntry>, Error> {
        let bytes = self.fetch_blob(hash).await?;
        let content = std::str::from_utf8(&bytes)
            .map_err(|e| Error::Protocol(format!("index blob {hash} is not valid UTF-8: {e}")))?;
        Ok(parse_index(content))
    }

    /// Fetch and assemble one document; `None` for deleted items.
    async fn fetch_document(&self, entry: &RemoteIndexEntry) -> Result<Option<Document>, Error> {
        let components = self.fetch_index(&entry.hash).await?;

        let metadata = match components.iter().find(|c| c.is_metadata()) {
            Some(component) => match self.fetch_blob(&component.hash).await.map(|b| RawMetadata::parse(&b)) {
                Ok(Ok(metadata)) => metadata,
                Ok(Err(e)) => {
                    tracing::warn!(doc_id = %entry.id, blob = %component.hash, error = %e, "unparseable metadata");
                    RawMetadata::default()
                }
                Err(e) => {
                    tracing::warn!(doc_id = %entry.id, blob = %component.hash, error = %e, "metadata fetch failed");
                    RawMetadata::default()
                }
            },
            None => RawMetadata::default(),
        };

        if metadata.deleted {
            return Ok(None);
        }
        Ok(Some(metadata.into_document(entry, components)))
    }
}

#[async_trait]
impl RemoteSource for RemoteSyncClient {
    async fn fetch_root_hash(&self) -> Result<String, Error> {
        let url = &self.inner.endpoints.root;
        let response = self.inner.auth.request(Method::Get, url).await?;
        if !response.is_success() {
            return Err(Error::Http { status: response.status, url: url.clone() });
        }

        let text = response.text();
        if text.trim().is_empty() {
            return Err(Error::expired_credential("Empty response from sync API"));
        }

        let root: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
            let preview: String = text.chars().take(200).collect();
            Error::Protocol(format!("invalid JSON from sync API: {e} (response was: {preview})"))
        })?;

        match root.get("hash").and_then(|h| h.as_str()) {
            Some(hash) if !hash.is_empty() => Ok(hash.to_string()),
            _ => Err(Error::Protocol(format!("unexpected API response format: {root}. The sync API may have changed."))),
        }
    }

    async fn fetch_root_index(&self, root_hash: &str) -> Result<Vec<RemoteIndexEntry>, Error> {
        self.fetch_index(root_hash).await.map_err(|e| match e {
            Error::Protocol(msg) => Error::Protocol(format!("failed to parse root index (hash={root_hash}): {msg}")),
            other => other,
        })
    }

    async fn fetch_documents(&self, entries: &[RemoteIndexEntry]) -> Result<Vec<Document>, Error> {
        let semaphore = Arc::new(Semaphore::new(self.inner.parallel_workers));
        let mut join_set = JoinSet::new();

        for (position, entry) in entries.iter().cloned().enumerate() {
            let semaphore = semaphore.clone();
            let client = self.clone();
            join_set.spawn(async move {
                // Held for the task's lifetime to bound concurrent fetches.
                let _permit = semaphore.acquire_owned().await;
                let result = client.fetch_document(&entry).await;
                (position, entry, result)
            });
        }

        let mut documents = Vec::with_capacity(entries.len());
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((position, _, Ok(Some(doc)))) => documents.push((position, doc)),
                Ok((_, _, Ok(None))) => {}
                Ok((_, entry, Err(e))) => {
                    tracing::warn!(doc_id = %entry.id, hash = %entry.hash, error = %e, "document metadata fetch failed");
                }
                Err(e) => tracing::warn!(error = %e, "document metadata task failed"),
            }
        }

        documents.sort_by_key(|(position, _)| *position);
        Ok(documents.into_iter().map(|(_, doc)| doc).collect())
    }

    async fn fetch_blob(&self, hash: &str) -> Result<Bytes, Error> {
        let url = self.inner.endpoints.file(hash);
        let response = self.inner.auth.request(Method::Get, &url).await?;
        if !response.is_success() {
            return Err(Error::Http { status: response.status, url });
        }
        Ok(response.body)
    }

    async fn download_document(&self, doc: &Document) -> Result<Vec<u8>, Error> {
        let components = self.fetch_index(&doc.hash).await?;

        let mut files = Vec::with_capacity(components.len());
        for component in components {
            match self.fetch_blob(&component.hash).await {
                Ok(bytes) => files.push((component.id, bytes)),
                Err(e) => {
                    tracing::warn!(doc_id = %doc.id, file = %component.id, error = %e, "component download failed");
                }
            }
        }

        tracing::debug!(doc_id = %doc.id, files = files.len(), "document downloaded");
        build_archive(&files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use rmsync_core::DocType;
    use std::io::Cursor;

    const ROOT: &str = "https://sync.test/sync/v4/root";

    fn file(hash: &str) -> String {
        format!("https://sync.test/sync/v3/files/{hash}")
    }

    fn client(transport: Arc<ScriptedTransport>) -> RemoteSyncClient {
        let endpoints = SyncEndpoints::new("https://auth.test", "https://sync.test/").unwrap();
        let credentials = Credentials { device_token: Some("device".into()), user_token: Some("user".into()) };
        RemoteSyncClient::new(transport, credentials, endpoints, 2)
    }

    /// Script a document whose index lists a metadata blob and one page.
    fn script_document(transport: &ScriptedTransport, id: &str, metadata: &str) {
        transport.respond(
            &file(&format!("idx-{id}")),
            200,
            format!("3\nmeta-{id}:0:{id}.metadata:0:10\npage-{id}:0:{id}/p1.rm:0:20\n"),
        );
        transport.respond(&file(&format!("meta-{id}")), 200, metadata.to_string());
        transport.respond(&file(&format!("page-{id}")), 200, format!("strokes of {id}"));
    }

    #[test]
    fn test_endpoints() {
        let endpoints = SyncEndpoints::new("https://auth.test/", "https://sync.test").unwrap();
        assert_eq!(endpoints.root, ROOT);
        assert_eq!(endpoints.file("abc"), file("abc"));
        assert_eq!(endpoints.renew_token, "https://auth.test/token/json/2/user/new");
        assert!(SyncEndpoints::new("not a url", "https://sync.test").is_err());
        assert!(SyncEndpoints::new("ftp://auth.test", "https://sync.test").is_err());
    }

    #[tokio::test]
    async fn test_fetch_root_hash() {
        let transport = ScriptedTransport::new();
        transport.respond(ROOT, 200, r#"{"hash":"root-1","generation":7}"#);

        assert_eq!(client(transport).fetch_root_hash().await.unwrap(), "root-1");
    }

    #[tokio::test]
    async fn test_empty_root_body_mentions_expiry() {
        let transport = ScriptedTransport::new();
        transport.respond(ROOT, 200, "  \n");

        let err = client(transport).fetch_root_hash().await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert!(err.to_string().contains("expired"));
    }

    #[tokio::test]
    async fn test_root_without_hash_is_protocol_error() {
        let transport = ScriptedTransport::new();
        transport.respond(ROOT, 200, r#"{"generation":7}"#);

        let err = client(transport).fetch_root_hash().await.unwrap_err();
        assert!(err.to_string().contains("may have changed"));
    }

    #[tokio::test]
    async fn test_root_invalid_json() {
        let transport = ScriptedTransport::new();
        transport.respond(ROOT, 200, "<html>maintenance</html>");

        let err = client(transport).fetch_root_hash().await.unwrap_err();
        assert!(matches!(err, Error::Protocol(msg) if msg.contains("invalid JSON")));
    }

    #[tokio::test]
    async fn test_root_http_error() {
        let transport = ScriptedTransport::new();
        transport.respond(ROOT, 500, "");

        let err = client(transport).fetch_root_hash().await.unwrap_err();
        assert!(matches!(err, Error::Http { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_fetch_collection() {
        let transport = ScriptedTransport::new();
        transport.respond(ROOT, 200, r#"{"hash":"root-1"}"#);
        transport.respond(
            &file("root-1"),
            200,
            "3\nidx-f1:80000000:f1:2:0\nidx-d1:0:d1:2:300\nidx-gone:0:gone:2:0\nidx-bad:0:bad:2:0\nmalformed\n",
        );
        script_document(&transport, "f1", r#"{"visibleName":"Work","type":"CollectionType","parent":""}"#);
        script_document(
            &transport,
            "d1",
            r#"{"visibleName":"Notes","type":"DocumentType","parent":"f1","lastModified":"1700000000000"}"#,
        );
        script_document(&transport, "gone", r#"{"visibleName":"Old","deleted":true}"#);

        let (snapshot, documents) = client(transport.clone()).fetch_collection(None).await.unwrap();

        assert_eq!(snapshot.root_hash, "root-1");
        assert_eq!(snapshot.entries.len(), 4);
        let ids: Vec<&str> = documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["f1", "d1"]);
        assert_eq!(documents[0].doc_type, DocType::Collection);
        assert_eq!(documents[1].parent_id, "f1");
        assert_eq!(documents[1].size_bytes, 300);
        assert_eq!(documents[1].component_files.len(), 2);
        assert_eq!(transport.count(ROOT), 1);
    }

    #[tokio::test]
    async fn test_fetch_collection_with_known_hash_skips_root_lookup() {
        let transport = ScriptedTransport::new();
        transport.respond(&file("root-2"), 200, "3\n");

        let (snapshot, documents) = client(transport.clone()).fetch_collection(Some("root-2")).await.unwrap();
        assert_eq!(snapshot.root_hash, "root-2");
        assert!(documents.is_empty());
        assert_eq!(transport.count(ROOT), 0);
    }

    #[tokio::test]
    async fn test_unreadable_metadata_uses_defaults() {
        let transport = ScriptedTransport::new();
        script_document(&transport, "d1", "not json");
        let entry = RemoteIndexEntry::parse_line("idx-d1:0:d1:2:5").unwrap();

        let documents = client(transport).fetch_documents(&[entry]).await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].name, "d1");
    }

    #[tokio::test]
    async fn test_download_document_skips_failed_components() {
        let transport = ScriptedTransport::new();
        transport.respond(&file("idx-d1"), 200, "3\nmeta-d1:0:d1.metadata:0:10\npage-d1:0:d1/p1.rm:0:20\n");
        transport.respond(&file("meta-d1"), 200, r#"{"visibleName":"Notes"}"#);
        transport.respond(&file("page-d1"), 500, "");
        let doc = rmsync_core::Document {
            hash: "idx-d1".into(),
            ..crate::testing::document("d1", "Notes", "", DocType::Document)
        };

        let bytes = client(transport).download_document(&doc).await.unwrap();
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let names: Vec<&str> = archive.file_names().collect();
        assert_eq!(names, vec!["d1.metadata"]);
    }
}
