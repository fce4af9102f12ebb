//! Volatile snapshot of the remote collection.
//!
//! ### Refresh policy
//!
//! - Snapshot younger than the TTL: returned with no remote call.
//! - Otherwise one root hash check. An unchanged hash only refreshes the
//!   snapshot timestamp; a changed hash triggers a full fetch for that hash.
//! - A failed check falls back to a full fetch instead of failing the caller.
//!
//! Refreshes are serialized by a gate and double-checked after acquiring it,
//! so concurrent callers that find the snapshot stale share one refresh.
//! Replacement swaps an `Arc`, so readers never observe a partial snapshot.

use crate::sync::RemoteSource;
use parking_lot::RwLock;
use rmsync_core::error::REAUTH_HINT;
use rmsync_core::{Document, Error};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Snapshot {
    documents: Arc<Vec<Document>>,
    /// `None` when seeded without a hash; the next check then forces a full fetch.
    root_hash: Option<String>,
    fetched_at: Instant,
}

/// Process-lifetime cache of the collection listing.
pub struct CollectionCache {
    source: Option<Arc<dyn RemoteSource>>,
    ttl: Duration,
    state: RwLock<Option<Snapshot>>,
    refresh_gate: Mutex<()>,
}

impl CollectionCache {
    /// Create a cache over `source`; `None` means no credential is configured.
    pub fn new(source: Option<Arc<dyn RemoteSource>>, ttl: Duration) -> Self {
        Self { source, ttl, state: RwLock::new(None), refresh_gate: Mutex::new(()) }
    }

    fn fresh_documents(&self) -> Option<Arc<Vec<Document>>> {
        let state = self.state.read();
        state.as_ref().filter(|s| s.fetched_at.elapsed() < self.ttl).map(|s| s.documents.clone())
    }

    /// Refresh the timestamp if the cached snapshot was built from `root_hash`.
    fn touch_if_unchanged(&self, root_hash: &str) -> Option<Arc<Vec<Document>>> {
        let mut state = self.state.write();
        let snapshot = state.as_mut().filter(|s| s.root_hash.as_deref() == Some(root_hash))?;
        snapshot.fetched_at = Instant::now();
        Some(snapshot.documents.clone())
    }

    /// The source together with a reasonably fresh collection.
    ///
    /// # Errors
    ///
    /// Returns `Error::Unauthenticated` without any remote call when no source
    /// is configured, and propagates errors of the full fetch.
    pub async fn get_or_refresh(&self) -> Result<(Arc<dyn RemoteSource>, Arc<Vec<Document>>), Error> {
        let source = self
            .source
            .clone()
            .ok_or_else(|| Error::Unauthenticated(format!("no credential configured. {REAUTH_HINT}")))?;

        if let Some(documents) = self.fresh_documents() {
            return Ok((source, documents));
        }

        let _gate = self.refresh_gate.lock().await;
        if let Some(documents) = self.fresh_documents() {
            return Ok((source, documents));
        }

        let known_hash = match source.fetch_root_hash().await {
            Ok(hash) => {
                if let Some(documents) = self.touch_if_unchanged(&hash) {
                    tracing::debug!(root_hash = %hash, "collection unchanged");
                    return Ok((source, documents));
                }
                Some(hash)
            }
            Err(e) => {
                tracing::warn!(error = %e, "root hash check failed, falling back to full fetch");
                None
            }
        };

        let (snapshot, documents) = source.fetch_collection(known_hash.as_deref()).await?;
        let documents = Arc::new(documents);
        *self.state.write() = Some(Snapshot {
            documents: documents.clone(),
            root_hash: Some(snapshot.root_hash.clone()),
            fetched_at: Instant::now(),
        });

        tracing::info!(root_hash = %snapshot.root_hash, documents = documents.len(), "collection refreshed");
        Ok((source, documents))
    }

    /// Replace the snapshot with a collection fetched elsewhere.
    pub fn set_from_external(&self, documents: Vec<Document>, root_hash: Option<String>) {
        let count = documents.len();
        *self.state.write() = Some(Snapshot { documents: Arc::new(documents), root_hash, fetched_at: Instant::now() });
        tracing::debug!(documents = count, "collection seeded externally");
    }

    /// Force the next call to refresh.
    pub fn invalidate(&self) {
        *self.state.write() = None;
    }

    /// Root hash of the current snapshot, if known.
    pub fn root_hash(&self) -> Option<String> {
        self.state.read().as_ref().and_then(|s| s.root_hash.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.source.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeSource, document};
    use rmsync_core::DocType;

    const TTL: Duration = Duration::from_secs(60);

    fn docs() -> Vec<Document> {
        vec![document("d1", "Notes", "", DocType::Document), document("d2", "Paper.pdf", "", DocType::Document)]
    }

    fn cache(source: &Arc<FakeSource>) -> CollectionCache {
        let source: Arc<dyn RemoteSource> = source.clone();
        CollectionCache::new(Some(source), TTL)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_call_fetches_collection() {
        let source = FakeSource::new("r1", docs());
        let cache = cache(&source);

        let (_, documents) = cache.get_or_refresh().await.unwrap();
        assert_eq!(documents.len(), 2);
        assert_eq!(source.root_hash_calls(), 1);
        assert_eq!(source.document_calls(), 1);
        assert_eq!(cache.root_hash().as_deref(), Some("r1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_within_ttl_makes_no_calls() {
        let source = FakeSource::new("r1", docs());
        let cache = cache(&source);
        let (_, first) = cache.get_or_refresh().await.unwrap();
        let calls = source.root_hash_calls();

        tokio::time::advance(Duration::from_secs(30)).await;
        let (_, second) = cache.get_or_refresh().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.root_hash_calls(), calls);
        assert_eq!(source.document_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_with_same_hash_only_checks_root() {
        let source = FakeSource::new("r1", docs());
        let cache = cache(&source);
        let (_, first) = cache.get_or_refresh().await.unwrap();
        let calls = source.root_hash_calls();

        tokio::time::advance(Duration::from_secs(61)).await;
        let (_, second) = cache.get_or_refresh().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.root_hash_calls(), calls + 1);
        assert_eq!(source.root_index_calls(), 1);
        assert_eq!(source.document_calls(), 1);

        tokio::time::advance(Duration::from_secs(30)).await;
        cache.get_or_refresh().await.unwrap();
        assert_eq!(source.root_hash_calls(), calls + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_with_new_hash_refetches() {
        let source = FakeSource::new("r1", docs());
        let cache = cache(&source);
        cache.get_or_refresh().await.unwrap();

        source.set_root_hash("r2");
        source.documents.lock().push(document("d3", "New", "", DocType::Document));
        tokio::time::advance(Duration::from_secs(61)).await;
        let (_, documents) = cache.get_or_refresh().await.unwrap();

        assert_eq!(documents.len(), 3);
        assert_eq!(source.document_calls(), 2);
        assert_eq!(cache.root_hash().as_deref(), Some("r2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_root_hash_failure_falls_back_to_full_fetch() {
        let source = FakeSource::new("r1", docs());
        let cache = cache(&source);
        cache.set_from_external(docs(), Some("r1".into()));
        tokio::time::advance(Duration::from_secs(61)).await;

        *source.root_hash_fails.lock() = true;
        let err = cache.get_or_refresh().await.err().unwrap();

        // The fallback fetch asks for the root hash again and surfaces its failure.
        assert!(matches!(err, Error::Network(_)));
        assert_eq!(source.root_hash_calls(), 2);
    }

    #[tokio::test]
    async fn test_unauthenticated_fails_fast() {
        let cache = CollectionCache::new(None, TTL);
        let err = cache.get_or_refresh().await.err().unwrap();
        assert!(matches!(err, Error::Unauthenticated(_)));
        assert!(!cache.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_seed_is_served() {
        let source = FakeSource::new("r1", docs());
        let cache = cache(&source);
        cache.set_from_external(docs(), Some("r1".into()));

        let (_, documents) = cache.get_or_refresh().await.unwrap();
        assert_eq!(documents.len(), 2);
        assert_eq!(source.root_hash_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seed_without_hash_forces_full_fetch() {
        let source = FakeSource::new("r1", docs());
        let cache = cache(&source);
        cache.set_from_external(Vec::new(), None);
        tokio::time::advance(Duration::from_secs(61)).await;

        let (_, documents) = cache.get_or_refresh().await.unwrap();
        assert_eq!(documents.len(), 2);
        assert_eq!(source.root_hash_calls(), 1);
        assert_eq!(source.document_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate() {
        let source = FakeSource::new("r1", docs());
        let cache = cache(&source);
        cache.get_or_refresh().await.unwrap();

        cache.invalidate();
        assert!(cache.root_hash().is_none());
        cache.get_or_refresh().await.unwrap();
        assert_eq!(source.document_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_refresh() {
        let source = FakeSource::new("r1", docs());
        let cache = Arc::new(cache(&source));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.get_or_refresh().await.map(|(_, d)| d.len()) }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 2);
        }

        assert_eq!(source.document_calls(), 1);
    }
}
