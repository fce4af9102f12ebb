//! Process-wide wiring of the sync core.
//!
//! A [`SyncContext`] is built once at startup and passed to whatever needs
//! the collection, the content caches or the durable index.

use crate::cache::{CollectionCache, ContentCache, ContentCacheConfig};
use crate::loader::{LoaderConfig, LoaderHandle, spawn_loader};
use crate::sync::{Credentials, RemoteSource, RemoteSyncClient};
use rmsync_core::{AppConfig, DocumentIndex, Error, PageStore};
use std::sync::Arc;

/// Owns the remote source, both caches and the optional durable index.
pub struct SyncContext {
    config: AppConfig,
    source: Option<Arc<dyn RemoteSource>>,
    collection: Arc<CollectionCache>,
    content: Arc<ContentCache>,
    index: Option<DocumentIndex>,
}

impl SyncContext {
    /// Wire a context from already built parts.
    pub fn new(config: AppConfig, source: Option<Arc<dyn RemoteSource>>, index: Option<DocumentIndex>) -> Self {
        let collection = Arc::new(CollectionCache::new(source.clone(), config.cache_ttl()));
        let store = index.clone().map(|index| Arc::new(index) as Arc<dyn PageStore>);
        let content = Arc::new(ContentCache::new(
            ContentCacheConfig {
                ttl: config.content_ttl(),
                max_extractions: config.extraction_cache_size,
                max_pages: config.page_cache_size,
            },
            store,
        ));

        Self { config, source, collection, content, index }
    }

    /// Build the context described by `config`.
    ///
    /// A missing credential leaves the context unauthenticated. An index that
    /// cannot be opened degrades the context to volatile caches only.
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed credential or invalid endpoint hosts.
    pub async fn from_config(config: AppConfig) -> Result<Self, Error> {
        let source = match Credentials::load(&config).await? {
            Some(credentials) => {
                let client = RemoteSyncClient::from_config(&config, credentials)?;
                Some(Arc::new(client) as Arc<dyn RemoteSource>)
            }
            None => {
                tracing::warn!(token_file = %config.token_file.display(), "no credential configured, running unauthenticated");
                None
            }
        };

        let index = open_index(&config).await;
        Ok(Self::new(config, source, index))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn collection(&self) -> &Arc<CollectionCache> {
        &self.collection
    }

    pub fn content(&self) -> &Arc<ContentCache> {
        &self.content
    }

    pub fn index(&self) -> Option<&DocumentIndex> {
        self.index.as_ref()
    }

    pub fn source(&self) -> Option<&Arc<dyn RemoteSource>> {
        self.source.as_ref()
    }

    /// Start the background loader, if a remote source is configured.
    pub fn start_loader(&self) -> Option<LoaderHandle> {
        let source = self.source.clone()?;
        Some(spawn_loader(
            source,
            self.collection.clone(),
            self.content.clone(),
            self.index.clone(),
            LoaderConfig::from_app(&self.config),
        ))
    }

    /// Close the durable index, flushing pending writes.
    pub async fn close(self) -> Result<(), Error> {
        match self.index {
            Some(index) => index.close().await,
            None => Ok(()),
        }
    }
}

async fn open_index(config: &AppConfig) -> Option<DocumentIndex> {
    let index = match DocumentIndex::open(&config.index_path).await {
        Ok(index) => index,
        Err(e) => {
            tracing::warn!(path = %config.index_path.display(), error = %e, "document index unavailable, continuing without it");
            return None;
        }
    };

    if config.force_rebuild {
        match index.rebuild().await {
            Ok(pages) => tracing::info!(pages, "full-text projection rebuilt"),
            Err(e) => tracing::warn!(error = %e, "full-text rebuild failed"),
        }
    }

    Some(index)
}
