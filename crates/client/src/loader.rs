//! Background collection loader.
//!
//! Walks the remote collection in batches, records every document it finds in
//! the durable index, and seeds the collection cache once the walk completes,
//! so the first foreground caller does not pay for a full fetch.
//!
//! ### Failure handling
//!
//! - The root snapshot is resolved once; every batch reuses its entries.
//! - A failed step is retried after 2s, 4s, 8s, ... and the loader stops for
//!   good after `max_failures` consecutive failures.
//! - Cancellation is checked around every remote call and pause.
//!
//! A document whose hash changed loses its durable pages and its entries in
//! the content cache in the same step.

use crate::cache::{CollectionCache, ContentCache};
use crate::sync::RemoteSource;
use rmsync_core::paths::{apply_root_filter, is_within_root, item_path, items_by_id, normalize_root};
use rmsync_core::{AppConfig, Document, DocumentIndex, DocumentRecord, Error};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Tuning of the background loader.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub batch_size: usize,
    pub max_failures: u32,
    /// Folder the loader records documents under.
    pub root_path: String,
    /// Pause between batches, yielding to foreground work.
    pub batch_pause: Duration,
    /// Delay before the first retry; doubled on each further failure.
    pub retry_base: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_failures: 3,
            root_path: "/".into(),
            batch_pause: Duration::from_millis(100),
            retry_base: Duration::from_secs(2),
        }
    }
}

impl LoaderConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            batch_size: config.loader_batch_size.max(1),
            max_failures: config.loader_max_failures.max(1),
            root_path: config.root_path.clone(),
            ..Default::default()
        }
    }
}

/// How a loader run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderOutcome {
    /// The whole collection was walked.
    Completed { documents: usize },
    /// Shutdown was requested.
    Cancelled,
    /// Too many consecutive failures.
    Stopped { failures: u32 },
    /// The loader task panicked.
    Crashed,
}

/// Handle to a running loader task.
pub struct LoaderHandle {
    token: CancellationToken,
    task: JoinHandle<LoaderOutcome>,
}

impl LoaderHandle {
    /// Wait for the loader to end on its own.
    pub async fn join(self) -> LoaderOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "loader task panicked");
                LoaderOutcome::Crashed
            }
        }
    }

    /// Signal cancellation and wait for the loader to stop.
    pub async fn shutdown(self) -> LoaderOutcome {
        self.token.cancel();
        let outcome = self.join().await;
        tracing::info!(?outcome, "background loader stopped");
        outcome
    }
}

/// Start the loader on the current runtime.
pub fn spawn_loader(
    source: Arc<dyn RemoteSource>, collection: Arc<CollectionCache>, content: Arc<ContentCache>,
    index: Option<DocumentIndex>, config: LoaderConfig,
) -> LoaderHandle {
    let token = CancellationToken::new();
    let loader = Loader {
        source,
        collection,
        content,
        index,
        root: normalize_root(&config.root_path),
        config,
        token: token.clone(),
    };
    let task = tokio::spawn(loader.run());
    tracing::info!("background loader started");
    LoaderHandle { token, task }
}

struct Loader {
    source: Arc<dyn RemoteSource>,
    collection: Arc<CollectionCache>,
    content: Arc<ContentCache>,
    index: Option<DocumentIndex>,
    config: LoaderConfig,
    root: String,
    token: CancellationToken,
}

/// Signals that the run must end with the contained outcome.
struct Halt(LoaderOutcome);

impl Loader {
    async fn run(self) -> LoaderOutcome {
        match self.walk().await {
            Ok(outcome) | Err(Halt(outcome)) => outcome,
        }
    }

    async fn walk(&self) -> Result<LoaderOutcome, Halt> {
        let (root_hash, entries) = self
            .with_retries("root snapshot", || async {
                let root_hash = self.source.fetch_root_hash().await?;
                let entries = self.source.fetch_root_index(&root_hash).await?;
                Ok((root_hash, entries))
            })
            .await?;
        tracing::info!(root_hash = %root_hash, entries = entries.len(), "loader resolved root snapshot");

        let mut documents: Vec<Document> = Vec::with_capacity(entries.len());
        let mut recorded: HashMap<String, String> = HashMap::new();

        for batch in entries.chunks(self.config.batch_size) {
            let fetched = self.with_retries("document batch", || self.source.fetch_documents(batch)).await?;
            let start = documents.len();
            documents.extend(fetched);
            self.record(&documents, start, &mut recorded).await;
            tracing::debug!(loaded = documents.len(), total = entries.len(), "loader batch done");

            self.pause(self.config.batch_pause).await?;
        }

        self.reconcile(&documents, &mut recorded).await;

        let count = documents.len();
        self.collection.set_from_external(documents, Some(root_hash));
        tracing::info!(documents = count, "loader completed collection walk");
        Ok(LoaderOutcome::Completed { documents: count })
    }

    /// Run `step` until it succeeds, backing off between failures.
    async fn with_retries<T, F, Fut>(&self, what: &str, mut step: F) -> Result<T, Halt>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut failures = 0u32;
        loop {
            let result = tokio::select! {
                biased;
                _ = self.token.cancelled() => return Err(Halt(LoaderOutcome::Cancelled)),
                result = step() => result,
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) => {
                    failures += 1;
                    if failures >= self.config.max_failures {
                        tracing::error!(step = what, failures, error = %e, "loader giving up after consecutive failures");
                        return Err(Halt(LoaderOutcome::Stopped { failures }));
                    }
                    let delay = self.config.retry_base.saturating_mul(2u32.saturating_pow(failures - 1));
                    tracing::warn!(step = what, failures, error = %e, ?delay, "loader step failed, retrying");
                    self.pause(delay).await?;
                }
            }
        }
    }

    async fn pause(&self, delay: Duration) -> Result<(), Halt> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Halt(LoaderOutcome::Cancelled)),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    /// Record the documents from `start` on, with paths resolved so far.
    async fn record(&self, documents: &[Document], start: usize, recorded: &mut HashMap<String, String>) {
        let Some(index) = &self.index else { return };
        let by_id = items_by_id(documents);

        for doc in &documents[start..] {
            if doc.is_folder() || doc.is_trashed() {
                continue;
            }
            let path = item_path(doc, &by_id);
            if is_within_root(&path, &self.root) {
                self.record_document(index, doc, &path).await;
            }
            recorded.insert(doc.id.clone(), path);
        }
    }

    /// Fix documents whose parents arrived in a later batch.
    async fn reconcile(&self, documents: &[Document], recorded: &mut HashMap<String, String>) {
        let Some(index) = &self.index else { return };
        let by_id = items_by_id(documents);

        for doc in documents {
            let Some(previous) = recorded.get(&doc.id) else { continue };
            let path = item_path(doc, &by_id);
            if &path == previous {
                continue;
            }

            match (is_within_root(previous, &self.root), is_within_root(&path, &self.root)) {
                (_, true) => self.record_document(index, doc, &path).await,
                (true, false) => {
                    if let Err(e) = index.remove_document(&doc.id).await {
                        tracing::warn!(doc_id = %doc.id, error = %e, "failed to drop document outside root");
                    }
                }
                (false, false) => {}
            }
            recorded.insert(doc.id.clone(), path);
        }
    }

    async fn record_document(&self, index: &DocumentIndex, doc: &Document, path: &str) {
        let record = DocumentRecord {
            name: Some(doc.name.clone()),
            path: Some(apply_root_filter(path, &self.root)),
            file_type: Some(doc.file_type().to_string()),
            modified_at: doc.last_modified.map(|t| t.to_rfc3339()),
            ..DocumentRecord::new(doc.id.clone()).with_hash(doc.hash.clone())
        };

        let result = async {
            if index.needs_reindex(&doc.id, &doc.hash).await? {
                self.content.clear(Some(&doc.id));
            }
            index.upsert_document(record).await
        }
        .await;

        if let Err(e) = result {
            tracing::warn!(doc_id = %doc.id, error = %e, "failed to record document in index");
        }
    }
}
