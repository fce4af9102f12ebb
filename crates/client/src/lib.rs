//! Client side of rmsync.
//!
//! This crate provides the remote sync protocol client, the volatile caches in
//! front of the durable index, and the background loader that warms them.

pub mod archive;
pub mod cache;
pub mod context;
pub mod loader;
pub mod sync;

#[cfg(test)]
mod testing;

pub use cache::{CollectionCache, ContentCache, ContentCacheConfig};
pub use context::SyncContext;
pub use loader::{LoaderConfig, LoaderHandle, LoaderOutcome, spawn_loader};
pub use sync::{Credentials, RemoteSource, RemoteSyncClient, SyncEndpoints};
