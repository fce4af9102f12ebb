//! Core types and shared functionality for rmsync.
//!
//! This crate provides:
//! - The data model of the remote collection
//! - The durable document index with SQLite/FTS5 backend
//! - Unified error types
//! - Configuration structures

pub mod config;
pub mod error;
pub mod index;
pub mod models;
pub mod paths;

pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use index::{DocumentIndex, DocumentRecord, PageStore, SearchHit};
pub use models::{ContentType, DocType, Document, ExtractionResult, RemoteIndexEntry, RootSnapshot};
