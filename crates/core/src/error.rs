//! Unified error types for rmsync.
//!
//! Variants follow the failure classes of the sync core: protocol failures that
//! usually mean an expired credential, transient network failures that survived
//! the transport retries, and durable index failures. Per-item failures inside a
//! batch are logged by their callers and never reach this type.

use tokio_rusqlite::rusqlite;

/// Hint appended to errors whose usual fix is registering the device again.
pub const REAUTH_HINT: &str = "Re-register this device to obtain a new token.";

/// Unified error types for the sync core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or unexpected response from the sync service.
    ///
    /// An empty body, a missing field or bad JSON. Most often caused by an
    /// expired credential or an API contract change.
    #[error("PROTOCOL_ERROR: {0}")]
    Protocol(String),

    /// Connection, timeout or 5xx failure that outlived the transport retries.
    #[error("NETWORK_ERROR: {0}")]
    Network(String),

    /// No credential is configured.
    #[error("UNAUTHENTICATED: {0}")]
    Unauthenticated(String),

    /// Non-success HTTP status that is not retried.
    #[error("HTTP_ERROR: status {status} for {url}")]
    Http { status: u16, url: String },

    /// Durable index operation failed.
    #[error("INDEX_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Schema setup or version upgrade failed.
    #[error("INDEX_ERROR: schema setup failed: {0}")]
    SchemaFailed(String),

    /// Packing a document archive failed.
    #[error("ARCHIVE_ERROR: {0}")]
    Archive(String),

    /// Invalid input parameters (e.g., a malformed token).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Build the protocol error raised for empty or unparseable root responses.
    pub fn expired_credential(detail: impl std::fmt::Display) -> Self {
        Error::Protocol(format!("{detail}. Your token may have expired. {REAUTH_HINT}"))
    }

    /// Whether re-registering the device is the actionable fix for this error.
    pub fn is_credential_failure(&self) -> bool {
        matches!(self, Error::Protocol(_) | Error::Unauthenticated(_))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}
