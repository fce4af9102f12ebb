//! HTTP transport seam for the sync client.
//!
//! [`HttpTransport`] is the only place the client touches the network.
//! [`ReqwestTransport`] retries connection failures, timeouts and 5xx
//! responses with exponential backoff; every other status is handed back to
//! the caller untouched so authentication can react to a 401.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header;
use rmsync_core::Error;
use std::sync::Arc;
use std::time::Duration;

/// Default user agent.
const DEFAULT_USER_AGENT: &str = "rmsync/0.1";

/// First retry delay; doubled on every further attempt.
const DEFAULT_BACKOFF: Duration = Duration::from_millis(500);

/// HTTP method used by the sync protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Status and body of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self { status, body: body.into() }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as UTF-8, with invalid sequences replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Failures that outlived the transport retries.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Request timeout.
    #[error("request timeout")]
    Timeout,

    /// Network error.
    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Build(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { TransportError::Timeout } else { TransportError::Network(Arc::new(err)) }
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Error::Network(err.to_string())
    }
}

/// Sends one HTTP request, optionally authenticated with a bearer token.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, method: Method, url: &str, bearer: Option<&str>) -> Result<RawResponse, TransportError>;
}

/// Pooled reqwest client with retry and backoff.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
    max_retries: u32,
    backoff: Duration,
}

impl ReqwestTransport {
    /// Create a transport with a per-request timeout and retry budget.
    pub fn new(timeout: Duration, max_retries: u32) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .timeout(timeout)
            .use_rustls_tls()
            .gzip(true)
            .build()
            .map_err(|e| TransportError::Build(e.to_string()))?;

        Ok(Self { http, max_retries, backoff: DEFAULT_BACKOFF })
    }

    /// Override the first retry delay.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    fn delay(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(2u32.saturating_pow(attempt))
    }
}

fn is_transient(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, method: Method, url: &str, bearer: Option<&str>) -> Result<RawResponse, TransportError> {
        let mut attempt = 0;
        loop {
            let mut request = match method {
                Method::Get => self.http.get(url),
                Method::Post => self.http.post(url).header(header::CONTENT_LENGTH, 0),
            };
            if let Some(token) = bearer {
                request = request.bearer_auth(token);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_server_error() && attempt < self.max_retries {
                        tracing::debug!(url, status = status.as_u16(), attempt, "server error, retrying");
                    } else {
                        let body = response.bytes().await?;
                        return Ok(RawResponse { status: status.as_u16(), body });
                    }
                }
                Err(e) if is_transient(&e) && attempt < self.max_retries => {
                    tracing::debug!(url, error = %e, attempt, "transient network error, retrying");
                }
                Err(e) => return Err(e.into()),
            }

            tokio::time::sleep(self.delay(attempt)).await;
            attempt += 1;
        }
    }
}
