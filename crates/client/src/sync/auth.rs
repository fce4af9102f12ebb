//! User token management.
//!
//! Sync requests carry a short-lived user token obtained by exchanging the
//! device token. A 401 triggers one renewal and one retry. Renewal is
//! single-flight per token generation: callers that were rejected with the
//! same token wait on one exchange and reuse its result.

use super::transport::{HttpTransport, Method, RawResponse};
use parking_lot::RwLock;
use rmsync_core::Error;
use rmsync_core::error::REAUTH_HINT;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct TokenState {
    token: Option<String>,
    /// Incremented by every successful renewal.
    generation: u64,
}

/// Attaches user tokens to requests and renews them on rejection.
pub struct Authenticator {
    transport: Arc<dyn HttpTransport>,
    renew_url: String,
    device_token: Option<String>,
    state: RwLock<TokenState>,
    renew_gate: Mutex<()>,
}

impl Authenticator {
    pub fn new(
        transport: Arc<dyn HttpTransport>, renew_url: String, device_token: Option<String>, user_token: Option<String>,
    ) -> Self {
        Self {
            transport,
            renew_url,
            device_token,
            state: RwLock::new(TokenState { token: user_token, generation: 0 }),
            renew_gate: Mutex::new(()),
        }
    }

    /// Current user token and its generation, renewing if none is held.
    pub async fn token(&self) -> Result<(String, u64), Error> {
        let generation = {
            let state = self.state.read();
            if let Some(token) = &state.token {
                return Ok((token.clone(), state.generation));
            }
            state.generation
        };
        self.renew_if_current(generation).await
    }

    /// Renew the user token unless another caller already replaced `rejected`.
    ///
    /// # Errors
    ///
    /// - `Error::Unauthenticated` when no device token is configured
    /// - `Error::Protocol` when the exchange is refused or returns an empty token
    /// - `Error::Network` when the exchange cannot be sent
    pub async fn renew_if_current(&self, rejected: u64) -> Result<(String, u64), Error> {
        let _gate = self.renew_gate.lock().await;

        {
            let state = self.state.read();
            if state.generation != rejected
                && let Some(token) = &state.token
            {
                return Ok((token.clone(), state.generation));
            }
        }

        let device_token = self
            .device_token
            .as_deref()
            .ok_or_else(|| Error::Unauthenticated(format!("no device token available. {REAUTH_HINT}")))?;

        let response = self.transport.send(Method::Post, &self.renew_url, Some(device_token)).await?;
        let token = response.text().trim().to_string();
        if response.status != 200 || token.is_empty() {
            return Err(Error::Protocol(format!(
                "failed to renew user token (HTTP {}). {REAUTH_HINT}",
                response.status
            )));
        }

        let mut state = self.state.write();
        state.generation += 1;
        state.token = Some(token.clone());
        tracing::debug!(generation = state.generation, "user token renewed");

        Ok((token, state.generation))
    }

    /// Send an authenticated request, renewing the token once on a 401.
    pub async fn request(&self, method: Method, url: &str) -> Result<RawResponse, Error> {
        let (token, generation) = self.token().await?;
        let response = self.transport.send(method, url, Some(&token)).await?;
        if response.status != 401 {
            return Ok(response);
        }

        tracing::debug!(url, "user token rejected, renewing");
        let (token, _) = self.renew_if_current(generation).await?;
        Ok(self.transport.send(method, url, Some(&token)).await?)
    }
}
