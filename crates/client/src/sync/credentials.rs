//! Device and user token loading.
//!
//! A credential is either a JSON object `{"devicetoken": "...", "usertoken": "..."}`
//! (the `~/.rmapi` file format) or a bare device JWT.

use rmsync_core::{AppConfig, Error};
use serde::Deserialize;

/// Tokens used to authenticate against the sync service.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Long-lived token exchanged for user tokens.
    pub device_token: Option<String>,
    /// Short-lived token sent with sync requests.
    pub user_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("device_token", &self.device_token.as_ref().map(|_| "<redacted>"))
            .field("user_token", &self.user_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Deserialize)]
struct TokenFile {
    #[serde(default)]
    devicetoken: String,
    #[serde(default)]
    usertoken: String,
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
}

impl Credentials {
    /// Parse a credential string.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` when the data is neither a token object nor a JWT.
    pub fn parse(data: &str) -> Result<Self, Error> {
        let data = data.trim();

        if data.starts_with('{')
            && let Ok(file) = serde_json::from_str::<TokenFile>(data)
        {
            return Ok(Self { device_token: non_empty(file.devicetoken), user_token: non_empty(file.usertoken) });
        }

        if data.starts_with("eyJ") {
            return Ok(Self { device_token: Some(data.to_string()), user_token: None });
        }

        let prefix: String = data.chars().take(20).collect();
        Err(Error::InvalidInput(format!("invalid token format, expected JSON or JWT (starts with: {prefix}...)")))
    }

    /// Load credentials from the configured token or token file.
    ///
    /// Returns `None` when neither is available, which callers treat as
    /// running unauthenticated.
    pub async fn load(config: &AppConfig) -> Result<Option<Self>, Error> {
        if let Some(token) = &config.token {
            return Self::parse(token).map(Some);
        }

        match tokio::fs::read_to_string(&config.token_file).await {
            Ok(data) => Self::parse(&data).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::InvalidInput(format!("cannot read {}: {e}", config.token_file.display()))),
        }
    }

    pub fn has_device_token(&self) -> bool {
        self.device_token.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_json_tokens() {
        let creds = Credentials::parse(r#"{"devicetoken": "dev", "usertoken": "user"}"#).unwrap();
        assert_eq!(creds.device_token.as_deref(), Some("dev"));
        assert_eq!(creds.user_token.as_deref(), Some("user"));
    }

    #[test]
    fn test_parse_json_empty_user_token() {
        let creds = Credentials::parse(r#"{"devicetoken": "dev", "usertoken": ""}"#).unwrap();
        assert!(creds.user_token.is_none());
        assert!(creds.has_device_token());
    }

    #[test]
    fn test_parse_raw_jwt() {
        let creds = Credentials::parse("  eyJhbGciOiJIUzI1NiJ9.payload.sig\n").unwrap();
        assert_eq!(creds.device_token.as_deref(), Some("eyJhbGciOiJIUzI1NiJ9.payload.sig"));
        assert!(creds.user_token.is_none());
    }

    #[test]
    fn test_parse_garbage() {
        let err = Credentials::parse("not a token").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let creds = Credentials { device_token: Some("secret".into()), user_token: None };
        assert!(!format!("{creds:?}").contains("secret"));
    }

    #[tokio::test]
    async fn test_load_prefers_inline_token() {
        let config = AppConfig {
            token: Some("eyJinline".into()),
            token_file: PathBuf::from("/nonexistent/.rmapi"),
            ..Default::default()
        };
        let creds = Credentials::load(&config).await.unwrap().unwrap();
        assert_eq!(creds.device_token.as_deref(), Some("eyJinline"));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".rmapi");
        std::fs::write(&path, r#"{"devicetoken":"dev","usertoken":""}"#).unwrap();

        let config = AppConfig { token: None, token_file: path, ..Default::default() };
        let creds = Credentials::load(&config).await.unwrap().unwrap();
        assert_eq!(creds.device_token.as_deref(), Some("dev"));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let config = AppConfig { token: None, token_file: PathBuf::from("/nonexistent/.rmapi"), ..Default::default() };
        assert!(Credentials::load(&config).await.unwrap().is_none());
    }
}
