//! HTTP client for the survey backend.
//!
//! - [`HttpAuthClient`]: password login, token refresh and the `/users/me` probe.
//! - [`TokenManager`]: keeps a valid access token, refreshing or re-logging in on demand
//!   with at most one authentication call in flight.
//! - [`BackendUploader`]: the multipart "create project with files" request.

pub mod auth;
pub mod error;
pub mod token_manager;
pub mod upload;

use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use seisflow_core::BackendConfig;

pub use auth::{AuthApi, HttpAuthClient};
pub use error::{AuthError, ClientError, UploadError};
pub use token_manager::{AccessToken, TokenManager};
pub use upload::{BackendUploader, ProjectUploader};

pub(crate) fn build_http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(30)))
        .build()
}

/// Pull a human-readable message out of an error body (`{"detail": "..."}` or raw text).
pub(crate) fn error_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| match v.get("detail") {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
            None => None,
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Wire the token manager and uploader from configuration.
pub fn connect(config: &BackendConfig) -> Result<(Arc<TokenManager>, BackendUploader), ClientError> {
    let auth = HttpAuthClient::new(&config.url, config.auth_timeout)?;
    let tokens = Arc::new(TokenManager::new(
        Arc::new(auth),
        &config.username,
        config.password.expose(),
    )?);
    let uploader = BackendUploader::new(&config.url, config.upload_timeout, tokens.clone())?;
    Ok((tokens, uploader))
}
