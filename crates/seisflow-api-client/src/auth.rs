//! Outbound authentication calls.
//!
//! Plain request/response: no retries and no state. [`TokenManager`](crate::TokenManager)
//! decides when each call is made.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use std::time::Duration;

use seisflow_core::models::{TokenPair, TokenResponse};

use crate::error::AuthError;
use crate::{build_http_client, error_detail};

/// Authentication endpoints of the backend.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Password-grant login (`POST /token`).
    async fn login(&self, username: &str, password: &str) -> Result<TokenPair, AuthError>;

    /// Exchange a refresh token for a new pair (`POST /refresh-token`).
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError>;

    /// `Ok(true)` if the backend accepts the access token, `Ok(false)` on 401.
    async fn probe(&self, access_token: &str) -> Result<bool, AuthError>;
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    token: &'a str,
}

/// [`AuthApi`] over HTTP.
#[derive(Clone, Debug)]
pub struct HttpAuthClient {
    client: Client,
    base_url: String,
}

impl HttpAuthClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read_pair(response: Response) -> Result<TokenPair, AuthError> {
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;
        if body.access_token.is_empty() || body.refresh_token.is_empty() {
            return Err(AuthError::MalformedResponse(
                "empty access or refresh token".to_string(),
            ));
        }
        Ok(body.into())
    }
}

fn transport_error(e: reqwest::Error) -> AuthError {
    if e.is_timeout() {
        AuthError::Timeout
    } else {
        AuthError::Transport(e.to_string())
    }
}

async fn failure_message(response: Response) -> String {
    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    error_detail(&text)
}

/// Map a non-success refresh response onto the error taxonomy.
///
/// 401 means the refresh token itself is no good (full re-login). 403 carries
/// either "Account is disabled" or one of the "... has changed" messages.
pub(crate) fn classify_refresh_failure(status: StatusCode, message: String) -> AuthError {
    match status {
        StatusCode::UNAUTHORIZED => AuthError::InvalidToken(message),
        StatusCode::FORBIDDEN if message.to_lowercase().contains("disabled") => {
            AuthError::AccountDisabled(message)
        }
        StatusCode::FORBIDDEN => AuthError::CredentialsChanged(message),
        s if s.is_server_error() => AuthError::Server {
            status: s.as_u16(),
            message,
        },
        s => AuthError::Rejected {
            status: s.as_u16(),
            message,
        },
    }
}

fn classify_login_failure(status: StatusCode, message: String) -> AuthError {
    match status {
        StatusCode::UNAUTHORIZED => AuthError::InvalidCredentials(message),
        StatusCode::FORBIDDEN if message.to_lowercase().contains("disabled") => {
            AuthError::AccountDisabled(message)
        }
        s if s.is_server_error() => AuthError::Server {
            status: s.as_u16(),
            message,
        },
        s => AuthError::Rejected {
            status: s.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl AuthApi for HttpAuthClient {
    #[tracing::instrument(skip(self, password))]
    async fn login(&self, username: &str, password: &str) -> Result<TokenPair, AuthError> {
        let response = self
            .client
            .post(self.url("/token"))
            .form(&[("username", username), ("password", password)])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = failure_message(response).await;
            return Err(classify_login_failure(status, message));
        }

        let pair = Self::read_pair(response).await?;
        tracing::info!("Obtained backend tokens with service credentials");
        Ok(pair)
    }

    #[tracing::instrument(skip_all)]
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let response = self
            .client
            .post(self.url("/refresh-token"))
            .json(&RefreshRequest {
                token: refresh_token,
            })
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = failure_message(response).await;
            return Err(classify_refresh_failure(status, message));
        }

        let pair = Self::read_pair(response).await?;
        tracing::info!("Refreshed backend access token");
        Ok(pair)
    }

    #[tracing::instrument(skip_all)]
    async fn probe(&self, access_token: &str) -> Result<bool, AuthError> {
        let response = self
            .client
            .get(self.url("/users/me"))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::UNAUTHORIZED => Ok(false),
            s => {
                let message = failure_message(response).await;
                Err(classify_login_failure(s, message))
            }
        }
    }
}
