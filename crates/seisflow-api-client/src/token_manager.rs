//! Access-token lifecycle.
//!
//! The manager owns the single live [`TokenPair`]. Readers take the current access
//! token from a snapshot without any network round trip. Every login and refresh runs
//! under one async mutex, so at most one authentication call is in flight; callers that
//! queue behind it compare generations and reuse its outcome instead of repeating it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};

use seisflow_core::models::{AuthState, TokenPair};
use seisflow_core::{ErrorMetadata, Secret};

use crate::auth::AuthApi;
use crate::error::AuthError;

/// An access token handed to a caller, tagged with the generation of the pair it came from.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: String,
    generation: u64,
}

impl AccessToken {
    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"***")
            .field("generation", &self.generation)
            .finish()
    }
}

struct AuthInner {
    pair: Option<TokenPair>,
    /// Bumped after every completed login or refresh attempt, successful or not.
    generation: u64,
    /// Error of the most recent attempt, if it failed; shared with queued callers.
    last_failure: Option<AuthError>,
}

pub struct TokenManager {
    auth: Arc<dyn AuthApi>,
    username: String,
    password: Secret,
    current: RwLock<Option<AccessToken>>,
    generation: AtomicU64,
    /// Written only while `inner` is held; readable at any time.
    state: watch::Sender<AuthState>,
    inner: Mutex<AuthInner>,
}

impl TokenManager {
    /// Fails with [`AuthError::MissingCredentials`] when either credential is empty.
    pub fn new(
        auth: Arc<dyn AuthApi>,
        username: &str,
        password: &str,
    ) -> Result<Self, AuthError> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        Ok(Self {
            auth,
            username: username.to_string(),
            password: Secret::new(password),
            current: RwLock::new(None),
            generation: AtomicU64::new(0),
            state: watch::Sender::new(AuthState::Unauthenticated),
            inner: Mutex::new(AuthInner {
                pair: None,
                generation: 0,
                last_failure: None,
            }),
        })
    }

    /// Current authentication state. Does not wait for an in-flight login or refresh.
    pub fn state(&self) -> AuthState {
        *self.state.borrow()
    }

    /// Return an access token for an immediate request.
    ///
    /// Uses the stored token when there is one. Otherwise performs a full login,
    /// unless a login that completed while this caller waited already decided the outcome.
    pub async fn get_valid_access_token(&self) -> Result<AccessToken, AuthError> {
        if let Some(token) = self.current.read().await.clone() {
            return Ok(token);
        }

        let observed = self.generation.load(Ordering::Acquire);
        let mut inner = self.inner.lock().await;

        if let Some(pair) = &inner.pair {
            return Ok(AccessToken {
                value: pair.access_token().to_string(),
                generation: inner.generation,
            });
        }
        if inner.generation != observed {
            if let Some(err) = &inner.last_failure {
                return Err(err.clone());
            }
        }

        tracing::info!("No access token available, logging in");
        self.login_locked(&mut inner).await
    }

    /// Report that the backend rejected `rejected` as unauthorized and obtain a replacement.
    ///
    /// Refreshes with the stored refresh token. If the refresh token is itself invalid
    /// the pair is discarded and a full login follows. Any other refresh failure discards
    /// the pair and is returned; the next request starts from a fresh login.
    pub async fn handle_unauthorized(
        &self,
        rejected: &AccessToken,
    ) -> Result<AccessToken, AuthError> {
        let mut inner = self.inner.lock().await;

        if inner.generation != rejected.generation {
            if let Some(pair) = &inner.pair {
                tracing::debug!("Token already replaced by a concurrent refresh");
                return Ok(AccessToken {
                    value: pair.access_token().to_string(),
                    generation: inner.generation,
                });
            }
            if let Some(err) = &inner.last_failure {
                return Err(err.clone());
            }
        }

        let refresh_token = match &inner.pair {
            Some(pair) => pair.refresh_token().to_string(),
            None => {
                tracing::info!("No refresh token stored, logging in");
                return self.login_locked(&mut inner).await;
            }
        };

        self.state.send_replace(AuthState::Refreshing);
        tracing::info!("Access token rejected, refreshing");

        match self.auth.refresh(&refresh_token).await {
            Ok(pair) => Ok(self.store_locked(&mut inner, pair).await),
            Err(err) => {
                self.discard_locked(&mut inner, &err).await;
                match err {
                    AuthError::InvalidToken(_) => {
                        tracing::warn!(
                            error = %err,
                            "Refresh token rejected, falling back to full login"
                        );
                        self.login_locked(&mut inner).await
                    }
                    err => {
                        tracing::error!(
                            error = %err,
                            error_code = err.error_code(),
                            recoverable = err.is_recoverable(),
                            "Token refresh failed"
                        );
                        Err(err)
                    }
                }
            }
        }
    }

    /// Check the current token against `GET /users/me`, replacing it if rejected.
    pub async fn probe(&self) -> Result<AccessToken, AuthError> {
        let token = self.get_valid_access_token().await?;
        if self.auth.probe(token.as_str()).await? {
            tracing::info!("Current access token is valid");
            Ok(token)
        } else {
            self.handle_unauthorized(&token).await
        }
    }

    async fn login_locked(&self, inner: &mut AuthInner) -> Result<AccessToken, AuthError> {
        match self
            .auth
            .login(&self.username, self.password.expose())
            .await
        {
            Ok(pair) => Ok(self.store_locked(inner, pair).await),
            Err(err) => {
                tracing::error!(
                    error = %err,
                    error_code = err.error_code(),
                    recoverable = err.is_recoverable(),
                    "Backend login failed"
                );
                self.discard_locked(inner, &err).await;
                Err(err)
            }
        }
    }

    async fn store_locked(&self, inner: &mut AuthInner, pair: TokenPair) -> AccessToken {
        inner.generation += 1;
        let token = AccessToken {
            value: pair.access_token().to_string(),
            generation: inner.generation,
        };
        inner.pair = Some(pair);
        self.state.send_replace(AuthState::Authenticated);
        inner.last_failure = None;
        *self.current.write().await = Some(token.clone());
        self.generation.store(inner.generation, Ordering::Release);
        token
    }

    async fn discard_locked(&self, inner: &mut AuthInner, err: &AuthError) {
        inner.generation += 1;
        inner.pair = None;
        self.state.send_replace(AuthState::Unauthenticated);
        inner.last_failure = Some(err.clone());
        *self.current.write().await = None;
        self.generation.store(inner.generation, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Scripted auth backend that counts calls and can delay responses.
    #[derive(Default)]
    struct FakeAuth {
        logins: AtomicUsize,
        refreshes: AtomicUsize,
        probes: AtomicUsize,
        delay: Duration,
        login_error: std::sync::Mutex<Option<AuthError>>,
        refresh_error: std::sync::Mutex<Option<AuthError>>,
        probe_valid: bool,
    }

    impl FakeAuth {
        fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                probe_valid: true,
                ..Default::default()
            }
        }

        fn fail_login(&self, err: Option<AuthError>) {
            *self.login_error.lock().unwrap() = err;
        }

        fn fail_refresh(&self, err: Option<AuthError>) {
            *self.refresh_error.lock().unwrap() = err;
        }

        fn logins(&self) -> usize {
            self.logins.load(Ordering::SeqCst)
        }

        fn refreshes(&self) -> usize {
            self.refreshes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AuthApi for FakeAuth {
        async fn login(&self, _username: &str, _password: &str) -> Result<TokenPair, AuthError> {
            let n = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            if let Some(err) = self.login_error.lock().unwrap().clone() {
                return Err(err);
            }
            Ok(TokenPair::new(format!("login-{}", n), format!("refresh-{}", n)))
        }

        async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
            let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            if let Some(err) = self.refresh_error.lock().unwrap().clone() {
                return Err(err);
            }
            Ok(TokenPair::new(
                format!("refreshed-{}", n),
                format!("{}-next", refresh_token),
            ))
        }

        async fn probe(&self, _access_token: &str) -> Result<bool, AuthError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            Ok(self.probe_valid)
        }
    }

    fn manager(auth: Arc<FakeAuth>) -> Arc<TokenManager> {
        Arc::new(TokenManager::new(auth, "ingest", "pw").unwrap())
    }

    #[test]
    fn missing_credentials_are_rejected_up_front() {
        let auth = Arc::new(FakeAuth::default());
        assert_eq!(
            TokenManager::new(auth.clone(), "", "pw").err(),
            Some(AuthError::MissingCredentials)
        );
        assert_eq!(
            TokenManager::new(auth, "ingest", "").err(),
            Some(AuthError::MissingCredentials)
        );
    }

    #[tokio::test]
    async fn first_call_logs_in_then_fast_path() {
        let auth = Arc::new(FakeAuth::default());
        let tokens = manager(auth.clone());
        assert_eq!(tokens.state(), AuthState::Unauthenticated);

        let first = tokens.get_valid_access_token().await.unwrap();
        let second = tokens.get_valid_access_token().await.unwrap();

        assert_eq!(first.as_str(), "login-1");
        assert_eq!(first, second);
        assert_eq!(auth.logins(), 1);
        assert_eq!(tokens.state(), AuthState::Authenticated);
    }

    #[tokio::test]
    async fn concurrent_first_callers_share_one_login() {
        let auth = Arc::new(FakeAuth::with_delay(Duration::from_millis(50)));
        let tokens = manager(auth.clone());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tokens = tokens.clone();
                tokio::spawn(async move { tokens.get_valid_access_token().await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().as_str(), "login-1");
        }
        assert_eq!(auth.logins(), 1);
    }

    #[tokio::test]
    async fn concurrent_rejections_share_one_refresh() {
        let auth = Arc::new(FakeAuth::with_delay(Duration::from_millis(50)));
        let tokens = manager(auth.clone());
        let stale = tokens.get_valid_access_token().await.unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let tokens = tokens.clone();
                let stale = stale.clone();
                tokio::spawn(async move { tokens.handle_unauthorized(&stale).await })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(auth.refreshes(), 1);
        assert_eq!(auth.logins(), 1);
        assert!(results.iter().all(|t| t.as_str() == "refreshed-1"));
        assert_eq!(
            tokens.get_valid_access_token().await.unwrap().as_str(),
            "refreshed-1"
        );
    }

    #[tokio::test]
    async fn state_reports_refreshing_while_refresh_in_flight() {
        let auth = Arc::new(FakeAuth::with_delay(Duration::from_millis(200)));
        let tokens = manager(auth.clone());
        let stale = tokens.get_valid_access_token().await.unwrap();

        let refresh = {
            let tokens = tokens.clone();
            tokio::spawn(async move { tokens.handle_unauthorized(&stale).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(tokens.state(), AuthState::Refreshing);

        refresh.await.unwrap().unwrap();
        assert_eq!(tokens.state(), AuthState::Authenticated);
    }

    #[tokio::test]
    async fn concurrent_rejections_share_one_refresh_error() {
        let auth = Arc::new(FakeAuth::with_delay(Duration::from_millis(50)));
        let tokens = manager(auth.clone());
        let stale = tokens.get_valid_access_token().await.unwrap();
        auth.fail_refresh(Some(AuthError::Transport("connection reset".into())));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tokens = tokens.clone();
                let stale = stale.clone();
                tokio::spawn(async move { tokens.handle_unauthorized(&stale).await })
            })
            .collect();

        for handle in handles {
            assert_eq!(
                handle.await.unwrap().unwrap_err(),
                AuthError::Transport("connection reset".into())
            );
        }
        assert_eq!(auth.refreshes(), 1);
        assert_eq!(auth.logins(), 1);
        assert_eq!(tokens.state(), AuthState::Unauthenticated);
    }

    #[tokio::test]
    async fn invalid_refresh_token_falls_back_to_single_login() {
        let auth = Arc::new(FakeAuth::default());
        let tokens = manager(auth.clone());
        let stale = tokens.get_valid_access_token().await.unwrap();
        auth.fail_refresh(Some(AuthError::InvalidToken("expired".into())));

        let fresh = tokens.handle_unauthorized(&stale).await.unwrap();

        assert_eq!(fresh.as_str(), "login-2");
        assert_eq!(auth.refreshes(), 1);
        assert_eq!(auth.logins(), 2);

        // The replacement is served from the fast path afterwards.
        tokens.get_valid_access_token().await.unwrap();
        assert_eq!(auth.refreshes(), 1);
        assert_eq!(auth.logins(), 2);
    }

    #[tokio::test]
    async fn failed_fallback_login_is_retried_by_next_request_without_refresh() {
        let auth = Arc::new(FakeAuth::default());
        let tokens = manager(auth.clone());
        let stale = tokens.get_valid_access_token().await.unwrap();
        auth.fail_refresh(Some(AuthError::InvalidToken("expired".into())));
        auth.fail_login(Some(AuthError::Timeout));

        assert_eq!(
            tokens.handle_unauthorized(&stale).await.unwrap_err(),
            AuthError::Timeout
        );
        assert_eq!(tokens.state(), AuthState::Unauthenticated);

        auth.fail_login(None);
        let logins_before = auth.logins();
        let token = tokens.get_valid_access_token().await.unwrap();

        assert_eq!(auth.logins(), logins_before + 1);
        assert_eq!(auth.refreshes(), 1);
        assert_eq!(token.as_str(), format!("login-{}", logins_before + 1));
    }

    #[tokio::test]
    async fn disabled_account_is_surfaced_and_state_discarded() {
        let auth = Arc::new(FakeAuth::default());
        let tokens = manager(auth.clone());
        let stale = tokens.get_valid_access_token().await.unwrap();
        auth.fail_refresh(Some(AuthError::AccountDisabled("Account is disabled".into())));

        let err = tokens.handle_unauthorized(&stale).await.unwrap_err();

        assert!(matches!(err, AuthError::AccountDisabled(_)));
        assert!(!err.is_recoverable());
        assert_eq!(auth.logins(), 1);
        assert_eq!(tokens.state(), AuthState::Unauthenticated);
    }

    #[tokio::test]
    async fn stale_rejection_after_refresh_reuses_new_token() {
        let auth = Arc::new(FakeAuth::default());
        let tokens = manager(auth.clone());
        let stale = tokens.get_valid_access_token().await.unwrap();

        let fresh = tokens.handle_unauthorized(&stale).await.unwrap();
        let again = tokens.handle_unauthorized(&stale).await.unwrap();

        assert_eq!(fresh, again);
        assert_eq!(auth.refreshes(), 1);
    }

    #[tokio::test]
    async fn probe_refreshes_rejected_token() {
        let auth = Arc::new(FakeAuth {
            probe_valid: false,
            ..Default::default()
        });
        let tokens = manager(auth.clone());

        let token = tokens.probe().await.unwrap();

        assert_eq!(token.as_str(), "refreshed-1");
        assert_eq!(auth.probes.load(Ordering::SeqCst), 1);
    }
}
