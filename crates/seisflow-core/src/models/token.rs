use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;

/// Access/refresh pair returned by a successful login or refresh.
///
/// Both tokens are opaque bearer strings; their claims are never parsed.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    access_token: String,
    refresh_token: String,
    issued_at: DateTime<Utc>,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            issued_at: Utc::now(),
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"***")
            .field("refresh_token", &"***")
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Wire shape of `POST /token` and `POST /refresh-token` responses.
#[derive(Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
}

impl From<TokenResponse> for TokenPair {
    fn from(resp: TokenResponse) -> Self {
        TokenPair::new(resp.access_token, resp.refresh_token)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticated,
    Refreshing,
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuthState::Unauthenticated => "unauthenticated",
            AuthState::Authenticated => "authenticated",
            AuthState::Refreshing => "refreshing",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_tokens() {
        let pair = TokenPair::new("access-secret", "refresh-secret");
        let printed = format!("{:?}", pair);
        assert!(!printed.contains("access-secret"));
        assert!(!printed.contains("refresh-secret"));
    }

    #[test]
    fn token_response_deserializes_extra_fields() {
        let resp: TokenResponse = serde_json::from_str(
            r#"{"access_token":"a","refresh_token":"r","token_type":"bearer","message":"ok"}"#,
        )
        .unwrap();
        let pair = TokenPair::from(resp);
        assert_eq!(pair.access_token(), "a");
        assert_eq!(pair.refresh_token(), "r");
    }
}
