//! Backend client error types

use seisflow_core::{ErrorClass, ErrorMetadata};

/// Failure to construct a client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Failed to create HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Failure of a login, refresh or probe call.
///
/// `Clone` so that callers waiting on a shared refresh all receive the same outcome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Backend credentials are not configured")]
    MissingCredentials,

    #[error("Authentication request failed: {0}")]
    Transport(String),

    #[error("Authentication request timed out")]
    Timeout,

    #[error("Backend returned {status} during authentication: {message}")]
    Server { status: u16, message: String },

    #[error("Token is invalid or expired: {0}")]
    InvalidToken(String),

    #[error("Configured credentials were rejected: {0}")]
    InvalidCredentials(String),

    #[error("Service account is disabled: {0}")]
    AccountDisabled(String),

    #[error("Service account credentials changed: {0}")]
    CredentialsChanged(String),

    #[error("Authentication rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Malformed authentication response: {0}")]
    MalformedResponse(String),
}

impl ErrorMetadata for AuthError {
    fn class(&self) -> ErrorClass {
        match self {
            AuthError::Transport(_) | AuthError::Timeout | AuthError::Server { .. } => {
                ErrorClass::Transient
            }
            AuthError::InvalidToken(_) => ErrorClass::AuthExpired,
            AuthError::MissingCredentials
            | AuthError::InvalidCredentials(_)
            | AuthError::AccountDisabled(_)
            | AuthError::CredentialsChanged(_)
            | AuthError::Rejected { .. }
            | AuthError::MalformedResponse(_) => ErrorClass::AuthInvalid,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingCredentials => "AUTH_MISSING_CREDENTIALS",
            AuthError::Transport(_) => "AUTH_TRANSPORT",
            AuthError::Timeout => "AUTH_TIMEOUT",
            AuthError::Server { .. } => "AUTH_SERVER_ERROR",
            AuthError::InvalidToken(_) => "AUTH_TOKEN_INVALID",
            AuthError::InvalidCredentials(_) => "AUTH_INVALID_CREDENTIALS",
            AuthError::AccountDisabled(_) => "AUTH_ACCOUNT_DISABLED",
            AuthError::CredentialsChanged(_) => "AUTH_CREDENTIALS_CHANGED",
            AuthError::Rejected { .. } => "AUTH_REJECTED",
            AuthError::MalformedResponse(_) => "AUTH_MALFORMED_RESPONSE",
        }
    }
}

/// Failure of the project-creation upload.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Could not obtain an access token: {0}")]
    Auth(#[from] AuthError),

    #[error("Upload rejected as unauthorized after token refresh")]
    Unauthorized,

    #[error("Upload request failed: {0}")]
    Transport(String),

    #[error("Upload request timed out")]
    Timeout,

    #[error("Backend returned {status} for project upload: {message}")]
    Server { status: u16, message: String },

    #[error("Backend rejected project upload with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Failed to read upload artifact {path}: {source}")]
    ReadArtifact {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode project descriptor: {0}")]
    Descriptor(#[from] serde_json::Error),

    #[error("Malformed project creation response: {0}")]
    MalformedResponse(String),
}

impl ErrorMetadata for UploadError {
    fn class(&self) -> ErrorClass {
        match self {
            UploadError::Auth(e) => e.class(),
            UploadError::Unauthorized => ErrorClass::AuthExpired,
            UploadError::Transport(_) | UploadError::Timeout | UploadError::Server { .. } => {
                ErrorClass::Transient
            }
            UploadError::Rejected { .. }
            | UploadError::ReadArtifact { .. }
            | UploadError::Descriptor(_)
            | UploadError::MalformedResponse(_) => ErrorClass::ArchiveStructural,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            UploadError::Auth(e) => e.error_code(),
            UploadError::Unauthorized => "UPLOAD_UNAUTHORIZED",
            UploadError::Transport(_) => "UPLOAD_TRANSPORT",
            UploadError::Timeout => "UPLOAD_TIMEOUT",
            UploadError::Server { .. } => "UPLOAD_SERVER_ERROR",
            UploadError::Rejected { .. } => "UPLOAD_REJECTED",
            UploadError::ReadArtifact { .. } => "UPLOAD_READ_ARTIFACT",
            UploadError::Descriptor(_) => "UPLOAD_DESCRIPTOR",
            UploadError::MalformedResponse(_) => "UPLOAD_MALFORMED_RESPONSE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_and_changed_accounts_are_not_recoverable() {
        assert!(!AuthError::AccountDisabled("x".into()).is_recoverable());
        assert!(!AuthError::CredentialsChanged("x".into()).is_recoverable());
        assert_eq!(
            AuthError::AccountDisabled("x".into()).class(),
            ErrorClass::AuthInvalid
        );
    }

    #[test]
    fn network_failures_are_transient() {
        assert_eq!(
            AuthError::Transport("refused".into()).class(),
            ErrorClass::Transient
        );
        assert_eq!(UploadError::Timeout.class(), ErrorClass::Transient);
        assert!(UploadError::Server {
            status: 502,
            message: String::new()
        }
        .is_recoverable());
    }

    #[test]
    fn upload_auth_errors_keep_their_class() {
        let err = UploadError::from(AuthError::CredentialsChanged("pw".into()));
        assert_eq!(err.class(), ErrorClass::AuthInvalid);
        assert_eq!(err.error_code(), "AUTH_CREDENTIALS_CHANGED");
    }
}
