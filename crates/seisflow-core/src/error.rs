//! Error classification
//!
//! Each crate defines its own typed errors; they all describe themselves through
//! [`ErrorMetadata`] so the consumer loop can decide between "reconnect" and
//! "log and move on" without inspecting concrete error types.

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Recoverable issues and substituted defaults
    Warn,
    /// Failures an operator should look at
    Error,
}

/// Failure taxonomy for one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network unreachable, broker drop, backend 5xx, timeout.
    Transient,
    /// Access token rejected; refresh and retry once.
    AuthExpired,
    /// Disabled account, changed credentials, bad configured secrets. Never retried.
    AuthInvalid,
    /// Malformed archive, missing project name, path traversal.
    ArchiveStructural,
    /// Optional numeric metadata could not be parsed; a default was used.
    PartialMetadata,
    /// Notification could not be sent after a successful upload.
    Notification,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Transient => "transient",
            ErrorClass::AuthExpired => "auth_expired",
            ErrorClass::AuthInvalid => "auth_invalid",
            ErrorClass::ArchiveStructural => "archive_structural",
            ErrorClass::PartialMetadata => "partial_metadata",
            ErrorClass::Notification => "notification",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Self-description implemented by every error type in the workspace.
pub trait ErrorMetadata {
    fn class(&self) -> ErrorClass;

    /// Machine-readable error code (e.g. "AUTH_ACCOUNT_DISABLED")
    fn error_code(&self) -> &'static str;

    /// Whether retrying the same operation later could succeed
    fn is_recoverable(&self) -> bool {
        matches!(self.class(), ErrorClass::Transient | ErrorClass::AuthExpired)
    }

    fn log_level(&self) -> LogLevel {
        match self.class() {
            ErrorClass::Transient
            | ErrorClass::AuthExpired
            | ErrorClass::PartialMetadata
            | ErrorClass::Notification => LogLevel::Warn,
            ErrorClass::AuthInvalid | ErrorClass::ArchiveStructural => LogLevel::Error,
        }
    }
}
