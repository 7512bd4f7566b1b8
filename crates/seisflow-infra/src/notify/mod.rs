//! Outbound email.
//!
//! [`Mailer`] is the sending seam; [`EmailService`] implements it over SMTP and
//! [`NoopMailer`] stands in when email is disabled. [`NotificationDispatcher`]
//! renders and sends the two post-upload notifications.

mod dispatcher;
mod email;
pub mod templates;

use async_trait::async_trait;
use std::path::PathBuf;

use seisflow_core::{ErrorClass, ErrorMetadata};

pub use dispatcher::{DispatchSummary, NotificationDispatcher};
pub use email::EmailService;

/// One HTML email.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEmail {
    pub subject: String,
    pub html_body: String,
    pub recipients: Vec<String>,
    pub bcc: Vec<String>,
    /// Files attached by path; missing files are skipped.
    pub attachments: Vec<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Email has no valid recipients")]
    NoRecipients,

    #[error("Invalid email address {address:?}: {message}")]
    InvalidAddress { address: String, message: String },

    #[error("Failed to configure SMTP transport: {0}")]
    Transport(String),

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("SMTP send failed: {0}")]
    Send(String),
}

impl ErrorMetadata for NotifyError {
    fn class(&self) -> ErrorClass {
        ErrorClass::Notification
    }

    fn error_code(&self) -> &'static str {
        match self {
            NotifyError::NoRecipients => "NOTIFY_NO_RECIPIENTS",
            NotifyError::InvalidAddress { .. } => "NOTIFY_INVALID_ADDRESS",
            NotifyError::Transport(_) => "NOTIFY_TRANSPORT",
            NotifyError::Build(_) => "NOTIFY_BUILD",
            NotifyError::Send(_) => "NOTIFY_SEND",
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_email(&self, email: OutboundEmail) -> Result<(), NotifyError>;
}

/// Logs and drops every email.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMailer;

#[async_trait]
impl Mailer for NoopMailer {
    async fn send_email(&self, email: OutboundEmail) -> Result<(), NotifyError> {
        tracing::info!(
            subject = %email.subject,
            recipients = email.recipients.len(),
            "Email disabled, skipping notification"
        );
        Ok(())
    }
}
