//! SMTP delivery via lettre.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;

use seisflow_core::{EmailConfig, SmtpTls};

use super::{Mailer, NotifyError, OutboundEmail};

#[derive(Clone)]
pub struct EmailService {
    mailer: Arc<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
}

impl EmailService {
    /// Create the service from config. `Ok(None)` when email is disabled.
    pub fn from_config(config: &EmailConfig) -> Result<Option<Self>, NotifyError> {
        if !config.enabled {
            tracing::debug!("Email disabled (EMAIL_ENABLED=false)");
            return Ok(None);
        }
        let host = config
            .smtp_host
            .as_deref()
            .ok_or_else(|| NotifyError::Transport("SMTP_HOST is not set".to_string()))?;
        let from_address = config
            .smtp_from
            .as_deref()
            .ok_or_else(|| NotifyError::Transport("SMTP_FROM is not set".to_string()))?;
        let from = Mailbox::new(config.smtp_from_name.clone(), parse_address(from_address)?);

        let builder = match config.smtp_tls {
            SmtpTls::Implicit => AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                .map_err(|e| NotifyError::Transport(e.to_string()))?,
            SmtpTls::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| NotifyError::Transport(e.to_string()))?,
            SmtpTls::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host),
        };
        let builder = builder.port(config.smtp_port);
        let builder = match (&config.smtp_user, &config.smtp_password) {
            (Some(user), Some(password)) => builder.credentials(Credentials::new(
                user.clone(),
                password.expose().to_string(),
            )),
            _ => builder,
        };

        tracing::info!(
            host = %host,
            port = config.smtp_port,
            tls = ?config.smtp_tls,
            "Email service initialized"
        );
        Ok(Some(Self {
            mailer: Arc::new(builder.build()),
            from,
        }))
    }
}

fn parse_address(address: &str) -> Result<Address, NotifyError> {
    address
        .trim()
        .parse::<Address>()
        .map_err(|e| NotifyError::InvalidAddress {
            address: address.to_string(),
            message: e.to_string(),
        })
}

/// Build the MIME message: multipart/mixed with the HTML body followed by attachments.
pub(super) async fn build_message(
    from: &Mailbox,
    email: &OutboundEmail,
) -> Result<Message, NotifyError> {
    let mut builder = Message::builder().from(from.clone()).subject(&email.subject);

    let mut to_count = 0;
    for recipient in &email.recipients {
        match parse_address(recipient) {
            Ok(addr) => {
                builder = builder.to(Mailbox::new(None, addr));
                to_count += 1;
            }
            Err(e) => tracing::warn!(error = %e, "Skipping invalid recipient"),
        }
    }
    if to_count == 0 {
        return Err(NotifyError::NoRecipients);
    }
    for recipient in &email.bcc {
        match parse_address(recipient) {
            Ok(addr) => builder = builder.bcc(Mailbox::new(None, addr)),
            Err(e) => tracing::warn!(error = %e, "Skipping invalid BCC recipient"),
        }
    }

    let mut body = MultiPart::mixed().singlepart(SinglePart::html(email.html_body.clone()));
    for path in &email.attachments {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Attachment not readable, skipping"
                );
                continue;
            }
        };
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        let content_type = ContentType::parse("application/octet-stream")
            .map_err(|e| NotifyError::Build(e.to_string()))?;
        body = body.singlepart(Attachment::new(file_name).body(bytes, content_type));
    }

    builder
        .multipart(body)
        .map_err(|e| NotifyError::Build(e.to_string()))
}

#[async_trait]
impl Mailer for EmailService {
    async fn send_email(&self, email: OutboundEmail) -> Result<(), NotifyError> {
        let message = build_message(&self.from, &email).await?;
        self.mailer
            .send(message)
            .await
            .map_err(|e| NotifyError::Send(e.to_string()))?;
        tracing::info!(
            subject = %email.subject,
            recipients = email.recipients.len(),
            bcc = email.bcc.len(),
            "Email sent"
        );
        Ok(())
    }
}
