use std::sync::Arc;

use seisflow_core::models::{ProjectCreated, SubmissionRecord};
use seisflow_core::ErrorMetadata;

use super::templates::{self, DownloadLinks};
use super::{Mailer, OutboundEmail};

/// Counts for one dispatch; failures are already logged.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub attempted: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Sends the "request received" and "data received" notifications after an upload.
///
/// Best effort: a failed send is logged and counted, never returned.
pub struct NotificationDispatcher {
    mailer: Arc<dyn Mailer>,
    internal_recipients: Vec<String>,
    bcc: Vec<String>,
    download_base_url: String,
}

impl NotificationDispatcher {
    pub fn new(
        mailer: Arc<dyn Mailer>,
        internal_recipients: Vec<String>,
        bcc: Vec<String>,
        download_base_url: impl Into<String>,
    ) -> Self {
        Self {
            mailer,
            internal_recipients,
            bcc,
            download_base_url: download_base_url.into(),
        }
    }

    pub async fn dispatch(
        &self,
        record: &SubmissionRecord,
        created: &ProjectCreated,
    ) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        let submitter = &record.submitter;

        if submitter.has_deliverable_email() {
            let email = OutboundEmail {
                subject: templates::REQUEST_RECEIVED_SUBJECT.to_string(),
                html_body: templates::request_received(&submitter.name),
                recipients: vec![submitter.email.trim().to_string()],
                bcc: self.bcc.clone(),
                attachments: Vec::new(),
            };
            self.send("request_received", email, &mut summary).await;
        } else {
            tracing::warn!(
                email = %submitter.email,
                "Submitter email not deliverable, skipping request-received notification"
            );
            summary.skipped += 1;
        }

        if self.internal_recipients.is_empty() {
            tracing::warn!("No internal recipients configured, skipping data-received notification");
            summary.skipped += 1;
        } else {
            let links = DownloadLinks::new(&self.download_base_url, record.submission_id.as_str());
            let email = OutboundEmail {
                subject: templates::data_received_subject(&submitter.name),
                html_body: templates::data_received(
                    &submitter.name,
                    &submitter.email,
                    &created.id,
                    &links,
                ),
                recipients: self.internal_recipients.clone(),
                bcc: self.bcc.clone(),
                attachments: Vec::new(),
            };
            self.send("data_received", email, &mut summary).await;
        }

        summary
    }

    async fn send(&self, kind: &'static str, email: OutboundEmail, summary: &mut DispatchSummary) {
        summary.attempted += 1;
        match self.mailer.send_email(email).await {
            Ok(()) => tracing::info!(notification = kind, "Notification sent"),
            Err(e) => {
                summary.failed += 1;
                tracing::warn!(
                    notification = kind,
                    error = %e,
                    error_code = e.error_code(),
                    "Notification failed; upload already completed"
                );
            }
        }
    }
}
