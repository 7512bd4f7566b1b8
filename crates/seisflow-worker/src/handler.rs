//! Per-message orchestration.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::Instrument;

use seisflow_api_client::ProjectUploader;
use seisflow_core::models::SubmissionId;
use seisflow_core::{ErrorMetadata, LogLevel};
use seisflow_infra::notify::DispatchSummary;
use seisflow_infra::NotificationDispatcher;
use seisflow_processing::{SubmissionProcessor, SubmissionWorkspace};

/// What happened to one message. Every variant is acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Uploaded {
        project_id: String,
        notifications: DispatchSummary,
    },
    /// Workspace could not be created.
    WorkspaceFailed { error_code: &'static str },
    PipelineFailed { error_code: &'static str },
    UploadFailed {
        error_code: &'static str,
        recoverable: bool,
    },
    /// A stage panicked; the workspace was still removed.
    Panicked,
}

impl MessageOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, MessageOutcome::Uploaded { .. })
    }
}

fn log_failure<E: ErrorMetadata + std::fmt::Display>(stage: &'static str, err: &E) {
    match err.log_level() {
        LogLevel::Error => tracing::error!(
            stage,
            error = %err,
            error_code = err.error_code(),
            class = %err.class(),
            "Submission failed"
        ),
        LogLevel::Warn => tracing::warn!(
            stage,
            error = %err,
            error_code = err.error_code(),
            class = %err.class(),
            "Submission failed"
        ),
    }
}

pub struct SubmissionHandler {
    pipeline: Arc<dyn SubmissionProcessor>,
    uploader: Arc<dyn ProjectUploader>,
    notifier: Arc<NotificationDispatcher>,
    work_dir: PathBuf,
}

impl SubmissionHandler {
    pub fn new(
        pipeline: Arc<dyn SubmissionProcessor>,
        uploader: Arc<dyn ProjectUploader>,
        notifier: Arc<NotificationDispatcher>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pipeline,
            uploader,
            notifier,
            work_dir: work_dir.into(),
        }
    }

    /// Process one message body to completion.
    ///
    /// Runs in its own task so that a panic in any stage is contained here; the
    /// returned outcome is logged and the caller acknowledges the message regardless.
    pub async fn handle(self: &Arc<Self>, body: Vec<u8>) -> MessageOutcome {
        let submission_id = SubmissionId::generate();
        let span = tracing::info_span!("submission", submission_id = %submission_id);
        let this = Arc::clone(self);

        let task = tokio::spawn(
            async move { this.process(submission_id, body).await }.instrument(span.clone()),
        );

        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                span.in_scope(|| {
                    tracing::error!(error = %e, "Submission handler panicked");
                });
                MessageOutcome::Panicked
            }
        };
        span.in_scope(|| tracing::info!(outcome = ?outcome, "Submission finished"));
        outcome
    }

    async fn process(&self, submission_id: SubmissionId, body: Vec<u8>) -> MessageOutcome {
        tracing::info!(bytes = body.len(), "Processing submission");

        let workspace = match SubmissionWorkspace::create(&self.work_dir, submission_id) {
            Ok(workspace) => workspace,
            Err(e) => {
                log_failure("workspace", &e);
                return MessageOutcome::WorkspaceFailed {
                    error_code: e.error_code(),
                };
            }
        };

        let pipeline = Arc::clone(&self.pipeline);
        let span = tracing::Span::current();
        let blocking = tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            let result = pipeline.process(&body, &workspace);
            (result, workspace)
        });
        let (result, workspace) = match blocking.await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::error!(error = %e, "Archive pipeline panicked");
                return MessageOutcome::Panicked;
            }
        };

        let record = match result {
            Ok(record) => record,
            Err(e) => {
                log_failure("pipeline", &e);
                return MessageOutcome::PipelineFailed {
                    error_code: e.error_code(),
                };
            }
        };

        let created = match self.uploader.upload(&record).await {
            Ok(created) => created,
            Err(e) => {
                log_failure("upload", &e);
                return MessageOutcome::UploadFailed {
                    error_code: e.error_code(),
                    recoverable: e.is_recoverable(),
                };
            }
        };

        let notifications = self.notifier.dispatch(&record, &created).await;

        if let Err(e) = workspace.close() {
            tracing::warn!(error = %e, "Failed to remove submission workspace");
        }

        MessageOutcome::Uploaded {
            project_id: created.id,
            notifications,
        }
    }
}
