//! Project creation upload (`POST /project/create`).

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, StatusCode};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::io::ReaderStream;

use seisflow_core::models::{ProjectCreated, ProjectDescriptor, SubmissionRecord};

use crate::error::UploadError;
use crate::token_manager::{AccessToken, TokenManager};
use crate::{build_http_client, error_detail};

/// Sends a processed submission to the backend.
#[async_trait]
pub trait ProjectUploader: Send + Sync {
    async fn upload(&self, record: &SubmissionRecord) -> Result<ProjectCreated, UploadError>;
}

pub struct BackendUploader {
    client: Client,
    base_url: String,
    tokens: Arc<TokenManager>,
}

enum Attempt {
    Created(ProjectCreated),
    Unauthorized,
}

impl BackendUploader {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        tokens: Arc<TokenManager>,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    /// Open an artifact as a streamed part; only its metadata is read up front.
    async fn file_part(path: &Path) -> Result<Part, UploadError> {
        let read_err = |source| UploadError::ReadArtifact {
            path: path.display().to_string(),
            source,
        };
        let file = tokio::fs::File::open(path).await.map_err(read_err)?;
        let length = file.metadata().await.map_err(read_err)?.len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());

        let body = Body::wrap_stream(ReaderStream::new(file));
        Ok(Part::stream_with_length(body, length)
            .file_name(file_name)
            .mime_str("application/octet-stream")
            .map_err(|e| UploadError::Transport(e.to_string()))?)
    }

    /// Build a fresh form; multipart bodies are consumed by each send, so a retry reopens the files.
    async fn build_form(
        &self,
        descriptor_json: &str,
        record: &SubmissionRecord,
    ) -> Result<Form, UploadError> {
        let mut form = Form::new().text("project_data", descriptor_json.to_string());
        for path in &record.sgy_file_paths {
            form = form.part("sgy_files", Self::file_part(path).await?);
        }
        for path in record.additional_file_paths() {
            form = form.part("additional_files", Self::file_part(&path).await?);
        }
        Ok(form)
    }

    async fn attempt(&self, token: &AccessToken, form: Form) -> Result<Attempt, UploadError> {
        let response = self
            .client
            .post(format!("{}/project/create", self.base_url))
            .bearer_auth(token.as_str())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UploadError::Timeout
                } else {
                    UploadError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Ok(Attempt::Unauthorized);
        }
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = error_detail(&text);
            return Err(if status.is_server_error() {
                UploadError::Server {
                    status: status.as_u16(),
                    message,
                }
            } else {
                UploadError::Rejected {
                    status: status.as_u16(),
                    message,
                }
            });
        }

        let created = response
            .json::<ProjectCreated>()
            .await
            .map_err(|e| UploadError::MalformedResponse(e.to_string()))?;
        Ok(Attempt::Created(created))
    }
}

#[async_trait]
impl ProjectUploader for BackendUploader {
    /// Create the project with all artifacts in one request.
    ///
    /// A 401 triggers one token refresh and exactly one retry; a second 401 is returned
    /// as [`UploadError::Unauthorized`]. Other failures are returned without retrying.
    #[tracing::instrument(skip_all, fields(submission_id = %record.submission_id, project = %record.project_name))]
    async fn upload(&self, record: &SubmissionRecord) -> Result<ProjectCreated, UploadError> {
        let descriptor = serde_json::to_string(&ProjectDescriptor::from_record(record)?)?;
        tracing::info!(
            sgy_files = record.sgy_file_paths.len(),
            additional_files = record.additional_file_paths().len(),
            "Uploading project"
        );

        let token = self.tokens.get_valid_access_token().await?;
        let form = self.build_form(&descriptor, record).await?;
        if let Attempt::Created(created) = self.attempt(&token, form).await? {
            tracing::info!(project_id = %created.id, "Project created");
            return Ok(created);
        }

        tracing::warn!("Upload rejected as unauthorized, refreshing token and retrying once");
        let token = self.tokens.handle_unauthorized(&token).await?;
        let form = self.build_form(&descriptor, record).await?;
        match self.attempt(&token, form).await? {
            Attempt::Created(created) => {
                tracing::info!(project_id = %created.id, "Project created after token refresh");
                Ok(created)
            }
            Attempt::Unauthorized => Err(UploadError::Unauthorized),
        }
    }
}
