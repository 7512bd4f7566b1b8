//! Archive pipeline error types

use std::io;
use std::path::PathBuf;

use seisflow_core::{ErrorClass, ErrorMetadata};
use zip::result::ZipError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Submission is not a readable zip archive: {0}")]
    InvalidArchive(#[source] ZipError),

    #[error("Archive entry {entry:?} resolves outside the extraction directory")]
    PathTraversal { entry: String },

    #[error("Cannot determine project name: {0}")]
    MissingProjectName(String),

    #[error("Failed to package {}: {source}", .path.display())]
    Package {
        path: PathBuf,
        #[source]
        source: ZipError,
    },
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| PipelineError::Io { path, source }
    }
}

impl ErrorMetadata for PipelineError {
    fn class(&self) -> ErrorClass {
        match self {
            PipelineError::Io { .. } | PipelineError::Package { .. } => ErrorClass::Transient,
            PipelineError::InvalidArchive(_)
            | PipelineError::PathTraversal { .. }
            | PipelineError::MissingProjectName(_) => ErrorClass::ArchiveStructural,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            PipelineError::Io { .. } => "PIPELINE_IO",
            PipelineError::InvalidArchive(_) => "ARCHIVE_INVALID",
            PipelineError::PathTraversal { .. } => "ARCHIVE_PATH_TRAVERSAL",
            PipelineError::MissingProjectName(_) => "ARCHIVE_MISSING_PROJECT_NAME",
            PipelineError::Package { .. } => "PIPELINE_PACKAGE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seisflow_core::LogLevel;

    #[test]
    fn structural_failures_are_not_recoverable() {
        let err = PipelineError::PathTraversal {
            entry: "../../evil.txt".to_string(),
        };
        assert_eq!(err.class(), ErrorClass::ArchiveStructural);
        assert!(!err.is_recoverable());
        assert_eq!(err.log_level(), LogLevel::Error);
        assert!(err.to_string().contains("../../evil.txt"));
    }

    #[test]
    fn io_failure_is_transient() {
        let err = PipelineError::io("/tmp/x")(io::Error::new(io::ErrorKind::Other, "disk full"));
        assert_eq!(err.error_code(), "PIPELINE_IO");
        assert_eq!(err.class(), ErrorClass::Transient);
    }
}
