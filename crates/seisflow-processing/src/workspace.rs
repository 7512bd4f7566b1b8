//! Scratch directory owned by one submission.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use seisflow_core::models::SubmissionId;

use crate::error::PipelineError;

const ZIPS_DIR: &str = "Zips";
const EXTRACTED_DIR: &str = "Extracted";
const PROCESSOR_READY_DIR: &str = "ProcessorReady";

/// Per-message scratch area with `Zips/`, `Extracted/` and `ProcessorReady/` subdirectories.
///
/// The directory tree is removed when the value is dropped, including while a panic unwinds.
/// Call [`close`](Self::close) to observe removal errors instead of ignoring them.
#[derive(Debug)]
pub struct SubmissionWorkspace {
    submission_id: SubmissionId,
    dir: TempDir,
}

impl SubmissionWorkspace {
    /// Create a fresh workspace below `root`. `root` is created if it does not exist.
    pub fn create(root: &Path, submission_id: SubmissionId) -> Result<Self, PipelineError> {
        fs::create_dir_all(root).map_err(PipelineError::io(root))?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", submission_id))
            .tempdir_in(root)
            .map_err(PipelineError::io(root))?;

        for sub in [ZIPS_DIR, EXTRACTED_DIR, PROCESSOR_READY_DIR] {
            let path = dir.path().join(sub);
            fs::create_dir(&path).map_err(PipelineError::io(path))?;
        }

        tracing::debug!(path = %dir.path().display(), "Created submission workspace");
        Ok(Self { submission_id, dir })
    }

    pub fn submission_id(&self) -> &SubmissionId {
        &self.submission_id
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn zips_dir(&self) -> PathBuf {
        self.dir.path().join(ZIPS_DIR)
    }

    pub fn extracted_dir(&self) -> PathBuf {
        self.dir.path().join(EXTRACTED_DIR)
    }

    pub fn processor_ready_dir(&self) -> PathBuf {
        self.dir.path().join(PROCESSOR_READY_DIR)
    }

    /// Remove the workspace now, reporting failures.
    pub fn close(self) -> Result<(), PipelineError> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(PipelineError::io(&path))?;
        tracing::debug!(path = %path.display(), "Removed submission workspace");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(root: &Path) -> usize {
        fs::read_dir(root).unwrap().count()
    }

    #[test]
    fn creates_subdirectories_and_removes_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let workspace = SubmissionWorkspace::create(root.path(), SubmissionId::generate()).unwrap();
        let path = workspace.path().to_path_buf();

        assert!(workspace.zips_dir().is_dir());
        assert!(workspace.extracted_dir().is_dir());
        assert!(workspace.processor_ready_dir().is_dir());
        fs::write(workspace.extracted_dir().join("file.txt"), b"x").unwrap();

        drop(workspace);
        assert!(!path.exists());
        assert_eq!(entries(root.path()), 0);
    }

    #[test]
    fn close_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let workspace = SubmissionWorkspace::create(root.path(), SubmissionId::generate()).unwrap();
        let path = workspace.path().to_path_buf();
        workspace.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn removed_when_panic_unwinds() {
        let root = tempfile::tempdir().unwrap();
        let root_path = root.path().to_path_buf();

        let result = std::panic::catch_unwind(move || {
            let workspace =
                SubmissionWorkspace::create(&root_path, SubmissionId::generate()).unwrap();
            fs::write(workspace.zips_dir().join("partial.zip"), b"PK").unwrap();
            panic!("simulated failure mid-extraction");
        });

        assert!(result.is_err());
        assert_eq!(entries(root.path()), 0);
    }

    #[test]
    fn concurrent_workspaces_are_distinct() {
        let root = tempfile::tempdir().unwrap();
        let id = SubmissionId::generate();
        let a = SubmissionWorkspace::create(root.path(), id.clone()).unwrap();
        let b = SubmissionWorkspace::create(root.path(), id).unwrap();
        assert_ne!(a.path(), b.path());
    }
}
