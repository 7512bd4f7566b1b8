//! Extract → classify → derive metadata → package.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use seisflow_core::models::{FieldValue, SubmissionRecord};

use crate::archive;
use crate::error::PipelineError;
use crate::metadata::{
    self, KeyValues, DEFAULT_GEOPHONE_SPACING, DEFAULT_MAX_FREQUENCY, DEFAULT_MIN_VELOCITY,
};
use crate::workspace::SubmissionWorkspace;

const USER_CFG: &str = "user.cfg";
const FOR_PROCESSOR: &str = "for_processor.txt";
const SAVE_DIR: &str = "Save";
const QA_DATA_DIR: &str = "QaData";
const RUN_CONFIG: &str = "run_config.ini";
const LIMITS: &str = "limits.txt";

/// Turns the raw bytes of one message into a [`SubmissionRecord`] inside `workspace`.
///
/// Called from a blocking thread; a panic unwinds through the workspace, which removes it.
pub trait SubmissionProcessor: Send + Sync {
    fn process(
        &self,
        raw: &[u8],
        workspace: &SubmissionWorkspace,
    ) -> Result<SubmissionRecord, PipelineError>;
}

/// Builds a [`SubmissionRecord`] from raw archive bytes.
///
/// Synchronous; callers on an async runtime should run it on a blocking thread.
#[derive(Debug, Default, Clone)]
pub struct ArchivePipeline;

impl ArchivePipeline {
    pub fn new() -> Self {
        Self
    }

    /// Run every stage inside `workspace`. Any required stage failing fails the whole call.
    pub fn process(
        &self,
        raw: &[u8],
        workspace: &SubmissionWorkspace,
    ) -> Result<SubmissionRecord, PipelineError> {
        let submission_id = workspace.submission_id().clone();
        let id = submission_id.as_str();

        let zip_path = workspace.zips_dir().join(format!("{}.zip", id));
        fs::write(&zip_path, raw).map_err(PipelineError::io(&zip_path))?;
        tracing::info!(bytes = raw.len(), "Stored incoming archive");

        let root = workspace.extracted_dir().join(id);
        let extracted = archive::extract(&zip_path, &root)?;
        tracing::info!(files = extracted, "Archive extracted");

        let user_cfg_path = root.join(USER_CFG);
        let user_cfg = KeyValues::read(&user_cfg_path)?;
        if user_cfg.is_none() {
            tracing::warn!("user.cfg not found, submitter details unknown");
        }
        let submitter = metadata::submitter(user_cfg.as_ref());
        if user_cfg.is_some()
            && [&submitter.name, &submitter.phone, &submitter.email]
                .iter()
                .any(|v| v.as_str() == metadata::UNKNOWN)
        {
            tracing::warn!(
                name = %submitter.name,
                phone = %submitter.phone,
                email = %submitter.email,
                "user.cfg is missing submitter fields"
            );
        }

        let qa_dir = root.join(QA_DATA_DIR);
        let run_config_path = qa_dir.join(RUN_CONFIG);
        let limits_path = qa_dir.join(LIMITS);
        let run_config = KeyValues::read(&run_config_path)?;
        let limits = KeyValues::read(&limits_path)?;

        let max_frequency = resolve(
            metadata::positive_field(limits.as_ref(), "max_frequency", DEFAULT_MAX_FREQUENCY),
            "max_frequency",
        );
        let min_velocity = resolve(
            metadata::positive_field(limits.as_ref(), "min_velocity", DEFAULT_MIN_VELOCITY),
            "min_velocity",
        );
        let geophone_spacing = resolve(
            metadata::positive_field(
                run_config.as_ref(),
                "geophone_spacing",
                DEFAULT_GEOPHONE_SPACING,
            ),
            "geophone_spacing",
        );

        let project_name = metadata::project_name(run_config.as_ref())?;
        tracing::info!(project = %project_name, "Resolved project name");

        let sgy_file_paths = find_sgy_files(&root.join(SAVE_DIR))?;
        if sgy_file_paths.is_empty() {
            tracing::warn!("No .sgy files found in Save/");
        } else {
            tracing::info!(count = sgy_file_paths.len(), "Found .sgy files");
        }

        let processor_ready = workspace.processor_ready_dir();
        let qa_data_zip_path = if qa_dir.is_dir() {
            let dest = processor_ready.join(format!("{}_QaData.zip", id));
            let files = archive::zip_directory(&qa_dir, &dest)?;
            tracing::info!(files, "Packaged QaData");
            Some(dest)
        } else {
            tracing::info!("No QaData directory in submission");
            None
        };

        let for_processor_path = root.join(FOR_PROCESSOR);
        write_for_processor(
            &for_processor_path,
            &max_frequency,
            &min_velocity,
            &geophone_spacing,
        )?;

        let processor_zip_path = processor_ready.join(format!("{}.zip", id));
        let mut bundle: Vec<(PathBuf, String)> = sgy_file_paths
            .iter()
            .filter_map(|p| {
                let name = p.file_name()?.to_string_lossy();
                Some((p.clone(), format!("{}/{}", SAVE_DIR, name)))
            })
            .collect();
        if user_cfg.is_some() {
            bundle.push((user_cfg_path.clone(), USER_CFG.to_string()));
        }
        bundle.push((for_processor_path.clone(), FOR_PROCESSOR.to_string()));
        archive::zip_files(&processor_zip_path, &bundle)?;
        tracing::info!(files = bundle.len(), "Packaged processor-ready archive");

        let config_file_paths = [
            user_cfg_path,
            for_processor_path,
            run_config_path,
            limits_path,
        ]
        .into_iter()
        .filter(|p| p.is_file())
        .collect();

        Ok(SubmissionRecord {
            submission_id,
            submitter,
            project_name,
            sgy_file_paths,
            qa_data_zip_path,
            processor_zip_path: Some(processor_zip_path),
            config_file_paths,
            max_frequency,
            min_velocity,
            geophone_spacing,
        })
    }
}

impl SubmissionProcessor for ArchivePipeline {
    fn process(
        &self,
        raw: &[u8],
        workspace: &SubmissionWorkspace,
    ) -> Result<SubmissionRecord, PipelineError> {
        ArchivePipeline::process(self, raw, workspace)
    }
}

fn resolve(value: FieldValue<f64>, field: &str) -> FieldValue<f64> {
    if let FieldValue::Defaulted { value: default, raw } = &value {
        tracing::warn!(
            field,
            raw = raw.as_deref().unwrap_or("<missing>"),
            default = *default,
            "Run metadata field unusable, using default"
        );
    }
    value
}

/// `.sgy` files directly inside `dir`, sorted. A missing directory yields an empty list.
fn find_sgy_files(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(PipelineError::Io {
                path: dir.to_path_buf(),
                source: e,
            })
        }
    };

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(PipelineError::io(dir))?.path();
        let is_sgy = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("sgy"));
        if is_sgy && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn write_for_processor(
    path: &Path,
    max_frequency: &FieldValue<f64>,
    min_velocity: &FieldValue<f64>,
    spacing: &FieldValue<f64>,
) -> Result<(), PipelineError> {
    let contents = format!(
        "Max frequency={}\nMin velocity={}\nSpacing={}\n",
        max_frequency.value(),
        min_velocity.value(),
        spacing.value()
    );
    fs::write(path, contents).map_err(PipelineError::io(path))
}
