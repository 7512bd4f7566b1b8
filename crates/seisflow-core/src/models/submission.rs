use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Identifier generated for each consumed message.
///
/// A timestamp prefix keeps identifiers sortable; the random suffix keeps
/// concurrently generated identifiers distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SubmissionId(String);

impl SubmissionId {
    pub fn generate() -> Self {
        Self(format!(
            "{}-{}",
            Utc::now().format("%Y%m%d-%H%M%S-%6f"),
            Uuid::new_v4()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of parsing one optional metadata field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<T> {
    Parsed(T),
    /// The field was missing or malformed; `value` is the documented default.
    Defaulted { value: T, raw: Option<String> },
}

impl<T: Copy> FieldValue<T> {
    pub fn value(&self) -> T {
        match self {
            FieldValue::Parsed(v) => *v,
            FieldValue::Defaulted { value, .. } => *value,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, FieldValue::Defaulted { .. })
    }
}

/// Contact details read from `user.cfg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submitter {
    pub name: String,
    pub phone: String,
    pub email: String,
}

impl Submitter {
    /// Whether the email field plausibly holds an address we can send to.
    pub fn has_deliverable_email(&self) -> bool {
        let email = self.email.trim();
        match email.split_once('@') {
            Some((local, domain)) => !local.is_empty() && domain.contains('.'),
            None => false,
        }
    }
}

/// Everything derived from one submission archive. Paths point inside the
/// message's workspace and are only valid until that workspace is dropped.
#[derive(Debug, Clone)]
pub struct SubmissionRecord {
    pub submission_id: SubmissionId,
    pub submitter: Submitter,
    pub project_name: String,
    pub sgy_file_paths: Vec<PathBuf>,
    pub qa_data_zip_path: Option<PathBuf>,
    pub processor_zip_path: Option<PathBuf>,
    pub config_file_paths: Vec<PathBuf>,
    pub max_frequency: FieldValue<f64>,
    pub min_velocity: FieldValue<f64>,
    pub geophone_spacing: FieldValue<f64>,
}

impl SubmissionRecord {
    /// Artifacts uploaded as `additional_files`, in upload order.
    pub fn additional_file_paths(&self) -> Vec<PathBuf> {
        self.qa_data_zip_path
            .iter()
            .chain(self.processor_zip_path.iter())
            .chain(self.config_file_paths.iter())
            .cloned()
            .collect()
    }

    pub fn max_slowness(&self) -> f64 {
        1.0 / self.min_velocity.value()
    }
}
