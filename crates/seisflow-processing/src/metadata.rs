//! Key/value config files shipped inside a submission (`user.cfg`, `run_config.ini`, `limits.txt`).

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use seisflow_core::models::{FieldValue, Submitter};

use crate::error::PipelineError;

/// Placeholder for submitter fields missing from `user.cfg`.
pub const UNKNOWN: &str = "unknown";

pub const DEFAULT_MAX_FREQUENCY: f64 = 50.0;
/// Minimum velocity that yields the default maximum slowness of 0.015 s/m.
pub const DEFAULT_MIN_VELOCITY: f64 = 1.0 / 0.015;
pub const DEFAULT_GEOPHONE_SPACING: f64 = 1.0;

/// Parsed INI-style key/value file.
///
/// Keys are case-insensitive, `=` and `:` both separate key from value, `#` and `;`
/// start comment lines and section headers are ignored. The first occurrence of a key wins.
#[derive(Debug, Default, Clone)]
pub struct KeyValues {
    entries: HashMap<String, String>,
}

impl KeyValues {
    pub fn parse(text: &str) -> Self {
        let mut entries = HashMap::new();
        for line in text.lines() {
            let line = line.trim().trim_start_matches('\u{feff}');
            if line.is_empty()
                || line.starts_with('#')
                || line.starts_with(';')
                || (line.starts_with('[') && line.ends_with(']'))
            {
                continue;
            }
            let Some(pos) = line.find(['=', ':']) else {
                continue;
            };
            let key = line[..pos].trim().to_lowercase();
            if key.is_empty() {
                continue;
            }
            let value = line[pos + 1..].trim().to_string();
            entries.entry(key).or_insert(value);
        }
        Self { entries }
    }

    /// Read and parse `path`. `Ok(None)` if the file does not exist.
    pub fn read(path: &Path) -> Result<Option<Self>, PipelineError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(Self::parse(&String::from_utf8_lossy(&bytes)))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PipelineError::Io {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    /// Non-empty value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_lowercase())
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// Submitter contact details. Missing file or keys degrade to [`UNKNOWN`].
pub fn submitter(user_cfg: Option<&KeyValues>) -> Submitter {
    let field = |key: &str| {
        user_cfg
            .and_then(|kv| kv.get(key))
            .map(str::to_string)
            .unwrap_or_else(|| UNKNOWN.to_string())
    };
    Submitter {
        name: field("name"),
        phone: field("phone"),
        email: field("email"),
    }
}

/// Parse one strictly positive, finite number, falling back to `default`.
pub fn positive_field(kv: Option<&KeyValues>, key: &str, default: f64) -> FieldValue<f64> {
    let raw = kv.and_then(|kv| kv.get(key));
    match raw.map(|r| r.parse::<f64>()) {
        Some(Ok(v)) if v.is_finite() && v > 0.0 => FieldValue::Parsed(v),
        _ => FieldValue::Defaulted {
            value: default,
            raw: raw.map(str::to_string),
        },
    }
}

/// Project name from `record_output_dir`: the name of the directory containing the
/// output directory. `C:\data\Site7\Records` and `/data/Site7/Records/` both yield `Site7`.
pub fn project_name(run_config: Option<&KeyValues>) -> Result<String, PipelineError> {
    let run_config = run_config.ok_or_else(|| {
        PipelineError::MissingProjectName("QaData/run_config.ini not found".to_string())
    })?;
    let dir = run_config.get("record_output_dir").ok_or_else(|| {
        PipelineError::MissingProjectName("record_output_dir not set in run_config.ini".to_string())
    })?;

    let parts: Vec<&str> = dir
        .split(['/', '\\'])
        .filter(|p| !p.is_empty())
        .collect();
    match parts.len().checked_sub(2).map(|i| parts[i].trim()) {
        // `C:` is a drive root, not a directory name.
        Some(name) if !name.is_empty() && !name.ends_with(':') => Ok(name.to_string()),
        _ => Err(PipelineError::MissingProjectName(format!(
            "record_output_dir {:?} has no parent directory",
            dir
        ))),
    }
}
