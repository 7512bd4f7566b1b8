use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::submission::SubmissionRecord;

/// Frequency/slowness sample count the backend uses for new projects.
pub const PLOT_SAMPLE_COUNT: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    NotStarted,
    InProgress,
    Completed,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    VeryHigh,
    High,
    Medium,
    Low,
    VeryLow,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlotLimits {
    pub num_freq: u32,
    pub max_freq: f64,
    pub num_slow: u32,
    pub max_slow: f64,
}

/// JSON body of the `project_data` multipart part.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectDescriptor {
    pub name: String,
    pub status: ProjectStatus,
    pub priority: Priority,
    pub received_date: DateTime<Utc>,
    /// JSON-encoded [`PlotLimits`]; the backend stores it as an opaque string.
    pub plot_limits: String,
}

impl ProjectDescriptor {
    pub fn from_record(record: &SubmissionRecord) -> Result<Self, serde_json::Error> {
        let limits = PlotLimits {
            num_freq: PLOT_SAMPLE_COUNT,
            max_freq: record.max_frequency.value(),
            num_slow: PLOT_SAMPLE_COUNT,
            max_slow: record.max_slowness(),
        };
        Ok(Self {
            name: record.project_name.clone(),
            status: ProjectStatus::NotStarted,
            priority: Priority::Medium,
            received_date: Utc::now(),
            plot_limits: serde_json::to_string(&limits)?,
        })
    }
}

/// Successful `POST /project/create` response (only the fields the worker reads).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProjectCreated {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number project id, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldValue, SubmissionId, Submitter};

    fn record() -> SubmissionRecord {
        SubmissionRecord {
            submission_id: SubmissionId::generate(),
            submitter: Submitter {
                name: "Jane Doe".to_string(),
                phone: "555-1234".to_string(),
                email: "jane@example.com".to_string(),
            },
            project_name: "Site7".to_string(),
            sgy_file_paths: vec![],
            qa_data_zip_path: None,
            processor_zip_path: None,
            config_file_paths: vec![],
            max_frequency: FieldValue::Parsed(40.0),
            min_velocity: FieldValue::Parsed(100.0),
            geophone_spacing: FieldValue::Parsed(2.0),
        }
    }

    #[test]
    fn descriptor_embeds_plot_limits() {
        let descriptor = ProjectDescriptor::from_record(&record()).unwrap();
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["name"], "Site7");
        assert_eq!(json["status"], "not_started");
        assert_eq!(json["priority"], "medium");

        let limits: serde_json::Value =
            serde_json::from_str(json["plot_limits"].as_str().unwrap()).unwrap();
        assert_eq!(limits["numFreq"], 50);
        assert_eq!(limits["maxFreq"], 40.0);
        assert_eq!(limits["maxSlow"], 0.01);
    }

    #[test]
    fn project_id_accepts_string_or_number() {
        let a: ProjectCreated = serde_json::from_str(r#"{"id":"abc","name":"x"}"#).unwrap();
        assert_eq!(a.id, "abc");
        let b: ProjectCreated = serde_json::from_str(r#"{"id":42}"#).unwrap();
        assert_eq!(b.id, "42");
        assert!(serde_json::from_str::<ProjectCreated>(r#"{"id":null}"#).is_err());
    }
}
