use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::errors::JobError;

const MIN_INSTRUCTION_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A change request against one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    #[serde(rename = "repositoryUrl", alias = "githuburl")]
    pub repository_url: String,
    #[serde(alias = "prompt")]
    pub instruction: String,
}

impl JobRequest {
    pub fn new(repository_url: &str, instruction: &str) -> Self {
        Self {
            repository_url: repository_url.trim().to_string(),
            instruction: instruction.trim().to_string(),
        }
    }

    /// Check both fields, reporting every problem found.
    pub fn validate(&self) -> Result<(), Vec<JobError>> {
        let mut errors = Vec::new();

        match Url::parse(self.repository_url.trim()) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => {}
            Ok(_) => errors.push(JobError::InvalidInput {
                field: "repositoryUrl".to_string(),
                message: "must be an http(s) URL with a host".to_string(),
            }),
            Err(_) => errors.push(JobError::InvalidInput {
                field: "repositoryUrl".to_string(),
                message: "must be a valid URL".to_string(),
            }),
        }

        if self.instruction.trim().chars().count() < MIN_INSTRUCTION_LEN {
            errors.push(JobError::InvalidInput {
                field: "instruction".to_string(),
                message: format!("must be at least {} characters", MIN_INSTRUCTION_LEN),
            });
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// What a completed job produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    /// `None` when the pipeline changed nothing.
    pub pr_url: Option<String>,
    pub branch: Option<String>,
    pub applied_files: Vec<String>,
    pub search_attempts: u32,
    pub validation_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running { attempt: u32 },
    Completed { result: JobResult },
    Failed { reason: String },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running { .. } => "running",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Status change broadcast to progress subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: JobId,
    #[serde(flatten)]
    pub status: JobStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: JobId,
    pub request: JobRequest,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(request: JobRequest) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            request,
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_accepts_both_field_spellings() {
        let a: JobRequest =
            serde_json::from_str(r#"{"githuburl": "https://github.com/acme/calc", "prompt": "add divide"}"#).unwrap();
        let b: JobRequest =
            serde_json::from_str(r#"{"repositoryUrl": "https://github.com/acme/calc", "instruction": "add divide"}"#)
                .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_validate_ok() {
        assert!(JobRequest::new("https://github.com/acme/calc", "add a divide function").validate().is_ok());
    }

    #[test]
    fn test_validate_reports_every_field() {
        let errors = JobRequest::new("github.com/acme/calc", "  hi  ").validate().unwrap_err();
        let fields: Vec<String> = errors
            .iter()
            .map(|e| match e {
                JobError::InvalidInput { field, .. } => field.clone(),
                other => panic!("unexpected error {other:?}"),
            })
            .collect();
        assert_eq!(fields, vec!["repositoryUrl", "instruction"]);
    }

    #[test]
    fn test_validate_rejects_non_http_scheme() {
        let errors = JobRequest::new("file:///etc/passwd", "add a divide function").validate().unwrap_err();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_instruction_length_counts_trimmed_chars() {
        assert!(JobRequest::new("https://github.com/a/b", "  abcd   ").validate().is_err());
        assert!(JobRequest::new("https://github.com/a/b", "abcde").validate().is_ok());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_value(JobStatus::Running { attempt: 2 }).unwrap();
        assert_eq!(json, serde_json::json!({"status": "running", "attempt": 2}));
        let json = serde_json::to_value(JobStatus::Failed { reason: "boom".into() }).unwrap();
        assert_eq!(json, serde_json::json!({"status": "failed", "reason": "boom"}));
        assert!(JobStatus::Completed { result: JobResult::default() }.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
    }

    #[test]
    fn test_event_flattens_status() {
        let id = JobId::new();
        let event = JobEvent {
            job_id: id,
            status: JobStatus::Pending,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["job_id"], id.to_string());
    }

    #[test]
    fn test_job_id_round_trips_through_string() {
        let id = JobId::new();
        assert_eq!(id.to_string().parse::<JobId>().unwrap(), id);
        assert!("not-a-uuid".parse::<JobId>().is_err());
    }
}
