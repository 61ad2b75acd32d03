//! JSON request and response bodies of the HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::jobs::{JobOutput, JobState, JobStatus, JobSummary};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRequest {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartResponse {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopResponse {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub id: String,
    pub status: JobState,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
}

impl StatusResponse {
    pub fn new(id: String, status: JobStatus) -> Self {
        Self {
            id,
            status: status.state,
            exit_code: status.exit_code,
            error: status.error,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputResponse {
    pub id: String,
    pub stdout: String,
    pub stderr: String,
}

impl OutputResponse {
    pub fn new(id: String, output: JobOutput) -> Self {
        Self {
            id,
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobListItem {
    pub id: String,
    pub owner: String,
    pub program: String,
    pub args: Vec<String>,
    pub status: JobState,
    pub exit_code: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl From<JobSummary> for JobListItem {
    fn from(summary: JobSummary) -> Self {
        Self {
            id: summary.id.to_string(),
            owner: summary.owner,
            program: summary.program,
            args: summary.args,
            status: summary.status.state,
            exit_code: summary.status.exit_code,
            created_at: summary.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse {
    pub jobs: Vec<JobListItem>,
}

/// Body of every 4xx/5xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_response_uses_camel_case_and_string_state() {
        let body = StatusResponse::new("abc".into(), JobStatus::completed(0));
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"id": "abc", "status": "completed", "exitCode": 0, "error": null})
        );
    }

    #[test]
    fn start_request_args_default_to_empty() {
        let req: StartRequest = serde_json::from_value(json!({"program": "/bin/true"})).unwrap();
        assert_eq!(req.program, "/bin/true");
        assert!(req.args.is_empty());
    }
}
