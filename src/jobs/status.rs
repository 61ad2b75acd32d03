use serde::{Deserialize, Serialize};

/// Exit code recorded for a job that was ended by the kill signal.
pub const STOPPED_EXIT_CODE: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Starting,
    Running,
    Failed,
    Completed,
    Stopped,
}

impl JobState {
    /// Terminal states never transition further.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Failed | JobState::Completed | JobState::Stopped
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Starting => write!(f, "starting"),
            JobState::Running => write!(f, "running"),
            JobState::Failed => write!(f, "failed"),
            JobState::Completed => write!(f, "completed"),
            JobState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Failures that belong to the spawned process's own lifecycle.
///
/// These are never returned as call errors; they are recorded in the job's
/// status and surface through `GetStatus`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobFailure {
    #[error("failed to spawn process: {0}")]
    Spawn(String),

    #[error("failed to wait for process: {0}")]
    AbnormalExit(String),

    #[error("process terminated by signal {0}")]
    Signaled(i32),

    #[error("service shut down before the process was spawned")]
    ShutDown,
}

/// Point-in-time copy of a job's status record.
///
/// `exit_code` is set only for `Completed` and `Stopped`; `error` only for `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub state: JobState,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
}

impl JobStatus {
    pub fn starting() -> Self {
        Self {
            state: JobState::Starting,
            exit_code: None,
            error: None,
        }
    }

    pub fn running() -> Self {
        Self {
            state: JobState::Running,
            exit_code: None,
            error: None,
        }
    }

    pub fn completed(exit_code: i32) -> Self {
        Self {
            state: JobState::Completed,
            exit_code: Some(exit_code),
            error: None,
        }
    }

    pub fn stopped() -> Self {
        Self {
            state: JobState::Stopped,
            exit_code: Some(STOPPED_EXIT_CODE),
            error: None,
        }
    }

    pub fn failed(failure: JobFailure) -> Self {
        Self {
            state: JobState::Failed,
            exit_code: None,
            error: Some(failure.to_string()),
        }
    }
}

/// Captured standard output and standard error of a job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOutput {
    pub stdout: String,
    pub stderr: String,
}
