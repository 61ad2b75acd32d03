use thiserror::Error;

/// Errors surfaced to the caller of a manager operation.
///
/// Failures of the spawned process itself are not represented here; they
/// are recorded in the job status (see [`crate::jobs::JobFailure`]).
#[derive(Error, Debug)]
pub enum JobError {
    /// The job does not exist or is not visible to the caller.
    #[error("job not found")]
    NotFound,

    #[error("job has not started the process")]
    ProcessNotStarted,

    #[error("job has not completed")]
    JobNotCompleted,

    #[error("failed to kill process: {0}")]
    Kill(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, JobError>;
