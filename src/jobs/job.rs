use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::Result;
use crate::jobs::process::ProcessHandle;
use crate::jobs::status::{JobFailure, JobOutput, JobState, JobStatus};

const SIGKILL: i32 = 9;

/// A single spawned program and its lifecycle.
///
/// Transitions: `Starting -> Running | Failed` (written by [`Job::start`]),
/// then `Running -> Completed | Stopped | Failed` (written only by the
/// background finalize task).
pub struct Job {
    id: Uuid,
    process: ProcessHandle,
    status: RwLock<JobStatus>,
    created_at: DateTime<Utc>,
    drain_timeout: Duration,
}

impl Job {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, drain_timeout: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            process: ProcessHandle::new(program, args),
            status: RwLock::new(JobStatus::starting()),
            created_at: Utc::now(),
            drain_timeout,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn process(&self) -> &ProcessHandle {
        &self.process
    }

    /// Spawns the process and, on success, launches the finalize task.
    ///
    /// Returns as soon as the spawn attempt has been made. Once `shutdown`
    /// is cancelled the process is never spawned and the job fails instead.
    pub async fn start(self: Arc<Self>, shutdown: CancellationToken) {
        let mut status = self.status.write().await;
        if status.state != JobState::Starting {
            tracing::warn!(job_id = %self.id, state = %status.state, "Job already started");
            return;
        }

        // Checked under the status lock: `stop` takes the same lock, so a
        // job is either refused here or visible as Running to `stop_all`.
        if shutdown.is_cancelled() {
            tracing::info!(job_id = %self.id, "Shutting down, job not spawned");
            *status = JobStatus::failed(JobFailure::ShutDown);
            return;
        }

        match self.process.spawn() {
            Ok(pid) => {
                tracing::info!(
                    job_id = %self.id,
                    pid,
                    program = %self.process.program().display(),
                    "Job running"
                );
                *status = JobStatus::running();
            }
            Err(e) => {
                tracing::warn!(
                    job_id = %self.id,
                    program = %self.process.program().display(),
                    error = %e,
                    "Job failed to spawn"
                );
                *status = JobStatus::failed(JobFailure::Spawn(e.to_string()));
                return;
            }
        }
        drop(status);

        tokio::spawn(async move {
            self.finalize().await;
        });
    }

    /// Waits for the process to exit and records the terminal status.
    async fn finalize(&self) {
        let outcome = self.process.wait(self.drain_timeout).await;
        let terminal = classify_exit(outcome);

        tracing::info!(
            job_id = %self.id,
            state = %terminal.state,
            exit_code = ?terminal.exit_code,
            "Job finished"
        );

        *self.status.write().await = terminal;
    }

    /// Sends SIGKILL to a live job; stopping a finished job is a no-op.
    ///
    /// The transition to `Stopped` is recorded by the finalize task once it
    /// observes the exit, not here.
    pub async fn stop(&self) -> Result<()> {
        let status = self.status.write().await;
        if status.state.is_terminal() {
            return Ok(());
        }

        self.process.kill().await?;
        tracing::info!(job_id = %self.id, "Kill signal sent");
        Ok(())
    }

    pub async fn status(&self) -> JobStatus {
        self.status.read().await.clone()
    }

    pub fn output(&self) -> JobOutput {
        self.process.snapshot_output()
    }
}

/// Maps the raw result of waiting on a process to its terminal status.
fn classify_exit(outcome: io::Result<ExitStatus>) -> JobStatus {
    match outcome {
        Ok(status) => match (status.code(), status.signal()) {
            (Some(code), _) => JobStatus::completed(code),
            (None, Some(SIGKILL)) => JobStatus::stopped(),
            (None, Some(signal)) => JobStatus::failed(JobFailure::Signaled(signal)),
            (None, None) => JobStatus::failed(JobFailure::AbnormalExit(
                "process exited without a code or signal".to_string(),
            )),
        },
        Err(e) => JobStatus::failed(JobFailure::AbnormalExit(e.to_string())),
    }
}
