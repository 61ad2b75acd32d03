use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::auth::Identity;
use crate::config::{ManagerConfig, OutputPolicy};
use crate::error::{JobError, Result};
use crate::jobs::job::Job;
use crate::jobs::status::{JobOutput, JobStatus};

/// A job and the identity that started it.
struct ManagerEntry {
    owner: String,
    /// Insertion order; entries are never removed, so this is unique.
    seq: usize,
    job: Arc<Job>,
}

/// Listing view of a job visible to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub id: Uuid,
    pub owner: String,
    pub program: String,
    pub args: Vec<String>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

/// Owns every job started by the service.
///
/// The table lock only guards insertion and lookup; each job's status has
/// its own lock, so a slow stop on one job never blocks lookups of another.
/// Identifiers are never removed or reused.
pub struct JobManager {
    config: ManagerConfig,
    jobs: RwLock<HashMap<Uuid, ManagerEntry>>,
    /// Cancelled by `stop_all`; jobs not yet spawned are refused after that.
    closing: CancellationToken,
}

impl Default for JobManager {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}

impl JobManager {
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            config,
            jobs: RwLock::new(HashMap::new()),
            closing: CancellationToken::new(),
        }
    }

    pub fn output_policy(&self) -> OutputPolicy {
        self.config.output_policy
    }

    /// Registers a new job owned by `identity` and starts it in the
    /// background. The returned identifier is immediately resolvable.
    ///
    /// Spawn failures are not reported here; they show up in the job status.
    pub async fn start(
        &self,
        identity: &Identity,
        program: impl Into<PathBuf>,
        args: Vec<String>,
    ) -> Uuid {
        let job = Arc::new(Job::new(program, args, self.config.output_drain_timeout));
        let id = job.id();

        {
            let mut jobs = self.jobs.write().await;
            let seq = jobs.len();
            jobs.insert(
                id,
                ManagerEntry {
                    owner: identity.user_id.clone(),
                    seq,
                    job: job.clone(),
                },
            );
        }

        tracing::info!(
            job_id = %id,
            owner = %identity.user_id,
            program = %job.process().program().display(),
            "Job created"
        );

        // Detached so the job outlives the request that created it.
        tokio::spawn(job.start(self.closing.clone()));

        id
    }

    pub async fn stop(&self, identity: &Identity, id: &str) -> Result<()> {
        let job = self.resolve(identity, id).await?;
        job.stop().await
    }

    pub async fn get_status(&self, identity: &Identity, id: &str) -> Result<JobStatus> {
        let job = self.resolve(identity, id).await?;
        Ok(job.status().await)
    }

    pub async fn get_output(&self, identity: &Identity, id: &str) -> Result<JobOutput> {
        let job = self.resolve(identity, id).await?;

        if self.config.output_policy == OutputPolicy::RequireCompletion
            && !job.status().await.state.is_terminal()
        {
            return Err(JobError::JobNotCompleted);
        }

        Ok(job.output())
    }

    /// Jobs visible to `identity`, oldest first.
    pub async fn list(&self, identity: &Identity) -> Vec<JobSummary> {
        let mut visible: Vec<(usize, String, Arc<Job>)> = {
            let jobs = self.jobs.read().await;
            jobs.values()
                .filter(|entry| identity.can_access(&entry.owner))
                .map(|entry| (entry.seq, entry.owner.clone(), entry.job.clone()))
                .collect()
        };
        visible.sort_by_key(|(seq, _, _)| *seq);

        let mut summaries = Vec::with_capacity(visible.len());
        for (_, owner, job) in visible {
            summaries.push(JobSummary {
                id: job.id(),
                owner,
                program: job.process().program().display().to_string(),
                args: job.process().args().to_vec(),
                status: job.status().await,
                created_at: job.created_at(),
            });
        }
        summaries
    }

    /// Sends the kill signal to every job that has not finished yet.
    ///
    /// Jobs whose process has not been spawned yet, and jobs started after
    /// this call, are marked failed without ever spawning.
    pub async fn stop_all(&self) {
        self.closing.cancel();

        let jobs: Vec<Arc<Job>> = {
            let jobs = self.jobs.read().await;
            jobs.values().map(|entry| entry.job.clone()).collect()
        };

        let mut stopped = 0usize;
        for job in jobs {
            if job.status().await.state.is_terminal() {
                continue;
            }
            match job.stop().await {
                Ok(()) => stopped += 1,
                // Refused by the start task once it sees `closing`.
                Err(JobError::ProcessNotStarted) => {}
                Err(e) => {
                    tracing::warn!(job_id = %job.id(), error = %e, "Failed to stop job");
                }
            }
        }
        tracing::info!(stopped, "Stopped running jobs");
    }

    pub fn is_closing(&self) -> bool {
        self.closing.is_cancelled()
    }

    /// Number of jobs ever started.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Looks up a job the caller is allowed to see.
    ///
    /// An unknown identifier and a job owned by someone else both yield
    /// `NotFound`, so callers cannot probe for other users' jobs.
    async fn resolve(&self, identity: &Identity, id: &str) -> Result<Arc<Job>> {
        let id = Uuid::parse_str(id).map_err(|_| JobError::NotFound)?;

        let jobs = self.jobs.read().await;
        match jobs.get(&id) {
            Some(entry) if identity.can_access(&entry.owner) => Ok(entry.job.clone()),
            _ => Err(JobError::NotFound),
        }
    }
}
