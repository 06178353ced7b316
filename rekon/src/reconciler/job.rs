//! Job lifecycle - runs a one-shot task once per content fingerprint.
//!
//! Per job: not started -> running -> completed -> deleted. The caller records
//! the fingerprint after completion and then deletes the job; from then on the
//! recorded fingerprint short-circuits `ensure_job_run` entirely.

use tracing::{debug, info, warn};

use crate::error::ReconcileError;
use crate::fingerprint::{Fingerprint, fingerprint};
use crate::resource::{Job, Resource};
use crate::store::{ObjectStore, StoreError, create_typed, get_typed};

/// Annotation carrying the fingerprint a live job was created for.
pub const JOB_HASH_ANNOTATION: &str = "rekon.io/job-hash";

/// State of a live job, derived from its pod counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// No pod has started yet.
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn of(job: &Job) -> Self {
        let status = &job.status;
        if status.active > 0 {
            JobState::Running
        } else if status.failed > 0 {
            JobState::Failed
        } else if status.succeeded > 0 {
            JobState::Succeeded
        } else {
            JobState::Pending
        }
    }
}

/// What `ensure_job_run` found or did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobProgress {
    /// The recorded fingerprint matches; nothing was touched.
    AlreadyApplied,
    /// No live job existed; one was created.
    Started,
    /// A live job exists but has not finished.
    Running,
    /// A live job for an older fingerprint was replaced by a new one.
    Replaced,
    /// The live job finished successfully.
    Succeeded,
}

/// Outcome of one `ensure_job_run` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRun {
    pub fingerprint: Fingerprint,
    pub progress: JobProgress,
}

impl JobRun {
    pub fn requeue(&self) -> bool {
        matches!(
            self.progress,
            JobProgress::Started | JobProgress::Running | JobProgress::Replaced
        )
    }
}

/// Runs one-shot jobs against the object store.
pub struct JobLifecycle<'a> {
    store: &'a dyn ObjectStore,
}

impl<'a> JobLifecycle<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self { store }
    }

    /// Drive `job` towards completion unless `last_applied` already records
    /// its fingerprint.
    ///
    /// A failed job is returned as [`ReconcileError::JobFailed`]; it is never
    /// recreated automatically.
    pub async fn ensure_job_run(
        &self,
        job: &Job,
        last_applied: Option<&Fingerprint>,
    ) -> Result<JobRun, ReconcileError> {
        let hash = fingerprint(job)?;
        if last_applied == Some(&hash) {
            debug!("Job {} already applied ({})", job.key(), hash);
            return Ok(JobRun {
                fingerprint: hash,
                progress: JobProgress::AlreadyApplied,
            });
        }

        let key = job.key();
        let progress = match get_typed::<Job>(self.store, &key).await? {
            None => {
                info!("Creating a new Job {}", key);
                self.create(job, &hash).await?;
                JobProgress::Started
            }
            Some(live) if !was_created_for(&live, &hash) => {
                info!("Replacing Job {} created for an older fingerprint", key);
                match self.store.delete(Job::KIND, &key).await {
                    Ok(()) | Err(StoreError::NotFound { .. }) => {}
                    Err(e) => return Err(e.into()),
                }
                self.create(job, &hash).await?;
                JobProgress::Replaced
            }
            Some(live) => match JobState::of(&live) {
                JobState::Pending | JobState::Running => {
                    info!("Waiting on Job {}", key);
                    JobProgress::Running
                }
                JobState::Succeeded => {
                    info!("Job {} completed successfully", key);
                    JobProgress::Succeeded
                }
                JobState::Failed => {
                    warn!("Job {} failed", key);
                    return Err(ReconcileError::JobFailed { job: key });
                }
            },
        };

        Ok(JobRun {
            fingerprint: hash,
            progress,
        })
    }

    async fn create(&self, job: &Job, hash: &Fingerprint) -> Result<(), StoreError> {
        let mut stamped = job.clone();
        stamped
            .metadata
            .annotations
            .insert(JOB_HASH_ANNOTATION.to_string(), hash.to_string());
        create_typed(self.store, stamped).await?;
        Ok(())
    }

    /// Delete the live job once it is done with. Returns whether a job was
    /// deleted.
    ///
    /// A job created for `applied` is deleted in any state, as is a finished
    /// job for any other fingerprint. A job for another fingerprint that is
    /// still running is left alone; `ensure_job_run` replaces it if that
    /// fingerprint is ever wanted again.
    pub async fn delete_job(&self, job: &Job, applied: &Fingerprint) -> Result<bool, StoreError> {
        let key = job.key();
        let Some(live) = get_typed::<Job>(self.store, &key).await? else {
            return Ok(false);
        };
        let finished = matches!(JobState::of(&live), JobState::Succeeded | JobState::Failed);
        if !finished && !was_created_for(&live, applied) {
            debug!("Leaving unfinished Job {} from another run", key);
            return Ok(false);
        }

        info!("Deleting Job {}", key);
        match self.store.delete(Job::KIND, &key).await {
            Ok(()) => Ok(true),
            Err(StoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

fn was_created_for(live: &Job, hash: &Fingerprint) -> bool {
    live.metadata
        .annotations
        .get(JOB_HASH_ANNOTATION)
        .is_some_and(|recorded| recorded == hash.as_str())
}
