//! Reconciliation orchestrator.
//!
//! One call to [`reconcile`] performs a single pass over a workload:
//!
//! 1. volume claim
//! 2. service
//! 3. config map (its fingerprint is recorded and fed to the deployment)
//! 4. database schema gate
//! 5. migration job, skipped once its fingerprint is recorded, then deleted
//!    once finished
//! 6. deployment, tracked by fingerprint
//! 7. deployment readiness
//!
//! Any phase that is not yet converged returns a requeue immediately. The pass
//! keeps no state between calls apart from what is written to the workload's
//! status, so it can be abandoned and re-entered at any point.

pub mod gate;
pub mod job;
pub mod status;
pub mod sync;

use std::time::Duration;

use tracing::{Instrument, info, info_span};

use crate::config::ReconcileConfig;
use crate::error::ReconcileError;
use crate::fingerprint::fingerprint;
use crate::resource::{ObjectKey, Workload};
use crate::store::{ObjectStore, get_typed};
use crate::templates::Templates;

pub use gate::{DependencyGate, Precondition};
pub use job::{JOB_HASH_ANNOTATION, JobLifecycle, JobProgress, JobRun, JobState};
pub use status::{StatusHash, record_hash};
pub use sync::{DriftCheck, Managed, SyncOutcome, Synchronizer};

/// Scheduling decision returned by a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Action {
    requeue_after: Option<Duration>,
}

impl Action {
    /// Run another pass after `delay`.
    pub fn requeue(delay: Duration) -> Self {
        Self {
            requeue_after: Some(delay),
        }
    }

    /// Converged; nothing to do until the next external trigger.
    pub fn await_change() -> Self {
        Self {
            requeue_after: None,
        }
    }

    pub fn requeue_after(&self) -> Option<Duration> {
        self.requeue_after
    }
}

/// Collaborators for a pass, passed explicitly on every call.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    pub store: &'a dyn ObjectStore,
    pub templates: &'a dyn Templates,
    pub config: &'a ReconcileConfig,
}

/// Run one reconciliation pass for the workload identified by `key`.
pub async fn reconcile(ctx: &Context<'_>, key: &ObjectKey) -> Result<Action, ReconcileError> {
    let span = info_span!("reconcile", workload = %key);
    reconcile_workload(ctx, key).instrument(span).await
}

async fn reconcile_workload(ctx: &Context<'_>, key: &ObjectKey) -> Result<Action, ReconcileError> {
    let Some(workload) = get_typed::<Workload>(ctx.store, key).await? else {
        // Owned objects are garbage collected by the store.
        info!("Workload {} no longer exists", key);
        return Ok(Action::await_change());
    };
    converge(ctx, workload).await
}

async fn converge(ctx: &Context<'_>, mut workload: Workload) -> Result<Action, ReconcileError> {
    let settle = Action::requeue(ctx.config.settle_delay);
    let rollout = Action::requeue(ctx.config.rollout_delay);
    let sync = Synchronizer::new(ctx.store);

    // Volume claim
    let pvc = ctx.templates.pvc(&workload);
    if sync.ensure(&pvc, DriftCheck::Content).await?.needs_retry() {
        return Ok(settle);
    }

    // Service
    let service = ctx.templates.service(&workload);
    if sync.ensure(&service, DriftCheck::Content).await?.needs_retry() {
        return Ok(settle);
    }

    // Config map
    let config_map = ctx.templates.config_map(&workload);
    let config_hash = fingerprint(&config_map)?;
    let outcome = sync.ensure(&config_map, DriftCheck::Content).await?;
    record_hash(ctx.store, &mut workload, StatusHash::Config, &config_hash).await?;
    if outcome.needs_retry() {
        return Ok(settle);
    }

    // Database schema
    let schema = ctx.templates.schema(&workload);
    if !DependencyGate::new(ctx.store).is_ready(&schema).await? {
        info!("Waiting on database schema {}", schema.metadata.key());
        return Ok(settle);
    }

    // Migration job
    let jobs = JobLifecycle::new(ctx.store);
    let job = ctx.templates.migration_job(&workload);
    let run = jobs
        .ensure_job_run(&job, StatusHash::DbSync.get(&workload.status))
        .await?;
    if run.requeue() {
        return Ok(settle);
    }
    record_hash(ctx.store, &mut workload, StatusHash::DbSync, &run.fingerprint).await?;
    jobs.delete_job(&job, &run.fingerprint).await?;

    // Deployment
    let deployment = ctx.templates.deployment(&workload, &config_hash);
    let deployment_hash = fingerprint(&deployment)?;
    let outcome = sync
        .ensure(
            &deployment,
            DriftCheck::Fingerprint {
                desired: &deployment_hash,
                recorded: StatusHash::Deployment.get(&workload.status),
            },
        )
        .await?;
    if outcome.wrote() {
        record_hash(
            ctx.store,
            &mut workload,
            StatusHash::Deployment,
            &deployment_hash,
        )
        .await?;
        return Ok(rollout);
    }

    let ready = outcome.live().status.ready_replicas;
    if ready != workload.spec.replicas {
        info!(
            "Waiting on deployment {} ({}/{} replicas ready)",
            deployment.metadata.key(),
            ready,
            workload.spec.replicas
        );
        return Ok(settle);
    }

    info!("Deployment replicas running: {}", ready);
    Ok(Action::await_change())
}
