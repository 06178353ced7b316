//! Requeue runner - drives reconciliation passes for a set of workloads.
//!
//! Each workload gets its own task. Tasks share only the store and the
//! templates, both of which are stateless from the engine's point of view.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::ReconcileConfig;
use crate::reconciler::{Context, reconcile};
use crate::resource::ObjectKey;
use crate::store::ObjectStore;
use crate::templates::Templates;

/// Per-workload result of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub key: ObjectKey,
    pub passes: u64,
    pub errors: u64,
    /// Whether the last completed pass reported convergence.
    pub converged: bool,
}

/// Runs reconciliation loops until shutdown.
pub struct Runner {
    store: Arc<dyn ObjectStore>,
    templates: Arc<dyn Templates>,
    config: ReconcileConfig,
    exit_when_converged: bool,
}

impl Runner {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        templates: Arc<dyn Templates>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            store,
            templates,
            config,
            exit_when_converged: false,
        }
    }

    /// Stop a workload's loop as soon as it converges instead of re-polling.
    pub fn exit_when_converged(mut self, exit: bool) -> Self {
        self.exit_when_converged = exit;
        self
    }

    /// Reconcile `keys` concurrently until they converge (if configured) or
    /// `shutdown` flips to true.
    pub async fn run(&self, keys: Vec<ObjectKey>, shutdown: watch::Receiver<bool>) -> Vec<RunSummary> {
        let mut tasks = JoinSet::new();
        for key in keys {
            tasks.spawn(drive(
                Arc::clone(&self.store),
                Arc::clone(&self.templates),
                self.config.clone(),
                self.exit_when_converged,
                key,
                shutdown.clone(),
            ));
        }

        let mut summaries = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(summary) => summaries.push(summary),
                Err(e) => error!("Reconcile task panicked: {}", e),
            }
        }
        summaries.sort_by(|a, b| a.key.cmp(&b.key));
        summaries
    }
}

async fn drive(
    store: Arc<dyn ObjectStore>,
    templates: Arc<dyn Templates>,
    config: ReconcileConfig,
    exit_when_converged: bool,
    key: ObjectKey,
    mut shutdown: watch::Receiver<bool>,
) -> RunSummary {
    let mut summary = RunSummary {
        key: key.clone(),
        passes: 0,
        errors: 0,
        converged: false,
    };

    loop {
        if *shutdown.borrow() {
            break;
        }

        let ctx = Context {
            store: store.as_ref(),
            templates: templates.as_ref(),
            config: &config,
        };
        summary.passes += 1;
        let delay: Duration = match reconcile(&ctx, &key).await {
            Ok(action) => match action.requeue_after() {
                Some(delay) => {
                    summary.converged = false;
                    delay
                }
                None => {
                    summary.converged = true;
                    if exit_when_converged {
                        info!("Workload {} converged after {} passes", key, summary.passes);
                        break;
                    }
                    config.resync_interval
                }
            },
            Err(e) => {
                summary.errors += 1;
                summary.converged = false;
                if e.is_transient() {
                    warn!("Reconcile of {} failed, retrying: {}", key, e);
                } else {
                    error!("Reconcile of {} failed: {}", key, e);
                }
                config.error_backoff
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    summary
}
