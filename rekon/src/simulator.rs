//! Cluster simulator for the in-memory store.
//!
//! Plays the part of the controllers that would normally act on the objects
//! the engine creates: the database operator completes schemas, the batch
//! controller runs jobs, and the deployment controller brings replicas up.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use crate::resource::{DatabaseSchema, Deployment, Job};
use crate::store::MemoryStore;

pub struct ClusterSimulator {
    store: Arc<MemoryStore>,
    interval: Duration,
}

impl ClusterSimulator {
    pub fn new(store: Arc<MemoryStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Advance every object by one step. Returns the number of objects changed.
    pub async fn step(&self) -> usize {
        let schemas = self
            .store
            .mutate_all::<DatabaseSchema>(|schema| {
                if schema.status.completed {
                    return false;
                }
                schema.status.completed = true;
                true
            })
            .await;

        let jobs = self
            .store
            .mutate_all::<Job>(|job| {
                let status = &mut job.status;
                if status.succeeded > 0 || status.failed > 0 {
                    false
                } else if status.active > 0 {
                    status.active = 0;
                    status.succeeded = 1;
                    true
                } else {
                    status.active = 1;
                    true
                }
            })
            .await;

        let deployments = self
            .store
            .mutate_all::<Deployment>(|deployment| {
                let replicas = deployment.spec.replicas;
                if deployment.status.ready_replicas == replicas
                    && deployment.status.replicas == replicas
                {
                    return false;
                }
                deployment.status.replicas = replicas;
                deployment.status.ready_replicas = replicas;
                true
            })
            .await;

        let changed = schemas + jobs + deployments;
        if changed > 0 {
            debug!(
                "Simulator advanced {} schemas, {} jobs, {} deployments",
                schemas, jobs, deployments
            );
        }
        changed
    }

    /// Step every `interval` until `shutdown` flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.step().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}
