//! Workload status bookkeeping.

use tracing::info;

use crate::fingerprint::Fingerprint;
use crate::resource::{Workload, WorkloadStatus};
use crate::store::{ObjectStore, Result, update_status_typed};

/// Hash fields of [`WorkloadStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusHash {
    Config,
    DbSync,
    Deployment,
}

impl StatusHash {
    pub fn get(self, status: &WorkloadStatus) -> Option<&Fingerprint> {
        match self {
            StatusHash::Config => status.config_hash.as_ref(),
            StatusHash::DbSync => status.db_sync_hash.as_ref(),
            StatusHash::Deployment => status.deployment_hash.as_ref(),
        }
    }

    fn slot(self, status: &mut WorkloadStatus) -> &mut Option<Fingerprint> {
        match self {
            StatusHash::Config => &mut status.config_hash,
            StatusHash::DbSync => &mut status.db_sync_hash,
            StatusHash::Deployment => &mut status.deployment_hash,
        }
    }
}

/// Persist `value` into the given status hash if it differs.
///
/// On success `workload` is replaced by the stored copy so later writes in the
/// same pass carry the fresh resource version. On failure `workload` is left
/// unchanged. Returns whether a write happened.
pub async fn record_hash(
    store: &dyn ObjectStore,
    workload: &mut Workload,
    field: StatusHash,
    value: &Fingerprint,
) -> Result<bool> {
    if field.get(&workload.status) == Some(value) {
        return Ok(false);
    }

    let mut next = workload.clone();
    *field.slot(&mut next.status) = Some(value.clone());
    *workload = update_status_typed(store, next).await?;
    info!(
        "Recorded {:?} hash {} for workload {}",
        field,
        value,
        workload.metadata.key()
    );
    Ok(true)
}
