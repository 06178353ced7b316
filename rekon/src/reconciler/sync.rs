//! Resource synchronizer - ensures one live object matches its desired
//! description.
//!
//! The fetch / create-if-absent / compare-then-update sequence is shared by
//! every managed kind; kinds only say how drift is detected and how the
//! desired content is applied to a live object.

use tracing::info;

use crate::fingerprint::Fingerprint;
use crate::resource::{ConfigMap, Deployment, PersistentVolumeClaim, Resource, Service};
use crate::store::{ObjectStore, Result, create_typed, get_typed, update_typed};

/// A resource kind the synchronizer can converge.
pub trait Managed: Resource {
    /// Whether a freshly created object needs time to initialise before the
    /// next phase may rely on it.
    const SETTLES_AFTER_CREATE: bool = true;

    /// Whether the live object's content differs from the desired one.
    ///
    /// Kinds that are never updated in place keep the default.
    fn drifted(_live: &Self, _desired: &Self) -> bool {
        false
    }

    /// Copy the desired content onto the live object, keeping the live
    /// object's identity and resource version.
    fn adopt(_live: &mut Self, _desired: &Self) {}
}

impl Managed for PersistentVolumeClaim {}

impl Managed for Service {}

impl Managed for ConfigMap {
    const SETTLES_AFTER_CREATE: bool = false;

    fn drifted(live: &Self, desired: &Self) -> bool {
        live.data != desired.data
    }

    fn adopt(live: &mut Self, desired: &Self) {
        live.data = desired.data.clone();
    }
}

/// Drift is tracked through the recorded fingerprint, so only `adopt` applies.
impl Managed for Deployment {
    fn adopt(live: &mut Self, desired: &Self) {
        live.spec = desired.spec.clone();
        live.metadata.labels = desired.metadata.labels.clone();
        live.metadata.annotations = desired.metadata.annotations.clone();
    }
}

/// How drift is detected for an existing object.
#[derive(Debug, Clone, Copy)]
pub enum DriftCheck<'a> {
    /// Compare live and desired content directly.
    Content,
    /// Compare the desired fingerprint with the one recorded when the object
    /// was last synced.
    Fingerprint {
        desired: &'a Fingerprint,
        recorded: Option<&'a Fingerprint>,
    },
}

/// Result of one synchronization attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome<R> {
    Created(R),
    Updated(R),
    Unchanged(R),
}

impl<R: Managed> SyncOutcome<R> {
    /// Whether the caller should stop this pass and requeue.
    pub fn needs_retry(&self) -> bool {
        match self {
            SyncOutcome::Created(_) => R::SETTLES_AFTER_CREATE,
            SyncOutcome::Updated(_) => true,
            SyncOutcome::Unchanged(_) => false,
        }
    }

    /// Whether this attempt wrote to the store.
    pub fn wrote(&self) -> bool {
        !matches!(self, SyncOutcome::Unchanged(_))
    }

    pub fn live(&self) -> &R {
        match self {
            SyncOutcome::Created(r) | SyncOutcome::Updated(r) | SyncOutcome::Unchanged(r) => r,
        }
    }
}

/// Converges live objects towards desired descriptions.
pub struct Synchronizer<'a> {
    store: &'a dyn ObjectStore,
}

impl<'a> Synchronizer<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self { store }
    }

    /// Ensure a live object exists and matches `desired`.
    ///
    /// Performs at most one create or update. Store errors are returned as-is.
    pub async fn ensure<R: Managed>(
        &self,
        desired: &R,
        check: DriftCheck<'_>,
    ) -> Result<SyncOutcome<R>> {
        let key = desired.key();
        let Some(mut live) = get_typed::<R>(self.store, &key).await? else {
            info!("Creating a new {} {}", R::KIND, key);
            let created = create_typed(self.store, desired.clone()).await?;
            return Ok(SyncOutcome::Created(created));
        };

        let drifted = match check {
            DriftCheck::Content => R::drifted(&live, desired),
            DriftCheck::Fingerprint { desired, recorded } => recorded != Some(desired),
        };
        if !drifted {
            return Ok(SyncOutcome::Unchanged(live));
        }

        info!("Updating {} {}", R::KIND, key);
        R::adopt(&mut live, desired);
        let updated = update_typed(self.store, live).await?;
        Ok(SyncOutcome::Updated(updated))
    }
}
