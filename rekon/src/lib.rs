//! rekon: desired-state reconciliation engine for composite workloads.
//!
//! Given a [`Workload`] specification, [`reconcile`] drives the owned volume
//! claim, service, config map, database schema, migration job and deployment
//! towards their desired descriptions, one idempotent pass at a time.

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod reconciler;
pub mod resource;
pub mod runner;
pub mod simulator;
pub mod store;
pub mod templates;

pub use config::ReconcileConfig;
pub use error::ReconcileError;
pub use fingerprint::{Fingerprint, FingerprintError, fingerprint};
pub use reconciler::{Action, Context, reconcile};
pub use resource::{Kind, Object, ObjectKey, ObjectMeta, Resource, Workload};
pub use runner::{RunSummary, Runner};
pub use simulator::ClusterSimulator;
pub use store::{MemoryStore, ObjectStore, StoreError};
pub use templates::{StandardTemplates, Templates};
