//! The workload specification reconciled by the engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Kind, ObjectMeta, OwnerReference};
use crate::fingerprint::Fingerprint;

/// Desired state of one workload instance plus its engine-owned status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    pub metadata: ObjectMeta,
    pub spec: WorkloadSpec,
    #[serde(default)]
    pub status: WorkloadStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSpec {
    #[serde(default = "default_replicas")]
    pub replicas: u32,
    pub container_image: String,
    #[serde(default = "default_storage_request")]
    pub storage_request: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    pub database_hostname: String,
    /// Defaults to the workload name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,
    /// Secret holding the database and service credentials.
    pub secret: String,
    #[serde(default = "default_service_port")]
    pub service_port: u16,
    #[serde(default)]
    pub debug: DebugFlags,
}

fn default_replicas() -> u32 {
    1
}

fn default_storage_request() -> String {
    "10G".to_string()
}

fn default_service_port() -> u16 {
    9292
}

/// Debug switches; an enabled flag replaces the container command with a
/// sleep loop so the container can be inspected by hand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugFlags {
    #[serde(default)]
    pub db_sync: bool,
    #[serde(default)]
    pub service: bool,
}

/// Convergence markers. Each hash is written only after the live resource
/// it describes has been confirmed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<Fingerprint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_sync_hash: Option<Fingerprint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_hash: Option<Fingerprint>,
}

impl Workload {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    pub fn database_name(&self) -> &str {
        self.spec
            .database_name
            .as_deref()
            .unwrap_or(&self.metadata.name)
    }

    /// Labels stamped on every object owned by this workload.
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("app".to_string(), "image-api".to_string()),
            ("workload".to_string(), self.metadata.name.clone()),
        ])
    }

    pub fn owner_reference(&self) -> OwnerReference {
        OwnerReference {
            kind: Kind::Workload,
            name: self.metadata.name.clone(),
            uid: self.metadata.uid.clone(),
        }
    }

    /// Metadata for an owned object named `name` in this workload's namespace.
    pub fn child_meta(&self, name: impl Into<String>) -> ObjectMeta {
        ObjectMeta {
            labels: self.labels(),
            owner_references: vec![self.owner_reference()],
            ..ObjectMeta::new(&self.metadata.namespace, name)
        }
    }
}
