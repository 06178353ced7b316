//! Typed resources handled by the engine.
//!
//! Every persisted object has an [`ObjectMeta`] and belongs to one [`Kind`].
//! The object store works on the type-erased [`Object`] enum; the engine
//! converts to and from concrete types through the [`Resource`] trait.

mod kinds;
mod workload;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use kinds::{
    ConfigMap, Container, DatabaseSchema, Deployment, DeploymentSpec, DeploymentStatus, Job,
    JobSpec, JobStatus, PersistentVolumeClaim, PodTemplate, PvcSpec, SchemaSpec, SchemaStatus,
    Service, ServicePort, ServiceSpec, Volume, VolumeMount, VolumeSource,
};
pub use workload::{DebugFlags, Workload, WorkloadSpec, WorkloadStatus};

/// Resource kinds known to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Kind {
    Workload,
    PersistentVolumeClaim,
    Service,
    ConfigMap,
    Job,
    Deployment,
    DatabaseSchema,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Workload => "Workload",
            Kind::PersistentVolumeClaim => "PersistentVolumeClaim",
            Kind::Service => "Service",
            Kind::ConfigMap => "ConfigMap",
            Kind::Job => "Job",
            Kind::Deployment => "Deployment",
            Kind::DatabaseSchema => "DatabaseSchema",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of an object within its kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Reference from a managed object to the workload that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub kind: Kind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

/// Metadata common to every object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Assigned by the store on create.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    /// Assigned by the store on every write; used for optimistic concurrency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
}

fn default_namespace() -> String {
    "default".to_string()
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }

    /// Whether this object is owned by the given workload.
    pub fn is_owned_by(&self, workload: &ObjectKey) -> bool {
        self.namespace == workload.namespace
            && self
                .owner_references
                .iter()
                .any(|o| o.kind == Kind::Workload && o.name == workload.name)
    }
}

/// A typed resource that can be stored as an [`Object`].
pub trait Resource: Clone + Serialize + Send + Sync + 'static {
    const KIND: Kind;

    fn meta(&self) -> &ObjectMeta;

    fn meta_mut(&mut self) -> &mut ObjectMeta;

    fn into_object(self) -> Object;

    /// Returns `None` if the object is of a different kind.
    fn from_object(object: Object) -> Option<Self>;

    fn key(&self) -> ObjectKey {
        self.meta().key()
    }
}

/// Type-erased object as seen by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Object {
    Workload(Workload),
    PersistentVolumeClaim(PersistentVolumeClaim),
    Service(Service),
    ConfigMap(ConfigMap),
    Job(Job),
    Deployment(Deployment),
    DatabaseSchema(DatabaseSchema),
}

macro_rules! impl_resource {
    ($($ty:ident),* $(,)?) => {
        $(
            impl Resource for $ty {
                const KIND: Kind = Kind::$ty;

                fn meta(&self) -> &ObjectMeta {
                    &self.metadata
                }

                fn meta_mut(&mut self) -> &mut ObjectMeta {
                    &mut self.metadata
                }

                fn into_object(self) -> Object {
                    Object::$ty(self)
                }

                fn from_object(object: Object) -> Option<Self> {
                    match object {
                        Object::$ty(inner) => Some(inner),
                        _ => None,
                    }
                }
            }
        )*

        impl Object {
            pub fn kind(&self) -> Kind {
                match self {
                    $(Object::$ty(_) => Kind::$ty,)*
                }
            }

            pub fn meta(&self) -> &ObjectMeta {
                match self {
                    $(Object::$ty(inner) => &inner.metadata,)*
                }
            }

            pub fn meta_mut(&mut self) -> &mut ObjectMeta {
                match self {
                    $(Object::$ty(inner) => &mut inner.metadata,)*
                }
            }
        }
    };
}

impl_resource!(
    Workload,
    PersistentVolumeClaim,
    Service,
    ConfigMap,
    Job,
    Deployment,
    DatabaseSchema,
);

impl Object {
    pub fn key(&self) -> ObjectKey {
        self.meta().key()
    }

    /// Copy the status sub-record of `source` into `self`.
    ///
    /// Kinds without a status are left untouched, as are mismatched kinds.
    pub fn copy_status_from(&mut self, source: &Object) {
        match (self, source) {
            (Object::Workload(dst), Object::Workload(src)) => dst.status = src.status.clone(),
            (Object::Job(dst), Object::Job(src)) => dst.status = src.status.clone(),
            (Object::Deployment(dst), Object::Deployment(src)) => dst.status = src.status.clone(),
            (Object::DatabaseSchema(dst), Object::DatabaseSchema(src)) => {
                dst.status = src.status.clone()
            }
            _ => {}
        }
    }
}
