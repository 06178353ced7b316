//! Desired-state templates.
//!
//! Each template is a pure function of the workload (and, for the deployment,
//! of the current config fingerprint). The engine calls them afresh on every
//! pass and never caches their output.

use std::collections::BTreeMap;

use crate::fingerprint::Fingerprint;
use crate::resource::{
    ConfigMap, Container, DatabaseSchema, Deployment, DeploymentSpec, DeploymentStatus, Job,
    JobSpec, JobStatus, PersistentVolumeClaim, PodTemplate, PvcSpec, SchemaSpec, SchemaStatus,
    Service, ServicePort, ServiceSpec, Volume, VolumeMount, VolumeSource, Workload,
};

/// Pod-template annotation carrying the config fingerprint, so that a config
/// change alters the deployment's content and triggers a rollout.
pub const CONFIG_HASH_ANNOTATION: &str = "rekon.io/config-hash";

/// Builds the desired description of every resource a workload owns.
pub trait Templates: Send + Sync {
    fn pvc(&self, workload: &Workload) -> PersistentVolumeClaim;

    fn service(&self, workload: &Workload) -> Service;

    fn config_map(&self, workload: &Workload) -> ConfigMap;

    /// The dependency precondition polled before the migration runs.
    fn schema(&self, workload: &Workload) -> DatabaseSchema;

    fn migration_job(&self, workload: &Workload) -> Job;

    fn deployment(&self, workload: &Workload, config_hash: &Fingerprint) -> Deployment;
}

/// Templates for the image API service.
#[derive(Debug, Clone, Default)]
pub struct StandardTemplates;

const CONFIG_MOUNT: &str = "/etc/image-api";
const DATA_MOUNT: &str = "/var/lib/image-api";
const SECRETS_MOUNT: &str = "/run/secrets/image-api";
const DEBUG_COMMAND: [&str; 2] = ["/bin/sleep", "infinity"];

impl StandardTemplates {
    pub fn new() -> Self {
        Self
    }

    fn command(debug: bool, command: &[&str]) -> Vec<String> {
        let command = if debug { &DEBUG_COMMAND[..] } else { command };
        command.iter().map(|s| s.to_string()).collect()
    }

    fn config_volume(workload: &Workload) -> (Volume, VolumeMount) {
        (
            Volume {
                name: "config".to_string(),
                source: VolumeSource::ConfigMap {
                    name: workload.name().to_string(),
                },
            },
            VolumeMount {
                name: "config".to_string(),
                mount_path: CONFIG_MOUNT.to_string(),
                read_only: true,
            },
        )
    }

    fn secrets_volume(workload: &Workload) -> (Volume, VolumeMount) {
        (
            Volume {
                name: "secrets".to_string(),
                source: VolumeSource::Secret {
                    secret_name: workload.spec.secret.clone(),
                },
            },
            VolumeMount {
                name: "secrets".to_string(),
                mount_path: SECRETS_MOUNT.to_string(),
                read_only: true,
            },
        )
    }

    fn render_config(workload: &Workload) -> String {
        let db = workload.database_name();
        format!(
            "[DEFAULT]\n\
             bind_port = {port}\n\
             debug = {debug}\n\
             \n\
             [database]\n\
             connection = mysql+pymysql://{db}:{{DatabasePassword}}@{host}/{db}\n\
             \n\
             [image_store]\n\
             filesystem_store_datadir = {data}/images\n",
            port = workload.spec.service_port,
            debug = workload.spec.debug.service,
            db = db,
            host = workload.spec.database_hostname,
            data = DATA_MOUNT,
        )
    }
}

impl Templates for StandardTemplates {
    fn pvc(&self, workload: &Workload) -> PersistentVolumeClaim {
        PersistentVolumeClaim {
            metadata: workload.child_meta(workload.name()),
            spec: PvcSpec {
                access_modes: vec!["ReadWriteOnce".to_string()],
                storage_request: workload.spec.storage_request.clone(),
                storage_class_name: workload.spec.storage_class.clone(),
            },
        }
    }

    fn service(&self, workload: &Workload) -> Service {
        Service {
            metadata: workload.child_meta(workload.name()),
            spec: ServiceSpec {
                selector: workload.labels(),
                ports: vec![ServicePort {
                    name: "api".to_string(),
                    port: workload.spec.service_port,
                    protocol: "TCP".to_string(),
                }],
            },
        }
    }

    fn config_map(&self, workload: &Workload) -> ConfigMap {
        let config_file = format!("{CONFIG_MOUNT}/image-api.conf");
        ConfigMap {
            metadata: workload.child_meta(workload.name()),
            data: BTreeMap::from([
                ("image-api.conf".to_string(), Self::render_config(workload)),
                (
                    "config.json".to_string(),
                    serde_json::json!({
                        "command": "/usr/bin/image-api",
                        "config_files": [config_file],
                    })
                    .to_string(),
                ),
            ]),
        }
    }

    fn schema(&self, workload: &Workload) -> DatabaseSchema {
        DatabaseSchema {
            metadata: workload.child_meta(workload.name()),
            spec: SchemaSpec {
                database_name: workload.database_name().to_string(),
                secret: workload.spec.secret.clone(),
            },
            status: SchemaStatus::default(),
        }
    }

    fn migration_job(&self, workload: &Workload) -> Job {
        let (config, config_mount) = Self::config_volume(workload);
        let (secrets, secrets_mount) = Self::secrets_volume(workload);
        Job {
            metadata: workload.child_meta(format!("{}-db-sync", workload.name())),
            spec: JobSpec {
                backoff_limit: 4,
                template: PodTemplate {
                    labels: workload.labels(),
                    containers: vec![Container {
                        name: "db-sync".to_string(),
                        image: workload.spec.container_image.clone(),
                        command: Self::command(
                            workload.spec.debug.db_sync,
                            &["/usr/bin/image-manage", "db_sync"],
                        ),
                        env: BTreeMap::from([(
                            "DATABASE_HOST".to_string(),
                            workload.spec.database_hostname.clone(),
                        )]),
                        volume_mounts: vec![config_mount, secrets_mount],
                        ..Default::default()
                    }],
                    volumes: vec![config, secrets],
                    ..Default::default()
                },
            },
            status: JobStatus::default(),
        }
    }

    fn deployment(&self, workload: &Workload, config_hash: &Fingerprint) -> Deployment {
        let (config, config_mount) = Self::config_volume(workload);
        let (secrets, secrets_mount) = Self::secrets_volume(workload);
        let data = Volume {
            name: "data".to_string(),
            source: VolumeSource::PersistentVolumeClaim {
                claim_name: workload.name().to_string(),
            },
        };
        let data_mount = VolumeMount {
            name: "data".to_string(),
            mount_path: DATA_MOUNT.to_string(),
            read_only: false,
        };

        Deployment {
            metadata: workload.child_meta(workload.name()),
            spec: DeploymentSpec {
                replicas: workload.spec.replicas,
                selector: workload.labels(),
                template: PodTemplate {
                    labels: workload.labels(),
                    annotations: BTreeMap::from([(
                        CONFIG_HASH_ANNOTATION.to_string(),
                        config_hash.to_string(),
                    )]),
                    service_account: Some("image-api".to_string()),
                    containers: vec![Container {
                        name: "image-api".to_string(),
                        image: workload.spec.container_image.clone(),
                        command: Self::command(
                            workload.spec.debug.service,
                            &["/usr/local/bin/start-image-api"],
                        ),
                        env: BTreeMap::from([(
                            "CONFIG_HASH".to_string(),
                            config_hash.to_string(),
                        )]),
                        volume_mounts: vec![config_mount, data_mount, secrets_mount],
                        ..Default::default()
                    }],
                    volumes: vec![config, data, secrets],
                },
            },
            status: DeploymentStatus::default(),
        }
    }
}
