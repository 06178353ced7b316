//! Workload manifest loading.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result, bail};
use rekon::Workload;
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(untagged)]
enum Manifest {
    Many(Vec<Workload>),
    One(Box<Workload>),
}

/// Parse a manifest holding one workload or an array of workloads.
pub fn parse_workloads(text: &str) -> Result<Vec<Workload>> {
    let manifest: Manifest = serde_json::from_str(text).context("Invalid workload manifest")?;
    let workloads = match manifest {
        Manifest::Many(workloads) => workloads,
        Manifest::One(workload) => vec![*workload],
    };

    let mut seen = HashSet::new();
    for workload in &workloads {
        if workload.metadata.name.is_empty() {
            bail!("Workload without a name in manifest");
        }
        if workload.spec.container_image.is_empty() {
            bail!("Workload {} has no container image", workload.metadata.key());
        }
        if !seen.insert(workload.metadata.key()) {
            bail!("Duplicate workload {} in manifest", workload.metadata.key());
        }
    }
    Ok(workloads)
}

pub async fn load_workloads(path: &Path) -> Result<Vec<Workload>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    parse_workloads(&text)
}
