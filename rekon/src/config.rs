//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Requeue cadence used by the orchestrator and the runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileConfig {
    /// Delay before re-checking fast-settling resources (volumes, services,
    /// config, schema gate, migration job).
    #[serde(default = "default_settle_delay", with = "secs")]
    pub settle_delay: Duration,
    /// Delay after creating or updating the deployment.
    #[serde(default = "default_rollout_delay", with = "secs")]
    pub rollout_delay: Duration,
    /// Delay before retrying a pass that failed.
    #[serde(default = "default_error_backoff", with = "secs")]
    pub error_backoff: Duration,
    /// Poll interval once a workload has converged.
    #[serde(default = "default_resync_interval", with = "secs")]
    pub resync_interval: Duration,
}

fn default_settle_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_rollout_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_error_backoff() -> Duration {
    Duration::from_secs(30)
}

fn default_resync_interval() -> Duration {
    Duration::from_secs(60)
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            settle_delay: default_settle_delay(),
            rollout_delay: default_rollout_delay(),
            error_backoff: default_error_backoff(),
            resync_interval: default_resync_interval(),
        }
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
