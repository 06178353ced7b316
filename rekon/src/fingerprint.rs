//! Content fingerprints for drift detection.
//!
//! A fingerprint is a truncated SHA-256 over the canonical JSON encoding of a
//! value. Object keys are emitted in sorted order, so the digest depends only
//! on content and is stable across processes and platforms.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Number of digest bytes kept in a fingerprint.
const FINGERPRINT_BYTES: usize = 12;

/// Short deterministic digest of a resource description.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("cannot serialize value for fingerprinting: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Compute the fingerprint of `value`.
pub fn fingerprint<T: Serialize + ?Sized>(value: &T) -> Result<Fingerprint, FingerprintError> {
    let canonical = canonicalize(serde_json::to_value(value)?);
    let bytes = serde_json::to_vec(&canonical)?;
    let digest = Sha256::digest(&bytes);
    Ok(Fingerprint(hex::encode(&digest[..FINGERPRINT_BYTES])))
}

/// Rebuild every object with its keys in sorted order.
///
/// `serde_json::Map` keeps insertion order when `preserve_order` is enabled
/// anywhere in the build, so the order is fixed here explicitly.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, canonicalize(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}
