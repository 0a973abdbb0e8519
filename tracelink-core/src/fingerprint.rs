//! Content-derived job identity.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{JobError, Result};
use crate::variant::PipelineVariant;

/// Longest key accepted by [`Fingerprint::parse`].
pub const MAX_KEY_LEN: usize = 128;

/// Opaque identifier for a submission, used as the job id and cache key.
///
/// Generated fingerprints are 64 lowercase hex characters. Keys coming back
/// from clients are only checked for shape, so lookups of unknown but
/// well-formed keys resolve to "not found" instead of an error.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn parse(key: &str) -> Result<Self> {
        if key.is_empty() {
            return Err(JobError::InvalidKey("key must not be empty".to_string()));
        }
        if key.len() > MAX_KEY_LEN {
            return Err(JobError::InvalidKey(format!(
                "key exceeds {MAX_KEY_LEN} characters"
            )));
        }
        if !key.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(JobError::InvalidKey(
                "key must be printable ASCII without whitespace".to_string(),
            ));
        }
        Ok(Self(key.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = JobError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.0
    }
}

/// Derives fingerprints from the project name, pipeline variant and the
/// input payloads in the variant's canonical order.
#[derive(Debug, Clone, Copy, Default)]
pub struct FingerprintGenerator;

impl FingerprintGenerator {
    const DOMAIN_TAG: &'static [u8] = b"tracelink/fingerprint/v1";

    pub fn compute(project_name: &str, variant: &PipelineVariant, inputs: &[&[u8]]) -> Fingerprint {
        let mut hasher = Sha256::new();
        hasher.update(Self::DOMAIN_TAG);

        // Every field is length-prefixed so adjacent fields cannot bleed
        // into each other.
        update_field(&mut hasher, variant.tag().as_bytes());
        update_field(&mut hasher, project_name.as_bytes());
        hasher.update((inputs.len() as u64).to_be_bytes());
        for input in inputs {
            update_field(&mut hasher, input);
        }

        Fingerprint(format!("{:x}", hasher.finalize()))
    }
}

fn update_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}
