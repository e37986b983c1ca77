//! Content-addressed cache keys for (app, preference) pairs.

use crate::error::Result;
use crate::records::{AppRecord, UserPrivacyPreference};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

const SEPARATOR: &[u8] = b"|";

/// SHA-256 fingerprint of an (app, preference) pair, hex encoded
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// `H(H(app) | H(preference))` over canonical JSON encodings
    pub fn compute(app: &AppRecord, preference: &UserPrivacyPreference) -> Result<Self> {
        let app_digest = canonical_digest(app)?;
        let preference_digest = canonical_digest(preference)?;

        let mut hasher = Sha256::new();
        hasher.update(app_digest.as_bytes());
        hasher.update(SEPARATOR);
        hasher.update(preference_digest.as_bytes());
        Ok(Self(hex::encode(hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for log lines
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Fingerprint {
    fn from(s: String) -> Self {
        Fingerprint(s)
    }
}

pub fn fingerprint(app: &AppRecord, preference: &UserPrivacyPreference) -> Result<Fingerprint> {
    Fingerprint::compute(app, preference)
}

// Going through `serde_json::Value` sorts object keys (the default map is a
// BTreeMap) and id sets are BTreeSets, so field and element order never
// reach the digest.
fn canonical_digest<T: Serialize>(record: &T) -> Result<String> {
    let value = serde_json::to_value(record)?;
    let bytes = serde_json::to_vec(&value)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}
