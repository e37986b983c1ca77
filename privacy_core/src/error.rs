use std::io;
use thiserror::Error;
use uuid::Uuid;

use crate::policy::{NodeId, Taxonomy};

pub type Result<T> = std::result::Result<T, ComplianceError>;

/// Errors surfaced by the decision engine.
///
/// Every variant is a refusal: callers must never turn one of these into a
/// grant.
#[derive(Debug, Error)]
pub enum ComplianceError {
    #[error("Malformed taxonomy: {0}")]
    MalformedTaxonomy(String),

    #[error("Unknown {taxonomy} policy node: {id}")]
    UnknownPolicyNode { taxonomy: Taxonomy, id: NodeId },

    #[error("Preference belongs to user {owner}, not {user_id}")]
    PreferenceOwnerMismatch { user_id: Uuid, owner: Uuid },

    #[error("Decision cache unavailable: {0}")]
    CacheUnavailable(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Record store error: {0}")]
    RecordStore(String),

    #[error("No app registered with id {0}")]
    AppNotFound(Uuid),

    #[error("No privacy preference stored for user {0}")]
    PreferenceNotFound(Uuid),
}

/// Failures of the persistence layer behind a decision cache.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Storage error: {0}")]
    Other(String),
}

impl From<String> for StorageError {
    fn from(s: String) -> Self {
        StorageError::Other(s)
    }
}

impl From<&str> for StorageError {
    fn from(s: &str) -> Self {
        StorageError::Other(s.to_string())
    }
}

impl From<toml::de::Error> for ComplianceError {
    fn from(e: toml::de::Error) -> Self {
        ComplianceError::Config(e.to_string())
    }
}
