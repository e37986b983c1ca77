//! # Privacy Core
//!
//! Decides whether an application may process a user's data.
//!
//! 1. **Policy trees**: attribute and purpose taxonomies numbered with the
//!    nested set model, so ancestor checks are interval comparisons.
//!
//! 2. **Fingerprints**: SHA-256 keys identifying an (app, preference) pair.
//!
//! 3. **Decision cache**: decisions keyed by user and fingerprint, expired
//!    lazily against the user's retention window.
//!
//! 4. **Evaluation**: allow/except/deny containment checks plus retention,
//!    coordinated with the cache by [`EvaluationCoordinator`].

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod evaluator;
pub mod event_log;
pub mod fingerprint;
pub mod policy;
pub mod records;
pub mod service;

pub use cache::{
    CacheEntry, Clock, DecisionCache, FileDecisionCache, InMemoryDecisionCache, ManualClock,
    SystemClock,
};
pub use config::EngineConfig;
pub use coordinator::{DecisionOutcome, EvaluationCoordinator};
pub use error::{ComplianceError, Result, StorageError};
pub use evaluator::{ComplianceEvaluator, EvaluationReport, Rejection, Violation};
pub use event_log::{DecisionEvent, DecisionLog, DecisionStats};
pub use fingerprint::{fingerprint, Fingerprint};
pub use policy::{NodeId, PolicyCatalog, PolicyNode, PolicyTree, Taxonomy, TaxonomyNode};
pub use records::{AppRecord, Decision, RecordStore, UserPrivacyPreference};
pub use service::PrivacyService;
