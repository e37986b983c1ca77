use crate::cache::DecisionCache;
use crate::error::{ComplianceError, Result};
use crate::evaluator::ComplianceEvaluator;
use crate::event_log::{CacheOperation, DecisionEvent, DecisionLog, DecisionStats};
use crate::fingerprint::Fingerprint;
use crate::policy::PolicyCatalog;
use crate::records::{AppRecord, Decision, UserPrivacyPreference};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Result of one `decide` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub decision: Decision,
    pub cache_hit: bool,
    pub fingerprint: Fingerprint,
}

/// Runs decisions through the cache and the evaluator.
///
/// Concurrent misses on the same key may both evaluate and both store; the
/// evaluator is pure, so either entry is valid.
pub struct EvaluationCoordinator {
    evaluator: ComplianceEvaluator,
    cache: Arc<dyn DecisionCache>,
    log: DecisionLog,
}

impl EvaluationCoordinator {
    pub fn new(catalog: Arc<PolicyCatalog>, cache: Arc<dyn DecisionCache>) -> Self {
        Self {
            evaluator: ComplianceEvaluator::new(catalog),
            cache,
            log: DecisionLog::default(),
        }
    }

    pub fn with_log(mut self, log: DecisionLog) -> Self {
        self.log = log;
        self
    }

    pub fn evaluator(&self) -> &ComplianceEvaluator {
        &self.evaluator
    }

    pub fn cache(&self) -> &Arc<dyn DecisionCache> {
        &self.cache
    }

    pub fn log(&self) -> &DecisionLog {
        &self.log
    }

    pub fn stats(&self) -> DecisionStats {
        self.log.stats()
    }

    /// Decide whether `app` may process the data of `user_id`.
    ///
    /// A cache failure never decides the outcome: a failed lookup is treated
    /// as a miss, and a failed write is retried once and then only logged.
    /// Evaluation errors are returned as-is.
    pub async fn decide(
        &self,
        app: &AppRecord,
        user_id: Uuid,
        preference: &UserPrivacyPreference,
    ) -> Result<DecisionOutcome> {
        if preference.user_id != user_id {
            return Err(ComplianceError::PreferenceOwnerMismatch {
                user_id,
                owner: preference.user_id,
            });
        }

        let fingerprint = Fingerprint::compute(app, preference)?;

        match self
            .cache
            .lookup(user_id, &fingerprint, preference.retention_seconds)
            .await
        {
            Ok(Some(entry)) => {
                debug!(
                    user_id = %user_id,
                    app_id = %app.id,
                    fingerprint = fingerprint.short(),
                    "Cache hit"
                );
                return Ok(self.finish(app.id, user_id, fingerprint, entry.decision, true));
            }
            Ok(None) => {
                debug!(user_id = %user_id, fingerprint = fingerprint.short(), "Cache miss");
            }
            Err(e) => {
                warn!(user_id = %user_id, "Cache lookup failed, evaluating directly: {}", e);
                self.log.append(DecisionEvent::CacheError {
                    user_id: Some(user_id),
                    operation: CacheOperation::Lookup,
                    error: e.to_string(),
                });
            }
        }

        let decision = match self.evaluator.evaluate(app, preference) {
            Ok(decision) => decision,
            Err(e) => {
                warn!(user_id = %user_id, app_id = %app.id, "Evaluation failed: {}", e);
                self.log.append(DecisionEvent::EvaluationFailed {
                    user_id,
                    app_id: app.id,
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        self.store_with_retry(user_id, &fingerprint, decision).await;
        Ok(self.finish(app.id, user_id, fingerprint, decision, false))
    }

    /// Drop every cached decision of a user whose preference was updated
    pub async fn on_preference_changed(&self, user_id: Uuid) -> Result<usize> {
        match self.cache.invalidate_user(user_id).await {
            Ok(invalidated) => {
                info!(user_id = %user_id, invalidated, "Preference changed, cache invalidated");
                self.log.append(DecisionEvent::PreferenceChanged {
                    user_id,
                    invalidated,
                });
                Ok(invalidated)
            }
            Err(e) => {
                error!(user_id = %user_id, "Failed to invalidate cached decisions: {}", e);
                self.log.append(DecisionEvent::CacheError {
                    user_id: Some(user_id),
                    operation: CacheOperation::Invalidate,
                    error: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    pub async fn clear_cache(&self) -> Result<usize> {
        match self.cache.invalidate_all().await {
            Ok(invalidated) => {
                info!(invalidated, "Decision cache cleared");
                self.log.append(DecisionEvent::CacheCleared { invalidated });
                Ok(invalidated)
            }
            Err(e) => {
                error!("Failed to clear decision cache: {}", e);
                self.log.append(DecisionEvent::CacheError {
                    user_id: None,
                    operation: CacheOperation::Invalidate,
                    error: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    /// Swap in a rebuilt policy catalog.
    ///
    /// Requires exclusive access, so no decision runs while the trees change.
    /// Cached decisions were computed against the old trees and are cleared
    /// first; if that fails the old catalog stays in place.
    pub async fn replace_catalog(&mut self, catalog: Arc<PolicyCatalog>) -> Result<usize> {
        let invalidated = self.clear_cache().await?;
        self.evaluator = ComplianceEvaluator::new(catalog);
        info!(invalidated, "Policy catalog replaced");
        Ok(invalidated)
    }

    async fn store_with_retry(&self, user_id: Uuid, fingerprint: &Fingerprint, decision: Decision) {
        let first = match self.cache.store(user_id, fingerprint, decision).await {
            Ok(_) => return,
            Err(e) => e,
        };
        warn!(user_id = %user_id, "Cache write failed, retrying once: {}", first);

        if let Err(e) = self.cache.store(user_id, fingerprint, decision).await {
            error!(
                user_id = %user_id,
                fingerprint = fingerprint.short(),
                "Cache write failed after retry, serving uncached result: {}",
                e
            );
            self.log.append(DecisionEvent::CacheError {
                user_id: Some(user_id),
                operation: CacheOperation::Store,
                error: e.to_string(),
            });
        }
    }

    fn finish(
        &self,
        app_id: Uuid,
        user_id: Uuid,
        fingerprint: Fingerprint,
        decision: Decision,
        cache_hit: bool,
    ) -> DecisionOutcome {
        self.log.append(DecisionEvent::Decided {
            user_id,
            app_id,
            fingerprint: fingerprint.clone(),
            decision,
            cache_hit,
        });
        DecisionOutcome {
            decision,
            cache_hit,
            fingerprint,
        }
    }
}
