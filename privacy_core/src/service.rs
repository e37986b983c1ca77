use crate::coordinator::{DecisionOutcome, EvaluationCoordinator};
use crate::error::Result;
use crate::event_log::DecisionStats;
use crate::records::{AppRecord, RecordStore, UserPrivacyPreference};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Caller-facing decision API: resolves ids against the record store and
/// keeps the cache consistent with preference updates.
#[derive(Clone)]
pub struct PrivacyService {
    records: RecordStore,
    coordinator: Arc<EvaluationCoordinator>,
}

impl PrivacyService {
    pub fn new(records: RecordStore, coordinator: Arc<EvaluationCoordinator>) -> Self {
        Self {
            records,
            coordinator,
        }
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn coordinator(&self) -> &Arc<EvaluationCoordinator> {
        &self.coordinator
    }

    pub fn register_app(&self, app: AppRecord) -> Result<Uuid> {
        let id = self.records.put_app(app)?;
        info!(app_id = %id, "Registered app");
        Ok(id)
    }

    pub async fn evaluate(&self, app_id: Uuid, user_id: Uuid) -> Result<DecisionOutcome> {
        let app = self.records.app(&app_id)?;
        let preference = self.records.preference(&user_id)?;
        self.coordinator.decide(&app, user_id, &preference).await
    }

    /// Store a new preference and drop the user's cached decisions.
    ///
    /// If the cache cannot be invalidated the previous preference is restored
    /// and the error returned, so a failed update never takes effect.
    pub async fn update_preference(
        &self,
        user_id: Uuid,
        mut preference: UserPrivacyPreference,
    ) -> Result<()> {
        preference.user_id = user_id;
        let previous = self.records.put_preference(preference)?;

        if let Err(e) = self.coordinator.on_preference_changed(user_id).await {
            warn!(user_id = %user_id, "Rolling back preference update: {}", e);
            match previous {
                Some(previous) => {
                    self.records.put_preference(previous)?;
                }
                None => {
                    self.records.remove_preference(&user_id)?;
                }
            }
            return Err(e);
        }
        Ok(())
    }

    pub async fn clear_cache(&self) -> Result<usize> {
        self.coordinator.clear_cache().await
    }

    pub fn stats(&self) -> DecisionStats {
        self.coordinator.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheEntry, CacheResult, DecisionCache, InMemoryDecisionCache};
    use crate::error::{ComplianceError, StorageError};
    use crate::fingerprint::Fingerprint;
    use async_trait::async_trait;
    use crate::policy::{PolicyCatalog, PolicyTree, Taxonomy, TaxonomyNode};
    use crate::records::Decision;

    fn service() -> PrivacyService {
        service_with_cache(Arc::new(InMemoryDecisionCache::new()))
    }

    fn service_with_cache(cache: Arc<dyn DecisionCache>) -> PrivacyService {
        let attributes = PolicyTree::build(
            Taxonomy::Attribute,
            &[TaxonomyNode::with_children(
                1,
                "Contacts",
                vec![TaxonomyNode::leaf(2, "Email"), TaxonomyNode::leaf(3, "Phone")],
            )],
        )
        .unwrap();
        let purposes =
            PolicyTree::build(Taxonomy::Purpose, &[TaxonomyNode::leaf(10, "Support")]).unwrap();
        let catalog = Arc::new(PolicyCatalog::new(attributes, purposes).unwrap());
        let coordinator = EvaluationCoordinator::new(catalog, cache);
        PrivacyService::new(RecordStore::new(), Arc::new(coordinator))
    }

    #[tokio::test]
    async fn test_evaluate_by_id() {
        let service = service();
        let app_id = service
            .register_app(
                AppRecord::new(Uuid::new_v4(), 30)
                    .with_attributes([2])
                    .with_purposes([10]),
            )
            .unwrap();
        let user_id = Uuid::new_v4();
        service
            .update_preference(
                user_id,
                UserPrivacyPreference::new(user_id, 60)
                    .allow_attributes([1])
                    .allow_purposes([10]),
            )
            .await
            .unwrap();

        let outcome = service.evaluate(app_id, user_id).await.unwrap();
        assert_eq!(outcome.decision, Decision::Grant);
        assert!(!outcome.cache_hit);
        assert!(service.evaluate(app_id, user_id).await.unwrap().cache_hit);
    }

    #[tokio::test]
    async fn test_update_preference_changes_outcome() {
        let service = service();
        let app_id = service
            .register_app(AppRecord::new(Uuid::new_v4(), 30).with_attributes([3]))
            .unwrap();
        let user_id = Uuid::new_v4();
        let allow_all = UserPrivacyPreference::new(user_id, 60).allow_attributes([1]);

        service.update_preference(user_id, allow_all.clone()).await.unwrap();
        assert_eq!(
            service.evaluate(app_id, user_id).await.unwrap().decision,
            Decision::Grant
        );

        service
            .update_preference(user_id, allow_all.deny_attributes([3]))
            .await
            .unwrap();
        let outcome = service.evaluate(app_id, user_id).await.unwrap();
        assert_eq!(outcome.decision, Decision::Deny);
        assert!(!outcome.cache_hit);
        assert_eq!(service.stats().invalidations, 2);
    }

    #[tokio::test]
    async fn test_update_preference_takes_owner_from_argument() {
        let service = service();
        let user_id = Uuid::new_v4();
        service
            .update_preference(user_id, UserPrivacyPreference::new(Uuid::new_v4(), 5))
            .await
            .unwrap();
        assert_eq!(service.records().preference(&user_id).unwrap().user_id, user_id);
    }

    #[tokio::test]
    async fn test_unknown_ids() {
        let service = service();
        assert!(matches!(
            service.evaluate(Uuid::new_v4(), Uuid::new_v4()).await,
            Err(ComplianceError::AppNotFound(_))
        ));

        let app_id = service
            .register_app(AppRecord::new(Uuid::new_v4(), 1))
            .unwrap();
        assert!(matches!(
            service.evaluate(app_id, Uuid::new_v4()).await,
            Err(ComplianceError::PreferenceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_clear_cache() {
        let service = service();
        let app_id = service
            .register_app(AppRecord::new(Uuid::new_v4(), 1))
            .unwrap();
        let user_id = Uuid::new_v4();
        service
            .update_preference(user_id, UserPrivacyPreference::new(user_id, 10))
            .await
            .unwrap();

        service.evaluate(app_id, user_id).await.unwrap();
        assert_eq!(service.clear_cache().await.unwrap(), 1);
        assert!(!service.evaluate(app_id, user_id).await.unwrap().cache_hit);
    }

    /// Cache that can serve decisions but never invalidate
    struct StuckCache(InMemoryDecisionCache);

    #[async_trait]
    impl DecisionCache for StuckCache {
        async fn lookup(
            &self,
            user_id: Uuid,
            fingerprint: &Fingerprint,
            retention_seconds: u64,
        ) -> CacheResult<Option<CacheEntry>> {
            self.0.lookup(user_id, fingerprint, retention_seconds).await
        }

        async fn store(
            &self,
            user_id: Uuid,
            fingerprint: &Fingerprint,
            decision: Decision,
        ) -> CacheResult<CacheEntry> {
            self.0.store(user_id, fingerprint, decision).await
        }

        async fn invalidate_user(&self, _user_id: Uuid) -> CacheResult<usize> {
            Err(StorageError::Other("invalidate unavailable".to_string()))
        }

        async fn invalidate_all(&self) -> CacheResult<usize> {
            Err(StorageError::Other("invalidate unavailable".to_string()))
        }

        async fn len(&self) -> CacheResult<usize> {
            self.0.len().await
        }
    }

    #[tokio::test]
    async fn test_failed_invalidation_rolls_back_update() {
        let service = service_with_cache(Arc::new(StuckCache(InMemoryDecisionCache::new())));
        let user_id = Uuid::new_v4();

        // First update: nothing to roll back to
        let result = service
            .update_preference(user_id, UserPrivacyPreference::new(user_id, 60))
            .await;
        assert!(matches!(result, Err(ComplianceError::CacheUnavailable(_))));
        assert!(matches!(
            service.records().preference(&user_id),
            Err(ComplianceError::PreferenceNotFound(_))
        ));

        // Later update: the previous preference is restored
        let original = UserPrivacyPreference::new(user_id, 60).allow_attributes([1]);
        service.records().put_preference(original.clone()).unwrap();
        let result = service
            .update_preference(user_id, original.clone().deny_attributes([3]))
            .await;
        assert!(result.is_err());
        assert_eq!(service.records().preference(&user_id).unwrap(), original);
    }
}
