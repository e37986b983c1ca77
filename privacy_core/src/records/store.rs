use super::types::{AppRecord, UserPrivacyPreference};
use crate::error::{ComplianceError, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;
use uuid::Uuid;

/// Thread-safe in-memory store of app records and user preferences
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    apps: Arc<RwLock<HashMap<Uuid, AppRecord>>>,
    preferences: Arc<RwLock<HashMap<Uuid, UserPrivacyPreference>>>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an app record, returning its id
    pub fn put_app(&self, app: AppRecord) -> Result<Uuid> {
        let id = app.id;
        let mut apps = self
            .apps
            .write()
            .map_err(|e| ComplianceError::RecordStore(e.to_string()))?;
        apps.insert(id, app);
        debug!(app_id = %id, "Stored app record");
        Ok(id)
    }

    pub fn app(&self, id: &Uuid) -> Result<AppRecord> {
        let apps = self
            .apps
            .read()
            .map_err(|e| ComplianceError::RecordStore(e.to_string()))?;
        apps.get(id).cloned().ok_or(ComplianceError::AppNotFound(*id))
    }

    /// Insert or replace a preference, returning the previous one if any
    pub fn put_preference(
        &self,
        preference: UserPrivacyPreference,
    ) -> Result<Option<UserPrivacyPreference>> {
        let mut prefs = self
            .preferences
            .write()
            .map_err(|e| ComplianceError::RecordStore(e.to_string()))?;
        debug!(user_id = %preference.user_id, "Stored privacy preference");
        Ok(prefs.insert(preference.user_id, preference))
    }

    pub fn preference(&self, user_id: &Uuid) -> Result<UserPrivacyPreference> {
        let prefs = self
            .preferences
            .read()
            .map_err(|e| ComplianceError::RecordStore(e.to_string()))?;
        prefs
            .get(user_id)
            .cloned()
            .ok_or(ComplianceError::PreferenceNotFound(*user_id))
    }

    /// Remove a user's preference, returning it if one was stored
    pub fn remove_preference(&self, user_id: &Uuid) -> Result<Option<UserPrivacyPreference>> {
        let mut prefs = self
            .preferences
            .write()
            .map_err(|e| ComplianceError::RecordStore(e.to_string()))?;
        Ok(prefs.remove(user_id))
    }

    pub fn app_ids(&self) -> Result<Vec<Uuid>> {
        let apps = self
            .apps
            .read()
            .map_err(|e| ComplianceError::RecordStore(e.to_string()))?;
        Ok(apps.keys().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_store_and_fetch_app() {
        let store = RecordStore::new();
        let app = AppRecord::new(Uuid::new_v4(), 60).with_attributes([1]);
        let id = store.put_app(app.clone()).unwrap();
        assert_eq!(store.app(&id).unwrap(), app);
        assert_eq!(store.app_ids().unwrap(), vec![id]);
    }

    #[test]
    fn test_missing_records() {
        let store = RecordStore::new();
        let id = Uuid::new_v4();
        assert!(matches!(store.app(&id), Err(ComplianceError::AppNotFound(_))));
        assert!(matches!(
            store.preference(&id),
            Err(ComplianceError::PreferenceNotFound(_))
        ));
    }

    #[test]
    fn test_replace_preference_returns_previous() {
        let store = RecordStore::new();
        let user_id = Uuid::new_v4();
        let first = UserPrivacyPreference::new(user_id, 60);
        assert!(store.put_preference(first.clone()).unwrap().is_none());

        let second = UserPrivacyPreference::new(user_id, 120).allow_attributes([1]);
        let previous = store.put_preference(second.clone()).unwrap();
        assert_eq!(previous, Some(first));
        assert_eq!(store.preference(&user_id).unwrap(), second);
    }

    #[test]
    fn test_concurrent_inserts() {
        let store = RecordStore::new();
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let s = store.clone();
                thread::spawn(move || {
                    s.put_app(AppRecord::new(Uuid::new_v4(), 10)).unwrap();
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.app_ids().unwrap().len(), 10);
    }

    #[test]
    fn test_poisoned_lock_is_reported() {
        let store = RecordStore::new();
        let poisoner = store.clone();
        let _ = thread::spawn(move || {
            let _guard = poisoner.apps.write().unwrap();
            panic!("poison the app lock");
        })
        .join();

        assert!(matches!(
            store.app_ids(),
            Err(ComplianceError::RecordStore(_))
        ));
    }

    #[test]
    fn test_remove_preference() {
        let store = RecordStore::new();
        let user_id = Uuid::new_v4();
        store
            .put_preference(UserPrivacyPreference::new(user_id, 60))
            .unwrap();

        assert!(store.remove_preference(&user_id).unwrap().is_some());
        assert!(store.remove_preference(&user_id).unwrap().is_none());
    }
}
