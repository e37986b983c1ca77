use super::{newest_fresh, CacheEntry, CacheResult, Clock, DecisionCache, SystemClock};
use crate::error::StorageError;
use crate::fingerprint::Fingerprint;
use crate::records::Decision;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

/// Process-local decision cache
#[derive(Debug)]
pub struct InMemoryDecisionCache {
    entries: Mutex<HashMap<Uuid, Vec<CacheEntry>>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryDecisionCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn lock(&self) -> CacheResult<std::sync::MutexGuard<'_, HashMap<Uuid, Vec<CacheEntry>>>> {
        self.entries
            .lock()
            .map_err(|e| StorageError::LockError(e.to_string()))
    }
}

impl Default for InMemoryDecisionCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DecisionCache for InMemoryDecisionCache {
    async fn lookup(
        &self,
        user_id: Uuid,
        fingerprint: &Fingerprint,
        retention_seconds: u64,
    ) -> CacheResult<Option<CacheEntry>> {
        let now = self.clock.now();
        let entries = self.lock()?;
        Ok(entries
            .get(&user_id)
            .and_then(|list| newest_fresh(list, fingerprint, now, retention_seconds)))
    }

    async fn store(
        &self,
        user_id: Uuid,
        fingerprint: &Fingerprint,
        decision: Decision,
    ) -> CacheResult<CacheEntry> {
        let entry = CacheEntry {
            user_id,
            fingerprint: fingerprint.clone(),
            decision,
            created_at: self.clock.now(),
        };
        self.lock()?
            .entry(user_id)
            .or_default()
            .push(entry.clone());
        debug!(user_id = %user_id, fingerprint = fingerprint.short(), "Cached decision");
        Ok(entry)
    }

    async fn invalidate_user(&self, user_id: Uuid) -> CacheResult<usize> {
        let removed = self
            .lock()?
            .remove(&user_id)
            .map(|list| list.len())
            .unwrap_or(0);
        debug!(user_id = %user_id, removed, "Invalidated user decisions");
        Ok(removed)
    }

    async fn invalidate_all(&self) -> CacheResult<usize> {
        let mut entries = self.lock()?;
        let removed = entries.values().map(Vec::len).sum();
        entries.clear();
        debug!(removed, "Cleared decision cache");
        Ok(removed)
    }

    async fn len(&self) -> CacheResult<usize> {
        Ok(self.lock()?.values().map(Vec::len).sum())
    }
}
