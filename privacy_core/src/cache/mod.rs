//! Decision cache.
//!
//! Entries are keyed by user and fingerprint and expire lazily: nothing is
//! evicted in the background, a lookup simply ignores an entry older than
//! the retention window it is given.

mod clock;
mod file;
mod memory;

pub use clock::{Clock, ManualClock, SystemClock};
pub use file::FileDecisionCache;
pub use memory::InMemoryDecisionCache;

use crate::error::StorageError;
use crate::fingerprint::Fingerprint;
use crate::records::Decision;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type CacheResult<T> = std::result::Result<T, StorageError>;

/// A previously computed decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub user_id: Uuid,
    pub fingerprint: Fingerprint,
    pub decision: Decision,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    /// True while `now - created_at <= retention_seconds`
    pub fn is_fresh(&self, now: DateTime<Utc>, retention_seconds: u64) -> bool {
        let age = now.signed_duration_since(self.created_at);
        match age.num_microseconds() {
            Some(micros) => i128::from(micros) <= i128::from(retention_seconds) * 1_000_000,
            // Only reachable for ages of roughly 290k years in either direction
            None => age < chrono::Duration::zero(),
        }
    }
}

/// Storage for decisions.
///
/// `store` never checks for an existing entry, so concurrent misses on the
/// same key may leave duplicates behind; lookups always read the newest one.
#[async_trait]
pub trait DecisionCache: Send + Sync {
    /// The newest entry for `(user_id, fingerprint)` if it is still fresh
    async fn lookup(
        &self,
        user_id: Uuid,
        fingerprint: &Fingerprint,
        retention_seconds: u64,
    ) -> CacheResult<Option<CacheEntry>>;

    async fn store(
        &self,
        user_id: Uuid,
        fingerprint: &Fingerprint,
        decision: Decision,
    ) -> CacheResult<CacheEntry>;

    /// Remove every entry of one user, returning how many were removed
    async fn invalidate_user(&self, user_id: Uuid) -> CacheResult<usize>;

    /// Remove every entry, returning how many were removed
    async fn invalidate_all(&self) -> CacheResult<usize>;

    /// Number of physically stored entries, stale ones included
    async fn len(&self) -> CacheResult<usize>;
}

fn newest_fresh<'a, I>(
    entries: I,
    fingerprint: &Fingerprint,
    now: DateTime<Utc>,
    retention_seconds: u64,
) -> Option<CacheEntry>
where
    I: IntoIterator<Item = &'a CacheEntry>,
{
    entries
        .into_iter()
        .filter(|e| &e.fingerprint == fingerprint)
        .max_by_key(|e| e.created_at)
        .filter(|e| e.is_fresh(now, retention_seconds))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(created_at: DateTime<Utc>, fp: &str) -> CacheEntry {
        CacheEntry {
            user_id: Uuid::new_v4(),
            fingerprint: Fingerprint::from(fp.to_string()),
            decision: Decision::Grant,
            created_at,
        }
    }

    #[test]
    fn test_freshness_boundary() {
        let t0 = Utc::now();
        let e = entry(t0, "a");
        let eps = Duration::milliseconds(1);

        assert!(e.is_fresh(t0, 100));
        assert!(e.is_fresh(t0 + Duration::seconds(100) - eps, 100));
        assert!(e.is_fresh(t0 + Duration::seconds(100), 100));
        assert!(!e.is_fresh(t0 + Duration::seconds(100) + eps, 100));
    }

    #[test]
    fn test_zero_retention_only_matches_same_instant() {
        let t0 = Utc::now();
        let e = entry(t0, "a");
        assert!(e.is_fresh(t0, 0));
        assert!(!e.is_fresh(t0 + Duration::microseconds(1), 0));
    }

    #[test]
    fn test_newest_entry_decides_freshness() {
        let t0 = Utc::now();
        let old = entry(t0, "a");
        let mut newer = entry(t0 + Duration::seconds(50), "a");
        newer.decision = Decision::Deny;
        let other = entry(t0 + Duration::seconds(90), "b");
        let entries = vec![old, newer.clone(), other];

        let now = t0 + Duration::seconds(120);
        let fp = Fingerprint::from("a".to_string());
        assert_eq!(newest_fresh(&entries, &fp, now, 100), Some(newer));
        assert_eq!(newest_fresh(&entries, &fp, now, 60), None);
    }
}
