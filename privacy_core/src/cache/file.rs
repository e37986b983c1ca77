use super::{newest_fresh, CacheEntry, CacheResult, Clock, DecisionCache, SystemClock};
use crate::fingerprint::Fingerprint;
use crate::records::Decision;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Decision cache persisted as one JSON document per user
#[derive(Debug)]
pub struct FileDecisionCache {
    base_path: PathBuf,
    clock: Arc<dyn Clock>,
    // Serializes read-modify-write cycles on user files
    write_lock: Mutex<()>,
}

impl FileDecisionCache {
    pub fn new<P: AsRef<Path>>(base_path: P) -> CacheResult<Self> {
        Self::with_clock(base_path, Arc::new(SystemClock))
    }

    pub fn with_clock<P: AsRef<Path>>(base_path: P, clock: Arc<dyn Clock>) -> CacheResult<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        debug!("Creating FileDecisionCache with base path: {:?}", base_path);

        if !base_path.exists() {
            debug!("Base path doesn't exist, creating directory");
            std::fs::create_dir_all(&base_path).map_err(|e| {
                error!("Failed to create cache directory: {}", e);
                e
            })?;
        }

        Ok(Self {
            base_path,
            clock,
            write_lock: Mutex::new(()),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn user_path(&self, user_id: &Uuid) -> PathBuf {
        self.base_path.join(format!("{}.json", user_id))
    }

    async fn read_entries(&self, path: &Path) -> CacheResult<Vec<CacheEntry>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => {
                error!("Failed to read cache file {:?}: {}", path, e);
                Err(e.into())
            }
        }
    }

    async fn write_entries(&self, path: &Path, entries: &[CacheEntry]) -> CacheResult<()> {
        let json = serde_json::to_vec_pretty(entries)?;
        // Write-then-rename so a reader never sees a half-written document
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Delete a user file. The entry count is best-effort: an unreadable
    /// file counts as zero but is still removed.
    async fn remove_entries(&self, path: &Path) -> CacheResult<usize> {
        let count = match self.read_entries(path).await {
            Ok(entries) => entries.len(),
            Err(e) => {
                warn!("Unreadable cache file {:?}, removing anyway: {}", path, e);
                0
            }
        };
        match fs::remove_file(path).await {
            Ok(()) => Ok(count),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    async fn cache_files(&self) -> CacheResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut dir = fs::read_dir(&self.base_path).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|ext| ext == "json").unwrap_or(false) {
                files.push(path);
            }
        }
        Ok(files)
    }
}

#[async_trait]
impl DecisionCache for FileDecisionCache {
    async fn lookup(
        &self,
        user_id: Uuid,
        fingerprint: &Fingerprint,
        retention_seconds: u64,
    ) -> CacheResult<Option<CacheEntry>> {
        let entries = self.read_entries(&self.user_path(&user_id)).await?;
        Ok(newest_fresh(
            &entries,
            fingerprint,
            self.clock.now(),
            retention_seconds,
        ))
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

        let _guard = self.write_lock.lock().await;
        let path = self.user_path(&user_id);
        let mut entries = self.read_entries(&path).await?;
        entries.push(entry.clone());
        self.write_entries(&path, &entries).await?;

        debug!(user_id = %user_id, fingerprint = fingerprint.short(), "Persisted decision");
        Ok(entry)
    }

    async fn invalidate_user(&self, user_id: Uuid) -> CacheResult<usize> {
        let _guard = self.write_lock.lock().await;
        let removed = self.remove_entries(&self.user_path(&user_id)).await?;
        debug!(user_id = %user_id, removed, "Invalidated user decisions");
        Ok(removed)
    }

    async fn invalidate_all(&self) -> CacheResult<usize> {
        let _guard = self.write_lock.lock().await;
        let mut removed = 0;
        let mut first_error = None;
        for path in self.cache_files().await? {
            match self.remove_entries(&path).await {
                Ok(count) => removed += count,
                Err(e) => {
                    error!("Failed to remove cache file {:?}: {}", path, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }
        debug!(removed, "Cleared decision cache");
        Ok(removed)
    }

    async fn len(&self) -> CacheResult<usize> {
        let mut total = 0;
        for path in self.cache_files().await? {
            total += self.read_entries(&path).await?.len();
        }
        Ok(total)
    }
}
