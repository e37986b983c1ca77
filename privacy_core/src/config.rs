//! Engine configuration.
//!
//! Loaded from a TOML file; every field has a default so an empty file is a
//! valid configuration (in-memory cache, `info` logging).

use crate::cache::{Clock, DecisionCache, FileDecisionCache, InMemoryDecisionCache};
use crate::coordinator::EvaluationCoordinator;
use crate::error::{ComplianceError, Result};
use crate::event_log::DecisionLog;
use crate::policy::PolicyCatalog;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_LOG_FILTER: &str = "info";
pub const DEFAULT_EVENT_LOG_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    /// Directory for the file backend
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, overridden by `RUST_LOG`
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLogConfig {
    pub capacity: usize,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_EVENT_LOG_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Taxonomy file loaded at bootstrap
    pub taxonomy: Option<PathBuf>,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
    pub event_log: EventLogConfig,
}

impl EngineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading engine configuration from {:?}", path);
        let contents = fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&contents)?;

        // Relative paths are resolved against the config file's directory
        if let Some(dir) = path.parent() {
            config.taxonomy = config.taxonomy.map(|p| resolve(dir, p));
            config.cache.path = config.cache.path.map(|p| resolve(dir, p));
        }
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.backend == CacheBackend::File && self.cache.path.is_none() {
            return Err(ComplianceError::Config(
                "cache.path is required for the file backend".to_string(),
            ));
        }
        if self.event_log.capacity == 0 {
            return Err(ComplianceError::Config(
                "event_log.capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn build_cache(&self, clock: Arc<dyn Clock>) -> Result<Arc<dyn DecisionCache>> {
        match (self.cache.backend, &self.cache.path) {
            (CacheBackend::Memory, _) => Ok(Arc::new(InMemoryDecisionCache::with_clock(clock))),
            (CacheBackend::File, Some(path)) => {
                Ok(Arc::new(FileDecisionCache::with_clock(path, clock)?))
            }
            (CacheBackend::File, None) => Err(ComplianceError::Config(
                "cache.path is required for the file backend".to_string(),
            )),
        }
    }

    pub fn load_catalog(&self) -> Result<PolicyCatalog> {
        let path = self.taxonomy.as_ref().ok_or_else(|| {
            ComplianceError::Config("no taxonomy file configured".to_string())
        })?;
        PolicyCatalog::load(path)
    }

    pub fn build_coordinator(
        &self,
        catalog: Arc<PolicyCatalog>,
        clock: Arc<dyn Clock>,
    ) -> Result<EvaluationCoordinator> {
        let cache = self.build_cache(clock)?;
        Ok(EvaluationCoordinator::new(catalog, cache)
            .with_log(DecisionLog::new(self.event_log.capacity)))
    }
}

fn resolve(base: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}
