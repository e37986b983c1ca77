use super::record::DecisionEvent;
use serde::{Deserialize, Serialize};

/// Running counters over decision events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionStats {
    pub decisions: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub grants: usize,
    pub denies: usize,
    pub evaluation_failures: usize,
    pub invalidations: usize,
    pub invalidated_entries: usize,
    pub cache_errors: usize,
}

impl DecisionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process_event(&mut self, event: &DecisionEvent) {
        match event {
            DecisionEvent::Decided {
                decision,
                cache_hit,
                ..
            } => {
                self.decisions += 1;
                if *cache_hit {
                    self.cache_hits += 1;
                } else {
                    self.cache_misses += 1;
                }
                if decision.is_grant() {
                    self.grants += 1;
                } else {
                    self.denies += 1;
                }
            }
            DecisionEvent::EvaluationFailed { .. } => {
                self.evaluation_failures += 1;
            }
            DecisionEvent::PreferenceChanged { invalidated, .. }
            | DecisionEvent::CacheCleared { invalidated } => {
                self.invalidations += 1;
                self.invalidated_entries += invalidated;
            }
            DecisionEvent::CacheError { .. } => {
                self.cache_errors += 1;
            }
        }
    }

    /// Fraction of decisions served from cache, 0.0 when nothing was decided
    pub fn hit_ratio(&self) -> f64 {
        if self.decisions == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.decisions as f64
        }
    }
}
