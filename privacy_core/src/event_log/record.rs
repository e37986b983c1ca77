use super::stats::DecisionStats;
use crate::fingerprint::Fingerprint;
use crate::records::Decision;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheOperation {
    Lookup,
    Store,
    Invalidate,
}

impl fmt::Display for CacheOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheOperation::Lookup => write!(f, "lookup"),
            CacheOperation::Store => write!(f, "store"),
            CacheOperation::Invalidate => write!(f, "invalidate"),
        }
    }
}

/// Something the coordinator did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DecisionEvent {
    Decided {
        user_id: Uuid,
        app_id: Uuid,
        fingerprint: Fingerprint,
        decision: Decision,
        cache_hit: bool,
    },
    EvaluationFailed {
        user_id: Uuid,
        app_id: Uuid,
        error: String,
    },
    PreferenceChanged {
        user_id: Uuid,
        invalidated: usize,
    },
    CacheCleared {
        invalidated: usize,
    },
    CacheError {
        user_id: Option<Uuid>,
        operation: CacheOperation,
        error: String,
    },
}

impl DecisionEvent {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            DecisionEvent::Decided { user_id, .. }
            | DecisionEvent::EvaluationFailed { user_id, .. }
            | DecisionEvent::PreferenceChanged { user_id, .. } => Some(*user_id),
            DecisionEvent::CacheError { user_id, .. } => *user_id,
            DecisionEvent::CacheCleared { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    pub event: DecisionEvent,
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {:?}", self.timestamp, self.event)
    }
}

/// A thread-safe, bounded log of decision events; the oldest record is
/// dropped once capacity is reached
#[derive(Debug, Clone)]
pub struct DecisionLog {
    records: Arc<Mutex<VecDeque<EventRecord>>>,
    stats: Arc<Mutex<DecisionStats>>,
    capacity: usize,
}

impl DecisionLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            stats: Arc::new(Mutex::new(DecisionStats::new())),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record an event. Statistics count every event, including ones that
    /// have since rotated out of the log.
    pub fn append(&self, event: DecisionEvent) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.process_event(&event);
        }
        let record = EventRecord {
            timestamp: Utc::now(),
            event,
        };
        if let Ok(mut records) = self.records.lock() {
            if self.capacity == 0 {
                return;
            }
            if records.len() >= self.capacity {
                records.pop_front();
            }
            records.push_back(record);
        }
    }

    pub fn all(&self) -> Vec<EventRecord> {
        self.records
            .lock()
            .map(|records| records.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Get the most recent N records, newest first
    pub fn recent(&self, n: usize) -> Vec<EventRecord> {
        self.records
            .lock()
            .map(|records| records.iter().rev().take(n).cloned().collect())
            .unwrap_or_default()
    }

    pub fn for_user(&self, user_id: Uuid) -> Vec<EventRecord> {
        self.records
            .lock()
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.event.user_id() == Some(user_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn stats(&self) -> DecisionStats {
        self.stats
            .lock()
            .map(|stats| stats.clone())
            .unwrap_or_default()
    }
}

impl Default for DecisionLog {
    fn default() -> Self {
        Self::new(1024)
    }
}
