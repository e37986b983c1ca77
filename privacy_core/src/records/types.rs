use crate::policy::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// What an application asks to do with a user's data.
///
/// A new version of an app is a new record; records are never edited while
/// a decision is being computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRecord {
    pub id: Uuid,
    #[serde(default)]
    pub attributes: BTreeSet<NodeId>,
    #[serde(default)]
    pub purposes: BTreeSet<NodeId>,
    pub retention_seconds: u64,
}

impl AppRecord {
    pub fn new(id: Uuid, retention_seconds: u64) -> Self {
        Self {
            id,
            attributes: BTreeSet::new(),
            purposes: BTreeSet::new(),
            retention_seconds,
        }
    }

    pub fn with_attributes<I: IntoIterator<Item = u32>>(mut self, ids: I) -> Self {
        self.attributes.extend(ids.into_iter().map(NodeId));
        self
    }

    pub fn with_purposes<I: IntoIterator<Item = u32>>(mut self, ids: I) -> Self {
        self.purposes.extend(ids.into_iter().map(NodeId));
        self
    }
}

/// A user's consent settings.
///
/// Excepted and denied entries both act as hard negatives that override any
/// matching allow entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPrivacyPreference {
    pub user_id: Uuid,
    #[serde(default)]
    pub allowed_attributes: BTreeSet<NodeId>,
    #[serde(default)]
    pub excepted_attributes: BTreeSet<NodeId>,
    #[serde(default)]
    pub denied_attributes: BTreeSet<NodeId>,
    #[serde(default)]
    pub allowed_purposes: BTreeSet<NodeId>,
    #[serde(default)]
    pub excepted_purposes: BTreeSet<NodeId>,
    #[serde(default)]
    pub denied_purposes: BTreeSet<NodeId>,
    pub retention_seconds: u64,
}

impl UserPrivacyPreference {
    pub fn new(user_id: Uuid, retention_seconds: u64) -> Self {
        Self {
            user_id,
            allowed_attributes: BTreeSet::new(),
            excepted_attributes: BTreeSet::new(),
            denied_attributes: BTreeSet::new(),
            allowed_purposes: BTreeSet::new(),
            excepted_purposes: BTreeSet::new(),
            denied_purposes: BTreeSet::new(),
            retention_seconds,
        }
    }

    pub fn allow_attributes<I: IntoIterator<Item = u32>>(mut self, ids: I) -> Self {
        self.allowed_attributes.extend(ids.into_iter().map(NodeId));
        self
    }

    pub fn except_attributes<I: IntoIterator<Item = u32>>(mut self, ids: I) -> Self {
        self.excepted_attributes.extend(ids.into_iter().map(NodeId));
        self
    }

    pub fn deny_attributes<I: IntoIterator<Item = u32>>(mut self, ids: I) -> Self {
        self.denied_attributes.extend(ids.into_iter().map(NodeId));
        self
    }

    pub fn allow_purposes<I: IntoIterator<Item = u32>>(mut self, ids: I) -> Self {
        self.allowed_purposes.extend(ids.into_iter().map(NodeId));
        self
    }

    pub fn except_purposes<I: IntoIterator<Item = u32>>(mut self, ids: I) -> Self {
        self.excepted_purposes.extend(ids.into_iter().map(NodeId));
        self
    }

    pub fn deny_purposes<I: IntoIterator<Item = u32>>(mut self, ids: I) -> Self {
        self.denied_purposes.extend(ids.into_iter().map(NodeId));
        self
    }
}

/// Outcome of a compliance decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Grant,
    Deny,
}

impl Decision {
    pub fn is_grant(&self) -> bool {
        matches!(self, Decision::Grant)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Grant => write!(f, "grant"),
            Decision::Deny => write!(f, "deny"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_app_builder() {
        let id = Uuid::new_v4();
        let app = AppRecord::new(id, 3600)
            .with_attributes([2, 1, 2])
            .with_purposes([10]);
        assert_eq!(app.attributes.len(), 2);
        assert!(app.attributes.contains(&NodeId(1)));
        assert!(app.purposes.contains(&NodeId(10)));
    }

    #[test]
    fn test_preference_from_json_defaults_missing_lists() {
        let user_id = Uuid::new_v4();
        let pref: UserPrivacyPreference = serde_json::from_value(json!({
            "user_id": user_id,
            "allowed_attributes": [3, 1],
            "retention_seconds": 60
        }))
        .unwrap();

        assert_eq!(pref.user_id, user_id);
        assert_eq!(
            pref.allowed_attributes.iter().copied().collect::<Vec<_>>(),
            vec![NodeId(1), NodeId(3)]
        );
        assert!(pref.denied_purposes.is_empty());
    }

    #[test]
    fn test_decision_serialization() {
        assert_eq!(serde_json::to_string(&Decision::Grant).unwrap(), "\"grant\"");
        let parsed: Decision = serde_json::from_str("\"deny\"").unwrap();
        assert_eq!(parsed, Decision::Deny);
        assert_eq!(Decision::Deny.to_string(), "deny");
    }
}
