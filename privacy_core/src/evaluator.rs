//! Containment-based compliance evaluation.
//!
//! A requested attribute is accepted when some allowed node contains it and
//! no excepted or denied node does. Purposes follow the same rule. The app
//! must also not retain data longer than the user permits.

use crate::error::Result;
use crate::policy::{NodeId, PolicyCatalog, PolicyTree, Taxonomy};
use crate::records::{AppRecord, Decision, UserPrivacyPreference};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Why a requested node was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// No allowed entry covers the node
    NotAllowed,
    /// An excepted entry covers the node
    Excepted { by: NodeId },
    /// A denied entry covers the node
    Denied { by: NodeId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub taxonomy: Taxonomy,
    pub node: NodeId,
    pub reason: Rejection,
}

/// Per-dimension breakdown of one evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub decision: Decision,
    pub attributes_accepted: bool,
    pub purposes_accepted: bool,
    pub retention_accepted: bool,
    pub violations: Vec<Violation>,
}

/// Stateless evaluator over a shared, read-only policy catalog
#[derive(Debug, Clone)]
pub struct ComplianceEvaluator {
    catalog: Arc<PolicyCatalog>,
}

impl ComplianceEvaluator {
    pub fn new(catalog: Arc<PolicyCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Arc<PolicyCatalog> {
        &self.catalog
    }

    pub fn evaluate(&self, app: &AppRecord, preference: &UserPrivacyPreference) -> Result<Decision> {
        Ok(self.explain(app, preference)?.decision)
    }

    /// Evaluate and report which checks failed.
    ///
    /// Every id in both records is resolved first, so a dangling id fails the
    /// whole evaluation with `UnknownPolicyNode` instead of being skipped.
    pub fn explain(
        &self,
        app: &AppRecord,
        preference: &UserPrivacyPreference,
    ) -> Result<EvaluationReport> {
        self.validate(app, preference)?;

        let mut violations = Vec::new();

        let attributes_accepted = check_dimension(
            self.catalog.attributes(),
            &app.attributes,
            &preference.allowed_attributes,
            &preference.excepted_attributes,
            &preference.denied_attributes,
            &mut violations,
        );
        let purposes_accepted = check_dimension(
            self.catalog.purposes(),
            &app.purposes,
            &preference.allowed_purposes,
            &preference.excepted_purposes,
            &preference.denied_purposes,
            &mut violations,
        );
        let retention_accepted = app.retention_seconds <= preference.retention_seconds;

        let decision = if attributes_accepted && purposes_accepted && retention_accepted {
            Decision::Grant
        } else {
            Decision::Deny
        };

        debug!(
            app_id = %app.id,
            user_id = %preference.user_id,
            attributes_accepted,
            purposes_accepted,
            retention_accepted,
            %decision,
            "Evaluated compliance"
        );

        Ok(EvaluationReport {
            decision,
            attributes_accepted,
            purposes_accepted,
            retention_accepted,
            violations,
        })
    }

    fn validate(&self, app: &AppRecord, preference: &UserPrivacyPreference) -> Result<()> {
        let catalog = &self.catalog;
        catalog.validate_ids(Taxonomy::Attribute, &app.attributes)?;
        catalog.validate_ids(Taxonomy::Attribute, &preference.allowed_attributes)?;
        catalog.validate_ids(Taxonomy::Attribute, &preference.excepted_attributes)?;
        catalog.validate_ids(Taxonomy::Attribute, &preference.denied_attributes)?;
        catalog.validate_ids(Taxonomy::Purpose, &app.purposes)?;
        catalog.validate_ids(Taxonomy::Purpose, &preference.allowed_purposes)?;
        catalog.validate_ids(Taxonomy::Purpose, &preference.excepted_purposes)?;
        catalog.validate_ids(Taxonomy::Purpose, &preference.denied_purposes)?;
        Ok(())
    }
}

// Ids are validated before this runs, so a missing node can only mean "does
// not cover".
fn first_covering(
    tree: &PolicyTree,
    candidates: &BTreeSet<NodeId>,
    target: NodeId,
) -> Option<NodeId> {
    let target = tree.get(target)?;
    candidates
        .iter()
        .copied()
        .find(|c| tree.get(*c).map(|node| node.contains(target)).unwrap_or(false))
}

fn check_dimension(
    tree: &PolicyTree,
    requested: &BTreeSet<NodeId>,
    allowed: &BTreeSet<NodeId>,
    excepted: &BTreeSet<NodeId>,
    denied: &BTreeSet<NodeId>,
    violations: &mut Vec<Violation>,
) -> bool {
    let mut accepted = true;
    for &node in requested {
        let reason = if let Some(by) = first_covering(tree, denied, node) {
            Some(Rejection::Denied { by })
        } else if let Some(by) = first_covering(tree, excepted, node) {
            Some(Rejection::Excepted { by })
        } else if first_covering(tree, allowed, node).is_none() {
            Some(Rejection::NotAllowed)
        } else {
            None
        };

        if let Some(reason) = reason {
            accepted = false;
            violations.push(Violation {
                taxonomy: tree.taxonomy(),
                node,
                reason,
            });
        }
    }
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ComplianceError;
    use crate::policy::TaxonomyNode;
    use uuid::Uuid;

    // Attributes: Location(1) -> GPS(2), Cell(3); Health(4) -> HeartRate(5)
    // Purposes: Service(10) -> Delivery(11); Marketing(20)
    fn evaluator() -> ComplianceEvaluator {
        let attributes = PolicyTree::build(
            Taxonomy::Attribute,
            &[
                TaxonomyNode::with_children(
                    1,
                    "Location",
                    vec![TaxonomyNode::leaf(2, "GPS"), TaxonomyNode::leaf(3, "Cell")],
                ),
                TaxonomyNode::with_children(4, "Health", vec![TaxonomyNode::leaf(5, "HeartRate")]),
            ],
        )
        .unwrap();
        let purposes = PolicyTree::build(
            Taxonomy::Purpose,
            &[
                TaxonomyNode::with_children(10, "Service", vec![TaxonomyNode::leaf(11, "Delivery")]),
                TaxonomyNode::leaf(20, "Marketing"),
            ],
        )
        .unwrap();
        ComplianceEvaluator::new(Arc::new(PolicyCatalog::new(attributes, purposes).unwrap()))
    }

    fn gps_app() -> AppRecord {
        AppRecord::new(Uuid::new_v4(), 1000)
            .with_attributes([2])
            .with_purposes([11])
    }

    fn location_pref() -> UserPrivacyPreference {
        UserPrivacyPreference::new(Uuid::new_v4(), 1000)
            .allow_attributes([1])
            .allow_purposes([10])
    }

    #[test]
    fn test_parent_allow_covers_child() {
        let report = evaluator().explain(&gps_app(), &location_pref()).unwrap();
        assert_eq!(report.decision, Decision::Grant);
        assert!(report.violations.is_empty());
    }

    #[test]
    fn test_deny_overrides_allow() {
        let pref = location_pref().deny_attributes([2]);
        let report = evaluator().explain(&gps_app(), &pref).unwrap();
        assert_eq!(report.decision, Decision::Deny);
        assert!(!report.attributes_accepted);
        assert!(report.purposes_accepted);
        assert_eq!(
            report.violations,
            vec![Violation {
                taxonomy: Taxonomy::Attribute,
                node: NodeId(2),
                reason: Rejection::Denied { by: NodeId(2) },
            }]
        );
    }

    #[test]
    fn test_deny_at_ancestor_level() {
        let pref = UserPrivacyPreference::new(Uuid::new_v4(), 1000)
            .allow_attributes([2])
            .deny_attributes([1])
            .allow_purposes([10]);
        assert_eq!(evaluator().evaluate(&gps_app(), &pref).unwrap(), Decision::Deny);
    }

    #[test]
    fn test_except_behaves_like_deny() {
        let pref = location_pref().except_attributes([2]);
        let report = evaluator().explain(&gps_app(), &pref).unwrap();
        assert_eq!(report.decision, Decision::Deny);
        assert_eq!(
            report.violations[0].reason,
            Rejection::Excepted { by: NodeId(2) }
        );

        let pref = location_pref().except_purposes([11]);
        assert_eq!(evaluator().evaluate(&gps_app(), &pref).unwrap(), Decision::Deny);
    }

    #[test]
    fn test_excepting_a_sibling_does_not_reject() {
        let pref = location_pref().except_attributes([3]);
        assert_eq!(evaluator().evaluate(&gps_app(), &pref).unwrap(), Decision::Grant);
    }

    #[test]
    fn test_retention_exceeded() {
        let mut app = gps_app();
        app.retention_seconds = 5000;
        let report = evaluator().explain(&app, &location_pref()).unwrap();
        assert_eq!(report.decision, Decision::Deny);
        assert!(report.attributes_accepted);
        assert!(report.purposes_accepted);
        assert!(!report.retention_accepted);
    }

    #[test]
    fn test_retention_equal_is_accepted() {
        let mut app = gps_app();
        app.retention_seconds = 1000;
        assert_eq!(
            evaluator().evaluate(&app, &location_pref()).unwrap(),
            Decision::Grant
        );
    }

    #[test]
    fn test_one_failing_attribute_rejects_request() {
        let app = gps_app().with_attributes([5]);
        let report = evaluator().explain(&app, &location_pref()).unwrap();
        assert_eq!(report.decision, Decision::Deny);
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].node, NodeId(5));
        assert_eq!(report.violations[0].reason, Rejection::NotAllowed);
    }

    #[test]
    fn test_child_allow_does_not_cover_parent() {
        let app = AppRecord::new(Uuid::new_v4(), 10)
            .with_attributes([1])
            .with_purposes([11]);
        let pref = UserPrivacyPreference::new(Uuid::new_v4(), 10)
            .allow_attributes([2, 3])
            .allow_purposes([10]);
        assert_eq!(evaluator().evaluate(&app, &pref).unwrap(), Decision::Deny);
    }

    #[test]
    fn test_purpose_not_allowed() {
        let app = gps_app().with_purposes([20]);
        let report = evaluator().explain(&app, &location_pref()).unwrap();
        assert!(!report.purposes_accepted);
        assert_eq!(report.violations[0].taxonomy, Taxonomy::Purpose);
    }

    #[test]
    fn test_empty_request_is_trivially_accepted() {
        let app = AppRecord::new(Uuid::new_v4(), 0);
        let pref = UserPrivacyPreference::new(Uuid::new_v4(), 0);
        assert_eq!(evaluator().evaluate(&app, &pref).unwrap(), Decision::Grant);
    }

    #[test]
    fn test_unknown_ids_fail_closed() {
        let eval = evaluator();

        let app = gps_app().with_attributes([99]);
        assert!(matches!(
            eval.evaluate(&app, &location_pref()),
            Err(ComplianceError::UnknownPolicyNode { taxonomy: Taxonomy::Attribute, id }) if id == NodeId(99)
        ));

        // Dangling id in a list that would not otherwise matter
        let pref = location_pref().deny_purposes([77]);
        assert!(matches!(
            eval.evaluate(&gps_app(), &pref),
            Err(ComplianceError::UnknownPolicyNode { taxonomy: Taxonomy::Purpose, .. })
        ));

        // An attribute id used as a purpose is unknown in that taxonomy
        let app = gps_app().with_purposes([1]);
        assert!(eval.evaluate(&app, &location_pref()).is_err());
    }
}
