use crate::error::{ComplianceError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::debug;

/// Identifier of a taxonomy entry (an attribute or a purpose)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(id: u32) -> Self {
        NodeId(id)
    }
}

/// Which of the two independent taxonomies a tree encodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Taxonomy {
    Attribute,
    Purpose,
}

impl fmt::Display for Taxonomy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Taxonomy::Attribute => write!(f, "attribute"),
            Taxonomy::Purpose => write!(f, "purpose"),
        }
    }
}

/// One taxonomy entry with its nested-set interval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyNode {
    pub id: NodeId,
    pub name: String,
    pub left: u32,
    pub right: u32,
}

impl PolicyNode {
    pub fn new(id: impl Into<NodeId>, name: impl Into<String>, left: u32, right: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            left,
            right,
        }
    }

    /// Interval containment: true when `self` is `other` or one of its ancestors
    pub fn contains(&self, other: &PolicyNode) -> bool {
        self.left <= other.left && self.right >= other.right
    }
}

/// Hierarchical description of a taxonomy, numbered by [`PolicyTree::build`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyNode {
    pub id: NodeId,
    pub name: String,
    #[serde(default)]
    pub children: Vec<TaxonomyNode>,
}

impl TaxonomyNode {
    pub fn leaf(id: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children(
        id: impl Into<NodeId>,
        name: impl Into<String>,
        children: Vec<TaxonomyNode>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            children,
        }
    }
}

/// A read-only taxonomy encoded with the nested set model.
///
/// Nodes are kept in pre-order (ascending `left`), so the descendants of a
/// node form the contiguous run that follows it. Ancestor checks compare two
/// intervals and never walk the tree.
#[derive(Debug, Clone)]
pub struct PolicyTree {
    taxonomy: Taxonomy,
    nodes: Vec<PolicyNode>,
    index: HashMap<NodeId, usize>,
    parents: Vec<Option<usize>>,
}

impl PolicyTree {
    /// Number a hierarchy by pre-order traversal and index it.
    ///
    /// The first visit of a node assigns `left`; `right` is assigned once all
    /// of its children are numbered. Multiple roots are numbered one after
    /// another, the first starting at 1.
    pub fn build(taxonomy: Taxonomy, roots: &[TaxonomyNode]) -> Result<Self> {
        let mut nodes = Vec::new();
        let mut counter = 1u32;
        for root in roots {
            number(root, &mut counter, &mut nodes);
        }
        debug!(%taxonomy, nodes = nodes.len(), "Numbered taxonomy");
        Self::from_intervals(taxonomy, nodes)
    }

    /// Index a flat list of already-numbered nodes, rejecting any list whose
    /// intervals are not consistently nested.
    pub fn from_intervals(taxonomy: Taxonomy, mut nodes: Vec<PolicyNode>) -> Result<Self> {
        nodes.sort_by_key(|n| n.left);

        if let Some(first) = nodes.first() {
            if first.left != 1 {
                return Err(ComplianceError::MalformedTaxonomy(format!(
                    "{} tree must start at left = 1, found {}",
                    taxonomy, first.left
                )));
            }
        }

        let mut index = HashMap::with_capacity(nodes.len());
        let mut endpoints = HashSet::with_capacity(nodes.len() * 2);
        for (pos, node) in nodes.iter().enumerate() {
            if node.left >= node.right {
                return Err(ComplianceError::MalformedTaxonomy(format!(
                    "node {} has empty interval [{}, {}]",
                    node.id, node.left, node.right
                )));
            }
            if index.insert(node.id, pos).is_some() {
                return Err(ComplianceError::MalformedTaxonomy(format!(
                    "duplicate node id {}",
                    node.id
                )));
            }
            if !endpoints.insert(node.left) || !endpoints.insert(node.right) {
                return Err(ComplianceError::MalformedTaxonomy(format!(
                    "node {} shares an interval endpoint with another node",
                    node.id
                )));
            }
        }

        // Stack of currently open intervals; the top is the innermost.
        let mut parents = Vec::with_capacity(nodes.len());
        let mut open: Vec<usize> = Vec::new();
        for (pos, node) in nodes.iter().enumerate() {
            while let Some(&top) = open.last() {
                if nodes[top].right < node.left {
                    open.pop();
                } else {
                    break;
                }
            }
            let parent = match open.last() {
                Some(&top) if nodes[top].right > node.right => Some(top),
                Some(&top) => {
                    return Err(ComplianceError::MalformedTaxonomy(format!(
                        "node {} [{}, {}] overlaps node {} [{}, {}] without containment",
                        node.id,
                        node.left,
                        node.right,
                        nodes[top].id,
                        nodes[top].left,
                        nodes[top].right
                    )));
                }
                None => None,
            };
            parents.push(parent);
            open.push(pos);
        }

        Ok(Self {
            taxonomy,
            nodes,
            index,
            parents,
        })
    }

    pub fn taxonomy(&self) -> Taxonomy {
        self.taxonomy
    }

    /// All nodes in pre-order
    pub fn nodes(&self) -> &[PolicyNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains_id(&self, id: NodeId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn get(&self, id: NodeId) -> Option<&PolicyNode> {
        self.index.get(&id).map(|&pos| &self.nodes[pos])
    }

    /// Like [`get`](Self::get) but reports a dangling id as an error
    pub fn node(&self, id: NodeId) -> Result<&PolicyNode> {
        self.get(id).ok_or(ComplianceError::UnknownPolicyNode {
            taxonomy: self.taxonomy,
            id,
        })
    }

    pub fn find_by_name(&self, name: &str) -> Option<&PolicyNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// True iff `candidate` is `target` or one of its ancestors
    pub fn is_ancestor_or_self(&self, candidate: NodeId, target: NodeId) -> Result<bool> {
        Ok(self.node(candidate)?.contains(self.node(target)?))
    }

    /// True iff `candidate` contains at least one of `targets`
    pub fn is_ancestor_or_self_of_any<'a, I>(&self, candidate: NodeId, targets: I) -> Result<bool>
    where
        I: IntoIterator<Item = &'a NodeId>,
    {
        let candidate = self.node(candidate)?;
        for target in targets {
            if candidate.contains(self.node(*target)?) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn parent(&self, id: NodeId) -> Result<Option<&PolicyNode>> {
        let pos = self.position(id)?;
        Ok(self.parents[pos].map(|p| &self.nodes[p]))
    }

    /// Ancestors from the immediate parent up to the root
    pub fn ancestors(&self, id: NodeId) -> Result<Vec<&PolicyNode>> {
        let mut current = self.parents[self.position(id)?];
        let mut out = Vec::new();
        while let Some(pos) = current {
            out.push(&self.nodes[pos]);
            current = self.parents[pos];
        }
        Ok(out)
    }

    /// Every node strictly below `id`, in pre-order
    pub fn descendants(&self, id: NodeId) -> Result<Vec<&PolicyNode>> {
        let pos = self.position(id)?;
        let right = self.nodes[pos].right;
        Ok(self.nodes[pos + 1..]
            .iter()
            .take_while(|n| n.left < right)
            .collect())
    }

    fn position(&self, id: NodeId) -> Result<usize> {
        self.index
            .get(&id)
            .copied()
            .ok_or(ComplianceError::UnknownPolicyNode {
                taxonomy: self.taxonomy,
                id,
            })
    }
}

fn number(node: &TaxonomyNode, counter: &mut u32, out: &mut Vec<PolicyNode>) {
    let slot = out.len();
    out.push(PolicyNode::new(node.id, node.name.clone(), *counter, 0));
    *counter += 1;
    for child in &node.children {
        number(child, counter, out);
    }
    out[slot].right = *counter;
    *counter += 1;
}
