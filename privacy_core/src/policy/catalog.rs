use super::tree::{NodeId, PolicyNode, PolicyTree, Taxonomy, TaxonomyNode};
use crate::error::{ComplianceError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// The two taxonomies a decision is evaluated against.
///
/// Built once at bootstrap and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct PolicyCatalog {
    attributes: PolicyTree,
    purposes: PolicyTree,
}

impl PolicyCatalog {
    pub fn new(attributes: PolicyTree, purposes: PolicyTree) -> Result<Self> {
        if attributes.taxonomy() != Taxonomy::Attribute || purposes.taxonomy() != Taxonomy::Purpose
        {
            return Err(ComplianceError::MalformedTaxonomy(
                "catalog trees were built for the wrong taxonomy".to_string(),
            ));
        }
        Ok(Self {
            attributes,
            purposes,
        })
    }

    pub fn attributes(&self) -> &PolicyTree {
        &self.attributes
    }

    pub fn purposes(&self) -> &PolicyTree {
        &self.purposes
    }

    pub fn tree(&self, taxonomy: Taxonomy) -> &PolicyTree {
        match taxonomy {
            Taxonomy::Attribute => &self.attributes,
            Taxonomy::Purpose => &self.purposes,
        }
    }

    /// Check that every id is present in the given taxonomy
    pub fn validate_ids<'a, I>(&self, taxonomy: Taxonomy, ids: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a NodeId>,
    {
        let tree = self.tree(taxonomy);
        for id in ids {
            tree.node(*id)?;
        }
        Ok(())
    }

    /// Load a taxonomy file; `.json` files are read as JSON, anything else as TOML
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading policy catalog from {:?}", path);
        let contents = fs::read_to_string(path)?;
        let file: TaxonomyFile = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&contents)?,
            _ => toml::from_str(&contents)?,
        };
        let catalog = file.into_catalog()?;
        info!(
            attributes = catalog.attributes.len(),
            purposes = catalog.purposes.len(),
            "Loaded policy catalog"
        );
        Ok(catalog)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str::<TaxonomyFile>(contents)?.into_catalog()
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        serde_json::from_str::<TaxonomyFile>(contents)?.into_catalog()
    }
}

/// On-disk form of a policy catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomyFile {
    pub attributes: TaxonomySection,
    pub purposes: TaxonomySection,
}

/// A taxonomy given either as a hierarchy to be numbered or as
/// pre-numbered intervals
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaxonomySection {
    Hierarchy { roots: Vec<TaxonomyNode> },
    Intervals { nodes: Vec<PolicyNode> },
}

impl TaxonomySection {
    fn into_tree(self, taxonomy: Taxonomy) -> Result<PolicyTree> {
        match self {
            TaxonomySection::Hierarchy { roots } => PolicyTree::build(taxonomy, &roots),
            TaxonomySection::Intervals { nodes } => PolicyTree::from_intervals(taxonomy, nodes),
        }
    }
}

impl TaxonomyFile {
    pub fn into_catalog(self) -> Result<PolicyCatalog> {
        PolicyCatalog::new(
            self.attributes.into_tree(Taxonomy::Attribute)?,
            self.purposes.into_tree(Taxonomy::Purpose)?,
        )
    }
}
