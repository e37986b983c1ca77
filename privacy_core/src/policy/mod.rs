//! Policy taxonomies.
//!
//! Attributes and purposes are each stored as a [`PolicyTree`] numbered with
//! the nested set model, so "allow Location" covers "GPS" through a single
//! interval comparison.

pub mod catalog;
pub mod tree;

pub use catalog::{PolicyCatalog, TaxonomyFile, TaxonomySection};
pub use tree::{NodeId, PolicyNode, PolicyTree, Taxonomy, TaxonomyNode};
