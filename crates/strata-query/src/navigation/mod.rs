//! Domain navigation utilities.
//!
//! These structures answer "what is reachable from here" against the
//! domain model: association paths and trees over navigations, attribute
//! trees over complex attributes, the store-boundary predicate, projection
//! path decomposition and predicate flattening.

mod association;
mod atrophy;
mod attribute;
mod heterogeneity;
mod or_factor;

pub use association::{AssociationNode, AssociationPath, AssociationStep, AssociationTree};
pub use atrophy::{AtrophyPath, Bridge, Decomposition, DecompositionCache};
pub use attribute::{AttributeNode, AttributePath, AttributeTree};
pub use heterogeneity::Heterogeneity;
pub use or_factor::{FactorCache, FactorSplit, OrFactor};
