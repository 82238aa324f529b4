//! Domain metadata contract.
//!
//! The query compiler never authors metadata; it consumes it through the
//! [`DomainModel`] trait. An entity type maps to a table, its attributes map
//! to columns (complex attributes decompose into several columns), and its
//! navigations describe how related entity types are reached.
//!
//! Every entity lives in a store identified by a [`StoreSymbol`]. A
//! navigation whose target lives in another store cannot be expressed as a
//! relational join, which is what makes a navigation path heterogeneous.

mod catalog;
mod entity;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::HostType;

pub use catalog::ModelCatalog;
pub use entity::{Attribute, EntityType, Member, Multiplicity, Navigation};

/// Identifies the physical store an entity type lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoreSymbol(String);

impl StoreSymbol {
    /// Creates a store symbol.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the symbol text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StoreSymbol {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Catalog interface for domain metadata lookups.
///
/// Only [`entity`](DomainModel::entity) and
/// [`default_store`](DomainModel::default_store) are required; the remaining
/// lookups are derived from them.
pub trait DomainModel: Send + Sync {
    /// Looks up an entity type by name.
    fn entity(&self, name: &str) -> Option<&EntityType>;

    /// The store used by entity types without a storage annotation.
    fn default_store(&self) -> &StoreSymbol;

    /// Resolves a host type to its modeled entity type, or `None` when the
    /// type is not modeled.
    fn resolve(&self, ty: &HostType) -> Option<&EntityType> {
        ty.entity_name().and_then(|name| self.entity(name))
    }

    /// Looks up an entity type, failing when it is not modeled.
    fn require(&self, name: &str) -> CoreResult<&EntityType> {
        self.entity(name).ok_or_else(|| CoreError::UnknownEntity(name.to_owned()))
    }

    /// Resolves a navigable member of an entity type.
    fn member(&self, entity: &str, member: &str) -> CoreResult<Member<'_>> {
        let ty = self.require(entity)?;
        ty.member(member).ok_or_else(|| CoreError::unknown_member(entity, member))
    }

    /// Resolves the store an entity type lives in.
    fn store_of(&self, entity: &str) -> StoreSymbol {
        self.entity(entity)
            .and_then(EntityType::store)
            .cloned()
            .unwrap_or_else(|| self.default_store().clone())
    }

    /// Resolves the store of the node reached through a navigation: the
    /// navigation's own annotation if present, else the target's store.
    fn navigation_store(&self, navigation: &Navigation) -> StoreSymbol {
        navigation.store().cloned().unwrap_or_else(|| self.store_of(navigation.target()))
    }

    /// Resolves the key attributes of an entity type.
    fn key_attributes(&self, entity: &str) -> CoreResult<Vec<&Attribute>> {
        let ty = self.require(entity)?;
        ty.keys()
            .iter()
            .map(|key| ty.attribute(key).ok_or_else(|| CoreError::unknown_member(entity, key)))
            .collect()
    }
}
