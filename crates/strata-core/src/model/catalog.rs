//! In-memory domain model catalog.

use std::collections::HashMap;

use super::{DomainModel, EntityType, StoreSymbol};
use crate::error::{CoreError, CoreResult};

/// A [`DomainModel`] backed by a map of entity types.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    entities: HashMap<String, EntityType>,
    default_store: StoreSymbol,
}

impl ModelCatalog {
    /// Creates an empty catalog whose unannotated entities live in
    /// `default_store`.
    #[must_use]
    pub fn new(default_store: impl Into<StoreSymbol>) -> Self {
        Self { entities: HashMap::new(), default_store: default_store.into() }
    }

    /// Adds an entity type, replacing any previous one with the same name.
    #[must_use]
    pub fn with_entity(mut self, entity: EntityType) -> Self {
        self.add_entity(entity);
        self
    }

    /// Adds an entity type in place.
    pub fn add_entity(&mut self, entity: EntityType) {
        self.entities.insert(entity.name().to_owned(), entity);
    }

    /// Iterates over the entity types.
    pub fn entities(&self) -> impl Iterator<Item = &EntityType> {
        self.entities.values()
    }

    /// Checks that keys name attributes, navigation targets exist, and
    /// navigation column lists pair up.
    pub fn validate(&self) -> CoreResult<()> {
        for entity in self.entities.values() {
            for key in entity.keys() {
                if entity.attribute(key).is_none() {
                    return Err(CoreError::InvalidModel(format!(
                        "key '{key}' of '{}' is not an attribute",
                        entity.name()
                    )));
                }
            }
            for navigation in entity.navigations() {
                let Some(target) = self.entities.get(navigation.target()) else {
                    return Err(CoreError::InvalidModel(format!(
                        "navigation '{}.{}' targets unknown entity '{}'",
                        entity.name(),
                        navigation.name(),
                        navigation.target()
                    )));
                };
                if navigation.source_columns().len() != navigation.target_columns().len()
                    || navigation.source_columns().is_empty()
                {
                    return Err(CoreError::InvalidModel(format!(
                        "navigation '{}.{}' has mismatched join columns",
                        entity.name(),
                        navigation.name()
                    )));
                }
                let target_columns = target.columns();
                if let Some(missing) =
                    navigation.target_columns().iter().find(|c| !target_columns.contains(&c.as_str()))
                {
                    return Err(CoreError::InvalidModel(format!(
                        "navigation '{}.{}' joins on unknown column '{missing}'",
                        entity.name(),
                        navigation.name()
                    )));
                }
            }
        }
        Ok(())
    }
}

impl DomainModel for ModelCatalog {
    fn entity(&self, name: &str) -> Option<&EntityType> {
        self.entities.get(name)
    }

    fn default_store(&self) -> &StoreSymbol {
        &self.default_store
    }
}
