//! Entity, attribute and navigation definitions.

use serde::{Deserialize, Serialize};

use super::StoreSymbol;
use crate::types::HostType;

/// How many targets a navigation reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Multiplicity {
    /// Exactly one target.
    One,
    /// At most one target.
    ZeroOrOne,
    /// Any number of targets.
    Many,
}

impl Multiplicity {
    /// Returns true for collection navigations.
    #[must_use]
    pub const fn is_many(self) -> bool {
        matches!(self, Self::Many)
    }
}

/// A mapped attribute of an entity type.
///
/// Primitive attributes map to exactly one column. Complex attributes have
/// no column of their own and decompose into component attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    name: String,
    column: String,
    ty: HostType,
    components: Vec<Attribute>,
}

impl Attribute {
    /// Creates a primitive attribute stored in a single column.
    #[must_use]
    pub fn primitive(name: impl Into<String>, column: impl Into<String>, ty: HostType) -> Self {
        Self { name: name.into(), column: column.into(), ty, components: Vec::new() }
    }

    /// Creates a complex attribute made of component attributes.
    #[must_use]
    pub fn complex(name: impl Into<String>, components: Vec<Attribute>) -> Self {
        let ty = HostType::Record(
            components.iter().map(|c| (c.name.clone(), c.ty.clone())).collect(),
        );
        Self { name: name.into(), column: String::new(), ty, components }
    }

    /// The attribute name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The mapped column. Empty for complex attributes.
    #[must_use]
    pub fn column(&self) -> &str {
        &self.column
    }

    /// The attribute's host type.
    #[must_use]
    pub const fn ty(&self) -> &HostType {
        &self.ty
    }

    /// Component attributes of a complex attribute.
    #[must_use]
    pub fn components(&self) -> &[Attribute] {
        &self.components
    }

    /// Returns true when the attribute decomposes into components.
    #[must_use]
    pub fn is_complex(&self) -> bool {
        !self.components.is_empty()
    }

    /// Looks up a component by name.
    #[must_use]
    pub fn component(&self, name: &str) -> Option<&Attribute> {
        self.components.iter().find(|c| c.name == name)
    }

    /// All primitive leaves of this attribute, in declaration order.
    #[must_use]
    pub fn leaves(&self) -> Vec<&Attribute> {
        if self.is_complex() {
            self.components.iter().flat_map(Attribute::leaves).collect()
        } else {
            vec![self]
        }
    }
}

/// A navigable relationship from one entity type to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Navigation {
    name: String,
    target: String,
    multiplicity: Multiplicity,
    source_columns: Vec<String>,
    target_columns: Vec<String>,
    store: Option<StoreSymbol>,
}

impl Navigation {
    /// A required single-valued navigation following a foreign key on the
    /// source table to a key on the target table.
    #[must_use]
    pub fn reference(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
        target_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            multiplicity: Multiplicity::One,
            source_columns: vec![foreign_key.into()],
            target_columns: vec![target_key.into()],
            store: None,
        }
    }

    /// A collection navigation following a key on the source table to a
    /// foreign key on the target table.
    #[must_use]
    pub fn collection(
        name: impl Into<String>,
        target: impl Into<String>,
        source_key: impl Into<String>,
        target_foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            multiplicity: Multiplicity::Many,
            source_columns: vec![source_key.into()],
            target_columns: vec![target_foreign_key.into()],
            store: None,
        }
    }

    /// Creates a navigation over composite column pairs.
    #[must_use]
    pub fn composite(
        name: impl Into<String>,
        target: impl Into<String>,
        multiplicity: Multiplicity,
        source_columns: Vec<String>,
        target_columns: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            multiplicity,
            source_columns,
            target_columns,
            store: None,
        }
    }

    /// Marks a single-valued navigation as optional.
    #[must_use]
    pub fn optional(mut self) -> Self {
        if self.multiplicity == Multiplicity::One {
            self.multiplicity = Multiplicity::ZeroOrOne;
        }
        self
    }

    /// Annotates the navigation with the store its target lives in.
    #[must_use]
    pub fn with_store(mut self, store: impl Into<StoreSymbol>) -> Self {
        self.store = Some(store.into());
        self
    }

    /// The navigation name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The target entity type name.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The navigation multiplicity.
    #[must_use]
    pub const fn multiplicity(&self) -> Multiplicity {
        self.multiplicity
    }

    /// Columns on the source table.
    #[must_use]
    pub fn source_columns(&self) -> &[String] {
        &self.source_columns
    }

    /// Columns on the target table, paired with `source_columns`.
    #[must_use]
    pub fn target_columns(&self) -> &[String] {
        &self.target_columns
    }

    /// The store annotation, if any.
    #[must_use]
    pub const fn store(&self) -> Option<&StoreSymbol> {
        self.store.as_ref()
    }

    /// The host type reached through this navigation.
    #[must_use]
    pub fn target_type(&self) -> HostType {
        let target = HostType::entity(self.target.clone());
        match self.multiplicity {
            Multiplicity::Many => HostType::sequence(target),
            Multiplicity::ZeroOrOne => HostType::Optional(Box::new(target)),
            Multiplicity::One => target,
        }
    }
}

/// A resolved member of an entity type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Member<'a> {
    /// A mapped attribute.
    Attribute(&'a Attribute),
    /// A navigation to another entity type.
    Navigation(&'a Navigation),
}

/// A mapped entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityType {
    name: String,
    table: String,
    keys: Vec<String>,
    attributes: Vec<Attribute>,
    navigations: Vec<Navigation>,
    store: Option<StoreSymbol>,
}

impl EntityType {
    /// Creates an entity type mapped to a table.
    #[must_use]
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            keys: Vec::new(),
            attributes: Vec::new(),
            navigations: Vec::new(),
            store: None,
        }
    }

    /// Adds a key attribute name.
    #[must_use]
    pub fn with_key(mut self, attribute: impl Into<String>) -> Self {
        self.keys.push(attribute.into());
        self
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Adds a navigation.
    #[must_use]
    pub fn with_navigation(mut self, navigation: Navigation) -> Self {
        self.navigations.push(navigation);
        self
    }

    /// Places the entity type in a specific store.
    #[must_use]
    pub fn with_store(mut self, store: impl Into<StoreSymbol>) -> Self {
        self.store = Some(store.into());
        self
    }

    /// The entity type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The mapped table.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Names of the key attributes.
    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// All attributes.
    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// All navigations.
    #[must_use]
    pub fn navigations(&self) -> &[Navigation] {
        &self.navigations
    }

    /// The store annotation, if any.
    #[must_use]
    pub const fn store(&self) -> Option<&StoreSymbol> {
        self.store.as_ref()
    }

    /// Looks up an attribute by name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name() == name)
    }

    /// Looks up a navigation by name.
    #[must_use]
    pub fn navigation(&self, name: &str) -> Option<&Navigation> {
        self.navigations.iter().find(|n| n.name() == name)
    }

    /// Looks up a member by name, attributes first.
    #[must_use]
    pub fn member(&self, name: &str) -> Option<Member<'_>> {
        self.attribute(name)
            .map(Member::Attribute)
            .or_else(|| self.navigation(name).map(Member::Navigation))
    }

    /// Finds the primitive attribute (possibly nested in a complex
    /// attribute) mapped to a column.
    #[must_use]
    pub fn attribute_for_column(&self, column: &str) -> Option<&Attribute> {
        self.attributes.iter().flat_map(Attribute::leaves).find(|a| a.column() == column)
    }

    /// All mapped columns in declaration order.
    #[must_use]
    pub fn columns(&self) -> Vec<&str> {
        self.attributes.iter().flat_map(Attribute::leaves).map(Attribute::column).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> Attribute {
        Attribute::complex(
            "address",
            vec![
                Attribute::primitive("city", "addr_city", HostType::String),
                Attribute::primitive("zip", "addr_zip", HostType::String),
            ],
        )
    }

    #[test]
    fn complex_attribute_leaves() {
        let attr = address();
        assert!(attr.is_complex());
        let columns: Vec<_> = attr.leaves().into_iter().map(Attribute::column).collect();
        assert_eq!(columns, vec!["addr_city", "addr_zip"]);
        assert_eq!(attr.ty().field("zip"), Some(&HostType::String));
    }

    #[test]
    fn entity_member_lookup() {
        let user = EntityType::new("User", "users")
            .with_key("id")
            .with_attribute(Attribute::primitive("id", "id", HostType::Int))
            .with_attribute(address())
            .with_navigation(Navigation::collection("orders", "Order", "id", "user_id"));

        assert!(matches!(user.member("id"), Some(Member::Attribute(_))));
        assert!(matches!(user.member("orders"), Some(Member::Navigation(_))));
        assert!(user.member("nope").is_none());
        assert_eq!(user.columns(), vec!["id", "addr_city", "addr_zip"]);
        assert_eq!(user.attribute_for_column("addr_zip").map(Attribute::name), Some("zip"));
    }

    #[test]
    fn navigation_target_types() {
        let many = Navigation::collection("orders", "Order", "id", "user_id");
        assert_eq!(many.target_type(), HostType::sequence(HostType::entity("Order")));

        let optional = Navigation::reference("manager", "User", "manager_id", "id").optional();
        assert_eq!(optional.multiplicity(), Multiplicity::ZeroOrOne);
        assert_eq!(optional.target_type().entity_name(), Some("User"));
    }
}
