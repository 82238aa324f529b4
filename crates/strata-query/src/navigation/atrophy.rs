//! Projection paths and their split at storage boundaries.
//!
//! An [`AtrophyPath`] is a navigation path optionally ending in an attribute
//! path. When the navigation leaves the root's store, the path is split at
//! the last step that is still local: the *base* part can be joined
//! relationally, the *bridge* step crosses the boundary and the *attaching*
//! part is resolved against the other store.

use std::collections::HashMap;
use std::fmt;

use strata_core::DomainModel;

use super::{AssociationPath, AssociationStep, AttributePath, Heterogeneity};
use crate::error::{QueryError, QueryResult};

/// A navigation path, an optional trailing attribute path and the steps
/// that flatten a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AtrophyPath {
    association: AssociationPath,
    attribute: Option<AttributePath>,
    flattening_points: Vec<usize>,
}

impl AtrophyPath {
    /// Creates a path. Every flattening point must index a step of
    /// `association`.
    pub fn new(
        association: AssociationPath,
        attribute: Option<AttributePath>,
        mut flattening_points: Vec<usize>,
    ) -> QueryResult<Self> {
        if let Some(point) = flattening_points.iter().find(|&&p| p >= association.len()) {
            return Err(QueryError::illegal(
                &association,
                format!("flattening point {point} is not on the path"),
            ));
        }
        flattening_points.sort_unstable();
        flattening_points.dedup();
        Ok(Self { association, attribute, flattening_points })
    }

    /// Resolves a member chain: leading navigations, then at most one
    /// attribute path. Every collection step is a flattening point.
    pub fn resolve<S: AsRef<str>>(model: &dyn DomainModel, root: &str, members: &[S]) -> QueryResult<Self> {
        let association = AssociationPath::navigation_prefix(model, root, members);
        let rest = &members[association.len()..];
        let attribute = if rest.is_empty() {
            None
        } else {
            let entity = model.require(association.target())?;
            Some(AttributePath::resolve(entity, rest)?)
        };
        let flattening_points = association
            .steps()
            .iter()
            .enumerate()
            .filter(|(_, step)| step.multiplicity.is_many())
            .map(|(i, _)| i)
            .collect();
        Ok(Self { association, attribute, flattening_points })
    }

    pub const fn association(&self) -> &AssociationPath {
        &self.association
    }

    pub const fn attribute(&self) -> Option<&AttributePath> {
        self.attribute.as_ref()
    }

    pub fn flattening_points(&self) -> &[usize] {
        &self.flattening_points
    }

    /// Returns true when every step stays in the root's store.
    #[must_use]
    pub fn is_homogeneous(&self, heterogeneity: Heterogeneity) -> bool {
        !heterogeneity.is_heterogeneous(&self.association)
    }

    /// Splits the path at the first step that leaves the root's store.
    ///
    /// A homogeneous path decomposes to itself. Decomposing a base path
    /// again yields the same base path.
    #[must_use]
    pub fn decompose_extremely(&self, heterogeneity: Heterogeneity) -> Decomposition {
        let split = heterogeneity.homogeneous_prefix_len(&self.association);
        if split == self.association.len() {
            return Decomposition { base: self.clone(), bridge: None, attaching: None };
        }
        let base = Self {
            association: self.association.prefix(split),
            attribute: None,
            flattening_points: self.flattening_points.iter().copied().filter(|&p| p < split).collect(),
        };
        let bridge = Bridge {
            step: self.association.steps()[split].clone(),
            flattens: self.flattening_points.contains(&split),
        };
        let attaching = self.association.rest_after(split).map(|association| Self {
            association,
            attribute: self.attribute.clone(),
            flattening_points: self
                .flattening_points
                .iter()
                .filter(|&&p| p > split)
                .map(|&p| p - split - 1)
                .collect(),
        });
        Decomposition { base, bridge: Some(bridge), attaching }
    }
}

impl fmt::Display for AtrophyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.association)?;
        if let Some(attribute) = &self.attribute {
            write!(f, ".{attribute}")?;
        }
        Ok(())
    }
}

/// The navigation crossing a storage boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bridge {
    /// The crossing step.
    pub step: AssociationStep,
    /// Whether the crossing step is itself a flattening point.
    pub flattens: bool,
}

/// The result of [`AtrophyPath::decompose_extremely`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decomposition {
    /// The local prefix.
    pub base: AtrophyPath,
    /// The step leaving the store, if any.
    pub bridge: Option<Bridge>,
    /// The remainder, rooted at the bridge's target.
    pub attaching: Option<AtrophyPath>,
}

impl Decomposition {
    /// Returns true when the path did not need to be split.
    #[must_use]
    pub const fn is_trivial(&self) -> bool {
        self.bridge.is_none()
    }
}

/// Memoizes decompositions for one compilation.
#[derive(Debug, Clone, Default)]
pub struct DecompositionCache {
    entries: HashMap<(AtrophyPath, Heterogeneity), Decomposition>,
}

impl DecompositionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached decomposition, computing it on first use.
    pub fn decompose(&mut self, path: &AtrophyPath, heterogeneity: Heterogeneity) -> Decomposition {
        self.entries
            .entry((path.clone(), heterogeneity))
            .or_insert_with(|| path.decompose_extremely(heterogeneity))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use strata_core::{Attribute, EntityType, HostType, ModelCatalog, Navigation};

    use super::*;

    fn model() -> ModelCatalog {
        ModelCatalog::new("main")
            .with_entity(
                EntityType::new("Customer", "customers")
                    .with_key("id")
                    .with_attribute(Attribute::primitive("id", "id", HostType::Int))
                    .with_navigation(Navigation::collection("orders", "Order", "id", "customer_id")),
            )
            .with_entity(
                EntityType::new("Order", "orders")
                    .with_key("id")
                    .with_attribute(Attribute::primitive("id", "id", HostType::Int))
                    .with_attribute(Attribute::primitive("customer_id", "customer_id", HostType::Int))
                    .with_navigation(Navigation::reference("shipment", "Shipment", "id", "order_id")),
            )
            .with_entity(
                EntityType::new("Shipment", "shipments")
                    .with_store("logistics")
                    .with_key("id")
                    .with_attribute(Attribute::primitive("id", "id", HostType::Int))
                    .with_attribute(Attribute::primitive("order_id", "order_id", HostType::Int))
                    .with_navigation(Navigation::reference("carrier", "Carrier", "carrier_id", "id")),
            )
            .with_entity(
                EntityType::new("Carrier", "carriers")
                    .with_store("logistics")
                    .with_attribute(Attribute::primitive("id", "id", HostType::Int))
                    .with_attribute(Attribute::complex(
                        "contact",
                        vec![Attribute::primitive("phone", "contact_phone", HostType::String)],
                    )),
            )
    }

    #[test]
    fn resolve_splits_navigation_and_attribute() {
        let model = model();
        let path = AtrophyPath::resolve(&model, "Customer", &["orders", "shipment", "carrier", "contact", "phone"])
            .expect("path");
        assert_eq!(path.association().len(), 3);
        assert_eq!(path.attribute().map(ToString::to_string), Some("contact.phone".to_string()));
        assert_eq!(path.flattening_points(), &[0]);
        assert_eq!(path.to_string(), "Customer.orders.shipment.carrier.contact.phone");

        assert!(AtrophyPath::resolve(&model, "Customer", &["orders", "missing"]).is_err());
    }

    #[test]
    fn flattening_points_must_lie_on_the_path() {
        let model = model();
        let association = AssociationPath::resolve(&model, "Customer", &["orders"]).expect("path");
        assert!(AtrophyPath::new(association.clone(), None, vec![0]).is_ok());
        assert!(AtrophyPath::new(association, None, vec![1]).is_err());
    }

    #[test]
    fn heterogeneous_path_splits_at_the_boundary() {
        let model = model();
        let path = AtrophyPath::resolve(&model, "Customer", &["orders", "shipment", "carrier", "contact"])
            .expect("path");
        let split = path.decompose_extremely(Heterogeneity::ByStore);

        assert_eq!(split.base.to_string(), "Customer.orders");
        assert_eq!(split.base.flattening_points(), &[0]);
        let bridge = split.bridge.as_ref().expect("bridge");
        assert_eq!(bridge.step.navigation, "shipment");
        assert!(!bridge.flattens);
        let attaching = split.attaching.as_ref().expect("attaching");
        assert_eq!(attaching.to_string(), "Shipment.carrier.contact");
        assert!(attaching.is_homogeneous(Heterogeneity::ByStore));
    }

    #[test]
    fn homogeneous_and_repeated_decomposition_are_stable() {
        let model = model();
        let path = AtrophyPath::resolve(&model, "Customer", &["orders", "shipment"]).expect("path");
        let never = path.decompose_extremely(Heterogeneity::Never);
        assert!(never.is_trivial());
        assert_eq!(never.base, path);

        let split = path.decompose_extremely(Heterogeneity::ByStore);
        let again = split.base.decompose_extremely(Heterogeneity::ByStore);
        assert_eq!(again.base, split.base);
        assert!(again.is_trivial());
    }

    #[test]
    fn cache_is_keyed_by_predicate() {
        let model = model();
        let path = AtrophyPath::resolve(&model, "Customer", &["orders", "shipment"]).expect("path");
        let mut cache = DecompositionCache::new();
        let first = cache.decompose(&path, Heterogeneity::ByStore);
        let second = cache.decompose(&path, Heterogeneity::ByStore);
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
        cache.decompose(&path, Heterogeneity::Never);
        assert_eq!(cache.len(), 2);
    }
}
