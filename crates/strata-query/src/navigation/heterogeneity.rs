//! Store boundary detection.

use serde::{Deserialize, Serialize};
use strata_core::StoreSymbol;

use super::{AssociationPath, AssociationTree};

/// Decides when a navigation crosses a storage boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Heterogeneity {
    /// A node whose store differs from the root's is heterogeneous.
    #[default]
    ByStore,
    /// Everything is treated as one store.
    Never,
}

impl Heterogeneity {
    /// Returns true when moving from `from` to `to` leaves the store.
    #[must_use]
    pub fn crosses(self, from: &StoreSymbol, to: &StoreSymbol) -> bool {
        match self {
            Self::ByStore => from != to,
            Self::Never => false,
        }
    }

    /// Returns true when any step of `path` lives outside the root's store.
    #[must_use]
    pub fn is_heterogeneous(self, path: &AssociationPath) -> bool {
        path.steps().iter().any(|step| self.crosses(path.root_store(), &step.store))
    }

    /// Number of leading steps that stay in the root's store.
    #[must_use]
    pub fn homogeneous_prefix_len(self, path: &AssociationPath) -> usize {
        path.steps()
            .iter()
            .position(|step| self.crosses(path.root_store(), &step.store))
            .unwrap_or(path.len())
    }

    /// Returns true when any node of `tree` lives outside the root's store.
    #[must_use]
    pub fn is_heterogeneous_tree(self, tree: &AssociationTree) -> bool {
        let root = tree.root();
        root.descendants().iter().any(|node| self.crosses(root.store(), node.store()))
    }
}

#[cfg(test)]
mod tests {
    use strata_core::{Attribute, EntityType, HostType, ModelCatalog, Navigation};

    use super::*;

    fn model() -> ModelCatalog {
        ModelCatalog::new("main")
            .with_entity(
                EntityType::new("Order", "orders")
                    .with_attribute(Attribute::primitive("id", "id", HostType::Int))
                    .with_navigation(Navigation::reference("customer", "Customer", "customer_id", "id")),
            )
            .with_entity(
                EntityType::new("Customer", "customers")
                    .with_attribute(Attribute::primitive("id", "id", HostType::Int))
                    .with_navigation(
                        Navigation::reference("profile", "Profile", "id", "customer_id").with_store("crm"),
                    ),
            )
            .with_entity(
                EntityType::new("Profile", "profiles")
                    .with_attribute(Attribute::primitive("customer_id", "customer_id", HostType::Int)),
            )
    }

    #[test]
    fn store_mismatch_is_heterogeneous() {
        let model = model();
        let local = AssociationPath::resolve(&model, "Order", &["customer"]).expect("path");
        let remote = AssociationPath::resolve(&model, "Order", &["customer", "profile"]).expect("path");

        assert!(!Heterogeneity::ByStore.is_heterogeneous(&local));
        assert!(Heterogeneity::ByStore.is_heterogeneous(&remote));
        assert!(!Heterogeneity::Never.is_heterogeneous(&remote));
        assert_eq!(Heterogeneity::ByStore.homogeneous_prefix_len(&remote), 1);
        assert_eq!(Heterogeneity::Never.homogeneous_prefix_len(&remote), 2);
    }

    #[test]
    fn tree_check_inspects_every_descendant() {
        let model = model();
        let mut tree = AssociationTree::new(&model, "Order");
        tree.grow(&model, &["customer"]).expect("grow");
        assert!(!Heterogeneity::ByStore.is_heterogeneous_tree(&tree));
        tree.grow(&model, &["customer", "profile"]).expect("grow");
        assert!(Heterogeneity::ByStore.is_heterogeneous_tree(&tree));
    }
}
