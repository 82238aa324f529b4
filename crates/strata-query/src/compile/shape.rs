//! Row shapes: how the columns of a compiled statement map back onto
//! values.

use serde::{Deserialize, Serialize};

use super::binding::Binding;
use crate::navigation::AssociationStep;
use crate::sql::SqlExpr;

/// The four ways a result element is materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultCategory {
    /// A single column per element.
    Primitive,
    /// An entity, possibly with included related entities.
    Object,
    /// A complex attribute decomposed into several columns.
    Complex,
    /// An anonymous record.
    View,
}

/// Column layout of one result element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RowShape {
    /// One column.
    Primitive {
        /// Output column name.
        column: String,
    },
    /// Every mapped column of an entity, named `prefix` + column.
    Object {
        /// Entity type name.
        entity: String,
        /// Output column prefix.
        prefix: String,
        /// Related entities joined into the same rows.
        includes: Vec<IncludeShape>,
    },
    /// Components of a complex attribute.
    Complex {
        /// Component name and layout.
        fields: Vec<(String, RowShape)>,
    },
    /// Fields of an anonymous record.
    View {
        /// Field name and layout.
        fields: Vec<(String, RowShape)>,
    },
}

/// An included navigation whose target columns ride along in the owner's
/// rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncludeShape {
    /// The navigation name; also the field the related value is stored in.
    pub navigation: String,
    /// True for collection navigations.
    pub many: bool,
    /// Target entity type name.
    pub entity: String,
    /// Output column prefix of the target's columns.
    pub prefix: String,
    /// Nested includes.
    pub includes: Vec<IncludeShape>,
}

/// An included navigation that leaves the store of the statement.
///
/// The related entities are loaded by a separate query against the bridge
/// target's store and attached to the owners by matching the bridge's
/// columns.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteInclude {
    /// Navigation names from the result element to the owners.
    pub owner_path: Vec<String>,
    /// The navigation crossing the store boundary.
    pub bridge: AssociationStep,
    /// Include paths below the bridge target, loaded with the remote query.
    pub nested: Vec<Vec<String>>,
}

impl RowShape {
    /// The materialization category.
    #[must_use]
    pub const fn category(&self) -> ResultCategory {
        match self {
            Self::Primitive { .. } => ResultCategory::Primitive,
            Self::Object { .. } => ResultCategory::Object,
            Self::Complex { .. } => ResultCategory::Complex,
            Self::View { .. } => ResultCategory::View,
        }
    }

    /// Binds the shape to the columns of a derived source.
    pub(crate) fn bind(&self, alias: &str) -> Binding {
        match self {
            Self::Primitive { column } => Binding::Scalar(SqlExpr::column(alias, column.clone())),
            Self::Object { entity, prefix, .. } => Binding::Entity {
                entity: entity.clone(),
                alias: alias.to_owned(),
                prefix: prefix.clone(),
            },
            Self::Complex { fields } => {
                Binding::Complex(fields.iter().map(|(n, s)| (n.clone(), s.bind(alias))).collect())
            }
            Self::View { fields } => {
                Binding::View(fields.iter().map(|(n, s)| (n.clone(), s.bind(alias))).collect())
            }
        }
    }

    /// Included navigations of an object shape.
    #[must_use]
    pub fn includes(&self) -> &[IncludeShape] {
        match self {
            Self::Object { includes, .. } => includes,
            _ => &[],
        }
    }

    /// Structural description used to check that two shapes line up
    /// column for column.
    pub(crate) fn signature(&self) -> String {
        match self {
            Self::Primitive { column } => column.clone(),
            Self::Object { entity, prefix, .. } => format!("{prefix}<{entity}>"),
            Self::Complex { fields } | Self::View { fields } => {
                let inner: Vec<String> =
                    fields.iter().map(|(n, s)| format!("{n}:{}", s.signature())).collect();
                format!("{{{}}}", inner.join(","))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_targets_the_derived_alias() {
        let shape = RowShape::View {
            fields: vec![
                ("name".into(), RowShape::Primitive { column: "name".into() }),
                (
                    "user".into(),
                    RowShape::Object { entity: "User".into(), prefix: "user__".into(), includes: vec![] },
                ),
            ],
        };
        assert_eq!(shape.category(), ResultCategory::View);
        let Binding::View(fields) = shape.bind("d1") else { panic!("expected a view binding") };
        assert_eq!(fields[0].1, Binding::Scalar(SqlExpr::column("d1", "name")));
        assert_eq!(
            fields[1].1,
            Binding::Entity { entity: "User".into(), alias: "d1".into(), prefix: "user__".into() }
        );
    }

    #[test]
    fn signatures_ignore_includes() {
        let plain = RowShape::Object { entity: "User".into(), prefix: String::new(), includes: vec![] };
        let with_include = RowShape::Object {
            entity: "User".into(),
            prefix: String::new(),
            includes: vec![IncludeShape {
                navigation: "team".into(),
                many: false,
                entity: "Team".into(),
                prefix: "team__".into(),
                includes: vec![],
            }],
        };
        assert_eq!(plain.signature(), with_include.signature());
        assert_ne!(plain.signature(), RowShape::Primitive { column: "value".into() }.signature());
    }
}
