//! What a lambda parameter stands for in the statement being built.

use std::collections::BTreeSet;

use strata_core::{Attribute, DomainModel, EntityType};

use super::shape::RowShape;
use crate::error::{QueryError, QueryResult};
use crate::sql::{SelectItem, SqlExpr};

/// The relational form of a value in scope.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Binding {
    /// A single column or computed expression.
    Scalar(SqlExpr),
    /// An entity whose columns are `alias.prefix + column`.
    Entity { entity: String, alias: String, prefix: String },
    /// A complex attribute.
    Complex(Vec<(String, Binding)>),
    /// An anonymous record.
    View(Vec<(String, Binding)>),
    /// A group produced by GROUP BY; only valid inside aggregations.
    Grouping { key: Box<Binding>, element: Box<Binding> },
}

/// Binds an attribute of the entity at `alias`.
pub(crate) fn attribute_binding(attribute: &Attribute, alias: &str, prefix: &str) -> Binding {
    if attribute.is_complex() {
        Binding::Complex(
            attribute
                .components()
                .iter()
                .map(|c| (c.name().to_owned(), attribute_binding(c, alias, prefix)))
                .collect(),
        )
    } else {
        Binding::Scalar(SqlExpr::column(alias, format!("{prefix}{}", attribute.column())))
    }
}

/// Mapped columns followed by navigation columns that no attribute maps.
///
/// Navigation columns travel with the entity so the navigation can still be
/// joined after the entity has been folded into a derived source.
pub(crate) fn physical_columns(entity: &EntityType) -> Vec<&str> {
    let mut columns = entity.columns();
    for navigation in entity.navigations() {
        for column in navigation.source_columns() {
            if !columns.contains(&column.as_str()) {
                columns.push(column);
            }
        }
    }
    columns
}

fn join_name(name: Option<&str>, field: &str) -> String {
    match name {
        Some(name) => format!("{name}__{field}"),
        None => field.to_owned(),
    }
}

impl Binding {
    /// The scalars identifying the bound value, used for equality and
    /// grouping. An entity is identified by its key columns.
    pub(crate) fn scalars(&self, model: &dyn DomainModel) -> QueryResult<Vec<SqlExpr>> {
        match self {
            Self::Scalar(expr) => Ok(vec![expr.clone()]),
            Self::Entity { entity, alias, prefix } => {
                let keys = model.key_attributes(entity)?;
                if keys.is_empty() {
                    return Err(QueryError::Translation(format!("entity {entity} has no key")));
                }
                Ok(keys
                    .iter()
                    .flat_map(|key| key.leaves())
                    .map(|leaf| SqlExpr::column(alias.as_str(), format!("{prefix}{}", leaf.column())))
                    .collect())
            }
            Self::Complex(fields) | Self::View(fields) => {
                let mut out = Vec::new();
                for (_, field) in fields {
                    out.extend(field.scalars(model)?);
                }
                Ok(out)
            }
            Self::Grouping { .. } => {
                Err(QueryError::Translation("a group has no scalar relational form".into()))
            }
        }
    }

    /// Source aliases the bound value reads from.
    pub(crate) fn aliases(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_aliases(&mut out);
        out
    }

    fn collect_aliases<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Self::Scalar(expr) => out.extend(expr.qualifiers()),
            Self::Entity { alias, .. } => {
                out.insert(alias.as_str());
            }
            Self::Complex(fields) | Self::View(fields) => {
                for (_, field) in fields {
                    field.collect_aliases(out);
                }
            }
            Self::Grouping { key, element } => {
                key.collect_aliases(out);
                element.collect_aliases(out);
            }
        }
    }

    /// Emits select items for the bound value and describes how to read
    /// them back.
    ///
    /// `name` prefixes every generated column; the outermost value passes
    /// `None`.
    pub(crate) fn project(
        &self,
        model: &dyn DomainModel,
        name: Option<&str>,
        items: &mut Vec<SelectItem>,
    ) -> QueryResult<RowShape> {
        match self {
            Self::Scalar(expr) => {
                let column = name.unwrap_or("value").to_owned();
                items.push(SelectItem::new(expr.clone(), column.clone()));
                Ok(RowShape::Primitive { column })
            }
            Self::Entity { entity, alias, prefix } => {
                let ty = model.require(entity)?;
                let out_prefix = name.map(|n| format!("{n}__")).unwrap_or_default();
                for column in physical_columns(ty) {
                    items.push(SelectItem::new(
                        SqlExpr::column(alias.as_str(), format!("{prefix}{column}")),
                        format!("{out_prefix}{column}"),
                    ));
                }
                Ok(RowShape::Object { entity: entity.clone(), prefix: out_prefix, includes: Vec::new() })
            }
            Self::Complex(fields) => {
                Ok(RowShape::Complex { fields: Self::project_fields(fields, model, name, items)? })
            }
            Self::View(fields) => {
                Ok(RowShape::View { fields: Self::project_fields(fields, model, name, items)? })
            }
            Self::Grouping { .. } => {
                Err(QueryError::Translation("a group cannot be projected relationally".into()))
            }
        }
    }

    fn project_fields(
        fields: &[(String, Binding)],
        model: &dyn DomainModel,
        name: Option<&str>,
        items: &mut Vec<SelectItem>,
    ) -> QueryResult<Vec<(String, RowShape)>> {
        fields
            .iter()
            .map(|(field, binding)| {
                let column = join_name(name, field);
                Ok((field.clone(), binding.project(model, Some(&column), items)?))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use strata_core::{HostType, ModelCatalog};

    use super::*;

    fn model() -> ModelCatalog {
        ModelCatalog::new("main").with_entity(
            EntityType::new("User", "users")
                .with_key("id")
                .with_attribute(Attribute::primitive("id", "id", HostType::Int))
                .with_attribute(Attribute::complex(
                    "address",
                    vec![
                        Attribute::primitive("city", "address_city", HostType::String),
                        Attribute::primitive("zip", "address_zip", HostType::String),
                    ],
                )),
        )
    }

    #[test]
    fn entity_projection_uses_every_leaf_column() {
        let model = model();
        let binding = Binding::Entity { entity: "User".into(), alias: "t0".into(), prefix: String::new() };
        let mut items = Vec::new();
        let shape = binding.project(&model, None, &mut items).expect("project");
        let names: Vec<&str> = items.iter().map(|i| i.alias.as_str()).collect();
        assert_eq!(names, vec!["id", "address_city", "address_zip"]);
        assert!(matches!(shape, RowShape::Object { ref prefix, .. } if prefix.is_empty()));
        assert_eq!(binding.scalars(&model).expect("scalars"), vec![SqlExpr::column("t0", "id")]);
    }

    #[test]
    fn view_fields_are_prefixed() {
        let model = model();
        let entity = model.entity("User").expect("entity");
        let address = attribute_binding(entity.attribute("address").expect("address"), "t0", "");
        let view = Binding::View(vec![
            ("home".into(), address),
            ("n".into(), Binding::Scalar(SqlExpr::literal(1))),
        ]);
        let mut items = Vec::new();
        view.project(&model, None, &mut items).expect("project");
        let names: Vec<&str> = items.iter().map(|i| i.alias.as_str()).collect();
        assert_eq!(names, vec!["home__city", "home__zip", "n"]);
    }

    #[test]
    fn groups_have_no_relational_projection() {
        let model = model();
        let group = Binding::Grouping {
            key: Box::new(Binding::Scalar(SqlExpr::bare("k"))),
            element: Box::new(Binding::Scalar(SqlExpr::bare("e"))),
        };
        let err = group.project(&model, None, &mut Vec::new()).expect_err("group");
        assert!(err.is_degradable());
    }
}
