//! Result readers: rows back to values, one reader per result category.

use std::collections::BTreeMap;

use strata_core::{Attribute, DomainModel, EntityType, Value};

use super::source::{Row, RowSet};
use crate::compile::{IncludeShape, ResultCategory, RowShape};
use crate::error::QueryResult;

/// Turns the rows of a statement into result values.
pub trait ResultReader {
    /// Reads every element.
    fn read(&self, rows: &RowSet) -> QueryResult<Vec<Value>>;
}

/// Returns the reader for a row shape.
#[must_use]
pub fn reader<'a>(shape: &'a RowShape, model: &'a dyn DomainModel) -> Box<dyn ResultReader + 'a> {
    match shape.category() {
        ResultCategory::Primitive => Box::new(PrimitiveReader { shape }),
        ResultCategory::Object => Box::new(ObjectReader { shape, model }),
        ResultCategory::Complex | ResultCategory::View => Box::new(RecordReader { shape, model }),
    }
}

struct PrimitiveReader<'a> {
    shape: &'a RowShape,
}

impl ResultReader for PrimitiveReader<'_> {
    fn read(&self, rows: &RowSet) -> QueryResult<Vec<Value>> {
        let RowShape::Primitive { column } = self.shape else { return Ok(Vec::new()) };
        Ok(rows.iter().map(|row| row.get(column).cloned().unwrap_or(Value::Null)).collect())
    }
}

struct RecordReader<'a> {
    shape: &'a RowShape,
    model: &'a dyn DomainModel,
}

impl ResultReader for RecordReader<'_> {
    fn read(&self, rows: &RowSet) -> QueryResult<Vec<Value>> {
        rows.iter().map(|row| read_value(self.shape, row, self.model)).collect()
    }
}

/// Reads entities, merging the rows that a collection include multiplies
/// back into one entity per key.
struct ObjectReader<'a> {
    shape: &'a RowShape,
    model: &'a dyn DomainModel,
}

impl ResultReader for ObjectReader<'_> {
    fn read(&self, rows: &RowSet) -> QueryResult<Vec<Value>> {
        let RowShape::Object { entity, prefix, includes } = self.shape else { return Ok(Vec::new()) };
        let ty = self.model.require(entity)?;
        if includes.is_empty() {
            return rows.iter().map(|row| Ok(entity_value(ty, prefix, row))).collect();
        }

        let mut out: Vec<Value> = Vec::new();
        let mut seen: BTreeMap<String, usize> = BTreeMap::new();
        for row in rows.iter() {
            let Value::Object(fields) = entity_value(ty, prefix, row) else {
                out.push(Value::Null);
                continue;
            };
            let identity = format!("{:?}", key_of(ty, &fields));
            let index = match seen.get(&identity) {
                Some(index) => *index,
                None => {
                    out.push(Value::Object(fields));
                    seen.insert(identity, out.len() - 1);
                    out.len() - 1
                }
            };
            if let Some(Value::Object(owner)) = out.get_mut(index) {
                merge_includes(owner, includes, row, self.model)?;
            }
        }
        Ok(out)
    }
}

/// Reads one element of any shape from one row.
pub(crate) fn read_value(shape: &RowShape, row: &Row, model: &dyn DomainModel) -> QueryResult<Value> {
    match shape {
        RowShape::Primitive { column } => Ok(row.get(column).cloned().unwrap_or(Value::Null)),
        RowShape::Object { entity, prefix, includes } => {
            let ty = model.require(entity)?;
            let mut value = entity_value(ty, prefix, row);
            if let Value::Object(fields) = &mut value {
                merge_includes(fields, includes, row, model)?;
            }
            Ok(value)
        }
        RowShape::Complex { fields } | RowShape::View { fields } => {
            let mut out = BTreeMap::new();
            for (name, shape) in fields {
                out.insert(name.clone(), read_value(shape, row, model)?);
            }
            Ok(Value::Object(out))
        }
    }
}

fn attribute_value(attribute: &Attribute, prefix: &str, row: &Row) -> Value {
    if attribute.is_complex() {
        Value::Object(
            attribute
                .components()
                .iter()
                .map(|c| (c.name().to_owned(), attribute_value(c, prefix, row)))
                .collect(),
        )
    } else {
        row.get(&format!("{prefix}{}", attribute.column())).cloned().unwrap_or(Value::Null)
    }
}

/// Reads an entity whose columns are named `prefix` + column.
///
/// Navigation columns with no attribute are kept under their column name.
/// An entity whose key columns are all null (an unmatched outer join) reads
/// as null.
pub(crate) fn entity_value(ty: &EntityType, prefix: &str, row: &Row) -> Value {
    let mut fields = BTreeMap::new();
    for attribute in ty.attributes() {
        fields.insert(attribute.name().to_owned(), attribute_value(attribute, prefix, row));
    }
    for navigation in ty.navigations() {
        for column in navigation.source_columns() {
            if ty.attribute_for_column(column).is_none() && !fields.contains_key(column) {
                fields.insert(column.clone(), row.get(&format!("{prefix}{column}")).cloned().unwrap_or(Value::Null));
            }
        }
    }
    let keys = key_of(ty, &fields);
    if !keys.is_empty() && keys.iter().all(Value::is_null) {
        return Value::Null;
    }
    Value::Object(fields)
}

/// The key values of a read entity, in key order.
pub(crate) fn key_of(ty: &EntityType, fields: &BTreeMap<String, Value>) -> Vec<Value> {
    let mut out = Vec::new();
    for key in ty.keys() {
        match fields.get(key) {
            Some(Value::Object(components)) => out.extend(components.values().cloned()),
            Some(value) => out.push(value.clone()),
            None => out.push(Value::Null),
        }
    }
    out
}

fn same_key(ty: &EntityType, value: &Value, key: &[Value]) -> bool {
    match value {
        Value::Object(fields) => {
            let other = key_of(ty, fields);
            other.len() == key.len() && other.iter().zip(key).all(|(a, b)| a.key_eq(b))
        }
        _ => false,
    }
}

/// Attaches the included entities carried by `row` to `owner`.
fn merge_includes(
    owner: &mut BTreeMap<String, Value>,
    includes: &[IncludeShape],
    row: &Row,
    model: &dyn DomainModel,
) -> QueryResult<()> {
    for include in includes {
        let ty = model.require(&include.entity)?;
        let child = entity_value(ty, &include.prefix, row);
        if include.many {
            let slot = owner.entry(include.navigation.clone()).or_insert_with(|| Value::Array(Vec::new()));
            let Value::Object(child_fields) = child else { continue };
            let Value::Array(items) = slot else { continue };
            let key = key_of(ty, &child_fields);
            let position = match items.iter().position(|item| same_key(ty, item, &key)) {
                Some(position) => position,
                None => {
                    items.push(Value::Object(child_fields));
                    items.len() - 1
                }
            };
            if let Some(Value::Object(existing)) = items.get_mut(position) {
                merge_includes(existing, &include.includes, row, model)?;
            }
        } else {
            let Value::Object(child_fields) = child else {
                owner.entry(include.navigation.clone()).or_insert(Value::Null);
                continue;
            };
            let key = key_of(ty, &child_fields);
            let slot = owner.entry(include.navigation.clone()).or_insert(Value::Null);
            if !same_key(ty, slot, &key) {
                *slot = Value::Object(child_fields);
            }
            if let Value::Object(existing) = slot {
                merge_includes(existing, &include.includes, row, model)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use strata_core::{HostType, ModelCatalog, Navigation};

    use super::*;
    use crate::exec::row;

    fn model() -> ModelCatalog {
        ModelCatalog::new("main")
            .with_entity(
                EntityType::new("User", "users")
                    .with_key("id")
                    .with_attribute(Attribute::primitive("id", "id", HostType::Int))
                    .with_navigation(Navigation::collection("orders", "Order", "id", "user_id"))
                    .with_navigation(Navigation::reference("team", "Team", "team_id", "id").optional()),
            )
            .with_entity(
                EntityType::new("Order", "orders")
                    .with_key("id")
                    .with_attribute(Attribute::primitive("id", "id", HostType::Int))
                    .with_attribute(Attribute::primitive("user_id", "user_id", HostType::Int)),
            )
            .with_entity(
                EntityType::new("Team", "teams")
                    .with_key("id")
                    .with_attribute(Attribute::primitive("id", "id", HostType::Int)),
            )
    }

    fn include(navigation: &str, entity: &str, many: bool) -> IncludeShape {
        IncludeShape {
            navigation: navigation.into(),
            many,
            entity: entity.into(),
            prefix: format!("{navigation}__"),
            includes: Vec::new(),
        }
    }

    #[test]
    fn collection_include_rows_merge_by_owner_key() {
        let model = model();
        let shape = RowShape::Object {
            entity: "User".into(),
            prefix: String::new(),
            includes: vec![include("orders", "Order", true), include("team", "Team", false)],
        };
        let user_row = |id: i64, order: Value| {
            row([
                ("id", Value::Int(id)),
                ("team_id", Value::Null),
                ("orders__id", order.clone()),
                ("orders__user_id", if order.is_null() { Value::Null } else { Value::Int(id) }),
                ("team__id", Value::Null),
            ])
        };
        let rows = RowSet {
            columns: Vec::new(),
            rows: vec![user_row(1, Value::Int(10)), user_row(1, Value::Int(11)), user_row(2, Value::Null)],
        };
        let users = reader(&shape, &model).read(&rows).expect("read");
        assert_eq!(users.len(), 2);
        let orders = users[0].get("orders").and_then(Value::as_array).expect("orders");
        assert_eq!(orders.len(), 2);
        assert_eq!(users[0].get("team"), Some(&Value::Null));
        assert_eq!(users[1].get("orders").and_then(Value::as_array).map(<[Value]>::len), Some(0));
        assert_eq!(users[1].get("team_id"), Some(&Value::Null));
    }

    #[test]
    fn views_read_field_by_field() {
        let model = model();
        let shape = RowShape::View {
            fields: vec![
                ("n".into(), RowShape::Primitive { column: "n".into() }),
                ("team".into(), RowShape::Object { entity: "Team".into(), prefix: "team__".into(), includes: vec![] }),
            ],
        };
        let rows = RowSet { columns: Vec::new(), rows: vec![row([("n", Value::Int(3)), ("team__id", Value::Null)])] };
        let values = reader(&shape, &model).read(&rows).expect("read");
        assert_eq!(values, vec![Value::object([("n", Value::Int(3)), ("team", Value::Null)])]);
    }
}
