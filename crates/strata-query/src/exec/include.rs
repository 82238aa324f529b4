//! Includes that cross into another store.
//!
//! The owners are read first; their bridge column values then drive one
//! query against the target store, and the loaded entities are attached to
//! the owners that match them.

use std::collections::BTreeMap;

use strata_core::{DomainModel, EntityType, HostType, Multiplicity, Value};
use tracing::debug;

use crate::chain::{Query, QueryOperation};
use crate::compile::RemoteInclude;
use crate::complement::SubqueryRunner;
use crate::error::{QueryError, QueryResult};
use crate::expr::{Expr, Lambda};

type Fields = BTreeMap<String, Value>;

/// Loads and attaches `include` to every owner reachable from `values`.
pub(crate) fn attach(
    values: &mut [Value],
    include: &RemoteInclude,
    model: &dyn DomainModel,
    runner: &dyn SubqueryRunner,
) -> QueryResult<()> {
    let bridge = &include.bridge;
    let source = model.require(&bridge.source)?;
    let target = model.require(&bridge.target)?;
    let many = bridge.multiplicity == Multiplicity::Many;

    let mut owners = Vec::new();
    for value in values.iter_mut() {
        collect_owners(value, &include.owner_path, &mut owners);
    }
    let owner_fields: Vec<String> = bridge.source_columns.iter().map(|c| field_of(source, c)).collect();
    let target_fields = bridge
        .target_columns
        .iter()
        .map(|c| {
            target.attribute_for_column(c).map(|a| a.name().to_owned()).ok_or_else(|| {
                QueryError::Unsupported(format!("column '{c}' of {} is not mapped to an attribute", target.name()))
            })
        })
        .collect::<QueryResult<Vec<_>>>()?;

    let mut keys: Vec<Vec<Value>> = Vec::new();
    for owner in &owners {
        if let Some(key) = key_values(owner, &owner_fields) {
            if !keys.iter().any(|k| same(k, &key)) {
                keys.push(key);
            }
        }
    }

    let loaded = if keys.is_empty() {
        Vec::new()
    } else {
        let query = remote_query(target, include, &target_fields, &keys)?;
        runner.run(&query)?
    };
    debug!(
        navigation = %bridge.navigation,
        store = %bridge.store,
        owners = owners.len(),
        loaded = loaded.len(),
        "attached remote include"
    );

    for owner in owners {
        let matches: Vec<&Value> = match key_values(owner, &owner_fields) {
            Some(key) => loaded
                .iter()
                .filter(|v| v.as_object().and_then(|f| key_values(f, &target_fields)).is_some_and(|k| same(&k, &key)))
                .collect(),
            None => Vec::new(),
        };
        let related = if many {
            Value::Array(matches.into_iter().cloned().collect())
        } else {
            matches.first().map_or(Value::Null, |v| (*v).clone())
        };
        owner.insert(bridge.navigation.clone(), related);
    }
    Ok(())
}

fn collect_owners<'v>(value: &'v mut Value, path: &[String], out: &mut Vec<&'v mut Fields>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_owners(item, path, out);
            }
        }
        Value::Object(fields) => match path.split_first() {
            None => out.push(fields),
            Some((head, rest)) => {
                if let Some(next) = fields.get_mut(head) {
                    collect_owners(next, rest, out);
                }
            }
        },
        _ => {}
    }
}

/// The field a read entity carries the value of `column` in.
fn field_of(ty: &EntityType, column: &str) -> String {
    ty.attribute_for_column(column).map_or_else(|| column.to_owned(), |a| a.name().to_owned())
}

fn key_values(fields: &Fields, names: &[String]) -> Option<Vec<Value>> {
    let key: Vec<Value> = names.iter().map(|n| fields.get(n).cloned().unwrap_or(Value::Null)).collect();
    if key.iter().any(Value::is_null) {
        None
    } else {
        Some(key)
    }
}

fn same(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.key_eq(y))
}

/// `target.Where(r => r.k in (...)).Include(nested...)` against the
/// bridge's store.
fn remote_query(
    target: &EntityType,
    include: &RemoteInclude,
    fields: &[String],
    keys: &[Vec<Value>],
) -> QueryResult<Query> {
    let member = |name: &str| Expr::path("r", &[name]);
    let body = if let [field] = fields {
        member(field.as_str()).in_list(keys.iter().map(|k| Expr::constant(k[0].clone())).collect(), false)
    } else {
        let disjuncts = keys.iter().filter_map(|key| {
            Expr::conjunction(fields.iter().zip(key).map(|(f, v)| member(f.as_str()).eq(Expr::constant(v.clone()))))
        });
        Expr::disjunction(disjuncts).unwrap_or_else(|| Expr::boolean(false))
    };
    let predicate = Lambda::unary("r", HostType::entity(target.name()), body, HostType::Bool);

    let mut query = Query::new(target.name()).with_store(include.bridge.store.clone());
    query = query.push(QueryOperation::Where { predicate })?;
    for path in &include.nested {
        query = query.push(QueryOperation::Include { path: path.clone() })?;
    }
    Ok(query)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use strata_core::{Attribute, ModelCatalog, StoreSymbol};

    use super::*;
    use crate::navigation::AssociationStep;

    fn model() -> ModelCatalog {
        ModelCatalog::new("main")
            .with_entity(
                EntityType::new("User", "users")
                    .with_key("id")
                    .with_attribute(Attribute::primitive("id", "id", HostType::Int)),
            )
            .with_entity(
                EntityType::new("Audit", "audits")
                    .with_key("id")
                    .with_store("archive")
                    .with_attribute(Attribute::primitive("id", "id", HostType::Int))
                    .with_attribute(Attribute::primitive("user", "user_id", HostType::Int)),
            )
    }

    fn bridge(multiplicity: Multiplicity) -> RemoteInclude {
        RemoteInclude {
            owner_path: Vec::new(),
            bridge: AssociationStep {
                navigation: "audits".into(),
                source: "User".into(),
                target: "Audit".into(),
                multiplicity,
                store: StoreSymbol::new("archive"),
                source_columns: vec!["id".into()],
                target_columns: vec!["user_id".into()],
            },
            nested: Vec::new(),
        }
    }

    struct Recorder {
        queries: RefCell<Vec<String>>,
        rows: Vec<Value>,
    }

    impl SubqueryRunner for Recorder {
        fn run(&self, query: &Query) -> QueryResult<Vec<Value>> {
            self.queries.borrow_mut().push(query.to_string());
            Ok(self.rows.clone())
        }
    }

    fn audit(id: i64, user: i64) -> Value {
        Value::object([("id", Value::Int(id)), ("user", Value::Int(user))])
    }

    #[test]
    fn loads_once_and_attaches_by_key() {
        let runner = Recorder { queries: RefCell::new(Vec::new()), rows: vec![audit(1, 1), audit(2, 1), audit(3, 2)] };
        let mut users = vec![
            Value::object([("id", Value::Int(1))]),
            Value::object([("id", Value::Int(2))]),
            Value::object([("id", Value::Int(3))]),
        ];
        attach(&mut users, &bridge(Multiplicity::Many), &model(), &runner).expect("attach");
        assert_eq!(runner.queries.borrow().len(), 1);
        let counts: Vec<usize> =
            users.iter().map(|u| u.get("audits").and_then(Value::as_array).map_or(0, <[Value]>::len)).collect();
        assert_eq!(counts, vec![2, 1, 0]);
    }

    #[test]
    fn owners_without_keys_skip_the_remote_query() {
        let runner = Recorder { queries: RefCell::new(Vec::new()), rows: Vec::new() };
        let mut users = vec![Value::object([("id", Value::Null)])];
        attach(&mut users, &bridge(Multiplicity::One), &model(), &runner).expect("attach");
        assert!(runner.queries.borrow().is_empty());
        assert_eq!(users[0].get("audits"), Some(&Value::Null));
    }
}
