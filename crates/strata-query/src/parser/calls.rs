//! The call-name to operator table.

use strata_core::{DomainModel, HostType, Value};

use super::{Argument, MethodCall};
use crate::chain::{
    check_degeneration_path, element_of, ArithFunction, OperatorKind, Query, QueryOperation,
    SetOperator,
};
use crate::error::{QueryError, QueryResult};
use crate::expr::{Lambda, UntypedLambda};
use crate::navigation::AssociationPath;

/// Maps one call onto the operator it denotes, given the query so far.
pub(super) fn operation(call: &MethodCall, query: &Query, model: &dyn DomainModel) -> QueryResult<QueryOperation> {
    let source = query.result_type();
    let element = element_of(&source)?.clone();
    let args = Args { call, model };
    let unary = std::slice::from_ref(&element);

    let operation = match call.name() {
        "aggregate" => {
            let (seed, func, result) = match call.args() {
                [func] => (None, func, None),
                [seed, func] => (Some(args.value(seed)?), func, None),
                [seed, func, result] => (Some(args.value(seed)?), func, Some(result)),
                _ => return Err(args.arity("1 to 3")),
            };
            let accumulator = seed.as_ref().map_or_else(|| element.clone(), value_type);
            let func = args.lambda(func, &[accumulator, element.clone()])?;
            let result = result
                .map(|r| args.lambda(r, std::slice::from_ref(func.return_type())))
                .transpose()?;
            QueryOperation::Accumulate { seed, func, result }
        }
        "all" => QueryOperation::All { predicate: args.lambda(args.one()?, unary)? },
        "any" => QueryOperation::Any { predicate: args.optional_lambda(unary)? },
        "sum" | "average" | "max" | "min" => {
            let function = match call.name() {
                "sum" => ArithFunction::Sum,
                "average" => ArithFunction::Average,
                "max" => ArithFunction::Max,
                _ => ArithFunction::Min,
            };
            QueryOperation::ArithAggregate { function, selector: args.optional_lambda(unary)? }
        }
        "cast" => QueryOperation::Cast { target: args.ty(args.one()?)? },
        "of_type" => QueryOperation::OfType { target: args.ty(args.one()?)? },
        "contains" => QueryOperation::Contains { value: args.value(args.one()?)? },
        "count" | "long_count" => QueryOperation::Count {
            predicate: args.optional_lambda(unary)?,
            long: call.name() == "long_count",
        },
        "default_if_empty" => QueryOperation::DefaultIfEmpty {
            default: args.optional()?.map(|arg| args.value(arg)).transpose()?,
        },
        "distinct" => {
            args.none()?;
            QueryOperation::Distinct
        }
        "element_at" | "element_at_or_default" => QueryOperation::ElementAt {
            index: args.count(args.one()?)?,
            or_default: call.name().ends_with("_or_default"),
        },
        "first" | "first_or_default" => QueryOperation::First {
            predicate: args.optional_lambda(unary)?,
            or_default: call.name().ends_with("_or_default"),
        },
        "last" | "last_or_default" => QueryOperation::Last {
            predicate: args.optional_lambda(unary)?,
            or_default: call.name().ends_with("_or_default"),
        },
        "single" | "single_or_default" => QueryOperation::Single {
            predicate: args.optional_lambda(unary)?,
            or_default: call.name().ends_with("_or_default"),
        },
        "group_by" => match call.args() {
            [key] => QueryOperation::Group { key: args.lambda(key, unary)?, element: None },
            [key, second] => {
                let key = args.lambda(key, unary)?;
                let second = args.untyped(second)?;
                if second.params().len() == 2 {
                    let types = [key.return_type().clone(), HostType::sequence(element.clone())];
                    QueryOperation::GroupAggregation { aggregation: second.bind(&types, model)?, key }
                } else {
                    QueryOperation::Group { element: Some(second.bind(unary, model)?), key }
                }
            }
            _ => return Err(args.arity("1 or 2")),
        },
        "include" => {
            let path = include_path(&args, args.one()?, &element)?;
            let entity = element
                .entity_name()
                .ok_or_else(|| QueryError::illegal(call, format!("{element} is not an entity")))?;
            AssociationPath::resolve(model, entity, &path)?;
            QueryOperation::Include { path }
        }
        "join" | "group_join" => {
            let [inner, outer_key, inner_key, result] = call.args() else {
                return Err(args.arity("4"));
            };
            let inner = args.query(inner)?;
            let inner_element = inner.element_type();
            let outer_key = args.lambda(outer_key, unary)?;
            let inner_key = args.lambda(inner_key, std::slice::from_ref(&inner_element))?;
            let grouped = call.name() == "group_join";
            let joined = if grouped { HostType::sequence(inner_element) } else { inner_element };
            let result = args.lambda(result, &[element.clone(), joined])?;
            QueryOperation::Join { inner: Box::new(inner), outer_key, inner_key, result, grouped }
        }
        "order_by" | "order_by_descending" => QueryOperation::Order {
            key: args.lambda(args.one()?, unary)?,
            descending: call.name().ends_with("_descending"),
        },
        "then_by" | "then_by_descending" => {
            let ordered = query
                .chain()
                .map(|chain| chain.tail().kind())
                .is_some_and(|kind| matches!(kind, OperatorKind::Order | OperatorKind::ThenOrder));
            if !ordered {
                return Err(QueryError::illegal(call, "then_by must follow an ordering"));
            }
            QueryOperation::ThenOrder {
                key: args.lambda(args.one()?, unary)?,
                descending: call.name().ends_with("_descending"),
            }
        }
        "reverse" => {
            args.none()?;
            QueryOperation::Reverse
        }
        "select" => {
            let selector = args.untyped(args.one()?)?;
            if selector.params().len() != 1 {
                return Err(QueryError::Unsupported(format!("indexed projection in {call}")));
            }
            QueryOperation::Select { selector: selector.bind(unary, model)? }
        }
        "select_many" => match call.args() {
            [collection] => QueryOperation::SelectCollectionMediated { collection: args.lambda(collection, unary)? },
            [collection, result] => {
                let collection = args.lambda(collection, unary)?;
                check_degeneration_path(&collection, model)?;
                let inner = element_of(collection.return_type())?.clone();
                let result = args.lambda(result, &[element.clone(), inner])?;
                QueryOperation::SelectCombining { collection, result }
            }
            _ => return Err(args.arity("1 or 2")),
        },
        "sequence_equal" => QueryOperation::SequenceEqual { other: Box::new(args.query(args.one()?)?) },
        "concat" | "union" | "intersect" | "except" => {
            let operator = match call.name() {
                "concat" => SetOperator::Concat,
                "union" => SetOperator::Union,
                "intersect" => SetOperator::Intersect,
                _ => SetOperator::Except,
            };
            QueryOperation::Set { operator, other: Box::new(args.query(args.one()?)?) }
        }
        "skip" => QueryOperation::Skip { count: args.count(args.one()?)? },
        "take" => QueryOperation::Take { count: args.count(args.one()?)? },
        "skip_while" => QueryOperation::SkipWhile { predicate: args.lambda(args.one()?, unary)? },
        "take_while" => QueryOperation::TakeWhile { predicate: args.lambda(args.one()?, unary)? },
        "where" => QueryOperation::Where { predicate: args.lambda(args.one()?, unary)? },
        "zip" => {
            let [other, result] = call.args() else {
                return Err(args.arity("2"));
            };
            let other = args.query(other)?;
            let result = args.lambda(result, &[element.clone(), other.element_type()])?;
            QueryOperation::Zip { other: Box::new(other), result }
        }
        name => return Err(QueryError::Unsupported(format!("method '{name}'"))),
    };
    Ok(operation)
}

fn include_path(args: &Args<'_>, arg: &Argument, element: &HostType) -> QueryResult<Vec<String>> {
    let lambda = match arg {
        Argument::Text(text) if !text.contains("=>") => {
            let segments: Vec<String> = text.split('.').map(|s| s.trim().to_owned()).collect();
            if segments.iter().any(String::is_empty) {
                return Err(QueryError::illegal(text, "empty path segment"));
            }
            return Ok(segments);
        }
        other => args.lambda(other, std::slice::from_ref(element))?,
    };
    match lambda.body().as_member_path() {
        Some((_, path)) if lambda.is_member_path() => Ok(path.into_iter().map(str::to_owned).collect()),
        _ => Err(QueryError::illegal(&lambda, "include selector must be a member path")),
    }
}

fn value_type(value: &Value) -> HostType {
    match value {
        Value::Bool(_) => HostType::Bool,
        Value::Int(_) => HostType::Int,
        Value::Float(_) => HostType::Float,
        Value::String(_) => HostType::String,
        Value::Bytes(_) => HostType::Bytes,
        _ => HostType::Any,
    }
}

struct Args<'a> {
    call: &'a MethodCall,
    model: &'a dyn DomainModel,
}

impl<'a> Args<'a> {
    fn arity(&self, expected: &str) -> QueryError {
        QueryError::illegal(self.call, format!("expected {expected} arguments"))
    }

    fn none(&self) -> QueryResult<()> {
        if self.call.args().is_empty() { Ok(()) } else { Err(self.arity("no")) }
    }

    fn one(&self) -> QueryResult<&'a Argument> {
        match self.call.args() {
            [arg] => Ok(arg),
            _ => Err(self.arity("1")),
        }
    }

    fn optional(&self) -> QueryResult<Option<&'a Argument>> {
        match self.call.args() {
            [] => Ok(None),
            [arg] => Ok(Some(arg)),
            _ => Err(self.arity("0 or 1")),
        }
    }

    fn untyped(&self, arg: &Argument) -> QueryResult<UntypedLambda> {
        match arg {
            Argument::Text(text) => UntypedLambda::parse(text),
            Argument::Lambda(lambda) => Ok(lambda.clone()),
            other => Err(QueryError::illegal(other, "expected a lambda")),
        }
    }

    fn lambda(&self, arg: &Argument, types: &[HostType]) -> QueryResult<Lambda> {
        self.untyped(arg)?.bind(types, self.model)
    }

    fn optional_lambda(&self, types: &[HostType]) -> QueryResult<Option<Lambda>> {
        self.optional()?.map(|arg| self.lambda(arg, types)).transpose()
    }

    fn value(&self, arg: &Argument) -> QueryResult<Value> {
        match arg {
            Argument::Value(value) => Ok(value.clone()),
            other => Err(QueryError::illegal(other, "expected a constant")),
        }
    }

    fn count(&self, arg: &Argument) -> QueryResult<usize> {
        match arg {
            Argument::Value(Value::Int(n)) => {
                usize::try_from(*n).map_err(|_| QueryError::illegal(arg, "count must not be negative"))
            }
            other => Err(QueryError::illegal(other, "expected an integer")),
        }
    }

    fn ty(&self, arg: &Argument) -> QueryResult<HostType> {
        match arg {
            Argument::Type(ty) => Ok(ty.clone()),
            other => Err(QueryError::illegal(other, "expected a type")),
        }
    }

    fn query(&self, arg: &Argument) -> QueryResult<Query> {
        match arg {
            Argument::Query(captured) => captured.parse(self.model),
            other => Err(QueryError::illegal(other, "expected a query")),
        }
    }
}

#[cfg(test)]
mod tests {
    use strata_core::{Attribute, EntityType, ModelCatalog, Navigation};

    use super::super::CapturedQuery;
    use super::*;

    fn model() -> ModelCatalog {
        ModelCatalog::new("main")
            .with_entity(
                EntityType::new("User", "users")
                    .with_key("id")
                    .with_attribute(Attribute::primitive("id", "id", HostType::Int))
                    .with_attribute(Attribute::primitive("name", "name", HostType::String))
                    .with_navigation(Navigation::collection("orders", "Order", "id", "user_id")),
            )
            .with_entity(
                EntityType::new("Order", "orders")
                    .with_key("id")
                    .with_attribute(Attribute::primitive("id", "id", HostType::Int))
                    .with_attribute(Attribute::primitive("user_id", "user_id", HostType::Int))
                    .with_attribute(Attribute::primitive("total", "total", HostType::Float))
                    .with_navigation(Navigation::reference("user", "User", "user_id", "id")),
            )
    }

    fn kinds(query: &Query) -> Vec<OperatorKind> {
        query.chain().map(|c| c.kinds()).unwrap_or_default()
    }

    #[test]
    fn filter_and_project() {
        let query = CapturedQuery::new("User")
            .call("where", vec!["x => x.id > 1".into()])
            .call("select", vec!["x => x.name".into()])
            .parse(&model())
            .expect("parse");
        assert_eq!(kinds(&query), vec![OperatorKind::Where, OperatorKind::Select]);
        assert_eq!(query.result_type(), HostType::sequence(HostType::String));
    }

    #[test]
    fn table_covers_variants() {
        let model = model();
        let query = CapturedQuery::new("Order")
            .call("order_by_descending", vec!["o => o.total".into()])
            .call("then_by", vec!["o => o.id".into()])
            .call("skip", vec![2.into()])
            .call("take", vec![3.into()])
            .call("element_at_or_default", vec![0.into()])
            .parse(&model)
            .expect("parse");
        assert_eq!(query.chain().map(|c| c.to_string()).unwrap_or_default().matches("Take(3)").count(), 1);
        assert_eq!(query.result_type(), HostType::entity("Order"));
        let tail = query.chain().expect("chain").tail();
        assert_eq!(tail.operation(), &QueryOperation::ElementAt { index: 0, or_default: true });

        let users = CapturedQuery::new("User").call("where", vec!["u => u.id < 10".into()]);
        let union = CapturedQuery::new("User")
            .call("union", vec![users.into()])
            .call("long_count", vec![])
            .parse(&model)
            .expect("union");
        assert_eq!(kinds(&union), vec![OperatorKind::Set, OperatorKind::Count]);
    }

    #[test]
    fn grouping_shapes() {
        let model = model();
        let plain = CapturedQuery::new("Order")
            .call("group_by", vec!["o => o.user_id".into()])
            .parse(&model)
            .expect("group");
        assert_eq!(kinds(&plain), vec![OperatorKind::Group]);

        let aggregated = CapturedQuery::new("Order")
            .call("group_by", vec!["o => o.user_id".into(), "(k, g) => count(g)".into()])
            .parse(&model)
            .expect("aggregation");
        assert_eq!(kinds(&aggregated), vec![OperatorKind::GroupAggregation]);
        assert_eq!(aggregated.result_type(), HostType::sequence(HostType::Int));
    }

    #[test]
    fn join_and_flatten() {
        let model = model();
        let joined = CapturedQuery::new("Order")
            .call(
                "join",
                vec![
                    CapturedQuery::new("User").into(),
                    "o => o.user_id".into(),
                    "u => u.id".into(),
                    "(o, u) => u.name".into(),
                ],
            )
            .parse(&model)
            .expect("join");
        assert_eq!(joined.result_type(), HostType::sequence(HostType::String));

        let flattened = CapturedQuery::new("User")
            .call("select_many", vec!["u => u.orders".into(), "(u, o) => o.total".into()])
            .parse(&model)
            .expect("select_many");
        assert_eq!(kinds(&flattened), vec![OperatorKind::SelectCombining]);
    }

    #[test]
    fn include_paths() {
        let model = model();
        let by_path = CapturedQuery::new("Order")
            .call("include", vec!["user.orders".into()])
            .parse(&model)
            .expect("path");
        let by_lambda = CapturedQuery::new("Order")
            .call("include", vec!["o => o.user".into()])
            .parse(&model)
            .expect("lambda");
        assert_eq!(kinds(&by_path), vec![OperatorKind::Include]);
        assert_eq!(kinds(&by_lambda), vec![OperatorKind::Include]);

        let err = CapturedQuery::new("Order")
            .call("include", vec!["user.name".into()])
            .parse(&model)
            .expect_err("attribute");
        assert!(matches!(err, QueryError::IllegalExpression { .. }));
    }

    #[test]
    fn rejects_unknown_and_malformed_calls() {
        let model = model();
        let err = CapturedQuery::new("User").call("shuffle", vec![]).parse(&model).expect_err("unknown");
        assert!(matches!(err, QueryError::Unsupported(_)));

        let err = CapturedQuery::new("User").call("take", vec![(-1).into()]).parse(&model).expect_err("negative");
        assert!(matches!(err, QueryError::IllegalExpression { .. }));

        let err = CapturedQuery::new("User").call("then_by", vec!["u => u.id".into()]).parse(&model);
        assert!(matches!(err, Err(QueryError::IllegalExpression { .. })));

        let err = CapturedQuery::new("User").call("where", vec!["x => y.id > 1".into()]).parse(&model);
        assert!(err.is_err());

        assert!(matches!(CapturedQuery::new("Ghost").parse(&model), Err(QueryError::Model(_))));
    }
}
