//! One constructor per operator kind.
//!
//! Each constructor takes the sequence type the operator consumes and the
//! continuation it links to, validates the operator and returns the new head.

use strata_core::{DomainModel, HostType, Value};

use super::operation::element_of;
use super::{ArithFunction, Query, QueryChain, QueryOperation, SetOperator};
use crate::error::{QueryError, QueryResult};
use crate::expr::Lambda;
use crate::navigation::AssociationPath;

type Next = Option<QueryChain>;

impl QueryChain {
    pub fn accumulate(
        source: HostType,
        seed: Option<Value>,
        func: Lambda,
        result: Option<Lambda>,
        next: Next,
    ) -> QueryResult<Self> {
        Self::new(QueryOperation::Accumulate { seed, func, result }, source, next)
    }

    pub fn all(source: HostType, predicate: Lambda, next: Next) -> QueryResult<Self> {
        Self::new(QueryOperation::All { predicate }, source, next)
    }

    pub fn any(source: HostType, predicate: Option<Lambda>, next: Next) -> QueryResult<Self> {
        Self::new(QueryOperation::Any { predicate }, source, next)
    }

    pub fn arith_aggregate(
        source: HostType,
        function: ArithFunction,
        selector: Option<Lambda>,
        next: Next,
    ) -> QueryResult<Self> {
        Self::new(QueryOperation::ArithAggregate { function, selector }, source, next)
    }

    pub fn cast(source: HostType, target: HostType, next: Next) -> QueryResult<Self> {
        Self::new(QueryOperation::Cast { target }, source, next)
    }

    pub fn contains(source: HostType, value: Value, next: Next) -> QueryResult<Self> {
        Self::new(QueryOperation::Contains { value }, source, next)
    }

    pub fn count(source: HostType, predicate: Option<Lambda>, long: bool, next: Next) -> QueryResult<Self> {
        Self::new(QueryOperation::Count { predicate, long }, source, next)
    }

    pub fn default_if_empty(source: HostType, default: Option<Value>, next: Next) -> QueryResult<Self> {
        Self::new(QueryOperation::DefaultIfEmpty { default }, source, next)
    }

    pub fn distinct(source: HostType, next: Next) -> QueryResult<Self> {
        Self::new(QueryOperation::Distinct, source, next)
    }

    pub fn element_at(source: HostType, index: usize, or_default: bool, next: Next) -> QueryResult<Self> {
        Self::new(QueryOperation::ElementAt { index, or_default }, source, next)
    }

    pub fn first(
        source: HostType,
        predicate: Option<Lambda>,
        or_default: bool,
        next: Next,
    ) -> QueryResult<Self> {
        Self::new(QueryOperation::First { predicate, or_default }, source, next)
    }

    pub fn group(source: HostType, key: Lambda, element: Option<Lambda>, next: Next) -> QueryResult<Self> {
        Self::new(QueryOperation::Group { key, element }, source, next)
    }

    pub fn group_aggregation(
        source: HostType,
        key: Lambda,
        aggregation: Lambda,
        next: Next,
    ) -> QueryResult<Self> {
        Self::new(QueryOperation::GroupAggregation { key, aggregation }, source, next)
    }

    /// Includes a dotted navigation path such as `"customer.orders"`.
    pub fn include(source: HostType, path: &str, model: &dyn DomainModel, next: Next) -> QueryResult<Self> {
        let segments: Vec<String> = path.split('.').map(|s| s.trim().to_owned()).collect();
        if segments.iter().any(String::is_empty) {
            return Err(QueryError::illegal(path, "empty path segment"));
        }
        Self::include_segments(source, segments, model, next)
    }

    /// Includes the navigation path selected by `x => x.a.b`.
    pub fn include_expr(
        source: HostType,
        selector: &Lambda,
        model: &dyn DomainModel,
        next: Next,
    ) -> QueryResult<Self> {
        let (_, path) = selector
            .body()
            .as_member_path()
            .filter(|(_, path)| !path.is_empty())
            .ok_or_else(|| QueryError::illegal(selector, "include selector must be a member path"))?;
        let segments = path.into_iter().map(str::to_owned).collect();
        Self::include_segments(source, segments, model, next)
    }

    fn include_segments(
        source: HostType,
        segments: Vec<String>,
        model: &dyn DomainModel,
        next: Next,
    ) -> QueryResult<Self> {
        let element = element_of(&source)?;
        let entity = element
            .entity_name()
            .ok_or_else(|| QueryError::illegal(segments.join("."), format!("{element} is not an entity")))?;
        AssociationPath::resolve(model, entity, &segments)?;
        Self::new(QueryOperation::Include { path: segments }, source, next)
    }

    pub fn join(
        source: HostType,
        inner: Query,
        outer_key: Lambda,
        inner_key: Lambda,
        result: Lambda,
        grouped: bool,
        next: Next,
    ) -> QueryResult<Self> {
        let operation =
            QueryOperation::Join { inner: Box::new(inner), outer_key, inner_key, result, grouped };
        Self::new(operation, source, next)
    }

    pub fn last(source: HostType, predicate: Option<Lambda>, or_default: bool, next: Next) -> QueryResult<Self> {
        Self::new(QueryOperation::Last { predicate, or_default }, source, next)
    }

    pub fn of_type(source: HostType, target: HostType, next: Next) -> QueryResult<Self> {
        Self::new(QueryOperation::OfType { target }, source, next)
    }

    pub fn order(source: HostType, key: Lambda, descending: bool, next: Next) -> QueryResult<Self> {
        Self::new(QueryOperation::Order { key, descending }, source, next)
    }

    pub fn then_order(source: HostType, key: Lambda, descending: bool, next: Next) -> QueryResult<Self> {
        Self::new(QueryOperation::ThenOrder { key, descending }, source, next)
    }

    pub fn reverse(source: HostType, next: Next) -> QueryResult<Self> {
        Self::new(QueryOperation::Reverse, source, next)
    }

    pub fn select(source: HostType, selector: Lambda, next: Next) -> QueryResult<Self> {
        Self::new(QueryOperation::Select { selector }, source, next)
    }

    /// Flattens `collection` and projects every pair through `result`.
    ///
    /// The collection must be a navigation path whose only multi-valued
    /// step is the last one.
    pub fn select_combining(
        source: HostType,
        collection: Lambda,
        result: Lambda,
        model: &dyn DomainModel,
        next: Next,
    ) -> QueryResult<Self> {
        check_degeneration_path(&collection, model)?;
        Self::new(QueryOperation::SelectCombining { collection, result }, source, next)
    }

    pub fn select_collection_mediated(source: HostType, collection: Lambda, next: Next) -> QueryResult<Self> {
        Self::new(QueryOperation::SelectCollectionMediated { collection }, source, next)
    }

    pub fn sequence_equal(source: HostType, other: Query, next: Next) -> QueryResult<Self> {
        Self::new(QueryOperation::SequenceEqual { other: Box::new(other) }, source, next)
    }

    pub fn set(source: HostType, operator: SetOperator, other: Query, next: Next) -> QueryResult<Self> {
        Self::new(QueryOperation::Set { operator, other: Box::new(other) }, source, next)
    }

    pub fn single(
        source: HostType,
        predicate: Option<Lambda>,
        or_default: bool,
        next: Next,
    ) -> QueryResult<Self> {
        Self::new(QueryOperation::Single { predicate, or_default }, source, next)
    }

    pub fn skip(source: HostType, count: usize, next: Next) -> QueryResult<Self> {
        Self::new(QueryOperation::Skip { count }, source, next)
    }

    pub fn skip_while(source: HostType, predicate: Lambda, next: Next) -> QueryResult<Self> {
        Self::new(QueryOperation::SkipWhile { predicate }, source, next)
    }

    pub fn take(source: HostType, count: usize, next: Next) -> QueryResult<Self> {
        Self::new(QueryOperation::Take { count }, source, next)
    }

    pub fn take_while(source: HostType, predicate: Lambda, next: Next) -> QueryResult<Self> {
        Self::new(QueryOperation::TakeWhile { predicate }, source, next)
    }

    /// Keeps the elements satisfying `predicate`.
    pub fn filter(source: HostType, predicate: Lambda, next: Next) -> QueryResult<Self> {
        Self::new(QueryOperation::Where { predicate }, source, next)
    }

    pub fn zip(source: HostType, other: Query, result: Lambda, next: Next) -> QueryResult<Self> {
        Self::new(QueryOperation::Zip { other: Box::new(other), result }, source, next)
    }
}

pub(crate) fn check_degeneration_path(collection: &Lambda, model: &dyn DomainModel) -> QueryResult<()> {
    let (_, path) = collection
        .body()
        .as_member_path()
        .ok_or_else(|| QueryError::illegal(collection, "collection must be a member path"))?;
    let entity = collection
        .param(0)
        .and_then(|p| p.ty.entity_name())
        .ok_or_else(|| QueryError::illegal(collection, "collection must start at an entity"))?;
    let resolved = AssociationPath::resolve(model, entity, &path)?;
    let steps = resolved.steps();
    let flattening = steps
        .iter()
        .take(steps.len().saturating_sub(1))
        .any(|step| step.multiplicity.is_many());
    if flattening {
        return Err(QueryError::illegal(collection, "path flattens a collection before its end"));
    }
    match steps.last() {
        Some(step) if step.multiplicity.is_many() => Ok(()),
        _ => Err(QueryError::illegal(collection, "path does not end in a collection")),
    }
}

#[cfg(test)]
mod tests {
    use strata_core::{Attribute, EntityType, ModelCatalog, Navigation};

    use super::*;
    use crate::expr::Expr;

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
                    .with_navigation(Navigation::reference("customer", "Customer", "customer_id", "id")),
            )
    }

    fn orders() -> HostType {
        HostType::sequence(HostType::entity("Order"))
    }

    #[test]
    fn include_requires_navigable_members() {
        let model = model();
        assert!(QueryChain::include(orders(), "customer.orders", &model, None).is_ok());
        let err = QueryChain::include(orders(), "customer.name", &model, None).expect_err("attribute");
        assert!(matches!(err, QueryError::IllegalExpression { .. }));
        assert!(QueryChain::include(orders(), "customer..orders", &model, None).is_err());
    }

    #[test]
    fn include_by_expression() {
        let model = model();
        let selector = Lambda::unary(
            "o",
            HostType::entity("Order"),
            Expr::path("o", &["customer"]),
            HostType::entity("Customer"),
        );
        let chain = QueryChain::include_expr(orders(), &selector, &model, None).expect("include");
        assert_eq!(chain.operation(), &QueryOperation::Include { path: vec!["customer".into()] });
    }

    #[test]
    fn combining_rejects_intermediate_flattening() {
        let model = model();
        let customer = HostType::entity("Customer");
        let order = HostType::entity("Order");
        let collection = Lambda::unary(
            "o",
            order.clone(),
            Expr::path("o", &["customer", "orders"]),
            HostType::sequence(order.clone()),
        );
        let result = Lambda::new(
            vec![
                crate::expr::Param::new("o", order.clone()),
                crate::expr::Param::new("p", order.clone()),
            ],
            Expr::path("p", &["id"]),
            HostType::Int,
        );
        assert!(QueryChain::select_combining(orders(), collection, result.clone(), &model, None).is_ok());

        let nested = Lambda::unary(
            "c",
            customer.clone(),
            Expr::path("c", &["orders", "customer", "orders"]),
            HostType::sequence(order.clone()),
        );
        let err = QueryChain::select_combining(
            HostType::sequence(customer),
            nested,
            result,
            &model,
            None,
        )
        .expect_err("flattening point");
        assert!(matches!(err, QueryError::IllegalExpression { .. }));
    }
}
