//! Query operators and their typing rules.

use std::fmt;

use serde::{Deserialize, Serialize};
use strata_core::{HostType, Value};

use super::Query;
use crate::error::{QueryError, QueryResult};
use crate::expr::{Builtin, Lambda};

/// The kind of a query operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperatorKind {
    Accumulate,
    All,
    Any,
    ArithAggregate,
    Cast,
    Contains,
    Count,
    DefaultIfEmpty,
    Distinct,
    ElementAt,
    First,
    Group,
    GroupAggregation,
    Include,
    Join,
    Last,
    OfType,
    Order,
    ThenOrder,
    Reverse,
    Select,
    SelectCombining,
    SelectCollectionMediated,
    SequenceEqual,
    Set,
    Single,
    Skip,
    SkipWhile,
    Take,
    TakeWhile,
    Where,
    Zip,
}

impl OperatorKind {
    /// Operator name as shown in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Accumulate => "Accumulate",
            Self::All => "All",
            Self::Any => "Any",
            Self::ArithAggregate => "ArithAggregate",
            Self::Cast => "Cast",
            Self::Contains => "Contains",
            Self::Count => "Count",
            Self::DefaultIfEmpty => "DefaultIfEmpty",
            Self::Distinct => "Distinct",
            Self::ElementAt => "ElementAt",
            Self::First => "First",
            Self::Group => "Group",
            Self::GroupAggregation => "GroupAggregation",
            Self::Include => "Include",
            Self::Join => "Join",
            Self::Last => "Last",
            Self::OfType => "OfType",
            Self::Order => "Order",
            Self::ThenOrder => "ThenOrder",
            Self::Reverse => "Reverse",
            Self::Select => "Select",
            Self::SelectCombining => "SelectCombining",
            Self::SelectCollectionMediated => "SelectCollectionMediated",
            Self::SequenceEqual => "SequenceEqual",
            Self::Set => "Set",
            Self::Single => "Single",
            Self::Skip => "Skip",
            Self::SkipWhile => "SkipWhile",
            Self::Take => "Take",
            Self::TakeWhile => "TakeWhile",
            Self::Where => "Where",
            Self::Zip => "Zip",
        }
    }

    /// Returns true for operators that reduce the sequence to one value.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Accumulate
                | Self::All
                | Self::Any
                | Self::ArithAggregate
                | Self::Contains
                | Self::Count
                | Self::ElementAt
                | Self::First
                | Self::Last
                | Self::SequenceEqual
                | Self::Single
        )
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Numeric aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithFunction {
    Sum,
    Average,
    Max,
    Min,
}

impl ArithFunction {
    /// The built-in that evaluates this aggregate in memory.
    #[must_use]
    pub const fn builtin(self) -> Builtin {
        match self {
            Self::Sum => Builtin::Sum,
            Self::Average => Builtin::Avg,
            Self::Max => Builtin::Max,
            Self::Min => Builtin::Min,
        }
    }
}

impl fmt::Display for ArithFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sum => "Sum",
            Self::Average => "Average",
            Self::Max => "Max",
            Self::Min => "Min",
        })
    }
}

/// Set operators combining two sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SetOperator {
    /// All elements of both sides, duplicates kept.
    Concat,
    /// Distinct elements of both sides.
    Union,
    /// Distinct elements present on both sides.
    Intersect,
    /// Distinct elements of the left side absent from the right side.
    Except,
}

impl fmt::Display for SetOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Concat => "Concat",
            Self::Union => "Union",
            Self::Intersect => "Intersect",
            Self::Except => "Except",
        })
    }
}

/// One query operator with its parameters.
///
/// Every variant carries only the fields its operator needs. Lambdas are
/// typed against the element type of the sequence the operator consumes.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOperation {
    /// Folds the sequence with `func(acc, x)`, optionally mapping the final
    /// accumulator through `result`.
    Accumulate { seed: Option<Value>, func: Lambda, result: Option<Lambda> },
    /// True when every element satisfies the predicate.
    All { predicate: Lambda },
    /// True when some element (satisfying the predicate) exists.
    Any { predicate: Option<Lambda> },
    /// Sum, average, max or min of the elements or a selector.
    ArithAggregate { function: ArithFunction, selector: Option<Lambda> },
    /// Converts every element to `target`, failing on incompatible values.
    Cast { target: HostType },
    /// True when the sequence contains `value`.
    Contains { value: Value },
    /// Number of elements (satisfying the predicate).
    Count { predicate: Option<Lambda>, long: bool },
    /// The sequence, or a single default element when it is empty.
    DefaultIfEmpty { default: Option<Value> },
    /// Distinct elements.
    Distinct,
    /// The element at `index`.
    ElementAt { index: usize, or_default: bool },
    /// The first element (satisfying the predicate).
    First { predicate: Option<Lambda>, or_default: bool },
    /// Groups elements by key.
    Group { key: Lambda, element: Option<Lambda> },
    /// Groups elements by key and projects every group through
    /// `aggregation(key, elements)`.
    GroupAggregation { key: Lambda, aggregation: Lambda },
    /// Eagerly loads the navigation path with every element.
    Include { path: Vec<String> },
    /// Correlates elements with the elements of `inner` by key.
    Join { inner: Box<Query>, outer_key: Lambda, inner_key: Lambda, result: Lambda, grouped: bool },
    /// The last element (satisfying the predicate).
    Last { predicate: Option<Lambda>, or_default: bool },
    /// The elements that are of type `target`.
    OfType { target: HostType },
    /// Sorts by a key, discarding any previous ordering.
    Order { key: Lambda, descending: bool },
    /// Refines the previous ordering with another key.
    ThenOrder { key: Lambda, descending: bool },
    /// Reverses the sequence.
    Reverse,
    /// Projects every element.
    Select { selector: Lambda },
    /// Flattens a collection of every element and projects each pair.
    SelectCombining { collection: Lambda, result: Lambda },
    /// Flattens a collection of every element.
    SelectCollectionMediated { collection: Lambda },
    /// True when both sequences have equal elements in the same order.
    SequenceEqual { other: Box<Query> },
    /// Combines the sequence with `other`.
    Set { operator: SetOperator, other: Box<Query> },
    /// The only element (satisfying the predicate).
    Single { predicate: Option<Lambda>, or_default: bool },
    /// Bypasses `count` elements.
    Skip { count: usize },
    /// Bypasses elements while the predicate holds.
    SkipWhile { predicate: Lambda },
    /// Returns at most `count` elements.
    Take { count: usize },
    /// Returns elements while the predicate holds.
    TakeWhile { predicate: Lambda },
    /// Elements satisfying the predicate.
    Where { predicate: Lambda },
    /// Pairs elements with the elements of `other`.
    Zip { other: Box<Query>, result: Lambda },
}

impl QueryOperation {
    /// The operator kind.
    #[must_use]
    pub const fn kind(&self) -> OperatorKind {
        match self {
            Self::Accumulate { .. } => OperatorKind::Accumulate,
            Self::All { .. } => OperatorKind::All,
            Self::Any { .. } => OperatorKind::Any,
            Self::ArithAggregate { .. } => OperatorKind::ArithAggregate,
            Self::Cast { .. } => OperatorKind::Cast,
            Self::Contains { .. } => OperatorKind::Contains,
            Self::Count { .. } => OperatorKind::Count,
            Self::DefaultIfEmpty { .. } => OperatorKind::DefaultIfEmpty,
            Self::Distinct => OperatorKind::Distinct,
            Self::ElementAt { .. } => OperatorKind::ElementAt,
            Self::First { .. } => OperatorKind::First,
            Self::Group { .. } => OperatorKind::Group,
            Self::GroupAggregation { .. } => OperatorKind::GroupAggregation,
            Self::Include { .. } => OperatorKind::Include,
            Self::Join { .. } => OperatorKind::Join,
            Self::Last { .. } => OperatorKind::Last,
            Self::OfType { .. } => OperatorKind::OfType,
            Self::Order { .. } => OperatorKind::Order,
            Self::ThenOrder { .. } => OperatorKind::ThenOrder,
            Self::Reverse => OperatorKind::Reverse,
            Self::Select { .. } => OperatorKind::Select,
            Self::SelectCombining { .. } => OperatorKind::SelectCombining,
            Self::SelectCollectionMediated { .. } => OperatorKind::SelectCollectionMediated,
            Self::SequenceEqual { .. } => OperatorKind::SequenceEqual,
            Self::Set { .. } => OperatorKind::Set,
            Self::Single { .. } => OperatorKind::Single,
            Self::Skip { .. } => OperatorKind::Skip,
            Self::SkipWhile { .. } => OperatorKind::SkipWhile,
            Self::Take { .. } => OperatorKind::Take,
            Self::TakeWhile { .. } => OperatorKind::TakeWhile,
            Self::Where { .. } => OperatorKind::Where,
            Self::Zip { .. } => OperatorKind::Zip,
        }
    }

    /// Every lambda argument of the operator.
    #[must_use]
    pub fn lambdas(&self) -> Vec<&Lambda> {
        match self {
            Self::Accumulate { func, result, .. } => std::iter::once(func).chain(result).collect(),
            Self::All { predicate }
            | Self::SkipWhile { predicate }
            | Self::TakeWhile { predicate }
            | Self::Where { predicate } => vec![predicate],
            Self::Any { predicate }
            | Self::Count { predicate, .. }
            | Self::First { predicate, .. }
            | Self::Last { predicate, .. }
            | Self::Single { predicate, .. } => predicate.iter().collect(),
            Self::ArithAggregate { selector, .. } => selector.iter().collect(),
            Self::Group { key, element } => std::iter::once(key).chain(element).collect(),
            Self::GroupAggregation { key, aggregation } => vec![key, aggregation],
            Self::Join { outer_key, inner_key, result, .. } => vec![outer_key, inner_key, result],
            Self::Order { key, .. } | Self::ThenOrder { key, .. } => vec![key],
            Self::Select { selector } => vec![selector],
            Self::SelectCombining { collection, result } => vec![collection, result],
            Self::SelectCollectionMediated { collection } => vec![collection],
            Self::Zip { result, .. } => vec![result],
            Self::Cast { .. }
            | Self::Contains { .. }
            | Self::DefaultIfEmpty { .. }
            | Self::Distinct
            | Self::ElementAt { .. }
            | Self::Include { .. }
            | Self::OfType { .. }
            | Self::Reverse
            | Self::SequenceEqual { .. }
            | Self::Set { .. }
            | Self::Skip { .. }
            | Self::Take { .. } => Vec::new(),
        }
    }

    /// Lambdas whose first parameter is the consumed element.
    ///
    /// These are the lambdas whose member accesses describe navigation
    /// the operator depends on.
    #[must_use]
    pub fn element_lambdas(&self) -> Vec<&Lambda> {
        match self {
            Self::Accumulate { .. } | Self::Zip { .. } => Vec::new(),
            Self::Join { outer_key, result, .. } => vec![outer_key, result],
            Self::GroupAggregation { key, .. } => vec![key],
            other => other.lambdas(),
        }
    }

    /// Queries used as operands.
    #[must_use]
    pub fn subqueries(&self) -> Vec<&Query> {
        match self {
            Self::Join { inner, .. } => vec![inner],
            Self::SequenceEqual { other } | Self::Set { other, .. } | Self::Zip { other, .. } => {
                vec![other]
            }
            _ => Vec::new(),
        }
    }

    /// Computes the result type from the consumed sequence type.
    pub fn result_type(&self, source: &HostType) -> QueryResult<HostType> {
        let element = element_of(source)?;
        let ret = |lambda: &Lambda| lambda.return_type().clone();
        Ok(match self {
            Self::Accumulate { func, result, .. } => result.as_ref().map_or_else(|| ret(func), ret),
            Self::All { .. } | Self::Any { .. } | Self::Contains { .. } | Self::SequenceEqual { .. } => {
                HostType::Bool
            }
            Self::ArithAggregate { function: ArithFunction::Average, .. } => HostType::Float,
            Self::ArithAggregate { selector, .. } => {
                selector.as_ref().map_or_else(|| element.clone(), ret).unwrap_optional().clone()
            }
            Self::Cast { target } | Self::OfType { target } => HostType::sequence(target.clone()),
            Self::Count { .. } => HostType::Int,
            Self::DefaultIfEmpty { .. }
            | Self::Distinct
            | Self::Include { .. }
            | Self::Order { .. }
            | Self::ThenOrder { .. }
            | Self::Reverse
            | Self::Set { .. }
            | Self::Skip { .. }
            | Self::SkipWhile { .. }
            | Self::Take { .. }
            | Self::TakeWhile { .. }
            | Self::Where { .. } => source.clone(),
            Self::ElementAt { .. }
            | Self::First { .. }
            | Self::Last { .. }
            | Self::Single { .. } => element.clone(),
            Self::Group { key, element: selector } => HostType::sequence(HostType::grouping(
                ret(key),
                selector.as_ref().map_or_else(|| element.clone(), ret),
            )),
            Self::GroupAggregation { aggregation: result, .. }
            | Self::Join { result, .. }
            | Self::Select { selector: result }
            | Self::SelectCombining { result, .. }
            | Self::Zip { result, .. } => HostType::sequence(ret(result)),
            Self::SelectCollectionMediated { collection } => {
                let collection = collection.return_type();
                let inner = collection
                    .element_type()
                    .ok_or_else(|| QueryError::type_mismatch("a sequence", collection))?;
                HostType::sequence(inner.clone())
            }
        })
    }

    /// Checks the operator's invariants against the consumed sequence type.
    pub fn validate(&self, source: &HostType) -> QueryResult<()> {
        let element = element_of(source)?;
        for lambda in self.lambdas() {
            check_closed(lambda)?;
        }
        match self {
            Self::All { predicate }
            | Self::SkipWhile { predicate }
            | Self::TakeWhile { predicate }
            | Self::Where { predicate } => expect_predicate(predicate, element),
            Self::Any { predicate }
            | Self::Count { predicate, .. }
            | Self::First { predicate, .. }
            | Self::Last { predicate, .. }
            | Self::Single { predicate, .. } => {
                predicate.as_ref().map_or(Ok(()), |p| expect_predicate(p, element))
            }
            Self::ArithAggregate { function, selector } => {
                if let Some(selector) = selector {
                    expect_unary(selector, element)?;
                }
                let value = selector.as_ref().map_or(element, |s| s.return_type());
                let value = value.unwrap_optional();
                let numeric = value.is_numeric() || *value == HostType::Any;
                if matches!(function, ArithFunction::Sum | ArithFunction::Average) && !numeric {
                    return Err(QueryError::type_mismatch("a numeric type", value));
                }
                Ok(())
            }
            Self::Group { key, element: selector } => {
                expect_unary(key, element)?;
                selector.as_ref().map_or(Ok(()), |s| expect_unary(s, element))
            }
            Self::GroupAggregation { key, aggregation } => {
                expect_unary(key, element)?;
                expect_arity(aggregation, 2)
            }
            Self::Join { inner, outer_key, inner_key, result, .. } => {
                expect_unary(outer_key, element)?;
                expect_unary(inner_key, &inner.element_type())?;
                let (outer, inner) = (outer_key.return_type(), inner_key.return_type());
                if !outer.accepts(inner) && !inner.accepts(outer) {
                    return Err(QueryError::type_mismatch(outer, inner));
                }
                expect_arity(result, 2)
            }
            Self::Order { key, .. } | Self::ThenOrder { key, .. } => expect_unary(key, element),
            Self::Select { selector } => expect_unary(selector, element),
            Self::SelectCombining { collection, result } => {
                expect_unary(collection, element)?;
                if !collection.is_member_path() {
                    return Err(QueryError::illegal(collection, "collection must be a member path"));
                }
                if !collection.return_type().is_sequence() {
                    return Err(QueryError::type_mismatch("a sequence", collection.return_type()));
                }
                expect_arity(result, 2)
            }
            Self::SelectCollectionMediated { collection } => {
                expect_unary(collection, element)?;
                if collection.return_type().is_sequence() {
                    Ok(())
                } else {
                    Err(QueryError::type_mismatch("a sequence", collection.return_type()))
                }
            }
            Self::Accumulate { func, result, .. } => {
                expect_arity(func, 2)?;
                result.as_ref().map_or(Ok(()), |r| expect_arity(r, 1))
            }
            Self::Zip { result, .. } => expect_arity(result, 2),
            Self::Set { other, .. } | Self::SequenceEqual { other } => {
                let other_element = other.element_type();
                if element.accepts(&other_element) {
                    Ok(())
                } else {
                    Err(QueryError::type_mismatch(element, other_element))
                }
            }
            Self::Include { path } if path.is_empty() => {
                Err(QueryError::illegal(self, "include path is empty"))
            }
            _ => Ok(()),
        }
    }
}

/// Element type of a sequence type.
pub(crate) fn element_of(source: &HostType) -> QueryResult<&HostType> {
    source.element_type().ok_or_else(|| QueryError::type_mismatch("a sequence", source))
}

fn check_closed(lambda: &Lambda) -> QueryResult<()> {
    let unbound = lambda
        .body()
        .free_parameters()
        .into_iter()
        .find(|name| lambda.params().iter().all(|p| p.name != *name));
    match unbound {
        Some(name) => Err(QueryError::illegal(lambda, format!("references unbound parameter '{name}'"))),
        None => Ok(()),
    }
}

fn expect_arity(lambda: &Lambda, arity: usize) -> QueryResult<()> {
    if lambda.arity() == arity {
        Ok(())
    } else {
        Err(QueryError::illegal(lambda, format!("expected {arity} parameters")))
    }
}

fn expect_unary(lambda: &Lambda, element: &HostType) -> QueryResult<()> {
    expect_arity(lambda, 1)?;
    match lambda.param(0) {
        Some(param) if param.ty.accepts(element) => Ok(()),
        Some(param) => Err(QueryError::type_mismatch(&param.ty, element)),
        None => Err(QueryError::illegal(lambda, "missing parameter")),
    }
}

fn expect_predicate(lambda: &Lambda, element: &HostType) -> QueryResult<()> {
    expect_unary(lambda, element)?;
    if HostType::Bool.accepts(lambda.return_type()) {
        Ok(())
    } else {
        Err(QueryError::type_mismatch(HostType::Bool, lambda.return_type()))
    }
}

fn write_optional(f: &mut fmt::Formatter<'_>, lambda: Option<&Lambda>) -> fmt::Result {
    match lambda {
        Some(lambda) => write!(f, "{lambda}"),
        None => Ok(()),
    }
}

impl fmt::Display for QueryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.kind())?;
        match self {
            Self::Accumulate { seed, func, result } => {
                if let Some(seed) = seed {
                    write!(f, "{seed}, ")?;
                }
                write!(f, "{func}")?;
                if let Some(result) = result {
                    write!(f, ", {result}")?;
                }
            }
            Self::ArithAggregate { function, selector } => {
                write!(f, "{function}")?;
                if let Some(selector) = selector {
                    write!(f, ", {selector}")?;
                }
            }
            Self::Cast { target } | Self::OfType { target } => write!(f, "{target}")?,
            Self::Contains { value } => write!(f, "{value}")?,
            Self::DefaultIfEmpty { default: Some(value) } => write!(f, "{value}")?,
            Self::ElementAt { index, .. } => write!(f, "{index}")?,
            Self::Include { path } => write!(f, "{}", path.join("."))?,
            Self::Join { inner, outer_key, inner_key, result, .. } => {
                write!(f, "{inner}, {outer_key}, {inner_key}, {result}")?;
            }
            Self::Order { key, descending } | Self::ThenOrder { key, descending } => {
                write!(f, "{key}{}", if *descending { ", desc" } else { "" })?;
            }
            Self::SequenceEqual { other } => write!(f, "{other}")?,
            Self::Set { operator, other } => write!(f, "{operator}, {other}")?,
            Self::Skip { count } | Self::Take { count } => write!(f, "{count}")?,
            Self::Zip { other, result } => write!(f, "{other}, {result}")?,
            Self::SelectCombining { collection, result } => write!(f, "{collection}, {result}")?,
            Self::Group { key, element } => {
                write!(f, "{key}")?;
                if let Some(element) = element {
                    write!(f, ", {element}")?;
                }
            }
            Self::GroupAggregation { key, aggregation } => write!(f, "{key}, {aggregation}")?,
            other => write_optional(f, other.lambdas().first().copied())?,
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;

    fn user() -> HostType {
        HostType::entity("User")
    }

    fn users() -> HostType {
        HostType::sequence(user())
    }

    fn id_gt(n: i64) -> Lambda {
        Lambda::unary("x", user(), Expr::path("x", &["id"]).gt(Expr::int(n)), HostType::Bool)
    }

    #[test]
    fn result_types_follow_the_rule_table() {
        let filter = QueryOperation::Where { predicate: id_gt(1) };
        assert_eq!(filter.result_type(&users()).expect("where"), users());

        let count = QueryOperation::Count { predicate: None, long: false };
        assert_eq!(count.result_type(&users()).expect("count"), HostType::Int);

        let any = QueryOperation::Any { predicate: Some(id_gt(1)) };
        assert_eq!(any.result_type(&users()).expect("any"), HostType::Bool);

        let select = QueryOperation::Select {
            selector: Lambda::unary("x", user(), Expr::path("x", &["name"]), HostType::String),
        };
        assert_eq!(
            select.result_type(&users()).expect("select"),
            HostType::sequence(HostType::String)
        );

        let first = QueryOperation::First { predicate: None, or_default: true };
        assert_eq!(first.result_type(&users()).expect("first"), user());

        let avg = QueryOperation::ArithAggregate {
            function: ArithFunction::Average,
            selector: Some(Lambda::unary("x", user(), Expr::path("x", &["id"]), HostType::Int)),
        };
        assert_eq!(avg.result_type(&users()).expect("avg"), HostType::Float);
    }

    #[test]
    fn non_sequence_sources_are_rejected() {
        let take = QueryOperation::Take { count: 1 };
        assert!(matches!(take.result_type(&HostType::Int), Err(QueryError::TypeMismatch { .. })));
    }

    #[test]
    fn lambdas_must_be_closed() {
        let leaky =
            Lambda::unary("x", user(), Expr::path("y", &["id"]).gt(Expr::int(1)), HostType::Bool);
        let op = QueryOperation::Where { predicate: leaky };
        assert!(matches!(op.validate(&users()), Err(QueryError::IllegalExpression { .. })));
    }

    #[test]
    fn predicates_must_be_boolean() {
        let op = QueryOperation::Where {
            predicate: Lambda::unary("x", user(), Expr::path("x", &["name"]), HostType::String),
        };
        assert!(matches!(op.validate(&users()), Err(QueryError::TypeMismatch { .. })));
    }

    #[test]
    fn sums_need_numbers() {
        let op = QueryOperation::ArithAggregate {
            function: ArithFunction::Sum,
            selector: Some(Lambda::unary("x", user(), Expr::path("x", &["name"]), HostType::String)),
        };
        assert!(op.validate(&users()).is_err());
    }

    #[test]
    fn display_names_the_operator() {
        let op = QueryOperation::Where { predicate: id_gt(1) };
        assert_eq!(op.to_string(), "Where(x => (x.id > 1))");
        assert_eq!(QueryOperation::Take { count: 3 }.to_string(), "Take(3)");
        assert_eq!(QueryOperation::Distinct.to_string(), "Distinct()");
    }
}
