//! In-memory semantics of every query operator over a buffered sequence.

use std::cmp::Ordering;

use strata_core::{HostType, Value};

use crate::chain::{ArithFunction, QueryOperation, SetOperator};
use crate::error::{QueryError, QueryResult};
use crate::expr::{aggregate, grouping_value, Evaluator, Lambda};

pub(super) const NO_ELEMENTS: &str = "sequence contains no elements";
pub(super) const MORE_THAN_ONE: &str = "sequence contains more than one element";

/// Applies `operation` to `input`.
///
/// `element` is the type of the consumed elements and `operands` holds the
/// materialized sub-queries in the order of
/// [`QueryOperation::subqueries`]. Operators reducing the sequence to one
/// value return it as a one-element sequence.
pub(super) fn apply(
    operation: &QueryOperation,
    element: &HostType,
    input: Vec<Value>,
    operands: &[Vec<Value>],
    eval: Evaluator<'_>,
) -> QueryResult<Vec<Value>> {
    let operand = |index: usize| {
        operands
            .get(index)
            .ok_or_else(|| QueryError::Evaluation(format!("{} is missing its operand", operation.kind())))
    };
    let one = |value: Value| -> QueryResult<Vec<Value>> { Ok(vec![value]) };

    match operation {
        QueryOperation::Accumulate { seed, func, result } => {
            let mut items = input.into_iter();
            let mut acc = match seed {
                Some(seed) => seed.clone(),
                None => items.next().ok_or_else(|| QueryError::Cardinality(NO_ELEMENTS.into()))?,
            };
            for item in items {
                acc = eval.apply(func, &[&acc, &item])?;
            }
            match result {
                Some(result) => one(eval.apply(result, &[&acc])?),
                None => one(acc),
            }
        }
        QueryOperation::All { predicate } => {
            for item in &input {
                if eval.apply(predicate, &[item])? == Value::Bool(false) {
                    return one(Value::Bool(false));
                }
            }
            one(Value::Bool(true))
        }
        QueryOperation::Any { predicate } => one(Value::Bool(match predicate {
            Some(predicate) => first_match(&input, predicate, eval)?.is_some(),
            None => !input.is_empty(),
        })),
        QueryOperation::ArithAggregate { function, selector } => {
            let values = map_all(input, selector.as_ref(), eval)?;
            let target = selector.as_ref().map_or(element, Lambda::return_type);
            if values.iter().all(Value::is_null) && *function != ArithFunction::Sum {
                if matches!(target, HostType::Optional(_)) {
                    return one(Value::Null);
                }
                return Err(QueryError::Cardinality(NO_ELEMENTS.into()));
            }
            let result = aggregate(function.builtin(), &values)?;
            one(if result.is_null() { target.unwrap_optional().default_value() } else { result })
        }
        QueryOperation::Cast { target } => input.into_iter().map(|item| cast(target, item)).collect(),
        QueryOperation::Contains { value } => one(Value::Bool(input.iter().any(|item| matches_probe(item, value)))),
        QueryOperation::Count { predicate, .. } => {
            let count = match predicate {
                Some(predicate) => {
                    let mut count = 0usize;
                    for item in &input {
                        if eval.test(predicate, &[item])? {
                            count += 1;
                        }
                    }
                    count
                }
                None => input.len(),
            };
            one(Value::Int(i64::try_from(count).unwrap_or(i64::MAX)))
        }
        QueryOperation::DefaultIfEmpty { default } => {
            if input.is_empty() {
                one(default.clone().unwrap_or_else(|| element.default_value()))
            } else {
                Ok(input)
            }
        }
        QueryOperation::Distinct => Ok(distinct(input)),
        QueryOperation::ElementAt { index, or_default } => {
            element_or_default(input.into_iter().nth(*index), *or_default, element, "index out of range")
        }
        QueryOperation::First { predicate, or_default } => {
            let found = match predicate {
                Some(predicate) => first_match(&input, predicate, eval)?.cloned(),
                None => input.into_iter().next(),
            };
            element_or_default(found, *or_default, element, NO_ELEMENTS)
        }
        QueryOperation::Last { predicate, or_default } => {
            let mut found = None;
            for item in input {
                if predicate.as_ref().map_or(Ok(true), |p| eval.test(p, &[&item]))? {
                    found = Some(item);
                }
            }
            element_or_default(found, *or_default, element, NO_ELEMENTS)
        }
        QueryOperation::Single { predicate, or_default } => {
            let mut found = None;
            for item in input {
                if predicate.as_ref().map_or(Ok(true), |p| eval.test(p, &[&item]))? {
                    if found.is_some() {
                        return Err(QueryError::Cardinality(MORE_THAN_ONE.into()));
                    }
                    found = Some(item);
                }
            }
            element_or_default(found, *or_default, element, NO_ELEMENTS)
        }
        QueryOperation::Group { key, element: selector } => {
            let mut pairs = Vec::with_capacity(input.len());
            for item in input {
                let group_key = eval.apply(key, &[&item])?;
                let member = match selector {
                    Some(selector) => eval.apply(selector, &[&item])?,
                    None => item,
                };
                pairs.push((group_key, member));
            }
            Ok(group_pairs(pairs).into_iter().map(|(k, members)| grouping_value(k, members)).collect())
        }
        QueryOperation::GroupAggregation { key, aggregation } => {
            let mut pairs = Vec::with_capacity(input.len());
            for item in input {
                pairs.push((eval.apply(key, &[&item])?, item));
            }
            group_pairs(pairs)
                .into_iter()
                .map(|(k, members)| eval.apply(aggregation, &[&k, &Value::Array(members)]))
                .collect()
        }
        QueryOperation::Include { .. } => Ok(input),
        QueryOperation::Join { outer_key, inner_key, result, grouped, .. } => {
            let inner = operand(0)?;
            let mut inner_keys = Vec::with_capacity(inner.len());
            for item in inner {
                inner_keys.push(eval.apply(inner_key, &[item])?);
            }
            let mut out = Vec::new();
            for outer in &input {
                let key = eval.apply(outer_key, &[outer])?;
                let matches: Vec<&Value> = inner
                    .iter()
                    .zip(&inner_keys)
                    .filter(|(_, k)| !key.is_null() && k.key_eq(&key))
                    .map(|(item, _)| item)
                    .collect();
                if *grouped {
                    let group = Value::Array(matches.into_iter().cloned().collect());
                    out.push(eval.apply(result, &[outer, &group])?);
                } else {
                    for item in matches {
                        out.push(eval.apply(result, &[outer, item])?);
                    }
                }
            }
            Ok(out)
        }
        QueryOperation::OfType { target } => Ok(input.into_iter().filter(|item| target.admits(item)).collect()),
        QueryOperation::Order { key, descending } => sort(input, &[(key.clone(), *descending)], eval),
        QueryOperation::ThenOrder { .. } => {
            Err(QueryError::Unsupported("ThenOrder without the ordering it refines".into()))
        }
        QueryOperation::Reverse => {
            let mut input = input;
            input.reverse();
            Ok(input)
        }
        QueryOperation::Select { selector } => input.iter().map(|item| eval.apply(selector, &[item])).collect(),
        QueryOperation::SelectCombining { collection, result } => {
            let mut out = Vec::new();
            for item in &input {
                for member in sequence_of(eval.apply(collection, &[item])?)? {
                    out.push(eval.apply(result, &[item, &member])?);
                }
            }
            Ok(out)
        }
        QueryOperation::SelectCollectionMediated { collection } => {
            let mut out = Vec::new();
            for item in &input {
                out.extend(sequence_of(eval.apply(collection, &[item])?)?);
            }
            Ok(out)
        }
        QueryOperation::SequenceEqual { .. } => {
            let other = operand(0)?;
            one(Value::Bool(input.len() == other.len() && input.iter().zip(other).all(|(a, b)| a.key_eq(b))))
        }
        QueryOperation::Set { operator, .. } => {
            let other = operand(0)?;
            Ok(match operator {
                SetOperator::Concat => input.into_iter().chain(other.iter().cloned()).collect(),
                SetOperator::Union => distinct(input.into_iter().chain(other.iter().cloned()).collect()),
                SetOperator::Intersect => {
                    distinct(input.into_iter().filter(|item| other.iter().any(|o| o.key_eq(item))).collect())
                }
                SetOperator::Except => {
                    distinct(input.into_iter().filter(|item| !other.iter().any(|o| o.key_eq(item))).collect())
                }
            })
        }
        QueryOperation::Skip { count } => Ok(input.into_iter().skip(*count).collect()),
        QueryOperation::SkipWhile { predicate } => {
            let mut out = Vec::new();
            let mut skipping = true;
            for item in input {
                if skipping && eval.test(predicate, &[&item])? {
                    continue;
                }
                skipping = false;
                out.push(item);
            }
            Ok(out)
        }
        QueryOperation::Take { count } => Ok(input.into_iter().take(*count).collect()),
        QueryOperation::TakeWhile { predicate } => {
            let mut out = Vec::new();
            for item in input {
                if !eval.test(predicate, &[&item])? {
                    break;
                }
                out.push(item);
            }
            Ok(out)
        }
        QueryOperation::Where { predicate } => {
            let mut out = Vec::with_capacity(input.len());
            for item in input {
                if eval.test(predicate, &[&item])? {
                    out.push(item);
                }
            }
            Ok(out)
        }
        QueryOperation::Zip { result, .. } => {
            let other = operand(0)?;
            input.iter().zip(other).map(|(a, b)| eval.apply(result, &[a, b])).collect()
        }
    }
}

/// Stable sort by several keys; later keys break ties of earlier ones.
pub(super) fn sort(input: Vec<Value>, keys: &[(Lambda, bool)], eval: Evaluator<'_>) -> QueryResult<Vec<Value>> {
    let mut keyed = Vec::with_capacity(input.len());
    for item in input {
        let mut values = Vec::with_capacity(keys.len());
        for (key, _) in keys {
            values.push(eval.apply(key, &[&item])?);
        }
        keyed.push((values, item));
    }
    keyed.sort_by(|(a, _), (b, _)| {
        for ((x, y), (_, descending)) in a.iter().zip(b).zip(keys) {
            let ordering = if *descending { y.sort_cmp(x) } else { x.sort_cmp(y) };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    Ok(keyed.into_iter().map(|(_, item)| item).collect())
}

/// Groups by key in order of first appearance.
pub(super) fn group_pairs(pairs: Vec<(Value, Value)>) -> Vec<(Value, Vec<Value>)> {
    let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
    for (key, member) in pairs {
        match groups.iter_mut().find(|(k, _)| k.key_eq(&key)) {
            Some((_, members)) => members.push(member),
            None => groups.push((key, vec![member])),
        }
    }
    groups
}

fn distinct(input: Vec<Value>) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(input.len());
    for item in input {
        if !out.iter().any(|seen| seen.key_eq(&item)) {
            out.push(item);
        }
    }
    out
}

fn first_match<'v>(input: &'v [Value], predicate: &Lambda, eval: Evaluator<'_>) -> QueryResult<Option<&'v Value>> {
    for item in input {
        if eval.test(predicate, &[item])? {
            return Ok(Some(item));
        }
    }
    Ok(None)
}

fn map_all(input: Vec<Value>, selector: Option<&Lambda>, eval: Evaluator<'_>) -> QueryResult<Vec<Value>> {
    match selector {
        Some(selector) => input.iter().map(|item| eval.apply(selector, &[item])).collect(),
        None => Ok(input),
    }
}

fn element_or_default(found: Option<Value>, or_default: bool, element: &HostType, missing: &str) -> QueryResult<Vec<Value>> {
    match found {
        Some(value) => Ok(vec![value]),
        None if or_default => Ok(vec![element.default_value()]),
        None => Err(QueryError::Cardinality(missing.into())),
    }
}

fn sequence_of(value: Value) -> QueryResult<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        other => Err(QueryError::type_mismatch("a sequence", other.type_name())),
    }
}

fn cast(target: &HostType, value: Value) -> QueryResult<Value> {
    match (target.unwrap_optional(), value) {
        (HostType::Float, Value::Int(i)) => {
            #[allow(clippy::cast_precision_loss)]
            let widened = i as f64;
            Ok(Value::Float(widened))
        }
        (_, value) if target.admits(&value) => Ok(value),
        (_, value) => Err(QueryError::type_mismatch(target, value.type_name())),
    }
}

/// Membership test used by `Contains`: objects match when every field of
/// the probe matches, so a probe carrying only key fields finds its entity.
pub(super) fn matches_probe(item: &Value, probe: &Value) -> bool {
    match (item, probe) {
        (Value::Object(fields), Value::Object(wanted)) => {
            wanted.iter().all(|(name, value)| fields.get(name).is_some_and(|v| v.key_eq(value)))
        }
        _ => item.key_eq(probe),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Expr, HostFunctions};

    fn int_lambda(body: Expr, ret: HostType) -> Lambda {
        Lambda::unary("x", HostType::Int, body, ret)
    }

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().copied().map(Value::Int).collect()
    }

    #[test]
    fn skip_while_and_take_while_stop_at_the_first_mismatch() {
        let functions = HostFunctions::new();
        let eval = Evaluator::new(&functions);
        let small = int_lambda(Expr::param("x").lt(Expr::int(3)), HostType::Bool);
        let input = ints(&[1, 2, 5, 1]);
        let skipped = apply(&QueryOperation::SkipWhile { predicate: small.clone() }, &HostType::Int, input.clone(), &[], eval)
            .expect("skip while");
        assert_eq!(skipped, ints(&[5, 1]));
        let taken =
            apply(&QueryOperation::TakeWhile { predicate: small }, &HostType::Int, input, &[], eval).expect("take while");
        assert_eq!(taken, ints(&[1, 2]));
    }

    #[test]
    fn single_rejects_two_matches() {
        let functions = HostFunctions::new();
        let eval = Evaluator::new(&functions);
        let op = QueryOperation::Single { predicate: None, or_default: true };
        let err = apply(&op, &HostType::Int, ints(&[1, 2]), &[], eval).expect_err("two elements");
        assert!(matches!(err, QueryError::Cardinality(ref m) if m == MORE_THAN_ONE));
        assert_eq!(apply(&op, &HostType::Int, Vec::new(), &[], eval).expect("default"), ints(&[0]));
    }

    #[test]
    fn all_ignores_unknown_predicate_results() {
        let functions = HostFunctions::new();
        let eval = Evaluator::new(&functions);
        let element = HostType::Optional(Box::new(HostType::Int));
        let positive = Lambda::unary("x", element.clone(), Expr::param("x").gt(Expr::int(0)), HostType::Bool);
        let op = QueryOperation::All { predicate: positive };
        let all = apply(&op, &element, vec![Value::Int(5), Value::Null], &[], eval).expect("all");
        assert_eq!(all, vec![Value::Bool(true)]);
        let all = apply(&op, &element, vec![Value::Null, Value::Int(-1)], &[], eval).expect("all");
        assert_eq!(all, vec![Value::Bool(false)]);
    }

    #[test]
    fn set_operators_follow_distinctness_rules() {
        let functions = HostFunctions::new();
        let eval = Evaluator::new(&functions);
        let other = vec![ints(&[2, 3, 3])];
        let run = |operator| {
            let op = QueryOperation::Set { operator, other: Box::new(crate::chain::Query::new("Unused")) };
            apply(&op, &HostType::Int, ints(&[1, 2, 2]), &other, eval).expect("set")
        };
        assert_eq!(run(SetOperator::Concat), ints(&[1, 2, 2, 2, 3, 3]));
        assert_eq!(run(SetOperator::Union), ints(&[1, 2, 3]));
        assert_eq!(run(SetOperator::Intersect), ints(&[2]));
        assert_eq!(run(SetOperator::Except), ints(&[1]));
    }

    #[test]
    fn aggregates_of_nothing() {
        let functions = HostFunctions::new();
        let eval = Evaluator::new(&functions);
        let sum = QueryOperation::ArithAggregate { function: ArithFunction::Sum, selector: None };
        assert_eq!(apply(&sum, &HostType::Int, Vec::new(), &[], eval).expect("sum"), ints(&[0]));
        let max = QueryOperation::ArithAggregate { function: ArithFunction::Max, selector: None };
        assert!(apply(&max, &HostType::Int, Vec::new(), &[], eval).is_err());
    }

    #[test]
    fn sort_is_stable_across_keys() {
        let functions = HostFunctions::new();
        let eval = Evaluator::new(&functions);
        let row = |g: i64, n: &str| Value::object([("g", Value::Int(g)), ("n", Value::from(n))]);
        let record = HostType::record([("g", HostType::Int), ("n", HostType::String)]);
        let by_g = Lambda::unary("r", record, Expr::path("r", &["g"]), HostType::Int);
        let sorted = sort(vec![row(2, "a"), row(1, "b"), row(2, "c")], &[(by_g, true)], eval).expect("sort");
        assert_eq!(sorted, vec![row(2, "a"), row(2, "c"), row(1, "b")]);
    }

    #[test]
    fn probes_match_on_the_fields_they_carry() {
        let entity = Value::object([("id", Value::Int(1)), ("name", Value::from("ada"))]);
        assert!(matches_probe(&entity, &Value::object([("id", Value::Int(1))])));
        assert!(!matches_probe(&entity, &Value::object([("id", Value::Int(2))])));
        assert!(matches_probe(&Value::Int(3), &Value::Float(3.0)));
    }
}
