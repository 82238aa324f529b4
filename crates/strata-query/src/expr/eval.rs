//! In-memory evaluation of expressions.
//!
//! Evaluation follows relational three-valued logic: comparisons involving
//! null yield null, `AND`/`OR` treat null as unknown, and a predicate only
//! accepts an element when it evaluates to `true`. This keeps an operator's
//! result identical whether it ran in the relational engine or here.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use strata_core::Value;

use super::{BinaryOp, Builtin, Expr, Lambda, UnaryOp};
use crate::error::{QueryError, QueryResult};

/// A caller-supplied function with no relational equivalent.
pub type HostFunction = Arc<dyn Fn(&[Value]) -> QueryResult<Value> + Send + Sync>;

/// Registry of host functions available to in-memory evaluation.
#[derive(Clone, Default)]
pub struct HostFunctions {
    functions: HashMap<String, HostFunction>,
}

impl HostFunctions {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a function under a lower-case name.
    #[must_use]
    pub fn with<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&[Value]) -> QueryResult<Value> + Send + Sync + 'static,
    {
        self.register(name, function);
        self
    }

    /// Registers a function in place.
    pub fn register<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&[Value]) -> QueryResult<Value> + Send + Sync + 'static,
    {
        self.functions.insert(name.into().to_lowercase(), Arc::new(function));
    }

    /// Looks up a function.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&HostFunction> {
        self.functions.get(name)
    }
}

impl fmt::Debug for HostFunctions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("HostFunctions").field("functions", &names).finish()
    }
}

/// Evaluates lambdas against materialized values.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'a> {
    functions: &'a HostFunctions,
}

impl<'a> Evaluator<'a> {
    /// Creates an evaluator over a function registry.
    #[must_use]
    pub const fn new(functions: &'a HostFunctions) -> Self {
        Self { functions }
    }

    /// Applies a lambda to positional arguments.
    pub fn apply(&self, lambda: &Lambda, args: &[&Value]) -> QueryResult<Value> {
        if args.len() != lambda.arity() {
            return Err(QueryError::Evaluation(format!(
                "{lambda} expects {} arguments, got {}",
                lambda.arity(),
                args.len()
            )));
        }
        let env: Vec<(&str, &Value)> =
            lambda.params().iter().map(|p| p.name.as_str()).zip(args.iter().copied()).collect();
        self.eval(lambda.body(), &env)
    }

    /// Applies a predicate; only `true` accepts.
    pub fn test(&self, lambda: &Lambda, args: &[&Value]) -> QueryResult<bool> {
        Ok(self.apply(lambda, args)?.is_true())
    }

    /// Evaluates an expression in an environment of parameter bindings.
    pub fn eval(&self, expr: &Expr, env: &[(&str, &Value)]) -> QueryResult<Value> {
        match expr {
            Expr::Parameter(name) => env
                .iter()
                .rev()
                .find(|(n, _)| n == name)
                .map(|(_, v)| (*v).clone())
                .ok_or_else(|| QueryError::Evaluation(format!("unbound parameter '{name}'"))),
            Expr::Constant(value) => Ok(value.clone()),
            Expr::Member { target, member } => {
                let target = self.eval(target, env)?;
                member_of(&target, member)
            }
            Expr::Binary { left, op: op @ (BinaryOp::Eq | BinaryOp::NotEq), right }
                if is_null_literal(left) || is_null_literal(right) =>
            {
                let operand = if is_null_literal(left) { right } else { left };
                let is_null = self.eval(operand, env)?.is_null();
                Ok(Value::Bool(is_null == (*op == BinaryOp::Eq)))
            }
            Expr::Binary { left, op, right } => {
                let left = self.eval(left, env)?;
                // Short-circuit the connectives before evaluating the right side.
                match (op, &left) {
                    (BinaryOp::And, Value::Bool(false)) => return Ok(Value::Bool(false)),
                    (BinaryOp::Or, Value::Bool(true)) => return Ok(Value::Bool(true)),
                    _ => {}
                }
                let right = self.eval(right, env)?;
                binary(*op, &left, &right)
            }
            Expr::Unary { op, operand } => {
                let value = self.eval(operand, env)?;
                unary(*op, &value)
            }
            Expr::Call { function, args } => {
                let args =
                    args.iter().map(|a| self.eval(a, env)).collect::<QueryResult<Vec<_>>>()?;
                if let Some(builtin) = Builtin::parse(function) {
                    return call_builtin(builtin, &args);
                }
                match self.functions.get(function) {
                    Some(host) => (**host)(&args),
                    None => Err(QueryError::Evaluation(format!("unknown function '{function}'"))),
                }
            }
            Expr::Conditional { test, then, otherwise } => {
                if self.eval(test, env)?.is_true() {
                    self.eval(then, env)
                } else {
                    self.eval(otherwise, env)
                }
            }
            Expr::Record(fields) => Ok(Value::Object(
                fields
                    .iter()
                    .map(|(name, e)| Ok((name.clone(), self.eval(e, env)?)))
                    .collect::<QueryResult<BTreeMap<_, _>>>()?,
            )),
            Expr::InList { expr, list, negated } => {
                let value = self.eval(expr, env)?;
                if value.is_null() {
                    return Ok(Value::Null);
                }
                let mut found = false;
                for item in list {
                    if self.eval(item, env)?.key_eq(&value) {
                        found = true;
                        break;
                    }
                }
                Ok(Value::Bool(found != *negated))
            }
        }
    }
}

/// `x = NULL` compares as `x IS NULL`, matching the relational translation.
fn is_null_literal(expr: &Expr) -> bool {
    matches!(expr, Expr::Constant(Value::Null))
}

/// Field name holding the key of a materialized grouping.
pub(crate) const GROUP_KEY: &str = "key";
/// Field name holding the elements of a materialized grouping.
pub(crate) const GROUP_ELEMENTS: &str = "elements";

/// Builds the value representing one group.
pub(crate) fn grouping_value(key: Value, elements: Vec<Value>) -> Value {
    Value::object([(GROUP_KEY, key), (GROUP_ELEMENTS, Value::Array(elements))])
}

fn grouping_elements(value: &Value) -> Option<&[Value]> {
    let fields = value.as_object()?;
    if fields.len() == 2 && fields.contains_key(GROUP_KEY) {
        fields.get(GROUP_ELEMENTS).and_then(Value::as_array)
    } else {
        None
    }
}

fn member_of(target: &Value, member: &str) -> QueryResult<Value> {
    if let Some(elements) = grouping_elements(target) {
        if member != GROUP_KEY && member != GROUP_ELEMENTS {
            return project_elements(elements, member);
        }
    }
    match target {
        Value::Null => Ok(Value::Null),
        Value::Object(fields) => Ok(fields.get(member).cloned().unwrap_or(Value::Null)),
        Value::Array(items) => project_elements(items, member),
        other => Err(QueryError::Evaluation(format!(
            "cannot access member '{member}' of {}",
            other.type_name()
        ))),
    }
}

fn project_elements(items: &[Value], member: &str) -> QueryResult<Value> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match member_of(item, member)? {
            Value::Array(nested) => out.extend(nested),
            value => out.push(value),
        }
    }
    Ok(Value::Array(out))
}

pub(crate) fn binary(op: BinaryOp, left: &Value, right: &Value) -> QueryResult<Value> {
    use std::cmp::Ordering;

    // A comparison against a collection holds when it holds for any element.
    if op.is_comparison() || op == BinaryOp::Like {
        match (left, right) {
            (Value::Array(_), Value::Array(_)) => {}
            (Value::Array(items), other) => return existential(op, items, other, false),
            (other, Value::Array(items)) => return existential(op, items, other, true),
            _ => {}
        }
    }

    match op {
        BinaryOp::And => Ok(match (left.as_bool(), right.as_bool()) {
            (Some(false), _) | (_, Some(false)) => Value::Bool(false),
            (Some(true), Some(true)) => Value::Bool(true),
            _ => Value::Null,
        }),
        BinaryOp::Or => Ok(match (left.as_bool(), right.as_bool()) {
            (Some(true), _) | (_, Some(true)) => Value::Bool(true),
            (Some(false), Some(false)) => Value::Bool(false),
            _ => Value::Null,
        }),
        BinaryOp::Eq | BinaryOp::NotEq => {
            if left.is_null() || right.is_null() {
                return Ok(Value::Null);
            }
            let equal = left.key_eq(right);
            Ok(Value::Bool(if op == BinaryOp::Eq { equal } else { !equal }))
        }
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            Ok(left.compare(right).map_or(Value::Null, |ordering| {
                Value::Bool(match op {
                    BinaryOp::Lt => ordering == Ordering::Less,
                    BinaryOp::LtEq => ordering != Ordering::Greater,
                    BinaryOp::Gt => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                })
            }))
        }
        BinaryOp::Like => match (left, right) {
            (Value::String(text), Value::String(pattern)) => {
                Ok(Value::Bool(like_match(text, pattern)))
            }
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            _ => Err(QueryError::Evaluation("LIKE requires string operands".into())),
        },
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            arithmetic(op, left, right)
        }
    }
}

fn existential(op: BinaryOp, items: &[Value], other: &Value, swapped: bool) -> QueryResult<Value> {
    for item in items {
        let (left, right) = if swapped { (other, item) } else { (item, other) };
        if binary(op, left, right)?.is_true() {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> QueryResult<Value> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::String(a), Value::String(b)) if op == BinaryOp::Add => {
            Ok(Value::String(format!("{a}{b}")))
        }
        (Value::Int(a), Value::Int(b)) => {
            let (a, b) = (*a, *b);
            let result = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                BinaryOp::Mul => a.checked_mul(b),
                BinaryOp::Div => a.checked_div(b),
                _ => a.checked_rem(b),
            };
            result.map(Value::Int).ok_or_else(|| {
                QueryError::Evaluation(format!("integer overflow or division by zero: {a} {op} {b}"))
            })
        }
        _ => match (left.as_number(), right.as_number()) {
            (Some(a), Some(b)) => Ok(Value::Float(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                _ => a % b,
            })),
            _ => Err(QueryError::Evaluation(format!(
                "cannot apply {op} to {} and {}",
                left.type_name(),
                right.type_name()
            ))),
        },
    }
}

pub(crate) fn unary(op: UnaryOp, value: &Value) -> QueryResult<Value> {
    match op {
        UnaryOp::IsNull => Ok(Value::Bool(value.is_null())),
        UnaryOp::IsNotNull => Ok(Value::Bool(!value.is_null())),
        UnaryOp::Not => match value {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            Value::Null => Ok(Value::Null),
            other => Err(QueryError::Evaluation(format!("cannot negate {}", other.type_name()))),
        },
        UnaryOp::Neg => match value {
            Value::Int(i) => Ok(Value::Int(-i)),
            Value::Float(f) => Ok(Value::Float(-f)),
            Value::Null => Ok(Value::Null),
            other => Err(QueryError::Evaluation(format!("cannot negate {}", other.type_name()))),
        },
    }
}

/// Evaluates a built-in function over already evaluated arguments.
///
/// Aggregates accept either a single array argument or a grouping value.
pub(crate) fn call_builtin(builtin: Builtin, args: &[Value]) -> QueryResult<Value> {
    let arg = |i: usize| args.get(i).unwrap_or(&Value::Null);
    let text = |i: usize| arg(i).as_str();
    match builtin {
        Builtin::Lower => Ok(text(0).map_or(Value::Null, |s| Value::from(s.to_lowercase()))),
        Builtin::Upper => Ok(text(0).map_or(Value::Null, |s| Value::from(s.to_uppercase()))),
        Builtin::Trim => Ok(text(0).map_or(Value::Null, |s| Value::from(s.trim()))),
        Builtin::Length => Ok(text(0).map_or(Value::Null, |s| {
            Value::Int(i64::try_from(s.chars().count()).unwrap_or(i64::MAX))
        })),
        Builtin::Abs => unary_numeric(arg(0), i64::abs, f64::abs),
        Builtin::Coalesce => Ok(args.iter().find(|v| !v.is_null()).cloned().unwrap_or(Value::Null)),
        Builtin::Concat => {
            if args.iter().any(Value::is_null) {
                return Ok(Value::Null);
            }
            Ok(Value::String(args.iter().map(display_plain).collect()))
        }
        Builtin::Contains | Builtin::StartsWith | Builtin::EndsWith => {
            match (text(0), text(1)) {
                (Some(haystack), Some(needle)) => Ok(Value::Bool(match builtin {
                    Builtin::Contains => haystack.contains(needle),
                    Builtin::StartsWith => haystack.starts_with(needle),
                    _ => haystack.ends_with(needle),
                })),
                _ => Ok(Value::Null),
            }
        }
        Builtin::Count | Builtin::Sum | Builtin::Avg | Builtin::Min | Builtin::Max => {
            let items = match arg(0) {
                Value::Array(items) => items.as_slice(),
                other => grouping_elements(other).ok_or_else(|| {
                    QueryError::Evaluation(format!(
                        "{} expects a sequence, got {}",
                        builtin.name(),
                        other.type_name()
                    ))
                })?,
            };
            aggregate(builtin, items)
        }
    }
}

fn unary_numeric(value: &Value, int: fn(i64) -> i64, float: fn(f64) -> f64) -> QueryResult<Value> {
    match value {
        Value::Int(i) => Ok(Value::Int(int(*i))),
        Value::Float(f) => Ok(Value::Float(float(*f))),
        Value::Null => Ok(Value::Null),
        other => Err(QueryError::Evaluation(format!("expected a number, got {}", other.type_name()))),
    }
}

fn display_plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Folds a sequence with an aggregate built-in. Nulls are ignored, as in
/// SQL; `sum` of nothing is null and `count` counts every element.
pub(crate) fn aggregate(builtin: Builtin, items: &[Value]) -> QueryResult<Value> {
    if builtin == Builtin::Count {
        return Ok(Value::Int(i64::try_from(items.len()).unwrap_or(i64::MAX)));
    }
    let values: Vec<&Value> = items.iter().filter(|v| !v.is_null()).collect();
    if values.is_empty() {
        return Ok(Value::Null);
    }
    match builtin {
        Builtin::Min | Builtin::Max => {
            let mut best = values[0];
            for candidate in &values[1..] {
                let ordering = candidate.sort_cmp(best);
                let better = if builtin == Builtin::Min {
                    ordering == std::cmp::Ordering::Less
                } else {
                    ordering == std::cmp::Ordering::Greater
                };
                if better {
                    best = *candidate;
                }
            }
            Ok(best.clone())
        }
        Builtin::Sum => {
            if values.iter().all(|v| matches!(v, Value::Int(_))) {
                let mut total: i64 = 0;
                for v in &values {
                    total = total
                        .checked_add(v.as_int().unwrap_or(0))
                        .ok_or_else(|| QueryError::Evaluation("integer overflow in sum".into()))?;
                }
                Ok(Value::Int(total))
            } else {
                numbers(&values).map(|ns| Value::Float(ns.iter().sum()))
            }
        }
        _ => numbers(&values).map(|ns| {
            #[allow(clippy::cast_precision_loss)]
            let len = ns.len() as f64;
            Value::Float(ns.iter().sum::<f64>() / len)
        }),
    }
}

fn numbers(values: &[&Value]) -> QueryResult<Vec<f64>> {
    values
        .iter()
        .map(|v| {
            v.as_number()
                .ok_or_else(|| QueryError::Evaluation(format!("expected a number, got {}", v.type_name())))
        })
        .collect()
}

/// SQL `LIKE` matching with `%` (any run) and `_` (one character).
pub(crate) fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((bp, bt)) = backtrack {
            p = bp + 1;
            t = bt + 1;
            backtrack = Some((bp, bt + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '%')
}

#[cfg(test)]
mod tests {
    use strata_core::HostType;

    use super::*;
    use crate::expr::Param;

    fn user(id: i64, name: &str) -> Value {
        Value::object([("id", Value::Int(id)), ("name", Value::from(name))])
    }

    fn predicate(body: Expr) -> Lambda {
        Lambda::unary("x", HostType::entity("User"), body, HostType::Bool)
    }

    #[test]
    fn evaluates_member_predicates() {
        let functions = HostFunctions::new();
        let eval = Evaluator::new(&functions);
        let p = predicate(Expr::path("x", &["id"]).gt(Expr::int(1)));
        assert!(!eval.test(&p, &[&user(1, "a")]).expect("eval"));
        assert!(eval.test(&p, &[&user(2, "b")]).expect("eval"));
    }

    #[test]
    fn three_valued_logic() {
        assert_eq!(binary(BinaryOp::Eq, &Value::Null, &Value::Int(1)).expect("eq"), Value::Null);
        assert_eq!(
            binary(BinaryOp::And, &Value::Null, &Value::Bool(false)).expect("and"),
            Value::Bool(false)
        );
        assert_eq!(binary(BinaryOp::Or, &Value::Null, &Value::Bool(false)).expect("or"), Value::Null);
        assert_eq!(unary(UnaryOp::Not, &Value::Null).expect("not"), Value::Null);
    }

    #[test]
    fn host_functions_are_consulted() {
        let functions =
            HostFunctions::new().with("double", |args| Ok(Value::Int(args[0].as_int().unwrap_or(0) * 2)));
        let eval = Evaluator::new(&functions);
        let lambda = Lambda::new(
            vec![Param::new("x", HostType::entity("User"))],
            Expr::call("double", vec![Expr::path("x", &["id"])]),
            HostType::Int,
        );
        assert_eq!(eval.apply(&lambda, &[&user(4, "d")]).expect("apply"), Value::Int(8));

        let missing = lambda.with_body(Expr::call("triple", vec![Expr::int(1)]));
        assert!(matches!(eval.apply(&missing, &[&user(4, "d")]), Err(QueryError::Evaluation(_))));
    }

    #[test]
    fn grouping_members_project() {
        let group = grouping_value(Value::Int(1), vec![user(1, "a"), user(2, "b")]);
        assert_eq!(member_of(&group, "key").expect("key"), Value::Int(1));
        assert_eq!(
            member_of(&group, "name").expect("names"),
            Value::Array(vec![Value::from("a"), Value::from("b")])
        );
        let sum = call_builtin(Builtin::Sum, &[member_of(&group, "id").expect("ids")]).expect("sum");
        assert_eq!(sum, Value::Int(3));
        assert_eq!(call_builtin(Builtin::Count, &[group]).expect("count"), Value::Int(2));
    }

    #[test]
    fn aggregates_ignore_nulls() {
        let items = vec![Value::Int(1), Value::Null, Value::Int(5)];
        assert_eq!(aggregate(Builtin::Max, &items).expect("max"), Value::Int(5));
        assert_eq!(aggregate(Builtin::Avg, &items).expect("avg"), Value::Float(3.0));
        assert_eq!(aggregate(Builtin::Sum, &[]).expect("sum"), Value::Null);
        assert_eq!(aggregate(Builtin::Count, &items).expect("count"), Value::Int(3));
    }

    #[test]
    fn null_literal_comparison_tests_for_null() {
        let functions = HostFunctions::new();
        let eval = Evaluator::new(&functions);
        let p = predicate(Expr::path("x", &["nick"]).eq(Expr::null()));
        assert!(eval.test(&p, &[&user(1, "a")]).expect("eval"));
        let p = predicate(Expr::path("x", &["name"]).not_eq(Expr::null()));
        assert!(eval.test(&p, &[&user(1, "a")]).expect("eval"));
    }

    #[test]
    fn comparisons_against_collections_are_existential() {
        let totals = Value::Array(vec![Value::Int(5), Value::Int(50)]);
        assert_eq!(binary(BinaryOp::Gt, &totals, &Value::Int(10)).expect("gt"), Value::Bool(true));
        assert_eq!(binary(BinaryOp::Gt, &totals, &Value::Int(99)).expect("gt"), Value::Bool(false));
        assert_eq!(binary(BinaryOp::Lt, &Value::Int(6), &totals).expect("lt"), Value::Bool(true));
        assert_eq!(
            binary(BinaryOp::Eq, &Value::Array(Vec::new()), &Value::Int(1)).expect("eq"),
            Value::Bool(false)
        );
    }

    #[test]
    fn like_patterns() {
        assert!(like_match("alice", "a%"));
        assert!(like_match("alice", "%li%"));
        assert!(like_match("bob", "b_b"));
        assert!(!like_match("bob", "a%"));
        assert!(like_match("", "%"));
        assert!(!like_match("ab", "a"));
    }
}
