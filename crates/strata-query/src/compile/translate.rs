//! Lambda bodies to relational expressions.
//!
//! Every lambda parameter is bound to a [`Binding`]; member chains walk the
//! bindings and join navigations on demand. Anything without a relational
//! form fails with [`QueryError::Translation`], which the relational
//! compiler answers by running the operator in memory.

use std::collections::BTreeSet;

use strata_core::{DomainModel, Member, Navigation, Value};
use tracing::trace;

use super::binding::{attribute_binding, Binding};
use super::context::CompilationContext;
use crate::error::{QueryError, QueryResult};
use crate::expr::{BinaryOp, Builtin, Expr, Lambda, UnaryOp, GROUP_KEY};
use crate::sql::{AggregateFunction, JoinKind, SqlExpr};

/// How a collection navigation inside a lambda is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CollectionPolicy {
    /// Collection navigations have no relational form.
    Reject,
    /// A comparison over a collection holds when some element satisfies it.
    Existential,
    /// The collection is flattened into the row stream.
    Flatten,
}

/// Where in the predicate an expression sits.
#[derive(Debug, Clone, Copy, Default)]
struct Position {
    /// Directly compared by a comparison or `LIKE`.
    operand: bool,
    /// Under an odd number of `NOT`s.
    negated: bool,
    /// Inside the argument of an aggregate.
    in_aggregate: bool,
}

impl Position {
    const fn operand(self) -> Self {
        Self { operand: true, ..self }
    }

    const fn plain(self) -> Self {
        Self { operand: false, ..self }
    }
}

struct Translator<'c, 'm> {
    ctx: &'c mut CompilationContext<'m>,
    params: Vec<(String, Binding)>,
    policy: CollectionPolicy,
    grouped: bool,
    crossed: usize,
}

/// Translates `lambda` applied to `args`.
///
/// `grouped` admits aggregates over a [`Binding::Grouping`] argument.
/// Scalar results that read only the arguments' own sources are shared
/// through the translation cache when one is configured. Results reading a
/// joined navigation are never shared.
pub(crate) fn translate_lambda(
    ctx: &mut CompilationContext<'_>,
    lambda: &Lambda,
    args: Vec<Binding>,
    policy: CollectionPolicy,
    grouped: bool,
) -> QueryResult<Binding> {
    if lambda.arity() != args.len() {
        return Err(QueryError::illegal(
            lambda,
            format!("expects {} arguments, got {}", lambda.arity(), args.len()),
        ));
    }

    let key = match &ctx.cache {
        Some(_) if !grouped => Some(format!("{args:?}|{policy:?}|{lambda}")),
        _ => None,
    };
    if let (Some(cache), Some(key)) = (&ctx.cache, &key) {
        if let Some(expr) = cache.get(key) {
            trace!(lambda = %lambda, "translation cache hit");
            return Ok(Binding::Scalar(expr));
        }
    }

    let own: BTreeSet<String> = args.iter().flat_map(Binding::aliases).map(str::to_owned).collect();
    let joins_before = ctx.statement.source.join_count();
    let params = lambda.params().iter().map(|p| p.name.clone()).zip(args).collect();
    let (binding, crossed) = {
        let mut translator = Translator { ctx: &mut *ctx, params, policy, grouped, crossed: 0 };
        let binding = translator.translate(lambda.body(), Position::default())?;
        (binding, translator.crossed)
    };

    if let (Binding::Scalar(expr), Some(key), Some(cache)) = (&binding, key, &ctx.cache) {
        let local = expr.qualifiers().iter().all(|alias| own.contains(*alias));
        if local && crossed == 0 && ctx.statement.source.join_count() == joins_before {
            cache.insert(key, expr.clone());
        }
    }
    Ok(binding)
}

/// Translates a predicate over the current element.
pub(crate) fn translate_predicate(
    ctx: &mut CompilationContext<'_>,
    predicate: &Lambda,
    policy: CollectionPolicy,
) -> QueryResult<SqlExpr> {
    let element = ctx.binding.clone();
    match translate_lambda(ctx, predicate, vec![element], policy, false)? {
        Binding::Scalar(expr) => Ok(expr),
        _ => Err(QueryError::Translation(format!("'{predicate}' is not a boolean expression"))),
    }
}

impl Translator<'_, '_> {
    fn translate(&mut self, expr: &Expr, pos: Position) -> QueryResult<Binding> {
        match expr {
            Expr::Parameter(name) => self
                .params
                .iter()
                .rev()
                .find(|(n, _)| n == name)
                .map(|(_, binding)| binding.clone())
                .ok_or_else(|| QueryError::illegal(expr, "unknown parameter")),
            Expr::Constant(value @ (Value::Array(_) | Value::Object(_))) => {
                Err(QueryError::Translation(format!("constant {value} has no relational form")))
            }
            Expr::Constant(value) => Ok(Binding::Scalar(SqlExpr::Literal(value.clone()))),
            Expr::Member { target, member } => {
                let target = self.translate(target, pos)?;
                self.member(expr, target, member, pos)
            }
            Expr::Binary { left, op, right } => self.binary(left, *op, right, pos).map(Binding::Scalar),
            Expr::Unary { op, operand } => self.unary(*op, operand, pos).map(Binding::Scalar),
            Expr::Call { function, args } => self.call(function, args, pos).map(Binding::Scalar),
            Expr::Conditional { test, then, otherwise } => Ok(Binding::Scalar(SqlExpr::Case {
                test: Box::new(self.scalar(test, pos.plain())?),
                then: Box::new(self.scalar(then, pos.plain())?),
                otherwise: Box::new(self.scalar(otherwise, pos.plain())?),
            })),
            Expr::Record(fields) => Ok(Binding::View(
                fields
                    .iter()
                    .map(|(name, field)| Ok((name.clone(), self.translate(field, pos.plain())?)))
                    .collect::<QueryResult<Vec<_>>>()?,
            )),
            Expr::InList { expr: tested, list, negated } => Ok(Binding::Scalar(SqlExpr::InList {
                expr: Box::new(self.scalar(tested, pos.operand())?),
                list: list.iter().map(|item| self.scalar(item, pos.plain())).collect::<QueryResult<_>>()?,
                negated: *negated,
            })),
        }
    }

    fn scalar(&mut self, expr: &Expr, pos: Position) -> QueryResult<SqlExpr> {
        match self.translate(expr, pos)? {
            Binding::Scalar(sql) => Ok(sql),
            _ => Err(QueryError::Translation(format!("'{expr}' is not a single value"))),
        }
    }

    fn member(&mut self, expr: &Expr, target: Binding, member: &str, pos: Position) -> QueryResult<Binding> {
        match target {
            Binding::Entity { entity, alias, prefix } => {
                let model: &dyn DomainModel = self.ctx.model;
                match model.member(&entity, member)? {
                    Member::Attribute(attribute) => Ok(attribute_binding(attribute, &alias, &prefix)),
                    Member::Navigation(navigation) => {
                        let kind = self.join_kind(navigation, pos)?;
                        let joined = self.ctx.join_navigation(&alias, &prefix, navigation, kind)?;
                        Ok(Binding::Entity {
                            entity: navigation.target().to_owned(),
                            alias: joined,
                            prefix: String::new(),
                        })
                    }
                }
            }
            Binding::Complex(fields) | Binding::View(fields) => fields
                .into_iter()
                .find(|(name, _)| name == member)
                .map(|(_, binding)| binding)
                .ok_or_else(|| QueryError::illegal(expr, format!("no field '{member}'"))),
            Binding::Grouping { key, element } => {
                if member == GROUP_KEY {
                    Ok(*key)
                } else if pos.in_aggregate {
                    self.member(expr, *element, member, pos)
                } else {
                    Err(QueryError::Translation(format!(
                        "'{expr}' reads group elements outside an aggregate"
                    )))
                }
            }
            Binding::Scalar(_) => Err(QueryError::Translation(format!("'{expr}' has no relational form"))),
        }
    }

    fn join_kind(&mut self, navigation: &Navigation, pos: Position) -> QueryResult<JoinKind> {
        if !navigation.multiplicity().is_many() {
            return Ok(if self.policy == CollectionPolicy::Flatten { JoinKind::Inner } else { JoinKind::LeftOuter });
        }
        match self.policy {
            CollectionPolicy::Flatten => Ok(JoinKind::Inner),
            CollectionPolicy::Existential if pos.operand && !pos.negated && self.crossed == 0 => {
                self.crossed += 1;
                self.ctx.crossed_many = true;
                Ok(JoinKind::LeftOuter)
            }
            _ => Err(QueryError::Translation(format!(
                "collection navigation '{}' has no relational form here",
                navigation.name()
            ))),
        }
    }

    fn binary(&mut self, left: &Expr, op: BinaryOp, right: &Expr, pos: Position) -> QueryResult<SqlExpr> {
        match op {
            BinaryOp::And | BinaryOp::Or => {
                Ok(SqlExpr::binary(self.scalar(left, pos.plain())?, op, self.scalar(right, pos.plain())?))
            }
            BinaryOp::Eq | BinaryOp::NotEq if is_null(left) || is_null(right) => {
                let tested = if is_null(left) { right } else { left };
                let binding = self.translate(tested, pos.operand())?;
                let is_null = self.null_test(&binding)?;
                Ok(if op == BinaryOp::Eq { is_null } else { is_null.not() })
            }
            BinaryOp::Eq | BinaryOp::NotEq => {
                let (l, r) = (self.translate(left, pos.operand())?, self.translate(right, pos.operand())?);
                if let (Binding::Scalar(l), Binding::Scalar(r)) = (&l, &r) {
                    return Ok(SqlExpr::binary(l.clone(), op, r.clone()));
                }
                let model = self.ctx.model;
                let (ls, rs) = (l.scalars(model)?, r.scalars(model)?);
                if ls.len() != rs.len() {
                    return Err(QueryError::Translation(format!(
                        "cannot compare '{left}' with '{right}'"
                    )));
                }
                let equal = SqlExpr::conjunction(ls.into_iter().zip(rs).map(|(l, r)| l.eq(r)))
                    .ok_or_else(|| QueryError::Translation(format!("'{left}' has no columns")))?;
                Ok(if op == BinaryOp::Eq { equal } else { equal.not() })
            }
            _ if op.is_comparison() || op == BinaryOp::Like => Ok(SqlExpr::binary(
                self.scalar(left, pos.operand())?,
                op,
                self.scalar(right, pos.operand())?,
            )),
            _ => Ok(SqlExpr::binary(self.scalar(left, pos)?, op, self.scalar(right, pos)?)),
        }
    }

    fn null_test(&self, binding: &Binding) -> QueryResult<SqlExpr> {
        let scalars = binding.scalars(self.ctx.model)?;
        SqlExpr::conjunction(scalars.into_iter().map(|s| SqlExpr::unary(UnaryOp::IsNull, s)))
            .ok_or_else(|| QueryError::Translation("value has no columns".into()))
    }

    fn unary(&mut self, op: UnaryOp, operand: &Expr, pos: Position) -> QueryResult<SqlExpr> {
        match op {
            UnaryOp::Not => {
                let inner = Position { negated: !pos.negated, ..pos.plain() };
                Ok(self.scalar(operand, inner)?.not())
            }
            UnaryOp::Neg => Ok(SqlExpr::unary(op, self.scalar(operand, pos)?)),
            UnaryOp::IsNull | UnaryOp::IsNotNull => {
                let binding = self.translate(operand, pos.operand())?;
                if let Binding::Scalar(expr) = binding {
                    return Ok(SqlExpr::unary(op, expr));
                }
                let is_null = self.null_test(&binding)?;
                Ok(if op == UnaryOp::IsNull { is_null } else { is_null.not() })
            }
        }
    }

    fn call(&mut self, function: &str, args: &[Expr], pos: Position) -> QueryResult<SqlExpr> {
        let Some(builtin) = Builtin::parse(function) else {
            return Err(QueryError::Translation(format!("function '{function}' has no relational equivalent")));
        };
        if !builtin.is_aggregate() {
            let args = args.iter().map(|a| self.scalar(a, pos.plain())).collect::<QueryResult<_>>()?;
            return Ok(SqlExpr::Function { name: builtin.name().to_owned(), args });
        }

        if !self.grouped || pos.in_aggregate {
            return Err(QueryError::Translation(format!(
                "aggregate '{}' needs a grouped source",
                builtin.name()
            )));
        }
        let function = AggregateFunction::from_builtin(builtin)
            .ok_or_else(|| QueryError::Translation(format!("'{}' is not an aggregate", builtin.name())))?;
        if function == AggregateFunction::Count {
            return Ok(SqlExpr::count_star());
        }
        let [arg] = args else {
            return Err(QueryError::illegal(function.name(), "an aggregate takes one argument"));
        };
        let inner = Position { in_aggregate: true, operand: false, negated: false };
        Ok(SqlExpr::aggregate(function, self.scalar(arg, inner)?))
    }
}

fn is_null(expr: &Expr) -> bool {
    matches!(expr, Expr::Constant(Value::Null))
}
