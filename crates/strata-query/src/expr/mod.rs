//! Lambda expressions captured from query operators.
//!
//! Every selector, predicate and key of a query operator is a [`Lambda`]: a
//! typed parameter list and an [`Expr`] body. The body is a small expression
//! tree over parameters, constants, member accesses, operators and function
//! calls. It is translated to a relational expression by the compiler and
//! evaluated directly by the in-memory pipeline when translation fails.

// Allow arithmetic method names that match std traits - these build new
// expressions rather than implementing the operators
#![allow(clippy::should_implement_trait)]

mod eval;
mod function;
mod infer;
mod text;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use strata_core::{DomainModel, HostType, Value};

pub use eval::{Evaluator, HostFunction, HostFunctions};
pub(crate) use eval::{aggregate, binary, call_builtin, grouping_value, unary, GROUP_ELEMENTS, GROUP_KEY};
pub use function::Builtin;
pub use infer::TypeScope;
pub use text::UntypedLambda;

use crate::error::QueryResult;

/// A binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    /// Addition (`+`).
    Add,
    /// Subtraction (`-`).
    Sub,
    /// Multiplication (`*`).
    Mul,
    /// Division (`/`).
    Div,
    /// Remainder (`%`).
    Mod,
    /// Equality (`=`).
    Eq,
    /// Inequality (`<>`).
    NotEq,
    /// Less than.
    Lt,
    /// Less than or equal.
    LtEq,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    GtEq,
    /// Logical conjunction.
    And,
    /// Logical disjunction.
    Or,
    /// Pattern match with `%` and `_` wildcards.
    Like,
}

impl BinaryOp {
    /// Returns true for comparison operators.
    #[must_use]
    pub const fn is_comparison(self) -> bool {
        matches!(self, Self::Eq | Self::NotEq | Self::Lt | Self::LtEq | Self::Gt | Self::GtEq)
    }

    /// Returns true for arithmetic operators.
    #[must_use]
    pub const fn is_arithmetic(self) -> bool {
        matches!(self, Self::Add | Self::Sub | Self::Mul | Self::Div | Self::Mod)
    }

    /// The comparison that holds exactly when this one does not.
    #[must_use]
    pub const fn inverse(self) -> Option<Self> {
        match self {
            Self::Eq => Some(Self::NotEq),
            Self::NotEq => Some(Self::Eq),
            Self::Lt => Some(Self::GtEq),
            Self::LtEq => Some(Self::Gt),
            Self::Gt => Some(Self::LtEq),
            Self::GtEq => Some(Self::Lt),
            _ => None,
        }
    }

    /// The operator's textual symbol.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Like => "LIKE",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A unary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    /// Logical negation.
    Not,
    /// Arithmetic negation.
    Neg,
    /// Null test.
    IsNull,
    /// Non-null test.
    IsNotNull,
}

/// An expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A lambda parameter.
    Parameter(String),
    /// A constant value.
    Constant(Value),
    /// Member access on an entity, record or grouping.
    Member {
        /// The accessed expression.
        target: Box<Expr>,
        /// Member name.
        member: String,
    },
    /// A binary operation.
    Binary {
        /// Left operand.
        left: Box<Expr>,
        /// Operator.
        op: BinaryOp,
        /// Right operand.
        right: Box<Expr>,
    },
    /// A unary operation.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Expr>,
    },
    /// A function call, built-in or host-registered.
    Call {
        /// Function name, lower case.
        function: String,
        /// Arguments.
        args: Vec<Expr>,
    },
    /// `test ? then : otherwise`.
    Conditional {
        /// Condition.
        test: Box<Expr>,
        /// Value when the condition holds.
        then: Box<Expr>,
        /// Value otherwise.
        otherwise: Box<Expr>,
    },
    /// Construction of an anonymous record (a view).
    Record(Vec<(String, Expr)>),
    /// Membership in a list of expressions.
    InList {
        /// Tested expression.
        expr: Box<Expr>,
        /// Candidate values.
        list: Vec<Expr>,
        /// `NOT IN` when true.
        negated: bool,
    },
}

impl Expr {
    /// A parameter reference.
    #[must_use]
    pub fn param(name: impl Into<String>) -> Self {
        Self::Parameter(name.into())
    }

    /// A constant.
    #[must_use]
    pub fn constant(value: impl Into<Value>) -> Self {
        Self::Constant(value.into())
    }

    /// An integer constant.
    #[must_use]
    pub const fn int(value: i64) -> Self {
        Self::Constant(Value::Int(value))
    }

    /// A string constant.
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self::Constant(Value::String(value.into()))
    }

    /// A boolean constant.
    #[must_use]
    pub const fn boolean(value: bool) -> Self {
        Self::Constant(Value::Bool(value))
    }

    /// The null constant.
    #[must_use]
    pub const fn null() -> Self {
        Self::Constant(Value::Null)
    }

    /// Accesses a member of this expression.
    #[must_use]
    pub fn member(self, member: impl Into<String>) -> Self {
        Self::Member { target: Box::new(self), member: member.into() }
    }

    /// Builds a member path `param.a.b.c`.
    #[must_use]
    pub fn path(param: impl Into<String>, members: &[&str]) -> Self {
        members.iter().fold(Self::param(param), |expr, m| expr.member(*m))
    }

    /// A function call.
    #[must_use]
    pub fn call(function: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Call { function: function.into().to_lowercase(), args }
    }

    /// A record construction.
    #[must_use]
    pub fn record<K: Into<String>>(fields: impl IntoIterator<Item = (K, Expr)>) -> Self {
        Self::Record(fields.into_iter().map(|(k, e)| (k.into(), e)).collect())
    }

    /// A conditional.
    #[must_use]
    pub fn conditional(test: Expr, then: Expr, otherwise: Expr) -> Self {
        Self::Conditional {
            test: Box::new(test),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    fn binary(self, op: BinaryOp, other: Self) -> Self {
        Self::Binary { left: Box::new(self), op, right: Box::new(other) }
    }

    fn unary(self, op: UnaryOp) -> Self {
        Self::Unary { op, operand: Box::new(self) }
    }

    /// `self AND other`.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        self.binary(BinaryOp::And, other)
    }

    /// `self OR other`.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        self.binary(BinaryOp::Or, other)
    }

    /// `self = other`.
    #[must_use]
    pub fn eq(self, other: Self) -> Self {
        self.binary(BinaryOp::Eq, other)
    }

    /// `self <> other`.
    #[must_use]
    pub fn not_eq(self, other: Self) -> Self {
        self.binary(BinaryOp::NotEq, other)
    }

    /// `self < other`.
    #[must_use]
    pub fn lt(self, other: Self) -> Self {
        self.binary(BinaryOp::Lt, other)
    }

    /// `self <= other`.
    #[must_use]
    pub fn lt_eq(self, other: Self) -> Self {
        self.binary(BinaryOp::LtEq, other)
    }

    /// `self > other`.
    #[must_use]
    pub fn gt(self, other: Self) -> Self {
        self.binary(BinaryOp::Gt, other)
    }

    /// `self >= other`.
    #[must_use]
    pub fn gt_eq(self, other: Self) -> Self {
        self.binary(BinaryOp::GtEq, other)
    }

    /// `self + other`.
    #[must_use]
    pub fn add(self, other: Self) -> Self {
        self.binary(BinaryOp::Add, other)
    }

    /// `self - other`.
    #[must_use]
    pub fn sub(self, other: Self) -> Self {
        self.binary(BinaryOp::Sub, other)
    }

    /// `self * other`.
    #[must_use]
    pub fn mul(self, other: Self) -> Self {
        self.binary(BinaryOp::Mul, other)
    }

    /// `self LIKE pattern`.
    #[must_use]
    pub fn like(self, pattern: Self) -> Self {
        self.binary(BinaryOp::Like, pattern)
    }

    /// `NOT self`.
    #[must_use]
    pub fn not(self) -> Self {
        self.unary(UnaryOp::Not)
    }

    /// `-self`.
    #[must_use]
    pub fn neg(self) -> Self {
        self.unary(UnaryOp::Neg)
    }

    /// `self IS NULL`.
    #[must_use]
    pub fn is_null(self) -> Self {
        self.unary(UnaryOp::IsNull)
    }

    /// `self IS NOT NULL`.
    #[must_use]
    pub fn is_not_null(self) -> Self {
        self.unary(UnaryOp::IsNotNull)
    }

    /// `self IN (list)`.
    #[must_use]
    pub fn in_list(self, list: Vec<Expr>, negated: bool) -> Self {
        Self::InList { expr: Box::new(self), list, negated }
    }

    /// If this is a pure member chain rooted at a parameter, returns the
    /// parameter name and the member names from the root outwards.
    #[must_use]
    pub fn as_member_path(&self) -> Option<(&str, Vec<&str>)> {
        match self {
            Self::Parameter(name) => Some((name.as_str(), Vec::new())),
            Self::Member { target, member } => {
                let (root, mut path) = target.as_member_path()?;
                path.push(member.as_str());
                Some((root, path))
            }
            _ => None,
        }
    }

    /// Direct child expressions.
    #[must_use]
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Self::Parameter(_) | Self::Constant(_) => Vec::new(),
            Self::Member { target, .. } => vec![target.as_ref()],
            Self::Binary { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Self::Unary { operand, .. } => vec![operand.as_ref()],
            Self::Call { args, .. } => args.iter().collect(),
            Self::Conditional { test, then, otherwise } => {
                vec![test.as_ref(), then.as_ref(), otherwise.as_ref()]
            }
            Self::Record(fields) => fields.iter().map(|(_, e)| e).collect(),
            Self::InList { expr, list, .. } => {
                std::iter::once(expr.as_ref()).chain(list.iter()).collect()
            }
        }
    }

    /// Names of all parameters referenced by this expression.
    #[must_use]
    pub fn free_parameters(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_parameters(&mut out);
        out
    }

    fn collect_parameters<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        if let Self::Parameter(name) = self {
            out.insert(name.as_str());
        }
        for child in self.children() {
            child.collect_parameters(out);
        }
    }

    /// All maximal member chains rooted at a parameter.
    ///
    /// `x.customer.name = y.name` yields `x.customer.name` and `y.name`; the
    /// bare prefix `x.customer` is not reported separately.
    #[must_use]
    pub fn member_accesses(&self) -> Vec<MemberAccess> {
        let mut out = Vec::new();
        self.collect_accesses(&mut out);
        out
    }

    fn collect_accesses(&self, out: &mut Vec<MemberAccess>) {
        if let Self::Member { .. } = self {
            if let Some((root, path)) = self.as_member_path() {
                let access = MemberAccess {
                    parameter: root.to_owned(),
                    path: path.into_iter().map(str::to_owned).collect(),
                };
                if !out.contains(&access) {
                    out.push(access);
                }
                return;
            }
        }
        for child in self.children() {
            child.collect_accesses(out);
        }
    }

    /// Splits a conjunction into its terms.
    #[must_use]
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match self {
            Self::Binary { left, op: BinaryOp::And, right } => {
                let mut terms = left.conjuncts();
                terms.extend(right.conjuncts());
                terms
            }
            other => vec![other],
        }
    }

    /// Combines terms with AND, or returns `None` for no terms.
    #[must_use]
    pub fn conjunction(terms: impl IntoIterator<Item = Expr>) -> Option<Expr> {
        terms.into_iter().reduce(Expr::and)
    }

    /// Combines terms with OR, or returns `None` for no terms.
    #[must_use]
    pub fn disjunction(terms: impl IntoIterator<Item = Expr>) -> Option<Expr> {
        terms.into_iter().reduce(Expr::or)
    }

    /// The logical complement of this expression, with NOT pushed down to
    /// the leaves through De Morgan's laws and inverted comparisons.
    #[must_use]
    pub fn negate(&self) -> Expr {
        match self {
            Self::Constant(Value::Bool(b)) => Self::boolean(!b),
            Self::Unary { op: UnaryOp::Not, operand } => operand.as_ref().clone(),
            Self::Unary { op: UnaryOp::IsNull, operand } => operand.as_ref().clone().is_not_null(),
            Self::Unary { op: UnaryOp::IsNotNull, operand } => operand.as_ref().clone().is_null(),
            Self::Binary { left, op: BinaryOp::And, right } => left.negate().or(right.negate()),
            Self::Binary { left, op: BinaryOp::Or, right } => left.negate().and(right.negate()),
            Self::Binary { left, op, right } => match op.inverse() {
                Some(inverse) => Self::Binary { left: left.clone(), op: inverse, right: right.clone() },
                None => self.clone().not(),
            },
            Self::InList { expr, list, negated } => {
                Self::InList { expr: expr.clone(), list: list.clone(), negated: !negated }
            }
            _ => self.clone().not(),
        }
    }

    /// Replaces every reference to `parameter` with `replacement`.
    #[must_use]
    pub fn substitute(&self, parameter: &str, replacement: &Expr) -> Expr {
        let sub = |e: &Expr| Box::new(e.substitute(parameter, replacement));
        match self {
            Self::Parameter(name) if name == parameter => replacement.clone(),
            Self::Parameter(_) | Self::Constant(_) => self.clone(),
            Self::Member { target, member } => {
                Self::Member { target: sub(target), member: member.clone() }
            }
            Self::Binary { left, op, right } => {
                Self::Binary { left: sub(left), op: *op, right: sub(right) }
            }
            Self::Unary { op, operand } => Self::Unary { op: *op, operand: sub(operand) },
            Self::Call { function, args } => Self::Call {
                function: function.clone(),
                args: args.iter().map(|a| a.substitute(parameter, replacement)).collect(),
            },
            Self::Conditional { test, then, otherwise } => {
                Self::Conditional { test: sub(test), then: sub(then), otherwise: sub(otherwise) }
            }
            Self::Record(fields) => Self::Record(
                fields
                    .iter()
                    .map(|(n, e)| (n.clone(), e.substitute(parameter, replacement)))
                    .collect(),
            ),
            Self::InList { expr, list, negated } => Self::InList {
                expr: sub(expr),
                list: list.iter().map(|e| e.substitute(parameter, replacement)).collect(),
                negated: *negated,
            },
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parameter(name) => write!(f, "{name}"),
            Self::Constant(value) => write!(f, "{value}"),
            Self::Member { target, member } => write!(f, "{target}.{member}"),
            Self::Binary { left, op, right } => write!(f, "({left} {op} {right})"),
            Self::Unary { op, operand } => match op {
                UnaryOp::Not => write!(f, "NOT {operand}"),
                UnaryOp::Neg => write!(f, "-{operand}"),
                UnaryOp::IsNull => write!(f, "({operand} IS NULL)"),
                UnaryOp::IsNotNull => write!(f, "({operand} IS NOT NULL)"),
            },
            Self::Call { function, args } => {
                write!(f, "{function}(")?;
                write_list(f, args)?;
                write!(f, ")")
            }
            Self::Conditional { test, then, otherwise } => {
                write!(f, "CASE WHEN {test} THEN {then} ELSE {otherwise} END")
            }
            Self::Record(fields) => {
                write!(f, "{{")?;
                for (i, (name, expr)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {expr}")?;
                }
                write!(f, "}}")
            }
            Self::InList { expr, list, negated } => {
                write!(f, "({expr} {}IN (", if *negated { "NOT " } else { "" })?;
                write_list(f, list)?;
                write!(f, "))")
            }
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// A member chain rooted at a lambda parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberAccess {
    /// The root parameter.
    pub parameter: String,
    /// Member names from the root outwards.
    pub path: Vec<String>,
}

/// A member chain rooted at a typed value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessPath {
    /// Type of the root value.
    pub root: HostType,
    /// Member names from the root outwards.
    pub path: Vec<String>,
}

/// A typed lambda parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Parameter name.
    pub name: String,
    /// Parameter type.
    pub ty: HostType,
}

impl Param {
    /// Creates a parameter.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: HostType) -> Self {
        Self { name: name.into(), ty }
    }
}

/// A typed function literal.
#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    params: Vec<Param>,
    body: Expr,
    return_type: HostType,
}

impl Lambda {
    /// Creates a lambda with an explicit return type.
    #[must_use]
    pub fn new(params: Vec<Param>, body: Expr, return_type: HostType) -> Self {
        Self { params, body, return_type }
    }

    /// Creates a single-parameter lambda.
    #[must_use]
    pub fn unary(name: impl Into<String>, ty: HostType, body: Expr, return_type: HostType) -> Self {
        Self::new(vec![Param::new(name, ty)], body, return_type)
    }

    /// Creates a lambda whose return type is inferred against the model.
    pub fn typed(params: Vec<Param>, body: Expr, model: &dyn DomainModel) -> QueryResult<Self> {
        let scope = params
            .iter()
            .fold(TypeScope::new(model), |scope, p| scope.with_param(p.name.clone(), p.ty.clone()));
        let return_type = scope.infer(&body)?;
        Ok(Self { params, body, return_type })
    }

    /// The parameters.
    #[must_use]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// The parameter at `index`.
    #[must_use]
    pub fn param(&self, index: usize) -> Option<&Param> {
        self.params.get(index)
    }

    /// Number of parameters.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// The body expression.
    #[must_use]
    pub const fn body(&self) -> &Expr {
        &self.body
    }

    /// The return type.
    #[must_use]
    pub const fn return_type(&self) -> &HostType {
        &self.return_type
    }

    /// Returns true when the body is a member chain rooted at the first
    /// parameter.
    #[must_use]
    pub fn is_member_path(&self) -> bool {
        match (self.body.as_member_path(), self.params.first()) {
            (Some((root, path)), Some(param)) => root == param.name && !path.is_empty(),
            _ => false,
        }
    }

    /// Member accesses of the body, rooted at the parameters' types.
    #[must_use]
    pub fn access_paths(&self) -> Vec<AccessPath> {
        self.body
            .member_accesses()
            .into_iter()
            .filter_map(|access| {
                self.params.iter().find(|p| p.name == access.parameter).map(|p| AccessPath {
                    root: p.ty.clone(),
                    path: access.path,
                })
            })
            .collect()
    }

    /// A predicate that holds exactly when this one does not.
    #[must_use]
    pub fn negated(&self) -> Lambda {
        Self { params: self.params.clone(), body: self.body.negate(), return_type: HostType::Bool }
    }

    /// A copy with a different body, keeping parameters and return type.
    #[must_use]
    pub fn with_body(&self, body: Expr) -> Lambda {
        Self { params: self.params.clone(), body, return_type: self.return_type.clone() }
    }
}

impl fmt::Display for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.params.as_slice() {
            [single] => write!(f, "{} => {}", single.name, self.body),
            params => {
                write!(f, "(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p.name)?;
                }
                write!(f, ") => {}", self.body)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_path_roundtrip() {
        let expr = Expr::path("x", &["customer", "name"]);
        assert_eq!(expr.to_string(), "x.customer.name");
        assert_eq!(expr.as_member_path(), Some(("x", vec!["customer", "name"])));
        assert_eq!(Expr::int(1).as_member_path(), None);
    }

    #[test]
    fn member_accesses_are_maximal() {
        let expr = Expr::path("x", &["customer", "name"])
            .eq(Expr::path("y", &["name"]))
            .and(Expr::path("x", &["customer", "name"]).is_not_null());
        let accesses = expr.member_accesses();
        assert_eq!(accesses.len(), 2);
        assert_eq!(accesses[0].path, vec!["customer", "name"]);
        assert_eq!(accesses[1].parameter, "y");
    }

    #[test]
    fn negation_pushes_through_connectives() {
        let a = Expr::path("x", &["a"]).gt(Expr::int(1));
        let b = Expr::path("x", &["b"]).eq(Expr::string("z"));
        let negated = a.clone().and(b.clone()).negate();
        assert_eq!(negated.to_string(), "((x.a <= 1) OR (x.b <> 'z'))");
        assert_eq!(a.negate().negate(), a);
        assert_eq!(Expr::path("x", &["active"]).negate().to_string(), "NOT x.active");
    }

    #[test]
    fn conjunct_split_and_combine() {
        let a = Expr::path("x", &["a"]);
        let b = Expr::path("x", &["b"]);
        let c = Expr::path("x", &["c"]);
        let expr = a.clone().and(b.clone()).and(c.clone());
        assert_eq!(expr.conjuncts(), vec![&a, &b, &c]);
        assert_eq!(Expr::conjunction(vec![a, b, c]), Some(expr));
        assert_eq!(Expr::conjunction(Vec::new()), None);
    }

    #[test]
    fn substitute_replaces_parameter() {
        let expr = Expr::path("x", &["id"]).gt(Expr::int(1));
        let replaced = expr.substitute("x", &Expr::param("y"));
        assert_eq!(replaced.to_string(), "(y.id > 1)");
    }

    #[test]
    fn lambda_display_and_paths() {
        let lambda = Lambda::unary(
            "x",
            HostType::entity("User"),
            Expr::path("x", &["id"]).gt(Expr::int(1)),
            HostType::Bool,
        );
        assert_eq!(lambda.to_string(), "x => (x.id > 1)");
        let paths = lambda.access_paths();
        assert_eq!(paths[0].root, HostType::entity("User"));
        assert_eq!(paths[0].path, vec!["id"]);
        assert!(!lambda.is_member_path());
        assert_eq!(lambda.negated().to_string(), "x => (x.id <= 1)");
    }
}
