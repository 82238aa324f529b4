//! Relational scalar expressions.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use strata_core::Value;

use super::OrderItem;
use crate::chain::ArithFunction;
use crate::expr::{BinaryOp, Builtin, UnaryOp};

/// An aggregate function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateFunction {
    /// COUNT.
    Count,
    /// SUM.
    Sum,
    /// AVG.
    Avg,
    /// MIN.
    Min,
    /// MAX.
    Max,
}

impl AggregateFunction {
    /// The aggregate a built-in function denotes, if any.
    #[must_use]
    pub const fn from_builtin(builtin: Builtin) -> Option<Self> {
        match builtin {
            Builtin::Count => Some(Self::Count),
            Builtin::Sum => Some(Self::Sum),
            Builtin::Avg => Some(Self::Avg),
            Builtin::Min => Some(Self::Min),
            Builtin::Max => Some(Self::Max),
            _ => None,
        }
    }

    /// The built-in implementing this aggregate in memory.
    #[must_use]
    pub const fn builtin(self) -> Builtin {
        match self {
            Self::Count => Builtin::Count,
            Self::Sum => Builtin::Sum,
            Self::Avg => Builtin::Avg,
            Self::Min => Builtin::Min,
            Self::Max => Builtin::Max,
        }
    }

    /// SQL keyword.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
        }
    }
}

impl From<ArithFunction> for AggregateFunction {
    fn from(function: ArithFunction) -> Self {
        match function {
            ArithFunction::Sum => Self::Sum,
            ArithFunction::Average => Self::Avg,
            ArithFunction::Max => Self::Max,
            ArithFunction::Min => Self::Min,
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A scalar expression over the columns of a statement's sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlExpr {
    /// A column, optionally qualified by a source alias.
    Column {
        /// Source alias.
        qualifier: Option<String>,
        /// Column name.
        name: String,
    },
    /// A literal.
    Literal(Value),
    /// A binary operation.
    Binary {
        /// Left operand.
        left: Box<SqlExpr>,
        /// Operator.
        op: BinaryOp,
        /// Right operand.
        right: Box<SqlExpr>,
    },
    /// A unary operation.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<SqlExpr>,
    },
    /// A scalar function call.
    Function {
        /// Lower-case function name.
        name: String,
        /// Arguments.
        args: Vec<SqlExpr>,
    },
    /// An aggregate; `COUNT(*)` has no argument.
    Aggregate {
        /// The aggregate.
        function: AggregateFunction,
        /// Aggregated expression.
        arg: Option<Box<SqlExpr>>,
        /// Aggregate over distinct values only.
        distinct: bool,
    },
    /// `ROW_NUMBER() OVER (ORDER BY ...)`.
    RowNumber {
        /// Window ordering.
        order_by: Vec<OrderItem>,
    },
    /// `CASE WHEN test THEN then ELSE otherwise END`.
    Case {
        /// Condition.
        test: Box<SqlExpr>,
        /// Value when the condition holds.
        then: Box<SqlExpr>,
        /// Value otherwise.
        otherwise: Box<SqlExpr>,
    },
    /// `expr [NOT] IN (list)`.
    InList {
        /// Tested expression.
        expr: Box<SqlExpr>,
        /// Candidates.
        list: Vec<SqlExpr>,
        /// `NOT IN` when true.
        negated: bool,
    },
}

impl SqlExpr {
    /// A qualified column.
    #[must_use]
    pub fn column(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Column { qualifier: Some(qualifier.into()), name: name.into() }
    }

    /// An unqualified column.
    #[must_use]
    pub fn bare(name: impl Into<String>) -> Self {
        Self::Column { qualifier: None, name: name.into() }
    }

    /// A literal.
    #[must_use]
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// A binary operation.
    #[must_use]
    pub fn binary(left: SqlExpr, op: BinaryOp, right: SqlExpr) -> Self {
        Self::Binary { left: Box::new(left), op, right: Box::new(right) }
    }

    /// A unary operation.
    #[must_use]
    pub fn unary(op: UnaryOp, operand: SqlExpr) -> Self {
        Self::Unary { op, operand: Box::new(operand) }
    }

    #[must_use]
    pub fn and(self, other: SqlExpr) -> Self {
        Self::binary(self, BinaryOp::And, other)
    }

    #[must_use]
    pub fn eq(self, other: SqlExpr) -> Self {
        Self::binary(self, BinaryOp::Eq, other)
    }

    #[must_use]
    pub fn not(self) -> Self {
        Self::unary(UnaryOp::Not, self)
    }

    /// `COUNT(*)`.
    #[must_use]
    pub const fn count_star() -> Self {
        Self::Aggregate { function: AggregateFunction::Count, arg: None, distinct: false }
    }

    /// An aggregate over `arg`.
    #[must_use]
    pub fn aggregate(function: AggregateFunction, arg: SqlExpr) -> Self {
        Self::Aggregate { function, arg: Some(Box::new(arg)), distinct: false }
    }

    /// Combines terms with AND.
    #[must_use]
    pub fn conjunction(terms: impl IntoIterator<Item = SqlExpr>) -> Option<SqlExpr> {
        terms.into_iter().reduce(SqlExpr::and)
    }

    /// Returns true when the expression contains an aggregate.
    #[must_use]
    pub fn has_aggregate(&self) -> bool {
        matches!(self, Self::Aggregate { .. }) || self.children().iter().any(|c| c.has_aggregate())
    }

    /// Returns true when the expression contains a window function.
    #[must_use]
    pub fn has_window(&self) -> bool {
        matches!(self, Self::RowNumber { .. }) || self.children().iter().any(|c| c.has_window())
    }

    /// Direct children.
    #[must_use]
    pub fn children(&self) -> Vec<&SqlExpr> {
        match self {
            Self::Column { .. } | Self::Literal(_) => Vec::new(),
            Self::Binary { left, right, .. } => vec![&**left, &**right],
            Self::Unary { operand, .. } => vec![&**operand],
            Self::Function { args, .. } => args.iter().collect(),
            Self::Aggregate { arg, .. } => arg.iter().map(|a| &**a).collect(),
            Self::RowNumber { order_by } => order_by.iter().map(|o| &o.expr).collect(),
            Self::Case { test, then, otherwise } => vec![&**test, &**then, &**otherwise],
            Self::InList { expr, list, .. } => std::iter::once(&**expr).chain(list).collect(),
        }
    }

    /// Every source alias the expression refers to.
    #[must_use]
    pub fn qualifiers(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_qualifiers(&mut out);
        out
    }

    fn collect_qualifiers<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        if let Self::Column { qualifier: Some(q), .. } = self {
            out.insert(q.as_str());
        }
        for child in self.children() {
            child.collect_qualifiers(out);
        }
    }
}

fn write_literal(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::Null => write!(f, "NULL"),
        Value::Bool(true) => write!(f, "TRUE"),
        Value::Bool(false) => write!(f, "FALSE"),
        Value::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
        other => write!(f, "{other}"),
    }
}

pub(super) fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for SqlExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column { qualifier: Some(q), name } => write!(f, "{q}.{name}"),
            Self::Column { qualifier: None, name } => write!(f, "{name}"),
            Self::Literal(value) => write_literal(f, value),
            Self::Binary { left, op, right } => write!(f, "({left} {op} {right})"),
            Self::Unary { op, operand } => match op {
                UnaryOp::Not => write!(f, "NOT {operand}"),
                UnaryOp::Neg => write!(f, "-{operand}"),
                UnaryOp::IsNull => write!(f, "({operand} IS NULL)"),
                UnaryOp::IsNotNull => write!(f, "({operand} IS NOT NULL)"),
            },
            Self::Function { name, args } => {
                write!(f, "{}(", name.to_uppercase())?;
                write_list(f, args)?;
                write!(f, ")")
            }
            Self::Aggregate { function, arg: None, .. } => write!(f, "{function}(*)"),
            Self::Aggregate { function, arg: Some(arg), distinct } => {
                write!(f, "{function}({}{arg})", if *distinct { "DISTINCT " } else { "" })
            }
            Self::RowNumber { order_by } => {
                write!(f, "ROW_NUMBER() OVER (ORDER BY ")?;
                write_list(f, order_by)?;
                write!(f, ")")
            }
            Self::Case { test, then, otherwise } => {
                write!(f, "CASE WHEN {test} THEN {then} ELSE {otherwise} END")
            }
            Self::InList { expr, list, negated } => {
                write!(f, "({expr} {}IN (", if *negated { "NOT " } else { "" })?;
                write_list(f, list)?;
                write!(f, "))")
            }
        }
    }
}
