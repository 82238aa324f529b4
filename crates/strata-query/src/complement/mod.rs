//! The complementary pipeline.
//!
//! Whatever part of a query the relational statement cannot guarantee runs
//! here, over the values read back from the statement's rows. A compiled
//! query carries its residual work as a list of [`ComplementaryStep`]s;
//! [`build`] turns them into a chain of pull-based operators.

mod operator;
mod operators;
mod sequence;

use std::fmt;

use strata_core::{HostType, Value};
use tracing::debug;

pub use operator::{BoxedOperator, Operator, OperatorBase, OperatorState};

use self::operators::{
    BufferedOp, CountCheckOp, ElementOp, FilterOp, RegroupOp, ScalarOp, SingleOp, SortOp, SourceOp,
};
use crate::chain::{Query, QueryOperation};
use crate::error::QueryResult;
use crate::exec::ExecutionContext;
use crate::expr::Lambda;

/// What a scalar read does when the aggregated column is null.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullPolicy {
    /// Read the host default of the target type.
    Zero,
    /// Keep the null.
    Null,
    /// Fail: the aggregated sequence was empty.
    Fail,
}

/// One in-memory step applied to the materialized rows.
#[derive(Debug, Clone, PartialEq)]
pub enum ComplementaryStep {
    /// An operator with no relational form, run with its full semantics.
    Operator {
        /// The operator.
        operation: QueryOperation,
        /// Type of the elements the operator consumes.
        element: HostType,
    },
    /// Keeps elements satisfying the predicate.
    Filter(Lambda),
    /// Stable sort by the accumulated ordering keys.
    Sort {
        /// Key and descending flag, most significant first.
        keys: Vec<(Lambda, bool)>,
    },
    /// Extracts the first remaining element.
    Element {
        /// Return `default` instead of failing on an empty sequence.
        or_default: bool,
        /// The host default of the element type.
        default: Value,
    },
    /// Extracts the only remaining element.
    Single {
        /// Return `default` instead of failing on an empty sequence.
        or_default: bool,
        /// The host default of the element type.
        default: Value,
    },
    /// Turns a row count into a boolean.
    CountCheck {
        /// True when the answer is "the count is zero".
        expect_zero: bool,
    },
    /// Reads the single aggregated value.
    Scalar {
        /// Type of the value.
        target: HostType,
        /// Handling of a null aggregate.
        on_null: NullPolicy,
    },
    /// Rebuilds groups from `{key, elements}` rows, one row per element.
    Regroup,
}

impl ComplementaryStep {
    /// Returns true for steps that only read back what the statement
    /// already computed.
    #[must_use]
    pub const fn is_residual(&self) -> bool {
        matches!(self, Self::Element { .. } | Self::Single { .. } | Self::CountCheck { .. } | Self::Scalar { .. })
    }
}

impl fmt::Display for ComplementaryStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operator { operation, .. } => write!(f, "{}", operation.kind()),
            Self::Filter(predicate) => write!(f, "Filter({predicate})"),
            Self::Sort { keys } => {
                write!(f, "Sort(")?;
                for (i, (key, descending)) in keys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}{}", if *descending { " desc" } else { "" })?;
                }
                write!(f, ")")
            }
            Self::Element { or_default, .. } => write!(f, "Element(or_default={or_default})"),
            Self::Single { or_default, .. } => write!(f, "Single(or_default={or_default})"),
            Self::CountCheck { expect_zero } => {
                write!(f, "CountCheck({})", if *expect_zero { "= 0" } else { "> 0" })
            }
            Self::Scalar { target, on_null } => write!(f, "Scalar({target}, {on_null:?})"),
            Self::Regroup => write!(f, "Regroup"),
        }
    }
}

/// Materializes the sub-queries in-memory operators consume.
pub trait SubqueryRunner {
    /// Runs `query` to a sequence of values.
    fn run(&self, query: &Query) -> QueryResult<Vec<Value>>;
}

/// Builds the operator chain for `steps` over `source`.
///
/// Sub-queries are run eagerly, before the chain is opened.
pub fn build(steps: &[ComplementaryStep], source: Vec<Value>, runner: &dyn SubqueryRunner) -> QueryResult<BoxedOperator> {
    let mut op: BoxedOperator = Box::new(SourceOp::new(source));
    for step in steps {
        op = match step {
            ComplementaryStep::Operator { operation, element } => {
                let operands =
                    operation.subqueries().into_iter().map(|q| runner.run(q)).collect::<QueryResult<Vec<_>>>()?;
                Box::new(BufferedOp::new(operation.clone(), element.clone(), operands, op))
            }
            ComplementaryStep::Filter(predicate) => Box::new(FilterOp::new(predicate.clone(), op)),
            ComplementaryStep::Sort { keys } => Box::new(SortOp::new(keys.clone(), op)),
            ComplementaryStep::Element { or_default, default } => {
                Box::new(ElementOp::new(*or_default, default.clone(), op))
            }
            ComplementaryStep::Single { or_default, default } => {
                Box::new(SingleOp::new(*or_default, default.clone(), op))
            }
            ComplementaryStep::CountCheck { expect_zero } => Box::new(CountCheckOp::new(*expect_zero, op)),
            ComplementaryStep::Scalar { target, on_null } => Box::new(ScalarOp::new(target.clone(), *on_null, op)),
            ComplementaryStep::Regroup => Box::new(RegroupOp::new(op)),
        };
    }
    Ok(op)
}

/// Builds and drains the operator chain for `steps`.
pub fn run(
    steps: &[ComplementaryStep],
    source: Vec<Value>,
    runner: &dyn SubqueryRunner,
    ctx: &ExecutionContext,
) -> QueryResult<Vec<Value>> {
    let mut op = build(steps, source, runner)?;
    op.open(ctx)?;
    let mut out = Vec::new();
    let drained = drain(op.as_mut(), &mut out);
    let closed = op.close();
    drained?;
    closed?;
    ctx.record_rows_produced(out.len() as u64);
    debug!(steps = steps.len(), produced = out.len(), "ran complementary pipeline");
    Ok(out)
}

fn drain(op: &mut dyn Operator, out: &mut Vec<Value>) -> QueryResult<()> {
    while let Some(value) = op.next()? {
        out.push(value);
    }
    Ok(())
}
