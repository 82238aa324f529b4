//! Operators of the complementary pipeline.

use std::sync::Arc;

use strata_core::{HostType, Value};

use super::operator::{BoxedOperator, Operator, OperatorBase, OperatorState};
use super::sequence::{self, group_pairs, MORE_THAN_ONE, NO_ELEMENTS};
use super::NullPolicy;
use crate::chain::QueryOperation;
use crate::error::{QueryError, QueryResult};
use crate::exec::ExecutionContext;
use crate::expr::{grouping_value, Evaluator, HostFunctions, Lambda, GROUP_ELEMENTS, GROUP_KEY};

/// Drains `input`, failing once more than `limit` values are buffered.
fn buffer(input: &mut dyn Operator, limit: usize) -> QueryResult<Vec<Value>> {
    let mut values = Vec::new();
    while let Some(value) = input.next()? {
        values.push(value);
        if limit > 0 && values.len() > limit {
            return Err(QueryError::QueryTooLarge { actual: values.len(), limit });
        }
    }
    Ok(values)
}

fn functions(slot: &Option<Arc<HostFunctions>>) -> QueryResult<&HostFunctions> {
    slot.as_deref().ok_or_else(|| QueryError::Evaluation("operator used before open".into()))
}

/// Yields the values read back from the relational statement.
pub(super) struct SourceOp {
    base: OperatorBase,
    values: std::vec::IntoIter<Value>,
}

impl SourceOp {
    pub(super) fn new(values: Vec<Value>) -> Self {
        Self { base: OperatorBase::new(), values: values.into_iter() }
    }
}

impl Operator for SourceOp {
    fn open(&mut self, _ctx: &ExecutionContext) -> QueryResult<()> {
        self.base.set_open();
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<Value>> {
        match self.values.next() {
            Some(value) => {
                self.base.inc_produced();
                Ok(Some(value))
            }
            None => {
                self.base.set_finished();
                Ok(None)
            }
        }
    }

    fn close(&mut self) -> QueryResult<()> {
        self.values = Vec::new().into_iter();
        self.base.set_closed();
        Ok(())
    }

    fn state(&self) -> OperatorState {
        self.base.state()
    }

    fn name(&self) -> &'static str {
        "Source"
    }
}

/// Passes through values satisfying a predicate. Null counts as false.
pub(super) struct FilterOp {
    base: OperatorBase,
    predicate: Lambda,
    input: BoxedOperator,
    functions: Option<Arc<HostFunctions>>,
}

impl FilterOp {
    pub(super) fn new(predicate: Lambda, input: BoxedOperator) -> Self {
        Self { base: OperatorBase::new(), predicate, input, functions: None }
    }
}

impl Operator for FilterOp {
    fn open(&mut self, ctx: &ExecutionContext) -> QueryResult<()> {
        self.input.open(ctx)?;
        self.functions = Some(ctx.functions_arc());
        self.base.set_open();
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<Value>> {
        let eval = Evaluator::new(functions(&self.functions)?);
        loop {
            match self.input.next()? {
                Some(value) => {
                    if eval.test(&self.predicate, &[&value])? {
                        self.base.inc_produced();
                        return Ok(Some(value));
                    }
                }
                None => {
                    self.base.set_finished();
                    return Ok(None);
                }
            }
        }
    }

    fn close(&mut self) -> QueryResult<()> {
        self.input.close()?;
        self.base.set_closed();
        Ok(())
    }

    fn state(&self) -> OperatorState {
        self.base.state()
    }

    fn name(&self) -> &'static str {
        "Filter"
    }
}

/// Blocking stable sort.
pub(super) struct SortOp {
    base: OperatorBase,
    keys: Vec<(Lambda, bool)>,
    input: BoxedOperator,
    functions: Option<Arc<HostFunctions>>,
    max_rows: usize,
    sorted: Option<std::vec::IntoIter<Value>>,
}

impl SortOp {
    pub(super) fn new(keys: Vec<(Lambda, bool)>, input: BoxedOperator) -> Self {
        Self { base: OperatorBase::new(), keys, input, functions: None, max_rows: 0, sorted: None }
    }
}

impl Operator for SortOp {
    fn open(&mut self, ctx: &ExecutionContext) -> QueryResult<()> {
        self.input.open(ctx)?;
        self.functions = Some(ctx.functions_arc());
        self.max_rows = ctx.max_rows_in_memory();
        self.sorted = None;
        self.base.set_open();
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<Value>> {
        if self.sorted.is_none() {
            let values = buffer(self.input.as_mut(), self.max_rows)?;
            let eval = Evaluator::new(functions(&self.functions)?);
            self.sorted = Some(sequence::sort(values, &self.keys, eval)?.into_iter());
        }
        match self.sorted.as_mut().and_then(Iterator::next) {
            Some(value) => {
                self.base.inc_produced();
                Ok(Some(value))
            }
            None => {
                self.base.set_finished();
                Ok(None)
            }
        }
    }

    fn close(&mut self) -> QueryResult<()> {
        self.input.close()?;
        self.sorted = None;
        self.base.set_closed();
        Ok(())
    }

    fn state(&self) -> OperatorState {
        self.base.state()
    }

    fn name(&self) -> &'static str {
        "Sort"
    }
}

/// Runs one query operator over the whole buffered sequence.
pub(super) struct BufferedOp {
    base: OperatorBase,
    operation: QueryOperation,
    element: HostType,
    operands: Vec<Vec<Value>>,
    input: BoxedOperator,
    functions: Option<Arc<HostFunctions>>,
    max_rows: usize,
    output: Option<std::vec::IntoIter<Value>>,
}

impl BufferedOp {
    pub(super) fn new(
        operation: QueryOperation,
        element: HostType,
        operands: Vec<Vec<Value>>,
        input: BoxedOperator,
    ) -> Self {
        Self {
            base: OperatorBase::new(),
            operation,
            element,
            operands,
            input,
            functions: None,
            max_rows: 0,
            output: None,
        }
    }
}

impl Operator for BufferedOp {
    fn open(&mut self, ctx: &ExecutionContext) -> QueryResult<()> {
        self.input.open(ctx)?;
        self.functions = Some(ctx.functions_arc());
        self.max_rows = ctx.max_rows_in_memory();
        if self.max_rows > 0 {
            if let Some(largest) = self.operands.iter().map(Vec::len).max().filter(|len| *len > self.max_rows) {
                return Err(QueryError::QueryTooLarge { actual: largest, limit: self.max_rows });
            }
        }
        self.output = None;
        self.base.set_open();
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<Value>> {
        if self.output.is_none() {
            let values = buffer(self.input.as_mut(), self.max_rows)?;
            let eval = Evaluator::new(functions(&self.functions)?);
            let out = sequence::apply(&self.operation, &self.element, values, &self.operands, eval)?;
            self.output = Some(out.into_iter());
        }
        match self.output.as_mut().and_then(Iterator::next) {
            Some(value) => {
                self.base.inc_produced();
                Ok(Some(value))
            }
            None => {
                self.base.set_finished();
                Ok(None)
            }
        }
    }

    fn close(&mut self) -> QueryResult<()> {
        self.input.close()?;
        self.output = None;
        self.base.set_closed();
        Ok(())
    }

    fn state(&self) -> OperatorState {
        self.base.state()
    }

    fn name(&self) -> &'static str {
        self.operation.kind().name()
    }
}

/// Extracts the first element, or the default when there is none and
/// defaults are allowed.
pub(super) struct ElementOp {
    base: OperatorBase,
    or_default: bool,
    default: Value,
    input: BoxedOperator,
}

impl ElementOp {
    pub(super) fn new(or_default: bool, default: Value, input: BoxedOperator) -> Self {
        Self { base: OperatorBase::new(), or_default, default, input }
    }
}

impl Operator for ElementOp {
    fn open(&mut self, ctx: &ExecutionContext) -> QueryResult<()> {
        self.input.open(ctx)?;
        self.base.set_open();
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<Value>> {
        if self.base.state().is_finished() {
            return Ok(None);
        }
        let value = match self.input.next()? {
            Some(value) => value,
            None if self.or_default => self.default.clone(),
            None => return Err(QueryError::Cardinality(NO_ELEMENTS.into())),
        };
        self.base.inc_produced();
        self.base.set_finished();
        Ok(Some(value))
    }

    fn close(&mut self) -> QueryResult<()> {
        self.input.close()?;
        self.base.set_closed();
        Ok(())
    }

    fn state(&self) -> OperatorState {
        self.base.state()
    }

    fn name(&self) -> &'static str {
        "Element"
    }
}

/// Extracts the only element.
///
/// A second element is an error. The input is drained and closed before
/// the error is returned.
pub(super) struct SingleOp {
    base: OperatorBase,
    or_default: bool,
    default: Value,
    input: BoxedOperator,
    input_closed: bool,
}

impl SingleOp {
    pub(super) fn new(or_default: bool, default: Value, input: BoxedOperator) -> Self {
        Self { base: OperatorBase::new(), or_default, default, input, input_closed: false }
    }
}

impl Operator for SingleOp {
    fn open(&mut self, ctx: &ExecutionContext) -> QueryResult<()> {
        self.input.open(ctx)?;
        self.input_closed = false;
        self.base.set_open();
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<Value>> {
        if self.base.state().is_finished() {
            return Ok(None);
        }
        let first = self.input.next()?;
        if first.is_some() && self.input.next()?.is_some() {
            while self.input.next()?.is_some() {}
            self.input.close()?;
            self.input_closed = true;
            self.base.set_finished();
            return Err(QueryError::Cardinality(MORE_THAN_ONE.into()));
        }
        let value = match first {
            Some(value) => value,
            None if self.or_default => self.default.clone(),
            None => return Err(QueryError::Cardinality(NO_ELEMENTS.into())),
        };
        self.base.inc_produced();
        self.base.set_finished();
        Ok(Some(value))
    }

    fn close(&mut self) -> QueryResult<()> {
        if !self.input_closed {
            self.input.close()?;
            self.input_closed = true;
        }
        self.base.set_closed();
        Ok(())
    }

    fn state(&self) -> OperatorState {
        self.base.state()
    }

    fn name(&self) -> &'static str {
        "Single"
    }
}

/// Turns a count into a boolean.
pub(super) struct CountCheckOp {
    base: OperatorBase,
    expect_zero: bool,
    input: BoxedOperator,
}

impl CountCheckOp {
    pub(super) fn new(expect_zero: bool, input: BoxedOperator) -> Self {
        Self { base: OperatorBase::new(), expect_zero, input }
    }
}

impl Operator for CountCheckOp {
    fn open(&mut self, ctx: &ExecutionContext) -> QueryResult<()> {
        self.input.open(ctx)?;
        self.base.set_open();
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<Value>> {
        if self.base.state().is_finished() {
            return Ok(None);
        }
        let count = match self.input.next()? {
            Some(value) => value.as_int().ok_or_else(|| QueryError::type_mismatch("a count", value.type_name()))?,
            None => 0,
        };
        self.base.inc_produced();
        self.base.set_finished();
        Ok(Some(Value::Bool(if self.expect_zero { count == 0 } else { count > 0 })))
    }

    fn close(&mut self) -> QueryResult<()> {
        self.input.close()?;
        self.base.set_closed();
        Ok(())
    }

    fn state(&self) -> OperatorState {
        self.base.state()
    }

    fn name(&self) -> &'static str {
        "CountCheck"
    }
}

/// Reads a single aggregated value.
pub(super) struct ScalarOp {
    base: OperatorBase,
    target: HostType,
    on_null: NullPolicy,
    input: BoxedOperator,
}

impl ScalarOp {
    pub(super) fn new(target: HostType, on_null: NullPolicy, input: BoxedOperator) -> Self {
        Self { base: OperatorBase::new(), target, on_null, input }
    }
}

impl Operator for ScalarOp {
    fn open(&mut self, ctx: &ExecutionContext) -> QueryResult<()> {
        self.input.open(ctx)?;
        self.base.set_open();
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<Value>> {
        if self.base.state().is_finished() {
            return Ok(None);
        }
        let target = self.target.unwrap_optional();
        let value = match self.input.next()?.unwrap_or(Value::Null) {
            Value::Null => match self.on_null {
                NullPolicy::Zero => target.default_value(),
                NullPolicy::Null => Value::Null,
                NullPolicy::Fail => return Err(QueryError::Cardinality(NO_ELEMENTS.into())),
            },
            Value::Int(i) if *target == HostType::Float => {
                #[allow(clippy::cast_precision_loss)]
                let widened = i as f64;
                Value::Float(widened)
            }
            value => value,
        };
        self.base.inc_produced();
        self.base.set_finished();
        Ok(Some(value))
    }

    fn close(&mut self) -> QueryResult<()> {
        self.input.close()?;
        self.base.set_closed();
        Ok(())
    }

    fn state(&self) -> OperatorState {
        self.base.state()
    }

    fn name(&self) -> &'static str {
        "Scalar"
    }
}

/// Rebuilds groups from one `{key, elements}` row per element.
pub(super) struct RegroupOp {
    base: OperatorBase,
    input: BoxedOperator,
    max_rows: usize,
    groups: Option<std::vec::IntoIter<Value>>,
}

impl RegroupOp {
    pub(super) fn new(input: BoxedOperator) -> Self {
        Self { base: OperatorBase::new(), input, max_rows: 0, groups: None }
    }
}

impl Operator for RegroupOp {
    fn open(&mut self, ctx: &ExecutionContext) -> QueryResult<()> {
        self.input.open(ctx)?;
        self.max_rows = ctx.max_rows_in_memory();
        self.groups = None;
        self.base.set_open();
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<Value>> {
        if self.groups.is_none() {
            let rows = buffer(self.input.as_mut(), self.max_rows)?;
            let pairs = rows
                .into_iter()
                .map(|row| match row {
                    Value::Object(mut fields) => {
                        let key = fields.remove(GROUP_KEY).unwrap_or(Value::Null);
                        let element = fields.remove(GROUP_ELEMENTS).unwrap_or(Value::Null);
                        Ok((key, element))
                    }
                    other => Err(QueryError::type_mismatch("a grouped row", other.type_name())),
                })
                .collect::<QueryResult<Vec<_>>>()?;
            let groups: Vec<Value> =
                group_pairs(pairs).into_iter().map(|(key, elements)| grouping_value(key, elements)).collect();
            self.groups = Some(groups.into_iter());
        }
        match self.groups.as_mut().and_then(Iterator::next) {
            Some(group) => {
                self.base.inc_produced();
                Ok(Some(group))
            }
            None => {
                self.base.set_finished();
                Ok(None)
            }
        }
    }

    fn close(&mut self) -> QueryResult<()> {
        self.input.close()?;
        self.groups = None;
        self.base.set_closed();
        Ok(())
    }

    fn state(&self) -> OperatorState {
        self.base.state()
    }

    fn name(&self) -> &'static str {
        "Regroup"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ExecutionConfig;

    /// A source that records whether it was closed.
    struct Tracked {
        inner: SourceOp,
        closed: Arc<std::sync::atomic::AtomicBool>,
    }

    impl Operator for Tracked {
        fn open(&mut self, ctx: &ExecutionContext) -> QueryResult<()> {
            self.inner.open(ctx)
        }

        fn next(&mut self) -> QueryResult<Option<Value>> {
            self.inner.next()
        }

        fn close(&mut self) -> QueryResult<()> {
            self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
            self.inner.close()
        }

        fn state(&self) -> OperatorState {
            self.inner.state()
        }

        fn name(&self) -> &'static str {
            "Tracked"
        }
    }

    fn source(values: &[i64]) -> BoxedOperator {
        Box::new(SourceOp::new(values.iter().copied().map(Value::Int).collect()))
    }

    #[test]
    fn single_drains_and_closes_before_failing() {
        let closed = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let tracked = Tracked { inner: SourceOp::new(vec![Value::Int(1), Value::Int(2), Value::Int(3)]), closed: Arc::clone(&closed) };
        let mut op = SingleOp::new(false, Value::Null, Box::new(tracked));
        op.open(&ExecutionContext::new()).expect("open");
        let err = op.next().expect_err("two rows");
        assert!(matches!(err, QueryError::Cardinality(ref m) if m == MORE_THAN_ONE));
        assert!(closed.load(std::sync::atomic::Ordering::SeqCst));
        op.close().expect("close");
    }

    #[test]
    fn scalar_reads_apply_the_null_policy() {
        let ctx = ExecutionContext::new();
        let mut zero = ScalarOp::new(HostType::Int, NullPolicy::Zero, Box::new(SourceOp::new(vec![Value::Null])));
        zero.open(&ctx).expect("open");
        assert_eq!(zero.next().expect("next"), Some(Value::Int(0)));
        assert_eq!(zero.next().expect("next"), None);

        let mut fail = ScalarOp::new(HostType::Int, NullPolicy::Fail, Box::new(SourceOp::new(vec![Value::Null])));
        fail.open(&ctx).expect("open");
        assert!(fail.next().is_err());

        let mut widen = ScalarOp::new(HostType::Float, NullPolicy::Fail, source(&[4]));
        widen.open(&ctx).expect("open");
        assert_eq!(widen.next().expect("next"), Some(Value::Float(4.0)));
    }

    #[test]
    fn count_check_answers_both_ways() {
        let ctx = ExecutionContext::new();
        let mut any = CountCheckOp::new(false, source(&[3]));
        any.open(&ctx).expect("open");
        assert_eq!(any.next().expect("next"), Some(Value::Bool(true)));
        let mut all = CountCheckOp::new(true, source(&[3]));
        all.open(&ctx).expect("open");
        assert_eq!(all.next().expect("next"), Some(Value::Bool(false)));
    }

    #[test]
    fn blocking_operators_respect_the_row_limit() {
        let ctx = ExecutionContext::new().with_config(ExecutionConfig::new().with_max_rows_in_memory(2));
        let key = Lambda::unary("x", HostType::Int, crate::expr::Expr::param("x"), HostType::Int);
        let mut sort = SortOp::new(vec![(key, false)], source(&[3, 1, 2]));
        sort.open(&ctx).expect("open");
        let err = sort.next().expect_err("too many rows");
        assert!(matches!(err, QueryError::QueryTooLarge { actual: 3, limit: 2 }));
    }

    #[test]
    fn regroup_collects_elements_by_key() {
        let row = |k: i64, e: &str| Value::object([(GROUP_KEY, Value::Int(k)), (GROUP_ELEMENTS, Value::from(e))]);
        let mut op = RegroupOp::new(Box::new(SourceOp::new(vec![row(1, "a"), row(2, "b"), row(1, "c")])));
        op.open(&ExecutionContext::new()).expect("open");
        let first = op.next().expect("next").expect("group");
        assert_eq!(first, grouping_value(Value::Int(1), vec![Value::from("a"), Value::from("c")]));
        assert!(op.next().expect("next").is_some());
        assert_eq!(op.next().expect("next"), None);
        assert!(op.state().is_finished());
    }
}
