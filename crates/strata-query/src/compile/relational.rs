//! The relational compiler: a chain traversal that encodes operators into
//! the statement of a [`CompilationContext`].
//!
//! Operators are encoded head to tail. The first operator that cannot be
//! expressed relationally switches the traversal to the in-memory phase;
//! it and every later operator become [`ComplementaryStep`]s run over the
//! rows of the statement. The `after` phase assembles those steps tail to
//! head, and hooks add the steps that read aggregated rows back as scalars.

use strata_core::{DomainModel, EntityType, HostType, Value};
use tracing::{debug, warn};

use super::binding::Binding;
use super::context::{CompilationContext, Projection};
use super::translate::{translate_lambda, translate_predicate, CollectionPolicy};
use super::QueryCompiler;
use crate::chain::{ArithFunction, OperatorKind, QueryNode, QueryOperation};
use crate::complement::{ComplementaryStep, NullPolicy};
use crate::error::{QueryError, QueryResult};
use crate::expr::{Lambda, GROUP_ELEMENTS, GROUP_KEY};
use crate::navigation::{FactorSplit, OrFactor};
use crate::sql::{AggregateFunction, AggregateTag, Join, JoinKind, OrderItem, SelectItem, SqlExpr, SqlSource};
use crate::traverse::{ChainTraversal, Composition, Hook, Visit};

/// Which phase the traversal is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Relational,
    InMemory,
}

type Steps = Vec<ComplementaryStep>;

pub(crate) struct RelationalCompiler<'c, 'm> {
    compiler: &'c QueryCompiler<'m>,
    pub(crate) ctx: CompilationContext<'m>,
    /// The operator whose aggregate the statement selects.
    aggregated: Option<OperatorKind>,
    /// Keys of the current ordering, for sorts that run in memory.
    order_keys: Vec<(Lambda, bool)>,
    /// True while in-memory elements are still the entities the statement
    /// reads, so navigations they use can be loaded as includes.
    memory_stable: bool,
}

impl<'c, 'm> RelationalCompiler<'c, 'm> {
    pub(crate) fn new(compiler: &'c QueryCompiler<'m>, ctx: CompilationContext<'m>) -> Self {
        Self { compiler, ctx, aggregated: None, order_keys: Vec::new(), memory_stable: true }
    }

    pub(crate) fn hooks() -> [Hook<Self>; 2] {
        [
            Hook {
                kind: OperatorKind::Count,
                composition: Composition::HookThenDefault,
                guard: Self::aggregated_here,
                run: Self::read_count,
            },
            Hook {
                kind: OperatorKind::ArithAggregate,
                composition: Composition::HookThenDefault,
                guard: Self::aggregated_here,
                run: Self::read_aggregate,
            },
        ]
    }

    fn aggregated_here(&self, node: &QueryNode) -> bool {
        self.aggregated == Some(node.kind())
    }

    fn read_count(&mut self, _node: &QueryNode, downstream: Steps) -> QueryResult<Steps> {
        let mut steps = vec![ComplementaryStep::Scalar { target: HostType::Int, on_null: NullPolicy::Zero }];
        steps.extend(downstream);
        Ok(steps)
    }

    fn read_aggregate(&mut self, node: &QueryNode, downstream: Steps) -> QueryResult<Steps> {
        let on_null = match node.operation() {
            QueryOperation::ArithAggregate { function: ArithFunction::Sum, .. } => NullPolicy::Zero,
            _ if matches!(node.result_type(), HostType::Optional(_)) => NullPolicy::Null,
            _ => NullPolicy::Fail,
        };
        let mut steps = vec![ComplementaryStep::Scalar { target: node.result_type().clone(), on_null }];
        steps.extend(downstream);
        Ok(steps)
    }

    fn model(&self) -> &'m dyn DomainModel {
        self.ctx.model
    }

    /// Encodes `node`, or runs it in memory when it has no relational form.
    fn relational_or_degrade(&mut self, node: &QueryNode) -> QueryResult<(Steps, Phase)> {
        let snapshot = (self.ctx.clone(), self.order_keys.clone(), self.aggregated);
        match self.relational(node) {
            Ok(outcome) => Ok(outcome),
            Err(err) if err.is_degradable() => {
                debug!(operator = node.kind().name(), error = %err, "operator runs in memory");
                (self.ctx, self.order_keys, self.aggregated) = snapshot;
                Ok((self.in_memory(node)?, Phase::InMemory))
            }
            Err(err) => Err(err),
        }
    }

    fn in_memory(&mut self, node: &QueryNode) -> QueryResult<Steps> {
        if self.memory_stable {
            for path in node.implied_includes(self.model()) {
                self.ctx.add_include(&path)?;
            }
        }
        let step = match node.operation() {
            QueryOperation::Where { predicate } => ComplementaryStep::Filter(predicate.clone()),
            QueryOperation::Order { key, descending } => {
                self.order_keys = vec![(key.clone(), *descending)];
                ComplementaryStep::Sort { keys: self.order_keys.clone() }
            }
            QueryOperation::ThenOrder { key, descending } => {
                self.order_keys.push((key.clone(), *descending));
                ComplementaryStep::Sort { keys: self.order_keys.clone() }
            }
            QueryOperation::Include { path } => {
                if !(self.memory_stable && self.ctx.add_include(path)?) {
                    warn!(path = %path.join("."), "include ignored: elements are no longer entities");
                }
                return Ok(Vec::new());
            }
            other => ComplementaryStep::Operator { operation: other.clone(), element: node.element_type().clone() },
        };
        if node.result_type() != node.source_type() {
            self.memory_stable = false;
        }
        Ok(vec![step])
    }

    fn relational(&mut self, node: &QueryNode) -> QueryResult<(Steps, Phase)> {
        let relational = |steps: Steps| -> QueryResult<(Steps, Phase)> { Ok((steps, Phase::Relational)) };
        let element_default = || node.result_type().default_value();
        match node.operation() {
            QueryOperation::Where { predicate } => self.filter(node, predicate),
            QueryOperation::First { predicate, or_default } => {
                self.restrict(predicate.as_ref())?;
                self.ctx.take(1);
                relational(vec![ComplementaryStep::Element { or_default: *or_default, default: element_default() }])
            }
            QueryOperation::Last { predicate, or_default } => {
                self.restrict(predicate.as_ref())?;
                self.reverse()?;
                self.ctx.take(1);
                relational(vec![ComplementaryStep::Element { or_default: *or_default, default: element_default() }])
            }
            QueryOperation::ElementAt { index, or_default } => {
                self.ctx.skip(*index as u64)?;
                self.ctx.take(1);
                relational(vec![ComplementaryStep::Element { or_default: *or_default, default: element_default() }])
            }
            QueryOperation::Single { predicate, or_default } => {
                self.restrict(predicate.as_ref())?;
                self.ctx.take(2);
                relational(vec![ComplementaryStep::Single { or_default: *or_default, default: element_default() }])
            }
            QueryOperation::Count { predicate, .. } => {
                self.restrict(predicate.as_ref())?;
                self.count(OperatorKind::Count)?;
                relational(Vec::new())
            }
            QueryOperation::Any { predicate } => {
                self.restrict(predicate.as_ref())?;
                self.count(OperatorKind::Any)?;
                relational(vec![ComplementaryStep::CountCheck { expect_zero: false }])
            }
            QueryOperation::All { predicate } => {
                if self.ctx.is_sealed() {
                    self.ctx.fold(false)?;
                }
                // A row whose predicate is unknown is not a counterexample.
                let holds = translate_predicate(&mut self.ctx, predicate, CollectionPolicy::Reject)?;
                self.ctx.statement.add_criteria(holds.not());
                self.count(OperatorKind::All)?;
                relational(vec![ComplementaryStep::CountCheck { expect_zero: true }])
            }
            QueryOperation::Contains { value } => {
                if self.ctx.is_sealed() {
                    self.ctx.fold(false)?;
                }
                let criteria = self.contains_criteria(value)?;
                self.ctx.statement.add_criteria(criteria);
                self.count(OperatorKind::Contains)?;
                relational(vec![ComplementaryStep::CountCheck { expect_zero: false }])
            }
            QueryOperation::ArithAggregate { function, selector } => {
                self.arith_aggregate(node, *function, selector.as_ref())?;
                relational(Vec::new())
            }
            QueryOperation::Group { key, element } => {
                self.group(node, key, element.as_ref())?;
                Ok((vec![ComplementaryStep::Regroup], Phase::InMemory))
            }
            QueryOperation::GroupAggregation { key, aggregation } => {
                self.group_aggregation(node, key, aggregation)?;
                relational(Vec::new())
            }
            QueryOperation::Select { selector } => {
                if self.ctx.statement.distinct || self.ctx.is_grouped() {
                    self.ctx.fold(true)?;
                }
                let current = self.ctx.binding.clone();
                let binding =
                    translate_lambda(&mut self.ctx, selector, vec![current.clone()], CollectionPolicy::Reject, false)?;
                self.project(node, selector, current, binding);
                relational(Vec::new())
            }
            QueryOperation::SelectCollectionMediated { collection } => {
                let binding = self.flatten(collection)?;
                let current = self.ctx.binding.clone();
                self.project(node, collection, current, binding);
                relational(Vec::new())
            }
            QueryOperation::SelectCombining { collection, result } => {
                let current = self.ctx.binding.clone();
                let flattened = self.flatten(collection)?;
                let binding = translate_lambda(
                    &mut self.ctx,
                    result,
                    vec![current.clone(), flattened],
                    CollectionPolicy::Reject,
                    false,
                )?;
                self.project(node, result, current, binding);
                relational(Vec::new())
            }
            QueryOperation::Order { key, descending } => {
                if self.ctx.is_sealed() {
                    self.ctx.fold(false)?;
                }
                self.ctx.statement.order_by = self.order_items(key, *descending)?;
                self.order_keys = vec![(key.clone(), *descending)];
                relational(Vec::new())
            }
            QueryOperation::ThenOrder { key, descending } => {
                if self.ctx.is_sealed() {
                    self.ctx.fold(true)?;
                }
                let items = self.order_items(key, *descending)?;
                self.ctx.statement.order_by.extend(items);
                self.order_keys.push((key.clone(), *descending));
                relational(Vec::new())
            }
            QueryOperation::Reverse => {
                self.reverse()?;
                relational(Vec::new())
            }
            QueryOperation::Distinct => {
                if self.ctx.statement.is_limited() {
                    self.ctx.fold(true)?;
                }
                self.ctx.statement.distinct = true;
                relational(Vec::new())
            }
            QueryOperation::Skip { count } => {
                self.ctx.skip(*count as u64)?;
                relational(Vec::new())
            }
            QueryOperation::Take { count } => {
                self.ctx.take(*count as u64);
                relational(Vec::new())
            }
            QueryOperation::Include { path } => {
                if !self.ctx.add_include(path)? {
                    warn!(path = %path.join("."), "include ignored: element is not an entity");
                }
                relational(Vec::new())
            }
            QueryOperation::Join { inner, outer_key, inner_key, result, grouped } => {
                if *grouped {
                    return Err(QueryError::Translation("grouped joins run in memory".into()));
                }
                self.join(node, inner, outer_key, inner_key, result)?;
                relational(Vec::new())
            }
            QueryOperation::Set { operator, other } => {
                let operand = self.compiler.operand(other, &self.ctx.store)?;
                self.ctx.combine(*operator, operand)?;
                self.order_keys.clear();
                relational(Vec::new())
            }
            QueryOperation::Cast { target } | QueryOperation::OfType { target } => {
                if !target.accepts(&self.ctx.element) {
                    return Err(QueryError::Translation(format!(
                        "{} to {target} has no relational form",
                        node.kind()
                    )));
                }
                self.ctx.element = target.clone();
                relational(Vec::new())
            }
            QueryOperation::Accumulate { .. }
            | QueryOperation::DefaultIfEmpty { .. }
            | QueryOperation::SequenceEqual { .. }
            | QueryOperation::SkipWhile { .. }
            | QueryOperation::TakeWhile { .. }
            | QueryOperation::Zip { .. } => {
                Err(QueryError::Translation(format!("{} has no relational form", node.kind())))
            }
        }
    }

    /// Adds a predicate under existential collection semantics.
    fn add_predicate(&mut self, predicate: &Lambda) -> QueryResult<()> {
        self.ctx.crossed_many = false;
        let criteria = translate_predicate(&mut self.ctx, predicate, CollectionPolicy::Existential)?;
        self.ctx.statement.add_criteria(criteria);
        if self.ctx.crossed_many {
            self.ctx.crossed_many = false;
            self.ctx.statement.distinct = true;
            self.ctx.fold(true)?;
        }
        Ok(())
    }

    fn restrict(&mut self, predicate: Option<&Lambda>) -> QueryResult<()> {
        let Some(predicate) = predicate else { return Ok(()) };
        if self.ctx.is_sealed() {
            self.ctx.fold(true)?;
        }
        self.add_predicate(predicate)
    }

    /// `Where`: relational when every or-factor stays in the store;
    /// otherwise the store-local part pre-filters and the full predicate
    /// is re-checked in memory.
    fn filter(&mut self, node: &QueryNode, predicate: &Lambda) -> QueryResult<(Steps, Phase)> {
        if self.ctx.is_sealed() {
            self.ctx.fold(true)?;
        }
        let model = self.model();
        let heterogeneity = self.ctx.heterogeneity;
        let factors = OrFactor::flatten(predicate, self.ctx.max_or_factors)?;
        if !factors.iter().any(|f| f.is_heterogeneous(model, heterogeneity)) {
            self.add_predicate(predicate)?;
            return Ok((Vec::new(), Phase::Relational));
        }

        let splits: Vec<FactorSplit> =
            factors.iter().map(|f| self.ctx.factors.decompose(f, model, heterogeneity)).collect();
        if let Some(prefilter) = FactorSplit::relational_criteria(&splits) {
            let saved = self.ctx.clone();
            if let Err(err) = self.add_predicate(&predicate.with_body(prefilter)) {
                if !err.is_degradable() {
                    return Err(err);
                }
                self.ctx = saved;
            }
        }
        debug!(factors = factors.len(), "predicate leaves the store; re-checked in memory");
        Ok((self.in_memory(node)?, Phase::InMemory))
    }

    fn count(&mut self, kind: OperatorKind) -> QueryResult<()> {
        if self.ctx.is_sealed() {
            self.ctx.fold(false)?;
        }
        self.ctx.statement.order_by.clear();
        self.ctx.set_result_type(Binding::Scalar(SqlExpr::count_star()), HostType::Int, Projection::Opaque);
        self.ctx.statement.aggregation = Some(AggregateTag::Scalar(AggregateFunction::Count));
        self.aggregated = Some(kind);
        self.order_keys.clear();
        Ok(())
    }

    fn arith_aggregate(
        &mut self,
        node: &QueryNode,
        function: ArithFunction,
        selector: Option<&Lambda>,
    ) -> QueryResult<()> {
        if self.ctx.is_sealed() {
            self.ctx.fold(false)?;
        }
        let value = match selector {
            Some(selector) => {
                let current = self.ctx.binding.clone();
                translate_lambda(&mut self.ctx, selector, vec![current], CollectionPolicy::Reject, false)?
            }
            None => self.ctx.binding.clone(),
        };
        let Binding::Scalar(value) = value else {
            return Err(QueryError::Translation(format!("{function} needs a single numeric value")));
        };
        let function = AggregateFunction::from(function);
        self.ctx.statement.order_by.clear();
        self.ctx.set_result_type(
            Binding::Scalar(SqlExpr::aggregate(function, value)),
            node.result_type().clone(),
            Projection::Opaque,
        );
        self.ctx.statement.aggregation = Some(AggregateTag::Scalar(function));
        self.aggregated = Some(OperatorKind::ArithAggregate);
        self.order_keys.clear();
        Ok(())
    }

    fn contains_criteria(&self, value: &Value) -> QueryResult<SqlExpr> {
        let model = self.model();
        let scalars = self.ctx.binding.scalars(model)?;
        let values = match &self.ctx.binding {
            Binding::Scalar(_) => vec![value.clone()],
            Binding::Entity { entity, .. } => key_values(model.require(entity)?, value),
            _ => return Err(QueryError::Translation("contains needs a value or an entity".into())),
        };
        if values.len() != scalars.len() {
            return Err(QueryError::Translation(format!("{value} does not identify an element")));
        }
        SqlExpr::conjunction(scalars.into_iter().zip(values).map(|(column, value)| {
            if value.is_null() {
                SqlExpr::unary(crate::expr::UnaryOp::IsNull, column)
            } else {
                column.eq(SqlExpr::Literal(value))
            }
        }))
        .ok_or_else(|| QueryError::Translation("element has no columns".into()))
    }

    fn group(&mut self, node: &QueryNode, key: &Lambda, element: Option<&Lambda>) -> QueryResult<()> {
        if self.ctx.is_sealed() {
            self.ctx.fold(true)?;
        }
        let current = self.ctx.binding.clone();
        let key_binding =
            translate_lambda(&mut self.ctx, key, vec![current.clone()], CollectionPolicy::Reject, false)?;
        let element_binding = match element {
            Some(selector) => {
                translate_lambda(&mut self.ctx, selector, vec![current], CollectionPolicy::Reject, false)?
            }
            None => current,
        };
        let (key_type, element_type) = match node.result_type().element_type() {
            Some(HostType::Grouping { key, element }) => ((**key).clone(), (**element).clone()),
            _ => (HostType::Any, HostType::Any),
        };
        self.ctx.set_result_type(
            Binding::View(vec![(GROUP_KEY.to_owned(), key_binding), (GROUP_ELEMENTS.to_owned(), element_binding)]),
            HostType::record([(GROUP_KEY, key_type), (GROUP_ELEMENTS, element_type)]),
            Projection::Opaque,
        );
        self.order_keys.clear();
        Ok(())
    }

    fn group_aggregation(&mut self, node: &QueryNode, key: &Lambda, aggregation: &Lambda) -> QueryResult<()> {
        if self.ctx.is_sealed() {
            self.ctx.fold(true)?;
        }
        let model = self.model();
        let current = self.ctx.binding.clone();
        let key_binding =
            translate_lambda(&mut self.ctx, key, vec![current.clone()], CollectionPolicy::Reject, false)?;
        let group_by = key_binding.scalars(model)?;
        let grouping = Binding::Grouping { key: Box::new(key_binding.clone()), element: Box::new(current) };
        let result =
            translate_lambda(&mut self.ctx, aggregation, vec![key_binding, grouping], CollectionPolicy::Reject, true)?;

        let mut items: Vec<SelectItem> = Vec::new();
        result.project(model, None, &mut items)?;
        if let Some(loose) = items.iter().find(|item| {
            !(item.expr.has_aggregate() || group_by.contains(&item.expr) || matches!(item.expr, SqlExpr::Literal(_)))
        }) {
            return Err(QueryError::Translation(format!(
                "'{}' is neither grouped nor aggregated",
                loose.expr
            )));
        }

        self.ctx.statement.group_by = group_by;
        self.ctx.statement.aggregation = Some(AggregateTag::Grouped);
        self.ctx.statement.order_by.clear();
        let element = node.result_type().element_type().cloned().unwrap_or(HostType::Any);
        self.ctx.set_result_type(result, element, Projection::Opaque);
        self.order_keys.clear();
        Ok(())
    }

    /// Translates a collection lambda whose navigations flatten into rows.
    fn flatten(&mut self, collection: &Lambda) -> QueryResult<Binding> {
        if self.ctx.is_sealed() {
            self.ctx.fold(true)?;
        }
        let current = self.ctx.binding.clone();
        let binding = translate_lambda(&mut self.ctx, collection, vec![current], CollectionPolicy::Flatten, false)?;
        if !matches!(binding, Binding::Entity { .. }) {
            return Err(QueryError::Translation(format!("'{collection}' is not a collection navigation")));
        }
        Ok(binding)
    }

    /// Makes `binding` the current element.
    fn project(&mut self, node: &QueryNode, selector: &Lambda, current: Binding, binding: Binding) {
        let element = node.result_type().element_type().cloned().unwrap_or(HostType::Any);
        if binding == current {
            self.ctx.element = element;
            return;
        }
        let path: Option<Vec<String>> = selector
            .is_member_path()
            .then(|| selector.body().as_member_path())
            .flatten()
            .map(|(_, members)| members.into_iter().map(str::to_owned).collect());
        match (&binding, path) {
            (Binding::Entity { .. }, Some(path)) => {
                self.ctx.set_result_type(binding, element, Projection::Navigation(&path));
            }
            (Binding::Entity { .. }, None) => self.ctx.set_result_type(binding, element, Projection::Entity),
            _ => self.ctx.set_result_type(binding, element, Projection::Opaque),
        }
        self.order_keys.clear();
    }

    fn order_items(&mut self, key: &Lambda, descending: bool) -> QueryResult<Vec<OrderItem>> {
        let current = self.ctx.binding.clone();
        let binding = translate_lambda(&mut self.ctx, key, vec![current], CollectionPolicy::Reject, false)?;
        Ok(binding.scalars(self.model())?.into_iter().map(|expr| OrderItem::new(expr, descending)).collect())
    }

    /// Reverses the ordering; an unordered entity sequence is ordered by
    /// its key, descending.
    fn reverse(&mut self) -> QueryResult<()> {
        if self.ctx.is_sealed() {
            self.ctx.fold(true)?;
        }
        if self.ctx.statement.order_by.is_empty() {
            if !matches!(self.ctx.binding, Binding::Entity { .. }) {
                return Err(QueryError::Translation("reversing an unordered sequence".into()));
            }
            let keys = self.ctx.binding.scalars(self.model())?;
            self.ctx.statement.order_by = keys.into_iter().map(|expr| OrderItem::new(expr, true)).collect();
        } else {
            self.ctx.statement.order_by = self.ctx.statement.order_by.iter().map(OrderItem::reversed).collect();
        }
        for (_, descending) in &mut self.order_keys {
            *descending = !*descending;
        }
        Ok(())
    }

    fn join(
        &mut self,
        node: &QueryNode,
        inner: &crate::chain::Query,
        outer_key: &Lambda,
        inner_key: &Lambda,
        result: &Lambda,
    ) -> QueryResult<()> {
        if self.ctx.is_sealed() {
            self.ctx.fold(true)?;
        }
        let operand = self.compiler.operand(inner, &self.ctx.store)?;
        let alias = self.ctx.fresh_alias("j");
        let inner_binding = operand.shape.bind(&alias);
        let model = self.model();

        let current = self.ctx.binding.clone();
        let outer =
            translate_lambda(&mut self.ctx, outer_key, vec![current.clone()], CollectionPolicy::Reject, false)?
                .scalars(model)?;
        let inner_keys = translate_lambda(
            &mut self.ctx,
            inner_key,
            vec![inner_binding.clone()],
            CollectionPolicy::Reject,
            false,
        )?
        .scalars(model)?;
        if outer.len() != inner_keys.len() {
            return Err(QueryError::illegal(outer_key, "join keys have different arity"));
        }
        let on = SqlExpr::conjunction(outer.into_iter().zip(inner_keys).map(|(o, i)| o.eq(i)))
            .ok_or_else(|| QueryError::illegal(outer_key, "join key has no columns"))?;
        self.ctx.attach(Join { kind: JoinKind::Inner, source: SqlSource::derived(operand.statement, alias), on });

        let binding = translate_lambda(
            &mut self.ctx,
            result,
            vec![current.clone(), inner_binding],
            CollectionPolicy::Reject,
            false,
        )?;
        self.project(node, result, current, binding);
        Ok(())
    }
}

/// The key values of an entity object, in key column order.
fn key_values(entity: &EntityType, value: &Value) -> Vec<Value> {
    let mut out = Vec::new();
    for key in entity.keys() {
        let Some(attribute) = entity.attribute(key) else { continue };
        let field = value.get(attribute.name()).cloned().unwrap_or(Value::Null);
        if attribute.is_complex() {
            for leaf in attribute.leaves() {
                out.push(field.get(leaf.name()).cloned().unwrap_or(Value::Null));
            }
        } else {
            out.push(field);
        }
    }
    out
}

impl ChainTraversal for RelationalCompiler<'_, '_> {
    type Forward = Phase;
    type Pending = Steps;
    type Output = Steps;

    fn before(&mut self, node: &QueryNode, forward: &Phase) -> QueryResult<Visit<Phase, Steps>> {
        let (steps, phase) = match forward {
            Phase::Relational => self.relational_or_degrade(node)?,
            Phase::InMemory => (self.in_memory(node)?, Phase::InMemory),
        };
        Ok(Visit::proceed(phase, steps))
    }

    fn after(&mut self, _node: &QueryNode, pending: Steps, downstream: Steps) -> QueryResult<Steps> {
        let mut steps = pending;
        steps.extend(downstream);
        Ok(steps)
    }

    fn finish(&mut self, _forward: &Phase) -> QueryResult<Steps> {
        Ok(Vec::new())
    }
}
