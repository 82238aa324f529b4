//! Predicate flattening into disjunctive normal form.
//!
//! A predicate is rewritten as an OR of [`OrFactor`]s, each an AND of
//! items. Negation is pushed to the leaves with De Morgan's laws, so a NOT
//! over any number of disjuncts becomes a single factor of negated items.
//! A factor whose items navigate into another store can then be split into
//! a local part the relational engine evaluates and a check that runs in
//! memory.

use std::collections::HashMap;
use std::fmt;

use strata_core::{DomainModel, HostType, Value};

use super::{AssociationPath, Heterogeneity};
use crate::error::{QueryError, QueryResult};
use crate::expr::{BinaryOp, Expr, Lambda, UnaryOp};

/// One conjunctive disjunct of a flattened predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct OrFactor {
    items: Vec<Expr>,
    source: HostType,
    parameter: String,
}

impl OrFactor {
    /// Flattens `predicate` into factors.
    ///
    /// A predicate that is constantly false yields no factors; constantly
    /// true yields one factor without items. Fails with a translation error
    /// when the normal form would need more than `max_factors` factors.
    pub fn flatten(predicate: &Lambda, max_factors: usize) -> QueryResult<Vec<OrFactor>> {
        let param = predicate
            .param(0)
            .ok_or_else(|| QueryError::illegal(predicate, "predicate has no parameter"))?;
        let conjunctions = dnf(predicate.body(), false, max_factors)?;
        Ok(conjunctions
            .into_iter()
            .map(|items| Self { items, source: param.ty.clone(), parameter: param.name.clone() })
            .collect())
    }

    /// The conjunctive items.
    pub fn items(&self) -> &[Expr] {
        &self.items
    }

    /// The element type the parameter ranges over.
    pub const fn source(&self) -> &HostType {
        &self.source
    }

    /// The parameter standing for the current element.
    pub fn parameter(&self) -> &str {
        &self.parameter
    }

    /// Returns true for a factor without items, which always holds.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The factor as a single expression.
    #[must_use]
    pub fn to_expr(&self) -> Expr {
        Expr::conjunction(self.items.iter().cloned()).unwrap_or(Expr::boolean(true))
    }

    /// The factor as a predicate.
    #[must_use]
    pub fn to_lambda(&self) -> Lambda {
        Lambda::unary(self.parameter.clone(), self.source.clone(), self.to_expr(), HostType::Bool)
    }

    /// Returns true when any item navigates out of the source's store.
    #[must_use]
    pub fn is_heterogeneous(&self, model: &dyn DomainModel, heterogeneity: Heterogeneity) -> bool {
        self.items.iter().any(|item| !self.is_local(item, model, heterogeneity))
    }

    fn is_local(&self, item: &Expr, model: &dyn DomainModel, heterogeneity: Heterogeneity) -> bool {
        let Some(entity) = self.source.entity_name() else {
            return true;
        };
        item.member_accesses()
            .iter()
            .filter(|access| access.parameter == self.parameter)
            .all(|access| {
                let path = AssociationPath::navigation_prefix(model, entity, &access.path);
                !heterogeneity.is_heterogeneous(&path)
            })
    }

    /// Splits the items into a local base factor and a cross-store check
    /// factor.
    #[must_use]
    pub fn decompose(&self, model: &dyn DomainModel, heterogeneity: Heterogeneity) -> FactorSplit {
        let (local, remote): (Vec<Expr>, Vec<Expr>) =
            self.items.iter().cloned().partition(|item| self.is_local(item, model, heterogeneity));
        FactorSplit { base: self.with_items(local), check: self.with_items(remote) }
    }

    fn with_items(&self, items: Vec<Expr>) -> Self {
        Self { items, source: self.source.clone(), parameter: self.parameter.clone() }
    }

    /// The disjunction of `factors`, false when there are none.
    #[must_use]
    pub fn combine(factors: &[OrFactor]) -> Expr {
        Expr::disjunction(factors.iter().map(OrFactor::to_expr)).unwrap_or(Expr::boolean(false))
    }
}

impl fmt::Display for OrFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{item}")?;
        }
        write!(f, "}}")
    }
}

/// A factor split at the storage boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorSplit {
    /// Items evaluable in the source's store.
    pub base: OrFactor,
    /// Items that must be re-checked in memory.
    pub check: OrFactor,
}

impl FactorSplit {
    /// The relational pre-filter for a set of split factors: the OR of the
    /// base parts. `None` when some base part is empty, since that disjunct
    /// cannot be narrowed relationally.
    #[must_use]
    pub fn relational_criteria(splits: &[FactorSplit]) -> Option<Expr> {
        if splits.iter().any(|split| split.base.is_empty()) {
            return None;
        }
        Some(Expr::disjunction(splits.iter().map(|s| s.base.to_expr())).unwrap_or(Expr::boolean(false)))
    }
}

/// Memoizes factor splits for one compilation.
#[derive(Debug, Clone, Default)]
pub struct FactorCache {
    entries: HashMap<(String, Heterogeneity), FactorSplit>,
}

impl FactorCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached split of `factor`, computing it on first use.
    pub fn decompose(
        &mut self,
        factor: &OrFactor,
        model: &dyn DomainModel,
        heterogeneity: Heterogeneity,
    ) -> FactorSplit {
        let key = (format!("{}:{}:{}", factor.source, factor.parameter, factor.to_expr()), heterogeneity);
        self.entries.entry(key).or_insert_with(|| factor.decompose(model, heterogeneity)).clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

type Conjunctions = Vec<Vec<Expr>>;

fn dnf(expr: &Expr, negated: bool, max: usize) -> QueryResult<Conjunctions> {
    match expr {
        Expr::Binary { left, op: BinaryOp::And, right } => {
            let (l, r) = (dnf(left, negated, max)?, dnf(right, negated, max)?);
            if negated { union(l, r, max) } else { product(&l, &r, max) }
        }
        Expr::Binary { left, op: BinaryOp::Or, right } => {
            let (l, r) = (dnf(left, negated, max)?, dnf(right, negated, max)?);
            if negated { product(&l, &r, max) } else { union(l, r, max) }
        }
        Expr::Unary { op: UnaryOp::Not, operand } => dnf(operand, !negated, max),
        Expr::Constant(Value::Bool(b)) => Ok(if *b != negated { vec![Vec::new()] } else { Vec::new() }),
        leaf => Ok(vec![vec![if negated { leaf.negate() } else { leaf.clone() }]]),
    }
}

fn union(mut left: Conjunctions, right: Conjunctions, max: usize) -> QueryResult<Conjunctions> {
    left.extend(right);
    if left.len() > max {
        return Err(too_many(max));
    }
    Ok(left)
}

fn product(left: &Conjunctions, right: &Conjunctions, max: usize) -> QueryResult<Conjunctions> {
    if left.len().saturating_mul(right.len()) > max {
        return Err(too_many(max));
    }
    let mut out = Vec::with_capacity(left.len() * right.len());
    for l in left {
        for r in right {
            out.push(l.iter().chain(r).cloned().collect());
        }
    }
    Ok(out)
}

fn too_many(max: usize) -> QueryError {
    QueryError::Translation(format!("predicate expands to more than {max} or-factors"))
}

#[cfg(test)]
mod tests {
    use strata_core::{Attribute, EntityType, ModelCatalog, Navigation};

    use super::*;

    fn pred(body: Expr) -> Lambda {
        Lambda::unary("x", HostType::entity("Order"), body, HostType::Bool)
    }

    fn a() -> Expr {
        Expr::path("x", &["id"]).gt(Expr::int(1))
    }

    fn b() -> Expr {
        Expr::path("x", &["id"]).lt(Expr::int(9))
    }

    fn c() -> Expr {
        Expr::path("x", &["code"]).eq(Expr::string("z"))
    }

    fn items(factors: &[OrFactor]) -> Vec<Vec<String>> {
        factors.iter().map(|f| f.items().iter().map(ToString::to_string).collect()).collect()
    }

    #[test]
    fn and_inside_or() {
        let factors = OrFactor::flatten(&pred(a().and(b()).or(c())), 64).expect("flatten");
        assert_eq!(items(&factors), vec![
            vec![a().to_string(), b().to_string()],
            vec![c().to_string()]
        ]);
    }

    #[test]
    fn not_over_or_is_one_factor() {
        let factors = OrFactor::flatten(&pred(a().or(b()).not()), 64).expect("flatten");
        assert_eq!(items(&factors), vec![vec![a().negate().to_string(), b().negate().to_string()]]);
    }

    #[test]
    fn not_over_three_disjuncts_keeps_every_term() {
        let factors = OrFactor::flatten(&pred(a().or(b()).or(c()).not()), 64).expect("flatten");
        assert_eq!(factors.len(), 1);
        assert_eq!(factors[0].items().len(), 3);
        assert!(factors[0].items().contains(&c().negate()));
    }

    #[test]
    fn not_over_and_distributes() {
        let factors = OrFactor::flatten(&pred(a().and(b()).not()), 64).expect("flatten");
        assert_eq!(items(&factors), vec![vec![a().negate().to_string()], vec![b().negate().to_string()]]);
    }

    #[test]
    fn constants_fold() {
        assert!(OrFactor::flatten(&pred(Expr::boolean(false)), 64).expect("flatten").is_empty());
        let always = OrFactor::flatten(&pred(Expr::boolean(true).or(a())), 64).expect("flatten");
        assert!(always.iter().any(OrFactor::is_empty));
    }

    #[test]
    fn explosion_is_capped() {
        let wide = (0..8).fold(Expr::boolean(true), |acc, i| {
            acc.and(Expr::path("x", &["id"]).eq(Expr::int(i)).or(Expr::path("x", &["id"]).eq(Expr::int(-i))))
        });
        let err = OrFactor::flatten(&pred(wide), 64).expect_err("too wide");
        assert!(err.is_degradable());
    }

    #[test]
    fn split_separates_remote_items() {
        let model = ModelCatalog::new("main")
            .with_entity(
                EntityType::new("Order", "orders")
                    .with_attribute(Attribute::primitive("id", "id", HostType::Int))
                    .with_navigation(Navigation::reference("invoice", "Invoice", "id", "order_id")),
            )
            .with_entity(
                EntityType::new("Invoice", "invoices")
                    .with_store("billing")
                    .with_attribute(Attribute::primitive("order_id", "order_id", HostType::Int))
                    .with_attribute(Attribute::primitive("paid", "paid", HostType::Bool)),
            );
        let remote = Expr::path("x", &["invoice", "paid"]).eq(Expr::boolean(true));
        let factors = OrFactor::flatten(&pred(a().and(remote.clone())), 64).expect("flatten");
        assert!(factors[0].is_heterogeneous(&model, Heterogeneity::ByStore));
        assert!(!factors[0].is_heterogeneous(&model, Heterogeneity::Never));

        let mut cache = FactorCache::new();
        let split = cache.decompose(&factors[0], &model, Heterogeneity::ByStore);
        assert_eq!(split.base.items(), &[a()]);
        assert_eq!(split.check.items(), &[remote.clone()]);
        cache.decompose(&factors[0], &model, Heterogeneity::ByStore);
        assert_eq!(cache.len(), 1);
        assert_eq!(FactorSplit::relational_criteria(&[split.clone()]), Some(a()));

        let only_remote = OrFactor::flatten(&pred(remote), 64).expect("flatten");
        let unbounded = only_remote[0].decompose(&model, Heterogeneity::ByStore);
        assert!(unbounded.base.is_empty());
        assert_eq!(FactorSplit::relational_criteria(&[split, unbounded]), None);
    }
}
