//! Mutable state threaded through one compilation.
//!
//! The context owns the statement being built, the binding of the current
//! element to its columns, the join memo and the includes tree. Whenever an
//! operator cannot extend the statement in place, the statement is folded
//! into a derived source and compilation continues on top of it.

use std::collections::HashMap;
use std::mem;
use std::sync::Arc;

use strata_core::{CoreError, DomainModel, HostType, Navigation, StoreSymbol};
use tracing::trace;

use super::binding::{physical_columns, Binding};
use super::shape::{IncludeShape, RemoteInclude, RowShape};
use super::{CompilerConfig, TranslationCache};
use crate::chain::SetOperator;
use crate::error::{QueryError, QueryResult};
use crate::expr::BinaryOp;
use crate::navigation::{
    AssociationNode, AssociationTree, AtrophyPath, DecompositionCache, FactorCache, Heterogeneity,
};
use crate::sql::{
    Dialect, Join, JoinKind, OrderItem, PaginationStrategy, SelectItem, SelectStatement, SqlExpr,
    SqlSource,
};

/// Alias of the source table of every compilation.
const BASE_ALIAS: &str = "t0";

/// Column carrying the row number of a window-paginated statement.
const ROW_NUMBER_COLUMN: &str = "__rn";

type JoinKey = (String, String, String, JoinKind);

/// How a projection relates to the element it replaces.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Projection<'a> {
    /// A chain of navigations from the current entity.
    Navigation(&'a [String]),
    /// Some other entity-valued expression.
    Entity,
    /// A primitive, complex or view-shaped result.
    Opaque,
}

/// A compiled sub-query ready to be embedded in another statement.
#[derive(Debug, Clone)]
pub(crate) struct Operand {
    pub(crate) statement: SelectStatement,
    pub(crate) shape: RowShape,
    pub(crate) includes: Option<AssociationTree>,
}

/// The final statement with everything needed to read its rows.
#[derive(Debug, Clone)]
pub(crate) struct Finished {
    pub(crate) statement: SelectStatement,
    pub(crate) shape: RowShape,
    pub(crate) includes: Option<AssociationTree>,
    pub(crate) remote: Vec<RemoteInclude>,
}

#[derive(Clone)]
pub(crate) struct CompilationContext<'m> {
    pub(crate) model: &'m dyn DomainModel,
    pub(crate) heterogeneity: Heterogeneity,
    pub(crate) dialect: Dialect,
    pub(crate) max_or_factors: usize,
    pub(crate) cache: Option<Arc<TranslationCache>>,
    pub(crate) statement: SelectStatement,
    pub(crate) binding: Binding,
    pub(crate) element: HostType,
    /// Store the statement is executed against.
    pub(crate) store: StoreSymbol,
    /// Store of the source entity; joins may not leave it.
    home: StoreSymbol,
    joins: HashMap<JoinKey, String>,
    next_alias: usize,
    /// Present exactly while the element is an entity.
    pub(crate) includes: Option<AssociationTree>,
    /// Set when a collection navigation was joined for an existential test.
    pub(crate) crossed_many: bool,
    pub(crate) factors: FactorCache,
    pub(crate) decompositions: DecompositionCache,
}

impl<'m> CompilationContext<'m> {
    pub(crate) fn new(
        model: &'m dyn DomainModel,
        config: &CompilerConfig,
        entity: &str,
        store: Option<&StoreSymbol>,
    ) -> QueryResult<Self> {
        let ty = model.require(entity)?;
        let home = model.store_of(entity);
        Ok(Self {
            model,
            heterogeneity: config.heterogeneity,
            dialect: config.dialect,
            max_or_factors: config.max_or_factors,
            cache: config.translation_cache.clone(),
            statement: SelectStatement::new(SqlSource::table(ty.table(), BASE_ALIAS)),
            binding: Binding::Entity {
                entity: entity.to_owned(),
                alias: BASE_ALIAS.to_owned(),
                prefix: String::new(),
            },
            element: HostType::entity(entity),
            store: store.cloned().unwrap_or_else(|| home.clone()),
            home,
            joins: HashMap::new(),
            next_alias: 0,
            includes: Some(AssociationTree::new(model, entity)),
            crossed_many: false,
            factors: FactorCache::new(),
            decompositions: DecompositionCache::new(),
        })
    }

    pub(crate) fn fresh_alias(&mut self, prefix: &str) -> String {
        self.next_alias += 1;
        format!("{prefix}{}", self.next_alias)
    }

    /// Returns true when the statement groups or aggregates its rows.
    pub(crate) fn is_grouped(&self) -> bool {
        !self.statement.group_by.is_empty() || self.statement.aggregation.is_some()
    }

    /// Returns true when extending the statement would change what an
    /// earlier operator already decided.
    pub(crate) fn is_sealed(&self) -> bool {
        self.statement.is_limited() || self.statement.distinct || self.is_grouped()
    }

    /// Folds the statement into a derived source.
    pub(crate) fn fold(&mut self, carry_order: bool) -> QueryResult<()> {
        self.fold_with(Vec::new(), carry_order)
    }

    /// Folds the statement into a derived source whose selection also
    /// carries `extra`.
    ///
    /// With `carry_order` the current ordering is projected as `__o{i}`
    /// columns and re-applied on the outer statement; otherwise the outer
    /// statement starts unordered.
    pub(crate) fn fold_with(&mut self, extra: Vec<SelectItem>, carry_order: bool) -> QueryResult<()> {
        let mut items = Vec::new();
        let shape = self.binding.project(self.model, None, &mut items)?;
        items.extend(extra);
        let alias = self.fresh_alias("d");

        let mut outer_order = Vec::new();
        if carry_order {
            for (i, order) in self.statement.order_by.iter().enumerate() {
                let column = format!("__o{i}");
                items.push(SelectItem::new(order.expr.clone(), column.clone()));
                outer_order.push(OrderItem::new(SqlExpr::column(alias.as_str(), column), order.descending));
            }
        }

        let mut inner = mem::replace(&mut self.statement, SelectStatement::new(SqlSource::table("", "")));
        if !inner.is_limited() {
            inner.order_by.clear();
        }
        inner.selection = items;
        let mut outer = SelectStatement::new(SqlSource::derived(inner, alias.as_str()));
        outer.order_by = outer_order;

        self.statement = outer;
        self.binding = shape.bind(&alias);
        self.joins.clear();
        trace!(alias = %alias, carry_order, "folded statement into derived source");
        Ok(())
    }

    /// Joins `navigation` from the entity at `owner_alias`, reusing an
    /// existing join of the same kind.
    pub(crate) fn join_navigation(
        &mut self,
        owner_alias: &str,
        owner_prefix: &str,
        navigation: &Navigation,
        kind: JoinKind,
    ) -> QueryResult<String> {
        let target_store = self.model.navigation_store(navigation);
        if self.heterogeneity.crosses(&self.home, &target_store) {
            return Err(QueryError::Translation(format!(
                "navigation '{}' leaves store {} for {target_store}",
                navigation.name(),
                self.home
            )));
        }
        let key = (owner_alias.to_owned(), owner_prefix.to_owned(), navigation.name().to_owned(), kind);
        if let Some(alias) = self.joins.get(&key) {
            return Ok(alias.clone());
        }

        let target = self.model.require(navigation.target())?;
        let alias = self.fresh_alias("j");
        let on = SqlExpr::conjunction(navigation.source_columns().iter().zip(navigation.target_columns()).map(
            |(source, target)| {
                SqlExpr::column(owner_alias, format!("{owner_prefix}{source}"))
                    .eq(SqlExpr::column(alias.as_str(), target.as_str()))
            },
        ))
        .ok_or_else(|| {
            QueryError::Model(CoreError::InvalidModel(format!(
                "navigation '{}' has no join columns",
                navigation.name()
            )))
        })?;

        let source = mem::replace(&mut self.statement.source, SqlSource::table("", ""));
        self.statement.source = source.join(Join { kind, source: SqlSource::table(target.table(), alias.as_str()), on });
        self.joins.insert(key, alias.clone());
        trace!(navigation = navigation.name(), alias = %alias, ?kind, "joined navigation");
        Ok(alias)
    }

    /// Appends an arbitrary join to the source.
    pub(crate) fn attach(&mut self, join: Join) {
        let source = mem::replace(&mut self.statement.source, SqlSource::table("", ""));
        self.statement.source = source.join(join);
    }

    /// Bypasses `count` rows using the dialect's pagination strategy.
    pub(crate) fn skip(&mut self, count: u64) -> QueryResult<()> {
        if count == 0 {
            return Ok(());
        }
        match self.dialect.pagination() {
            PaginationStrategy::OffsetFetch => {
                if self.statement.take.is_some() {
                    self.fold(true)?;
                }
                self.statement.skip = Some(self.statement.skip.unwrap_or(0).saturating_add(count));
            }
            PaginationStrategy::RowNumber => {
                if self.is_sealed() {
                    self.fold(true)?;
                }
                let order_by = mem::take(&mut self.statement.order_by);
                let numbered = SelectItem::new(SqlExpr::RowNumber { order_by }, ROW_NUMBER_COLUMN);
                self.fold_with(vec![numbered], false)?;
                let alias = self.statement.source.alias().to_owned();
                let threshold = i64::try_from(count).unwrap_or(i64::MAX);
                self.statement.add_criteria(SqlExpr::binary(
                    SqlExpr::column(alias.as_str(), ROW_NUMBER_COLUMN),
                    BinaryOp::Gt,
                    SqlExpr::literal(threshold),
                ));
                self.statement.order_by =
                    vec![OrderItem::new(SqlExpr::column(alias, ROW_NUMBER_COLUMN), false)];
            }
        }
        Ok(())
    }

    /// Returns at most `count` rows.
    pub(crate) fn take(&mut self, count: u64) {
        self.statement.take = Some(self.statement.take.map_or(count, |existing| existing.min(count)));
    }

    /// Replaces the current element.
    ///
    /// Includes follow navigation projections into the matching subtree,
    /// restart for other entity projections and are dropped otherwise.
    pub(crate) fn set_result_type(&mut self, binding: Binding, element: HostType, projection: Projection<'_>) {
        self.includes = match projection {
            Projection::Navigation(path) => {
                let subtree = self.includes.as_ref().and_then(|tree| tree.subtree(path));
                match (subtree, element.entity_name()) {
                    (Some(tree), _) => Some(tree),
                    (None, Some(entity)) => Some(AssociationTree::new(self.model, entity)),
                    (None, None) => None,
                }
            }
            Projection::Entity => element.entity_name().map(|entity| AssociationTree::new(self.model, entity)),
            Projection::Opaque => None,
        };
        self.binding = binding;
        self.element = element;
    }

    /// Grows the includes tree; returns false when the element is not an
    /// entity.
    pub(crate) fn add_include(&mut self, path: &[String]) -> QueryResult<bool> {
        match self.includes.as_mut() {
            Some(tree) => {
                tree.grow(self.model, path)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Projects the current element and joins every local include.
    pub(crate) fn finish(mut self) -> QueryResult<Finished> {
        let paths = self.includes.as_ref().map(AssociationTree::paths).unwrap_or_default();
        if !paths.is_empty() && self.is_sealed() {
            self.fold(true)?;
        }

        let mut items = Vec::new();
        let mut shape = self.binding.project(self.model, None, &mut items)?;
        let mut remote: Vec<RemoteInclude> = Vec::new();

        if let (Binding::Entity { entity, alias, prefix }, RowShape::Object { includes, .. }) =
            (self.binding.clone(), &mut shape)
        {
            let mut local = AssociationTree::new(self.model, &entity);
            for path in &paths {
                let resolved = AtrophyPath::resolve(self.model, &entity, path)?;
                let decomposition = self.decompositions.decompose(&resolved, self.heterogeneity);
                local.grow_path(decomposition.base.association());
                let Some(bridge) = decomposition.bridge else { continue };
                let owner_path = decomposition.base.association().names();
                let nested: Vec<Vec<String>> = decomposition
                    .attaching
                    .map(|rest| rest.association().names())
                    .filter(|names| !names.is_empty())
                    .into_iter()
                    .collect();
                match remote
                    .iter_mut()
                    .find(|r| r.owner_path == owner_path && r.bridge.navigation == bridge.step.navigation)
                {
                    Some(existing) => {
                        for path in nested {
                            if !existing.nested.contains(&path) {
                                existing.nested.push(path);
                            }
                        }
                    }
                    None => remote.push(RemoteInclude { owner_path, bridge: bridge.step, nested }),
                }
            }
            *includes = self.join_includes(local.root(), &alias, &prefix, "", &mut items)?;
        }

        self.statement.selection = items;
        trace!(statement = %self.statement, remote = remote.len(), "finished statement");
        Ok(Finished { statement: self.statement, shape, includes: self.includes, remote })
    }

    fn join_includes(
        &mut self,
        node: &AssociationNode,
        owner_alias: &str,
        owner_prefix: &str,
        out_prefix: &str,
        items: &mut Vec<SelectItem>,
    ) -> QueryResult<Vec<IncludeShape>> {
        let owner = self.model.require(node.entity())?;
        let mut out = Vec::new();
        for child in node.children() {
            let Some(via) = child.via() else { continue };
            let navigation = owner
                .navigation(via)
                .ok_or_else(|| CoreError::unknown_member(node.entity(), via))?;
            let alias = self.join_navigation(owner_alias, owner_prefix, navigation, JoinKind::LeftOuter)?;
            let target = self.model.require(child.entity())?;
            let prefix = format!("{out_prefix}{via}__");
            for column in physical_columns(target) {
                items.push(SelectItem::new(SqlExpr::column(alias.as_str(), column), format!("{prefix}{column}")));
            }
            let includes = self.join_includes(child, &alias, "", &prefix, items)?;
            out.push(IncludeShape {
                navigation: via.to_owned(),
                many: child.multiplicity().is_many(),
                entity: child.entity().to_owned(),
                prefix,
                includes,
            });
        }
        Ok(out)
    }

    /// Projects the current element without include joins, for embedding
    /// in a set source or a join.
    pub(crate) fn into_operand(mut self) -> QueryResult<Operand> {
        let mut items = Vec::new();
        let shape = self.binding.project(self.model, None, &mut items)?;
        self.statement.selection = items;
        Ok(Operand { statement: self.statement, shape, includes: self.includes })
    }

    /// Combines the statement with `right` under a set operator.
    pub(crate) fn combine(&mut self, operator: SetOperator, right: Operand) -> QueryResult<()> {
        let mut items = Vec::new();
        let shape = self.binding.project(self.model, None, &mut items)?;
        if shape.signature() != right.shape.signature() {
            return Err(QueryError::Translation(format!(
                "set operands have different shapes: {} and {}",
                shape.signature(),
                right.shape.signature()
            )));
        }

        let mut left = mem::replace(&mut self.statement, SelectStatement::new(SqlSource::table("", "")));
        if !left.is_limited() {
            left.order_by.clear();
        }
        left.selection = items;
        let mut right_statement = right.statement;
        if !right_statement.is_limited() {
            right_statement.order_by.clear();
        }

        let alias = self.fresh_alias("s");
        self.statement = SelectStatement::new(SqlSource::Set {
            operator,
            left: Box::new(left),
            right: Box::new(right_statement),
            alias: alias.clone(),
        });
        self.binding = shape.bind(&alias);
        self.joins.clear();
        if let (Some(ours), Some(theirs)) = (self.includes.as_mut(), right.includes.as_ref()) {
            ours.merge(theirs)?;
        }
        trace!(alias = %alias, ?operator, "combined statements");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use strata_core::{Attribute, EntityType, ModelCatalog};

    use super::*;

    fn model() -> ModelCatalog {
        ModelCatalog::new("main")
            .with_entity(
                EntityType::new("User", "users")
                    .with_key("id")
                    .with_attribute(Attribute::primitive("id", "id", HostType::Int))
                    .with_attribute(Attribute::primitive("team_id", "team_id", HostType::Int))
                    .with_navigation(Navigation::reference("team", "Team", "team_id", "id"))
                    .with_navigation(Navigation::collection("posts", "Post", "id", "user_id")),
            )
            .with_entity(
                EntityType::new("Team", "teams")
                    .with_key("id")
                    .with_attribute(Attribute::primitive("id", "id", HostType::Int)),
            )
            .with_entity(
                EntityType::new("Post", "posts")
                    .with_key("id")
                    .with_attribute(Attribute::primitive("id", "id", HostType::Int))
                    .with_attribute(Attribute::primitive("user_id", "user_id", HostType::Int))
                    .with_store("archive"),
            )
    }

    fn context(model: &ModelCatalog, dialect: Dialect) -> CompilationContext<'_> {
        CompilationContext::new(model, &CompilerConfig::new().dialect(dialect), "User", None).expect("context")
    }

    #[test]
    fn fold_resets_joins_and_rebinds() {
        let model = model();
        let mut ctx = context(&model, Dialect::PostgreSql);
        let team = model.entity("User").and_then(|u| u.navigation("team")).expect("team");
        let first = ctx.join_navigation("t0", "", team, JoinKind::LeftOuter).expect("join");
        let again = ctx.join_navigation("t0", "", team, JoinKind::LeftOuter).expect("join");
        assert_eq!(first, again);
        assert_eq!(ctx.statement.source.join_count(), 1);

        ctx.statement.order_by.push(OrderItem::new(SqlExpr::column("t0", "id"), true));
        ctx.fold(true).expect("fold");
        assert!(matches!(ctx.statement.source, SqlSource::Derived { .. }));
        assert_eq!(ctx.statement.order_by.len(), 1);
        let Binding::Entity { alias, .. } = ctx.binding.clone() else { panic!("entity binding") };
        assert_eq!(alias, ctx.statement.source.alias());

        let rejoined = ctx.join_navigation(&alias, "", team, JoinKind::LeftOuter).expect("join");
        assert_ne!(rejoined, first);
    }

    #[test]
    fn joins_do_not_leave_the_store() {
        let model = model();
        let mut ctx = context(&model, Dialect::PostgreSql);
        let posts = model.entity("User").and_then(|u| u.navigation("posts")).expect("posts");
        let err = ctx.join_navigation("t0", "", posts, JoinKind::Inner).expect_err("cross store");
        assert!(err.is_degradable());
    }

    #[test]
    fn offset_pagination_folds_after_take() {
        let model = model();
        let mut ctx = context(&model, Dialect::PostgreSql);
        ctx.skip(2).expect("skip");
        ctx.take(3);
        assert_eq!((ctx.statement.skip, ctx.statement.take), (Some(2), Some(3)));

        ctx.skip(1).expect("skip");
        assert!(matches!(ctx.statement.source, SqlSource::Derived { .. }));
        assert_eq!((ctx.statement.skip, ctx.statement.take), (Some(1), None));
    }

    #[test]
    fn row_number_pagination_filters_on_the_number() {
        let model = model();
        let mut ctx = context(&model, Dialect::SqlServer);
        ctx.statement.order_by.push(OrderItem::new(SqlExpr::column("t0", "id"), false));
        ctx.skip(2).expect("skip");
        assert_eq!(ctx.statement.skip, None);
        let criteria = ctx.statement.criteria.as_ref().expect("criteria").to_string();
        assert!(criteria.contains("__rn > 2"), "{criteria}");
        let SqlSource::Derived { statement, .. } = &ctx.statement.source else { panic!("derived") };
        assert!(statement.selection.iter().any(|item| item.expr.has_window()));
    }

    #[test]
    fn remote_includes_split_at_the_store_boundary() {
        let model = model();
        let mut ctx = context(&model, Dialect::PostgreSql);
        assert!(ctx.add_include(&["team".to_owned()]).expect("include"));
        assert!(ctx.add_include(&["posts".to_owned()]).expect("include"));
        let finished = ctx.finish().expect("finish");
        assert_eq!(finished.statement.source.join_count(), 1);
        assert_eq!(finished.shape.includes().len(), 1);
        assert_eq!(finished.remote.len(), 1);
        assert_eq!(finished.remote[0].bridge.navigation, "posts");
        assert!(finished.remote[0].owner_path.is_empty());
    }
}
