//! Query compilation.
//!
//! [`QueryCompiler::compile`] turns a [`Query`] into a [`CompiledQuery`]: a
//! relational statement, the [`RowShape`] its rows are read back with, and
//! the complementary in-memory steps for whatever part of the chain had no
//! relational form.

mod binding;
mod cache;
mod config;
mod context;
mod relational;
mod shape;
mod translate;

use serde::Serialize;
use strata_core::{DomainModel, HostType, StoreSymbol};
use tracing::{debug, instrument};

pub use cache::TranslationCache;
pub use config::{CompilerConfig, DEFAULT_MAX_OR_FACTORS};
pub use shape::{IncludeShape, RemoteInclude, ResultCategory, RowShape};

pub(crate) use context::Operand;

use self::context::CompilationContext;
use self::relational::{Phase, RelationalCompiler};
use crate::chain::Query;
use crate::complement::ComplementaryStep;
use crate::error::{QueryError, QueryResult};
use crate::navigation::AssociationTree;
use crate::sql::{Dialect, SelectStatement};
use crate::traverse::walk;

/// The output of a compilation.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    /// The statement to run against `store`.
    pub statement: SelectStatement,
    /// How result rows map back onto values.
    pub shape: RowShape,
    /// In-memory steps applied to the materialized rows, in order.
    pub complement: Vec<ComplementaryStep>,
    /// Navigations loaded with every element, when the element is an entity.
    pub includes: Option<AssociationTree>,
    /// Included navigations loaded by separate queries in other stores.
    pub remote_includes: Vec<RemoteInclude>,
    /// The store the statement runs against.
    pub store: StoreSymbol,
    /// The dialect the statement was shaped for.
    pub dialect: Dialect,
    /// Type of the query's value.
    pub result_type: HostType,
}

impl CompiledQuery {
    /// The materialization category of the statement's rows.
    #[must_use]
    pub const fn category(&self) -> ResultCategory {
        self.shape.category()
    }

    /// Returns true when no operator runs in memory.
    ///
    /// Steps that only read rows back (element access, scalar reads) do
    /// not count.
    #[must_use]
    pub fn is_fully_relational(&self) -> bool {
        self.complement.iter().all(ComplementaryStep::is_residual)
    }

    /// A serializable summary for logs and plan inspection.
    #[must_use]
    pub fn explain(&self) -> Explain<'_> {
        Explain {
            store: self.store.as_str(),
            dialect: self.dialect,
            sql: self.statement.to_string(),
            category: self.category(),
            complement: self.complement.iter().map(ToString::to_string).collect(),
            remote_includes: self.remote_includes.iter().map(|r| r.bridge.navigation.as_str()).collect(),
        }
    }
}

/// Summary of a compiled query.
#[derive(Debug, Serialize)]
pub struct Explain<'a> {
    /// Store the statement runs against.
    pub store: &'a str,
    /// Target dialect.
    pub dialect: Dialect,
    /// Rendered statement.
    pub sql: String,
    /// Materialization category.
    pub category: ResultCategory,
    /// Rendered complementary steps.
    pub complement: Vec<String>,
    /// Bridge navigations of remote includes.
    pub remote_includes: Vec<&'a str>,
}

/// Compiles queries against a domain model.
pub struct QueryCompiler<'m> {
    model: &'m dyn DomainModel,
    config: CompilerConfig,
}

impl<'m> QueryCompiler<'m> {
    /// Creates a compiler.
    #[must_use]
    pub fn new(model: &'m dyn DomainModel, config: CompilerConfig) -> Self {
        Self { model, config }
    }

    /// The compiler configuration.
    #[must_use]
    pub const fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// The domain model queries are compiled against.
    #[must_use]
    pub fn model(&self) -> &'m dyn DomainModel {
        self.model
    }

    /// Compiles `query`.
    ///
    /// Operators without a relational form do not fail the compilation;
    /// they end up in [`CompiledQuery::complement`]. Errors are reserved for
    /// malformed queries and model inconsistencies.
    #[instrument(level = "debug", skip_all, fields(entity = query.source().entity()))]
    pub fn compile(&self, query: &Query) -> QueryResult<CompiledQuery> {
        let (ctx, complement) = self.relational(query)?;
        let store = ctx.store.clone();
        let dialect = ctx.dialect;
        let finished = ctx.finish()?;
        debug!(
            statement = %finished.statement,
            steps = complement.len(),
            remote = finished.remote.len(),
            "compiled query"
        );
        Ok(CompiledQuery {
            statement: finished.statement,
            shape: finished.shape,
            complement,
            includes: finished.includes,
            remote_includes: finished.remote,
            store,
            dialect,
            result_type: query.result_type(),
        })
    }

    fn relational(&self, query: &Query) -> QueryResult<(CompilationContext<'m>, Vec<ComplementaryStep>)> {
        let ctx = CompilationContext::new(self.model, &self.config, query.source().entity(), query.source().store())?;
        let mut compiler = RelationalCompiler::new(self, ctx);
        let steps = match query.chain() {
            Some(chain) => walk(&mut compiler, chain, Phase::Relational, &RelationalCompiler::hooks())?,
            None => Vec::new(),
        };
        Ok((compiler.ctx, steps))
    }

    /// Compiles a sub-query embedded in a statement against `store`.
    ///
    /// Only sequences that compile entirely to one statement in the same
    /// store qualify.
    pub(crate) fn operand(&self, query: &Query, store: &StoreSymbol) -> QueryResult<Operand> {
        if !query.result_type().is_sequence() {
            return Err(QueryError::Translation("a scalar sub-query cannot be embedded".into()));
        }
        let (ctx, steps) = self.relational(query)?;
        if ctx.store != *store {
            return Err(QueryError::Translation(format!(
                "sub-query runs against store {} instead of {store}",
                ctx.store
            )));
        }
        if !steps.is_empty() {
            return Err(QueryError::Translation("sub-query needs in-memory steps".into()));
        }
        ctx.into_operand()
    }
}

impl std::fmt::Debug for QueryCompiler<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCompiler").field("config", &self.config).finish_non_exhaustive()
    }
}
