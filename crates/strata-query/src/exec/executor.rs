//! End-to-end execution: compile, run the statement, read, complete.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use strata_core::{DomainModel, StoreSymbol, Value};
use tracing::{debug, instrument};

use super::context::{ExecutionConfig, ExecutionContext};
use super::include;
use super::reader::reader;
use super::source::DataSource;
use crate::chain::Query;
use crate::compile::{CompiledQuery, CompilerConfig, QueryCompiler};
use crate::complement::{self, SubqueryRunner};
use crate::error::{QueryError, QueryResult};
use crate::expr::HostFunctions;

/// The value a query evaluates to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryOutput {
    /// The elements of a sequence-valued query.
    Sequence(Vec<Value>),
    /// The result of a terminal operator.
    Scalar(Value),
}

impl QueryOutput {
    /// The elements; a scalar becomes a one-element sequence.
    #[must_use]
    pub fn into_sequence(self) -> Vec<Value> {
        match self {
            Self::Sequence(values) => values,
            Self::Scalar(value) => vec![value],
        }
    }

    /// The scalar, if the query was terminal.
    #[must_use]
    pub fn into_scalar(self) -> Option<Value> {
        match self {
            Self::Scalar(value) => Some(value),
            Self::Sequence(_) => None,
        }
    }
}

/// Runs queries against one data source per store.
pub struct Executor<'m> {
    compiler: QueryCompiler<'m>,
    sources: HashMap<StoreSymbol, Arc<dyn DataSource>>,
    functions: Arc<HostFunctions>,
    config: ExecutionConfig,
}

impl<'m> Executor<'m> {
    /// Creates an executor with no data sources.
    #[must_use]
    pub fn new(model: &'m dyn DomainModel, config: CompilerConfig) -> Self {
        Self {
            compiler: QueryCompiler::new(model, config),
            sources: HashMap::new(),
            functions: Arc::new(HostFunctions::new()),
            config: ExecutionConfig::default(),
        }
    }

    /// Registers the data source serving `store`.
    #[must_use]
    pub fn with_source(mut self, store: impl Into<StoreSymbol>, source: Arc<dyn DataSource>) -> Self {
        self.sources.insert(store.into(), source);
        self
    }

    /// Sets the functions in-memory lambdas may call.
    #[must_use]
    pub fn with_functions(mut self, functions: HostFunctions) -> Self {
        self.functions = Arc::new(functions);
        self
    }

    /// Sets the configuration of the contexts created by [`Self::execute`].
    #[must_use]
    pub fn with_execution_config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    /// The compiler queries go through.
    #[must_use]
    pub const fn compiler(&self) -> &QueryCompiler<'m> {
        &self.compiler
    }

    /// Compiles and runs `query` in a fresh context.
    pub fn execute(&self, query: &Query) -> QueryResult<QueryOutput> {
        let ctx = ExecutionContext::with_functions(Arc::clone(&self.functions)).with_config(self.config.clone());
        self.execute_with(query, &ctx)
    }

    /// Compiles and runs `query` in `ctx`.
    pub fn execute_with(&self, query: &Query, ctx: &ExecutionContext) -> QueryResult<QueryOutput> {
        let compiled = self.compiler.compile(query)?;
        self.execute_compiled(&compiled, ctx)
    }

    /// Runs an already compiled query.
    #[instrument(level = "debug", skip_all, fields(store = %compiled.store))]
    pub fn execute_compiled(&self, compiled: &CompiledQuery, ctx: &ExecutionContext) -> QueryResult<QueryOutput> {
        if ctx.is_cancelled() {
            return Err(QueryError::Cancelled);
        }
        let source = self
            .sources
            .get(&compiled.store)
            .ok_or_else(|| QueryError::DataSource(format!("no data source for store {}", compiled.store)))?;

        let rows = source.execute(&compiled.statement)?;
        ctx.record_rows_read(rows.len() as u64);
        debug!(rows = rows.len(), "statement returned");

        let model = self.compiler.model();
        let mut values = reader(&compiled.shape, model).read(&rows)?;

        let runner = ScopedRunner { executor: self, ctx };
        for remote in &compiled.remote_includes {
            if ctx.is_cancelled() {
                return Err(QueryError::Cancelled);
            }
            include::attach(&mut values, remote, model, &runner)?;
        }

        let values = if compiled.complement.is_empty() {
            ctx.record_rows_produced(values.len() as u64);
            values
        } else {
            complement::run(&compiled.complement, values, &runner, ctx)?
        };

        if compiled.result_type.is_sequence() {
            Ok(QueryOutput::Sequence(values))
        } else {
            values
                .into_iter()
                .next()
                .map(QueryOutput::Scalar)
                .ok_or_else(|| QueryError::Cardinality("terminal operator produced no value".into()))
        }
    }
}

impl std::fmt::Debug for Executor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut stores: Vec<&str> = self.sources.keys().map(StoreSymbol::as_str).collect();
        stores.sort_unstable();
        f.debug_struct("Executor")
            .field("compiler", &self.compiler)
            .field("stores", &stores)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Runs the sub-queries and remote includes of one execution in its
/// context.
struct ScopedRunner<'e, 'm> {
    executor: &'e Executor<'m>,
    ctx: &'e ExecutionContext,
}

impl SubqueryRunner for ScopedRunner<'_, '_> {
    fn run(&self, query: &Query) -> QueryResult<Vec<Value>> {
        Ok(self.executor.execute_with(query, self.ctx)?.into_sequence())
    }
}

#[cfg(test)]
mod tests {
    use strata_core::{Attribute, EntityType, HostType, ModelCatalog};

    use super::*;
    use crate::chain::QueryOperation;
    use crate::exec::{row, MemoryDataSource};
    use crate::expr::{Expr, Lambda};

    fn model() -> ModelCatalog {
        ModelCatalog::new("main").with_entity(
            EntityType::new("Item", "items")
                .with_key("id")
                .with_attribute(Attribute::primitive("id", "id", HostType::Int))
                .with_attribute(Attribute::primitive("name", "name", HostType::String)),
        )
    }

    fn source() -> Arc<dyn DataSource> {
        Arc::new(MemoryDataSource::new().with_table(
            "items",
            [
                row([("id", Value::Int(1)), ("name", Value::from("a"))]),
                row([("id", Value::Int(2)), ("name", Value::from("b"))]),
            ],
        ))
    }

    fn item() -> HostType {
        HostType::entity("Item")
    }

    #[test]
    fn filters_and_projects() {
        let model = model();
        let executor = Executor::new(&model, CompilerConfig::new()).with_source("main", source());
        let query = Query::new("Item")
            .push(QueryOperation::Where {
                predicate: Lambda::unary("i", item(), Expr::path("i", &["id"]).gt(Expr::int(1)), HostType::Bool),
            })
            .and_then(|q| {
                q.push(QueryOperation::Select {
                    selector: Lambda::unary("i", item(), Expr::path("i", &["name"]), HostType::String),
                })
            })
            .expect("query");
        let out = executor.execute(&query).expect("execute");
        assert_eq!(out, QueryOutput::Sequence(vec![Value::from("b")]));
    }

    #[test]
    fn terminal_operators_yield_scalars() {
        let model = model();
        let executor = Executor::new(&model, CompilerConfig::new()).with_source("main", source());
        let query = Query::new("Item").push(QueryOperation::Count { predicate: None, long: false }).expect("query");
        let out = executor.execute(&query).expect("execute");
        assert_eq!(out.into_scalar(), Some(Value::Int(2)));
    }

    #[test]
    fn missing_store_is_a_data_source_error() {
        let model = model();
        let executor = Executor::new(&model, CompilerConfig::new());
        let err = executor.execute(&Query::new("Item")).expect_err("no source");
        assert!(matches!(err, QueryError::DataSource(_)));
    }

    #[test]
    fn cancelled_contexts_do_not_run() {
        let model = model();
        let executor = Executor::new(&model, CompilerConfig::new()).with_source("main", source());
        let ctx = ExecutionContext::new();
        ctx.cancel();
        let err = executor.execute_with(&Query::new("Item"), &ctx).expect_err("cancelled");
        assert!(matches!(err, QueryError::Cancelled));
    }
}
