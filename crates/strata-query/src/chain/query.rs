//! A query: a root entity source plus an optional operator chain.

use std::fmt;

use strata_core::{HostType, StoreSymbol};

use super::{QueryChain, QueryOperation};
use crate::error::{QueryError, QueryResult};

/// The root of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySource {
    entity: String,
    store: Option<StoreSymbol>,
}

impl QuerySource {
    /// The queried entity type.
    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// An explicit store overriding the entity's own store.
    #[must_use]
    pub const fn store(&self) -> Option<&StoreSymbol> {
        self.store.as_ref()
    }
}

/// A query over the instances of one entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    source: QuerySource,
    chain: Option<QueryChain>,
}

impl Query {
    /// A query returning every instance of `entity`.
    #[must_use]
    pub fn new(entity: impl Into<String>) -> Self {
        Self { source: QuerySource { entity: entity.into(), store: None }, chain: None }
    }

    /// Reads the source from `store` instead of the entity's store.
    #[must_use]
    pub fn with_store(mut self, store: impl Into<StoreSymbol>) -> Self {
        self.source.store = Some(store.into());
        self
    }

    /// Attaches an operator chain.
    pub fn with_chain(mut self, chain: QueryChain) -> QueryResult<Self> {
        let source = self.source_type();
        if !chain.source_type().accepts(&source) {
            return Err(QueryError::type_mismatch(chain.source_type(), source));
        }
        self.chain = Some(chain);
        Ok(self)
    }

    /// Appends an operator after the current tail.
    pub fn push(&self, operation: QueryOperation) -> QueryResult<Self> {
        let node = QueryChain::new(operation, self.result_type(), None)?;
        let chain = match &self.chain {
            Some(chain) => chain.concat(node)?,
            None => node,
        };
        Ok(Self { source: self.source.clone(), chain: Some(chain) })
    }

    /// The root source.
    #[must_use]
    pub const fn source(&self) -> &QuerySource {
        &self.source
    }

    /// The operator chain, if any.
    #[must_use]
    pub const fn chain(&self) -> Option<&QueryChain> {
        self.chain.as_ref()
    }

    /// The sequence type the chain consumes.
    #[must_use]
    pub fn source_type(&self) -> HostType {
        HostType::sequence(HostType::entity(self.source.entity.clone()))
    }

    /// The type the query produces.
    #[must_use]
    pub fn result_type(&self) -> HostType {
        self.chain.as_ref().map_or_else(|| self.source_type(), QueryChain::final_type)
    }

    /// The element type of the produced sequence, or the scalar type for
    /// terminal queries.
    #[must_use]
    pub fn element_type(&self) -> HostType {
        let result = self.result_type();
        result.element_type().cloned().unwrap_or(result)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source.entity)?;
        if let Some(chain) = &self.chain {
            write!(f, ".{chain}")?;
        }
        Ok(())
    }
}
