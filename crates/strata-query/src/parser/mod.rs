//! Call-chain parser.
//!
//! A [`CapturedQuery`] records the collection-query calls made against a
//! root entity, by name and positional arguments, the way a host language
//! front end would capture them:
//!
//! ```
//! use strata_query::parser::CapturedQuery;
//!
//! let captured = CapturedQuery::new("User")
//!     .call("where", vec!["x => x.id > 1".into()])
//!     .call("select", vec!["x => x.name".into()]);
//! assert_eq!(captured.to_string(), "User.where(x => x.id > 1).select(x => x.name)");
//! ```
//!
//! [`CapturedQuery::parse`] maps every call onto exactly one query
//! operator, binding lambda parameter types from the operator it is passed
//! to.

mod calls;

use std::fmt;

use strata_core::{DomainModel, HostType, StoreSymbol, Value};

use crate::chain::Query;
use crate::error::QueryResult;
use crate::expr::UntypedLambda;

/// One positional argument of a captured call.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    /// Lambda text such as `x => x.id`, or a dotted include path.
    Text(String),
    /// An already parsed lambda.
    Lambda(UntypedLambda),
    /// A constant.
    Value(Value),
    /// A nested query, for joins and set operators.
    Query(CapturedQuery),
    /// A target type, for casts.
    Type(HostType),
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => write!(f, "{text}"),
            Self::Lambda(lambda) => write!(f, "({}) => {}", lambda.params().join(", "), lambda.body()),
            Self::Value(value) => write!(f, "{value}"),
            Self::Query(query) => write!(f, "{query}"),
            Self::Type(ty) => write!(f, "{ty}"),
        }
    }
}

impl From<&str> for Argument {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<UntypedLambda> for Argument {
    fn from(lambda: UntypedLambda) -> Self {
        Self::Lambda(lambda)
    }
}

impl From<Value> for Argument {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<i64> for Argument {
    fn from(value: i64) -> Self {
        Self::Value(Value::Int(value))
    }
}

impl From<i32> for Argument {
    fn from(value: i32) -> Self {
        Self::Value(Value::Int(i64::from(value)))
    }
}

impl From<CapturedQuery> for Argument {
    fn from(query: CapturedQuery) -> Self {
        Self::Query(query)
    }
}

impl From<HostType> for Argument {
    fn from(ty: HostType) -> Self {
        Self::Type(ty)
    }
}

/// A captured method call.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    name: String,
    args: Vec<Argument>,
}

impl MethodCall {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[Argument] {
        &self.args
    }
}

impl fmt::Display for MethodCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")")
    }
}

/// Calls captured against a root entity.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedQuery {
    source: String,
    store: Option<StoreSymbol>,
    calls: Vec<MethodCall>,
}

impl CapturedQuery {
    /// Starts a capture over every instance of `source`.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self { source: source.into(), store: None, calls: Vec::new() }
    }

    /// Reads the root from an explicit store.
    #[must_use]
    pub fn with_store(mut self, store: impl Into<StoreSymbol>) -> Self {
        self.store = Some(store.into());
        self
    }

    /// Records a call.
    #[must_use]
    pub fn call(mut self, name: impl Into<String>, args: Vec<Argument>) -> Self {
        self.calls.push(MethodCall { name: name.into(), args });
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn calls(&self) -> &[MethodCall] {
        &self.calls
    }

    /// Builds the query chain.
    ///
    /// Unknown call names are unsupported; malformed arguments are illegal
    /// expressions.
    pub fn parse(&self, model: &dyn DomainModel) -> QueryResult<Query> {
        model.require(&self.source)?;
        let mut query = Query::new(self.source.clone());
        if let Some(store) = &self.store {
            query = query.with_store(store.clone());
        }
        for call in &self.calls {
            let operation = calls::operation(call, &query, model)?;
            tracing::trace!(call = %call, operator = %operation.kind(), "parsed call");
            query = query.push(operation)?;
        }
        Ok(query)
    }
}

impl fmt::Display for CapturedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)?;
        for call in &self.calls {
            write!(f, ".{call}")?;
        }
        Ok(())
    }
}
