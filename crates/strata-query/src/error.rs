//! Error types for query construction, compilation and execution.

use strata_core::CoreError;
use thiserror::Error;

/// Errors that can occur while building, compiling or running a query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// An operator or expression shape with no relational or in-memory
    /// equivalent.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A malformed argument to an operator.
    #[error("illegal expression '{expression}': {reason}")]
    IllegalExpression {
        /// The offending expression, rendered as text.
        expression: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An expression could not be turned into a relational expression.
    ///
    /// The compiler recovers from this locally by running the operator in
    /// memory.
    #[error("cannot translate to a relational expression: {0}")]
    Translation(String),

    /// The result of an expression could be bound to more than one
    /// relational source.
    #[error("ambiguous result: {0}")]
    AmbiguousResult(String),

    /// A cardinality rule was violated at execution time.
    #[error("invalid operation: {0}")]
    Cardinality(String),

    /// An operator received a type it cannot work with.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The expected type.
        expected: String,
        /// The actual type.
        actual: String,
    },

    /// An in-memory expression evaluation failed.
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// An in-memory operator buffered more rows than allowed.
    #[error("query too large: {actual} rows buffered, limit is {limit}")]
    QueryTooLarge {
        /// Rows buffered when the limit was hit.
        actual: usize,
        /// The configured limit.
        limit: usize,
    },

    /// The execution was cancelled.
    #[error("query cancelled")]
    Cancelled,

    /// The data source failed to execute a statement.
    #[error("data source error: {0}")]
    DataSource(String),

    /// The domain model could not resolve a type or member.
    #[error(transparent)]
    Model(#[from] CoreError),
}

impl QueryError {
    /// Creates an illegal expression error.
    #[must_use]
    pub fn illegal(expression: impl ToString, reason: impl Into<String>) -> Self {
        Self::IllegalExpression { expression: expression.to_string(), reason: reason.into() }
    }

    /// Creates a type mismatch error.
    #[must_use]
    pub fn type_mismatch(expected: impl ToString, actual: impl ToString) -> Self {
        Self::TypeMismatch { expected: expected.to_string(), actual: actual.to_string() }
    }

    /// Returns true when the compiler may recover by deferring the operator
    /// to the in-memory pipeline.
    ///
    /// Illegal expressions and ambiguous results always propagate.
    #[must_use]
    pub const fn is_degradable(&self) -> bool {
        matches!(self, Self::Translation(_))
    }
}

impl From<sqlparser::parser::ParserError> for QueryError {
    fn from(err: sqlparser::parser::ParserError) -> Self {
        Self::IllegalExpression { expression: String::new(), reason: err.to_string() }
    }
}

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;
