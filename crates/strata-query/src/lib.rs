//! Strata Query
//!
//! Query compilation for the Strata object/relational mapper.
//!
//! # Overview
//!
//! The query system consists of several layers:
//!
//! - **Chain**: a root entity source followed by a persistent chain of
//!   query operators, each typed against the sequence it consumes
//! - **Parser**: maps captured collection-query calls onto the chain
//! - **Navigation**: association and attribute trees, degeneration and the
//!   heterogeneity check for paths that cross stores
//! - **Compile**: the relational compiler turning a chain into one
//!   relational statement plus the in-memory steps it could not express
//! - **Complement**: the pull-based in-memory pipeline for those steps
//! - **Exec**: data sources, result readers and the [`Executor`] that runs
//!   all of the above
//!
//! # Modules
//!
//! - [`chain`] - Query operators and the query chain
//! - [`traverse`] - Chain traversal with composition hooks
//! - [`expr`] - Lambda expressions, typing and in-memory evaluation
//! - [`parser`] - Call-chain parser
//! - [`navigation`] - Association paths and trees
//! - [`sql`] - The relational statement model and dialects
//! - [`compile`] - The relational compiler
//! - [`complement`] - The complementary in-memory pipeline
//! - [`exec`] - Query execution
//! - [`error`] - Error types
//!
//! # Quick Start
//!
//! Compile a filtered projection:
//!
//! ```
//! use strata_core::{Attribute, EntityType, HostType, ModelCatalog};
//! use strata_query::parser::CapturedQuery;
//! use strata_query::{CompilerConfig, QueryCompiler};
//!
//! let model = ModelCatalog::new("main").with_entity(
//!     EntityType::new("User", "users")
//!         .with_key("id")
//!         .with_attribute(Attribute::primitive("id", "id", HostType::Int))
//!         .with_attribute(Attribute::primitive("name", "name", HostType::String)),
//! );
//!
//! let query = CapturedQuery::new("User")
//!     .call("where", vec!["u => u.id > 1".into()])
//!     .call("select", vec!["u => u.name".into()])
//!     .parse(&model)?;
//!
//! let compiled = QueryCompiler::new(&model, CompilerConfig::new()).compile(&query)?;
//! assert!(compiled.is_fully_relational());
//! println!("{}", compiled.statement);
//! # Ok::<(), strata_query::QueryError>(())
//! ```
//!
//! Run it against in-memory tables:
//!
//! ```
//! use std::sync::Arc;
//!
//! use strata_core::{Attribute, EntityType, HostType, ModelCatalog, Value};
//! use strata_query::exec::{row, MemoryDataSource};
//! use strata_query::parser::CapturedQuery;
//! use strata_query::{CompilerConfig, Executor, QueryOutput};
//!
//! let model = ModelCatalog::new("main").with_entity(
//!     EntityType::new("User", "users")
//!         .with_key("id")
//!         .with_attribute(Attribute::primitive("id", "id", HostType::Int))
//!         .with_attribute(Attribute::primitive("name", "name", HostType::String)),
//! );
//! let users = MemoryDataSource::new().with_table(
//!     "users",
//!     [
//!         row([("id", Value::Int(1)), ("name", Value::from("a"))]),
//!         row([("id", Value::Int(2)), ("name", Value::from("b"))]),
//!     ],
//! );
//!
//! let executor = Executor::new(&model, CompilerConfig::new()).with_source("main", Arc::new(users));
//! let query = CapturedQuery::new("User")
//!     .call("where", vec!["u => u.id > 1".into()])
//!     .call("select", vec!["u => u.name".into()])
//!     .parse(&model)?;
//! assert_eq!(executor.execute(&query)?, QueryOutput::Sequence(vec![Value::from("b")]));
//! # Ok::<(), strata_query::QueryError>(())
//! ```

// Deny unwrap in library code to ensure proper error handling
#![deny(clippy::unwrap_used)]

pub mod chain;
pub mod compile;
pub mod complement;
pub mod error;
pub mod exec;
pub mod expr;
pub mod navigation;
pub mod parser;
pub mod sql;
pub mod traverse;

// Re-export commonly used items at the crate root
pub use chain::{OperatorKind, Query, QueryChain, QueryOperation};
pub use compile::{CompiledQuery, CompilerConfig, QueryCompiler, ResultCategory, RowShape, TranslationCache};
pub use error::{QueryError, QueryResult};
pub use exec::{DataSource, ExecutionContext, Executor, MemoryDataSource, QueryOutput};
pub use expr::{Expr, HostFunctions, Lambda};
pub use sql::{Dialect, SelectStatement};
