//! Query execution.
//!
//! An [`Executor`] compiles a query, hands the statement to the
//! [`DataSource`] of its store, reads the rows back into values, loads
//! cross-store includes and finally runs the complementary pipeline.
//! [`MemoryDataSource`] evaluates statements over in-memory tables.

mod context;
mod executor;
mod include;
mod memory;
mod reader;
mod source;

pub use context::{ExecutionConfig, ExecutionContext, ExecutionStats, DEFAULT_MAX_ROWS_IN_MEMORY};
pub use executor::{Executor, QueryOutput};
pub use memory::MemoryDataSource;
pub use reader::{reader, ResultReader};
pub use source::{row, DataSource, Row, RowSet};
