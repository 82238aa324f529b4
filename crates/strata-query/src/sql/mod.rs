//! Relational statement object model.
//!
//! The compiler's output: a tree of [`SelectStatement`]s over table,
//! derived, set and joined sources. Rendering to dialect-specific SQL text
//! happens outside this crate; the `Display` impls produce a readable
//! pseudo-SQL used in logs and tests. Every type here is serializable so a
//! compiled statement can be cached or handed to an external renderer.

mod dialect;
mod expr;
mod statement;

pub use dialect::{Dialect, PaginationStrategy};
pub use expr::{AggregateFunction, SqlExpr};
pub use statement::{AggregateTag, Join, JoinKind, OrderItem, SelectItem, SelectStatement, SqlSource};
