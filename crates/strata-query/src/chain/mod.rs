//! The query chain.
//!
//! A query is a root entity source followed by a singly linked chain of
//! operators. Each [`QueryChain`] handle points at one node; the node knows
//! the sequence type it consumes, the type it produces and its successor.
//! Chains are persistent and cheap to share: every splice returns a new head.

mod factory;
mod node;
mod operation;
mod query;

pub use node::{Iter, QueryChain, QueryNode};
pub use operation::{ArithFunction, OperatorKind, QueryOperation, SetOperator};
pub(crate) use factory::check_degeneration_path;
pub(crate) use operation::element_of;
pub use query::{Query, QuerySource};
