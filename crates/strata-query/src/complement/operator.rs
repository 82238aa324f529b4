//! Operator trait and base types.
//!
//! Complementary steps run as a chain of pull-based operators over
//! materialized values, each one pulling from its input.

use strata_core::Value;

use crate::error::QueryResult;
use crate::exec::ExecutionContext;

/// The state of an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorState {
    /// Operator has not been opened yet.
    Created,
    /// Operator is open and ready to produce values.
    Open,
    /// Operator has finished producing values.
    Finished,
    /// Operator has been closed.
    Closed,
}

impl OperatorState {
    /// Returns true if the operator is open.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns true if the operator has finished.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Finished)
    }

    /// Returns true if the operator is closed.
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// A pull-based operator over materialized values.
///
/// # Lifecycle
///
/// 1. **Created**: Initial state after construction
/// 2. **Open**: After `open()` is called; ready to produce values
/// 3. **Finished**: After `next()` returns `None`; no more values
/// 4. **Closed**: After `close()` is called; buffers released
pub trait Operator: Send {
    /// Opens the operator and, recursively, its input.
    fn open(&mut self, ctx: &ExecutionContext) -> QueryResult<()>;

    /// Returns the next value, or `None` when the operator is exhausted.
    fn next(&mut self) -> QueryResult<Option<Value>>;

    /// Closes the operator and, recursively, its input.
    fn close(&mut self) -> QueryResult<()>;

    /// Returns the current state of this operator.
    fn state(&self) -> OperatorState;

    /// Returns the name of this operator type.
    fn name(&self) -> &'static str;
}

/// A boxed operator for dynamic dispatch.
pub type BoxedOperator = Box<dyn Operator>;

/// State shared by every operator.
#[derive(Debug)]
pub struct OperatorBase {
    state: OperatorState,
    produced: u64,
}

impl OperatorBase {
    #[must_use]
    pub const fn new() -> Self {
        Self { state: OperatorState::Created, produced: 0 }
    }

    #[must_use]
    pub const fn state(&self) -> OperatorState {
        self.state
    }

    pub fn set_open(&mut self) {
        self.state = OperatorState::Open;
    }

    pub fn set_finished(&mut self) {
        self.state = OperatorState::Finished;
    }

    pub fn set_closed(&mut self) {
        self.state = OperatorState::Closed;
    }

    pub fn inc_produced(&mut self) {
        self.produced += 1;
    }

    /// Number of values produced so far.
    #[must_use]
    pub const fn produced(&self) -> u64 {
        self.produced
    }
}

impl Default for OperatorBase {
    fn default() -> Self {
        Self::new()
    }
}
