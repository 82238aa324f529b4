//! Chain nodes and the persistent chain handle.

use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, OnceLock};

use strata_core::{DomainModel, HostType};

use super::operation::{element_of, OperatorKind, QueryOperation};
use crate::error::{QueryError, QueryResult};
use crate::expr::AccessPath;

/// One operator in a query chain.
///
/// Nodes are immutable once built. The tail pointer and the member access
/// list are computed on first use and cached on the node.
pub struct QueryNode {
    operation: QueryOperation,
    source_type: HostType,
    result_type: HostType,
    next: Option<QueryChain>,
    tail: OnceLock<QueryChain>,
    accesses: OnceLock<Vec<AccessPath>>,
}

impl QueryNode {
    /// The operator and its parameters.
    #[must_use]
    pub const fn operation(&self) -> &QueryOperation {
        &self.operation
    }

    /// The operator kind.
    #[must_use]
    pub const fn kind(&self) -> OperatorKind {
        self.operation.kind()
    }

    /// The sequence type this operator consumes.
    #[must_use]
    pub const fn source_type(&self) -> &HostType {
        &self.source_type
    }

    /// The element type of the consumed sequence.
    #[must_use]
    pub fn element_type(&self) -> &HostType {
        self.source_type.element_type().unwrap_or(&self.source_type)
    }

    /// The type this operator produces.
    #[must_use]
    pub const fn result_type(&self) -> &HostType {
        &self.result_type
    }

    /// The downstream operator, or `None` for the tail.
    #[must_use]
    pub const fn next(&self) -> Option<&QueryChain> {
        self.next.as_ref()
    }

    /// Returns true when this node ends the chain.
    #[must_use]
    pub const fn is_tail(&self) -> bool {
        self.next.is_none()
    }

    /// Member chains referenced by the operator's element lambdas.
    pub fn access_paths(&self) -> &[AccessPath] {
        self.accesses.get_or_init(|| {
            let mut out: Vec<AccessPath> = Vec::new();
            for lambda in self.operation.element_lambdas() {
                for path in lambda.access_paths() {
                    if !out.contains(&path) {
                        out.push(path);
                    }
                }
            }
            out
        })
    }

    /// Navigation paths the operator depends on without an explicit include.
    ///
    /// Only accesses rooted at the consumed element count; each path stops
    /// at the first member that is not a navigation.
    #[must_use]
    pub fn implied_includes(&self, model: &dyn DomainModel) -> Vec<Vec<String>> {
        let element = self.element_type();
        let mut out: Vec<Vec<String>> = Vec::new();
        for access in self.access_paths() {
            if access.root != *element {
                continue;
            }
            let Some(mut entity) = access.root.entity_name().map(str::to_owned) else {
                continue;
            };
            let mut path = Vec::new();
            for member in &access.path {
                match model.entity(&entity).and_then(|e| e.navigation(member)) {
                    Some(navigation) => {
                        path.push(member.clone());
                        entity = navigation.target().to_owned();
                    }
                    None => break,
                }
            }
            if !path.is_empty() && !out.contains(&path) {
                out.push(path);
            }
        }
        out
    }
}

impl PartialEq for QueryNode {
    fn eq(&self, other: &Self) -> bool {
        self.operation == other.operation
            && self.source_type == other.source_type
            && self.result_type == other.result_type
            && self.next == other.next
    }
}

impl fmt::Debug for QueryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryNode")
            .field("operation", &self.operation)
            .field("source_type", &self.source_type)
            .field("result_type", &self.result_type)
            .field("next", &self.next)
            .finish_non_exhaustive()
    }
}

/// A shared handle to the head of a query chain.
///
/// Chains are persistent: splicing builds new nodes for the changed prefix
/// and shares the untouched suffix, so handles held elsewhere never observe
/// a change.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryChain(Arc<QueryNode>);

impl Deref for QueryChain {
    type Target = QueryNode;

    fn deref(&self) -> &QueryNode {
        &self.0
    }
}

impl QueryChain {
    /// Builds a node consuming `source_type` and linking to `next`.
    ///
    /// Validates the operator and checks that `next` consumes what this
    /// operator produces.
    pub fn new(
        operation: QueryOperation,
        source_type: HostType,
        next: Option<QueryChain>,
    ) -> QueryResult<Self> {
        operation.validate(&source_type)?;
        let result_type = operation.result_type(&source_type)?;
        if let Some(next) = &next {
            check_link(&result_type, next)?;
        }
        Ok(Self(Arc::new(QueryNode {
            operation,
            source_type,
            result_type,
            next,
            tail: OnceLock::new(),
            accesses: OnceLock::new(),
        })))
    }

    /// The head node.
    #[must_use]
    pub fn head(&self) -> &QueryNode {
        &self.0
    }

    /// Returns true when both handles point at the same node.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// The last node of the chain.
    #[must_use]
    pub fn tail(&self) -> QueryChain {
        match &self.0.next {
            None => self.clone(),
            Some(next) => self.0.tail.get_or_init(|| next.tail()).clone(),
        }
    }

    /// The type produced by the whole chain.
    #[must_use]
    pub fn final_type(&self) -> HostType {
        self.tail().result_type().clone()
    }

    /// Number of nodes.
    #[must_use]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Iterates the chain from this node to the tail.
    #[must_use]
    pub fn iter(&self) -> Iter<'_> {
        Iter { current: Some(self) }
    }

    /// The node `index` steps from the head (0 is the head itself).
    #[must_use]
    pub fn nth(&self, index: usize) -> Option<&QueryChain> {
        self.iter().nth(index)
    }

    /// Skips the head and `steps` further nodes.
    ///
    /// `jump(0)` is the same chain as [`QueryNode::next`].
    #[must_use]
    pub fn jump(&self, steps: usize) -> Option<QueryChain> {
        self.nth(steps + 1).cloned()
    }

    /// A copy of the head node linked to a different continuation.
    pub fn with_next(&self, next: Option<QueryChain>) -> QueryResult<QueryChain> {
        if let Some(next) = &next {
            check_link(&self.0.result_type, next)?;
        }
        Ok(Self(Arc::new(QueryNode {
            operation: self.0.operation.clone(),
            source_type: self.0.source_type.clone(),
            result_type: self.0.result_type.clone(),
            next,
            tail: OnceLock::new(),
            accesses: OnceLock::new(),
        })))
    }

    /// Replaces the last node with `tail`.
    ///
    /// For a single-node chain the result is `tail` itself.
    pub fn replace_tail(&self, tail: QueryChain) -> QueryResult<QueryChain> {
        let nodes: Vec<&QueryChain> = self.iter().collect();
        let prefix = &nodes[..nodes.len().saturating_sub(1)];
        relink(prefix, Some(tail.clone())).map(|chain| chain.unwrap_or(tail))
    }

    /// Replaces `count` nodes starting at `start` with `replacement`.
    ///
    /// Returns `None` when nothing remains.
    pub fn replace(
        &self,
        start: usize,
        count: usize,
        replacement: Option<QueryChain>,
    ) -> QueryResult<Option<QueryChain>> {
        let nodes: Vec<&QueryChain> = self.iter().collect();
        let end = start.checked_add(count).filter(|end| *end <= nodes.len()).ok_or_else(|| {
            QueryError::illegal(self, format!("range {start}+{count} exceeds {} nodes", nodes.len()))
        })?;
        let suffix = nodes.get(end).map(|node| (*node).clone());
        let middle = match replacement {
            Some(replacement) => {
                let replacement_nodes: Vec<&QueryChain> = replacement.iter().collect();
                relink(&replacement_nodes, suffix)?
            }
            None => suffix,
        };
        relink(&nodes[..start], middle)
    }

    /// Appends `other` after the tail.
    pub fn concat(&self, other: QueryChain) -> QueryResult<QueryChain> {
        let nodes: Vec<&QueryChain> = self.iter().collect();
        relink(&nodes, Some(other.clone())).map(|chain| chain.unwrap_or(other))
    }

    /// Node kinds from head to tail.
    #[must_use]
    pub fn kinds(&self) -> Vec<OperatorKind> {
        self.iter().map(|node| node.kind()).collect()
    }
}

/// Rebuilds `prefix` in front of `suffix`.
fn relink(prefix: &[&QueryChain], suffix: Option<QueryChain>) -> QueryResult<Option<QueryChain>> {
    prefix.iter().rev().try_fold(suffix, |next, node| node.with_next(next).map(Some))
}

fn check_link(result_type: &HostType, next: &QueryChain) -> QueryResult<()> {
    element_of(result_type)?;
    if next.source_type().accepts(result_type) {
        Ok(())
    } else {
        Err(QueryError::type_mismatch(next.source_type(), result_type))
    }
}

impl fmt::Display for QueryChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, node) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", node.operation())?;
        }
        Ok(())
    }
}

/// Iterator over the nodes of a chain.
#[derive(Debug, Clone)]
pub struct Iter<'a> {
    current: Option<&'a QueryChain>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a QueryChain;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.current?;
        self.current = node.0.next.as_ref();
        Some(node)
    }
}
