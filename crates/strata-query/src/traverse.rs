//! Generic chain traversal.
//!
//! A [`ChainTraversal`] sees every node twice: `before` runs head to tail and
//! threads a forward state from node to node; `after` runs tail to head and
//! folds an output from the downstream nodes. A small set of [`Hook`]s can
//! attach operator-specific work to the `after` phase without the walker
//! knowing about individual operators.

use crate::chain::{OperatorKind, QueryChain, QueryNode};
use crate::error::QueryResult;

/// What `before` decided for one node.
#[derive(Debug, Clone, PartialEq)]
pub struct Visit<F, P> {
    /// Whether to continue with the next node.
    pub proceed: bool,
    /// State handed to the next node's `before`.
    pub forward: F,
    /// State handed to this node's `after`.
    pub pending: P,
}

impl<F, P> Visit<F, P> {
    /// Continue with the next node.
    pub const fn proceed(forward: F, pending: P) -> Self {
        Self { proceed: true, forward, pending }
    }

    /// Stop after this node.
    pub const fn stop(forward: F, pending: P) -> Self {
        Self { proceed: false, forward, pending }
    }
}

/// A two-phase walk over a query chain.
pub trait ChainTraversal {
    /// State threaded head to tail.
    type Forward: Clone;
    /// State carried from a node's `before` to its `after`.
    type Pending;
    /// Output folded tail to head.
    type Output;

    /// Visits a node on the way down.
    fn before(
        &mut self,
        node: &QueryNode,
        forward: &Self::Forward,
    ) -> QueryResult<Visit<Self::Forward, Self::Pending>>;

    /// Visits a node on the way back, combining it with the downstream
    /// output.
    fn after(
        &mut self,
        node: &QueryNode,
        pending: Self::Pending,
        downstream: Self::Output,
    ) -> QueryResult<Self::Output>;

    /// The output below the last visited node.
    fn finish(&mut self, forward: &Self::Forward) -> QueryResult<Self::Output>;
}

/// How a hook combines with the default `after` behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Composition {
    /// Neither runs; the downstream output passes through unchanged.
    Suppress,
    /// Only the hook runs.
    Replace,
    /// The default runs first and the hook sees its output.
    DefaultThenHook,
    /// The hook runs first and the default sees its output.
    HookThenDefault,
}

/// Operator-specific work attached to the `after` phase.
pub struct Hook<T: ChainTraversal> {
    /// The operator kind the hook applies to.
    pub kind: OperatorKind,
    /// How the hook combines with the default.
    pub composition: Composition,
    /// The hook only applies when this returns true.
    pub guard: fn(&T, &QueryNode) -> bool,
    /// The hook itself.
    pub run: fn(&mut T, &QueryNode, T::Output) -> QueryResult<T::Output>,
}

impl<T: ChainTraversal> Clone for Hook<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ChainTraversal> Copy for Hook<T> {}

impl<T: ChainTraversal> std::fmt::Debug for Hook<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hook")
            .field("kind", &self.kind)
            .field("composition", &self.composition)
            .finish_non_exhaustive()
    }
}

/// Walks `chain` with `traversal`, starting from `start`.
///
/// Nodes are visited iteratively, so chain length does not grow the call
/// stack.
pub fn walk<T: ChainTraversal>(
    traversal: &mut T,
    chain: &QueryChain,
    start: T::Forward,
    hooks: &[Hook<T>],
) -> QueryResult<T::Output> {
    let mut stack: Vec<(&QueryChain, T::Pending)> = Vec::new();
    let mut forward = start;
    for node in chain.iter() {
        let visit = traversal.before(node, &forward)?;
        stack.push((node, visit.pending));
        forward = visit.forward;
        if !visit.proceed {
            break;
        }
    }

    let mut output = traversal.finish(&forward)?;
    while let Some((node, pending)) = stack.pop() {
        let hook = hooks.iter().find(|h| h.kind == node.kind() && (h.guard)(traversal, node));
        output = match hook {
            None => traversal.after(node, pending, output)?,
            Some(hook) => match hook.composition {
                Composition::Suppress => output,
                Composition::Replace => (hook.run)(traversal, node, output)?,
                Composition::DefaultThenHook => {
                    let output = traversal.after(node, pending, output)?;
                    (hook.run)(traversal, node, output)?
                }
                Composition::HookThenDefault => {
                    let output = (hook.run)(traversal, node, output)?;
                    traversal.after(node, pending, output)?
                }
            },
        };
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use strata_core::HostType;

    use super::*;
    use crate::chain::QueryOperation;

    /// Records visit order and builds a tail-first list of kind names.
    #[derive(Default)]
    struct Recorder {
        visits: Vec<String>,
        stop_at: Option<OperatorKind>,
    }

    impl ChainTraversal for Recorder {
        type Forward = usize;
        type Pending = usize;
        type Output = Vec<String>;

        fn before(&mut self, node: &QueryNode, depth: &usize) -> QueryResult<Visit<usize, usize>> {
            self.visits.push(format!("before {}", node.kind()));
            if Some(node.kind()) == self.stop_at {
                Ok(Visit::stop(depth + 1, *depth))
            } else {
                Ok(Visit::proceed(depth + 1, *depth))
            }
        }

        fn after(
            &mut self,
            node: &QueryNode,
            depth: usize,
            mut downstream: Vec<String>,
        ) -> QueryResult<Vec<String>> {
            self.visits.push(format!("after {}", node.kind()));
            downstream.insert(0, format!("{}@{depth}", node.kind()));
            Ok(downstream)
        }

        fn finish(&mut self, depth: &usize) -> QueryResult<Vec<String>> {
            Ok(vec![format!("end@{depth}")])
        }
    }

    fn chain() -> QueryChain {
        let users = HostType::sequence(HostType::entity("User"));
        let take = QueryChain::new(QueryOperation::Take { count: 1 }, users.clone(), None).expect("take");
        let distinct = QueryChain::new(QueryOperation::Distinct, users.clone(), Some(take)).expect("distinct");
        QueryChain::new(QueryOperation::Reverse, users, Some(distinct)).expect("reverse")
    }

    fn marker(_: &mut Recorder, _: &QueryNode, mut out: Vec<String>) -> QueryResult<Vec<String>> {
        out.insert(0, "hook".to_string());
        Ok(out)
    }

    fn always(_: &Recorder, _: &QueryNode) -> bool {
        true
    }

    fn never(_: &Recorder, _: &QueryNode) -> bool {
        false
    }

    #[test]
    fn before_runs_forward_and_after_runs_backward() {
        let mut recorder = Recorder::default();
        let out = walk(&mut recorder, &chain(), 0, &[]).expect("walk");
        assert_eq!(out, vec!["Reverse@0", "Distinct@1", "Take@2", "end@3"]);
        assert_eq!(recorder.visits, vec![
            "before Reverse",
            "before Distinct",
            "before Take",
            "after Take",
            "after Distinct",
            "after Reverse"
        ]);
    }

    #[test]
    fn stop_truncates_the_walk() {
        let mut recorder = Recorder { stop_at: Some(OperatorKind::Distinct), ..Recorder::default() };
        let out = walk(&mut recorder, &chain(), 0, &[]).expect("walk");
        assert_eq!(out, vec!["Reverse@0", "Distinct@1", "end@2"]);
    }

    #[test]
    fn compositions() {
        let hook = |composition, guard| Hook::<Recorder> {
            kind: OperatorKind::Distinct,
            composition,
            guard,
            run: marker,
        };
        let run = |h: Hook<Recorder>| walk(&mut Recorder::default(), &chain(), 0, &[h]).expect("walk");

        assert_eq!(run(hook(Composition::Suppress, always)), vec!["Reverse@0", "Take@2", "end@3"]);
        assert_eq!(run(hook(Composition::Replace, always)), vec!["Reverse@0", "hook", "Take@2", "end@3"]);
        assert_eq!(
            run(hook(Composition::DefaultThenHook, always)),
            vec!["Reverse@0", "hook", "Distinct@1", "Take@2", "end@3"]
        );
        assert_eq!(
            run(hook(Composition::HookThenDefault, always)),
            vec!["Reverse@0", "Distinct@1", "hook", "Take@2", "end@3"]
        );
        assert_eq!(
            run(hook(Composition::Replace, never)),
            vec!["Reverse@0", "Distinct@1", "Take@2", "end@3"]
        );
    }
}
