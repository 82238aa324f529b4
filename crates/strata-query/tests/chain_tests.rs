//! Query-chain tests for `strata-query`.
//!
//! These tests verify:
//! - The chains the parser builds and their result types
//! - Argument validation for operators with structural rules
//! - Implied includes
//! - Traversal over parsed chains with hooks

mod common;

use common::{model, parse};
use strata_core::HostType;
use strata_query::chain::{OperatorKind, QueryNode};
use strata_query::parser::CapturedQuery;
use strata_query::traverse::{walk, ChainTraversal, Composition, Hook, Visit};
use strata_query::{QueryError, QueryResult};

// ============================================================================
// Parsed Chains
// ============================================================================

mod parsed {
    use super::*;

    #[test]
    fn calls_become_nodes_in_order() {
        let model = model();
        let query = parse(
            &model,
            "User",
            &[
                ("where", "u => u.age > 20"),
                ("order_by", "u => u.name"),
                ("then_by_descending", "u => u.id"),
                ("select", "u => u.name"),
            ],
        );
        let chain = query.chain().unwrap();
        assert_eq!(
            chain.kinds(),
            vec![OperatorKind::Where, OperatorKind::Order, OperatorKind::ThenOrder, OperatorKind::Select]
        );
        assert_eq!(chain.final_type(), HostType::sequence(HostType::String));
        assert_eq!(query.source_type(), HostType::sequence(HostType::entity("User")));
    }

    #[test]
    fn terminal_operators_type_their_result() {
        let model = model();
        let result = |call: &str, arg: &str| parse(&model, "User", &[(call, arg)]).result_type();
        assert_eq!(result("count", ""), HostType::Int);
        assert_eq!(result("any", "u => u.age > 1"), HostType::Bool);
        assert_eq!(result("all", "u => u.age > 1"), HostType::Bool);
        assert_eq!(result("first", ""), HostType::entity("User"));
    }

    #[test]
    fn combining_projection_flattens_the_collection() {
        let model = model();
        let query = CapturedQuery::new("User")
            .call("select_many", vec!["u => u.orders".into(), "(u, o) => o.total".into()])
            .parse(&model)
            .unwrap();
        let chain = query.chain().unwrap();
        assert_eq!(chain.kinds(), vec![OperatorKind::SelectCombining]);
        assert_eq!(chain.final_type(), HostType::sequence(HostType::Int));
    }

    #[test]
    fn combining_projection_needs_a_collection() {
        let model = model();
        let err = CapturedQuery::new("User")
            .call("select_many", vec!["u => u.team".into(), "(u, t) => t.name".into()])
            .parse(&model)
            .unwrap_err();
        assert!(matches!(err, QueryError::IllegalExpression { .. } | QueryError::TypeMismatch { .. }), "{err}");
    }

    #[test]
    fn secondary_ordering_needs_a_primary_one() {
        let model = model();
        let err = CapturedQuery::new("User").call("then_by", vec!["u => u.id".into()]).parse(&model).unwrap_err();
        assert!(matches!(err, QueryError::IllegalExpression { .. }), "{err}");
    }

    #[test]
    fn include_accepts_a_dotted_path_or_a_lambda() {
        let model = model();
        let dotted = parse(&model, "User", &[("include", "team")]);
        let lambda = parse(&model, "User", &[("include", "u => u.team")]);
        assert_eq!(dotted.chain().unwrap().head(), lambda.chain().unwrap().head());
    }
}

// ============================================================================
// Implied Includes
// ============================================================================

mod implied {
    use super::*;

    #[test]
    fn navigations_used_by_a_predicate_are_implied() {
        let model = model();
        let query = parse(&model, "User", &[("where", "u => u.team.name = 'core' AND u.age > 3")]);
        let head = query.chain().unwrap().head();
        assert_eq!(head.implied_includes(&model), vec![vec!["team".to_string()]]);
    }

    #[test]
    fn attribute_only_predicates_imply_nothing() {
        let model = model();
        let query = parse(&model, "User", &[("where", "u => u.age > 3")]);
        assert!(query.chain().unwrap().head().implied_includes(&model).is_empty());
    }
}

// ============================================================================
// Traversal
// ============================================================================

mod traversal {
    use super::*;

    /// Renders the chain tail first, tracking how many filters precede each
    /// node.
    #[derive(Default)]
    struct Plan {
        counted: usize,
    }

    impl ChainTraversal for Plan {
        type Forward = usize;
        type Pending = usize;
        type Output = Vec<String>;

        fn before(&mut self, node: &QueryNode, filters: &usize) -> QueryResult<Visit<usize, usize>> {
            let next = filters + usize::from(node.kind() == OperatorKind::Where);
            Ok(Visit::proceed(next, *filters))
        }

        fn after(&mut self, node: &QueryNode, filters: usize, mut out: Vec<String>) -> QueryResult<Vec<String>> {
            out.insert(0, format!("{}/{filters}", node.kind()));
            Ok(out)
        }

        fn finish(&mut self, filters: &usize) -> QueryResult<Vec<String>> {
            Ok(vec![format!("rows/{filters}")])
        }
    }

    fn box_count(plan: &mut Plan, _: &QueryNode, mut out: Vec<String>) -> QueryResult<Vec<String>> {
        plan.counted += 1;
        out.insert(0, "box".to_string());
        Ok(out)
    }

    fn is_terminal(_: &Plan, node: &QueryNode) -> bool {
        node.next().is_none()
    }

    #[test]
    fn walks_parsed_chains_with_a_count_hook() {
        let model = model();
        let query = parse(&model, "User", &[("where", "u => u.age > 1"), ("where", "u => u.id > 1"), ("count", "")]);
        let hook = Hook { kind: OperatorKind::Count, composition: Composition::DefaultThenHook, guard: is_terminal, run: box_count };

        let mut plan = Plan::default();
        let out = walk(&mut plan, query.chain().unwrap(), 0, &[hook]).unwrap();
        assert_eq!(out, vec!["Where/0", "Where/1", "box", "Count/2", "rows/2"]);
        assert_eq!(plan.counted, 1);
    }
}
