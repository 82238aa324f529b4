//! Property-based tests for value ordering and key equality.

use std::cmp::Ordering;

use proptest::prelude::*;

use super::Value;

/// Strategy for generating arbitrary `Value` instances.
fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1_000_000i64..1_000_000).prop_map(Value::Int),
        // Filter out NaN since NaN != NaN
        any::<f64>().prop_filter("not NaN", |f| !f.is_nan()).prop_map(Value::Float),
        "[a-z]{0,8}".prop_map(Value::String),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
    ];

    leaf.prop_recursive(
        3,  // depth
        32, // size
        6,  // items per collection
        |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,4}", inner, 0..4).prop_map(Value::Object),
            ]
        },
    )
}

proptest! {
    #[test]
    fn sort_order_is_antisymmetric(a in arb_value(), b in arb_value()) {
        prop_assert_eq!(a.sort_cmp(&b), b.sort_cmp(&a).reverse());
    }

    #[test]
    fn sort_order_is_reflexive(a in arb_value()) {
        prop_assert_eq!(a.sort_cmp(&a), Ordering::Equal);
        prop_assert!(a.key_eq(&a));
    }

    #[test]
    fn key_equal_values_sort_together(a in arb_value(), b in arb_value()) {
        if a.key_eq(&b) {
            prop_assert_eq!(a.sort_cmp(&b), Ordering::Equal);
            prop_assert!(b.key_eq(&a));
        }
    }

    #[test]
    fn sorting_puts_nulls_first(mut values in prop::collection::vec(arb_value(), 0..20)) {
        values.sort_by(Value::sort_cmp);
        let first_non_null = values.iter().position(|v| !v.is_null()).unwrap_or(values.len());
        prop_assert!(values[first_non_null..].iter().all(|v| !v.is_null()));
    }

    #[test]
    fn integers_and_floats_compare_by_magnitude(n in -1_000_000i64..1_000_000) {
        let float = Value::Float(n as f64);
        prop_assert!(Value::Int(n).key_eq(&float));
        prop_assert_eq!(Value::Int(n).compare(&Value::Float(n as f64 + 0.5)), Some(Ordering::Less));
    }
}
