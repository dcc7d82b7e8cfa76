//! Property-based tests for JOIN algorithms.
//!
//! The hash join must produce the same multiset of merged rows as the
//! nested loop reference, whichever input it builds its table over.

use proptest::prelude::*;
use quill_core::{Row, Value};
use quill_query::executor::join::{BuildSide, HashJoin, NestedLoopJoin};
use quill_query::executor::Relation;

/// Strategy for join keys drawn from a small range, so duplicates are
/// common.
fn key_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        8 => (-20i64..20).prop_map(Value::Int),
        1 => Just(Value::Null),
    ]
}

/// Rows of `(key, payload)`.
fn rows_strategy(max_rows: usize) -> impl Strategy<Value = Vec<Row>> {
    prop::collection::vec((key_strategy(), -1000i64..1000), 0..max_rows).prop_map(|values| {
        values
            .into_iter()
            .enumerate()
            .map(|(i, (k, v))| Row::new(i as u64, vec![k, Value::Int(v)]))
            .collect()
    })
}

fn relation(table: &str, prefix: &str, rows: Vec<Row>) -> Relation {
    Relation::from_table(table, vec![format!("{}_key", prefix), format!("{}_val", prefix)], rows)
}

/// Merged rows as a sorted multiset.
fn multiset(result: &Relation) -> Vec<Vec<Value>> {
    let mut rows: Vec<Vec<Value>> = result.rows().iter().map(|r| r.values().to_vec()).collect();
    rows.sort();
    rows
}

proptest! {
    /// Hash join and nested loop join produce the same merged rows, for
    /// either build side.
    #[test]
    fn hash_join_equals_nested_loop_join(
        left_rows in rows_strategy(40),
        right_rows in rows_strategy(40),
    ) {
        let left = relation("l", "l", left_rows);
        let right = relation("r", "r", right_rows);
        let expected = multiset(&NestedLoopJoin::new(0, 0).execute(left.clone(), right.clone()));

        for side in [BuildSide::Auto, BuildSide::Left, BuildSide::Right] {
            let result = HashJoin::new(0, 0).with_build_side(side).execute(left.clone(), right.clone());
            prop_assert_eq!(result.columns(), ["l_key", "l_val", "r_key", "r_val"]);
            prop_assert_eq!(multiset(&result), expected.clone());
        }
    }

    /// The result size equals the number of matching non-null key pairs.
    #[test]
    fn inner_join_count_correct(
        left_rows in rows_strategy(30),
        right_rows in rows_strategy(30),
    ) {
        let mut expected_count = 0;
        for l in &left_rows {
            for r in &right_rows {
                let (lk, rk) = (&l.values()[0], &r.values()[0]);
                if !lk.is_null() && lk == rk {
                    expected_count += 1;
                }
            }
        }

        let result = HashJoin::new(0, 0).execute(relation("l", "l", left_rows), relation("r", "r", right_rows));
        prop_assert_eq!(result.len(), expected_count);
    }

    /// An empty input on either side yields an empty result.
    #[test]
    fn empty_input_produces_empty_result(rows in rows_strategy(30)) {
        let empty = || relation("e", "e", Vec::new());
        prop_assert!(HashJoin::new(0, 0).execute(empty(), relation("r", "r", rows.clone())).is_empty());
        prop_assert!(HashJoin::new(0, 0).execute(relation("l", "l", rows), empty()).is_empty());
    }

    /// Swapping the inputs keeps the result size.
    #[test]
    fn inner_join_commutative_count(
        left_rows in rows_strategy(30),
        right_rows in rows_strategy(30),
    ) {
        let left = relation("l", "l", left_rows);
        let right = relation("r", "r", right_rows);
        let lr = HashJoin::new(0, 0).execute(left.clone(), right.clone());
        let rl = HashJoin::new(0, 0).execute(right, left);
        prop_assert_eq!(lr.len(), rl.len());
    }

    /// Nested loop join with a custom predicate.
    #[test]
    fn nested_loop_range_join(
        left_rows in rows_strategy(20),
        right_rows in rows_strategy(20),
    ) {
        let mut expected_count = 0;
        for l in &left_rows {
            for r in &right_rows {
                if let (Some(lk), Some(rk)) = (l.values()[0].as_i64(), r.values()[0].as_i64()) {
                    if lk < rk {
                        expected_count += 1;
                    }
                }
            }
        }

        let result = NestedLoopJoin::new(0, 0)
            .execute_with_predicate(relation("l", "l", left_rows), relation("r", "r", right_rows), |a, b| a < b);
        prop_assert_eq!(result.len(), expected_count);
    }
}
