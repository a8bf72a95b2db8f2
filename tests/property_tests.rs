//! Property-based tests for the stack model.
//!
//! These tests use proptest to verify that stack construction orders any
//! well-formed chain root to tip and rejects every cycle.

use std::collections::BTreeMap;

use proptest::prelude::*;

use gflow::core::stack::{BranchRecord, Parent, Stack, StackError, TrackedBranch};
use gflow::core::types::{BranchName, Oid};

fn name(i: usize) -> BranchName {
    BranchName::new(format!("feature/{i}")).unwrap()
}

fn head(i: usize) -> Oid {
    Oid::new(format!("{:040x}", i + 1)).unwrap()
}

fn trunk() -> BranchName {
    BranchName::new("main").unwrap()
}

fn trunk_head() -> Oid {
    Oid::new("f".repeat(40)).unwrap()
}

/// Track `order` as one chain: `order[0]` on trunk, each next on the previous,
/// every base equal to the parent's head.
fn chain(order: &[usize]) -> BTreeMap<BranchName, TrackedBranch> {
    let mut tracked = BTreeMap::new();
    for (pos, &i) in order.iter().enumerate() {
        let (parent, base) = if pos == 0 {
            (Parent::Trunk, trunk_head())
        } else {
            let p = order[pos - 1];
            (Parent::Branch(name(p)), head(p))
        };
        tracked.insert(
            name(i),
            TrackedBranch::new(name(i), Some(head(i)), BranchRecord::new(parent, base)),
        );
    }
    tracked
}

/// A shuffled chain of 1..12 branches and a position in it to start from.
fn shuffled_chain() -> impl Strategy<Value = (Vec<usize>, usize)> {
    (1usize..12)
        .prop_flat_map(|n| (Just((0..n).collect::<Vec<_>>()).prop_shuffle(), 0..n))
}

proptest! {
    #[test]
    fn order_is_root_to_tip_from_any_start((order, start) in shuffled_chain()) {
        let tracked = chain(&order);
        let stack = Stack::build(&name(order[start]), &trunk(), trunk_head(), &tracked, 32)
            .unwrap();

        let names: Vec<BranchName> = stack
            .topological_order()
            .iter()
            .map(|b| b.name.clone())
            .collect();
        let expected: Vec<BranchName> = order.iter().map(|&i| name(i)).collect();
        prop_assert_eq!(names, expected);

        for (pos, branch) in stack.topological_order().iter().enumerate() {
            let parent = if pos == 0 { trunk() } else { name(order[pos - 1]) };
            prop_assert_eq!(stack.parent_name(pos), &parent);
            prop_assert!(!stack.is_stale(&branch.name));
        }
    }

    #[test]
    fn cycles_are_rejected(
        (order, start) in shuffled_chain(),
        back in any::<prop::sample::Index>(),
    ) {
        let mut tracked = chain(&order);
        // Point the root back into the chain.
        let target = order[back.index(order.len())];
        let root = tracked.get_mut(&name(order[0])).unwrap();
        root.record.parent = Parent::Branch(name(target));

        let err = Stack::build(&name(order[start]), &trunk(), trunk_head(), &tracked, 32)
            .unwrap_err();
        prop_assert!(matches!(err, StackError::Cycle(_)), "got {:?}", err);
    }

    #[test]
    fn changed_base_is_stale_only_there(
        (order, _) in shuffled_chain(),
        moved in any::<prop::sample::Index>(),
    ) {
        let mut tracked = chain(&order);
        let pos = moved.index(order.len());
        tracked
            .get_mut(&name(order[pos]))
            .unwrap()
            .record
            .base = Oid::new("e".repeat(40)).unwrap();

        let stack = Stack::build(&name(order[0]), &trunk(), trunk_head(), &tracked, 32).unwrap();
        for (i, &b) in order.iter().enumerate() {
            prop_assert_eq!(stack.is_stale(&name(b)), i == pos);
        }
    }

    #[test]
    fn depth_limit_is_enforced((order, start) in shuffled_chain(), max in 1usize..12) {
        let tracked = chain(&order);
        let result = Stack::build(&name(order[start]), &trunk(), trunk_head(), &tracked, max);
        if order.len() > max {
            let too_deep = matches!(result, Err(StackError::TooDeep { .. }));
            prop_assert!(too_deep);
        } else {
            prop_assert!(result.is_ok());
        }
    }
}
