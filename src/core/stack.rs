//! core::stack
//!
//! The dependency-ordered branch stack.
//!
//! A stack is rebuilt on every invocation from the tracked-branch records
//! and the current branch heads; nothing about it is cached. Construction
//! walks parent links from the starting branch up to trunk, then follows
//! the unique tracked child of the tip downward, so the whole chain is
//! covered no matter which member is checked out.
//!
//! # Invariants
//!
//! - The chain is linear: one parent each, at most one tracked child each
//! - The root's parent is trunk
//! - No branch appears twice (a visited set rejects cycles)
//! - Length never exceeds the configured maximum depth
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use gflow::core::stack::{BranchRecord, Parent, Stack, TrackedBranch};
//! use gflow::core::types::{BranchName, Oid};
//!
//! let oid = |c: char| Oid::new(c.to_string().repeat(40)).unwrap();
//! let name = |s: &str| BranchName::new(s).unwrap();
//!
//! let mut tracked = BTreeMap::new();
//! tracked.insert(name("a"), TrackedBranch::new(name("a"), Some(oid('a')),
//!     BranchRecord::new(Parent::Trunk, oid('0'))));
//! tracked.insert(name("b"), TrackedBranch::new(name("b"), Some(oid('b')),
//!     BranchRecord::new(Parent::Branch(name("a")), oid('a'))));
//!
//! let stack = Stack::build(&name("a"), &name("main"), oid('0'), &tracked, 32).unwrap();
//! let order: Vec<_> = stack.topological_order().iter().map(|b| b.name.as_str()).collect();
//! assert_eq!(order, ["a", "b"]);
//! assert!(!stack.is_stale(&name("b")));
//! ```

use std::collections::{BTreeMap, HashSet};

use thiserror::Error;

use super::types::{BranchName, Oid};

/// Why a chain of branches is not a stack.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StackError {
    #[error("'{0}' is the trunk branch, not part of a stack")]
    IsTrunk(BranchName),

    #[error("branch '{0}' is not tracked (run `gflow track` first)")]
    Untracked(BranchName),

    #[error("tracked branch '{0}' no longer exists locally")]
    MissingBranch(BranchName),

    #[error("parent cycle detected at branch '{0}'")]
    Cycle(BranchName),

    #[error("parent '{parent}' of branch '{branch}' is neither trunk nor tracked")]
    UnresolvedParent {
        branch: BranchName,
        parent: BranchName,
    },

    #[error("branch '{parent}' has more than one tracked child: {}", join_names(.children))]
    Branching {
        parent: BranchName,
        children: Vec<BranchName>,
    },

    #[error("stack is deeper than the configured maximum of {max}")]
    TooDeep { max: usize },
}

fn join_names(names: &[BranchName]) -> String {
    names
        .iter()
        .map(BranchName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Where a branch sits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Parent {
    Trunk,
    Branch(BranchName),
}

impl Parent {
    /// The parent's branch name, resolving `Trunk` to `trunk`.
    pub fn name<'a>(&'a self, trunk: &'a BranchName) -> &'a BranchName {
        match self {
            Parent::Trunk => trunk,
            Parent::Branch(name) => name,
        }
    }

    pub fn is_trunk(&self) -> bool {
        matches!(self, Parent::Trunk)
    }
}

/// The review request linked to a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRef {
    pub number: u64,
    pub url: String,
    /// Branch the review was last pointed at
    pub target: String,
}

/// What gflow remembers about a tracked branch between invocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRecord {
    pub parent: Parent,
    /// Parent head at the last successful sync
    pub base: Oid,
    pub review: Option<ReviewRef>,
}

impl BranchRecord {
    pub fn new(parent: Parent, base: Oid) -> Self {
        Self {
            parent,
            base,
            review: None,
        }
    }

    pub fn with_review(mut self, review: ReviewRef) -> Self {
        self.review = Some(review);
        self
    }
}

/// A tracked branch as read from the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedBranch {
    pub name: BranchName,
    /// Local head, `None` if the branch was deleted behind gflow's back
    pub head: Option<Oid>,
    pub record: BranchRecord,
}

impl TrackedBranch {
    pub fn new(name: BranchName, head: Option<Oid>, record: BranchRecord) -> Self {
        Self { name, head, record }
    }
}

/// Sync status of a branch within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Unsynced,
    Synced,
    Conflicted,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Unsynced => write!(f, "unsynced"),
            SyncStatus::Synced => write!(f, "synced"),
            SyncStatus::Conflicted => write!(f, "conflicted"),
        }
    }
}

/// One member of a stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub name: BranchName,
    pub parent: Parent,
    pub head: Oid,
    pub base: Oid,
    pub review: Option<ReviewRef>,
    pub status: SyncStatus,
}

/// A linear chain of branches, root first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stack {
    trunk: BranchName,
    trunk_head: Oid,
    branches: Vec<Branch>,
}

impl Stack {
    /// Build the stack containing `start`.
    ///
    /// # Errors
    ///
    /// Any [`StackError`]; no partial stack is ever returned.
    pub fn build(
        start: &BranchName,
        trunk: &BranchName,
        trunk_head: Oid,
        tracked: &BTreeMap<BranchName, TrackedBranch>,
        max_depth: usize,
    ) -> Result<Stack, StackError> {
        if start == trunk {
            return Err(StackError::IsTrunk(start.clone()));
        }
        if !tracked.contains_key(start) {
            return Err(StackError::Untracked(start.clone()));
        }

        let mut visited: HashSet<&BranchName> = HashSet::new();
        let mut chain: Vec<&TrackedBranch> = Vec::new();

        // Upward to trunk.
        let mut current = start;
        loop {
            if !visited.insert(current) {
                return Err(StackError::Cycle(current.clone()));
            }
            let entry = tracked
                .get(current)
                .ok_or_else(|| StackError::Untracked(current.clone()))?;
            chain.push(entry);
            if chain.len() > max_depth {
                return Err(StackError::TooDeep { max: max_depth });
            }

            match &entry.record.parent {
                Parent::Trunk => break,
                Parent::Branch(p) if p == trunk => break,
                Parent::Branch(p) if tracked.contains_key(p) => current = p,
                Parent::Branch(p) => {
                    return Err(StackError::UnresolvedParent {
                        branch: current.clone(),
                        parent: p.clone(),
                    })
                }
            }
        }
        chain.reverse();

        let children = children_of(tracked, trunk);

        // Every member above the start may have only the child we came from.
        for member in &chain {
            if let Some(kids) = children.get(&member.name) {
                if kids.len() > 1 {
                    return Err(StackError::Branching {
                        parent: member.name.clone(),
                        children: kids.iter().map(|k| (*k).clone()).collect(),
                    });
                }
            }
        }

        // Downward through the unique child of the tip.
        let mut tip = start;
        while let Some(kids) = children.get(tip) {
            let child = match kids.as_slice() {
                [only] => *only,
                _ => {
                    return Err(StackError::Branching {
                        parent: tip.clone(),
                        children: kids.iter().map(|k| (*k).clone()).collect(),
                    })
                }
            };
            if !visited.insert(child) {
                return Err(StackError::Cycle(child.clone()));
            }
            let entry = &tracked[child];
            chain.push(entry);
            if chain.len() > max_depth {
                return Err(StackError::TooDeep { max: max_depth });
            }
            tip = child;
        }

        let mut branches = Vec::with_capacity(chain.len());
        for (i, entry) in chain.iter().enumerate() {
            let head = entry
                .head
                .clone()
                .ok_or_else(|| StackError::MissingBranch(entry.name.clone()))?;
            // The root's parent is trunk whatever name was recorded.
            let parent = if i == 0 {
                Parent::Trunk
            } else {
                Parent::Branch(chain[i - 1].name.clone())
            };
            branches.push(Branch {
                name: entry.name.clone(),
                parent,
                head,
                base: entry.record.base.clone(),
                review: entry.record.review.clone(),
                status: SyncStatus::Unsynced,
            });
        }

        let mut stack = Stack {
            trunk: trunk.clone(),
            trunk_head,
            branches,
        };
        for i in 0..stack.branches.len() {
            if stack.base_matches(i) {
                stack.branches[i].status = SyncStatus::Synced;
            }
        }
        Ok(stack)
    }

    /// Roots of every stack: tracked branches whose parent is trunk.
    pub fn roots(
        tracked: &BTreeMap<BranchName, TrackedBranch>,
        trunk: &BranchName,
    ) -> Vec<BranchName> {
        tracked
            .values()
            .filter(|t| match &t.record.parent {
                Parent::Trunk => true,
                Parent::Branch(p) => p == trunk,
            })
            .map(|t| t.name.clone())
            .collect()
    }

    /// Branches root to tip. The only valid processing order.
    pub fn topological_order(&self) -> &[Branch] {
        &self.branches
    }

    /// True when the branch's recorded base is not its parent's current head.
    ///
    /// Unknown branches are reported stale.
    pub fn is_stale(&self, name: &BranchName) -> bool {
        match self.position(name) {
            Some(i) => !self.base_matches(i),
            None => true,
        }
    }

    /// Current head of the parent of the branch at `index`.
    pub fn parent_head(&self, index: usize) -> &Oid {
        if index == 0 {
            &self.trunk_head
        } else {
            &self.branches[index - 1].head
        }
    }

    /// Name of the parent of the branch at `index`.
    pub fn parent_name(&self, index: usize) -> &BranchName {
        if index == 0 {
            &self.trunk
        } else {
            &self.branches[index - 1].name
        }
    }

    fn base_matches(&self, index: usize) -> bool {
        &self.branches[index].base == self.parent_head(index)
    }

    pub fn position(&self, name: &BranchName) -> Option<usize> {
        self.branches.iter().position(|b| &b.name == name)
    }

    pub fn get(&self, name: &BranchName) -> Option<&Branch> {
        self.branches.iter().find(|b| &b.name == name)
    }

    pub fn trunk(&self) -> &BranchName {
        &self.trunk
    }

    pub fn trunk_head(&self) -> &Oid {
        &self.trunk_head
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }
}

/// Tracked children of each tracked branch, in name order.
fn children_of<'a>(
    tracked: &'a BTreeMap<BranchName, TrackedBranch>,
    trunk: &BranchName,
) -> BTreeMap<&'a BranchName, Vec<&'a BranchName>> {
    let mut children: BTreeMap<&BranchName, Vec<&BranchName>> = BTreeMap::new();
    for entry in tracked.values() {
        if let Parent::Branch(p) = &entry.record.parent {
            if p != trunk {
                if let Some((key, _)) = tracked.get_key_value(p) {
                    children.entry(key).or_default().push(&entry.name);
                }
            }
        }
    }
    children
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> BranchName {
        BranchName::new(s).unwrap()
    }

    fn oid(c: char) -> Oid {
        Oid::new(c.to_string().repeat(40)).unwrap()
    }

    fn trunk() -> BranchName {
        name("main")
    }

    /// (name, parent or "" for trunk, head, base)
    fn tracked(layout: &[(&str, &str, char, char)]) -> BTreeMap<BranchName, TrackedBranch> {
        layout.iter()
            .map(|(n, p, head, base)| {
                let parent = if p.is_empty() {
                    Parent::Trunk
                } else {
                    Parent::Branch(name(p))
                };
                (
                    name(n),
                    TrackedBranch::new(name(n), Some(oid(*head)), BranchRecord::new(parent, oid(*base))),
                )
            })
            .collect()
    }

    fn order(stack: &Stack) -> Vec<&str> {
        stack
            .topological_order()
            .iter()
            .map(|b| b.name.as_str())
            .collect()
    }

    mod build {
        use super::*;

        #[test]
        fn from_any_member_covers_the_chain() {
            let t = tracked(&[("a", "", 'a', '0'), ("b", "a", 'b', 'a'), ("c", "b", 'c', 'b')]);
            for start in ["a", "b", "c"] {
                let stack = Stack::build(&name(start), &trunk(), oid('0'), &t, 32).unwrap();
                assert_eq!(order(&stack), ["a", "b", "c"]);
            }
        }

        #[test]
        fn parents_are_normalized() {
            let t = tracked(&[("a", "", 'a', '0'), ("b", "a", 'b', 'a')]);
            let stack = Stack::build(&name("b"), &trunk(), oid('0'), &t, 32).unwrap();
            let branches = stack.topological_order();
            assert_eq!(branches[0].parent, Parent::Trunk);
            assert_eq!(branches[1].parent, Parent::Branch(name("a")));
            assert_eq!(stack.parent_name(1), &name("a"));
            assert_eq!(stack.parent_name(0), &trunk());
        }

        #[test]
        fn explicit_trunk_parent_name_is_trunk() {
            let t = tracked(&[("a", "main", 'a', '0')]);
            let stack = Stack::build(&name("a"), &trunk(), oid('0'), &t, 32).unwrap();
            assert_eq!(stack.len(), 1);
            assert_eq!(Stack::roots(&t, &trunk()), vec![name("a")]);
        }

        #[test]
        fn cycle_rejected() {
            let t = tracked(&[("a", "c", 'a', 'c'), ("b", "a", 'b', 'a'), ("c", "b", 'c', 'b')]);
            let err = Stack::build(&name("a"), &trunk(), oid('0'), &t, 32).unwrap_err();
            assert!(matches!(err, StackError::Cycle(_)));
        }

        #[test]
        fn self_parent_is_a_cycle() {
            let t = tracked(&[("a", "a", 'a', 'a')]);
            assert_eq!(
                Stack::build(&name("a"), &trunk(), oid('0'), &t, 32),
                Err(StackError::Cycle(name("a")))
            );
        }

        #[test]
        fn unresolved_parent_rejected() {
            let t = tracked(&[("b", "gone", 'b', 'a')]);
            let err = Stack::build(&name("b"), &trunk(), oid('0'), &t, 32).unwrap_err();
            assert_eq!(
                err,
                StackError::UnresolvedParent {
                    branch: name("b"),
                    parent: name("gone")
                }
            );
        }

        #[test]
        fn too_deep_rejected() {
            let t = tracked(&[("a", "", 'a', '0'), ("b", "a", 'b', 'a'), ("c", "b", 'c', 'b')]);
            assert_eq!(
                Stack::build(&name("a"), &trunk(), oid('0'), &t, 2),
                Err(StackError::TooDeep { max: 2 })
            );
            assert!(Stack::build(&name("a"), &trunk(), oid('0'), &t, 3).is_ok());
        }

        #[test]
        fn branching_rejected() {
            let t = tracked(&[("a", "", 'a', '0'), ("b", "a", 'b', 'a'), ("x", "a", 'd', 'a')]);
            let err = Stack::build(&name("b"), &trunk(), oid('0'), &t, 32).unwrap_err();
            assert!(matches!(err, StackError::Branching { ref parent, .. } if parent == &name("a")));
        }

        #[test]
        fn independent_stacks_do_not_interfere() {
            let t = tracked(&[("a", "", 'a', '0'), ("b", "a", 'b', 'a'), ("z", "", 'e', '0')]);
            let stack = Stack::build(&name("a"), &trunk(), oid('0'), &t, 32).unwrap();
            assert_eq!(order(&stack), ["a", "b"]);
            assert_eq!(Stack::roots(&t, &trunk()), vec![name("a"), name("z")]);
        }

        #[test]
        fn trunk_and_untracked_starts_rejected() {
            let t = tracked(&[("a", "", 'a', '0')]);
            assert_eq!(
                Stack::build(&trunk(), &trunk(), oid('0'), &t, 32),
                Err(StackError::IsTrunk(trunk()))
            );
            assert_eq!(
                Stack::build(&name("nope"), &trunk(), oid('0'), &t, 32),
                Err(StackError::Untracked(name("nope")))
            );
        }

        #[test]
        fn missing_local_branch_rejected() {
            let mut t = tracked(&[("a", "", 'a', '0')]);
            t.get_mut(&name("a")).unwrap().head = None;
            assert_eq!(
                Stack::build(&name("a"), &trunk(), oid('0'), &t, 32),
                Err(StackError::MissingBranch(name("a")))
            );
        }
    }

    mod staleness {
        use super::*;

        #[test]
        fn fresh_stack_is_synced() {
            let t = tracked(&[("a", "", 'a', '0'), ("b", "a", 'b', 'a')]);
            let stack = Stack::build(&name("a"), &trunk(), oid('0'), &t, 32).unwrap();
            assert!(!stack.is_stale(&name("a")));
            assert!(!stack.is_stale(&name("b")));
            assert!(stack
                .topological_order()
                .iter()
                .all(|b| b.status == SyncStatus::Synced));
        }

        #[test]
        fn trunk_advance_makes_root_stale_only() {
            let t = tracked(&[("a", "", 'a', '0'), ("b", "a", 'b', 'a')]);
            let stack = Stack::build(&name("a"), &trunk(), oid('1'), &t, 32).unwrap();
            assert!(stack.is_stale(&name("a")));
            assert!(!stack.is_stale(&name("b")));
            assert_eq!(stack.topological_order()[0].status, SyncStatus::Unsynced);
        }

        #[test]
        fn amended_parent_makes_child_stale() {
            let t = tracked(&[("a", "", 'f', '0'), ("b", "a", 'b', 'a')]);
            let stack = Stack::build(&name("b"), &trunk(), oid('0'), &t, 32).unwrap();
            assert!(stack.is_stale(&name("b")));
            assert_eq!(stack.parent_head(1), &oid('f'));
        }

        #[test]
        fn unknown_branch_is_stale() {
            let t = tracked(&[("a", "", 'a', '0')]);
            let stack = Stack::build(&name("a"), &trunk(), oid('0'), &t, 32).unwrap();
            assert!(stack.is_stale(&name("other")));
        }
    }

    #[test]
    fn error_messages() {
        let err = StackError::Branching {
            parent: name("a"),
            children: vec![name("b"), name("c")],
        };
        assert_eq!(
            err.to_string(),
            "branch 'a' has more than one tracked child: b, c"
        );
    }
}
