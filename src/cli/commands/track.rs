//! track command - Start tracking a branch
//!
//! Writes the branch's record with its parent and the merge-base with that
//! parent as the recorded base. Retracking a tracked branch moves it to the
//! new parent and keeps its review link.

use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Result};

use super::{runtime, Session};
use crate::core::stack::{BranchRecord, Parent, TrackedBranch};
use crate::core::types::BranchName;
use crate::engine::{Context, Outcome};
use crate::git::RepoGateway;
use crate::ui::output;

/// Start tracking a branch.
///
/// # Arguments
///
/// * `ctx` - Execution context
/// * `branch` - Branch to track (defaults to current)
/// * `parent` - Parent branch (defaults to trunk)
pub fn track(ctx: &Context, branch: Option<&str>, parent: Option<&str>) -> Result<Outcome> {
    let session = Session::open(ctx)?;
    let target = session.target_branch(branch)?;
    let parent = match parent {
        Some(name) => BranchName::new(name)?,
        None => session.trunk.clone(),
    };

    if target == session.trunk {
        bail!("Cannot track trunk branch '{}'", session.trunk);
    }
    if target == parent {
        bail!("A branch cannot be its own parent");
    }

    let head = session
        .git
        .branch_head(&target)?
        .ok_or_else(|| anyhow!("Branch '{}' does not exist", target))?;
    let parent_head = session
        .git
        .branch_head(&parent)?
        .ok_or_else(|| anyhow!("Parent branch '{}' does not exist", parent))?;

    let repo = session.gateway(session.config.default_forge())?;
    let rt = runtime()?;
    let tracked = rt.block_on(repo.tracked_branches())?;

    let parent_link = if parent == session.trunk {
        Parent::Trunk
    } else {
        if !tracked.contains_key(&parent) {
            bail!(
                "Parent '{}' is not tracked. Track it first or use trunk.",
                parent
            );
        }
        if creates_cycle(&tracked, &target, &parent) {
            bail!(
                "Tracking '{}' on '{}' would create a cycle",
                target,
                parent
            );
        }
        Parent::Branch(parent.clone())
    };

    if let Some(child) = other_child(&tracked, &parent_link, &target) {
        bail!(
            "'{}' already has tracked child '{}'; a stack cannot branch",
            parent,
            child
        );
    }

    let base = session
        .git
        .merge_base(&parent_head, &head)?
        .ok_or_else(|| anyhow!("'{}' and '{}' share no history", target, parent))?;

    let mut record = BranchRecord::new(parent_link, base);
    if let Some(existing) = tracked.get(&target).and_then(|t| t.record.review.clone()) {
        record = record.with_review(existing);
    }
    rt.block_on(repo.save_record(&target, &record))?;

    output::print(
        format!("Tracking '{}' on '{}'", target, parent),
        session.verbosity,
    );
    Ok(Outcome::Success)
}

/// Whether `target` is an ancestor of `parent` through tracked parent links.
fn creates_cycle(
    tracked: &BTreeMap<BranchName, TrackedBranch>,
    target: &BranchName,
    parent: &BranchName,
) -> bool {
    let mut current = parent.clone();
    let mut steps = 0;
    while let Some(branch) = tracked.get(&current) {
        if &current == target {
            return true;
        }
        steps += 1;
        if steps > tracked.len() {
            // An existing cycle that does not involve `target`.
            return true;
        }
        match &branch.record.parent {
            Parent::Trunk => return false,
            Parent::Branch(next) => current = next.clone(),
        }
    }
    false
}

/// A tracked branch other than `target` that already sits on `parent`.
///
/// Trunk may have any number of children: each is the root of its own stack.
fn other_child<'a>(
    tracked: &'a BTreeMap<BranchName, TrackedBranch>,
    parent: &Parent,
    target: &BranchName,
) -> Option<&'a BranchName> {
    let Parent::Branch(parent) = parent else {
        return None;
    };
    tracked
        .values()
        .find(|t| &t.name != target && t.record.parent == Parent::Branch(parent.clone()))
        .map(|t| &t.name)
}
