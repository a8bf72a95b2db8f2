//! untrack command - Stop tracking a branch
//!
//! Removes the branch's record. Children of the branch keep pointing at it
//! and will fail to build until they are retracked.

use anyhow::{anyhow, Result};

use super::{runtime, Session};
use crate::core::stack::Parent;
use crate::engine::{Context, Outcome};
use crate::git::RepoGateway;
use crate::ui::output;

/// Stop tracking a branch, optionally closing its review.
pub fn untrack(ctx: &Context, branch: Option<&str>, close: bool) -> Result<Outcome> {
    let session = Session::open(ctx)?;
    let target = session.target_branch(branch)?;
    let repo = session.gateway(session.config.default_forge())?;
    let rt = runtime()?;

    let tracked = rt.block_on(repo.tracked_branches())?;
    let entry = tracked
        .get(&target)
        .ok_or_else(|| anyhow!("Branch '{}' is not tracked", target))?;

    if close {
        match &entry.record.review {
            Some(review) => {
                let forge = session.require_forge()?;
                rt.block_on(forge.close(review.number))?;
                output::print(format!("Closed #{}", review.number), session.verbosity);
            }
            None => output::warn(
                format!("'{}' has no review to close", target),
                session.verbosity,
            ),
        }
    }

    rt.block_on(repo.remove_record(&target))?;

    let orphans: Vec<_> = tracked
        .values()
        .filter(|t| t.record.parent == Parent::Branch(target.clone()))
        .map(|t| t.name.to_string())
        .collect();
    if !orphans.is_empty() {
        output::warn(
            format!(
                "'{}' was the parent of {}; retrack with 'gflow track --parent'",
                target,
                orphans.join(", ")
            ),
            session.verbosity,
        );
    }

    output::print(format!("Stopped tracking '{}'", target), session.verbosity);
    Ok(Outcome::Success)
}
