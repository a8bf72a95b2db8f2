//! publish / unpublish commands - Push or delete single branches
//!
//! These act on named branches only and never touch review requests.

use anyhow::{bail, Result};

use super::{runtime, Session};
use crate::core::types::BranchName;
use crate::engine::{Context, Outcome};
use crate::git::RepoGateway;
use crate::ui::output;

/// Force-push one branch to the remote.
pub fn publish(ctx: &Context, branch: Option<&str>) -> Result<Outcome> {
    let session = Session::open(ctx)?;
    let target = session.target_branch(branch)?;
    if target == session.trunk {
        bail!("Refusing to force-push trunk '{}'", session.trunk);
    }

    let repo = session.gateway(session.config.default_forge())?;
    runtime()?.block_on(repo.publish(&target))?;
    output::print(
        format!("Pushed '{}' to {}", target, repo.remote()),
        session.verbosity,
    );
    Ok(Outcome::Success)
}

/// Delete branches from the remote, and locally with `rm`.
///
/// The current branch is left first by checking out trunk.
pub fn unpublish(ctx: &Context, branches: &[String], rm: bool) -> Result<Outcome> {
    let session = Session::open(ctx)?;
    let targets = if branches.is_empty() {
        vec![session.target_branch(None)?]
    } else {
        branches
            .iter()
            .map(|b| BranchName::new(b.as_str()))
            .collect::<Result<Vec<_>, _>>()?
    };
    if targets.contains(&session.trunk) {
        bail!("Refusing to delete trunk '{}'", session.trunk);
    }

    let repo = session.gateway(session.config.default_forge())?;
    let rt = runtime()?;

    let current = session.git.current_branch()?;
    if let Some(current) = current.filter(|c| targets.contains(c)) {
        tracing::debug!(branch = %current, "leaving branch before deleting it");
        rt.block_on(repo.checkout(&session.trunk))?;
    }

    for target in &targets {
        rt.block_on(repo.delete_remote_branch(target))?;
        output::print(
            format!("Deleted '{}' from {}", target, repo.remote()),
            session.verbosity,
        );
        if rm {
            rt.block_on(repo.delete_merged_branch(target))?;
            rt.block_on(repo.remove_record(target))?;
            output::print(format!("Deleted local '{}'", target), session.verbosity);
        }
    }
    Ok(Outcome::Success)
}
