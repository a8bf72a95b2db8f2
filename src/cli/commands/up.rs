//! up command - Synchronize the current stack
//!
//! Rebases every branch of the stack containing the current branch onto
//! its parent, force-pushes it, and opens or re-targets its review.

use anyhow::{anyhow, Result};

use super::{runtime, Session};
use crate::engine::{self, Context, Outcome, SyncEngine, SyncOptions};
use crate::ui::output;

/// Run the up command.
pub fn up(ctx: &Context, draft: bool) -> Result<Outcome> {
    let session = Session::open(ctx)?;
    runtime()?.block_on(up_async(&session, draft))
}

async fn up_async(session: &Session, draft: bool) -> Result<Outcome> {
    let forge = session.forge()?;
    let repo = session.gateway(session.config.default_forge())?;

    let current = session
        .git
        .current_branch()?
        .ok_or_else(|| anyhow!("Not on a branch. Check out a branch of the stack first."))?;

    let stack = engine::load_stack(
        &repo,
        &current,
        &session.trunk,
        session.config.max_stack_depth(),
    )
    .await?;

    let options = SyncOptions {
        draft: draft || session.config.up_draft(),
        retry: session.config.retry_config(),
    };
    let report = SyncEngine::new(&repo, forge.as_deref())
        .with_options(options)
        .run(&stack)
        .await?;

    for line in report.lines() {
        output::print(line, session.verbosity);
    }
    for warning in report.warnings() {
        output::warn(warning, session.verbosity);
    }

    let outcome = report.outcome();
    if outcome == Outcome::Conflicted {
        output::print(
            "Resolve the conflict, run 'git rebase --continue', then 'gflow up' again.",
            session.verbosity,
        );
    }
    Ok(outcome)
}
