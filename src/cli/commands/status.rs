//! status command - Show every tracked stack

use std::sync::Arc;

use anyhow::Result;

use super::{runtime, Session};
use crate::engine::{self, status, Context, Outcome};
use crate::forge::Forge;
use crate::ui::output;

/// Print each stack root first, with staleness and review status.
///
/// Malformed stacks are reported and skipped; they do not fail the command.
pub fn status(ctx: &Context) -> Result<Outcome> {
    let session = Session::open(ctx)?;
    runtime()?.block_on(status_async(&session))
}

async fn status_async(session: &Session) -> Result<Outcome> {
    let forge: Option<Arc<dyn Forge>> = session.forge()?.map(Arc::from);
    let repo = session.gateway(session.config.default_forge())?;

    let loaded =
        engine::load_all_stacks(&repo, &session.trunk, session.config.max_stack_depth()).await?;

    let mut stacks = Vec::new();
    for result in loaded {
        match result {
            Ok(stack) => stacks.push(stack),
            Err((root, e)) => output::warn(format!("stack at '{root}': {e}"), session.verbosity),
        }
    }

    if stacks.is_empty() {
        output::print("No tracked stacks.", session.verbosity);
        return Ok(Outcome::Success);
    }

    let current = session.git.current_branch()?;
    let overview = status::collect(&stacks, forge, session.config.status_concurrency()).await;
    for (i, stack) in overview.iter().enumerate() {
        if i > 0 {
            output::print("", session.verbosity);
        }
        output::print(&session.trunk, session.verbosity);
        for branch in &stack.branches {
            let marker = if current.as_ref() == Some(&branch.name) {
                "*"
            } else {
                " "
            };
            output::print(format!("{marker} {branch}"), session.verbosity);
        }
    }
    Ok(Outcome::Success)
}
