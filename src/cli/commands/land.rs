//! land command - Merge the current stack into trunk
//!
//! # Example
//!
//! ```bash
//! # Preview what would land
//! gflow land --dry-run
//!
//! # Land with merge commits instead of squashing
//! gflow land --method merge
//! ```

use anyhow::{anyhow, Result};

use super::{runtime, Session};
use crate::engine::{self, Context, LandEngine, LandOptions, Outcome};
use crate::forge::MergeMethod;
use crate::ui::output;

/// Run the land command.
///
/// This is a synchronous wrapper that uses tokio to run the async implementation.
pub fn land(ctx: &Context, dry_run: bool, method: Option<MergeMethod>) -> Result<Outcome> {
    let session = Session::open(ctx)?;
    runtime()?.block_on(land_async(&session, dry_run, method))
}

async fn land_async(
    session: &Session,
    dry_run: bool,
    method: Option<MergeMethod>,
) -> Result<Outcome> {
    let forge = session.require_forge()?;
    let repo = session.gateway(forge.name())?;

    let current = session
        .git
        .current_branch()?
        .ok_or_else(|| anyhow!("Not on a branch. Check out a branch of the stack first."))?;
    if current == session.trunk {
        return Err(anyhow!(
            "'{}' is trunk. Check out a branch of the stack to land.",
            current
        ));
    }

    let stack = engine::load_stack(
        &repo,
        &current,
        &session.trunk,
        session.config.max_stack_depth(),
    )
    .await?;

    let options = LandOptions {
        method: method.unwrap_or_else(|| session.config.merge_method()),
        retry: session.config.retry_config(),
        dry_run,
    };
    tracing::debug!(method = %options.method, dry_run, "landing stack");

    let report = LandEngine::new(&repo, forge.as_ref())
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
    match outcome {
        Outcome::Blocked if !dry_run => output::print(
            "Run 'gflow land' again once the blocked branch is ready; landed branches are not merged twice.",
            session.verbosity,
        ),
        Outcome::Failed => output::print(
            "The host rejected a merge or was unreachable; check the review and retry.",
            session.verbosity,
        ),
        _ => {}
    }
    Ok(outcome)
}
