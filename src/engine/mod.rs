//! engine
//!
//! The stack synchronization and landing engines.
//!
//! # Architecture
//!
//! Every invocation follows the same shape:
//!
//! ```text
//! fetch trunk -> read records -> build Stack -> plan -> execute -> Report
//! ```
//!
//! The engines only see the [`RepoGateway`] and [`Forge`] traits, so the
//! same code runs against a real repository and GitHub, or against the
//! in-memory mocks in tests.
//!
//! - [`sync`]: `up`, rebase and push the stack and open/update reviews
//! - [`land`]: merge the stack into trunk in dependency order
//! - [`status`]: read-only overview with bounded concurrent host reads
//! - [`report`]: per-branch outcomes and exit codes
//!
//! # Invariants
//!
//! - Branches are processed strictly root to tip
//! - A failure at branch *k* stops *k+1..n* and never re-processes *1..k-1*
//! - Irreversible actions run only after their local preconditions pass
//!
//! # Example
//!
//! ```ignore
//! let stack = load_stack(&repo, &current, &trunk, 32).await?;
//! let report = SyncEngine::new(&repo, Some(forge.as_ref())).run(&stack).await?;
//! std::process::exit(report.outcome().exit_code().into());
//! ```
//!
//! [`Forge`]: crate::forge::Forge

mod error;
pub mod land;
pub mod report;
pub mod status;
pub mod sync;

pub use error::EngineError;
pub use land::{LandEngine, LandOptions};
pub use report::{BlockReason, BranchOutcome, Outcome, Report, ReviewStep};
pub use sync::{SyncEngine, SyncOptions};

use std::path::PathBuf;

use crate::core::stack::Stack;
use crate::core::types::BranchName;
use crate::git::RepoGateway;

/// Execution context for commands.
///
/// Global settings derived from CLI flags.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Working directory override.
    pub cwd: Option<PathBuf>,
    /// Debug logging enabled; git commands are echoed.
    pub debug: bool,
    /// Quiet mode (minimal output).
    pub quiet: bool,
    /// Hook verification from the command line; `None` defers to config.
    /// When false, pushes are invoked with --no-verify.
    pub verify: Option<bool>,
}

/// Fetch trunk and build the stack containing `start`. Only the
/// remote-tracking trunk moves; nothing local changes.
///
/// # Errors
///
/// [`EngineError::NotAStack`] when the tracked branches around `start` do
/// not form a stack; git errors from the fetch or the record reads.
pub async fn load_stack(
    repo: &dyn RepoGateway,
    start: &BranchName,
    trunk: &BranchName,
    max_depth: usize,
) -> Result<Stack, EngineError> {
    let trunk_head = repo.fetch_trunk(trunk).await?;
    let tracked = repo.tracked_branches().await?;
    let stack = Stack::build(start, trunk, trunk_head, &tracked, max_depth)?;
    tracing::debug!(
        start = %start,
        branches = stack.len(),
        "built stack"
    );
    Ok(stack)
}

/// Bring the local trunk up to the fetched remote head. A failure only
/// costs the user a stale local trunk, so it becomes a report warning.
pub(crate) async fn fast_forward_trunk(
    repo: &dyn RepoGateway,
    trunk: &BranchName,
    report: &mut Report,
) {
    match repo.fast_forward_trunk(trunk).await {
        Ok(true) => tracing::info!(trunk = %trunk, "fast-forwarded local trunk"),
        Ok(false) => {}
        Err(e) => report.warn(format!("could not fast-forward {trunk}: {e}")),
    }
}

/// Build every tracked stack, skipping (and logging) malformed ones.
pub async fn load_all_stacks(
    repo: &dyn RepoGateway,
    trunk: &BranchName,
    max_depth: usize,
) -> Result<Vec<Result<Stack, (BranchName, EngineError)>>, EngineError> {
    let trunk_head = repo.fetch_trunk(trunk).await?;
    let tracked = repo.tracked_branches().await?;
    Ok(Stack::roots(&tracked, trunk)
        .into_iter()
        .map(|root| {
            Stack::build(&root, trunk, trunk_head.clone(), &tracked, max_depth)
                .map_err(|e| (root, EngineError::from(e)))
        })
        .collect())
}
