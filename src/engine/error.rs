//! engine::error
//!
//! Errors that stop a run before or between branch steps.

use thiserror::Error;

use crate::core::stack::StackError;
use crate::forge::ForgeError;
use crate::git::GitError;

/// Errors from the sync and land engines.
///
/// Per-branch failures are reported in the [`Report`](super::Report)
/// instead; these are the cases where no meaningful report exists.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The branches do not form a stack. Nothing was changed.
    #[error("not a stack: {0}")]
    NotAStack(#[from] StackError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Forge(#[from] ForgeError),
}
