//! engine::report
//!
//! Per-branch results of an `up` or `land` run.
//!
//! Expected failures (a conflict, a blocked branch, a rejected merge) are
//! not Rust errors: they are recorded here against the branch they
//! happened on, and the overall [`Outcome`] decides the exit code.

use std::fmt;

use crate::core::types::BranchName;

/// What happened to a branch's review request during `up`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewStep {
    /// Already linked and targeting the right branch
    Unchanged,
    Created(u64),
    /// Existing review re-targeted
    Updated(u64),
    /// No host credentials; nothing was sent
    Skipped,
}

/// Why a branch could not be landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    NoReview,
    Closed,
    Stale,
    NotApproved,
    /// Local head differs from the remote; run `up` first
    NotPushed,
    /// Re-rooting onto the new trunk hit a conflict
    RebaseConflict,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BlockReason::NoReview => "no review request (run `gflow up`)",
            BlockReason::Closed => "review request was closed",
            BlockReason::Stale => "out of date with its parent (run `gflow up`)",
            BlockReason::NotApproved => "review not approved",
            BlockReason::NotPushed => "local head differs from the remote (run `gflow up`)",
            BlockReason::RebaseConflict => "conflict while rebasing onto the new trunk",
        };
        f.write_str(text)
    }
}

/// Result for one branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchOutcome {
    /// `up` made the branch current with its parent
    Synced {
        rebased: bool,
        pushed: bool,
        review: ReviewStep,
    },
    /// `up` found nothing to do
    AlreadySynced,
    /// Rebase stopped on a conflict; the rebase is paused for resolution
    Conflicted,
    /// Not processed because an earlier branch stopped the run
    Skipped,
    /// `land` merged the review
    Landed { review: u64 },
    /// The review was merged by an earlier run or by hand; only cleaned up
    AlreadyLanded { review: u64 },
    /// `land --dry-run` would merge this review
    WouldLand { review: u64 },
    Blocked(BlockReason),
    /// A push, host call or local operation failed
    Failed { message: String },
}

impl BranchOutcome {
    /// Severity of this outcome, if it is a failure.
    pub fn failure(&self) -> Option<Outcome> {
        match self {
            BranchOutcome::Conflicted => Some(Outcome::Conflicted),
            BranchOutcome::Blocked(_) => Some(Outcome::Blocked),
            BranchOutcome::Failed { .. } => Some(Outcome::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for BranchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchOutcome::Synced {
                rebased,
                pushed,
                review,
            } => {
                let mut done = Vec::new();
                if *rebased {
                    done.push("rebased".to_string());
                }
                if *pushed {
                    done.push("pushed".to_string());
                }
                match review {
                    ReviewStep::Unchanged => {}
                    ReviewStep::Created(n) => done.push(format!("opened #{n}")),
                    ReviewStep::Updated(n) => done.push(format!("updated #{n}")),
                    ReviewStep::Skipped => done.push("review skipped (no token)".to_string()),
                }
                write!(f, "synced ({})", done.join(", "))
            }
            BranchOutcome::AlreadySynced => write!(f, "already synced"),
            BranchOutcome::Conflicted => write!(f, "conflicted, rebase paused"),
            BranchOutcome::Skipped => write!(f, "skipped"),
            BranchOutcome::Landed { review } => write!(f, "landed #{review}"),
            BranchOutcome::AlreadyLanded { review } => {
                write!(f, "already landed #{review}, cleaned up")
            }
            BranchOutcome::WouldLand { review } => write!(f, "would land #{review}"),
            BranchOutcome::Blocked(reason) => write!(f, "blocked: {reason}"),
            BranchOutcome::Failed { message } => write!(f, "failed: {message}"),
        }
    }
}

/// Overall result of a run, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Outcome {
    Success,
    Conflicted,
    Blocked,
    Failed,
}

impl Outcome {
    /// Process exit code. `1` is reserved for internal errors.
    ///
    /// # Example
    ///
    /// ```
    /// use gflow::engine::Outcome;
    ///
    /// assert_eq!(Outcome::Success.exit_code(), 0);
    /// assert_eq!(Outcome::Conflicted.exit_code(), 2);
    /// assert_eq!(Outcome::Blocked.exit_code(), 3);
    /// assert_eq!(Outcome::Failed.exit_code(), 4);
    /// ```
    pub fn exit_code(self) -> u8 {
        match self {
            Outcome::Success => 0,
            Outcome::Conflicted => 2,
            Outcome::Blocked => 3,
            Outcome::Failed => 4,
        }
    }
}

/// Per-branch results in stack order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    entries: Vec<(BranchName, BranchOutcome)>,
    /// Problems that did not fail the run (e.g. a remote branch that could
    /// not be deleted)
    warnings: Vec<String>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, branch: BranchName, outcome: BranchOutcome) {
        self.entries.push((branch, outcome));
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn entries(&self) -> &[(BranchName, BranchOutcome)] {
        &self.entries
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn get(&self, branch: &str) -> Option<&BranchOutcome> {
        self.entries
            .iter()
            .find(|(b, _)| b.as_str() == branch)
            .map(|(_, o)| o)
    }

    /// The most severe failure, or success.
    pub fn outcome(&self) -> Outcome {
        self.entries
            .iter()
            .filter_map(|(_, o)| o.failure())
            .max()
            .unwrap_or(Outcome::Success)
    }

    /// Lines for display, one per branch.
    pub fn lines(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(b, o)| format!("{b}: {o}"))
            .collect()
    }
}
