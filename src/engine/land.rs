//! engine::land
//!
//! `land`: merge a stack into trunk one branch at a time, root first.
//!
//! # State machine
//!
//! ```text
//! Pending -> Validating -> Merging -> Landed
//!                      \-> Blocked      \-> Failed
//! ```
//!
//! Validation is the pure [`decide`] function over what was observed for
//! the branch. A review already merged on the host is treated as landed and
//! only cleaned up, so an interrupted run resumes at the first branch that
//! has not landed and never merges anything twice.
//!
//! # After a branch lands
//!
//! 1. The next branch is re-parented to trunk, persisted before anything
//!    else so a later `up` or `land` can pick it up
//! 2. Trunk is fetched
//! 3. The next branch is rebased onto the new trunk head, pushed, and its
//!    review re-targeted to trunk. A conflict aborts the rebase and blocks
//!    the next branch
//! 4. The landed branch is deleted locally, its record removed, and its
//!    remote branch deleted (best effort)
//!
//! Only the next branch is re-rooted. Branches further up keep their parent
//! and base; they are still correctly stacked and are re-rooted in turn.

use super::fast_forward_trunk;
use super::report::{BlockReason, BranchOutcome, Report};
use super::EngineError;
use crate::core::stack::{Branch, BranchRecord, Parent, ReviewRef, Stack};
use crate::core::types::{BranchName, Oid};
use crate::forge::retry::{retry_with_backoff, RetryConfig, RetryPolicy};
use crate::forge::{Forge, MergeMethod, ReviewStatus, ReviewTarget};
use crate::git::{RebaseOutcome, RepoGateway};

/// Everything the decision for one branch depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// Linked review and its host status
    pub review: Option<(u64, ReviewStatus)>,
    /// Recorded base differs from the parent's head
    pub stale: bool,
    /// Remote head equals local head
    pub pushed: bool,
    /// Re-rooted onto trunk earlier in this run
    pub rerooted: bool,
}

/// What to do with one branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Merged already; clean up only
    AlreadyLanded(u64),
    Merge(u64),
    Blocked(BlockReason),
}

/// Decide what to do with a branch.
///
/// # Example
///
/// ```
/// use gflow::engine::land::{decide, Decision, Observation};
/// use gflow::engine::BlockReason;
/// use gflow::forge::ReviewStatus;
///
/// let mut obs = Observation {
///     review: Some((4, ReviewStatus::Approved)),
///     stale: false,
///     pushed: true,
///     rerooted: false,
/// };
/// assert_eq!(decide(&obs), Decision::Merge(4));
///
/// obs.review = Some((4, ReviewStatus::Open));
/// assert_eq!(decide(&obs), Decision::Blocked(BlockReason::NotApproved));
/// ```
pub fn decide(obs: &Observation) -> Decision {
    let Some((number, status)) = obs.review else {
        return Decision::Blocked(BlockReason::NoReview);
    };
    match status {
        ReviewStatus::Merged => Decision::AlreadyLanded(number),
        ReviewStatus::Closed => Decision::Blocked(BlockReason::Closed),
        _ if obs.stale => Decision::Blocked(BlockReason::Stale),
        ReviewStatus::Open => Decision::Blocked(BlockReason::NotApproved),
        ReviewStatus::Approved if !obs.pushed && !obs.rerooted => {
            Decision::Blocked(BlockReason::NotPushed)
        }
        ReviewStatus::Approved => Decision::Merge(number),
    }
}

/// Options for a `land` run.
#[derive(Debug, Clone)]
pub struct LandOptions {
    pub method: MergeMethod,
    /// Backoff for host calls, including merges
    pub retry: RetryConfig,
    /// Report decisions without side effects
    pub dry_run: bool,
}

impl Default for LandOptions {
    fn default() -> Self {
        Self {
            method: MergeMethod::default(),
            retry: RetryConfig::DEFAULT,
            dry_run: false,
        }
    }
}

/// A branch as the run currently knows it.
#[derive(Debug, Clone)]
struct Pending {
    name: BranchName,
    head: Oid,
    base: Oid,
    review: Option<ReviewRef>,
    rerooted: bool,
    /// Set when re-rooting failed; the branch is not validated further
    blocked: Option<BlockReason>,
    failed: Option<String>,
}

impl From<&Branch> for Pending {
    fn from(b: &Branch) -> Self {
        Self {
            name: b.name.clone(),
            head: b.head.clone(),
            base: b.base.clone(),
            review: b.review.clone(),
            rerooted: false,
            blocked: None,
            failed: None,
        }
    }
}

/// Executes `land`.
pub struct LandEngine<'a> {
    repo: &'a dyn RepoGateway,
    forge: &'a dyn Forge,
    options: LandOptions,
}

impl<'a> LandEngine<'a> {
    pub fn new(repo: &'a dyn RepoGateway, forge: &'a dyn Forge) -> Self {
        Self {
            repo,
            forge,
            options: LandOptions::default(),
        }
    }

    pub fn with_options(mut self, options: LandOptions) -> Self {
        self.options = options;
        self
    }

    /// Land the stack.
    ///
    /// # Errors
    ///
    /// Only for failures before the first branch is processed. Per-branch
    /// results, including blocks and failures, are in the report.
    pub async fn run(&self, stack: &Stack) -> Result<Report, EngineError> {
        let dry_run = self.options.dry_run;
        if !dry_run {
            self.repo.ensure_clean().await?;
        }
        let original = self.repo.current_branch().await?;
        let trunk = stack.trunk().clone();
        let mut report = Report::new();
        if !dry_run {
            fast_forward_trunk(self.repo, &trunk, &mut report).await;
        }

        let mut pending: Vec<Pending> = stack
            .topological_order()
            .iter()
            .map(Pending::from)
            .collect();
        let mut trunk_head = stack.trunk_head().clone();
        let mut halted = false;

        for i in 0..pending.len() {
            let mut branch = pending[i].clone();
            if halted {
                report.push(branch.name, BranchOutcome::Skipped);
                continue;
            }
            if let Some(message) = branch.failed.take() {
                report.push(branch.name, BranchOutcome::Failed { message });
                halted = true;
                continue;
            }
            if let Some(reason) = branch.blocked.take() {
                report.push(branch.name, BranchOutcome::Blocked(reason));
                halted = true;
                continue;
            }

            let obs = match self.observe(stack, i, &branch, &trunk_head).await {
                Ok(obs) => obs,
                Err(message) => {
                    report.push(branch.name, BranchOutcome::Failed { message });
                    halted = true;
                    continue;
                }
            };
            let decision = decide(&obs);
            tracing::debug!(branch = %branch.name, ?obs, ?decision, "land decision");

            match decision {
                Decision::Blocked(reason) => {
                    report.push(branch.name, BranchOutcome::Blocked(reason));
                    halted = true;
                }
                Decision::AlreadyLanded(review) if dry_run => {
                    report.push(branch.name, BranchOutcome::AlreadyLanded { review });
                }
                Decision::Merge(review) if dry_run => {
                    report.push(branch.name, BranchOutcome::WouldLand { review });
                }
                Decision::AlreadyLanded(review) => {
                    tracing::info!(branch = %branch.name, review, "already merged, cleaning up");
                    trunk_head = self
                        .after_landing(&trunk, &mut pending, i, &trunk_head, &mut report)
                        .await;
                    report.push(branch.name, BranchOutcome::AlreadyLanded { review });
                }
                Decision::Merge(review) => match self.merge(review).await {
                    Ok(()) => {
                        tracing::info!(branch = %branch.name, review, "merged");
                        trunk_head = self
                            .after_landing(&trunk, &mut pending, i, &trunk_head, &mut report)
                            .await;
                        report.push(branch.name, BranchOutcome::Landed { review });
                    }
                    Err(message) => {
                        report.push(branch.name, BranchOutcome::Failed { message });
                        halted = true;
                    }
                },
            }
        }

        if !dry_run {
            self.restore_checkout(original, &trunk, &mut report).await;
        }
        Ok(report)
    }

    async fn observe(
        &self,
        stack: &Stack,
        index: usize,
        branch: &Pending,
        trunk_head: &Oid,
    ) -> Result<Observation, String> {
        let review = match &branch.review {
            Some(r) => {
                let number = r.number;
                let status = retry_with_backoff(
                    self.options.retry,
                    RetryPolicy::RetryTransient,
                    || self.forge.status(number),
                )
                .await
                .into_result()
                .map_err(|e| format!("could not read review #{number}: {e}"))?;
                Some((number, status))
            }
            None => None,
        };

        // In a real run every branch reached here sits directly on trunk: it
        // is the root, or its parent just landed and it was re-rooted. A dry
        // run re-roots nothing, so later branches keep their recorded parent.
        let stale = if index == 0 || !self.options.dry_run {
            &branch.base != trunk_head
        } else {
            stack.is_stale(&branch.name)
        };

        let remote = self
            .repo
            .remote_head(&branch.name)
            .await
            .map_err(|e| e.to_string())?;

        Ok(Observation {
            review,
            stale,
            pushed: remote.as_ref() == Some(&branch.head),
            rerooted: branch.rerooted || (self.options.dry_run && index > 0),
        })
    }

    /// Merge with retry. A merge whose response was lost is detected by
    /// reading the status back.
    async fn merge(&self, number: u64) -> Result<(), String> {
        let method = self.options.method;
        let result = retry_with_backoff(self.options.retry, RetryPolicy::RetryTransient, || {
            self.forge.merge(number, method)
        })
        .await
        .into_result();

        match result {
            Ok(()) => Ok(()),
            Err(e) => match self.forge.status(number).await {
                Ok(ReviewStatus::Merged) => {
                    tracing::debug!(number, error = %e, "merge reported an error but landed");
                    Ok(())
                }
                _ => Err(format!("merge of #{number} failed: {e}")),
            },
        }
    }

    /// Re-root the next branch and clean up the landed one. Returns the new
    /// trunk head.
    async fn after_landing(
        &self,
        trunk: &BranchName,
        pending: &mut [Pending],
        index: usize,
        trunk_head: &Oid,
        report: &mut Report,
    ) -> Oid {
        let landed = pending[index].name.clone();
        let next = index + 1;
        let has_next = next < pending.len();

        if has_next {
            let record = BranchRecord {
                parent: Parent::Trunk,
                base: pending[next].base.clone(),
                review: pending[next].review.clone(),
            };
            if let Err(e) = self.repo.save_record(&pending[next].name, &record).await {
                pending[next].failed = Some(format!("could not re-parent onto {trunk}: {e}"));
            }
        }

        let new_trunk_head = match self.repo.fetch_trunk(trunk).await {
            Ok(head) => {
                fast_forward_trunk(self.repo, trunk, report).await;
                head
            }
            Err(e) => {
                report.warn(format!("could not fetch {trunk}: {e}"));
                if has_next && pending[next].failed.is_none() {
                    pending[next].failed = Some(format!("could not fetch {trunk}: {e}"));
                }
                trunk_head.clone()
            }
        };

        // Deleting the remote branch while a review still targets it would
        // close that review on some hosts. Until a re-target succeeds, the
        // next review still points at the landed branch.
        let mut remote_safe = !has_next || pending[next].review.is_none();
        if has_next && pending[next].failed.is_none() {
            remote_safe = self
                .reroot(trunk, &mut pending[next], &new_trunk_head)
                .await;
        }

        self.cleanup(trunk, &landed, remote_safe, report).await;
        new_trunk_head
    }

    /// Rebase, push and re-target the new root. Returns whether its review
    /// no longer targets the landed branch.
    async fn reroot(&self, trunk: &BranchName, branch: &mut Pending, onto: &Oid) -> bool {
        tracing::info!(branch = %branch.name, onto = %onto.short(7), "re-rooting onto trunk");
        match self.repo.rebase(&branch.name, onto, &branch.base).await {
            Ok(RebaseOutcome::Done { head }) => {
                branch.head = head;
                branch.base = onto.clone();
            }
            Ok(RebaseOutcome::Conflict) => {
                if let Err(e) = self.repo.abort_rebase().await {
                    tracing::warn!(error = %e, "could not abort rebase");
                }
                branch.blocked = Some(BlockReason::RebaseConflict);
                return branch.review.is_none();
            }
            Err(e) => {
                branch.failed = Some(format!("rebase onto {trunk} failed: {e}"));
                return branch.review.is_none();
            }
        }

        let mut record = BranchRecord {
            parent: Parent::Trunk,
            base: branch.base.clone(),
            review: branch.review.clone(),
        };
        if let Err(e) = self.repo.save_record(&branch.name, &record).await {
            branch.failed = Some(format!("could not save record: {e}"));
            return false;
        }

        if let Err(e) = self.repo.force_push(&branch.name).await {
            branch.failed = Some(format!("push failed: {e}"));
            return false;
        }
        branch.rerooted = true;

        let Some(review) = branch.review.clone() else {
            return true;
        };
        let title = match self.repo.review_text(&branch.name, &branch.base).await {
            Ok(text) => text.title,
            Err(_) => branch.name.to_string(),
        };
        let target = ReviewTarget::new(branch.name.as_str(), trunk.as_str(), title)
            .with_existing(Some(review.number));
        let result = retry_with_backoff(self.options.retry, RetryPolicy::RetryTransient, || {
            self.forge.create_or_update(target.clone())
        })
        .await
        .into_result();

        match result {
            Ok(updated) => {
                record.review = Some(ReviewRef {
                    number: updated.number,
                    url: updated.url,
                    target: trunk.to_string(),
                });
                branch.review = record.review.clone();
                if let Err(e) = self.repo.save_record(&branch.name, &record).await {
                    branch.failed = Some(format!("could not save record: {e}"));
                }
                true
            }
            Err(e) => {
                branch.failed = Some(format!("could not re-target review #{}: {e}", review.number));
                false
            }
        }
    }

    async fn cleanup(
        &self,
        trunk: &BranchName,
        branch: &BranchName,
        delete_remote: bool,
        report: &mut Report,
    ) {
        if let Ok(Some(current)) = self.repo.current_branch().await {
            if &current == branch {
                if let Err(e) = self.repo.checkout(trunk).await {
                    report.warn(format!("could not check out {trunk}: {e}"));
                }
            }
        }
        if let Err(e) = self.repo.delete_local_branch(branch).await {
            report.warn(format!("could not delete local branch {branch}: {e}"));
        }
        if let Err(e) = self.repo.remove_record(branch).await {
            report.warn(format!("could not remove record for {branch}: {e}"));
        }
        if !delete_remote {
            report.warn(format!(
                "kept remote branch {branch}: the next review still targets it"
            ));
            return;
        }
        if let Err(e) = self.repo.delete_remote_branch(branch).await {
            tracing::warn!(branch = %branch, error = %e, "could not delete remote branch");
            report.warn(format!("could not delete remote branch {branch}: {e}"));
        }
    }

    /// Return to the branch the user started on, or trunk if it landed.
    async fn restore_checkout(
        &self,
        original: Option<BranchName>,
        trunk: &BranchName,
        report: &mut Report,
    ) {
        let target = match original {
            Some(b) if self.repo.current_head(&b).await.is_ok() => b,
            _ => trunk.clone(),
        };
        let current = self.repo.current_branch().await.ok().flatten();
        if current.as_ref() != Some(&target) {
            if let Err(e) = self.repo.checkout(&target).await {
                report.warn(format!("could not check out {target}: {e}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(status: Option<ReviewStatus>) -> Observation {
        Observation {
            review: status.map(|s| (1, s)),
            stale: false,
            pushed: true,
            rerooted: false,
        }
    }

    #[test]
    fn approved_and_current_merges() {
        assert_eq!(decide(&obs(Some(ReviewStatus::Approved))), Decision::Merge(1));
    }

    #[test]
    fn merged_is_landed_even_when_stale() {
        let o = Observation {
            stale: true,
            pushed: false,
            ..obs(Some(ReviewStatus::Merged))
        };
        assert_eq!(decide(&o), Decision::AlreadyLanded(1));
    }

    #[test]
    fn blocked_reasons_in_order() {
        assert_eq!(decide(&obs(None)), Decision::Blocked(BlockReason::NoReview));
        assert_eq!(
            decide(&obs(Some(ReviewStatus::Closed))),
            Decision::Blocked(BlockReason::Closed)
        );

        let stale_open = Observation {
            stale: true,
            ..obs(Some(ReviewStatus::Open))
        };
        assert_eq!(decide(&stale_open), Decision::Blocked(BlockReason::Stale));

        assert_eq!(
            decide(&obs(Some(ReviewStatus::Open))),
            Decision::Blocked(BlockReason::NotApproved)
        );
    }

    #[test]
    fn unpushed_blocks_unless_rerooted() {
        let unpushed = Observation {
            pushed: false,
            ..obs(Some(ReviewStatus::Approved))
        };
        assert_eq!(decide(&unpushed), Decision::Blocked(BlockReason::NotPushed));

        let rerooted = Observation {
            rerooted: true,
            ..unpushed
        };
        assert_eq!(decide(&rerooted), Decision::Merge(1));
    }
}
