//! engine::sync
//!
//! `up`: bring every branch of a stack onto its parent's current head, push
//! it, and point its review request at its parent.
//!
//! # Design
//!
//! The run is split in two. [`plan_sync`] is a pure function of the stack
//! and the observed remote heads that decides, per branch, whether a
//! rebase, a push and a review call are needed. [`SyncEngine::run`] then
//! walks the plan root to tip and performs the side effects.
//!
//! - A branch is rebased when it is stale or any ancestor is rebased
//! - A branch is pushed when it was rebased or its remote head differs
//! - A review call is made when there is no linked review or its target
//!   is not the parent's name
//!
//! A branch needing none of these is reported as already synced and
//! touched in no way, which makes a second `up` a no-op. Without host
//! credentials review calls are skipped, and a branch whose only pending
//! work is a review call counts as synced.
//!
//! # Failure handling
//!
//! The first conflict, failed push or failed review call stops the run;
//! later branches are reported as skipped and earlier ones keep their
//! results. A conflicted rebase is left paused for the user. Pushes are
//! never retried; review calls are retried on transient host errors.

use std::collections::BTreeMap;

use super::fast_forward_trunk;
use super::report::{BranchOutcome, Report, ReviewStep};
use super::EngineError;
use crate::core::stack::{Branch, BranchRecord, ReviewRef, Stack};
use crate::core::types::{BranchName, Oid};
use crate::forge::retry::{retry_with_backoff, RetryConfig, RetryPolicy};
use crate::forge::{Forge, ReviewTarget};
use crate::git::{RebaseOutcome, RepoGateway};

/// What `up` will do to one branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchPlan {
    pub branch: BranchName,
    pub rebase: bool,
    pub push: bool,
    pub review: bool,
}

impl BranchPlan {
    /// True when the branch needs no side effect at all.
    pub fn is_noop(&self) -> bool {
        !self.rebase && !self.push && !self.review
    }
}

/// Ordered per-branch actions for one `up` run. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    pub steps: Vec<BranchPlan>,
}

impl SyncPlan {
    pub fn is_noop(&self) -> bool {
        self.steps.iter().all(BranchPlan::is_noop)
    }
}

/// Compute the sync plan.
///
/// `remote_heads` maps each branch to its remote-tracking head; a missing
/// entry or `None` means the branch was never pushed.
pub fn plan_sync(stack: &Stack, remote_heads: &BTreeMap<BranchName, Option<Oid>>) -> SyncPlan {
    let mut steps = Vec::with_capacity(stack.len());
    let mut ancestor_rebased = false;

    for (i, branch) in stack.topological_order().iter().enumerate() {
        let rebase = ancestor_rebased || stack.is_stale(&branch.name);
        let remote = remote_heads.get(&branch.name).and_then(Option::as_ref);
        let push = rebase || remote != Some(&branch.head);
        let parent = stack.parent_name(i);
        let review = match &branch.review {
            None => true,
            Some(r) => r.target != parent.as_str(),
        };

        ancestor_rebased = rebase;
        steps.push(BranchPlan {
            branch: branch.name.clone(),
            rebase,
            push,
            review,
        });
    }

    SyncPlan { steps }
}

/// Options for an `up` run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Open new review requests as drafts
    pub draft: bool,
    /// Backoff for review calls
    pub retry: RetryConfig,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            draft: false,
            retry: RetryConfig::DEFAULT,
        }
    }
}

/// Executes `up` against a repository and, when credentials exist, a forge.
pub struct SyncEngine<'a> {
    repo: &'a dyn RepoGateway,
    forge: Option<&'a dyn Forge>,
    options: SyncOptions,
}

/// Per-branch step failure that stops the run.
enum Halt {
    Conflict,
    Failed(String),
}

impl<'a> SyncEngine<'a> {
    pub fn new(repo: &'a dyn RepoGateway, forge: Option<&'a dyn Forge>) -> Self {
        Self {
            repo,
            forge,
            options: SyncOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    /// Observe remote heads and compute the plan without side effects.
    pub async fn plan(&self, stack: &Stack) -> Result<SyncPlan, EngineError> {
        let mut remote_heads = BTreeMap::new();
        for branch in stack.topological_order() {
            let head = self.repo.remote_head(&branch.name).await?;
            remote_heads.insert(branch.name.clone(), head);
        }
        Ok(plan_sync(stack, &remote_heads))
    }

    /// Sync the stack.
    ///
    /// # Errors
    ///
    /// Only for failures before the first branch step (dirty tree, an
    /// operation in progress, unreadable remote heads). Everything after
    /// that is recorded in the report.
    pub async fn run(&self, stack: &Stack) -> Result<Report, EngineError> {
        self.repo.ensure_clean().await?;
        let original = self.repo.current_branch().await?;
        let plan = self.plan(stack).await?;

        let mut report = Report::new();
        fast_forward_trunk(self.repo, stack.trunk(), &mut report).await;
        let mut parent_head = stack.trunk_head().clone();
        let mut halted = false;

        for (i, (branch, step)) in stack
            .topological_order()
            .iter()
            .zip(&plan.steps)
            .enumerate()
        {
            if halted {
                report.push(branch.name.clone(), BranchOutcome::Skipped);
                continue;
            }
            // Without a forge a missing review alone is not work to do.
            let effective = BranchPlan {
                review: step.review && self.forge.is_some(),
                ..step.clone()
            };
            if effective.is_noop() {
                tracing::debug!(branch = %branch.name, "already synced");
                report.push(branch.name.clone(), BranchOutcome::AlreadySynced);
                parent_head = branch.head.clone();
                continue;
            }

            match self.sync_branch(stack, i, branch, step, &parent_head).await {
                Ok((head, outcome)) => {
                    report.push(branch.name.clone(), outcome);
                    parent_head = head;
                }
                Err(Halt::Conflict) => {
                    report.push(branch.name.clone(), BranchOutcome::Conflicted);
                    halted = true;
                }
                Err(Halt::Failed(message)) => {
                    tracing::warn!(branch = %branch.name, %message, "sync failed");
                    report.push(branch.name.clone(), BranchOutcome::Failed { message });
                    halted = true;
                }
            }
        }

        // A paused rebase must stay checked out for the user to resolve.
        let conflicted = report
            .entries()
            .iter()
            .any(|(_, o)| *o == BranchOutcome::Conflicted);
        if !conflicted {
            if let Some(original) = original {
                let current = self.repo.current_branch().await.ok().flatten();
                if current.as_ref() != Some(&original) {
                    if let Err(e) = self.repo.checkout(&original).await {
                        report.warn(format!("could not check out {original}: {e}"));
                    }
                }
            }
        }

        Ok(report)
    }

    async fn sync_branch(
        &self,
        stack: &Stack,
        index: usize,
        branch: &Branch,
        step: &BranchPlan,
        parent_head: &Oid,
    ) -> Result<(Oid, BranchOutcome), Halt> {
        let parent_name = stack.parent_name(index);
        let mut record = BranchRecord {
            parent: branch.parent.clone(),
            base: branch.base.clone(),
            review: branch.review.clone(),
        };
        let mut head = branch.head.clone();

        if step.rebase {
            tracing::info!(branch = %branch.name, onto = %parent_head.short(7), "rebasing");
            match self.repo.rebase(&branch.name, parent_head, &branch.base).await {
                Ok(RebaseOutcome::Done { head: new_head }) => head = new_head,
                Ok(RebaseOutcome::Conflict) => return Err(Halt::Conflict),
                Err(e) => return Err(Halt::Failed(format!("rebase failed: {e}"))),
            }
            // The record follows the local branch, pushed or not.
            record.base = parent_head.clone();
            self.save(&branch.name, &record).await?;
        }

        if step.push {
            tracing::info!(branch = %branch.name, "pushing");
            if let Err(e) = self.repo.force_push(&branch.name).await {
                return Err(Halt::Failed(format!("push failed: {e}")));
            }
        }

        let review = if !step.review {
            ReviewStep::Unchanged
        } else if let Some(forge) = self.forge {
            let text = self
                .repo
                .review_text(&branch.name, &record.base)
                .await
                .map_err(|e| Halt::Failed(e.to_string()))?;
            let existing = record.review.as_ref().map(|r| r.number);
            let target = ReviewTarget::new(branch.name.as_str(), parent_name.as_str(), text.title)
                .with_body(text.body)
                .with_draft(self.options.draft)
                .with_existing(existing);

            let result = retry_with_backoff(self.options.retry, RetryPolicy::RetryTransient, || {
                forge.create_or_update(target.clone())
            })
            .await
            .into_result()
            .map_err(|e| Halt::Failed(format!("review request failed: {e}")))?;

            record.review = Some(ReviewRef {
                number: result.number,
                url: result.url,
                target: parent_name.to_string(),
            });
            self.save(&branch.name, &record).await?;
            match existing {
                Some(n) if n == result.number => ReviewStep::Updated(n),
                _ => ReviewStep::Created(result.number),
            }
        } else {
            ReviewStep::Skipped
        };

        Ok((
            head,
            BranchOutcome::Synced {
                rebased: step.rebase,
                pushed: step.push,
                review,
            },
        ))
    }

    async fn save(&self, branch: &BranchName, record: &BranchRecord) -> Result<(), Halt> {
        self.repo
            .save_record(branch, record)
            .await
            .map_err(|e| Halt::Failed(format!("could not save record: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stack::{BranchRecord, Parent, TrackedBranch};

    fn name(s: &str) -> BranchName {
        BranchName::new(s).unwrap()
    }

    fn oid(c: char) -> Oid {
        Oid::new(c.to_string().repeat(40)).unwrap()
    }

    fn review(target: &str) -> ReviewRef {
        ReviewRef {
            number: 1,
            url: "u".into(),
            target: target.into(),
        }
    }

    /// a (on trunk 0) -> b -> c, all synced and linked.
    fn tracked() -> BTreeMap<BranchName, TrackedBranch> {
        let mut t = BTreeMap::new();
        t.insert(
            name("a"),
            TrackedBranch::new(
                name("a"),
                Some(oid('a')),
                BranchRecord::new(Parent::Trunk, oid('0')).with_review(review("main")),
            ),
        );
        t.insert(
            name("b"),
            TrackedBranch::new(
                name("b"),
                Some(oid('b')),
                BranchRecord::new(Parent::Branch(name("a")), oid('a')).with_review(review("a")),
            ),
        );
        t.insert(
            name("c"),
            TrackedBranch::new(
                name("c"),
                Some(oid('c')),
                BranchRecord::new(Parent::Branch(name("b")), oid('b')).with_review(review("b")),
            ),
        );
        t
    }

    fn pushed(stack: &Stack) -> BTreeMap<BranchName, Option<Oid>> {
        stack
            .topological_order()
            .iter()
            .map(|b| (b.name.clone(), Some(b.head.clone())))
            .collect()
    }

    #[test]
    fn synced_stack_plans_nothing() {
        let stack = Stack::build(&name("a"), &name("main"), oid('0'), &tracked(), 32).unwrap();
        let plan = plan_sync(&stack, &pushed(&stack));
        assert!(plan.is_noop());
    }

    #[test]
    fn trunk_advance_rebases_everything() {
        let stack = Stack::build(&name("a"), &name("main"), oid('1'), &tracked(), 32).unwrap();
        let plan = plan_sync(&stack, &pushed(&stack));
        assert!(plan.steps.iter().all(|s| s.rebase && s.push && !s.review));
    }

    #[test]
    fn middle_stale_rebases_from_there() {
        let mut t = tracked();
        t.get_mut(&name("b")).unwrap().record.base = oid('9');
        let stack = Stack::build(&name("a"), &name("main"), oid('0'), &t, 32).unwrap();
        let plan = plan_sync(&stack, &pushed(&stack));
        let rebased: Vec<bool> = plan.steps.iter().map(|s| s.rebase).collect();
        assert_eq!(rebased, [false, true, true]);
    }

    #[test]
    fn unpushed_commit_only_pushes() {
        let stack = Stack::build(&name("a"), &name("main"), oid('0'), &tracked(), 32).unwrap();
        let mut remote = pushed(&stack);
        remote.insert(name("c"), None);
        let plan = plan_sync(&stack, &remote);
        assert_eq!(
            plan.steps[2],
            BranchPlan {
                branch: name("c"),
                rebase: false,
                push: true,
                review: false
            }
        );
    }

    #[test]
    fn missing_or_mistargeted_review_needs_call() {
        let mut t = tracked();
        t.get_mut(&name("a")).unwrap().record.review = None;
        t.get_mut(&name("c")).unwrap().record.review = Some(review("main"));
        let stack = Stack::build(&name("a"), &name("main"), oid('0'), &t, 32).unwrap();
        let plan = plan_sync(&stack, &pushed(&stack));
        let reviews: Vec<bool> = plan.steps.iter().map(|s| s.review).collect();
        assert_eq!(reviews, [true, false, true]);
    }
}
