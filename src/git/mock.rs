//! git::mock
//!
//! In-memory repository for engine tests.
//!
//! # Design
//!
//! Branch heads, remote heads and tool records live in maps. A rebase that
//! actually moves a branch mints a fresh commit id; a rebase onto the base
//! the branch already has is a no-op, which is what makes repeated `up`
//! runs observable as idempotent. Fetching only records the remote trunk
//! head; the local trunk moves on an explicit fast-forward.
//!
//! Conflicts and failures of rebase, push, record writes and checkout are
//! injected per branch, fetches can start failing after a number of
//! successful calls, and every mutating call is logged for inspection.
//!
//! # Example
//!
//! ```
//! use gflow::core::types::BranchName;
//! use gflow::git::mock::MockRepo;
//! use gflow::git::RepoGateway;
//!
//! # tokio_test::block_on(async {
//! let repo = MockRepo::new("main");
//! let a = BranchName::new("a").unwrap();
//! repo.add_stack(&["a", "b"]);
//!
//! assert_eq!(repo.tracked_branches().await.unwrap().len(), 2);
//! assert_eq!(repo.current_branch().await.unwrap(), Some(a));
//! # });
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::gateway::{RebaseOutcome, RepoGateway, ReviewText};
use super::{GitError, GitState};
use crate::core::stack::{BranchRecord, Parent, TrackedBranch};
use crate::core::types::{BranchName, Oid};

/// In-memory [`RepoGateway`].
///
/// Clones share state.
#[derive(Debug, Clone)]
pub struct MockRepo {
    inner: Arc<Mutex<MockRepoInner>>,
}

#[derive(Debug)]
struct MockRepoInner {
    trunk: BranchName,
    local: BTreeMap<BranchName, Oid>,
    remote: BTreeMap<BranchName, Oid>,
    records: BTreeMap<BranchName, BranchRecord>,
    current: Option<BranchName>,
    paused: Option<BranchName>,
    dirty: bool,
    fetched_trunk: Option<Oid>,
    fetches: usize,
    fetch_failures_after: Option<usize>,
    conflicts: BTreeSet<BranchName>,
    rebase_failures: BTreeSet<BranchName>,
    push_failures: BTreeSet<BranchName>,
    save_failures: BTreeSet<BranchName>,
    checkout_failures: BTreeSet<BranchName>,
    remote_delete_failures: bool,
    next_commit: u64,
    operations: Vec<RepoOperation>,
}

/// Recorded mutating call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoOperation {
    FetchTrunk,
    FastForwardTrunk,
    Rebase { branch: String, onto: Oid },
    AbortRebase,
    Push { branch: String },
    Checkout { branch: String },
    DeleteLocal { branch: String },
    DeleteRemote { branch: String },
    SaveRecord { branch: String },
    RemoveRecord { branch: String },
}

fn name(s: &str) -> BranchName {
    BranchName::new(s).unwrap()
}

impl MockRepoInner {
    fn mint(&mut self) -> Oid {
        self.next_commit += 1;
        Oid::new(format!("{:040x}", self.next_commit)).unwrap()
    }

    fn head(&self, branch: &BranchName) -> Result<Oid, GitError> {
        self.local
            .get(branch)
            .cloned()
            .ok_or_else(|| GitError::RefNotFound {
                refname: format!("refs/heads/{branch}"),
            })
    }
}

impl MockRepo {
    /// Repository with only a trunk, pushed and checked out.
    pub fn new(trunk: &str) -> Self {
        let trunk = name(trunk);
        let mut inner = MockRepoInner {
            trunk: trunk.clone(),
            local: BTreeMap::new(),
            remote: BTreeMap::new(),
            records: BTreeMap::new(),
            current: Some(trunk.clone()),
            paused: None,
            dirty: false,
            fetched_trunk: None,
            fetches: 0,
            fetch_failures_after: None,
            conflicts: BTreeSet::new(),
            rebase_failures: BTreeSet::new(),
            push_failures: BTreeSet::new(),
            save_failures: BTreeSet::new(),
            checkout_failures: BTreeSet::new(),
            remote_delete_failures: false,
            next_commit: 0,
            operations: Vec::new(),
        };
        let head = inner.mint();
        inner.local.insert(trunk.clone(), head.clone());
        inner.remote.insert(trunk, head);
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Create a synced, pushed stack of tracked branches on top of trunk and
    /// check out the first one.
    pub fn add_stack(&self, branches: &[&str]) {
        let mut inner = self.inner.lock().unwrap();
        let mut parent = Parent::Trunk;
        let mut base = inner.remote[&inner.trunk].clone();
        for b in branches {
            let branch = name(b);
            let head = inner.mint();
            inner.local.insert(branch.clone(), head.clone());
            inner.remote.insert(branch.clone(), head.clone());
            inner
                .records
                .insert(branch.clone(), BranchRecord::new(parent, base));
            parent = Parent::Branch(branch);
            base = head;
        }
        inner.current = branches.first().map(|b| name(b));
    }

    /// Push a new commit to the remote trunk.
    pub fn advance_remote_trunk(&self) -> Oid {
        let mut inner = self.inner.lock().unwrap();
        let head = inner.mint();
        let trunk = inner.trunk.clone();
        inner.remote.insert(trunk, head.clone());
        head
    }

    /// Add a local commit to a branch without pushing it.
    pub fn commit(&self, branch: &str) -> Oid {
        let mut inner = self.inner.lock().unwrap();
        let head = inner.mint();
        inner.local.insert(name(branch), head.clone());
        head
    }

    pub fn set_record(&self, branch: &str, record: BranchRecord) {
        self.inner
            .lock()
            .unwrap()
            .records
            .insert(name(branch), record);
    }

    pub fn record(&self, branch: &str) -> Option<BranchRecord> {
        self.inner.lock().unwrap().records.get(&name(branch)).cloned()
    }

    pub fn set_current(&self, branch: &str) {
        self.inner.lock().unwrap().current = Some(name(branch));
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.inner.lock().unwrap().dirty = dirty;
    }

    /// Rebasing `branch` onto a new base will stop on a conflict.
    pub fn conflict_on(&self, branch: &str) {
        self.inner.lock().unwrap().conflicts.insert(name(branch));
    }

    /// Rebasing `branch` onto a new base will fail outright, leaving no
    /// rebase in progress.
    pub fn fail_rebase(&self, branch: &str) {
        self.inner.lock().unwrap().rebase_failures.insert(name(branch));
    }

    /// Fetches after the first `successes` will fail.
    pub fn fail_fetch_after(&self, successes: usize) {
        self.inner.lock().unwrap().fetch_failures_after = Some(successes);
    }

    /// Pushing `branch` will fail.
    pub fn fail_push(&self, branch: &str) {
        self.inner.lock().unwrap().push_failures.insert(name(branch));
    }

    /// Writing the record of `branch` will fail.
    pub fn fail_save(&self, branch: &str) {
        self.inner.lock().unwrap().save_failures.insert(name(branch));
    }

    /// Checking out `branch` will fail.
    pub fn fail_checkout(&self, branch: &str) {
        self.inner.lock().unwrap().checkout_failures.insert(name(branch));
    }

    /// Deleting remote branches will fail.
    pub fn fail_remote_delete(&self) {
        self.inner.lock().unwrap().remote_delete_failures = true;
    }

    pub fn local_head(&self, branch: &str) -> Option<Oid> {
        self.inner.lock().unwrap().local.get(&name(branch)).cloned()
    }

    pub fn remote_branch(&self, branch: &str) -> Option<Oid> {
        self.inner.lock().unwrap().remote.get(&name(branch)).cloned()
    }

    pub fn current(&self) -> Option<BranchName> {
        self.inner.lock().unwrap().current.clone()
    }

    /// Git state as seen by the user after the run.
    pub fn state(&self) -> GitState {
        if self.inner.lock().unwrap().paused.is_some() {
            GitState::Rebase {
                current: None,
                total: None,
            }
        } else {
            GitState::Clean
        }
    }

    pub fn operations(&self) -> Vec<RepoOperation> {
        self.inner.lock().unwrap().operations.clone()
    }

    pub fn clear_operations(&self) {
        self.inner.lock().unwrap().operations.clear();
    }

    /// Branches pushed, in call order.
    pub fn pushes(&self) -> Vec<String> {
        self.operations()
            .into_iter()
            .filter_map(|op| match op {
                RepoOperation::Push { branch } => Some(branch),
                _ => None,
            })
            .collect()
    }

    /// Branches rebased, in call order.
    pub fn rebases(&self) -> Vec<String> {
        self.operations()
            .into_iter()
            .filter_map(|op| match op {
                RepoOperation::Rebase { branch, .. } => Some(branch),
                _ => None,
            })
            .collect()
    }

    fn log(&self, op: RepoOperation) {
        self.inner.lock().unwrap().operations.push(op);
    }
}

#[async_trait]
impl RepoGateway for MockRepo {
    async fn current_branch(&self) -> Result<Option<BranchName>, GitError> {
        Ok(self.current())
    }

    async fn current_head(&self, branch: &BranchName) -> Result<Oid, GitError> {
        self.inner.lock().unwrap().head(branch)
    }

    async fn remote_head(&self, branch: &BranchName) -> Result<Option<Oid>, GitError> {
        Ok(self.inner.lock().unwrap().remote.get(branch).cloned())
    }

    async fn fetch_trunk(&self, trunk: &BranchName) -> Result<Oid, GitError> {
        self.log(RepoOperation::FetchTrunk);
        let mut inner = self.inner.lock().unwrap();
        inner.fetches += 1;
        if matches!(inner.fetch_failures_after, Some(n) if inner.fetches > n) {
            return Err(GitError::Timeout {
                command: format!("git fetch origin {trunk}"),
                secs: 30,
            });
        }
        let head = inner
            .remote
            .get(trunk)
            .cloned()
            .ok_or_else(|| GitError::RefNotFound {
                refname: format!("refs/remotes/origin/{trunk}"),
            })?;
        inner.fetched_trunk = Some(head.clone());
        Ok(head)
    }

    async fn fast_forward_trunk(&self, trunk: &BranchName) -> Result<bool, GitError> {
        self.log(RepoOperation::FastForwardTrunk);
        let mut inner = self.inner.lock().unwrap();
        let fetched = inner
            .fetched_trunk
            .clone()
            .ok_or_else(|| GitError::RefNotFound {
                refname: format!("refs/remotes/origin/{trunk}"),
            })?;
        if inner.local.get(trunk) == Some(&fetched) {
            return Ok(false);
        }
        inner.local.insert(trunk.clone(), fetched);
        Ok(true)
    }

    async fn ensure_clean(&self) -> Result<(), GitError> {
        let inner = self.inner.lock().unwrap();
        if inner.paused.is_some() {
            return Err(GitError::OperationInProgress {
                operation: GitState::Rebase {
                    current: None,
                    total: None,
                },
            });
        }
        if inner.dirty {
            return Err(GitError::DirtyWorktree {
                details: "1 unstaged".to_string(),
            });
        }
        Ok(())
    }

    async fn rebase(
        &self,
        branch: &BranchName,
        onto: &Oid,
        upstream: &Oid,
    ) -> Result<RebaseOutcome, GitError> {
        self.log(RepoOperation::Rebase {
            branch: branch.to_string(),
            onto: onto.clone(),
        });
        let mut inner = self.inner.lock().unwrap();
        let head = inner.head(branch)?;
        if onto == upstream {
            return Ok(RebaseOutcome::Done { head });
        }
        if inner.rebase_failures.contains(branch) {
            return Err(GitError::CommandFailed {
                command: format!("git rebase --onto {onto} {upstream} {branch}"),
                stderr: "could not detach HEAD".to_string(),
            });
        }
        inner.current = Some(branch.clone());
        if inner.conflicts.contains(branch) {
            inner.paused = Some(branch.clone());
            return Ok(RebaseOutcome::Conflict);
        }
        let head = inner.mint();
        inner.local.insert(branch.clone(), head.clone());
        Ok(RebaseOutcome::Done { head })
    }

    async fn abort_rebase(&self) -> Result<(), GitError> {
        self.log(RepoOperation::AbortRebase);
        let mut inner = self.inner.lock().unwrap();
        match inner.paused.take() {
            Some(_) => Ok(()),
            None => Err(GitError::CommandFailed {
                command: "git rebase --abort".to_string(),
                stderr: "No rebase in progress?".to_string(),
            }),
        }
    }

    async fn force_push(&self, branch: &BranchName) -> Result<(), GitError> {
        self.log(RepoOperation::Push {
            branch: branch.to_string(),
        });
        let mut inner = self.inner.lock().unwrap();
        if inner.push_failures.contains(branch) {
            return Err(GitError::CommandFailed {
                command: format!("git push --force-with-lease origin {branch}"),
                stderr: "connection reset".to_string(),
            });
        }
        let head = inner.head(branch)?;
        inner.remote.insert(branch.clone(), head);
        Ok(())
    }

    async fn checkout(&self, branch: &BranchName) -> Result<(), GitError> {
        self.log(RepoOperation::Checkout {
            branch: branch.to_string(),
        });
        let mut inner = self.inner.lock().unwrap();
        inner.head(branch)?;
        if inner.checkout_failures.contains(branch) {
            return Err(GitError::CommandFailed {
                command: format!("git checkout {branch}"),
                stderr: "untracked working tree files would be overwritten".to_string(),
            });
        }
        inner.current = Some(branch.clone());
        Ok(())
    }

    async fn delete_local_branch(&self, branch: &BranchName) -> Result<(), GitError> {
        self.log(RepoOperation::DeleteLocal {
            branch: branch.to_string(),
        });
        let mut inner = self.inner.lock().unwrap();
        if inner.current.as_ref() == Some(branch) {
            return Err(GitError::CommandFailed {
                command: format!("git branch -D {branch}"),
                stderr: format!("cannot delete branch '{branch}' checked out"),
            });
        }
        inner.head(branch)?;
        inner.local.remove(branch);
        Ok(())
    }

    async fn delete_remote_branch(&self, branch: &BranchName) -> Result<(), GitError> {
        self.log(RepoOperation::DeleteRemote {
            branch: branch.to_string(),
        });
        let mut inner = self.inner.lock().unwrap();
        if inner.remote_delete_failures {
            return Err(GitError::CommandFailed {
                command: format!("git push origin --delete {branch}"),
                stderr: "remote ref does not exist".to_string(),
            });
        }
        inner.remote.remove(branch);
        Ok(())
    }

    async fn review_text(&self, branch: &BranchName, _base: &Oid) -> Result<ReviewText, GitError> {
        Ok(ReviewText {
            title: format!("Changes from {branch}"),
            body: None,
        })
    }

    async fn tracked_branches(&self) -> Result<BTreeMap<BranchName, TrackedBranch>, GitError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .records
            .iter()
            .map(|(b, record)| {
                (
                    b.clone(),
                    TrackedBranch::new(b.clone(), inner.local.get(b).cloned(), record.clone()),
                )
            })
            .collect())
    }

    async fn save_record(
        &self,
        branch: &BranchName,
        record: &BranchRecord,
    ) -> Result<(), GitError> {
        self.log(RepoOperation::SaveRecord {
            branch: branch.to_string(),
        });
        let mut inner = self.inner.lock().unwrap();
        if inner.save_failures.contains(branch) {
            return Err(GitError::CasFailed {
                refname: format!("refs/gflow-metadata/{branch}"),
                expected: "(absent)".to_string(),
                actual: "(present)".to_string(),
            });
        }
        inner.records.insert(branch.clone(), record.clone());
        Ok(())
    }

    async fn remove_record(&self, branch: &BranchName) -> Result<(), GitError> {
        self.log(RepoOperation::RemoveRecord {
            branch: branch.to_string(),
        });
        self.inner.lock().unwrap().records.remove(branch);
        Ok(())
    }
}
