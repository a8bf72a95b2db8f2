//! git::gateway
//!
//! The repository operations the engines depend on.
//!
//! # Design
//!
//! [`RepoGateway`] is the seam between the sync/land engines and a real
//! repository. [`GitGateway`] implements it with [`Git`] for reads and
//! metadata, and [`GitRunner`] for rebase, push and fetch. Tests use
//! [`MockRepo`](super::mock::MockRepo) instead.
//!
//! The gateway does no sequencing of its own. Deciding when to check out
//! trunk before deleting a branch, or when a push is allowed, belongs to
//! the engines.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use super::{Git, GitError, GitRunner};
use crate::core::metadata::{
    BranchMetadataV1, MetadataStore, ParentInfo, ReviewLink, StoreError,
};
use crate::core::stack::{BranchRecord, Parent, ReviewRef, TrackedBranch};
use crate::core::types::{BranchName, Oid, RefName};

/// Result of rebasing one branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebaseOutcome {
    /// The branch now sits on the new base.
    Done { head: Oid },
    /// The rebase stopped on a conflict and is paused in the worktree.
    Conflict,
}

/// Title and body for a review request, taken from the branch's commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewText {
    pub title: String,
    pub body: Option<String>,
}

/// Repository operations consumed by the engines.
#[async_trait]
pub trait RepoGateway: Send + Sync {
    /// Checked-out branch, `None` when detached.
    async fn current_branch(&self) -> Result<Option<BranchName>, GitError>;

    /// Local head of a branch.
    async fn current_head(&self, branch: &BranchName) -> Result<Oid, GitError>;

    /// Remote-tracking head of a branch, `None` if never pushed.
    async fn remote_head(&self, branch: &BranchName) -> Result<Option<Oid>, GitError>;

    /// Fetch trunk from the remote and return the remote trunk head. Only
    /// the remote-tracking ref moves.
    async fn fetch_trunk(&self, trunk: &BranchName) -> Result<Oid, GitError>;

    /// Move the local trunk up to the last fetched remote head if it is
    /// strictly behind. Returns whether it moved; a diverged or missing
    /// local trunk is left alone.
    async fn fast_forward_trunk(&self, trunk: &BranchName) -> Result<bool, GitError>;

    /// Fail if an operation is in progress or the tree has changes.
    async fn ensure_clean(&self) -> Result<(), GitError>;

    /// Replay the commits of `branch` after `upstream` onto `onto`.
    ///
    /// An `Err` means no rebase is left in progress; a rebase that stopped
    /// part way for any reason is reported as [`RebaseOutcome::Conflict`].
    async fn rebase(
        &self,
        branch: &BranchName,
        onto: &Oid,
        upstream: &Oid,
    ) -> Result<RebaseOutcome, GitError>;

    async fn abort_rebase(&self) -> Result<(), GitError>;

    /// Push a branch over its remote counterpart.
    async fn force_push(&self, branch: &BranchName) -> Result<(), GitError>;

    async fn checkout(&self, branch: &BranchName) -> Result<(), GitError>;

    /// Delete a local branch. It must not be checked out.
    async fn delete_local_branch(&self, branch: &BranchName) -> Result<(), GitError>;

    async fn delete_remote_branch(&self, branch: &BranchName) -> Result<(), GitError>;

    /// Review title and body from the commits between `base` and the head.
    async fn review_text(&self, branch: &BranchName, base: &Oid) -> Result<ReviewText, GitError>;

    /// Every tracked branch with its record and local head.
    async fn tracked_branches(&self) -> Result<BTreeMap<BranchName, TrackedBranch>, GitError>;

    /// Create or replace a branch's record.
    async fn save_record(&self, branch: &BranchName, record: &BranchRecord)
        -> Result<(), GitError>;

    /// Delete a branch's record. Missing records are not an error.
    async fn remove_record(&self, branch: &BranchName) -> Result<(), GitError>;
}

/// Settings for [`GitGateway`].
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub remote: String,
    /// Trunk name written into records whose parent is trunk
    pub trunk: BranchName,
    /// Forge name written into review links
    pub forge: String,
    /// Run pre-push hooks
    pub verify: bool,
    pub timeout: Duration,
    /// Echo git commands to stderr
    pub echo: bool,
}

/// Gateway over a real repository.
///
/// `git2::Repository` is not `Sync`, so the repository is reopened for each
/// call instead of being shared.
#[derive(Debug, Clone)]
pub struct GitGateway {
    work_dir: PathBuf,
    settings: GatewaySettings,
    runner: GitRunner,
}

impl GitGateway {
    pub fn open(path: &Path, settings: GatewaySettings) -> Result<Self, GitError> {
        let git = Git::open(path)?;
        let work_dir = git.work_dir()?.to_path_buf();
        let runner = GitRunner::new(&work_dir, settings.timeout).with_echo(settings.echo);
        Ok(Self {
            work_dir,
            settings,
            runner,
        })
    }

    fn git(&self) -> Result<Git, GitError> {
        Git::open(&self.work_dir)
    }

    pub fn remote(&self) -> &str {
        &self.settings.remote
    }

    fn push_args<'a>(&'a self, mut args: Vec<&'a str>) -> Vec<&'a str> {
        if !self.settings.verify {
            args.insert(1, "--no-verify");
        }
        args
    }

    /// Remote-tracking head of trunk as of the last fetch.
    fn fetched_trunk(&self, git: &Git, trunk: &BranchName) -> Result<Oid, GitError> {
        git.remote_branch_head(self.remote(), trunk)?
            .ok_or_else(|| GitError::RefNotFound {
                refname: RefName::for_remote_branch(self.remote(), trunk).to_string(),
            })
    }

    /// Push a branch with `--force`, ignoring what the remote holds.
    pub async fn publish(&self, branch: &BranchName) -> Result<(), GitError> {
        let refspec = format!("{0}:{0}", branch);
        let args = self.push_args(vec!["push", "--force", self.remote(), &refspec]);
        self.runner.run(&args).await?;
        Ok(())
    }

    /// Delete a local branch only if it is merged (`git branch -d`).
    pub async fn delete_merged_branch(&self, branch: &BranchName) -> Result<(), GitError> {
        self.runner.run(&["branch", "-d", branch.as_str()]).await?;
        Ok(())
    }

    fn to_tracked(
        &self,
        git: &Git,
        name: BranchName,
        meta: &BranchMetadataV1,
    ) -> Result<TrackedBranch, GitError> {
        let corrupt = |message: String| GitError::CorruptMetadata {
            branch: name.to_string(),
            message,
        };
        let parent = match &meta.parent {
            ParentInfo::Trunk { .. } => Parent::Trunk,
            ParentInfo::Branch { name: p } => {
                Parent::Branch(BranchName::new(p.as_str()).map_err(|e| corrupt(e.to_string()))?)
            }
        };
        let base = meta.base_oid().map_err(|e| corrupt(e.to_string()))?;
        let mut record = BranchRecord::new(parent, base);
        if let ReviewLink::Linked {
            number,
            url,
            target,
            ..
        } = &meta.review
        {
            record = record.with_review(ReviewRef {
                number: *number,
                url: url.clone(),
                target: target.clone(),
            });
        }
        let head = git.branch_head(&name)?;
        Ok(TrackedBranch::new(name, head, record))
    }

    fn to_metadata(
        &self,
        branch: &BranchName,
        record: &BranchRecord,
        existing: Option<BranchMetadataV1>,
    ) -> BranchMetadataV1 {
        let parent = match &record.parent {
            Parent::Trunk => ParentInfo::trunk(self.settings.trunk.as_str()),
            Parent::Branch(p) => ParentInfo::branch(p.as_str()),
        };
        let forge = match existing.as_ref().map(|m| &m.review) {
            Some(ReviewLink::Linked { forge, .. }) => forge.clone(),
            _ => self.settings.forge.clone(),
        };
        let review = match &record.review {
            Some(r) => ReviewLink::linked(&forge, r.number, &r.url, &r.target),
            None => ReviewLink::None,
        };

        let mut meta = match existing {
            Some(mut meta) => {
                meta.parent = parent;
                meta.base.oid = record.base.to_string();
                meta.touch();
                meta
            }
            None => BranchMetadataV1::new(branch, parent, &record.base),
        };
        meta.review = review;
        meta
    }
}

fn store_error(branch: &BranchName, err: StoreError) -> GitError {
    match err {
        StoreError::Git(e) => e,
        StoreError::Corrupt { source, .. } => GitError::CorruptMetadata {
            branch: branch.to_string(),
            message: source.to_string(),
        },
        StoreError::CasFailed {
            expected, actual, ..
        } => GitError::CasFailed {
            refname: RefName::for_metadata(branch).to_string(),
            expected,
            actual,
        },
        StoreError::NotFound(_) => GitError::RefNotFound {
            refname: RefName::for_metadata(branch).to_string(),
        },
    }
}

#[async_trait]
impl RepoGateway for GitGateway {
    async fn current_branch(&self) -> Result<Option<BranchName>, GitError> {
        self.git()?.current_branch()
    }

    async fn current_head(&self, branch: &BranchName) -> Result<Oid, GitError> {
        self.git()?
            .branch_head(branch)?
            .ok_or_else(|| GitError::RefNotFound {
                refname: RefName::for_branch(branch).to_string(),
            })
    }

    async fn remote_head(&self, branch: &BranchName) -> Result<Option<Oid>, GitError> {
        self.git()?.remote_branch_head(self.remote(), branch)
    }

    async fn fetch_trunk(&self, trunk: &BranchName) -> Result<Oid, GitError> {
        let refspec = format!(
            "+{}:{}",
            RefName::for_branch(trunk),
            RefName::for_remote_branch(self.remote(), trunk)
        );
        self.runner.run(&["fetch", self.remote(), &refspec]).await?;
        self.fetched_trunk(&self.git()?, trunk)
    }

    async fn fast_forward_trunk(&self, trunk: &BranchName) -> Result<bool, GitError> {
        let git = self.git()?;
        let remote_head = self.fetched_trunk(&git, trunk)?;

        let Some(local_head) = git.branch_head(trunk)? else {
            return Ok(false);
        };
        if local_head == remote_head {
            return Ok(false);
        }
        if !git.is_ancestor(&local_head, &remote_head)? {
            tracing::warn!(
                trunk = %trunk,
                "local trunk has diverged from {}; leaving it alone",
                self.remote()
            );
            return Ok(false);
        }

        if git.current_branch()?.as_ref() == Some(trunk) {
            let upstream = format!("{}/{}", self.remote(), trunk);
            self.runner.run_local(&["merge", "--ff-only", &upstream]).await?;
        } else {
            git.update_ref_cas(
                RefName::for_branch(trunk).as_str(),
                &remote_head,
                Some(&local_head),
                &format!("gflow: fast-forward {trunk}"),
            )?;
        }
        tracing::debug!(trunk = %trunk, head = %remote_head.short(7), "fast-forwarded trunk");
        Ok(true)
    }

    async fn ensure_clean(&self) -> Result<(), GitError> {
        self.git()?.ensure_clean()
    }

    async fn rebase(
        &self,
        branch: &BranchName,
        onto: &Oid,
        upstream: &Oid,
    ) -> Result<RebaseOutcome, GitError> {
        let head = self.current_head(branch).await?;
        let upstream = {
            let git = self.git()?;
            if onto == upstream && git.is_ancestor(onto, &head)? {
                return Ok(RebaseOutcome::Done { head });
            }
            // The recorded base is gone from the branch's history (it was
            // rebased by hand); fall back to where it meets the new base.
            if git.is_ancestor(upstream, &head)? {
                upstream.clone()
            } else {
                git.merge_base(onto, &head)?
                    .unwrap_or_else(|| upstream.clone())
            }
        };

        let result = self
            .runner
            .output_local(&[
                "rebase",
                "--onto",
                onto.as_str(),
                upstream.as_str(),
                branch.as_str(),
            ])
            .await;
        let error = match result {
            Ok(out) if out.status.success() => {
                return Ok(RebaseOutcome::Done {
                    head: self.current_head(branch).await?,
                });
            }
            Ok(out) => GitError::CommandFailed {
                command: format!("git rebase --onto {} {} {}", onto, upstream, branch),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            },
            Err(e) => e,
        };

        // Whatever stopped git, a paused rebase has to reach the caller as
        // one so it is either resumed by the user or aborted.
        if self.git()?.state().is_rebase() {
            tracing::info!(branch = %branch, "rebase stopped part way");
            return Ok(RebaseOutcome::Conflict);
        }
        Err(error)
    }

    async fn abort_rebase(&self) -> Result<(), GitError> {
        self.runner.run_local(&["rebase", "--abort"]).await?;
        Ok(())
    }

    async fn force_push(&self, branch: &BranchName) -> Result<(), GitError> {
        let refspec = format!("{0}:{0}", RefName::for_branch(branch));
        let args = self.push_args(vec!["push", "--force-with-lease", self.remote(), &refspec]);
        self.runner.run(&args).await?;
        Ok(())
    }

    async fn checkout(&self, branch: &BranchName) -> Result<(), GitError> {
        self.runner.run(&["checkout", branch.as_str()]).await?;
        Ok(())
    }

    async fn delete_local_branch(&self, branch: &BranchName) -> Result<(), GitError> {
        // Squash and rebase merges are not ancestors of trunk, so `-d` would refuse.
        self.runner.run(&["branch", "-D", branch.as_str()]).await?;
        Ok(())
    }

    async fn delete_remote_branch(&self, branch: &BranchName) -> Result<(), GitError> {
        let args = self.push_args(vec!["push", self.remote(), "--delete", branch.as_str()]);
        self.runner.run(&args).await?;
        Ok(())
    }

    async fn review_text(&self, branch: &BranchName, base: &Oid) -> Result<ReviewText, GitError> {
        let git = self.git()?;
        let head = self.current_head(branch).await?;
        let commits = git.commits_between(base, &head)?;

        Ok(match commits.as_slice() {
            [] => ReviewText {
                title: branch.to_string(),
                body: None,
            },
            [only] => ReviewText {
                title: only.summary.clone(),
                body: only.body().map(str::to_string),
            },
            [first, ..] => ReviewText {
                title: first.summary.clone(),
                body: Some(
                    commits
                        .iter()
                        .map(|c| format!("- {}", c.summary))
                        .collect::<Vec<_>>()
                        .join("\n"),
                ),
            },
        })
    }

    async fn tracked_branches(&self) -> Result<BTreeMap<BranchName, TrackedBranch>, GitError> {
        let git = self.git()?;
        let store = MetadataStore::new(&git);
        let names = store.list().map_err(|e| match e {
            StoreError::Git(e) => e,
            other => GitError::Internal {
                message: other.to_string(),
            },
        })?;

        let mut tracked = BTreeMap::new();
        for name in names {
            let Some(entry) = store.read(&name).map_err(|e| store_error(&name, e))? else {
                continue;
            };
            let branch = self.to_tracked(&git, name.clone(), &entry.metadata)?;
            tracked.insert(name, branch);
        }
        Ok(tracked)
    }

    async fn save_record(
        &self,
        branch: &BranchName,
        record: &BranchRecord,
    ) -> Result<(), GitError> {
        let git = self.git()?;
        let store = MetadataStore::new(&git);
        let existing = store.read(branch).map_err(|e| store_error(branch, e))?;
        let (expected, old) = match existing {
            Some(entry) => (Some(entry.ref_oid), Some(entry.metadata)),
            None => (None, None),
        };
        let meta = self.to_metadata(branch, record, old);
        store
            .write_cas(branch, expected.as_ref(), &meta)
            .map_err(|e| store_error(branch, e))?;
        Ok(())
    }

    async fn remove_record(&self, branch: &BranchName) -> Result<(), GitError> {
        let git = self.git()?;
        let store = MetadataStore::new(&git);
        match store.read(branch) {
            Ok(Some(entry)) => store
                .delete_cas(branch, &entry.ref_oid)
                .map_err(|e| store_error(branch, e)),
            Ok(None) => Ok(()),
            // A corrupt record is removed without reading it.
            Err(StoreError::Corrupt { .. }) => {
                let refname = RefName::for_metadata(branch);
                match git.try_resolve_ref_to_object(refname.as_str())? {
                    Some(oid) => git.delete_ref_cas(refname.as_str(), &oid),
                    None => Ok(()),
                }
            }
            Err(e) => Err(store_error(branch, e)),
        }
    }
}
