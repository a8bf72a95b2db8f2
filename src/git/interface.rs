//! git::interface
//!
//! Repository reads and ref writes through `git2`.
//!
//! # Architecture
//!
//! The `Git` struct is the only place `git2` is used. It answers questions
//! about the repository (refs, ancestry, commit text, worktree state) and
//! performs compare-and-swap ref updates for the tool's metadata. Anything
//! that rewrites history or talks to a remote goes through
//! [`GitRunner`](super::GitRunner) and the git binary instead.
//!
//! # Error Handling
//!
//! Git errors are categorized into typed variants:
//! - [`GitError::NotARepo`]: Not inside a Git repository
//! - [`GitError::RefNotFound`]: Requested ref does not exist
//! - [`GitError::CasFailed`]: Compare-and-swap precondition failed
//! - [`GitError::OperationInProgress`]: Rebase/merge/cherry-pick in progress
//! - [`GitError::DirtyWorktree`]: Working tree has uncommitted changes
//! - [`GitError::CommandFailed`]: The git binary exited non-zero
//!
//! # Example
//!
//! ```ignore
//! use gflow::git::Git;
//! use std::path::Path;
//!
//! let git = Git::open(Path::new("."))?;
//! let oid = git.resolve_ref("refs/heads/main")?;
//! println!("main is at {}", oid.short(7));
//! ```

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::types::{BranchName, Oid, RefName, TypeError};

/// Errors from Git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// Not inside a Git repository.
    #[error("not a git repository: {path}")]
    NotARepo {
        /// The path that was searched
        path: PathBuf,
    },

    /// Repository is bare (no working directory).
    #[error("bare repository not supported")]
    BareRepo,

    /// Requested ref does not exist.
    #[error("ref not found: {refname}")]
    RefNotFound {
        /// The ref that was not found
        refname: String,
    },

    /// Compare-and-swap precondition failed.
    ///
    /// The ref moved between the read and the write.
    #[error("CAS failed for {refname}: expected {expected}, found {actual}")]
    CasFailed {
        refname: String,
        expected: String,
        actual: String,
    },

    /// Git operation in progress (rebase, merge, etc.).
    #[error("{operation} in progress")]
    OperationInProgress {
        /// The type of operation in progress
        operation: GitState,
    },

    /// Working tree has uncommitted changes.
    #[error("working tree is dirty: {details}")]
    DirtyWorktree {
        /// Description of what's dirty
        details: String,
    },

    /// Object not found in repository.
    #[error("object not found: {oid}")]
    ObjectNotFound { oid: String },

    /// Invalid object id format.
    #[error("invalid object id: {oid}")]
    InvalidOid { oid: String },

    /// Invalid ref name format.
    #[error("invalid ref name: {message}")]
    InvalidRefName { message: String },

    /// A tool record exists but cannot be parsed.
    #[error("corrupt metadata for '{branch}': {message}")]
    CorruptMetadata { branch: String, message: String },

    /// The git binary exited with a non-zero status.
    #[error("git command failed: {command}\nstderr: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// The git binary did not finish within the configured timeout.
    #[error("git command timed out after {secs}s: {command}")]
    Timeout { command: String, secs: u64 },

    /// Spawning the git binary failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Permission or filesystem error.
    #[error("repository access error: {message}")]
    AccessError { message: String },

    /// Internal git2 error.
    #[error("git error: {message}")]
    Internal { message: String },
}

impl GitError {
    /// Create a GitError from a git2::Error with richer context.
    fn from_git2(err: git2::Error, context: &str) -> Self {
        match err.code() {
            git2::ErrorCode::NotFound => {
                if context.starts_with("refs/") || context.contains("ref") {
                    GitError::RefNotFound {
                        refname: context.to_string(),
                    }
                } else {
                    GitError::ObjectNotFound {
                        oid: context.to_string(),
                    }
                }
            }
            git2::ErrorCode::InvalidSpec => GitError::InvalidOid {
                oid: context.to_string(),
            },
            git2::ErrorCode::Locked => GitError::AccessError {
                message: format!("repository is locked: {}", err.message()),
            },
            _ => GitError::Internal {
                message: format!("{}: {}", context, err.message()),
            },
        }
    }

    fn internal(err: git2::Error) -> Self {
        GitError::Internal {
            message: err.message().to_string(),
        }
    }
}

impl From<git2::Error> for GitError {
    fn from(err: git2::Error) -> Self {
        match err.code() {
            git2::ErrorCode::NotFound => GitError::RefNotFound {
                refname: err.message().to_string(),
            },
            git2::ErrorCode::InvalidSpec => GitError::InvalidOid {
                oid: err.message().to_string(),
            },
            _ => GitError::internal(err),
        }
    }
}

impl From<TypeError> for GitError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::InvalidOid(msg) => GitError::InvalidOid { oid: msg },
            TypeError::InvalidRefName(msg) => GitError::InvalidRefName { message: msg },
            TypeError::InvalidBranchName(msg) => GitError::InvalidRefName { message: msg },
        }
    }
}

/// State of in-progress Git operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitState {
    /// No operation in progress.
    Clean,

    /// Rebase in progress.
    Rebase {
        /// Current step in the rebase (1-indexed), if available.
        current: Option<usize>,
        /// Total steps in the rebase, if available.
        total: Option<usize>,
    },

    Merge,
    CherryPick,
    Revert,
    Bisect,
    ApplyMailbox,
}

impl GitState {
    /// Check if any operation is in progress.
    ///
    /// # Example
    ///
    /// ```
    /// use gflow::git::GitState;
    ///
    /// assert!(!GitState::Clean.is_in_progress());
    /// assert!(GitState::Merge.is_in_progress());
    /// ```
    pub fn is_in_progress(&self) -> bool {
        !matches!(self, GitState::Clean)
    }

    /// Check if a rebase is paused.
    pub fn is_rebase(&self) -> bool {
        matches!(self, GitState::Rebase { .. })
    }

    pub fn description(&self) -> &'static str {
        match self {
            GitState::Clean => "clean",
            GitState::Rebase { .. } => "rebase",
            GitState::Merge => "merge",
            GitState::CherryPick => "cherry-pick",
            GitState::Revert => "revert",
            GitState::Bisect => "bisect",
            GitState::ApplyMailbox => "apply-mailbox",
        }
    }
}

impl std::fmt::Display for GitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GitState::Rebase {
                current: Some(c),
                total: Some(t),
            } => write!(f, "rebase ({}/{})", c, t),
            _ => write!(f, "{}", self.description()),
        }
    }
}

/// A ref with its name and target OID.
#[derive(Debug, Clone)]
pub struct RefEntry {
    /// The full ref name
    pub name: RefName,
    /// The OID the ref points to
    pub oid: Oid,
}

/// Summary of working tree status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorktreeStatus {
    /// Number of staged changes
    pub staged: usize,
    /// Number of unstaged changes to tracked files
    pub unstaged: usize,
    /// Number of untracked files (if requested)
    pub untracked: usize,
    /// Whether there are unresolved conflicts
    pub has_conflicts: bool,
}

impl WorktreeStatus {
    /// Check if the worktree is clean. Untracked files do not count.
    pub fn is_clean(&self) -> bool {
        self.staged == 0 && self.unstaged == 0 && !self.has_conflicts
    }

    /// Short description for error messages, e.g. "2 staged, 1 unstaged".
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if self.staged > 0 {
            parts.push(format!("{} staged", self.staged));
        }
        if self.unstaged > 0 {
            parts.push(format!("{} unstaged", self.unstaged));
        }
        if self.has_conflicts {
            parts.push("unresolved conflicts".to_string());
        }
        if parts.is_empty() {
            "clean".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Information about a commit.
#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub oid: Oid,
    /// First line of the commit message
    pub summary: String,
    /// Full commit message
    pub message: String,
}

impl CommitInfo {
    /// The message with the summary line and following blank lines removed.
    pub fn body(&self) -> Option<&str> {
        let (_, rest) = self.message.split_once('\n')?;
        let rest = rest.trim();
        if rest.is_empty() {
            None
        } else {
            Some(rest)
        }
    }
}

/// Repository access through libgit2.
///
/// # CAS Semantics
///
/// Ref mutations use compare-and-swap: an update only succeeds if the ref's
/// current value matches the expected value.
///
/// # Example
///
/// ```ignore
/// use gflow::git::Git;
/// use std::path::Path;
///
/// let git = Git::open(Path::new("."))?;
/// let oid = git.resolve_ref("refs/heads/main")?;
///
/// git.update_ref_cas(
///     "refs/gflow-metadata/feature",
///     &blob_oid,
///     None,
///     "gflow: track feature",
/// )?;
/// ```
pub struct Git {
    repo: git2::Repository,
}

impl std::fmt::Debug for Git {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Git")
            .field("path", &self.repo.path())
            .finish()
    }
}

impl Git {
    // =========================================================================
    // Repository Opening and Info
    // =========================================================================

    /// Open the repository containing `path`.
    ///
    /// # Errors
    ///
    /// - [`GitError::NotARepo`] if no repository is found
    /// - [`GitError::BareRepo`] if the repository has no working directory
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let repo = git2::Repository::discover(path).map_err(|_| GitError::NotARepo {
            path: path.to_path_buf(),
        })?;

        if repo.is_bare() {
            return Err(GitError::BareRepo);
        }

        Ok(Self { repo })
    }

    pub fn git_dir(&self) -> &Path {
        self.repo.path()
    }

    pub fn work_dir(&self) -> Result<&Path, GitError> {
        self.repo.workdir().ok_or(GitError::BareRepo)
    }

    // =========================================================================
    // State Detection
    // =========================================================================

    /// Get the current Git state (rebase, merge, etc.).
    pub fn state(&self) -> GitState {
        match self.repo.state() {
            git2::RepositoryState::Clean => GitState::Clean,
            git2::RepositoryState::Rebase
            | git2::RepositoryState::RebaseInteractive
            | git2::RepositoryState::RebaseMerge => {
                let (current, total) = self.read_rebase_progress();
                GitState::Rebase { current, total }
            }
            git2::RepositoryState::Merge => GitState::Merge,
            git2::RepositoryState::CherryPick | git2::RepositoryState::CherryPickSequence => {
                GitState::CherryPick
            }
            git2::RepositoryState::Revert | git2::RepositoryState::RevertSequence => {
                GitState::Revert
            }
            git2::RepositoryState::Bisect => GitState::Bisect,
            git2::RepositoryState::ApplyMailbox | git2::RepositoryState::ApplyMailboxOrRebase => {
                GitState::ApplyMailbox
            }
        }
    }

    /// Read rebase progress from .git/rebase-merge or .git/rebase-apply.
    fn read_rebase_progress(&self) -> (Option<usize>, Option<usize>) {
        let read = |path: PathBuf| -> Option<usize> {
            std::fs::read_to_string(path)
                .ok()
                .and_then(|s| s.trim().parse().ok())
        };

        let rebase_merge = self.git_dir().join("rebase-merge");
        if rebase_merge.exists() {
            return (
                read(rebase_merge.join("msgnum")),
                read(rebase_merge.join("end")),
            );
        }

        let rebase_apply = self.git_dir().join("rebase-apply");
        if rebase_apply.exists() {
            return (
                read(rebase_apply.join("next")),
                read(rebase_apply.join("last")),
            );
        }

        (None, None)
    }

    // =========================================================================
    // Working Tree Status
    // =========================================================================

    /// Get working tree status summary.
    pub fn worktree_status(&self, include_untracked: bool) -> Result<WorktreeStatus, GitError> {
        let mut opts = git2::StatusOptions::new();
        opts.include_untracked(include_untracked)
            .include_ignored(false);

        let statuses = self
            .repo
            .statuses(Some(&mut opts))
            .map_err(GitError::internal)?;

        let mut result = WorktreeStatus::default();

        for entry in statuses.iter() {
            let status = entry.status();

            if status.is_conflicted() {
                result.has_conflicts = true;
            }

            if status.is_index_new()
                || status.is_index_modified()
                || status.is_index_deleted()
                || status.is_index_renamed()
                || status.is_index_typechange()
            {
                result.staged += 1;
            }

            if status.is_wt_modified()
                || status.is_wt_deleted()
                || status.is_wt_renamed()
                || status.is_wt_typechange()
            {
                result.unstaged += 1;
            }

            if status.is_wt_new() {
                result.untracked += 1;
            }
        }

        Ok(result)
    }

    /// Fail unless no operation is in progress and the tree is clean.
    ///
    /// Untracked files are allowed.
    pub fn ensure_clean(&self) -> Result<(), GitError> {
        let state = self.state();
        if state.is_in_progress() {
            return Err(GitError::OperationInProgress { operation: state });
        }
        let status = self.worktree_status(false)?;
        if !status.is_clean() {
            return Err(GitError::DirtyWorktree {
                details: status.describe(),
            });
        }
        Ok(())
    }

    // =========================================================================
    // Ref Resolution
    // =========================================================================

    /// Resolve a ref to the commit it points at.
    ///
    /// # Errors
    ///
    /// - [`GitError::RefNotFound`] if the ref doesn't exist
    pub fn resolve_ref(&self, refname: &str) -> Result<Oid, GitError> {
        let reference = self
            .repo
            .find_reference(refname)
            .map_err(|e| GitError::from_git2(e, refname))?;

        let oid = reference
            .peel_to_commit()
            .map_err(|e| GitError::from_git2(e, refname))?
            .id();

        Oid::new(oid.to_string()).map_err(|e| e.into())
    }

    /// Resolve a ref, returning None if it doesn't exist.
    pub fn try_resolve_ref(&self, refname: &str) -> Result<Option<Oid>, GitError> {
        match self.resolve_ref(refname) {
            Ok(oid) => Ok(Some(oid)),
            Err(GitError::RefNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Head of a local branch, if it exists.
    pub fn branch_head(&self, branch: &BranchName) -> Result<Option<Oid>, GitError> {
        self.try_resolve_ref(RefName::for_branch(branch).as_str())
    }

    /// Head of `<remote>/<branch>` as last fetched or pushed.
    pub fn remote_branch_head(
        &self,
        remote: &str,
        branch: &BranchName,
    ) -> Result<Option<Oid>, GitError> {
        self.try_resolve_ref(RefName::for_remote_branch(remote, branch).as_str())
    }

    /// Get the current branch name, if on a branch.
    ///
    /// Returns `None` if HEAD is detached or unborn.
    pub fn current_branch(&self) -> Result<Option<BranchName>, GitError> {
        let head = match self.repo.head() {
            Ok(h) => h,
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if head.is_branch() {
            if let Some(name) = head.shorthand() {
                return Ok(Some(BranchName::new(name)?));
            }
        }

        Ok(None)
    }

    /// Pick the trunk when none is configured: the remote's HEAD, then
    /// `main`, then `master`.
    pub fn detect_trunk(&self, remote: &str) -> Result<Option<BranchName>, GitError> {
        let remote_head = format!("refs/remotes/{}/HEAD", remote);
        if let Ok(reference) = self.repo.find_reference(&remote_head) {
            if let Some(target) = reference.symbolic_target() {
                let prefix = format!("refs/remotes/{}/", remote);
                if let Some(name) = target.strip_prefix(&prefix) {
                    if let Ok(branch) = BranchName::new(name) {
                        return Ok(Some(branch));
                    }
                }
            }
        }

        for candidate in ["main", "master"] {
            let branch = BranchName::new(candidate)?;
            if self.branch_head(&branch)?.is_some() {
                return Ok(Some(branch));
            }
        }
        Ok(None)
    }

    // =========================================================================
    // Ref Enumeration
    // =========================================================================

    /// List all refs matching a prefix.
    ///
    /// Refs that point at blobs (metadata) are returned with the blob id.
    pub fn list_refs_by_prefix(&self, prefix: &str) -> Result<Vec<RefEntry>, GitError> {
        let pattern = format!("{}*", prefix);
        let refs = self
            .repo
            .references_glob(&pattern)
            .map_err(GitError::internal)?;

        let mut entries = Vec::new();
        for reference in refs {
            let reference = reference.map_err(GitError::internal)?;

            let Some(name) = reference.name() else {
                continue;
            };
            let Ok(ref_name) = RefName::new(name) else {
                continue;
            };

            let oid = match reference.peel_to_commit() {
                Ok(commit) => commit.id(),
                Err(_) => match reference.target() {
                    Some(oid) => oid,
                    None => continue,
                },
            };

            let Ok(oid) = Oid::new(oid.to_string()) else {
                continue;
            };

            entries.push(RefEntry {
                name: ref_name,
                oid,
            });
        }

        Ok(entries)
    }

    // =========================================================================
    // CAS Ref Operations
    // =========================================================================

    /// Update a ref with compare-and-swap semantics.
    ///
    /// If `expected_old` is `None`, the ref must not exist.
    ///
    /// # Errors
    ///
    /// - [`GitError::CasFailed`] if the current value doesn't match expected
    pub fn update_ref_cas(
        &self,
        refname: &str,
        new_oid: &Oid,
        expected_old: Option<&Oid>,
        message: &str,
    ) -> Result<(), GitError> {
        let current = self.try_resolve_ref_raw(refname)?;

        let mismatch = |expected: String, actual: String| GitError::CasFailed {
            refname: refname.to_string(),
            expected,
            actual,
        };
        match (expected_old, current) {
            (Some(expected), Some(actual)) if expected.as_str() != actual => {
                return Err(mismatch(expected.to_string(), actual));
            }
            (Some(expected), None) => {
                return Err(mismatch(expected.to_string(), "<none>".to_string()));
            }
            (None, Some(actual)) => {
                return Err(mismatch("<none>".to_string(), actual));
            }
            _ => {}
        }

        let oid = git2::Oid::from_str(new_oid.as_str())
            .map_err(|e| GitError::from_git2(e, new_oid.as_str()))?;

        self.repo
            .reference(refname, oid, true, message)
            .map_err(|e| GitError::from_git2(e, refname))?;

        Ok(())
    }

    /// Delete a ref with compare-and-swap semantics.
    ///
    /// # Errors
    ///
    /// - [`GitError::CasFailed`] if the current value doesn't match expected
    /// - [`GitError::RefNotFound`] if the ref doesn't exist
    pub fn delete_ref_cas(&self, refname: &str, expected_old: &Oid) -> Result<(), GitError> {
        match self.try_resolve_ref_raw(refname)? {
            None => {
                return Err(GitError::RefNotFound {
                    refname: refname.to_string(),
                });
            }
            Some(actual) if actual != expected_old.as_str() => {
                return Err(GitError::CasFailed {
                    refname: refname.to_string(),
                    expected: expected_old.to_string(),
                    actual,
                });
            }
            _ => {}
        }

        let mut reference = self
            .repo
            .find_reference(refname)
            .map_err(|e| GitError::from_git2(e, refname))?;

        reference
            .delete()
            .map_err(|e| GitError::from_git2(e, refname))?;

        Ok(())
    }

    /// Resolve a ref to its direct target without peeling to a commit.
    ///
    /// Metadata refs point at blobs, so they must be read this way.
    pub fn try_resolve_ref_to_object(&self, refname: &str) -> Result<Option<Oid>, GitError> {
        match self.try_resolve_ref_raw(refname)? {
            Some(raw) => Ok(Some(Oid::new(raw)?)),
            None => Ok(None),
        }
    }

    fn try_resolve_ref_raw(&self, refname: &str) -> Result<Option<String>, GitError> {
        match self.repo.find_reference(refname) {
            Ok(reference) => {
                let resolved = reference.resolve().unwrap_or(reference);
                let oid = resolved.target().ok_or_else(|| GitError::Internal {
                    message: format!("ref {} has no target", refname),
                })?;
                Ok(Some(oid.to_string()))
            }
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::from_git2(e, refname)),
        }
    }

    // =========================================================================
    // Ancestry Queries
    // =========================================================================

    /// Find the merge base of two commits, if they share history.
    pub fn merge_base(&self, oid1: &Oid, oid2: &Oid) -> Result<Option<Oid>, GitError> {
        let a = to_git2(oid1)?;
        let b = to_git2(oid2)?;

        match self.repo.merge_base(a, b) {
            Ok(oid) => Ok(Some(Oid::new(oid.to_string())?)),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::internal(e)),
        }
    }

    /// Check if `ancestor` is an ancestor of `descendant`.
    ///
    /// A commit is its own ancestor.
    pub fn is_ancestor(&self, ancestor: &Oid, descendant: &Oid) -> Result<bool, GitError> {
        if ancestor == descendant {
            return Ok(true);
        }

        self.repo
            .graph_descendant_of(to_git2(descendant)?, to_git2(ancestor)?)
            .map_err(GitError::internal)
    }

    /// Commits reachable from `tip` but not from `base`, oldest first.
    pub fn commits_between(&self, base: &Oid, tip: &Oid) -> Result<Vec<CommitInfo>, GitError> {
        let mut revwalk = self.repo.revwalk().map_err(GitError::internal)?;
        revwalk
            .set_sorting(git2::Sort::TOPOLOGICAL | git2::Sort::REVERSE)
            .map_err(GitError::internal)?;
        revwalk.push(to_git2(tip)?).map_err(GitError::internal)?;
        revwalk.hide(to_git2(base)?).map_err(GitError::internal)?;

        let mut commits = Vec::new();
        for oid in revwalk {
            let oid = oid.map_err(GitError::internal)?;
            commits.push(self.commit_info(&Oid::new(oid.to_string())?)?);
        }
        Ok(commits)
    }

    // =========================================================================
    // Blob Operations
    // =========================================================================

    /// Write content as a blob and return its OID.
    pub fn write_blob(&self, content: &[u8]) -> Result<Oid, GitError> {
        let oid = self.repo.blob(content).map_err(GitError::internal)?;
        Oid::new(oid.to_string()).map_err(|e| e.into())
    }

    /// Read a blob as UTF-8 text. Invalid bytes are replaced, so a damaged
    /// record surfaces as a parse error rather than here.
    ///
    /// # Errors
    ///
    /// - [`GitError::ObjectNotFound`] if the blob doesn't exist
    pub fn read_blob_as_string(&self, oid: &Oid) -> Result<String, GitError> {
        let blob = self
            .repo
            .find_blob(to_git2(oid)?)
            .map_err(|e| GitError::from_git2(e, oid.as_str()))?;
        Ok(String::from_utf8_lossy(blob.content()).into_owned())
    }

    // =========================================================================
    // Commit Information
    // =========================================================================

    pub fn commit_info(&self, oid: &Oid) -> Result<CommitInfo, GitError> {
        let commit = self
            .repo
            .find_commit(to_git2(oid)?)
            .map_err(|e| GitError::from_git2(e, oid.as_str()))?;

        Ok(CommitInfo {
            oid: oid.clone(),
            summary: commit.summary().unwrap_or("").to_string(),
            message: commit.message().unwrap_or("").to_string(),
        })
    }

    // =========================================================================
    // Remotes
    // =========================================================================

    /// URL of the named remote, if configured.
    pub fn remote_url(&self, name: &str) -> Result<Option<String>, GitError> {
        match self.repo.find_remote(name) {
            Ok(remote) => Ok(remote.url().map(str::to_string)),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(GitError::internal(e)),
        }
    }
}

fn to_git2(oid: &Oid) -> Result<git2::Oid, GitError> {
    git2::Oid::from_str(oid.as_str()).map_err(|e| GitError::from_git2(e, oid.as_str()))
}
