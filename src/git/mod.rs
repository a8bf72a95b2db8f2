//! git
//!
//! Everything gflow does to a repository.
//!
//! # Architecture
//!
//! - [`Git`] wraps `git2` for reads, ancestry queries and compare-and-swap
//!   ref updates. No other module imports `git2`.
//! - [`GitRunner`] shells out to the git binary for history rewrites and
//!   network operations, so hooks and credential helpers behave as usual.
//! - [`RepoGateway`] is the trait the engines consume; [`GitGateway`]
//!   combines the two above, [`mock::MockRepo`] is the in-memory stand-in.
//!
//! # Invariants
//!
//! - Metadata ref updates use CAS semantics
//! - A failed rebase is either reported as a paused conflict or as an error,
//!   never silently left half-applied
//!
//! # Example
//!
//! ```ignore
//! use gflow::git::Git;
//! use std::path::Path;
//!
//! let git = Git::open(Path::new("."))?;
//! let oid = git.resolve_ref("refs/heads/main")?;
//! ```

mod gateway;
mod interface;
pub mod mock;
mod runner;

pub use gateway::{GatewaySettings, GitGateway, RebaseOutcome, RepoGateway, ReviewText};
pub use interface::{CommitInfo, Git, GitError, GitState, RefEntry, WorktreeStatus};
pub use runner::GitRunner;
