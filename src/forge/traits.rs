//! forge::traits
//!
//! Forge trait definition for interacting with the review host.
//!
//! # Design
//!
//! The `Forge` trait is async because every operation is network I/O. It
//! carries exactly the review operations the engines need: open or update a
//! review request, read its status, merge it, and close it.
//!
//! Host adapters are invoked only after local preconditions hold, and a
//! failure never compromises local repository state.
//!
//! # Example
//!
//! ```ignore
//! use gflow::forge::{Forge, ReviewTarget, ReviewStatus, MergeMethod};
//!
//! async fn land_one(forge: &dyn Forge) -> Result<(), ForgeError> {
//!     let review = forge.create_or_update(ReviewTarget::new("part-1", "main", "Part 1")).await?;
//!     if forge.status(review.number).await? == ReviewStatus::Approved {
//!         forge.merge(review.number, MergeMethod::Squash).await?;
//!     }
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use thiserror::Error;

/// Errors from forge operations.
#[derive(Debug, Clone, Error)]
pub enum ForgeError {
    /// No token was found in the environment.
    #[error("authentication required")]
    AuthRequired,

    /// Authentication failed (invalid token, expired, insufficient permissions).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited")]
    RateLimited,

    /// API returned an error.
    #[error("API error: {status} - {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    #[error("network error: {0}")]
    NetworkError(String),

    /// The request did not complete within the configured timeout.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The host refused to merge (conflict, failing checks, protected branch).
    #[error("merge rejected by host: {0}")]
    MergeRejected(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),
}

impl ForgeError {
    /// Whether retrying the same call later may succeed.
    ///
    /// Network failures, timeouts, rate limiting and 5xx responses are
    /// transient. Everything else needs a human.
    pub fn is_transient(&self) -> bool {
        match self {
            ForgeError::NetworkError(_) | ForgeError::Timeout(_) | ForgeError::RateLimited => true,
            ForgeError::ApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// What a review request for a branch should look like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewTarget {
    /// Branch carrying the changes
    pub head: String,
    /// Branch the review targets (the parent, or trunk for the root)
    pub base: String,
    /// Title used only when the review is created
    pub title: String,
    /// Body used only when the review is created
    pub body: Option<String>,
    /// Open new reviews as drafts
    pub draft: bool,
    /// Review already linked to the branch, if any
    pub existing: Option<u64>,
}

impl ReviewTarget {
    pub fn new(head: impl Into<String>, base: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            head: head.into(),
            base: base.into(),
            title: title.into(),
            body: None,
            draft: false,
            existing: None,
        }
    }

    pub fn with_body(mut self, body: Option<String>) -> Self {
        self.body = body;
        self
    }

    pub fn with_draft(mut self, draft: bool) -> Self {
        self.draft = draft;
        self
    }

    pub fn with_existing(mut self, number: Option<u64>) -> Self {
        self.existing = number;
        self
    }
}

/// A review request as the host reports it after create/update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRequest {
    pub number: u64,
    /// Web URL for viewing
    pub url: String,
    pub head: String,
    /// Target branch
    pub base: String,
}

/// Review gating status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReviewStatus {
    /// Open and not (yet) approved
    Open,
    /// Open with an approving review and no outstanding change requests
    Approved,
    Merged,
    /// Closed without merging
    Closed,
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReviewStatus::Open => write!(f, "open"),
            ReviewStatus::Approved => write!(f, "approved"),
            ReviewStatus::Merged => write!(f, "merged"),
            ReviewStatus::Closed => write!(f, "closed"),
        }
    }
}

/// Merge method for merging a review request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeMethod {
    /// Create a merge commit
    Merge,
    /// Squash all commits and merge
    #[default]
    Squash,
    /// Rebase commits onto base branch
    Rebase,
}

impl MergeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeMethod::Merge => "merge",
            MergeMethod::Squash => "squash",
            MergeMethod::Rebase => "rebase",
        }
    }
}

impl std::fmt::Display for MergeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MergeMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merge" => Ok(MergeMethod::Merge),
            "squash" => Ok(MergeMethod::Squash),
            "rebase" => Ok(MergeMethod::Rebase),
            other => Err(format!("unknown merge method '{other}'")),
        }
    }
}

/// The Forge trait for interacting with the review host.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so read-only status calls can be
/// fanned out across tasks.
///
/// # Error Handling
///
/// Callers classify failures with [`ForgeError::is_transient`]; transient
/// failures are retried with backoff, everything else is surfaced.
#[async_trait]
pub trait Forge: Send + Sync {
    /// Get the forge name (e.g., "github").
    fn name(&self) -> &'static str;

    /// Open a review request for `target.head`, or point the existing one at
    /// `target.base`.
    ///
    /// Idempotent: calling twice with the same target leaves one review
    /// targeting `target.base`. Title and body are only used on creation.
    async fn create_or_update(&self, target: ReviewTarget) -> Result<ReviewRequest, ForgeError>;

    /// Current gating status of a review request.
    async fn status(&self, number: u64) -> Result<ReviewStatus, ForgeError>;

    /// Merge a review request into its target.
    ///
    /// # Errors
    ///
    /// - `MergeRejected` when the host refuses (conflicts, failing checks)
    /// - transient errors as classified by [`ForgeError::is_transient`]
    async fn merge(&self, number: u64, method: MergeMethod) -> Result<(), ForgeError>;

    /// Close a review request without merging.
    async fn close(&self, number: u64) -> Result<(), ForgeError>;
}
