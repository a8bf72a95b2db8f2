//! core::metadata::store
//!
//! Metadata storage in Git refs.
//!
//! Each tracked branch has a ref `refs/gflow-metadata/<branch>` pointing at a
//! blob of JSON. Writes and deletes are compare-and-swap against the blob
//! the caller last read, so a record changed by another process is never
//! silently overwritten.
//!
//! # Example
//!
//! ```ignore
//! let git = Git::open(Path::new("."))?;
//! let store = MetadataStore::new(&git);
//!
//! if let Some(entry) = store.read(&branch)? {
//!     let mut meta = entry.metadata;
//!     meta.touch();
//!     store.write_cas(&branch, Some(&entry.ref_oid), &meta)?;
//! }
//! ```

use thiserror::Error;

use super::schema::{parse_metadata, BranchMetadataV1, MetadataError};
use crate::core::types::{BranchName, Oid, RefName};
use crate::git::{Git, GitError};

/// Errors from metadata storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("metadata not found for branch: {0}")]
    NotFound(String),

    /// The ref moved since it was read.
    #[error("metadata for {branch} changed concurrently: expected {expected}, found {actual}")]
    CasFailed {
        branch: String,
        expected: String,
        actual: String,
    },

    #[error("corrupt metadata for {branch}: {source}")]
    Corrupt {
        branch: String,
        source: MetadataError,
    },

    #[error("git error: {0}")]
    Git(#[from] GitError),
}

/// A record together with the blob id it was read from.
#[derive(Debug, Clone)]
pub struct MetadataEntry {
    /// Blob the ref pointed at; pass to `write_cas`/`delete_cas`.
    pub ref_oid: Oid,
    pub metadata: BranchMetadataV1,
}

/// Metadata store backed by Git refs.
pub struct MetadataStore<'a> {
    git: &'a Git,
}

impl<'a> MetadataStore<'a> {
    pub fn new(git: &'a Git) -> Self {
        Self { git }
    }

    /// Read the record for a branch, `None` if the branch is not tracked.
    pub fn read(&self, branch: &BranchName) -> Result<Option<MetadataEntry>, StoreError> {
        let refname = RefName::for_metadata(branch);

        // Metadata refs point at blobs, so resolve without peeling to a commit.
        let Some(ref_oid) = self.git.try_resolve_ref_to_object(refname.as_str())? else {
            return Ok(None);
        };

        let json = self.git.read_blob_as_string(&ref_oid)?;
        let metadata = parse_metadata(&json).map_err(|source| StoreError::Corrupt {
            branch: branch.to_string(),
            source,
        })?;

        Ok(Some(MetadataEntry { ref_oid, metadata }))
    }

    /// Write a record. `expected_old` is `None` when creating.
    ///
    /// Returns the new blob id.
    pub fn write_cas(
        &self,
        branch: &BranchName,
        expected_old: Option<&Oid>,
        metadata: &BranchMetadataV1,
    ) -> Result<Oid, StoreError> {
        let refname = RefName::for_metadata(branch);
        let json = metadata
            .to_canonical_json()
            .map_err(|source| StoreError::Corrupt {
                branch: branch.to_string(),
                source,
            })?;

        let blob_oid = self.git.write_blob(json.as_bytes())?;
        self.git
            .update_ref_cas(
                refname.as_str(),
                &blob_oid,
                expected_old,
                &format!("gflow: update metadata for {branch}"),
            )
            .map_err(|e| Self::map_cas(branch, e))?;

        Ok(blob_oid)
    }

    /// Delete a record if it still points at `expected_old`.
    pub fn delete_cas(&self, branch: &BranchName, expected_old: &Oid) -> Result<(), StoreError> {
        let refname = RefName::for_metadata(branch);
        self.git
            .delete_ref_cas(refname.as_str(), expected_old)
            .map_err(|e| Self::map_cas(branch, e))
    }

    /// All tracked branches.
    pub fn list(&self) -> Result<Vec<BranchName>, StoreError> {
        let refs = self.git.list_refs_by_prefix(RefName::METADATA_PREFIX)?;
        Ok(refs
            .into_iter()
            .filter_map(|entry| {
                entry
                    .name
                    .strip_prefix(RefName::METADATA_PREFIX)
                    .and_then(|name| BranchName::new(name).ok())
            })
            .collect())
    }

    fn map_cas(branch: &BranchName, err: GitError) -> StoreError {
        match err {
            GitError::CasFailed {
                expected, actual, ..
            } => StoreError::CasFailed {
                branch: branch.to_string(),
                expected,
                actual,
            },
            GitError::RefNotFound { .. } => StoreError::NotFound(branch.to_string()),
            other => StoreError::Git(other),
        }
    }
}
