//! core::metadata::schema
//!
//! Branch metadata schema (v1).
//!
//! Each tracked branch carries one JSON record. The record is:
//! - Self-describing with `kind` and `schema_version`
//! - Tagged rather than boolean (`parent.kind`, `review.state`)
//! - Strictly parsed (unknown fields rejected)
//!
//! The parent link and base commit are what reconstruct the stack; the
//! review link is what `up` and `land` persist between invocations.
//!
//! # Example
//!
//! ```
//! use gflow::core::metadata::schema::{parse_metadata, BranchMetadataV1, ParentInfo};
//! use gflow::core::types::{BranchName, Oid};
//!
//! let branch = BranchName::new("part-2").unwrap();
//! let base = Oid::new("abc123def4567890abc123def4567890abc12345").unwrap();
//! let meta = BranchMetadataV1::new(&branch, ParentInfo::branch("part-1"), &base);
//!
//! let json = meta.to_canonical_json().unwrap();
//! let parsed = parse_metadata(&json).unwrap();
//! assert_eq!(parsed.parent.name(), "part-1");
//! assert!(!parsed.review.is_linked());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::{BranchName, Oid, TypeError, UtcTimestamp};

/// The kind identifier for branch metadata.
pub const METADATA_KIND: &str = "gflow.branch-metadata";

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Errors from metadata operations.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("failed to parse metadata: {0}")]
    ParseError(String),

    #[error("invalid kind '{found}', expected '{}'", METADATA_KIND)]
    InvalidKind { found: String },

    #[error("unsupported schema version {0}, supported: {SCHEMA_VERSION}")]
    UnsupportedVersion(u32),

    #[error("type validation failed: {0}")]
    TypeError(#[from] TypeError),
}

/// Kind and version, read before the full record.
#[derive(Debug, Deserialize)]
struct MetadataEnvelope {
    kind: String,
    schema_version: u32,
}

/// Parse metadata JSON, checking kind and version before the full schema.
///
/// # Errors
///
/// Returns an error if the JSON is malformed, the kind or version is not
/// recognized, or any name or object id inside is invalid.
pub fn parse_metadata(json: &str) -> Result<BranchMetadataV1, MetadataError> {
    let envelope: MetadataEnvelope =
        serde_json::from_str(json).map_err(|e| MetadataError::ParseError(e.to_string()))?;

    if envelope.kind != METADATA_KIND {
        return Err(MetadataError::InvalidKind {
            found: envelope.kind,
        });
    }

    match envelope.schema_version {
        1 => {
            let meta: BranchMetadataV1 =
                serde_json::from_str(json).map_err(|e| MetadataError::ParseError(e.to_string()))?;
            meta.validate()?;
            Ok(meta)
        }
        v => Err(MetadataError::UnsupportedVersion(v)),
    }
}

/// Branch metadata (v1).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BranchMetadataV1 {
    /// Always [`METADATA_KIND`]
    pub kind: String,

    /// Always [`SCHEMA_VERSION`]
    pub schema_version: u32,

    /// The branch this record describes
    pub branch: BranchInfo,

    /// Where the branch sits in its stack
    pub parent: ParentInfo,

    /// Parent head at the last successful sync
    pub base: BaseInfo,

    /// Review request linked to this branch
    pub review: ReviewLink,

    pub timestamps: Timestamps,
}

impl BranchMetadataV1 {
    /// Create a fresh record with no linked review.
    pub fn new(branch: &BranchName, parent: ParentInfo, base: &Oid) -> Self {
        let now = UtcTimestamp::now();
        Self {
            kind: METADATA_KIND.to_string(),
            schema_version: SCHEMA_VERSION,
            branch: BranchInfo {
                name: branch.to_string(),
            },
            parent,
            base: BaseInfo {
                oid: base.to_string(),
            },
            review: ReviewLink::None,
            timestamps: Timestamps {
                created_at: now.clone(),
                updated_at: now,
            },
        }
    }

    /// Check kind, version, and every embedded name and object id.
    pub fn validate(&self) -> Result<(), MetadataError> {
        if self.kind != METADATA_KIND {
            return Err(MetadataError::InvalidKind {
                found: self.kind.clone(),
            });
        }
        if self.schema_version != SCHEMA_VERSION {
            return Err(MetadataError::UnsupportedVersion(self.schema_version));
        }
        BranchName::new(&self.branch.name)?;
        BranchName::new(self.parent.name())?;
        Oid::new(&self.base.oid)?;
        if let ReviewLink::Linked { target, .. } = &self.review {
            BranchName::new(target)?;
        }
        Ok(())
    }

    /// The validated base commit.
    pub fn base_oid(&self) -> Result<Oid, MetadataError> {
        Ok(Oid::new(&self.base.oid)?)
    }

    /// Update the `updated_at` timestamp to now.
    pub fn touch(&mut self) {
        self.timestamps.updated_at = UtcTimestamp::now();
    }

    /// Serialize to compact JSON.
    pub fn to_canonical_json(&self) -> Result<String, MetadataError> {
        serde_json::to_string(self).map_err(|e| MetadataError::ParseError(e.to_string()))
    }
}

/// Branch identification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BranchInfo {
    pub name: String,
}

/// Parent of a tracked branch: trunk, or another tracked branch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum ParentInfo {
    Branch { name: String },
    Trunk { name: String },
}

impl ParentInfo {
    /// A branch parent.
    pub fn branch(name: impl Into<String>) -> Self {
        ParentInfo::Branch { name: name.into() }
    }

    /// A trunk parent.
    pub fn trunk(name: impl Into<String>) -> Self {
        ParentInfo::Trunk { name: name.into() }
    }

    pub fn name(&self) -> &str {
        match self {
            ParentInfo::Branch { name } | ParentInfo::Trunk { name } => name,
        }
    }

    pub fn is_trunk(&self) -> bool {
        matches!(self, ParentInfo::Trunk { .. })
    }
}

/// Base commit information.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BaseInfo {
    pub oid: String,
}

/// Review request linkage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case", deny_unknown_fields)]
pub enum ReviewLink {
    /// No review opened yet
    None,
    /// A review request exists on the host
    Linked {
        /// Host name (e.g., "github")
        forge: String,
        /// Review request number
        number: u64,
        /// Web URL
        url: String,
        /// Target branch the review was last pointed at
        target: String,
    },
}

impl ReviewLink {
    pub fn linked(forge: &str, number: u64, url: &str, target: &str) -> Self {
        ReviewLink::Linked {
            forge: forge.to_string(),
            number,
            url: url.to_string(),
            target: target.to_string(),
        }
    }

    pub fn is_linked(&self) -> bool {
        matches!(self, ReviewLink::Linked { .. })
    }

    pub fn number(&self) -> Option<u64> {
        match self {
            ReviewLink::Linked { number, .. } => Some(*number),
            ReviewLink::None => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Timestamps {
    pub created_at: UtcTimestamp,
    pub updated_at: UtcTimestamp,
}
