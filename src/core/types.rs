//! core::types
//!
//! Strong types for the values that flow between the repository, the
//! review host, and the engines.
//!
//! # Types
//!
//! - [`BranchName`] - Validated Git branch name
//! - [`Oid`] - Git object identifier (SHA)
//! - [`RefName`] - Validated Git reference name
//! - [`UtcTimestamp`] - RFC3339 timestamp
//!
//! Every type validates at construction, so a value that exists is a value
//! Git will accept.
//!
//! # Examples
//!
//! ```
//! use gflow::core::types::{BranchName, Oid, RefName};
//!
//! let branch = BranchName::new("stack/part-1").unwrap();
//! let oid = Oid::new("abc123def4567890abc123def4567890abc12345").unwrap();
//! assert_eq!(RefName::for_branch(&branch).as_str(), "refs/heads/stack/part-1");
//! assert_eq!(oid.short(7), "abc123d");
//!
//! assert!(BranchName::new("two..dots").is_err());
//! assert!(Oid::new("xyz").is_err());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    #[error("invalid object id: {0}")]
    InvalidOid(String),

    #[error("invalid ref name: {0}")]
    InvalidRefName(String),
}

/// Characters `git check-ref-format` never allows.
const FORBIDDEN_CHARS: [char; 8] = [' ', '~', '^', ':', '\\', '?', '*', '['];

/// Check the refname rules shared by branch names and full ref names.
///
/// Returns a human readable reason on failure; callers wrap it in the
/// matching [`TypeError`] variant.
fn check_refname(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("cannot be empty".into());
    }
    if name == "@" {
        return Err("cannot be '@'".into());
    }
    if name.starts_with('/') || name.ends_with('/') {
        return Err("cannot start or end with '/'".into());
    }
    for bad in ["..", "@{", "//"] {
        if name.contains(bad) {
            return Err(format!("cannot contain '{bad}'"));
        }
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        return Err(format!("cannot contain '{c}'"));
    }
    if name.chars().any(|c| c.is_ascii_control()) {
        return Err("cannot contain control characters".into());
    }
    for component in name.split('/') {
        if component.starts_with('.') {
            return Err(format!("component '{component}' cannot start with '.'"));
        }
        if component.ends_with(".lock") {
            return Err(format!("component '{component}' cannot end with '.lock'"));
        }
    }
    Ok(())
}

/// A validated Git branch name (the part after `refs/heads/`).
///
/// # Example
///
/// ```
/// use gflow::core::types::BranchName;
///
/// let name = BranchName::new("feature/login").unwrap();
/// assert_eq!(name.as_str(), "feature/login");
///
/// assert!(BranchName::new("").is_err());
/// assert!(BranchName::new("-rf").is_err());
/// assert!(BranchName::new("has space").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// Create a new validated branch name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidBranchName` if the name violates Git's refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        if name.starts_with('-') {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot start with '-'".into(),
            ));
        }
        check_refname(&name)
            .map_err(|reason| TypeError::InvalidBranchName(format!("'{name}' {reason}")))?;
        Ok(Self(name))
    }

    /// Get the branch name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BranchName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<BranchName> for String {
    fn from(name: BranchName) -> Self {
        name.0
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BranchName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A Git object identifier (SHA-1 or SHA-256), normalized to lowercase.
///
/// # Example
///
/// ```
/// use gflow::core::types::Oid;
///
/// let oid = Oid::new("ABC123DEF4567890ABC123DEF4567890ABC12345").unwrap();
/// assert_eq!(oid.as_str(), "abc123def4567890abc123def4567890abc12345");
/// assert!(Oid::zero().is_zero());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Oid(String);

impl Oid {
    /// Create a new validated object id.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidOid` if the string is not a 40 or 64
    /// character hex string.
    pub fn new(oid: impl Into<String>) -> Result<Self, TypeError> {
        let oid = oid.into().to_ascii_lowercase();
        if oid.len() != 40 && oid.len() != 64 {
            return Err(TypeError::InvalidOid(format!(
                "expected 40 or 64 hex characters, got {}",
                oid.len()
            )));
        }
        if !oid.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidOid(format!("'{oid}' is not hexadecimal")));
        }
        Ok(Self(oid))
    }

    /// The null object id (40 zeros).
    pub fn zero() -> Self {
        Self("0".repeat(40))
    }

    /// Check if this is the null object id.
    pub fn is_zero(&self) -> bool {
        self.0.bytes().all(|b| b == b'0')
    }

    /// Abbreviated form: the first `len` characters, or the whole id.
    pub fn short(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }

    /// Get the object id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Oid {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Oid> for String {
    fn from(oid: Oid) -> Self {
        oid.0
    }
}

impl AsRef<str> for Oid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated, fully qualified Git reference name.
///
/// # Example
///
/// ```
/// use gflow::core::types::{BranchName, RefName};
///
/// let branch = BranchName::new("feature/foo").unwrap();
/// assert_eq!(RefName::for_metadata(&branch).as_str(), "refs/gflow-metadata/feature/foo");
/// assert_eq!(
///     RefName::for_remote_branch("origin", &branch).as_str(),
///     "refs/remotes/origin/feature/foo"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RefName(String);

impl RefName {
    /// Namespace holding one metadata blob per tracked branch.
    pub const METADATA_PREFIX: &'static str = "refs/gflow-metadata/";

    /// Create a new validated ref name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidRefName` if the name violates Git's refname rules.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        check_refname(&name)
            .map_err(|reason| TypeError::InvalidRefName(format!("'{name}' {reason}")))?;
        Ok(Self(name))
    }

    /// `refs/heads/<branch>`.
    pub fn for_branch(branch: &BranchName) -> Self {
        Self(format!("refs/heads/{branch}"))
    }

    /// `refs/gflow-metadata/<branch>`.
    pub fn for_metadata(branch: &BranchName) -> Self {
        Self(format!("{}{branch}", Self::METADATA_PREFIX))
    }

    /// `refs/remotes/<remote>/<branch>`.
    ///
    /// Remote names are configuration values and are not validated here.
    pub fn for_remote_branch(remote: &str, branch: &BranchName) -> Self {
        Self(format!("refs/remotes/{remote}/{branch}"))
    }

    /// Strip a prefix from the ref name and return the remainder.
    pub fn strip_prefix(&self, prefix: &str) -> Option<&str> {
        self.0.strip_prefix(prefix)
    }

    /// Get the ref name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RefName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RefName> for String {
    fn from(name: RefName) -> Self {
        name.0
    }
}

impl AsRef<str> for RefName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RefName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A UTC timestamp, serialized as RFC3339.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UtcTimestamp(chrono::DateTime<chrono::Utc>);

impl UtcTimestamp {
    /// The current time.
    pub fn now() -> Self {
        Self(chrono::Utc::now())
    }
}

impl std::fmt::Display for UtcTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod branch_name {
        use super::*;

        #[test]
        fn accepts_common_names() {
            for name in ["main", "feature/login", "user@fix", "v1.2", "a_b-c"] {
                assert!(BranchName::new(name).is_ok(), "{name} should be valid");
            }
        }

        #[test]
        fn rejects_git_invalid_names() {
            for name in [
                "",
                "@",
                "-flag",
                ".hidden",
                "a/.b",
                "x.lock",
                "a/b.lock/c",
                "trailing/",
                "/leading",
                "two..dots",
                "a@{1}",
                "a//b",
                "has space",
                "tilde~1",
                "caret^",
                "colon:",
                "glob*",
                "bracket[",
                "ctl\x07",
            ] {
                assert!(BranchName::new(name).is_err(), "{name:?} should be invalid");
            }
        }

        #[test]
        fn error_names_the_offending_input() {
            let err = BranchName::new("bad..name").unwrap_err();
            assert!(err.to_string().contains("bad..name"));
        }

        #[test]
        fn ordering_is_lexicographic() {
            let a = BranchName::new("a").unwrap();
            let b = BranchName::new("b").unwrap();
            assert!(a < b);
        }

        #[test]
        fn serde_rejects_invalid() {
            let parsed: Result<BranchName, _> = serde_json::from_str("\"no..pe\"");
            assert!(parsed.is_err());
            let ok: BranchName = serde_json::from_str("\"fine\"").unwrap();
            assert_eq!(ok.as_str(), "fine");
        }
    }

    mod oid {
        use super::*;

        #[test]
        fn sha1_and_sha256_lengths() {
            assert!(Oid::new("a".repeat(40)).is_ok());
            assert!(Oid::new("b".repeat(64)).is_ok());
            assert!(Oid::new("c".repeat(41)).is_err());
        }

        #[test]
        fn lowercases() {
            let oid = Oid::new("ABCDEF".repeat(6) + "ABCD").unwrap();
            assert_eq!(oid.as_str(), "abcdef".repeat(6) + "abcd");
        }

        #[test]
        fn rejects_non_hex() {
            assert!(Oid::new("g".repeat(40)).is_err());
        }

        #[test]
        fn zero() {
            assert!(Oid::zero().is_zero());
            assert!(!Oid::new("1".repeat(40)).unwrap().is_zero());
        }

        #[test]
        fn short_is_clamped() {
            let oid = Oid::new("0123456789".repeat(4)).unwrap();
            assert_eq!(oid.short(7), "0123456");
            assert_eq!(oid.short(100).len(), 40);
        }
    }

    mod ref_name {
        use super::*;

        #[test]
        fn constructors() {
            let b = BranchName::new("stack/one").unwrap();
            assert_eq!(RefName::for_branch(&b).as_str(), "refs/heads/stack/one");
            assert_eq!(
                RefName::for_metadata(&b).as_str(),
                "refs/gflow-metadata/stack/one"
            );
            assert_eq!(
                RefName::for_remote_branch("upstream", &b).as_str(),
                "refs/remotes/upstream/stack/one"
            );
        }

        #[test]
        fn strip_prefix() {
            let r = RefName::new("refs/gflow-metadata/x/y").unwrap();
            assert_eq!(r.strip_prefix(RefName::METADATA_PREFIX), Some("x/y"));
            assert_eq!(r.strip_prefix("refs/heads/"), None);
        }

        #[test]
        fn rejects_invalid() {
            assert!(RefName::new("refs/heads/a..b").is_err());
            assert!(RefName::new("refs/heads/").is_err());
        }
    }

    #[test]
    fn timestamp_roundtrip() {
        let ts = UtcTimestamp::now();
        let json = serde_json::to_string(&ts).unwrap();
        let back: UtcTimestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(ts, back);
    }
}
