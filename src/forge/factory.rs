//! forge::factory
//!
//! Forge selection and creation.
//!
//! Commands use [`create_forge`] instead of naming a concrete forge, so the
//! engines only ever see `dyn Forge`.
//!
//! # Provider Detection
//!
//! The provider comes from the configured `default_forge` or, when that is
//! unset, from the remote URL. Owner and repository come from the remote
//! URL unless `[forge_repo]` overrides them.

use std::time::Duration;

use super::github::{parse_github_url, GitHubForge};
use super::traits::{Forge, ForgeError};

/// Supported forge providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForgeProvider {
    GitHub,
}

impl ForgeProvider {
    /// All providers built into this binary.
    pub fn all() -> &'static [ForgeProvider] {
        &[ForgeProvider::GitHub]
    }

    /// The name used in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            ForgeProvider::GitHub => "github",
        }
    }

    /// # Example
    ///
    /// ```
    /// use gflow::forge::ForgeProvider;
    ///
    /// assert_eq!(ForgeProvider::parse("GitHub"), Some(ForgeProvider::GitHub));
    /// assert_eq!(ForgeProvider::parse("unknown"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "github" => Some(ForgeProvider::GitHub),
            _ => None,
        }
    }
}

impl std::fmt::Display for ForgeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Names accepted for `default_forge`.
pub fn valid_forge_names() -> Vec<&'static str> {
    ForgeProvider::all().iter().map(|p| p.name()).collect()
}

/// Detect the forge provider from a remote URL.
pub fn detect_provider(remote_url: &str) -> Option<ForgeProvider> {
    if parse_github_url(remote_url).is_some() {
        return Some(ForgeProvider::GitHub);
    }
    None
}

/// Everything needed to build a forge client.
#[derive(Debug, Clone)]
pub struct ForgeSettings<'a> {
    pub remote_url: &'a str,
    pub token: &'a str,
    /// Configured provider name; detected from the URL when `None`
    pub provider: Option<&'a str>,
    pub owner: Option<&'a str>,
    pub repo: Option<&'a str>,
    pub api_base: Option<&'a str>,
    pub timeout: Duration,
}

/// Create a forge from a remote URL and token.
///
/// # Errors
///
/// - `ForgeError::NotImplemented` if the provider is unknown
/// - `ForgeError::NotFound` if owner/repo cannot be derived
pub fn create_forge(settings: &ForgeSettings<'_>) -> Result<Box<dyn Forge>, ForgeError> {
    let provider = match settings.provider {
        Some(name) => ForgeProvider::parse(name)
            .ok_or_else(|| ForgeError::NotImplemented(format!("forge '{name}'")))?,
        None => detect_provider(settings.remote_url).ok_or_else(|| {
            ForgeError::NotImplemented(format!(
                "no forge recognizes remote '{}'",
                settings.remote_url
            ))
        })?,
    };

    match provider {
        ForgeProvider::GitHub => {
            let parsed = parse_github_url(settings.remote_url);
            let owner = settings
                .owner
                .map(str::to_string)
                .or_else(|| parsed.as_ref().map(|(o, _)| o.clone()));
            let repo = settings
                .repo
                .map(str::to_string)
                .or_else(|| parsed.as_ref().map(|(_, r)| r.clone()));

            let (Some(owner), Some(repo)) = (owner, repo) else {
                return Err(ForgeError::NotFound(format!(
                    "cannot determine GitHub owner/repo from '{}'",
                    settings.remote_url
                )));
            };

            let mut forge = GitHubForge::new(settings.token, owner, repo, settings.timeout)?;
            if let Some(base) = settings.api_base {
                forge = forge.with_api_base(base);
            }
            Ok(Box::new(forge))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(url: &str) -> ForgeSettings<'_> {
        ForgeSettings {
            remote_url: url,
            token: "t",
            provider: None,
            owner: None,
            repo: None,
            api_base: None,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn valid_names() {
        assert_eq!(valid_forge_names(), vec!["github"]);
    }

    #[test]
    fn detects_github() {
        assert_eq!(
            detect_provider("git@github.com:o/r.git"),
            Some(ForgeProvider::GitHub)
        );
        assert_eq!(detect_provider("https://example.com/o/r"), None);
    }

    #[test]
    fn creates_from_url() {
        let forge = create_forge(&settings("https://github.com/o/r.git")).unwrap();
        assert_eq!(forge.name(), "github");
    }

    #[test]
    fn unknown_remote_without_override_fails() {
        let err = create_forge(&settings("https://example.com/o/r")).err().expect("expected error");
        assert!(matches!(err, ForgeError::NotImplemented(_)));
    }

    #[test]
    fn explicit_owner_repo_with_enterprise_url() {
        let s = ForgeSettings {
            provider: Some("github"),
            owner: Some("corp"),
            repo: Some("tool"),
            api_base: Some("https://ghe.example.com/api/v3"),
            ..settings("git@ghe.example.com:corp/tool.git")
        };
        assert!(create_forge(&s).is_ok());
    }

    #[test]
    fn unknown_provider_name() {
        let s = ForgeSettings {
            provider: Some("bitbucket"),
            ..settings("https://github.com/o/r")
        };
        assert!(matches!(
            create_forge(&s),
            Err(ForgeError::NotImplemented(_))
        ));
    }
}
