//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Global Config
//!
//! Located at (in order of precedence):
//! 1. `$GFLOW_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/gflow/config.toml`
//! 3. `~/.gflow/config.toml` (canonical write location)
//!
//! # Repo Config
//!
//! Located at `<git-dir>/gflow/config.toml`.
//!
//! Values are validated after parsing; an invalid file is an error, not a
//! silent fallback to defaults.

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::types::BranchName;

/// Merge methods accepted in configuration.
pub const VALID_MERGE_METHODS: &[&str] = &["merge", "squash", "rebase"];

/// Upper bound on configured merge retries.
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Global configuration (user scope).
///
/// # Example
///
/// ```toml
/// default_forge = "github"
/// token_env = "WORK_GITHUB_TOKEN"
///
/// [up]
/// draft = true
///
/// [land]
/// merge_method = "squash"
/// max_retries = 3
/// initial_backoff_ms = 2000
/// max_backoff_ms = 16000
///
/// [network]
/// timeout_secs = 30
/// status_concurrency = 4
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalConfig {
    /// Default review host (e.g., "github")
    pub default_forge: Option<String>,

    /// Environment variable consulted first for the host token
    pub token_env: Option<String>,

    /// Run pre-push hooks by default
    pub verify_hooks: Option<bool>,

    pub up: Option<UpDefaults>,

    pub land: Option<LandDefaults>,

    pub network: Option<NetworkConfig>,
}

impl GlobalConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(forge) = &self.default_forge {
            let valid_forges = crate::forge::valid_forge_names();
            if !valid_forges.contains(&forge.as_str()) {
                return Err(ConfigError::InvalidValue(format!(
                    "invalid forge '{}', must be one of: {}",
                    forge,
                    valid_forges.join(", ")
                )));
            }
        }

        if let Some(name) = &self.token_env {
            if name.is_empty() || name.contains('=') {
                return Err(ConfigError::InvalidValue(format!(
                    "token_env '{name}' is not a valid environment variable name"
                )));
            }
        }

        if let Some(land) = &self.land {
            land.validate()?;
        }
        if let Some(network) = &self.network {
            network.validate()?;
        }

        Ok(())
    }
}

/// Repository configuration.
///
/// # Example
///
/// ```toml
/// trunk = "main"
/// remote = "origin"
/// max_stack_depth = 32
///
/// [forge_repo]
/// owner = "myorg"
/// repo = "myrepo"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RepoConfig {
    /// Trunk branch name
    pub trunk: Option<String>,

    /// Remote name (default: "origin")
    pub remote: Option<String>,

    /// Longest stack accepted before the walk gives up
    pub max_stack_depth: Option<usize>,

    /// Run pre-push hooks (overrides the global value)
    pub verify_hooks: Option<bool>,

    /// Review host repository identification
    pub forge_repo: Option<ForgeRepoConfig>,
}

impl RepoConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(trunk) = &self.trunk {
            BranchName::new(trunk).map_err(|e| {
                ConfigError::InvalidValue(format!("invalid trunk branch name: {}", e))
            })?;
        }

        if let Some(remote) = &self.remote {
            if remote.is_empty() {
                return Err(ConfigError::InvalidValue(
                    "remote cannot be empty".to_string(),
                ));
            }
        }

        if self.max_stack_depth == Some(0) {
            return Err(ConfigError::InvalidValue(
                "max_stack_depth must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// `up` defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct UpDefaults {
    /// Open new review requests as drafts
    pub draft: Option<bool>,
}

/// `land` defaults, including the transient-failure retry policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LandDefaults {
    /// "merge", "squash" or "rebase"
    pub merge_method: Option<String>,

    /// Retries after the first attempt of a host call
    pub max_retries: Option<u32>,

    /// Delay before the first retry
    pub initial_backoff_ms: Option<u64>,

    /// Cap on the exponential delay
    pub max_backoff_ms: Option<u64>,
}

impl LandDefaults {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(method) = &self.merge_method {
            if !VALID_MERGE_METHODS.contains(&method.as_str()) {
                return Err(ConfigError::InvalidValue(format!(
                    "invalid merge_method '{}', must be one of: {}",
                    method,
                    VALID_MERGE_METHODS.join(", ")
                )));
            }
        }
        if let Some(retries) = self.max_retries {
            if retries > MAX_RETRIES_LIMIT {
                return Err(ConfigError::InvalidValue(format!(
                    "max_retries must be at most {MAX_RETRIES_LIMIT}, got {retries}"
                )));
            }
        }
        if let (Some(initial), Some(max)) = (self.initial_backoff_ms, self.max_backoff_ms) {
            if initial > max {
                return Err(ConfigError::InvalidValue(format!(
                    "initial_backoff_ms ({initial}) exceeds max_backoff_ms ({max})"
                )));
            }
        }
        Ok(())
    }
}

/// Network settings shared by git and the review host.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    /// Timeout for each remote call (git fetch/push, HTTP request)
    pub timeout_secs: Option<u64>,

    /// Parallel read-only status requests
    pub status_concurrency: Option<usize>,
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue(
                "timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.status_concurrency == Some(0) {
            return Err(ConfigError::InvalidValue(
                "status_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Review host repository configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ForgeRepoConfig {
    /// Override owner/org
    pub owner: Option<String>,

    /// Override repository name
    pub repo: Option<String>,

    /// API base for self-hosted instances
    pub api_base: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    mod global_config {
        use super::*;

        #[test]
        fn defaults_validate() {
            assert!(GlobalConfig::default().validate().is_ok());
        }

        #[test]
        fn unknown_forge_rejected() {
            let config = GlobalConfig {
                default_forge: Some("bitbucket".to_string()),
                ..Default::default()
            };
            assert!(config.validate().is_err());
        }

        #[test]
        fn bad_merge_method_rejected() {
            let config = GlobalConfig {
                land: Some(LandDefaults {
                    merge_method: Some("octopus".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            };
            assert!(config.validate().is_err());
        }

        #[test]
        fn too_many_retries_rejected() {
            let config = GlobalConfig {
                land: Some(LandDefaults {
                    max_retries: Some(50),
                    ..Default::default()
                }),
                ..Default::default()
            };
            assert!(config.validate().is_err());
        }

        #[test]
        fn inverted_backoff_rejected() {
            let land = LandDefaults {
                initial_backoff_ms: Some(5000),
                max_backoff_ms: Some(100),
                ..Default::default()
            };
            assert!(land.validate().is_err());
        }

        #[test]
        fn zero_timeout_rejected() {
            let network = NetworkConfig {
                timeout_secs: Some(0),
                ..Default::default()
            };
            assert!(network.validate().is_err());
        }

        #[test]
        fn roundtrip() {
            let config = GlobalConfig {
                default_forge: Some("github".to_string()),
                token_env: Some("MY_TOKEN".to_string()),
                verify_hooks: Some(false),
                up: Some(UpDefaults { draft: Some(true) }),
                land: Some(LandDefaults {
                    merge_method: Some("rebase".to_string()),
                    max_retries: Some(2),
                    initial_backoff_ms: Some(100),
                    max_backoff_ms: Some(400),
                }),
                network: Some(NetworkConfig {
                    timeout_secs: Some(10),
                    status_concurrency: Some(8),
                }),
            };

            let toml = toml::to_string_pretty(&config).unwrap();
            let parsed: GlobalConfig = toml::from_str(&toml).unwrap();
            assert_eq!(config, parsed);
        }
    }

    mod repo_config {
        use super::*;

        #[test]
        fn invalid_trunk() {
            let config = RepoConfig {
                trunk: Some("invalid..name".to_string()),
                ..Default::default()
            };
            assert!(config.validate().is_err());
        }

        #[test]
        fn empty_remote_rejected() {
            let config = RepoConfig {
                remote: Some("".to_string()),
                ..Default::default()
            };
            assert!(config.validate().is_err());
        }

        #[test]
        fn zero_depth_rejected() {
            let config = RepoConfig {
                max_stack_depth: Some(0),
                ..Default::default()
            };
            assert!(config.validate().is_err());
        }

        #[test]
        fn reject_unknown_fields() {
            let toml = r#"
                trunk = "main"
                unknown_field = true
            "#;

            let result: Result<RepoConfig, _> = toml::from_str(toml);
            assert!(result.is_err());
        }
    }
}
