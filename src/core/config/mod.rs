//! core::config
//!
//! Configuration schema and loading.
//!
//! # Precedence
//!
//! Later overrides earlier:
//! 1. Default values
//! 2. Global config file
//! 3. Repo config file
//! 4. CLI flags (applied by the command handlers)
//!
//! # Example
//!
//! ```no_run
//! use gflow::core::config::Config;
//! use std::path::Path;
//!
//! let result = Config::load(Some(Path::new("/path/to/repo/.git"))).unwrap();
//! let config = result.config;
//! println!("remote: {}", config.remote());
//! println!("max depth: {}", config.max_stack_depth());
//! ```

pub mod schema;

pub use schema::{GlobalConfig, RepoConfig};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::forge::retry::RetryConfig;
use crate::forge::MergeMethod;

/// Default cap on stack length.
pub const DEFAULT_MAX_STACK_DEPTH: usize = 32;

/// Default timeout for a single remote call.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default parallelism for read-only status requests.
pub const DEFAULT_STATUS_CONCURRENCY: usize = 4;

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("failed to write config file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("home directory not found")]
    NoHomeDir,
}

/// Result of loading configuration.
#[derive(Debug)]
pub struct ConfigLoadResult {
    pub config: Config,
    /// Files that were read, global first.
    pub sources: Vec<PathBuf>,
}

/// Merged configuration from all sources.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub global: GlobalConfig,
    pub repo: Option<RepoConfig>,
}

impl Config {
    /// Load configuration from the default locations.
    ///
    /// `git_dir` is the repository's `.git` directory; when given, the repo
    /// file under it is loaded too. Missing files are not an error.
    pub fn load(git_dir: Option<&Path>) -> Result<ConfigLoadResult, ConfigError> {
        let mut sources = Vec::new();

        let global = match Self::first_existing(&Self::global_candidates()) {
            Some(path) => {
                let config: GlobalConfig = Self::read_toml(&path)?;
                sources.push(path);
                config
            }
            None => GlobalConfig::default(),
        };

        let repo = match git_dir.map(Self::repo_config_path) {
            Some(path) if path.exists() => {
                let config: RepoConfig = Self::read_toml(&path)?;
                sources.push(path);
                Some(config)
            }
            _ => None,
        };

        global.validate()?;
        if let Some(ref r) = repo {
            r.validate()?;
        }

        Ok(ConfigLoadResult {
            config: Config { global, repo },
            sources,
        })
    }

    /// Global config locations in search order.
    fn global_candidates() -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        if let Ok(path) = std::env::var("GFLOW_CONFIG") {
            candidates.push(PathBuf::from(path));
        }
        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            candidates.push(PathBuf::from(xdg_home).join("gflow/config.toml"));
        }
        if let Ok(path) = Self::global_config_path() {
            candidates.push(path);
        }
        candidates
    }

    fn first_existing(candidates: &[PathBuf]) -> Option<PathBuf> {
        candidates.iter().find(|p| p.exists()).cloned()
    }

    fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// `~/.gflow/config.toml`.
    pub fn global_config_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".gflow/config.toml"))
    }

    /// `<git-dir>/gflow/config.toml`.
    pub fn repo_config_path(git_dir: &Path) -> PathBuf {
        git_dir.join("gflow/config.toml")
    }

    /// Write repo config atomically (temp file, then rename).
    pub fn write_repo(git_dir: &Path, config: &RepoConfig) -> Result<PathBuf, ConfigError> {
        config.validate()?;
        let path = Self::repo_config_path(git_dir);
        Self::write_config_atomic(&path, config)?;
        Ok(path)
    }

    fn write_config_atomic<T: serde::Serialize>(
        path: &Path,
        config: &T,
    ) -> Result<(), ConfigError> {
        let write_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| ConfigError::WriteError { path, source }
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err(path))?;
        }

        let contents =
            toml::to_string_pretty(config).map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

        let temp_path = path.with_extension("toml.tmp");
        let mut file = fs::File::create(&temp_path).map_err(write_err(&temp_path))?;
        file.write_all(contents.as_bytes())
            .map_err(write_err(&temp_path))?;
        file.sync_all().map_err(write_err(&temp_path))?;

        fs::rename(&temp_path, path).map_err(write_err(path))?;
        Ok(())
    }

    // =========================================================================
    // Accessor methods with precedence
    // =========================================================================

    /// Configured trunk, `None` when it should be detected.
    pub fn trunk(&self) -> Option<&str> {
        self.repo.as_ref().and_then(|r| r.trunk.as_deref())
    }

    /// Remote name, "origin" by default.
    pub fn remote(&self) -> &str {
        self.repo
            .as_ref()
            .and_then(|r| r.remote.as_deref())
            .unwrap_or("origin")
    }

    pub fn max_stack_depth(&self) -> usize {
        self.repo
            .as_ref()
            .and_then(|r| r.max_stack_depth)
            .unwrap_or(DEFAULT_MAX_STACK_DEPTH)
    }

    /// Whether pushes run pre-push hooks. Repo value wins over global.
    pub fn verify_hooks(&self) -> bool {
        self.repo
            .as_ref()
            .and_then(|r| r.verify_hooks)
            .or(self.global.verify_hooks)
            .unwrap_or(true)
    }

    /// "github" unless configured.
    pub fn default_forge(&self) -> &str {
        self.global.default_forge.as_deref().unwrap_or("github")
    }

    /// Environment variables consulted for the host token, in order.
    pub fn token_env_vars(&self) -> Vec<String> {
        let mut vars: Vec<String> = self.global.token_env.iter().cloned().collect();
        vars.extend(
            ["GFLOW_TOKEN", "GITHUB_TOKEN", "GH_TOKEN"]
                .iter()
                .map(|s| s.to_string()),
        );
        vars
    }

    pub fn up_draft(&self) -> bool {
        self.global
            .up
            .as_ref()
            .and_then(|u| u.draft)
            .unwrap_or(false)
    }

    /// Merge method used by `land`, squash by default.
    pub fn merge_method(&self) -> MergeMethod {
        self.global
            .land
            .as_ref()
            .and_then(|l| l.merge_method.as_deref())
            .and_then(|m| m.parse().ok())
            .unwrap_or_default()
    }

    /// Retry policy for transient host failures.
    pub fn retry_config(&self) -> RetryConfig {
        let defaults = RetryConfig::DEFAULT;
        let Some(land) = self.global.land.as_ref() else {
            return defaults;
        };
        RetryConfig::new(
            land.max_retries.unwrap_or(defaults.max_retries),
            land.initial_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_delay),
            land.max_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
            defaults.backoff_multiplier,
        )
    }

    /// Timeout for each git network command and HTTP request.
    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(
            self.global
                .network
                .as_ref()
                .and_then(|n| n.timeout_secs)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        )
    }

    pub fn status_concurrency(&self) -> usize {
        self.global
            .network
            .as_ref()
            .and_then(|n| n.status_concurrency)
            .unwrap_or(DEFAULT_STATUS_CONCURRENCY)
    }

    pub fn forge_repo(&self) -> Option<&schema::ForgeRepoConfig> {
        self.repo.as_ref().and_then(|r| r.forge_repo.as_ref())
    }
}
