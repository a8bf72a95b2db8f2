//! init command - Write the repository configuration

use anyhow::{anyhow, bail, Context as _, Result};

use crate::core::config::{Config, RepoConfig};
use crate::core::types::BranchName;
use crate::engine::{Context, Outcome};
use crate::git::Git;
use crate::ui::output::{self, Verbosity};

/// Write `<git-dir>/gflow/config.toml` with the trunk and remote.
///
/// Values not given keep what the existing file says; the trunk is
/// detected from the remote when neither names it.
///
/// # Arguments
///
/// * `ctx` - Execution context
/// * `trunk` - Trunk branch
/// * `remote` - Remote name
pub fn init(ctx: &Context, trunk: Option<&str>, remote: Option<&str>) -> Result<Outcome> {
    let verbosity = Verbosity::from_flags(ctx.quiet, ctx.debug);
    let cwd = match &ctx.cwd {
        Some(path) => path.clone(),
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    let git = Git::open(&cwd).context("Failed to open repository")?;
    let existing = Config::load(Some(git.git_dir()))
        .context("Failed to load configuration")?
        .config;

    let mut repo_config: RepoConfig = existing.repo.clone().unwrap_or_default();
    if let Some(remote) = remote {
        if remote.is_empty() {
            bail!("Remote name cannot be empty");
        }
        repo_config.remote = Some(remote.to_string());
    }
    let remote = repo_config.remote.clone().unwrap_or_else(|| "origin".into());

    let trunk = match trunk.or(repo_config.trunk.as_deref()) {
        Some(name) => BranchName::new(name)?,
        None => git.detect_trunk(&remote)?.ok_or_else(|| {
            anyhow!("Cannot detect the trunk branch. Pass --trunk <branch>.")
        })?,
    };
    if git.branch_head(&trunk)?.is_none() {
        bail!("Trunk branch '{}' does not exist locally", trunk);
    }
    if git.remote_url(&remote)?.is_none() {
        output::warn(format!("remote '{remote}' is not configured"), verbosity);
    }
    repo_config.trunk = Some(trunk.to_string());

    let path = Config::write_repo(git.git_dir(), &repo_config)?;
    tracing::debug!(path = %path.display(), "wrote repo config");
    output::print(
        format!("Initialized gflow: trunk '{}', remote '{}'", trunk, remote),
        verbosity,
    );
    Ok(Outcome::Success)
}
