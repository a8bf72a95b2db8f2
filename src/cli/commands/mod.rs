//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Opens a [`Session`] (repository, merged config, trunk)
//! 2. Calls the engine to execute the command
//! 3. Formats and displays output
//!
//! Handlers do NOT rebase, push or merge directly; that is the engines'
//! job. The handlers that touch the network are async and run on a tokio
//! runtime created per invocation.

mod completion;
mod current_branch;
mod init;
mod land;
mod publish;
mod status;
mod track;
mod untrack;
mod up;

pub use completion::completion;
pub use current_branch::current_branch;
pub use init::init;
pub use land::land;
pub use publish::{publish, unpublish};
pub use status::status;
pub use track::track;
pub use untrack::untrack;
pub use up::up;

use std::path::PathBuf;

use anyhow::{anyhow, Context as _, Result};

use crate::cli::args::Command;
use crate::core::config::Config;
use crate::core::types::BranchName;
use crate::engine::{Context, Outcome};
use crate::forge::{create_forge, Forge, ForgeSettings};
use crate::git::{GatewaySettings, Git, GitGateway};
use crate::ui::output::{self, Verbosity};

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<Outcome> {
    match command {
        Command::Up { draft } => up(ctx, draft),
        Command::Land { dry_run, method } => land(ctx, dry_run, method.map(Into::into)),
        Command::Status => status(ctx),
        Command::Track { branch, parent } => track(ctx, branch.as_deref(), parent.as_deref()),
        Command::Untrack { branch, close } => untrack(ctx, branch.as_deref(), close),
        Command::Init { trunk, remote } => init(ctx, trunk.as_deref(), remote.as_deref()),
        Command::CurrentBranch => current_branch(ctx),
        Command::Publish { branch } => publish(ctx, branch.as_deref()),
        Command::Unpublish { branches, rm } => unpublish(ctx, &branches, rm),
        Command::Completion { shell } => completion(shell),
    }
}

/// Everything a command needs about the repository it runs in.
pub(crate) struct Session {
    pub git: Git,
    pub config: Config,
    pub trunk: BranchName,
    pub verbosity: Verbosity,
    verify: bool,
    echo: bool,
}

impl Session {
    /// Open the repository at `ctx.cwd` (or the current directory) and
    /// load its configuration.
    pub fn open(ctx: &Context) -> Result<Self> {
        let cwd = match &ctx.cwd {
            Some(path) => path.clone(),
            None => std::env::current_dir().context("Failed to read current directory")?,
        };
        let git = Git::open(&cwd).context("Failed to open repository")?;
        let loaded = Config::load(Some(git.git_dir())).context("Failed to load configuration")?;
        for source in &loaded.sources {
            tracing::debug!(path = %source.display(), "loaded config");
        }
        let config = loaded.config;

        let trunk = match config.trunk() {
            Some(name) => BranchName::new(name)?,
            None => git.detect_trunk(config.remote())?.ok_or_else(|| {
                anyhow!("Cannot detect the trunk branch. Run 'gflow init --trunk <branch>'.")
            })?,
        };

        Ok(Self {
            verify: ctx.verify.unwrap_or_else(|| config.verify_hooks()),
            echo: ctx.debug,
            verbosity: Verbosity::from_flags(ctx.quiet, ctx.debug),
            git,
            config,
            trunk,
        })
    }

    pub fn work_dir(&self) -> Result<PathBuf> {
        Ok(self.git.work_dir()?.to_path_buf())
    }

    /// The repository gateway the engines drive.
    pub fn gateway(&self, forge_name: &str) -> Result<GitGateway> {
        let settings = GatewaySettings {
            remote: self.config.remote().to_string(),
            trunk: self.trunk.clone(),
            forge: forge_name.to_string(),
            verify: self.verify,
            timeout: self.config.network_timeout(),
            echo: self.echo,
        };
        Ok(GitGateway::open(&self.work_dir()?, settings)?)
    }

    /// The branch named on the command line, or the checked-out one.
    pub fn target_branch(&self, name: Option<&str>) -> Result<BranchName> {
        match name {
            Some(name) => Ok(BranchName::new(name)?),
            None => self
                .git
                .current_branch()?
                .ok_or_else(|| anyhow!("Not on a branch. Check out a branch or name one.")),
        }
    }

    /// First non-empty token from the configured environment variables.
    fn token(&self) -> Option<String> {
        self.config.token_env_vars().iter().find_map(|var| {
            std::env::var(var)
                .ok()
                .filter(|value| !value.trim().is_empty())
        })
    }

    /// Build the review host client.
    ///
    /// Returns `None` (after a warning) when no token is available, so
    /// commands that can work without the host degrade instead of failing.
    pub fn forge(&self) -> Result<Option<Box<dyn Forge>>> {
        match self.token() {
            Some(token) => self.build_forge(&token).map(Some),
            None => {
                output::warn(
                    format!(
                        "no review host token found (checked {}); review steps are skipped",
                        self.config.token_env_vars().join(", ")
                    ),
                    self.verbosity,
                );
                Ok(None)
            }
        }
    }

    /// Like [`Session::forge`], but a missing token is an error.
    pub fn require_forge(&self) -> Result<Box<dyn Forge>> {
        let token = self.token().ok_or_else(|| {
            anyhow!(
                "No review host token. Set one of: {}",
                self.config.token_env_vars().join(", ")
            )
        })?;
        self.build_forge(&token)
    }

    fn build_forge(&self, token: &str) -> Result<Box<dyn Forge>> {
        let remote = self.config.remote();
        let remote_url = self
            .git
            .remote_url(remote)?
            .ok_or_else(|| anyhow!("No '{}' remote configured.", remote))?;
        let forge_repo = self.config.forge_repo();

        let settings = ForgeSettings {
            remote_url: &remote_url,
            token,
            provider: Some(self.config.default_forge()),
            owner: forge_repo.and_then(|r| r.owner.as_deref()),
            repo: forge_repo.and_then(|r| r.repo.as_deref()),
            api_base: forge_repo.and_then(|r| r.api_base.as_deref()),
            timeout: self.config.network_timeout(),
        };
        create_forge(&settings).context("Failed to create review host client")
    }
}

/// Create the runtime for an async command.
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
}
