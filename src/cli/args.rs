//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--cwd <path>` / `-C <path>`: Run as if in that directory
//! - `--debug`: Enable debug logging and echo git commands
//! - `--quiet` / `-q`: Minimal output
//! - `--no-verify`: Skip pre-push hooks

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::forge::MergeMethod;

/// gflow - keep a stack of dependent branches in sync and land it
#[derive(Parser, Debug)]
#[command(name = "gflow")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Run as if gflow was started in this directory
    #[arg(short = 'C', long, global = true, value_name = "PATH")]
    pub cwd: Option<PathBuf>,

    /// Enable debug logging and echo git commands
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output
    #[arg(short, long, global = true, conflicts_with = "debug")]
    pub quiet: bool,

    /// Skip pre-push hooks
    #[arg(long, global = true)]
    pub no_verify: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }

    /// Hook verification requested on the command line, if any.
    ///
    /// `None` means "use the configured value".
    pub fn verify_flag(&self) -> Option<bool> {
        self.no_verify.then_some(false)
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Rebase the current stack onto trunk, push it, and open/update reviews
    #[command(
        name = "up",
        long_about = "Synchronize the stack containing the current branch.\n\n\
            Each branch is rebased onto its parent's new head (the root onto trunk), \
            force-pushed with lease, and its review request is created or re-targeted \
            at its parent branch. Branches that are already in sync are left alone.\n\n\
            A rebase conflict stops the run with the rebase paused so it can be \
            resolved by hand; branches above it are not touched.",
        after_help = "\
EXIT CODES:
    0  every branch synced
    1  internal error (including a malformed stack)
    2  rebase conflict, resolve then run `gflow up` again
    4  a push or review call failed"
    )]
    Up {
        /// Open new review requests as drafts
        #[arg(long)]
        draft: bool,
    },

    /// Merge the stack into trunk, root first
    #[command(
        name = "land",
        long_about = "Land the stack containing the current branch.\n\n\
            Branches are merged root first. Each must be approved and in sync \
            with its parent. After a branch lands, the next branch is re-parented \
            onto trunk, rebased, pushed, and its review re-targeted before it is \
            merged in turn. Landed branches are deleted locally and remotely.\n\n\
            Running `gflow land` again resumes from the first branch that has not \
            landed.",
        after_help = "\
EXIT CODES:
    0  every branch landed
    1  internal error (including a malformed stack)
    3  a branch is blocked (not approved, stale, not pushed, rebase conflict)
    4  the host rejected a merge or retries ran out"
    )]
    Land {
        /// Show what would land without changing anything
        #[arg(long)]
        dry_run: bool,

        /// Merge method (defaults to the configured method, squash)
        #[arg(long, value_enum)]
        method: Option<MergeMethodArg>,
    },

    /// Show every tracked stack with staleness and review status
    Status,

    /// Start tracking a branch
    #[command(
        name = "track",
        after_help = "\
EXAMPLES:
    # Track the current branch on top of trunk
    gflow track

    # Track feature-b on top of feature-a
    gflow track feature-b --parent feature-a"
    )]
    Track {
        /// Branch to track (defaults to current)
        branch: Option<String>,

        /// Parent branch (defaults to trunk)
        #[arg(long)]
        parent: Option<String>,
    },

    /// Stop tracking a branch
    Untrack {
        /// Branch to untrack (defaults to current)
        branch: Option<String>,

        /// Also close the branch's review request
        #[arg(long)]
        close: bool,
    },

    /// Write the repository configuration
    Init {
        /// Trunk branch (detected when omitted)
        #[arg(long)]
        trunk: Option<String>,

        /// Remote name
        #[arg(long)]
        remote: Option<String>,
    },

    /// Print the current branch name
    CurrentBranch,

    /// Force-push a single branch
    Publish {
        /// Branch to push (defaults to current)
        branch: Option<String>,
    },

    /// Delete branches from the remote
    Unpublish {
        /// Branches to delete (defaults to current)
        branches: Vec<String>,

        /// Also delete the local branches
        #[arg(long)]
        rm: bool,
    },

    /// Generate shell completion scripts
    #[command(
        name = "completion",
        after_help = "\
INSTALLATION:
    # Bash
    gflow completion bash > ~/.local/share/bash-completion/completions/gflow

    # Zsh
    gflow completion zsh > ~/.zfunc/_gflow

    # Fish
    gflow completion fish > ~/.config/fish/completions/gflow.fish"
    )]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Merge method for reviews
#[derive(clap::ValueEnum, Debug, Clone, Copy)]
pub enum MergeMethodArg {
    /// Create a merge commit
    Merge,
    /// Squash and merge
    Squash,
    /// Rebase and merge
    Rebase,
}

impl From<MergeMethodArg> for MergeMethod {
    fn from(arg: MergeMethodArg) -> Self {
        match arg {
            MergeMethodArg::Merge => MergeMethod::Merge,
            MergeMethodArg::Squash => MergeMethod::Squash,
            MergeMethodArg::Rebase => MergeMethod::Rebase,
        }
    }
}

/// Supported shells for completion
#[derive(clap::ValueEnum, Debug, Clone, Copy)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}
