//! git::runner
//!
//! Invokes the git binary for everything that rewrites history or talks to
//! a remote: rebase, push, fetch, checkout, branch deletion.
//!
//! Hooks, credential helpers and user configuration only apply through the
//! real binary, so these operations never go through libgit2.
//!
//! Commands that may touch the network run with a timeout; the child is
//! killed if it expires or if the future is dropped. Purely local history
//! rewrites ([`GitRunner::output_local`]) are never cut short, because a
//! rebase killed between commits is left half-applied.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;

use super::GitError;
use crate::ui::output;

/// Runs git commands in one working directory.
#[derive(Debug, Clone)]
pub struct GitRunner {
    work_dir: PathBuf,
    timeout: Duration,
    echo: bool,
}

impl GitRunner {
    pub fn new(work_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            work_dir: work_dir.into(),
            timeout,
            echo: false,
        }
    }

    /// Echo each command to stderr before running it.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Run git under the timeout and return its raw output, whatever the
    /// exit status.
    pub async fn output(&self, args: &[&str]) -> Result<Output, GitError> {
        match tokio::time::timeout(self.timeout, self.spawn(args)).await {
            Ok(result) => result,
            Err(_) => Err(GitError::Timeout {
                command: command_line(args),
                secs: self.timeout.as_secs(),
            }),
        }
    }

    /// Run a local-only git command to completion, without the timeout.
    pub async fn output_local(&self, args: &[&str]) -> Result<Output, GitError> {
        self.spawn(args).await
    }

    async fn spawn(&self, args: &[&str]) -> Result<Output, GitError> {
        if self.echo {
            output::git_command(args);
        }
        tracing::debug!(command = %command_line(args), "running git");

        let mut cmd = Command::new("git");
        cmd.args(args)
            .current_dir(&self.work_dir)
            // Never open an editor or prompt for credentials.
            .env("GIT_EDITOR", "true")
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        Ok(cmd.output().await?)
    }

    /// Run git, failing on a non-zero exit. Returns trimmed stdout.
    pub async fn run(&self, args: &[&str]) -> Result<String, GitError> {
        let out = self.output(args).await?;
        check(args, out)
    }

    /// [`run`](Self::run) without the timeout.
    pub async fn run_local(&self, args: &[&str]) -> Result<String, GitError> {
        let out = self.output_local(args).await?;
        check(args, out)
    }
}

fn check(args: &[&str], out: Output) -> Result<String, GitError> {
    if out.status.success() {
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
        tracing::debug!(command = %command_line(args), %stderr, "git failed");
        Err(GitError::CommandFailed {
            command: command_line(args),
            stderr,
        })
    }
}

fn command_line(args: &[&str]) -> String {
    format!("git {}", args.join(" "))
}
