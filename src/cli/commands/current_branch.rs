//! current-branch command

use anyhow::{anyhow, Context as _, Result};

use crate::engine::{Context, Outcome};
use crate::git::Git;

/// Print the checked-out branch. Always printed, even with `--quiet`.
pub fn current_branch(ctx: &Context) -> Result<Outcome> {
    let cwd = match &ctx.cwd {
        Some(path) => path.clone(),
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    let git = Git::open(&cwd).context("Failed to open repository")?;
    let branch = git
        .current_branch()?
        .ok_or_else(|| anyhow!("HEAD is detached"))?;
    println!("{branch}");
    Ok(Outcome::Success)
}
