//! completion command - Generate shell completion scripts

use crate::cli::args::{Cli, Shell};
use crate::engine::Outcome;
use anyhow::Result;
use clap::CommandFactory;
use clap_complete::{generate, shells};

/// Write the completion script for `shell` to stdout.
pub fn completion(shell: Shell) -> Result<Outcome> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    let mut out = std::io::stdout();

    match shell {
        Shell::Bash => generate(shells::Bash, &mut cmd, &name, &mut out),
        Shell::Zsh => generate(shells::Zsh, &mut cmd, &name, &mut out),
        Shell::Fish => generate(shells::Fish, &mut cmd, &name, &mut out),
        Shell::PowerShell => generate(shells::PowerShell, &mut cmd, &name, &mut out),
    }

    Ok(Outcome::Success)
}
